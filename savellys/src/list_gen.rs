// Rejection-sampling list generator.
//
// Wraps a grammar and repeatedly expands its start symbol until the terminal
// tokens parse as numbers of the requested kind and the resulting list meets
// a length predicate (`min_length` plus an optional even / power-of-two
// constraint). Attempts are capped; running out is `GenerationExhausted`.
//
// Two kinds of bad token are told apart. A leftover non-terminal means the
// round cap cut the expansion short, which a fresh attempt may avoid, so it
// only fails the attempt. A terminal that is not a number can never parse
// no matter how often we retry, so it fails the whole call with
// `NonNumericTerminal`.

use crate::error::{Error, Result};
use crate::generator::{DEFAULT_DEPTH, DEFAULT_MAX_TOKENS, ExpansionLimits, expand_tokens};
use crate::grammar::Grammar;
use savellys_prng::SongRng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Attempt budget used when none is configured.
pub const DEFAULT_MAX_ATTEMPTS: usize = 1000;

/// Which note parameter a list feeds, and therefore how its tokens parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// Integer MIDI note numbers.
    Pitch,
    /// Floating-point note lengths in beats.
    Duration,
    /// Integer MIDI velocities.
    Velocity,
}

impl ValueKind {
    pub fn is_integer(self) -> bool {
        matches!(self, ValueKind::Pitch | ValueKind::Velocity)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ValueKind::Pitch => "pitch",
            ValueKind::Duration => "duration",
            ValueKind::Velocity => "velocity",
        })
    }
}

/// Extra condition on the list length, on top of `min_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthConstraint {
    #[default]
    Any,
    Even,
    PowerOfTwo,
}

impl LengthConstraint {
    pub fn accepts(self, len: usize) -> bool {
        match self {
            LengthConstraint::Any => true,
            LengthConstraint::Even => len % 2 == 0,
            LengthConstraint::PowerOfTwo => len.is_power_of_two(),
        }
    }
}

impl fmt::Display for LengthConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LengthConstraint::Any => "any length",
            LengthConstraint::Even => "even length",
            LengthConstraint::PowerOfTwo => "power-of-two length",
        })
    }
}

/// A generated list, typed by its `ValueKind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValues {
    Integers(Vec<i64>),
    Floats(Vec<f64>),
}

impl ParameterValues {
    pub fn len(&self) -> usize {
        match self {
            ParameterValues::Integers(v) => v.len(),
            ParameterValues::Floats(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every value widened to `f64`.
    pub fn to_floats(&self) -> Vec<f64> {
        match self {
            ParameterValues::Integers(v) => v.iter().map(|&x| x as f64).collect(),
            ParameterValues::Floats(v) => v.clone(),
        }
    }

    /// Every value as an integer; floats are rounded to nearest.
    pub fn to_integers(&self) -> Vec<i64> {
        match self {
            ParameterValues::Integers(v) => v.clone(),
            ParameterValues::Floats(v) => v.iter().map(|&x| x.round() as i64).collect(),
        }
    }
}

/// Grammar-backed generator for one parameter list.
#[derive(Debug, Clone)]
pub struct ListGenerator {
    grammar: Grammar,
    start_symbol: String,
    pub min_length: usize,
    pub kind: ValueKind,
    pub constraint: LengthConstraint,
    pub limits: ExpansionLimits,
    pub max_attempts: usize,
}

/// Why a single attempt was rejected.
enum AttemptOutcome {
    Accepted(ParameterValues),
    Unexpanded(String),
    WrongLength(usize),
}

impl ListGenerator {
    /// Parse `grammar_text` and build a generator starting from its first
    /// rule's left-hand side.
    pub fn new(grammar_text: &str, min_length: usize, kind: ValueKind) -> Result<Self> {
        let grammar: Grammar = grammar_text.parse()?;
        Self::from_grammar(grammar, min_length, kind)
    }

    pub fn from_grammar(grammar: Grammar, min_length: usize, kind: ValueKind) -> Result<Self> {
        let start_symbol = grammar
            .start_symbol()
            .ok_or_else(|| {
                Error::InvalidSongConfiguration(format!("{kind} grammar has no rules"))
            })?
            .to_string();
        Ok(ListGenerator {
            grammar,
            start_symbol,
            min_length,
            kind,
            constraint: LengthConstraint::Any,
            limits: ExpansionLimits {
                depth: DEFAULT_DEPTH,
                max_tokens: DEFAULT_MAX_TOKENS,
            },
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        })
    }

    pub fn with_constraint(mut self, constraint: LengthConstraint) -> Self {
        self.constraint = constraint;
        self
    }

    pub fn with_start_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.start_symbol = symbol.into();
        self
    }

    pub fn with_depth(mut self, depth: usize) -> Self {
        self.limits.depth = depth;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn start_symbol(&self) -> &str {
        &self.start_symbol
    }

    /// Generate a fresh list that satisfies the length predicate.
    pub fn generate_list(&self, rng: &mut SongRng) -> Result<ParameterValues> {
        let mut last_outcome = String::from("none");

        for attempt in 1..=self.max_attempts {
            match self.attempt(rng)? {
                AttemptOutcome::Accepted(values) => {
                    log::debug!(
                        "{} list of {} values accepted on attempt {attempt}",
                        self.kind,
                        values.len()
                    );
                    return Ok(values);
                }
                AttemptOutcome::Unexpanded(symbol) => {
                    last_outcome = format!("unexpanded symbol {symbol:?}");
                }
                AttemptOutcome::WrongLength(len) => {
                    last_outcome = format!("length {len}");
                }
            }
            log::trace!("{} attempt {attempt} rejected: {last_outcome}", self.kind);
        }

        Err(Error::GenerationExhausted {
            kind: self.kind,
            min_length: self.min_length,
            constraint: self.constraint,
            attempts: self.max_attempts,
            last_outcome,
        })
    }

    fn attempt(&self, rng: &mut SongRng) -> Result<AttemptOutcome> {
        let tokens = expand_tokens(&self.grammar, &self.start_symbol, self.limits, rng);

        if let Some(pending) = tokens.iter().find(|t| self.grammar.is_non_terminal(t)) {
            return Ok(AttemptOutcome::Unexpanded(pending.clone()));
        }

        let len = tokens.len();
        if len < self.min_length || !self.constraint.accepts(len) {
            // Still parse, so a non-numeric terminal is reported even when
            // the length happens to be wrong.
            parse_values(&tokens, self.kind)?;
            return Ok(AttemptOutcome::WrongLength(len));
        }

        parse_values(&tokens, self.kind).map(AttemptOutcome::Accepted)
    }
}

/// Parse terminal tokens as numbers of `kind`.
pub fn parse_values(tokens: &[String], kind: ValueKind) -> Result<ParameterValues> {
    let bad = |token: &str| Error::NonNumericTerminal {
        token: token.to_string(),
        kind,
    };

    if kind.is_integer() {
        tokens
            .iter()
            .map(|t| t.parse::<i64>().map_err(|_| bad(t)))
            .collect::<Result<Vec<_>>>()
            .map(ParameterValues::Integers)
    } else {
        tokens
            .iter()
            .map(|t| match t.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(bad(t)),
            })
            .collect::<Result<Vec<_>>>()
            .map(ParameterValues::Floats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_a_even_list_from_two_note_motif() {
        let generator = ListGenerator::new("S -> A A | A\nA -> 60 62", 2, ValueKind::Pitch)
            .unwrap()
            .with_depth(10)
            .with_constraint(LengthConstraint::Even);
        let mut rng = SongRng::new(8);
        for _ in 0..50 {
            let ParameterValues::Integers(values) = generator.generate_list(&mut rng).unwrap()
            else {
                panic!("pitch lists are integers");
            };
            assert_eq!(values.len() % 2, 0);
            assert!(values.iter().all(|v| *v == 60 || *v == 62));
        }
    }

    #[test]
    fn results_meet_min_length_and_power_of_two() {
        let generator = ListGenerator::new(
            "S -> A A A A\nA -> 60 A | 60 B | 60\nB -> 62 B | 62 C | 64 C | 66\nC -> 63 | A",
            16,
            ValueKind::Pitch,
        )
        .unwrap()
        .with_constraint(LengthConstraint::PowerOfTwo);
        let mut rng = SongRng::new(21);
        for _ in 0..20 {
            let values = generator.generate_list(&mut rng).unwrap();
            assert!(values.len() >= 16);
            assert!(values.len().is_power_of_two());
        }
    }

    #[test]
    fn durations_parse_as_floats() {
        let generator =
            ListGenerator::new("S -> A A\nA -> 0.25 0.5 | 1", 2, ValueKind::Duration).unwrap();
        let values = generator.generate_list(&mut SongRng::new(4)).unwrap();
        let ParameterValues::Floats(values) = values else {
            panic!("duration lists are floats");
        };
        assert!(values.iter().all(|v| [0.25, 0.5, 1.0].contains(v)));
    }

    #[test]
    fn dollar_grammar_uses_its_own_start_symbol() {
        let generator = ListGenerator::new(
            "$S -> $phrase0 $phrase0\n$phrase0 -> 100 100 100 100",
            8,
            ValueKind::Velocity,
        )
        .unwrap();
        assert_eq!(generator.start_symbol(), "$S");
        let values = generator.generate_list(&mut SongRng::new(1)).unwrap();
        assert_eq!(values, ParameterValues::Integers(vec![100; 8]));
    }

    #[test]
    fn non_numeric_terminal_fails_immediately() {
        let generator = ListGenerator::new("S -> 60 C4 62", 1, ValueKind::Pitch).unwrap();
        match generator.generate_list(&mut SongRng::new(1)) {
            Err(Error::NonNumericTerminal { token, kind }) => {
                assert_eq!(token, "C4");
                assert_eq!(kind, ValueKind::Pitch);
            }
            other => panic!("expected NonNumericTerminal, got {other:?}"),
        }
    }

    #[test]
    fn float_token_is_not_an_integer_pitch() {
        let generator = ListGenerator::new("S -> 60.5", 1, ValueKind::Pitch).unwrap();
        assert!(matches!(
            generator.generate_list(&mut SongRng::new(1)),
            Err(Error::NonNumericTerminal { .. })
        ));
    }

    #[test]
    fn unsatisfiable_length_exhausts_budget() {
        // Always exactly three values: never even.
        let generator = ListGenerator::new("S -> 60 62 64", 1, ValueKind::Pitch)
            .unwrap()
            .with_constraint(LengthConstraint::Even)
            .with_max_attempts(25);
        match generator.generate_list(&mut SongRng::new(1)) {
            Err(Error::GenerationExhausted { attempts, .. }) => assert_eq!(attempts, 25),
            other => panic!("expected GenerationExhausted, got {other:?}"),
        }
    }

    #[test]
    fn unresolved_symbols_exhaust_budget() {
        let generator = ListGenerator::new("S -> 60 S", 1, ValueKind::Pitch)
            .unwrap()
            .with_max_attempts(5);
        match generator.generate_list(&mut SongRng::new(1)) {
            Err(Error::GenerationExhausted { last_outcome, .. }) => {
                assert!(last_outcome.contains("\"S\""), "{last_outcome}");
            }
            other => panic!("expected GenerationExhausted, got {other:?}"),
        }
    }

    #[test]
    fn length_constraints() {
        assert!(LengthConstraint::Any.accepts(3));
        assert!(LengthConstraint::Even.accepts(4));
        assert!(!LengthConstraint::Even.accepts(5));
        assert!(LengthConstraint::PowerOfTwo.accepts(1));
        assert!(LengthConstraint::PowerOfTwo.accepts(1024));
        assert!(!LengthConstraint::PowerOfTwo.accepts(0));
        assert!(!LengthConstraint::PowerOfTwo.accepts(12));
    }

    #[test]
    fn empty_grammar_is_rejected() {
        assert!(matches!(
            ListGenerator::new("", 1, ValueKind::Pitch),
            Err(Error::InvalidSongConfiguration(_))
        ));
    }

    #[test]
    fn non_finite_durations_are_rejected() {
        let tokens = vec!["inf".to_string()];
        assert!(parse_values(&tokens, ValueKind::Duration).is_err());
        let tokens = vec!["1".to_string(), "0.5".to_string()];
        assert_eq!(
            parse_values(&tokens, ValueKind::Duration).unwrap(),
            ParameterValues::Floats(vec![1.0, 0.5])
        );
    }
}
