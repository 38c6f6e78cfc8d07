// Grammar model and parser for the rule DSL.
//
// A grammar is a list of lines of the form
//
//     LHS -> ALT | ALT | ...
//
// where each ALT is a whitespace-separated token sequence. A token is a
// non-terminal iff some rule has exactly that token as its left-hand side;
// everything else is a terminal, later parsed as a number by `list_gen.rs`.
// Two naming styles are common (`S -> A B` and `$S -> $A $B`); the parser
// treats them identically.
//
// The parser rejects direct left recursion: an alternative whose first token
// is the rule's own lhs. It does not look for indirect cycles such as
// `A -> B` / `B -> A`; those grammars are accepted and are bounded at
// expansion time by the round cap in `generator.rs`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// One alternative right-hand side: an ordered token sequence.
pub type Alternative = Vec<String>;

/// Whether a token is rewritten by the grammar or copied through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenKind {
    Terminal,
    NonTerminal,
}

/// A single symbol's rule set, in the order the alternatives were parsed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrammarRule {
    pub lhs: String,
    pub alternatives: Vec<Alternative>,
}

/// Parsed, immutable grammar.
///
/// Serialized as its rule lines; deserializing goes back through
/// `parse_grammar`, so the left-recursion check and the symbol index hold
/// for every `Grammar` value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct Grammar {
    /// Rules in first-definition order.
    rules: Vec<GrammarRule>,
    /// lhs -> index into `rules`.
    index: BTreeMap<String, usize>,
}

impl Grammar {
    /// Alternatives for `symbol`, or an empty slice for a terminal.
    pub fn rules_for(&self, symbol: &str) -> &[Alternative] {
        match self.index.get(symbol) {
            Some(&i) => &self.rules[i].alternatives,
            None => &[],
        }
    }

    pub fn token_kind(&self, token: &str) -> TokenKind {
        if self.index.contains_key(token) {
            TokenKind::NonTerminal
        } else {
            TokenKind::Terminal
        }
    }

    pub fn is_non_terminal(&self, token: &str) -> bool {
        self.token_kind(token) == TokenKind::NonTerminal
    }

    /// The lhs of the first rule, used as the default start symbol. Works
    /// for both `S` and `$S` style grammars.
    pub fn start_symbol(&self) -> Option<&str> {
        self.rules.first().map(|r| r.lhs.as_str())
    }

    pub fn rules(&self) -> &[GrammarRule] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Total number of alternatives across all symbols.
    pub fn alternative_count(&self) -> usize {
        self.rules.iter().map(|r| r.alternatives.len()).sum()
    }

    fn add_alternative(&mut self, lhs: &str, alternative: Alternative) {
        let idx = match self.index.get(lhs) {
            Some(&i) => i,
            None => {
                self.rules.push(GrammarRule {
                    lhs: lhs.to_string(),
                    alternatives: Vec::new(),
                });
                let i = self.rules.len() - 1;
                self.index.insert(lhs.to_string(), i);
                i
            }
        };
        self.rules[idx].alternatives.push(alternative);
    }
}

impl fmt::Display for GrammarRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let alts: Vec<String> = self.alternatives.iter().map(|a| a.join(" ")).collect();
        write!(f, "{} -> {}", self.lhs, alts.join(" | "))
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, rule) in self.rules.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{rule}")?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<String>> for Grammar {
    type Error = Error;

    fn try_from(lines: Vec<String>) -> Result<Self> {
        parse_grammar(lines)
    }
}

impl From<Grammar> for Vec<String> {
    fn from(grammar: Grammar) -> Self {
        grammar.rules.iter().map(|r| r.to_string()).collect()
    }
}

impl FromStr for Grammar {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        parse_grammar(text.lines())
    }
}

/// Parse rule lines into a grammar.
///
/// Blank lines are skipped. Line numbers in errors are 1-based and count
/// every input line, blank or not.
pub fn parse_grammar<I, S>(lines: I) -> Result<Grammar>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut grammar = Grammar::default();

    for (i, raw) in lines.into_iter().enumerate() {
        let line_no = i + 1;
        let line = raw.as_ref().trim();
        if line.is_empty() {
            continue;
        }

        let Some((lhs, rhs)) = line.split_once("->") else {
            return Err(malformed(line_no, line, "missing '->'"));
        };
        let lhs = lhs.trim();
        if lhs.is_empty() {
            return Err(malformed(line_no, line, "empty left-hand side"));
        }
        if lhs.split_whitespace().nth(1).is_some() {
            return Err(malformed(line_no, line, "left-hand side must be a single symbol"));
        }

        // Check every alternative before adding any, so a rejected line
        // never leaves half its alternatives behind.
        let alternatives: Vec<Alternative> = rhs
            .split('|')
            .map(|alt| alt.split_whitespace().map(str::to_string).collect())
            .collect();
        for alt in &alternatives {
            if alt.first().map(String::as_str) == Some(lhs) {
                return Err(Error::LeftRecursion {
                    line: line_no,
                    symbol: lhs.to_string(),
                    rule: line.to_string(),
                });
            }
        }

        for alt in alternatives {
            grammar.add_alternative(lhs, alt);
        }
    }

    log::debug!(
        "parsed grammar: {} symbols, {} alternatives",
        grammar.rules.len(),
        grammar.alternative_count()
    );
    Ok(grammar)
}

fn malformed(line: usize, text: &str, reason: &'static str) -> Error {
    Error::MalformedRule {
        line,
        text: text.to_string(),
        reason,
    }
}
