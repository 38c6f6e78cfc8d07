// Depth-bounded stochastic rewriting.
//
// Each round rewrites every token of the current string in parallel: a
// non-terminal is replaced by one of its alternatives, chosen uniformly; a
// terminal is copied through. After `depth` rounds the string is returned
// as-is, so a grammar that keeps producing non-terminals (right recursion,
// indirect cycles) yields a string with unexpanded symbols left in it.
// `list_gen.rs` treats such output as a failed attempt.
//
// Expansion also stops as soon as no non-terminals remain (further rounds
// would change nothing and draw no random numbers) and once the string
// grows past `max_tokens`, which keeps exponentially branching grammars
// such as `S -> 60 S S` from exhausting memory.

use crate::grammar::Grammar;
use savellys_prng::SongRng;

/// Round cap used by list generation.
pub const DEFAULT_DEPTH: usize = 64;

/// Token cap used when none is configured.
pub const DEFAULT_MAX_TOKENS: usize = 1 << 16;

/// Expansion limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub depth: usize,
    pub max_tokens: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        ExpansionLimits {
            depth: DEFAULT_DEPTH,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }
}

/// Expand `start` for up to `depth` rounds and return the result as a
/// single-space-separated string. `depth == 0` returns `start` untouched.
pub fn generate(grammar: &Grammar, start: &str, depth: usize, rng: &mut SongRng) -> String {
    if depth == 0 {
        return start.to_string();
    }
    let limits = ExpansionLimits {
        depth,
        ..Default::default()
    };
    expand_tokens(grammar, start, limits, rng).join(" ")
}

/// Expand `start` and return the resulting token sequence.
pub fn expand_tokens(
    grammar: &Grammar,
    start: &str,
    limits: ExpansionLimits,
    rng: &mut SongRng,
) -> Vec<String> {
    let mut current: Vec<String> = start.split_whitespace().map(str::to_string).collect();

    for round in 0..limits.depth {
        if !current.iter().any(|t| grammar.is_non_terminal(t)) {
            break;
        }
        if current.len() > limits.max_tokens {
            log::debug!(
                "expansion of {start:?} stopped at round {round}: {} tokens exceeds cap {}",
                current.len(),
                limits.max_tokens
            );
            break;
        }
        current = rewrite_round(grammar, &current, rng);
    }

    current
}

/// One parallel rewriting round.
fn rewrite_round(grammar: &Grammar, tokens: &[String], rng: &mut SongRng) -> Vec<String> {
    let mut next = Vec::with_capacity(tokens.len());
    for token in tokens {
        match rng.choose(grammar.rules_for(token)) {
            Some(alternative) => next.extend(alternative.iter().cloned()),
            None => next.push(token.clone()),
        }
    }
    next
}
