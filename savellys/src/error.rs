// Error type shared by every module of the crate.
//
// Grammar and configuration problems surface immediately; the only retried
// condition is an unsatisfied length predicate in `list_gen.rs`, and that
// loop ends in `GenerationExhausted` once its budget is spent. Value
// clamping in `song.rs` and `modulate.rs` is never an error.

use crate::list_gen::{LengthConstraint, ValueKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A grammar line without `->`, or with an empty/ill-formed left side.
    #[error("malformed rule on line {line}: {text:?} ({reason})")]
    MalformedRule {
        line: usize,
        text: String,
        reason: &'static str,
    },

    /// An alternative whose first token is the rule's own left-hand side.
    #[error("left recursion on line {line}: {rule:?} starts with its own symbol {symbol:?}")]
    LeftRecursion {
        line: usize,
        symbol: String,
        rule: String,
    },

    #[error(
        "no {kind} list of length >= {min_length} ({constraint}) after {attempts} attempts \
         (last attempt: {last_outcome})"
    )]
    GenerationExhausted {
        kind: ValueKind,
        min_length: usize,
        constraint: LengthConstraint,
        attempts: usize,
        last_outcome: String,
    },

    /// A terminal token that cannot be read as the requested number type.
    #[error("terminal {token:?} is not a valid {kind} value")]
    NonNumericTerminal { token: String, kind: ValueKind },

    #[error("invalid song configuration: {0}")]
    InvalidSongConfiguration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MIDI error: {0}")]
    Midi(#[from] midly::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
