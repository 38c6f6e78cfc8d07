// Savellys: grammar-driven melody generator
//
// Note parameter lists (pitch, duration, velocity) are drawn from small
// stochastic rewrite grammars, assembled into bars of evenly spaced notes,
// shaped with sinusoidal modulation, checked for playable timing and written
// out as Standard MIDI Files.
//
// Architecture:
// - grammar.rs: Rule representation and the text DSL parser (`A -> x y | z`),
//   rejecting direct left recursion at parse time
// - generator.rs: Parallel rewriting of a start symbol under depth and token
//   limits
// - list_gen.rs: Rejection sampling of numeric lists that meet a length
//   predicate, with a bounded retry budget
// - song.rs: Note / Bar / Song model, length reconciliation, transforms
// - modulate.rs: Sinusoidal per-field modulation with explicit phase
//   conventions
// - validate.rs: Positive-duration check with a readable report
// - midi.rs: `NoteSink` trait and the `midly`-backed SMF writer
// - midi_check.rs: Note-on/note-off pairing check for decoded files
// - config.rs: JSON song description (`SongConfig`) used by the CLI
// - error.rs: Crate-wide error enum
//
// All randomness goes through an explicit `&mut SongRng`, so a seed fully
// determines the output.

pub mod config;
pub mod error;
pub mod generator;
pub mod grammar;
pub mod list_gen;
pub mod midi;
pub mod midi_check;
pub mod modulate;
pub mod song;
pub mod validate;

pub use error::{Error, Result};
pub use savellys_prng::SongRng;
