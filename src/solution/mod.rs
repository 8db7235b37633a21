//! Solution checking over the stream of placements.

mod core;

pub use core::{MoveRecord, MoveSequenceInterpreter, SolutionPattern, Verdict};
