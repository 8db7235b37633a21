//! Which piece sits on which cell.
//!
//! `GridOccupancy` is the only place occupancy changes. Illegal moves such
//! as choosing an empty cell are ordinary interaction and come back as
//! `None`/`false`, never as errors.

mod core;

pub use core::{GridOccupancy, Piece, PieceId, PieceState};
