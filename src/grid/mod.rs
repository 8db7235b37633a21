//! Lattice module orchestrator.
//!
//! The grid is pure geometry: it knows where every cell slot sits and how it
//! is turned, but nothing about which piece occupies it. Occupancy lives in
//! [`crate::occupancy`].

mod core;

pub use core::{Bounds, Cell, Grid};
