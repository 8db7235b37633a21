use std::fmt;

use serde::{Deserialize, Serialize};

/// Position in lattice space. `y` grows upwards, rows grow downwards.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// The two perpendicular orientation classes a cell or piece can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Stick running along the y axis (0°).
    Vertical,
    /// Stick running along the x axis (90°).
    Horizontal,
}

impl Orientation {
    pub fn degrees(self) -> u16 {
        match self {
            Orientation::Vertical => 0,
            Orientation::Horizontal => 90,
        }
    }

    pub fn rotated(self) -> Self {
        match self {
            Orientation::Vertical => Orientation::Horizontal,
            Orientation::Horizontal => Orientation::Vertical,
        }
    }
}

/// Where a piece is drawn and how it is turned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub position: Point,
    pub orientation: Orientation,
}

/// Absolute lattice coordinate of a cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CellId {
    pub row: usize,
    pub col: usize,
}

impl CellId {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{},{}]", self.row, self.col)
    }
}

/// Offset from the lattice center cell, written `[row, col]` in configs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[isize; 2]", into = "[isize; 2]")]
pub struct RelativeIndex {
    pub row: isize,
    pub col: isize,
}

impl RelativeIndex {
    pub const fn new(row: isize, col: isize) -> Self {
        Self { row, col }
    }
}

impl From<[isize; 2]> for RelativeIndex {
    fn from([row, col]: [isize; 2]) -> Self {
        Self { row, col }
    }
}

impl From<RelativeIndex> for [isize; 2] {
    fn from(index: RelativeIndex) -> Self {
        [index.row, index.col]
    }
}
