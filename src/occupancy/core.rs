use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::{KatonaError, Result};
use crate::geometry::{CellId, Point, Pose};
use crate::grid::Grid;

/// Stable handle of a movable piece, its index in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PieceId(pub usize);

impl fmt::Display for PieceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "piece-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    /// Detached from the lattice, following the pointer.
    Held,
    Placed(CellId),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Piece {
    pub id: PieceId,
    pub name: String,
    pub home: CellId,
    pub state: PieceState,
    pub pose: Pose,
    /// Cell the piece was last chosen from.
    pub taken_from: Option<CellId>,
}

impl Piece {
    pub fn cell(&self) -> Option<CellId> {
        match self.state {
            PieceState::Placed(cell) => Some(cell),
            PieceState::Held => None,
        }
    }

    pub fn is_held(&self) -> bool {
        self.state == PieceState::Held
    }

    pub fn is_home(&self) -> bool {
        self.state == PieceState::Placed(self.home)
    }
}

/// Occupancy map of the movable pieces over a [`Grid`].
#[derive(Debug, Clone)]
pub struct GridOccupancy {
    pieces: Vec<Piece>,
    occupants: BTreeMap<CellId, PieceId>,
}

impl GridOccupancy {
    /// Create one piece per home cell, each placed on its home.
    pub fn new(grid: &Grid, homes: &[CellId]) -> Result<Self> {
        let mut seen = BTreeSet::new();
        let mut pieces = Vec::with_capacity(homes.len());
        let mut occupants = BTreeMap::new();

        for (index, &home) in homes.iter().enumerate() {
            let cell = grid.require(home)?;
            if !seen.insert(home) {
                return Err(KatonaError::Configuration(format!(
                    "cell {home} is listed twice as a movable piece home"
                )));
            }
            let id = PieceId(index);
            pieces.push(Piece {
                id,
                name: format!("element{home}"),
                home,
                state: PieceState::Placed(home),
                pose: cell.pose(),
                taken_from: None,
            });
            occupants.insert(home, id);
        }

        Ok(Self { pieces, occupants })
    }

    pub fn pieces(&self) -> &[Piece] {
        &self.pieces
    }

    pub fn piece(&self, id: PieceId) -> Option<&Piece> {
        self.pieces.get(id.0)
    }

    pub fn occupant(&self, cell: CellId) -> Option<PieceId> {
        self.occupants.get(&cell).copied()
    }

    pub fn is_occupied(&self, cell: CellId) -> bool {
        self.occupants.contains_key(&cell)
    }

    /// Cells that currently hold a piece, in lattice order.
    pub fn occupied_cells(&self) -> impl Iterator<Item = CellId> + '_ {
        self.occupants.keys().copied()
    }

    pub fn held(&self) -> Option<PieceId> {
        self.pieces.iter().find(|piece| piece.is_held()).map(|piece| piece.id)
    }

    /// Detach the piece on `cell`, if any, and hand it out as held.
    pub fn choose(&mut self, cell: CellId) -> Option<PieceId> {
        let id = self.occupants.remove(&cell)?;
        let piece = &mut self.pieces[id.0];
        piece.state = PieceState::Held;
        piece.taken_from = Some(cell);
        Some(id)
    }

    /// Attach a held piece to `cell`.
    ///
    /// Fails without side effects when the piece is not held, the cell is
    /// outside the lattice or occupied, or the orientations differ.
    pub fn place(&mut self, grid: &Grid, id: PieceId, cell: CellId) -> bool {
        let Some(target) = grid.cell(cell) else {
            return false;
        };
        if self.occupants.contains_key(&cell) {
            return false;
        }
        let Some(piece) = self.pieces.get_mut(id.0) else {
            return false;
        };
        if !piece.is_held() || piece.pose.orientation != target.orientation {
            return false;
        }

        piece.state = PieceState::Placed(cell);
        piece.pose = target.pose();
        self.occupants.insert(cell, id);
        true
    }

    /// Turn a held piece by 90°.
    pub fn rotate(&mut self, id: PieceId) -> bool {
        match self.pieces.get_mut(id.0) {
            Some(piece) if piece.is_held() => {
                piece.pose.orientation = piece.pose.orientation.rotated();
                true
            }
            _ => false,
        }
    }

    /// Move a held piece to follow the pointer.
    pub fn drag(&mut self, id: PieceId, position: Point) -> bool {
        match self.pieces.get_mut(id.0) {
            Some(piece) if piece.is_held() => {
                piece.pose.position = position;
                true
            }
            _ => false,
        }
    }

    /// Put every piece back on its home cell.
    ///
    /// All pieces are detached first and then re-attached home, so a piece
    /// sitting on another piece's home never ends up without a cell: it
    /// simply goes back to its own home as well.
    pub fn return_all_to_default(&mut self, grid: &Grid) -> Result<()> {
        self.occupants.clear();
        for piece in &mut self.pieces {
            let home = grid.require(piece.home)?;
            piece.state = PieceState::Placed(piece.home);
            piece.pose = home.pose();
            piece.taken_from = None;
            self.occupants.insert(piece.home, piece.id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Orientation;
    use proptest::prelude::*;

    fn setup() -> (Grid, GridOccupancy) {
        let grid = Grid::build(3, 3.0, 1.0, Point::new(0.0, 0.0)).unwrap();
        let homes = [CellId::new(1, 1), CellId::new(2, 1), CellId::new(3, 2)];
        let occupancy = GridOccupancy::new(&grid, &homes).unwrap();
        (grid, occupancy)
    }

    #[test]
    fn pieces_start_on_home_cells() {
        let (_, occupancy) = setup();
        assert_eq!(occupancy.pieces().len(), 3);
        assert!(occupancy.pieces().iter().all(Piece::is_home));
        assert_eq!(occupancy.occupant(CellId::new(2, 1)), Some(PieceId(1)));
    }

    #[test]
    fn duplicate_or_foreign_homes_are_rejected() {
        let grid = Grid::build(3, 3.0, 1.0, Point::default()).unwrap();
        assert!(matches!(
            GridOccupancy::new(&grid, &[CellId::new(1, 1), CellId::new(1, 1)]),
            Err(KatonaError::Configuration(_))
        ));
        assert!(matches!(
            GridOccupancy::new(&grid, &[CellId::new(0, 3)]),
            Err(KatonaError::CellOutOfLattice(_))
        ));
    }

    #[test]
    fn choosing_empty_cell_is_a_no_op() {
        let (_, mut occupancy) = setup();
        assert_eq!(occupancy.choose(CellId::new(0, 0)), None);
        assert!(occupancy.held().is_none());
    }

    #[test]
    fn choose_then_place_moves_piece() {
        let (grid, mut occupancy) = setup();
        let piece = occupancy.choose(CellId::new(1, 1)).unwrap();
        assert!(!occupancy.is_occupied(CellId::new(1, 1)));
        assert_eq!(occupancy.piece(piece).unwrap().taken_from, Some(CellId::new(1, 1)));

        assert!(occupancy.drag(piece, Point::new(5.0, -1.0)));
        assert!(occupancy.place(&grid, piece, CellId::new(1, 0)));

        let placed = occupancy.piece(piece).unwrap();
        assert_eq!(placed.cell(), Some(CellId::new(1, 0)));
        assert_eq!(placed.pose, grid.cell(CellId::new(1, 0)).unwrap().pose());
    }

    #[test]
    fn place_requires_free_cell_and_matching_orientation() {
        let (grid, mut occupancy) = setup();
        let piece = occupancy.choose(CellId::new(1, 1)).unwrap();

        assert!(!occupancy.place(&grid, piece, CellId::new(3, 2)), "occupied");
        assert!(!occupancy.place(&grid, piece, CellId::new(0, 1)), "horizontal");
        assert!(occupancy.piece(piece).unwrap().is_held());

        assert!(occupancy.rotate(piece));
        assert_eq!(occupancy.piece(piece).unwrap().pose.orientation, Orientation::Horizontal);
        assert!(occupancy.place(&grid, piece, CellId::new(0, 1)));
        assert!(!occupancy.rotate(piece), "placed pieces cannot rotate");
    }

    #[test]
    fn placed_piece_cannot_be_placed_again() {
        let (grid, mut occupancy) = setup();
        assert!(!occupancy.place(&grid, PieceId(0), CellId::new(1, 0)));
        assert!(!occupancy.place(&grid, PieceId(9), CellId::new(1, 0)));
    }

    #[test]
    fn reset_cascades_displaced_occupants_home() {
        let (grid, mut occupancy) = setup();
        // Move piece 0 off its home, then park piece 2 (vertical) on it.
        let first = occupancy.choose(CellId::new(1, 1)).unwrap();
        assert!(occupancy.place(&grid, first, CellId::new(1, 0)));
        let second = occupancy.choose(CellId::new(3, 2)).unwrap();
        assert!(occupancy.place(&grid, second, CellId::new(1, 1)));
        let third = occupancy.choose(CellId::new(2, 1)).unwrap();

        occupancy.return_all_to_default(&grid).unwrap();

        assert!(occupancy.pieces().iter().all(Piece::is_home));
        assert!(occupancy.held().is_none());
        assert_eq!(occupancy.occupant(CellId::new(2, 1)), Some(third));
        assert!(!occupancy.is_occupied(CellId::new(1, 0)));
        assert_eq!(occupancy.occupied_cells().count(), 3);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Choose(usize, usize),
        Place(usize, usize),
        Rotate,
        Reset,
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0usize..7, 0usize..4).prop_map(|(r, c)| Op::Choose(r, c)),
            (0usize..7, 0usize..4).prop_map(|(r, c)| Op::Place(r, c)),
            Just(Op::Rotate),
            Just(Op::Reset),
        ]
    }

    proptest! {
        #[test]
        fn occupancy_stays_one_to_one(ops in prop::collection::vec(op(), 0..60)) {
            let (grid, mut occupancy) = setup();
            for op in ops {
                match op {
                    Op::Choose(r, c) => { occupancy.choose(CellId::new(r, c)); }
                    Op::Place(r, c) => {
                        if let Some(piece) = occupancy.held() {
                            occupancy.place(&grid, piece, CellId::new(r, c));
                        }
                    }
                    Op::Rotate => {
                        if let Some(piece) = occupancy.held() {
                            occupancy.rotate(piece);
                        }
                    }
                    Op::Reset => occupancy.return_all_to_default(&grid).unwrap(),
                }

                let placed: Vec<CellId> = occupancy.pieces().iter().filter_map(Piece::cell).collect();
                let unique: BTreeSet<CellId> = placed.iter().copied().collect();
                prop_assert_eq!(unique.len(), placed.len());
                prop_assert_eq!(occupancy.occupied_cells().count(), placed.len());
                for piece in occupancy.pieces() {
                    if let Some(cell) = piece.cell() {
                        prop_assert_eq!(occupancy.occupant(cell), Some(piece.id));
                        prop_assert_eq!(piece.pose, grid.cell(cell).unwrap().pose());
                    }
                }
            }
        }
    }
}
