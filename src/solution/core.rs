use std::collections::BTreeSet;

use crate::error::{KatonaError, Result};
use crate::geometry::CellId;
use crate::occupancy::PieceId;

/// A named target configuration: the home cells that must be vacated and
/// the cells that must be filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionPattern {
    pub name: String,
    pub origins: Vec<CellId>,
    pub destinations: Vec<CellId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveRecord {
    pub piece: PieceId,
    pub from: CellId,
    pub to: CellId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict<'a> {
    /// Fewer or more net moves than a solution needs.
    Incomplete,
    Solved(&'a str),
    /// The right number of net moves, but no pattern matches.
    Wrong,
}

/// Tracks the net effect of the moves made since the last reset and matches
/// it against the solution catalogue.
///
/// Moves are folded into two sets: home cells that are currently vacated
/// (`taken`) and non-home cells that are currently filled (`placed`). Moving
/// a piece back where it came from cancels out, so the move count the
/// interpreter compares against is the number of net moves.
#[derive(Debug, Clone)]
pub struct MoveSequenceInterpreter {
    patterns: Vec<SolutionPattern>,
    required_moves: usize,
    homes: BTreeSet<CellId>,
    taken: BTreeSet<CellId>,
    placed: BTreeSet<CellId>,
    history: Vec<MoveRecord>,
}

impl MoveSequenceInterpreter {
    pub fn new(
        patterns: Vec<SolutionPattern>,
        required_moves: usize,
        homes: impl IntoIterator<Item = CellId>,
    ) -> Result<Self> {
        if required_moves == 0 {
            return Err(KatonaError::Configuration(
                "a solution needs at least one move".to_string(),
            ));
        }
        if patterns.is_empty() {
            return Err(KatonaError::Configuration(
                "at least one solution pattern is required".to_string(),
            ));
        }
        let homes: BTreeSet<CellId> = homes.into_iter().collect();
        for pattern in &patterns {
            if pattern.origins.len() != required_moves
                || pattern.destinations.len() != required_moves
            {
                return Err(KatonaError::Configuration(format!(
                    "solution `{}` must list {required_moves} origins and destinations",
                    pattern.name
                )));
            }
            if let Some(cell) = pattern.origins.iter().find(|cell| !homes.contains(cell)) {
                return Err(KatonaError::Configuration(format!(
                    "solution `{}` takes from {cell}, which holds no piece",
                    pattern.name
                )));
            }
            if let Some(cell) = pattern.destinations.iter().find(|cell| homes.contains(cell)) {
                return Err(KatonaError::Configuration(format!(
                    "solution `{}` places onto {cell}, which is a home cell",
                    pattern.name
                )));
            }
        }

        Ok(Self {
            patterns,
            required_moves,
            homes,
            taken: BTreeSet::new(),
            placed: BTreeSet::new(),
            history: Vec::new(),
        })
    }

    /// Fold in one successful placement. Same-cell placements are ignored.
    pub fn record_move(&mut self, piece: PieceId, from: CellId, to: CellId) {
        if from == to {
            return;
        }
        self.taken.remove(&to);
        self.placed.remove(&from);
        if self.homes.contains(&from) {
            self.taken.insert(from);
        }
        if !self.homes.contains(&to) {
            self.placed.insert(to);
        }
        self.history.push(MoveRecord { piece, from, to });
    }

    pub fn verdict(&self) -> Verdict<'_> {
        if self.taken.len() != self.required_moves || self.placed.len() != self.required_moves {
            return Verdict::Incomplete;
        }
        self.patterns
            .iter()
            .find(|pattern| {
                pattern.origins.iter().all(|cell| self.taken.contains(cell))
                    && pattern.destinations.iter().all(|cell| self.placed.contains(cell))
            })
            .map_or(Verdict::Wrong, |pattern| Verdict::Solved(pattern.name.as_str()))
    }

    pub fn is_solved(&self) -> bool {
        matches!(self.verdict(), Verdict::Solved(_))
    }

    pub fn solution_name(&self) -> Option<&str> {
        match self.verdict() {
            Verdict::Solved(name) => Some(name),
            _ => None,
        }
    }

    /// Forget all moves. Piece positions are not touched.
    pub fn reset(&mut self) {
        self.taken.clear();
        self.placed.clear();
        self.history.clear();
    }

    pub fn moves(&self) -> &[MoveRecord] {
        &self.history
    }

    pub fn net_moves(&self) -> usize {
        self.placed.len()
    }

    pub fn required_moves(&self) -> usize {
        self.required_moves
    }

    pub fn patterns(&self) -> &[SolutionPattern] {
        &self.patterns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(row: usize, col: usize) -> CellId {
        CellId::new(row, col)
    }

    /// Reference catalogue on a 9-square lattice (center `[9,4]`).
    fn reference() -> MoveSequenceInterpreter {
        let pattern = |name: &str, origins: [(usize, usize); 3], destinations: [(usize, usize); 3]| {
            SolutionPattern {
                name: name.to_string(),
                origins: origins.iter().map(|&(r, col)| c(r, col)).collect(),
                destinations: destinations.iter().map(|&(r, col)| c(r, col)).collect(),
            }
        };
        let homes = [
            (8, 3), (9, 3), (10, 3),
            (7, 4), (6, 4), (7, 5),
            (9, 4), (8, 4), (10, 4), (9, 5),
            (8, 5), (9, 6), (10, 5),
            (11, 4), (12, 4), (11, 5),
        ]
        .map(|(r, col)| c(r, col));
        MoveSequenceInterpreter::new(
            vec![
                pattern("left", [(9, 4), (8, 3), (10, 3)], [(9, 2), (8, 2), (10, 2)]),
                pattern("right", [(9, 5), (8, 5), (10, 5)], [(9, 7), (8, 6), (10, 6)]),
                pattern("up", [(8, 4), (7, 4), (7, 5)], [(5, 4), (4, 4), (5, 5)]),
                pattern("down", [(10, 4), (11, 4), (11, 5)], [(13, 4), (14, 4), (13, 5)]),
            ],
            3,
            homes,
        )
        .unwrap()
    }

    fn feed(interpreter: &mut MoveSequenceInterpreter, moves: &[((usize, usize), (usize, usize))]) {
        for (index, &((fr, fc), (tr, tc))) in moves.iter().enumerate() {
            interpreter.record_move(PieceId(index), c(fr, fc), c(tr, tc));
        }
    }

    #[test]
    fn every_reference_pattern_solves() {
        for (name, moves) in [
            ("left", [((9, 4), (9, 2)), ((8, 3), (8, 2)), ((10, 3), (10, 2))]),
            ("right", [((9, 5), (9, 7)), ((8, 5), (8, 6)), ((10, 5), (10, 6))]),
            ("up", [((8, 4), (5, 4)), ((7, 4), (4, 4)), ((7, 5), (5, 5))]),
            ("down", [((10, 4), (13, 4)), ((11, 4), (14, 4)), ((11, 5), (13, 5))]),
        ] {
            let mut interpreter = reference();
            feed(&mut interpreter, &moves);
            assert_eq!(interpreter.solution_name(), Some(name));
        }
    }

    #[test]
    fn pairing_inside_a_pattern_does_not_matter() {
        let mut interpreter = reference();
        feed(&mut interpreter, &[((8, 3), (9, 2)), ((9, 4), (10, 2)), ((10, 3), (8, 2))]);
        assert!(interpreter.is_solved());
    }

    #[test]
    fn fewer_moves_never_solve() {
        let mut interpreter = reference();
        feed(&mut interpreter, &[((9, 4), (9, 2)), ((8, 3), (8, 2))]);
        assert_eq!(interpreter.verdict(), Verdict::Incomplete);
    }

    #[test]
    fn three_unrelated_moves_are_wrong() {
        let mut interpreter = reference();
        feed(&mut interpreter, &[((9, 4), (1, 0)), ((8, 3), (3, 0)), ((10, 3), (5, 0))]);
        assert_eq!(interpreter.verdict(), Verdict::Wrong);
        assert!(!interpreter.is_solved());
    }

    #[test]
    fn same_cell_placement_is_not_a_move() {
        let mut interpreter = reference();
        interpreter.record_move(PieceId(0), c(9, 4), c(9, 4));
        assert!(interpreter.moves().is_empty());
        assert_eq!(interpreter.net_moves(), 0);
    }

    #[test]
    fn moving_back_home_cancels_out() {
        let mut interpreter = reference();
        feed(&mut interpreter, &[((9, 4), (9, 2)), ((8, 3), (8, 2)), ((10, 3), (1, 0))]);
        interpreter.record_move(PieceId(2), c(1, 0), c(10, 3));
        assert_eq!(interpreter.net_moves(), 2);
        interpreter.record_move(PieceId(2), c(10, 3), c(10, 2));
        assert_eq!(interpreter.solution_name(), Some("left"));
        assert_eq!(interpreter.moves().len(), 5);
    }

    #[test]
    fn reset_clears_moves_and_allows_resolving() {
        let mut interpreter = reference();
        let solution = [((9, 4), (9, 2)), ((8, 3), (8, 2)), ((10, 3), (10, 2))];
        feed(&mut interpreter, &solution);
        interpreter.reset();
        assert!(!interpreter.is_solved());
        assert!(interpreter.moves().is_empty());

        feed(&mut interpreter, &solution);
        assert!(interpreter.is_solved());
    }

    #[test]
    fn malformed_catalogue_is_a_configuration_error() {
        let homes = [c(1, 1)];
        let short = SolutionPattern {
            name: "short".into(),
            origins: vec![c(1, 1)],
            destinations: vec![],
        };
        assert!(matches!(
            MoveSequenceInterpreter::new(vec![short], 1, homes),
            Err(KatonaError::Configuration(_))
        ));
        assert!(MoveSequenceInterpreter::new(Vec::new(), 1, homes).is_err());
        let bad_origin = SolutionPattern {
            name: "bad".into(),
            origins: vec![c(0, 0)],
            destinations: vec![c(0, 1)],
        };
        assert!(MoveSequenceInterpreter::new(vec![bad_origin], 1, homes).is_err());
    }
}
