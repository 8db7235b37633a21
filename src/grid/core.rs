use std::collections::BTreeMap;

use crate::error::{KatonaError, Result};
use crate::geometry::{CellId, Orientation, Point, Pose, RelativeIndex};

/// Axis-aligned extent of a cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub left: f64,
    pub right: f64,
    pub bottom: f64,
    pub top: f64,
}

/// One slot of the lattice a piece can occupy.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub id: CellId,
    pub position: Point,
    pub orientation: Orientation,
    pub length: f64,
    pub width: f64,
}

impl Cell {
    pub fn pose(&self) -> Pose {
        Pose {
            position: self.position,
            orientation: self.orientation,
        }
    }

    pub fn bounds(&self) -> Bounds {
        let (half_x, half_y) = match self.orientation {
            Orientation::Horizontal => (self.length / 2.0, self.width / 2.0),
            Orientation::Vertical => (self.width / 2.0, self.length / 2.0),
        };
        Bounds {
            left: self.position.x - half_x,
            right: self.position.x + half_x,
            bottom: self.position.y - half_y,
            top: self.position.y + half_y,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        let bounds = self.bounds();
        point.x >= bounds.left
            && point.x <= bounds.right
            && point.y >= bounds.bottom
            && point.y <= bounds.top
    }
}

/// Lattice of `2n + 1` alternating rows for an `n × n` square field.
///
/// Even rows hold `n` horizontal cells, odd rows hold `n + 1` vertical cells.
/// Row `r` sits at `origin.y - step * r / 2` and column `c` at
/// `x + step * c`, where `step = length + width` and even rows are shifted
/// right by `width / 2 + length / 2`, so neighbouring cells share an edge.
#[derive(Debug, Clone)]
pub struct Grid {
    square_count: usize,
    cell_length: f64,
    cell_width: f64,
    origin: Point,
    cells: BTreeMap<CellId, Cell>,
}

impl Grid {
    pub fn build(
        square_count: usize,
        cell_length: f64,
        cell_width: f64,
        origin: Point,
    ) -> Result<Self> {
        if square_count % 2 != 1 {
            return Err(KatonaError::InvalidLattice(square_count));
        }
        if !(cell_length > 0.0) {
            return Err(KatonaError::Configuration(format!(
                "cell length must be positive, got {cell_length}"
            )));
        }
        if !(cell_width >= 0.0) {
            return Err(KatonaError::Configuration(format!(
                "cell width must not be negative, got {cell_width}"
            )));
        }

        let too_large = || KatonaError::LatticeTooLarge(square_count);
        let row_count = square_count
            .checked_mul(2)
            .and_then(|rows| rows.checked_add(1))
            .ok_or_else(too_large)?;
        square_count
            .checked_add(1)
            .and_then(|columns| columns.checked_mul(square_count))
            .and_then(|cells| cells.checked_mul(2))
            .ok_or_else(too_large)?;

        let step = cell_length + cell_width;
        let even_row_shift = cell_width / 2.0 + cell_length / 2.0;
        let mut cells = BTreeMap::new();

        for row in 0..row_count {
            let is_odd = row % 2 == 1;
            let (columns, orientation, x) = if is_odd {
                (square_count + 1, Orientation::Vertical, origin.x)
            } else {
                (square_count, Orientation::Horizontal, origin.x + even_row_shift)
            };
            let y = origin.y - step * row as f64 / 2.0;

            for col in 0..columns {
                let id = CellId::new(row, col);
                cells.insert(
                    id,
                    Cell {
                        id,
                        position: Point::new(x + step * col as f64, y),
                        orientation,
                        length: cell_length,
                        width: cell_width,
                    },
                );
            }
        }

        Ok(Self {
            square_count,
            cell_length,
            cell_width,
            origin,
            cells,
        })
    }

    pub fn square_count(&self) -> usize {
        self.square_count
    }

    pub fn row_count(&self) -> usize {
        self.square_count * 2 + 1
    }

    pub fn cell_length(&self) -> f64 {
        self.cell_length
    }

    pub fn cell_width(&self) -> f64 {
        self.cell_width
    }

    pub fn origin(&self) -> Point {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: CellId) -> Option<&Cell> {
        self.cells.get(&id)
    }

    /// Cells in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.values()
    }

    pub fn center(&self) -> CellId {
        CellId::new(self.square_count, self.square_count / 2)
    }

    /// Map an offset from the center cell to an absolute coordinate.
    pub fn relative_to_absolute(&self, relative: RelativeIndex) -> Result<CellId> {
        let center = self.center();
        let row = center.row as isize + relative.row;
        let col = center.col as isize + relative.col;
        let out_of_lattice =
            || KatonaError::CellOutOfLattice(format!("[{},{}] (relative)", relative.row, relative.col));

        if row < 0 || col < 0 {
            return Err(out_of_lattice());
        }
        let id = CellId::new(row as usize, col as usize);
        if self.cells.contains_key(&id) {
            Ok(id)
        } else {
            Err(out_of_lattice())
        }
    }

    pub fn require(&self, id: CellId) -> Result<&Cell> {
        self.cells
            .get(&id)
            .ok_or_else(|| KatonaError::CellOutOfLattice(id.to_string()))
    }

    /// The cell whose footprint contains `point`, if any.
    pub fn cell_at(&self, point: Point) -> Option<CellId> {
        self.cells
            .values()
            .find(|cell| cell.contains(point))
            .map(|cell| cell.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EPS: f64 = 1e-9;

    fn grid(n: usize) -> Grid {
        Grid::build(n, 0.09, 0.01, Point::new(-0.4, 0.47)).unwrap()
    }

    #[test]
    fn even_square_count_is_rejected() {
        let err = Grid::build(4, 1.0, 0.1, Point::default()).unwrap_err();
        assert!(matches!(err, KatonaError::InvalidLattice(4)));
        assert!(matches!(
            Grid::build(0, 1.0, 0.1, Point::default()),
            Err(KatonaError::InvalidLattice(0))
        ));
    }

    #[test]
    fn oversized_square_count_is_rejected() {
        let err = Grid::build(usize::MAX, 3.0, 1.0, Point::default()).unwrap_err();
        assert!(matches!(err, KatonaError::LatticeTooLarge(n) if n == usize::MAX));

        let half = usize::MAX / 2;
        assert!(half % 2 == 1);
        assert!(matches!(
            Grid::build(half, 3.0, 1.0, Point::default()),
            Err(KatonaError::LatticeTooLarge(_))
        ));
    }

    #[test]
    fn degenerate_dimensions_are_rejected() {
        assert!(matches!(
            Grid::build(3, 0.0, 0.1, Point::default()),
            Err(KatonaError::Configuration(_))
        ));
        assert!(matches!(
            Grid::build(3, 1.0, -0.1, Point::default()),
            Err(KatonaError::Configuration(_))
        ));
    }

    #[test]
    fn rows_alternate_orientation_and_width() {
        let grid = grid(3);
        assert_eq!(grid.row_count(), 7);
        let row_len = |row| grid.cells().filter(|c| c.id.row == row).count();
        assert_eq!(row_len(0), 3);
        assert_eq!(row_len(1), 4);
        assert_eq!(grid.cell(CellId::new(0, 0)).unwrap().orientation, Orientation::Horizontal);
        assert_eq!(grid.cell(CellId::new(1, 3)).unwrap().orientation, Orientation::Vertical);
        assert!(grid.cell(CellId::new(0, 3)).is_none());
    }

    #[test]
    fn reference_positions_follow_offsets() {
        let grid = grid(9);
        let first_vertical = grid.cell(CellId::new(1, 0)).unwrap();
        assert!((first_vertical.position.x - -0.4).abs() < EPS);
        assert!((first_vertical.position.y - (0.47 - 0.05)).abs() < EPS);

        let shifted = grid.cell(CellId::new(2, 1)).unwrap();
        assert!((shifted.position.x - (-0.4 + 0.05 + 0.1)).abs() < EPS);
        assert!((shifted.position.y - (0.47 - 0.1)).abs() < EPS);
    }

    #[test]
    fn relative_offsets_resolve_from_center() {
        let grid = grid(9);
        assert_eq!(grid.center(), CellId::new(9, 4));
        assert_eq!(
            grid.relative_to_absolute(RelativeIndex::new(-1, -1)).unwrap(),
            CellId::new(8, 3)
        );
        assert_eq!(
            grid.relative_to_absolute(RelativeIndex::new(0, 3)).unwrap(),
            CellId::new(9, 7)
        );
        assert!(matches!(
            grid.relative_to_absolute(RelativeIndex::new(-10, 0)),
            Err(KatonaError::CellOutOfLattice(_))
        ));
        // Even rows are one column shorter than odd rows.
        assert!(grid.relative_to_absolute(RelativeIndex::new(1, 5)).is_err());
    }

    #[test]
    fn hit_test_finds_cell_under_point() {
        let grid = grid(3);
        for cell in grid.cells() {
            assert_eq!(grid.cell_at(cell.position), Some(cell.id));
        }
        assert_eq!(grid.cell_at(Point::new(100.0, 100.0)), None);
    }

    proptest! {
        #[test]
        fn lattice_has_unique_cells_that_abut(half in 0usize..8) {
            let n = half * 2 + 1;
            let grid = Grid::build(n, 3.0, 1.0, Point::new(0.0, 0.0)).unwrap();

            prop_assert_eq!(grid.len(), 2 * n * (n + 1));

            let mut positions: Vec<(i64, i64)> = grid
                .cells()
                .map(|c| ((c.position.x * 1e6) as i64, (c.position.y * 1e6) as i64))
                .collect();
            positions.sort();
            positions.dedup();
            prop_assert_eq!(positions.len(), grid.len());

            for cell in grid.cells().filter(|c| c.orientation == Orientation::Horizontal) {
                let below = grid.cell(CellId::new(cell.id.row + 1, cell.id.col)).unwrap();
                let h = cell.bounds();
                let v = below.bounds();
                prop_assert!((h.left - v.right).abs() < EPS);
                prop_assert!((h.bottom - v.top).abs() < EPS);

                let right = grid.cell(CellId::new(cell.id.row + 1, cell.id.col + 1)).unwrap();
                prop_assert!((h.right - right.bounds().left).abs() < EPS);
            }
        }
    }
}
