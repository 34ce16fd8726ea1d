use core::fmt;

use log::info;
use petgraph::unionfind::UnionFind;
use smallvec::SmallVec;

use crate::cell::{Cell, Coord};
use crate::error::InvalidMapError;

/// Terrain code marking an impassable cell.
pub const OBSTACLE_CODE: i32 = -1;
/// Lowest traversal cost a passable cell can carry.
pub const MIN_TERRAIN_COST: i32 = 1;
/// Highest traversal cost a passable cell can carry.
pub const MAX_TERRAIN_COST: i32 = 4;

/// A fixed-size rectangular grid of [Cell]s with distinguished `start` and
/// `goal` coordinates.
///
/// Cells live in a flat row-major [Vec]; parent back-references used for
/// path reconstruction are plain coordinates into that storage, so there are
/// no ownership cycles between cells. A [UnionFind] over the passable cells
/// is built once at construction (terrain never changes afterwards) and
/// answers reachability queries without running a search.
#[derive(Clone, Debug)]
pub struct TerrainGrid {
    cells: Vec<Cell>,
    rows: i32,
    cols: i32,
    start: Coord,
    goal: Coord,
    components: UnionFind<usize>,
}

impl TerrainGrid {
    /// Builds a grid from decoded terrain codes: `1` is normal terrain,
    /// `2`..`4` cost progressively more to enter, `-1` is an obstacle.
    /// Fails on empty or ragged input, unknown codes, and a start or goal
    /// that is out of bounds or sits on an obstacle.
    pub fn from_codes(
        codes: &[Vec<i32>],
        start: Coord,
        goal: Coord,
    ) -> Result<TerrainGrid, InvalidMapError> {
        let rows = codes.len();
        let cols = codes.first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 {
            return Err(InvalidMapError::EmptyMap);
        }
        let mut cells = Vec::with_capacity(rows * cols);
        for (row, row_codes) in codes.iter().enumerate() {
            if row_codes.len() != cols {
                return Err(InvalidMapError::RaggedRow {
                    row,
                    found: row_codes.len(),
                    expected: cols,
                });
            }
            for (col, &code) in row_codes.iter().enumerate() {
                let coord = Coord::new(row as i32, col as i32);
                cells.push(match code {
                    OBSTACLE_CODE => Cell::obstacle(coord),
                    MIN_TERRAIN_COST..=MAX_TERRAIN_COST => Cell::passable(coord, code),
                    _ => return Err(InvalidMapError::UnknownTerrainCode { code, coord }),
                });
            }
        }
        let mut grid = TerrainGrid {
            cells,
            rows: rows as i32,
            cols: cols as i32,
            start,
            goal,
            components: UnionFind::new(rows * cols),
        };
        if !grid.in_bounds(start) {
            return Err(InvalidMapError::StartOutOfBounds(start));
        }
        if !grid.in_bounds(goal) {
            return Err(InvalidMapError::GoalOutOfBounds(goal));
        }
        if grid.cell(start).is_obstacle() {
            return Err(InvalidMapError::StartBlocked(start));
        }
        if grid.cell(goal).is_obstacle() {
            return Err(InvalidMapError::GoalBlocked(goal));
        }
        grid.generate_components();
        Ok(grid)
    }

    pub fn rows(&self) -> i32 {
        self.rows
    }

    pub fn cols(&self) -> i32 {
        self.cols
    }

    pub fn start(&self) -> Coord {
        self.start
    }

    pub fn goal(&self) -> Coord {
        self.goal
    }

    pub fn in_bounds(&self, coord: Coord) -> bool {
        coord.row >= 0 && coord.col >= 0 && coord.row < self.rows && coord.col < self.cols
    }

    /// In bounds and not an obstacle.
    pub fn is_passable(&self, coord: Coord) -> bool {
        self.in_bounds(coord) && !self.cell(coord).is_obstacle()
    }

    fn get_ix(&self, coord: Coord) -> usize {
        (coord.row * self.cols + coord.col) as usize
    }

    /// Panics when `coord` is out of bounds.
    pub fn cell(&self, coord: Coord) -> &Cell {
        &self.cells[self.get_ix(coord)]
    }

    pub(crate) fn cell_mut(&mut self, coord: Coord) -> &mut Cell {
        let ix = self.get_ix(coord);
        &mut self.cells[ix]
    }

    /// Passable orthogonal neighbours of `coord`, enumerated in the fixed
    /// order down, up, right, left. Out-of-bounds positions and obstacles
    /// never appear.
    pub fn neighbors_of(&self, coord: Coord) -> SmallVec<[Coord; 4]> {
        coord
            .orthogonal_neighborhood()
            .into_iter()
            .filter(|&c| self.is_passable(c))
            .collect()
    }

    /// Clears every cell's search bookkeeping without altering terrain.
    pub fn reset(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
    }

    /// Row-major iteration over all cells, for observers that want to draw
    /// the whole grid.
    pub fn iter_cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    /// Retrieves the component id a given coordinate belongs to.
    pub fn get_component(&self, coord: &Coord) -> usize {
        self.components.find(self.get_ix(*coord))
    }

    /// Checks if `a` and `b` are on the same component.
    pub fn reachable(&self, a: &Coord, b: &Coord) -> bool {
        !self.unreachable(a, b)
    }

    /// Checks if `a` and `b` are not on the same component.
    pub fn unreachable(&self, a: &Coord, b: &Coord) -> bool {
        if self.is_passable(*a) && self.is_passable(*b) {
            !self.components.equiv(self.get_ix(*a), self.get_ix(*b))
        } else {
            true
        }
    }

    /// Generates a new [UnionFind] structure and links orthogonally adjacent
    /// passable cells into the same components.
    fn generate_components(&mut self) {
        info!("generating connected components");
        self.components = UnionFind::new((self.rows * self.cols) as usize);
        for row in 0..self.rows {
            for col in 0..self.cols {
                let coord = Coord::new(row, col);
                if !self.is_passable(coord) {
                    continue;
                }
                let ix = self.get_ix(coord);
                // Down and right cover every orthogonal edge exactly once.
                for next in [Coord::new(row + 1, col), Coord::new(row, col + 1)] {
                    if self.is_passable(next) {
                        let next_ix = self.get_ix(next);
                        self.components.union(ix, next_ix);
                    }
                }
            }
        }
    }
}

impl fmt::Display for TerrainGrid {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for row in 0..self.rows {
            for col in 0..self.cols {
                let coord = Coord::new(row, col);
                if coord == self.start {
                    write!(f, "S")?;
                } else if coord == self.goal {
                    write!(f, "G")?;
                } else if self.cell(coord).is_obstacle() {
                    write!(f, "#")?;
                } else {
                    write!(f, "{}", self.cell(coord).terrain_cost())?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
