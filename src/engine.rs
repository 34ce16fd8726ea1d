use std::ops::ControlFlow;

use fxhash::FxBuildHasher;
use indexmap::IndexSet;
use log::{info, warn};

use crate::cell::{CellState, Coord};
use crate::error::IllegalStateError;
use crate::frontier::Frontier;
use crate::grid::TerrainGrid;

type FxIndexSet<T> = IndexSet<T, FxBuildHasher>;

/// Where the engine is in its lifecycle. The terminal states are only left
/// through [reset](AstarEngine::reset).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SearchState {
    #[default]
    Ready,
    Running,
    Succeeded,
    Failed,
}

/// A* search over a [TerrainGrid], driven one expansion at a time.
///
/// The engine owns the frontier and the closed set but borrows the grid per
/// call, so a driver is free to read cell states between steps. A full run
/// looks like
///
/// ```
/// use grid_astar::{AstarEngine, Coord, TerrainGrid};
///
/// let codes = vec![vec![1, 1, 1], vec![1, -1, 1], vec![1, 1, 1]];
/// let mut grid = TerrainGrid::from_codes(&codes, Coord::new(0, 0), Coord::new(2, 2)).unwrap();
/// let mut engine = AstarEngine::new();
/// let path = engine.run(&mut grid).unwrap();
/// assert_eq!(path.len(), 5);
/// ```
///
/// "No path exists" is a normal outcome reported as an empty path, never an
/// error. The closed set is kept in insertion order, so
/// [expanded](AstarEngine::expanded) doubles as the exact expansion sequence.
#[derive(Clone, Debug, Default)]
pub struct AstarEngine {
    state: SearchState,
    frontier: Frontier,
    closed: FxIndexSet<Coord>,
    path: Vec<Coord>,
}

impl AstarEngine {
    pub fn new() -> AstarEngine {
        AstarEngine::default()
    }

    pub fn state(&self) -> SearchState {
        self.state
    }

    /// The found path, start to goal inclusive. Empty unless the engine is
    /// in [SearchState::Succeeded].
    pub fn path(&self) -> &[Coord] {
        &self.path
    }

    /// Coordinates expanded so far, in expansion order.
    pub fn expanded(&self) -> impl ExactSizeIterator<Item = &Coord> {
        self.closed.iter()
    }

    /// Read access to the open set, for inspection between steps.
    pub fn frontier(&self) -> &Frontier {
        &self.frontier
    }

    /// Arms a run: clears grid bookkeeping and the engine's own state, seeds
    /// the start cell and pushes it onto the frontier. Only legal from
    /// [SearchState::Ready].
    pub fn begin(&mut self, grid: &mut TerrainGrid) -> Result<(), IllegalStateError> {
        if self.state != SearchState::Ready {
            return Err(IllegalStateError {
                found: self.state,
                expected: SearchState::Ready,
            });
        }
        grid.reset();
        self.frontier.clear();
        self.closed.clear();
        self.path.clear();

        let start = grid.start();
        let goal = grid.goal();
        info!("searching from {} to {}", start, goal);
        let h_value = start.manhattan_distance(&goal);
        let cell = grid.cell_mut(start);
        cell.set_costs(0, h_value);
        cell.set_state(CellState::Open);
        self.frontier.push(start, cell.f_value());
        self.state = SearchState::Running;
        Ok(())
    }

    /// One expansion: pops the cheapest frontier cell, closes it, and either
    /// finishes (goal reached, or frontier exhausted) or relaxes its
    /// neighbours. Returns the state the step left the engine in. Only legal
    /// from [SearchState::Running].
    pub fn step(&mut self, grid: &mut TerrainGrid) -> Result<SearchState, IllegalStateError> {
        if self.state != SearchState::Running {
            return Err(IllegalStateError {
                found: self.state,
                expected: SearchState::Running,
            });
        }
        let Some(current) = self.frontier.pop_min() else {
            self.state = SearchState::Failed;
            if grid.reachable(&grid.start(), &grid.goal()) {
                warn!(
                    "frontier drained although components say {} is reachable",
                    grid.goal()
                );
            }
            return Ok(self.state);
        };
        self.closed.insert(current);
        grid.cell_mut(current).set_state(CellState::Closed);

        let goal = grid.goal();
        if current == goal {
            self.path = reconstruct_path(grid, current);
            self.state = SearchState::Succeeded;
            info!(
                "goal {} reached at cost {}",
                goal,
                grid.cell(current).g_value()
            );
            return Ok(self.state);
        }

        let current_g = grid.cell(current).g_value();
        for neighbor in grid.neighbors_of(current) {
            if self.closed.contains(&neighbor) {
                continue;
            }
            let tentative_g = current_g + grid.cell(neighbor).terrain_cost();
            let cell = grid.cell(neighbor);
            if cell.state() != CellState::Unvisited && tentative_g >= cell.g_value() {
                continue;
            }
            let h_value = neighbor.manhattan_distance(&goal);
            let cell = grid.cell_mut(neighbor);
            cell.set_costs(tentative_g, h_value);
            cell.set_parent(current);
            cell.set_state(CellState::Open);
            // A cheaper route to an already-open cell re-enters the frontier
            // with its new priority; the stale entry is dropped on pop.
            self.frontier.push(neighbor, cell.f_value());
        }
        Ok(self.state)
    }

    /// Drives a full run to a terminal state. Equivalent to
    /// [run_observed](AstarEngine::run_observed) with an observer that never
    /// breaks.
    pub fn run(&mut self, grid: &mut TerrainGrid) -> Result<Vec<Coord>, IllegalStateError> {
        self.run_observed(grid, |_| ControlFlow::Continue(()))
    }

    /// Drives a full run, invoking `observer` after every expansion step and
    /// once per cell while the final path is marked. The observer sees the
    /// grid's cell states only; breaking abandons the run mid-flight (the
    /// engine stays [SearchState::Running] and the next
    /// [reset](AstarEngine::reset) clears the leftovers).
    ///
    /// Returns the path, empty on failure or abandonment.
    pub fn run_observed<F>(
        &mut self,
        grid: &mut TerrainGrid,
        mut observer: F,
    ) -> Result<Vec<Coord>, IllegalStateError>
    where
        F: FnMut(&TerrainGrid) -> ControlFlow<()>,
    {
        self.begin(grid)?;
        while self.step(grid)? == SearchState::Running {
            if observer(grid).is_break() {
                info!("search abandoned by observer");
                return Ok(Vec::new());
            }
        }
        if self.state == SearchState::Succeeded {
            self.mark_path(grid, &mut observer);
        }
        Ok(self.path.clone())
    }

    /// Flips the cells of the found path to [CellState::OnPath], invoking
    /// the observer once per cell so a renderer can trace the route
    /// appearing. Does nothing unless a path was found.
    pub fn mark_path<F>(&self, grid: &mut TerrainGrid, observer: &mut F)
    where
        F: FnMut(&TerrainGrid) -> ControlFlow<()>,
    {
        for &coord in &self.path {
            grid.cell_mut(coord).set_state(CellState::OnPath);
            if observer(grid).is_break() {
                break;
            }
        }
    }

    /// Returns the engine to [SearchState::Ready] for a fresh run. Grid
    /// bookkeeping is cleared by the next [begin](AstarEngine::begin).
    pub fn reset(&mut self) {
        self.state = SearchState::Ready;
        self.frontier.clear();
        self.closed.clear();
        self.path.clear();
    }
}

/// Follows parent links back from the goal, then reverses into start-to-goal
/// order.
fn reconstruct_path(grid: &TerrainGrid, goal: Coord) -> Vec<Coord> {
    let mut path: Vec<Coord> = itertools::unfold(Some(goal), |cursor| {
        cursor.map(|coord| {
            *cursor = grid.cell(coord).parent();
            coord
        })
    })
    .collect();
    path.reverse();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::OBSTACLE_CODE;

    fn uniform(rows: usize, cols: usize) -> Vec<Vec<i32>> {
        vec![vec![1; cols]; rows]
    }

    fn grid_3x3() -> TerrainGrid {
        TerrainGrid::from_codes(&uniform(3, 3), Coord::new(0, 0), Coord::new(2, 2)).unwrap()
    }

    fn path_cost(grid: &TerrainGrid, path: &[Coord]) -> i32 {
        path.iter()
            .skip(1)
            .map(|&c| grid.cell(c).terrain_cost())
            .sum()
    }

    fn assert_valid_path(grid: &TerrainGrid, path: &[Coord]) {
        assert_eq!(path[0], grid.start());
        assert_eq!(*path.last().unwrap(), grid.goal());
        for pair in path.windows(2) {
            assert_eq!(pair[0].manhattan_distance(&pair[1]), 1);
            assert!(grid.is_passable(pair[1]));
        }
    }

    #[test]
    fn finds_shortest_path_on_open_grid() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_eq!(engine.state(), SearchState::Succeeded);
        assert_eq!(path.len(), 5);
        assert_valid_path(&grid, &path);
        assert_eq!(path_cost(&grid, &path), 4);
        assert_eq!(grid.cell(grid.goal()).g_value(), 4);
    }

    #[test]
    fn routes_through_the_gap() {
        // S#1
        // 1#1
        // 11G   (wall at column 1, rows 0-1; row 2 open)
        let mut codes = uniform(3, 3);
        codes[0][1] = OBSTACLE_CODE;
        codes[1][1] = OBSTACLE_CODE;
        let mut grid =
            TerrainGrid::from_codes(&codes, Coord::new(0, 0), Coord::new(2, 2)).unwrap();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_valid_path(&grid, &path);
        assert!(path.contains(&Coord::new(2, 1)));
        assert_eq!(path_cost(&grid, &path), 4);
    }

    #[test]
    fn walled_off_goal_fails_with_empty_path() {
        let mut codes = uniform(3, 3);
        for row in 0..3 {
            codes[row][1] = OBSTACLE_CODE;
        }
        let mut grid =
            TerrainGrid::from_codes(&codes, Coord::new(0, 0), Coord::new(2, 2)).unwrap();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_eq!(engine.state(), SearchState::Failed);
        assert!(path.is_empty());
        assert!(engine.path().is_empty());
        assert!(engine.frontier().is_empty());
    }

    #[test]
    fn expensive_terrain_is_detoured() {
        // S41
        // 141
        // 11G   (a ridge of cost-4 cells down column 1)
        let mut codes = uniform(3, 3);
        codes[0][1] = 4;
        codes[1][1] = 4;
        let mut grid =
            TerrainGrid::from_codes(&codes, Coord::new(0, 0), Coord::new(2, 2)).unwrap();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        // Around the ridge through (2, 1): four unit steps.
        assert_eq!(path_cost(&grid, &path), 4);
        assert!(!path.contains(&Coord::new(0, 1)));
        assert!(!path.contains(&Coord::new(1, 1)));
    }

    #[test]
    fn reprioritized_cell_keeps_the_search_optimal() {
        // A frontier cell first discovered through expensive terrain must be
        // expanded with its later, cheaper cost.
        // S41
        // 441
        // 11G
        let codes = vec![vec![1, 4, 1], vec![4, 4, 1], vec![1, 1, 1]];
        let mut grid =
            TerrainGrid::from_codes(&codes, Coord::new(0, 0), Coord::new(2, 2)).unwrap();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_valid_path(&grid, &path);
        assert_eq!(path_cost(&grid, &path), grid.cell(grid.goal()).g_value());
    }

    #[test]
    fn start_equals_goal() {
        let mut grid =
            TerrainGrid::from_codes(&uniform(2, 2), Coord::new(1, 1), Coord::new(1, 1)).unwrap();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_eq!(path, vec![Coord::new(1, 1)]);
        assert_eq!(grid.cell(grid.goal()).g_value(), 0);
    }

    #[test]
    fn stepping_outside_running_is_rejected() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let err = engine.step(&mut grid).unwrap_err();
        assert_eq!(err.found, SearchState::Ready);
        assert_eq!(err.expected, SearchState::Running);

        engine.run(&mut grid).unwrap();
        assert!(engine.step(&mut grid).is_err());
        assert!(engine.begin(&mut grid).is_err());

        engine.reset();
        assert_eq!(engine.state(), SearchState::Ready);
        engine.begin(&mut grid).unwrap();
        assert!(engine.begin(&mut grid).is_err());
    }

    #[test]
    fn stepwise_drive_matches_run() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        engine.begin(&mut grid).unwrap();
        while engine.step(&mut grid).unwrap() == SearchState::Running {}
        let stepped: Vec<Coord> = engine.path().to_vec();

        let mut grid2 = grid_3x3();
        let mut engine2 = AstarEngine::new();
        let ran = engine2.run(&mut grid2).unwrap();
        assert_eq!(stepped, ran);
    }

    #[test]
    fn rerun_after_reset_is_identical() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let first = engine.run(&mut grid).unwrap();
        let first_order: Vec<Coord> = engine.expanded().copied().collect();

        engine.reset();
        let second = engine.run(&mut grid).unwrap();
        let second_order: Vec<Coord> = engine.expanded().copied().collect();

        assert_eq!(first, second);
        assert_eq!(first_order, second_order);
    }

    #[test]
    fn cell_states_reflect_the_finished_search() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        for coord in &path {
            assert_eq!(grid.cell(*coord).state(), CellState::OnPath);
        }
        for coord in engine.expanded() {
            let state = grid.cell(*coord).state();
            assert!(state == CellState::Closed || state == CellState::OnPath);
        }
        let on_path = grid
            .iter_cells()
            .filter(|c| c.state() == CellState::OnPath)
            .count();
        assert_eq!(on_path, path.len());
    }

    #[test]
    fn observer_fires_per_expansion_and_per_path_cell() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let mut calls = 0usize;
        let path = engine
            .run_observed(&mut grid, |_| {
                calls += 1;
                ControlFlow::Continue(())
            })
            .unwrap();
        // One call per non-terminal expansion plus one per marked path cell.
        let expansions = engine.expanded().len();
        assert_eq!(calls, (expansions - 1) + path.len());
    }

    #[test]
    fn observer_break_abandons_the_run() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let path = engine
            .run_observed(&mut grid, |_| ControlFlow::Break(()))
            .unwrap();
        assert!(path.is_empty());
        assert_eq!(engine.state(), SearchState::Running);
        // The abandoned run is cleaned up by the usual reset.
        engine.reset();
        let retry = engine.run(&mut grid).unwrap();
        assert_eq!(retry.len(), 5);
    }

    #[test]
    fn parents_chain_back_to_start() {
        let mut grid = grid_3x3();
        let mut engine = AstarEngine::new();
        let path = engine.run(&mut grid).unwrap();
        assert_eq!(grid.cell(grid.start()).parent(), None);
        for pair in path.windows(2) {
            assert_eq!(grid.cell(pair[1]).parent(), Some(pair[0]));
        }
    }
}
