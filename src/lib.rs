//! # grid_astar
//!
//! Observable [A*](https://en.wikipedia.org/wiki/A*_search_algorithm)
//! pathfinding on rectangular grids with weighted terrain. The search can be
//! driven one expansion at a time and every cell exposes its discovery state,
//! so a caller can render or inspect the algorithm mid-flight. Pre-computes
//! [connected components](https://en.wikipedia.org/wiki/Component_(graph_theory))
//! so reachability questions can be answered without flood-filling.
//!
//! The search is deterministic: neighbours are enumerated in a fixed order
//! and the frontier breaks cost ties by insertion order, so the same grid
//! always yields the same expansion sequence and the same path. The Manhattan
//! distance heuristic is admissible because every step costs at least one.
pub mod cell;
pub mod engine;
pub mod error;
pub mod frontier;
pub mod grid;

pub use cell::{Cell, CellState, Coord};
pub use engine::{AstarEngine, SearchState};
pub use error::{IllegalStateError, InvalidMapError};
pub use frontier::Frontier;
pub use grid::{TerrainGrid, MAX_TERRAIN_COST, MIN_TERRAIN_COST, OBSTACLE_CODE};
