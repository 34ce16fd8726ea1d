use thiserror::Error;

use crate::cell::Coord;
use crate::engine::SearchState;

/// Rejected map input. Raised once at grid construction; nothing about the
/// attempt is recoverable afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidMapError {
    #[error("map has no cells")]
    EmptyMap,

    #[error("row {row} has {found} columns, expected {expected}")]
    RaggedRow {
        row: usize,
        found: usize,
        expected: usize,
    },

    #[error("unknown terrain code {code} at {coord}")]
    UnknownTerrainCode { code: i32, coord: Coord },

    #[error("start {0} is out of bounds")]
    StartOutOfBounds(Coord),

    #[error("goal {0} is out of bounds")]
    GoalOutOfBounds(Coord),

    #[error("start {0} is an obstacle")]
    StartBlocked(Coord),

    #[error("goal {0} is an obstacle")]
    GoalBlocked(Coord),
}

/// A state-machine contract violation: the engine was asked to do something
/// its current state does not allow, e.g. stepping a finished search
/// without resetting it first. Note that an exhausted search is *not* an
/// error; "no path" is reported as an empty path value.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("engine is {found:?} but {expected:?} is required; call reset() first")]
pub struct IllegalStateError {
    pub found: SearchState,
    pub expected: SearchState,
}
