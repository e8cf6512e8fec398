//! Engine module: compact 2048 grid, pure move/merge ops, and a
//! precomputed line table. Public API stays small and ergonomic.
//!
//! - `Grid` is the packed 4x4 state with useful methods.
//! - Free functions mirror the methods when convenient (e.g., `apply_move`).
//! - Internals (line table and hot ops) live in submodules to keep things tidy.

pub mod grid;
mod ops;
pub mod outcome;
mod tables;

pub use grid::{
    CELLS, Direction, Grid, GridError, MAX_EXPONENT, SIZE, Score, Tile, TilesIter, WINNING_TILE,
};
pub use outcome::{MergeEvent, MoveOutcome};

pub use ops::{
    apply_move, apply_move_with_goal, count_empty, get_highest_tile_val, has_legal_move,
    initialize, initialize_with, place_random_tile,
};

/// Initialize the precomputed line table ahead of the first move.
/// Safe to call multiple times; moves initialize it lazily otherwise.
pub fn new() {
    tables::init();
}
