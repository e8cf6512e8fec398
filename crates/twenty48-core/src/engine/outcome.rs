use serde::Serialize;

use super::grid::{Grid, Score, Tile};

/// A single merge: the final coordinates of the merged tile and its new value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MergeEvent {
    pub row: usize,
    pub col: usize,
    pub value: Tile,
}

/// Result of sliding a grid in one direction, before any tile is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MoveOutcome {
    /// Grid after slide, merge and compaction.
    pub grid: Grid,
    /// Whether any cell differs from the input grid.
    pub changed: bool,
    /// Sum of the values of all tiles created by merges.
    pub score_delta: Score,
    /// Merges in discovery order: lines by index, then direction of travel.
    pub merges: Vec<MergeEvent>,
    /// Some merge produced a tile at or above the winning threshold.
    pub reached_winning_value: bool,
}

impl MoveOutcome {
    /// Largest tile created by this move, if any merge happened.
    pub fn largest_merge(&self) -> Option<Tile> {
        self.merges.iter().map(|m| m.value).max()
    }
}
