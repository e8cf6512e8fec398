use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ops;
use super::outcome::MoveOutcome;

// Internal type aliases for packed representation
pub(crate) type GridRaw = u64;
pub(crate) type Line = u16;
pub(crate) type Exponent = u8;

/// Accumulated or per-move score.
pub type Score = u64;
/// A tile's face value (0 for an empty cell).
pub type Tile = u32;

/// Side length of the square grid.
pub const SIZE: usize = 4;
/// Number of cells on the grid.
pub const CELLS: usize = SIZE * SIZE;
/// Largest exponent a packed cell can hold (2^15 = 32768).
pub const MAX_EXPONENT: Exponent = 15;
/// Tile value that triggers the win prompt.
pub const WINNING_TILE: Tile = 2048;

/// A direction to move/merge tiles.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// All four directions in canonical UDLR order.
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rejected tile values when building a grid from face values.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GridError {
    #[error("tile {value} at ({row}, {col}) is not a power of two >= 2")]
    NotPowerOfTwo { row: usize, col: usize, value: Tile },
    #[error("tile {value} at ({row}, {col}) exceeds the largest tile 32768")]
    TooLarge { row: usize, col: usize, value: Tile },
}

/// Packed 4x4 grid as 16 4-bit exponents in a `u64`.
///
/// Cell `(0, 0)` lives in the most significant nibble, row-major. An
/// exponent of 0 means empty, 1 means a 2 tile, 2 a 4 tile, and so on.
/// `Grid` is `Copy`: every operation takes a snapshot and returns a new one.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "[[Tile; SIZE]; SIZE]", into = "[[Tile; SIZE]; SIZE]")]
pub struct Grid(pub(crate) GridRaw);

impl Grid {
    /// A constant empty grid (all zeros).
    pub const EMPTY: Grid = Grid(0);

    /// Construct a `Grid` from its raw packed representation.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Grid(raw)
    }

    /// Borrow the raw packed `u64` for this `Grid`.
    #[inline]
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Build a grid from face values, panicking on anything that is not an
    /// empty cell or a power of two between 2 and 32768.
    ///
    /// ```
    /// use twenty48_core::engine::Grid;
    /// let g = Grid::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
    /// assert_eq!(g.get(0, 1), 2);
    /// ```
    pub fn from_rows(rows: [[Tile; SIZE]; SIZE]) -> Self {
        match Grid::try_from(rows) {
            Ok(grid) => grid,
            Err(err) => panic!("invalid grid: {err}"),
        }
    }

    /// Face values, row by row.
    pub fn rows(self) -> [[Tile; SIZE]; SIZE] {
        let mut rows = [[0; SIZE]; SIZE];
        for (idx, value) in self.tiles().enumerate() {
            rows[idx / SIZE][idx % SIZE] = value;
        }
        rows
    }

    /// Face value at `(row, col)`; 0 when empty.
    #[inline]
    pub fn get(self, row: usize, col: usize) -> Tile {
        self.tile_value(row * SIZE + col)
    }

    /// Face value at row-major index `idx` (0..16); 0 when empty.
    #[inline]
    pub fn tile_value(self, idx: usize) -> Tile {
        exponent_to_value(ops::get_exponent(self.0, idx))
    }

    /// Slide and merge toward `direction` without spawning a tile.
    ///
    /// ```
    /// use twenty48_core::engine::{Direction, Grid};
    /// let g = Grid::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
    /// let out = g.apply_move(Direction::Left);
    /// assert_eq!(out.grid.rows()[0], [4, 0, 0, 0]);
    /// assert_eq!(out.score_delta, 4);
    /// ```
    #[inline]
    pub fn apply_move(self, direction: Direction) -> MoveOutcome {
        ops::apply_move(self, direction)
    }

    /// Insert a random 2 (90%) or 4 (10%) tile into a random empty slot,
    /// using the provided RNG. A full grid is returned unchanged.
    ///
    /// ```
    /// use twenty48_core::engine::Grid;
    /// use rand::{SeedableRng, rngs::StdRng};
    /// let mut rng = StdRng::seed_from_u64(123);
    /// let g = Grid::EMPTY.with_random_tile(&mut rng).with_random_tile(&mut rng);
    /// assert_eq!(g.count_empty(), 14);
    /// ```
    #[inline]
    pub fn with_random_tile<R: Rng + ?Sized>(self, rng: &mut R) -> Self {
        ops::place_random_tile(self, rng)
    }

    /// True while a move can still change the grid.
    #[inline]
    pub fn has_legal_move(self) -> bool {
        ops::has_legal_move(self)
    }

    /// Return the highest tile value present on the grid (0 when empty).
    #[inline]
    pub fn highest_tile(self) -> Tile {
        ops::get_highest_tile_val(self)
    }

    /// Count the number of empty cells on the grid.
    #[inline]
    pub fn count_empty(self) -> usize {
        ops::count_empty(self)
    }

    /// Sum of all face values on the grid.
    pub fn tile_sum(self) -> Score {
        self.tiles().map(Score::from).sum()
    }

    /// Iterate over face values in row-major order.
    #[inline]
    pub fn tiles(self) -> TilesIter {
        TilesIter {
            raw: self.0,
            idx: 0,
        }
    }

    /// Copy of this grid with the cell at row-major `idx` set to `exp`.
    #[inline]
    pub(crate) fn with_exponent(self, idx: usize, exp: Exponent) -> Self {
        let shift = ops::nibble_shift(idx);
        Grid((self.0 & !(0xf << shift)) | ((exp as GridRaw) << shift))
    }
}

impl TryFrom<[[Tile; SIZE]; SIZE]> for Grid {
    type Error = GridError;

    fn try_from(rows: [[Tile; SIZE]; SIZE]) -> Result<Self, Self::Error> {
        let mut grid = Grid::EMPTY;
        for (row, cells) in rows.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                if value == 0 {
                    continue;
                }
                if value == 1 || !value.is_power_of_two() {
                    return Err(GridError::NotPowerOfTwo { row, col, value });
                }
                let exp = value.trailing_zeros() as Exponent;
                if exp > MAX_EXPONENT {
                    return Err(GridError::TooLarge { row, col, value });
                }
                grid = grid.with_exponent(row * SIZE + col, exp);
            }
        }
        Ok(grid)
    }
}

impl From<Grid> for [[Tile; SIZE]; SIZE] {
    fn from(grid: Grid) -> Self {
        grid.rows()
    }
}

impl fmt::Debug for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Grid({:#018x})", self.0)
    }
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells: Vec<String> = self.tiles().map(format_val).collect();
        for (row, chunk) in cells.chunks(SIZE).enumerate() {
            if row > 0 {
                writeln!(f, "{}", "-".repeat(SIZE * 8 - 1))?;
            }
            writeln!(f, "{}", chunk.join("|"))?;
        }
        Ok(())
    }
}

/// Iterator over grid face values in row-major order.
pub struct TilesIter {
    raw: GridRaw,
    idx: usize,
}

impl Iterator for TilesIter {
    type Item = Tile;
    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        if self.idx >= CELLS {
            return None;
        }
        let value = exponent_to_value(ops::get_exponent(self.raw, self.idx));
        self.idx += 1;
        Some(value)
    }
}

impl IntoIterator for Grid {
    type Item = Tile;
    type IntoIter = TilesIter;
    #[inline]
    fn into_iter(self) -> Self::IntoIter {
        self.tiles()
    }
}

#[inline]
pub(crate) fn exponent_to_value(exp: Exponent) -> Tile {
    if exp == 0 { 0 } else { 1 << exp }
}

// Centered in a 7-wide cell, blank when empty.
fn format_val(value: Tile) -> String {
    if value == 0 {
        " ".repeat(7)
    } else {
        format!("{value:^7}")
    }
}
