use rand::Rng;

use super::grid::{
    CELLS, Direction, Exponent, Grid, GridRaw, Line, MAX_EXPONENT, SIZE, Score, Tile,
    WINNING_TILE, exponent_to_value,
};
use super::outcome::{MergeEvent, MoveOutcome};
use super::tables::{LineSlide, get_line_entry};

/// Slide/merge tiles toward `direction`. No randomness.
///
/// Win detection uses the standard [`WINNING_TILE`].
pub fn apply_move(grid: Grid, direction: Direction) -> MoveOutcome {
    apply_move_with_goal(grid, direction, WINNING_TILE)
}

/// Like [`apply_move`] with an explicit winning threshold.
pub fn apply_move_with_goal(grid: Grid, direction: Direction, goal: Tile) -> MoveOutcome {
    let traversal = Traversal::of(direction);
    let mut raw: GridRaw = 0;
    let mut score_delta: Score = 0;
    let mut merges = Vec::new();

    for line_idx in 0..SIZE {
        let slide = get_line_entry(traversal.read(grid, line_idx));
        for pos in 0..SIZE {
            let exp = line_nibble(slide.line, pos);
            let (row, col) = traversal.cell(line_idx, pos);
            raw |= (exp as GridRaw) << nibble_shift(row * SIZE + col);
            if slide.merged & (1 << pos) != 0 {
                merges.push(MergeEvent {
                    row,
                    col,
                    value: exponent_to_value(exp),
                });
            }
        }
        score_delta += Score::from(slide.score);
    }

    let result = Grid(raw);
    MoveOutcome {
        grid: result,
        changed: result != grid,
        score_delta,
        reached_winning_value: merges.iter().any(|m| m.value >= goal),
        merges,
    }
}

/// True if the grid has an empty cell or two equal orthogonal neighbours.
pub fn has_legal_move(grid: Grid) -> bool {
    count_empty(grid) > 0 || has_adjacent_pair(grid.0) || has_adjacent_pair(transpose(grid.0))
}

/// Insert a random 2 (90%) or 4 (10%) tile into a uniformly chosen empty
/// cell. A full grid is returned unchanged.
pub fn place_random_tile<R: Rng + ?Sized>(grid: Grid, rng: &mut R) -> Grid {
    let empty = count_empty(grid);
    if empty == 0 {
        return grid;
    }
    // Walk nibbles from the least significant end, skipping occupied cells,
    // until the `index`-th empty cell is reached.
    let mut index = rng.gen_range(0..empty);
    let mut tmp = grid.0;
    let mut tile = generate_random_tile(rng) as GridRaw;
    loop {
        while (tmp & 0xf) != 0 {
            tmp >>= 4;
            tile <<= 4;
        }
        if index == 0 {
            break;
        }
        index -= 1;
        tmp >>= 4;
        tile <<= 4;
    }
    Grid(grid.0 | tile)
}

/// Fresh grid with the standard two seed tiles.
pub fn initialize<R: Rng + ?Sized>(rng: &mut R) -> Grid {
    initialize_with(2, rng)
}

/// Fresh grid with `seed_tiles` random tiles (at most one per cell).
pub fn initialize_with<R: Rng + ?Sized>(seed_tiles: usize, rng: &mut R) -> Grid {
    (0..seed_tiles.min(CELLS)).fold(Grid::EMPTY, |grid, _| place_random_tile(grid, rng))
}

// https://stackoverflow.com/questions/38225571/count-number-of-zero-nibbles-in-an-unsigned-64-bit-integer
/// Count the number of empty cells.
pub fn count_empty(grid: Grid) -> usize {
    CELLS - count_non_empty(grid)
}

/// Highest face value on the grid; 0 for an empty grid.
pub fn get_highest_tile_val(grid: Grid) -> Tile {
    let max_exp = (0..CELLS)
        .map(|idx| get_exponent(grid.0, idx))
        .max()
        .unwrap_or(0);
    exponent_to_value(max_exp)
}

/// Slide one packed line toward slot 0, merging each pair at most once.
///
/// The line is compacted first; then equal neighbours merge in travel order
/// and the merged tile is never compared again in the same pass, so
/// `[2,2,2,2]` becomes `[4,4,0,0]` and `[2,2,2]` becomes `[4,2,0]`.
pub(crate) fn slide_line(line: Line) -> LineSlide {
    let compact: Vec<Exponent> = (0..SIZE)
        .map(|pos| line_nibble(line, pos))
        .filter(|&exp| exp != 0)
        .collect();

    let mut out = [0 as Exponent; SIZE];
    let mut score = 0u32;
    let mut merged = 0u8;
    let mut i = 0;
    for (slot, cell) in out.iter_mut().enumerate() {
        let Some(&exp) = compact.get(i) else {
            break;
        };
        // 32768 is the largest packable tile, so a pair of them stays put.
        if compact.get(i + 1) == Some(&exp) && exp < MAX_EXPONENT {
            *cell = exp + 1;
            merged |= 1 << slot;
            score += 1 << (exp + 1);
            i += 2;
        } else {
            *cell = exp;
            i += 1;
        }
    }

    LineSlide {
        line: pack_line(out),
        score,
        merged,
    }
}

/// How a direction walks the grid: lines run along rows (Left/Right) or
/// columns (Up/Down), and slot 0 sits at the start (Left/Up) or the end
/// (Right/Down) of each line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Traversal {
    along_rows: bool,
    from_end: bool,
}

impl Traversal {
    fn of(direction: Direction) -> Self {
        match direction {
            Direction::Left => Traversal { along_rows: true, from_end: false },
            Direction::Right => Traversal { along_rows: true, from_end: true },
            Direction::Up => Traversal { along_rows: false, from_end: false },
            Direction::Down => Traversal { along_rows: false, from_end: true },
        }
    }

    /// Grid coordinates of slot `pos` of line `line_idx`.
    #[inline]
    fn cell(self, line_idx: usize, pos: usize) -> (usize, usize) {
        let offset = if self.from_end { SIZE - 1 - pos } else { pos };
        if self.along_rows {
            (line_idx, offset)
        } else {
            (offset, line_idx)
        }
    }

    /// Pack line `line_idx` of `grid` in travel order.
    #[inline]
    fn read(self, grid: Grid, line_idx: usize) -> Line {
        let mut exps = [0 as Exponent; SIZE];
        for (pos, exp) in exps.iter_mut().enumerate() {
            let (row, col) = self.cell(line_idx, pos);
            *exp = get_exponent(grid.0, row * SIZE + col);
        }
        pack_line(exps)
    }
}

// Credit to Nneonneo
pub(crate) fn transpose(x: GridRaw) -> GridRaw {
    let a1 = x & 0xF0F00F0FF0F00F0F;
    let a2 = x & 0x0000F0F00000F0F0;
    let a3 = x & 0x0F0F00000F0F0000;
    let a = a1 | (a2 << 12) | (a3 >> 12);
    let b1 = a & 0xFF00FF0000FF00FF;
    let b2 = a & 0x00FF00FF00000000;
    let b3 = a & 0x00000000FF00FF00;
    b1 | (b2 >> 24) | (b3 << 24)
}

/// Row `line_idx` of a packed grid as a packed line.
pub(crate) fn extract_line(raw: GridRaw, line_idx: usize) -> Line {
    ((raw >> ((SIZE - 1 - line_idx) * 16)) & 0xffff) as Line
}

#[inline]
pub(crate) fn nibble_shift(idx: usize) -> usize {
    60 - 4 * idx
}

#[inline]
pub(crate) fn get_exponent(raw: GridRaw, idx: usize) -> Exponent {
    ((raw >> nibble_shift(idx)) & 0xf) as Exponent
}

#[inline]
fn line_nibble(line: Line, pos: usize) -> Exponent {
    ((line >> ((SIZE - 1 - pos) * 4)) & 0xf) as Exponent
}

#[inline]
fn pack_line(exps: [Exponent; SIZE]) -> Line {
    exps.iter().fold(0, |line, &exp| (line << 4) | exp as Line)
}

fn has_adjacent_pair(raw: GridRaw) -> bool {
    (0..SIZE).any(|line_idx| {
        let line = extract_line(raw, line_idx);
        (0..SIZE - 1).any(|pos| {
            let exp = line_nibble(line, pos);
            exp != 0 && exp == line_nibble(line, pos + 1)
        })
    })
}

fn count_non_empty(grid: Grid) -> usize {
    let mut raw = grid.0;
    raw |= raw >> 1;
    raw |= raw >> 2;
    raw &= 0x1111111111111111;
    raw.count_ones() as usize
}

pub(crate) fn generate_random_tile<R: Rng + ?Sized>(rng: &mut R) -> Exponent {
    if rng.gen_range(0..10) < 9 { 1 } else { 2 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn line(exps: [Exponent; SIZE]) -> Line {
        pack_line(exps)
    }

    fn slid(exps: [Exponent; SIZE]) -> [Exponent; SIZE] {
        let out = slide_line(line(exps)).line;
        [0, 1, 2, 3].map(|pos| line_nibble(out, pos))
    }

    #[test]
    fn it_slide_line() {
        assert_eq!(slid([0, 0, 0, 0]), [0, 0, 0, 0]);
        assert_eq!(slid([1, 2, 1, 2]), [1, 2, 1, 2]);
        assert_eq!(slid([1, 1, 2, 2]), [2, 3, 0, 0]);
        assert_eq!(slid([1, 0, 0, 1]), [2, 0, 0, 0]);
        assert_eq!(slid([0, 2, 2, 2]), [3, 2, 0, 0]);
        assert_eq!(slid([15, 15, 0, 0]), [15, 15, 0, 0]);
    }

    #[test]
    fn merged_tile_does_not_merge_again() {
        assert_eq!(slid([1, 1, 1, 1]), [2, 2, 0, 0]);
        assert_eq!(slid([1, 1, 2, 0]), [2, 2, 0, 0]);
        let slide = slide_line(line([1, 1, 1, 1]));
        assert_eq!(slide.merged, 0b11);
        assert_eq!(slide.score, 8);
    }

    #[test]
    fn test_move_left() {
        let grid = Grid::from_raw(0x1234133220021002);
        let out = apply_move(grid, Direction::Left);
        assert_eq!(out.grid, Grid::from_raw(0x1234142030001200));
    }

    #[test]
    fn test_move_up() {
        let grid = Grid::from_raw(0x1121230033004222);
        let out = apply_move(grid, Direction::Up);
        assert_eq!(out.grid, Grid::from_raw(0x1131240232004000));
    }

    #[test]
    fn test_move_right() {
        let grid = Grid::from_raw(0x1234133220021002);
        let out = apply_move(grid, Direction::Right);
        assert_eq!(out.grid, Grid::from_raw(0x1234014200030012));
    }

    #[test]
    fn test_move_down() {
        let grid = Grid::from_raw(0x1121230033004222);
        let out = apply_move(grid, Direction::Down);
        assert_eq!(out.grid, Grid::from_raw(0x1000210034014232));
        // Column 1 merges 8+8 and lands one row above the bottom.
        assert_eq!(
            out.merges,
            vec![
                MergeEvent { row: 2, col: 1, value: 16 },
                MergeEvent { row: 3, col: 2, value: 8 },
            ]
        );
        assert_eq!(out.score_delta, 24);
    }

    #[test]
    fn left_merge_of_pair_in_first_row() {
        let grid = Grid::from_rows([[2, 2, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let out = apply_move(grid, Direction::Left);
        assert_eq!(out.grid.rows()[0], [4, 0, 0, 0]);
        assert_eq!(out.score_delta, 4);
        assert_eq!(out.merges, vec![MergeEvent { row: 0, col: 0, value: 4 }]);
        assert!(out.changed);
        assert!(!out.reached_winning_value);
    }

    #[test]
    fn four_of_a_kind_merges_one_level() {
        let grid = Grid::from_rows([[2, 2, 2, 2], [0; 4], [0; 4], [0; 4]]);
        let left = apply_move(grid, Direction::Left);
        assert_eq!(left.grid.rows()[0], [4, 4, 0, 0]);
        assert_eq!(left.score_delta, 8);
        let right = apply_move(grid, Direction::Right);
        assert_eq!(right.grid.rows()[0], [0, 0, 4, 4]);
        assert_eq!(
            right.merges,
            vec![
                MergeEvent { row: 0, col: 3, value: 4 },
                MergeEvent { row: 0, col: 2, value: 4 },
            ]
        );
    }

    #[test]
    fn merge_events_follow_line_order() {
        let grid = Grid::from_rows([
            [2, 0, 4, 0],
            [2, 0, 4, 0],
            [0, 8, 0, 0],
            [0, 8, 0, 0],
        ]);
        let out = apply_move(grid, Direction::Up);
        let cols: Vec<usize> = out.merges.iter().map(|m| m.col).collect();
        assert_eq!(cols, vec![0, 1, 2]);
        assert!(out.merges.iter().all(|m| m.row == 0));
        assert_eq!(out.score_delta, 4 + 16 + 8);
    }

    #[test]
    fn reaching_2048_flags_a_win() {
        let grid = Grid::from_rows([[1024, 1024, 0, 0], [0; 4], [0; 4], [0; 4]]);
        let out = apply_move(grid, Direction::Left);
        assert!(out.reached_winning_value);
        assert_eq!(out.largest_merge(), Some(2048));
        let beyond = Grid::from_rows([[2048, 2048, 0, 0], [0; 4], [0; 4], [0; 4]]);
        assert!(apply_move(beyond, Direction::Left).reached_winning_value);
        assert!(!apply_move_with_goal(grid, Direction::Left, 4096).reached_winning_value);
    }

    #[test]
    fn no_op_move_leaves_grid_untouched() {
        let grid = Grid::from_rows([[2, 4, 0, 0], [8, 0, 0, 0], [0; 4], [0; 4]]);
        let out = apply_move(grid, Direction::Left);
        assert!(!out.changed);
        assert_eq!(out.grid, grid);
        assert_eq!(out.score_delta, 0);
        assert!(out.merges.is_empty());
    }

    #[test]
    fn moves_preserve_tile_sum() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut grid = initialize(&mut rng);
        for step in 0..400 {
            let direction = Direction::ALL[step % 4];
            let out = apply_move(grid, direction);
            assert_eq!(out.grid.tile_sum(), grid.tile_sum());
            if !out.changed {
                assert_eq!(out.grid, grid);
                assert_eq!(out.score_delta, 0);
            }
            grid = place_random_tile(out.grid, &mut rng);
            if !has_legal_move(grid) {
                grid = initialize(&mut rng);
            }
        }
    }

    #[test]
    fn terminal_detection() {
        let locked = Grid::from_rows([
            [2, 4, 2, 4],
            [4, 2, 4, 2],
            [2, 4, 2, 4],
            [4, 2, 4, 2],
        ]);
        assert!(!has_legal_move(locked));
        for direction in Direction::ALL {
            assert!(!apply_move(locked, direction).changed);
        }

        let horizontal = Grid::from_rows([
            [2, 2, 8, 16],
            [4, 8, 16, 32],
            [8, 16, 32, 64],
            [16, 32, 64, 128],
        ]);
        assert!(has_legal_move(horizontal));

        let vertical = Grid::from_rows([
            [2, 4, 2, 4],
            [4, 2, 4, 2],
            [2, 4, 2, 8],
            [4, 2, 4, 8],
        ]);
        assert!(has_legal_move(vertical));

        let with_gap = Grid::from_rows([
            [2, 4, 2, 4],
            [4, 2, 4, 2],
            [2, 4, 0, 4],
            [4, 2, 4, 2],
        ]);
        assert!(has_legal_move(with_gap));
        assert!(has_legal_move(Grid::EMPTY));
    }

    #[test]
    fn random_tile_fills_only_empty_cells() {
        let mut rng = StdRng::seed_from_u64(99);
        for seed in 0..200u64 {
            let mut seeded = StdRng::seed_from_u64(seed);
            let before = initialize_with(6, &mut seeded);
            let after = place_random_tile(before, &mut rng);
            let changed: Vec<usize> = (0..CELLS)
                .filter(|&idx| before.tile_value(idx) != after.tile_value(idx))
                .collect();
            assert_eq!(changed.len(), 1);
            let idx = changed[0];
            assert_eq!(before.tile_value(idx), 0);
            assert!(matches!(after.tile_value(idx), 2 | 4));
        }
    }

    #[test]
    fn random_tile_on_full_grid_is_a_no_op() {
        let mut rng = StdRng::seed_from_u64(1);
        let full = Grid::from_raw(0x1212212112122121);
        assert_eq!(place_random_tile(full, &mut rng), full);
        let mut grid = Grid::EMPTY;
        for _ in 0..CELLS {
            grid = place_random_tile(grid, &mut rng);
        }
        assert_eq!(count_empty(grid), 0);
    }

    #[test]
    fn initialize_places_two_small_tiles() {
        for seed in 0..100u64 {
            let mut rng = StdRng::seed_from_u64(seed);
            let grid = initialize(&mut rng);
            let tiles: Vec<Tile> = grid.tiles().filter(|&v| v != 0).collect();
            assert_eq!(tiles.len(), 2);
            assert!(tiles.iter().all(|&v| v == 2 || v == 4));
        }
    }

    #[test]
    fn it_count_empty() {
        let grid = Grid::from_raw(0x1111000011110000);
        assert_eq!(count_empty(grid), 8);
        let grid = Grid::from_raw(0x1100000000000000);
        assert_eq!(count_empty(grid), 14);
    }

    #[test]
    fn it_highest_tile() {
        assert_eq!(get_highest_tile_val(Grid::EMPTY), 0);
        assert_eq!(get_highest_tile_val(Grid::from_raw(0x0123456789abcdef)), 32768);
    }

    #[test]
    fn transpose_swaps_rows_and_columns() {
        let raw = 0x0123456789abcdef;
        assert_eq!(transpose(raw), 0x048c159d26ae37bf);
        assert_eq!(transpose(transpose(raw)), raw);
    }
}
