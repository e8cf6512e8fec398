use std::sync::OnceLock;

use super::grid::Line;

/// Result of sliding one packed line toward its first slot.
///
/// Lines are packed as four nibbles with slot 0 (the edge tiles travel
/// toward) in the high nibble. `merged` has bit `p` set when slot `p` of the
/// result holds a tile created by a merge during this slide.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct LineSlide {
    pub(crate) line: Line,
    pub(crate) score: u32,
    pub(crate) merged: u8,
}

/// Precomputed slides for all 2^16 packed lines.
///
/// Sliding a row or column depends only on its 4 nibbles, so every
/// direction reads its lines in travel order and shares this one table.
/// Built lazily on first use; `engine::new()` forces it early.
static LINES: OnceLock<Box<[LineSlide]>> = OnceLock::new();

const LINE_TABLE_SIZE: usize = 0x1_0000; // 65,536 possible 16-bit lines

/// Ensure the lookup table is initialized.
pub fn init() {
    let _ = lines();
}

#[inline(always)]
fn lines() -> &'static [LineSlide] {
    LINES.get_or_init(create_table)
}

fn create_table() -> Box<[LineSlide]> {
    // Allocate on the heap to keep stack frames small during init.
    let mut table = vec![LineSlide::default(); LINE_TABLE_SIZE];
    for (val, entry) in table.iter_mut().enumerate() {
        *entry = super::ops::slide_line(val as Line);
    }
    table.into_boxed_slice()
}

#[inline(always)]
pub(crate) fn get_line_entry(line: Line) -> LineSlide {
    let table = lines();
    debug_assert_eq!(table.len(), LINE_TABLE_SIZE);
    // SAFETY: the table holds exactly 2^16 entries and `line` is a u16.
    unsafe { *table.get_unchecked(line as usize) }
}
