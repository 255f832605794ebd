//! Color-cycle controller: picks the next active color once the current one is
//! fully painted.

use crate::grid::PuzzleGrid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Active color still has cells left (or nothing to advance to).
    Unchanged,
    /// The active color finished and `to` is the next incomplete one.
    Advanced { from: usize, to: usize },
    /// Every cell is colored.
    Complete,
}

/// Decide the active color after a successful paint batch.
///
/// Scans upward from `active + 1`, then wraps to `0..active`.
pub fn next_active_color(grid: &PuzzleGrid, active: usize) -> CycleOutcome {
    if grid.is_complete() {
        return CycleOutcome::Complete;
    }
    if !grid.is_color_complete(active) {
        return CycleOutcome::Unchanged;
    }

    let len = grid.palette().len();
    let next = (active + 1..len)
        .chain(0..active.min(len))
        .find(|&c| !grid.is_color_complete(c));

    match next {
        Some(to) => CycleOutcome::Advanced { from: active, to },
        None => {
            // Uncolored cells exist but no color owns them: counters are broken
            debug_assert!(false, "grid incomplete but every color reports complete");
            crate::log_warn!(
                "Color cycle found no incomplete color while {}/{} cells are colored",
                grid.completed(),
                grid.total()
            );
            CycleOutcome::Unchanged
        }
    }
}
