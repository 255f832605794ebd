use std::collections::VecDeque;

use crate::grid::{Cell, PuzzleGrid};

// ============================================================================
// STROKE SNAPSHOT: full-grid undo state captured before a stroke
// ============================================================================

/// The state a stroke started from.
#[derive(Clone, Debug, PartialEq)]
pub struct StrokeSnapshot {
    pub cells: Vec<Cell>,
    pub active_color: usize,
    pub completed: usize,
}

impl StrokeSnapshot {
    pub fn capture(grid: &PuzzleGrid, active_color: usize) -> Self {
        Self {
            cells: grid.cells().to_vec(),
            active_color,
            completed: grid.completed(),
        }
    }

    /// Write this snapshot back into `grid` / `active_color`.
    pub fn restore_into(&self, grid: &mut PuzzleGrid, active_color: &mut usize) {
        grid.restore(&self.cells);
        *active_color = self.active_color;
    }

    pub fn memory_size(&self) -> usize {
        self.cells.len() * std::mem::size_of::<Cell>()
    }
}

// ============================================================================
// HISTORY MANAGER - stroke-granular undo/redo stacks
// ============================================================================

/// Undo/redo history where one stroke (pointer-down to pointer-up) is one unit.
pub struct StrokeHistory {
    undo_stack: VecDeque<StrokeSnapshot>,
    redo_stack: VecDeque<StrokeSnapshot>,
    /// `None` keeps every stroke.
    max_history_size: Option<usize>,
    /// True between `begin_stroke` and `end_stroke`.
    stroke_open: bool,
    /// True once the open stroke has pushed its snapshot.
    stroke_recorded: bool,
    /// Running memory total across both stacks.
    total_memory: usize,
}

impl Default for StrokeHistory {
    fn default() -> Self {
        Self::new(None)
    }
}

impl StrokeHistory {
    pub fn new(max_history_size: Option<usize>) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            max_history_size: max_history_size.filter(|&n| n > 0),
            stroke_open: false,
            stroke_recorded: false,
            total_memory: 0,
        }
    }

    /// A pointer went down: the next recorded paint starts a new undo unit.
    pub fn begin_stroke(&mut self) {
        self.stroke_open = true;
        self.stroke_recorded = false;
    }

    /// All pointers lifted.
    pub fn end_stroke(&mut self) {
        self.stroke_open = false;
        self.stroke_recorded = false;
    }

    pub fn is_stroke_open(&self) -> bool {
        self.stroke_open
    }

    /// Call right before a paint that is known to change the grid.
    /// Pushes a snapshot only for the first such paint of a stroke; a paint
    /// outside any stroke is always its own unit.
    pub fn record_before_paint(&mut self, grid: &PuzzleGrid, active_color: usize) {
        if self.stroke_open && self.stroke_recorded {
            return;
        }
        self.push(StrokeSnapshot::capture(grid, active_color));
        if self.stroke_open {
            self.stroke_recorded = true;
        }
    }

    pub fn push(&mut self, snapshot: StrokeSnapshot) {
        // Clear redo stack when a new action is performed
        for snap in self.redo_stack.drain(..) {
            self.total_memory = self.total_memory.saturating_sub(snap.memory_size());
        }

        self.total_memory += snapshot.memory_size();
        self.undo_stack.push_back(snapshot);
        self.prune();
    }

    /// Restore the most recent stroke's starting state. Returns `false` on an
    /// empty stack.
    pub fn undo(&mut self, grid: &mut PuzzleGrid, active_color: &mut usize) -> bool {
        let Some(previous) = self.undo_stack.pop_back() else {
            return false;
        };
        self.redo_stack.push_back(StrokeSnapshot::capture(grid, *active_color));
        self.total_memory += self.redo_stack.back().map_or(0, |s| s.memory_size());
        previous.restore_into(grid, active_color);
        self.total_memory = self.total_memory.saturating_sub(previous.memory_size());
        // An undo in the middle of a drag closes that drag's unit
        self.stroke_recorded = false;
        true
    }

    /// Exact inverse of [`undo`](Self::undo).
    pub fn redo(&mut self, grid: &mut PuzzleGrid, active_color: &mut usize) -> bool {
        let Some(next) = self.redo_stack.pop_back() else {
            return false;
        };
        self.undo_stack.push_back(StrokeSnapshot::capture(grid, *active_color));
        self.total_memory += self.undo_stack.back().map_or(0, |s| s.memory_size());
        next.restore_into(grid, active_color);
        self.total_memory = self.total_memory.saturating_sub(next.memory_size());
        self.stroke_recorded = false;
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Bytes held by both stacks (O(1) via cached total)
    pub fn memory_usage(&self) -> usize {
        self.total_memory
    }

    fn prune(&mut self) {
        let Some(max) = self.max_history_size else { return };
        while self.undo_stack.len() > max {
            if let Some(removed) = self.undo_stack.pop_front() {
                self.total_memory = self.total_memory.saturating_sub(removed.memory_size());
            }
        }
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.stroke_open = false;
        self.stroke_recorded = false;
        self.total_memory = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::split_grid;

    fn paint(history: &mut StrokeHistory, grid: &mut PuzzleGrid, indices: &[usize], active: usize) -> usize {
        if grid.paintable_count(indices, active) == 0 {
            return 0;
        }
        history.record_before_paint(grid, active);
        grid.paint(indices, active)
    }

    #[test]
    fn one_snapshot_per_stroke() {
        let mut grid = split_grid();
        let mut history = StrokeHistory::default();
        history.begin_stroke();
        paint(&mut history, &mut grid, &[0], 0);
        paint(&mut history, &mut grid, &[1], 0);
        paint(&mut history, &mut grid, &[4], 0);
        history.end_stroke();
        assert_eq!(history.undo_count(), 1);

        let mut active = 0;
        assert!(history.undo(&mut grid, &mut active));
        assert_eq!(grid.completed(), 0);
    }

    #[test]
    fn paints_outside_a_stroke_are_separate_units() {
        let mut grid = split_grid();
        let mut history = StrokeHistory::default();
        paint(&mut history, &mut grid, &[0], 0);
        paint(&mut history, &mut grid, &[1], 0);
        assert_eq!(history.undo_count(), 2);
    }

    #[test]
    fn no_op_paint_pushes_nothing() {
        let mut grid = split_grid();
        let mut history = StrokeHistory::default();
        history.begin_stroke();
        assert_eq!(paint(&mut history, &mut grid, &[2, 3], 0), 0);
        history.end_stroke();
        assert!(!history.can_undo());
    }

    #[test]
    fn undo_then_redo_round_trips() {
        let mut grid = split_grid();
        let mut active = 0;
        let mut history = StrokeHistory::default();

        let before = (grid.clone(), active);
        history.begin_stroke();
        paint(&mut history, &mut grid, &[0, 1, 4, 5], 0);
        history.end_stroke();
        active = 1;
        let after = (grid.clone(), active);

        assert!(history.undo(&mut grid, &mut active));
        assert_eq!((grid.clone(), active), before);
        assert!(history.redo(&mut grid, &mut active));
        assert_eq!((grid.clone(), active), after);
    }

    #[test]
    fn new_stroke_clears_redo() {
        let mut grid = split_grid();
        let mut active = 0;
        let mut history = StrokeHistory::default();
        paint(&mut history, &mut grid, &[0], 0);
        history.undo(&mut grid, &mut active);
        assert!(history.can_redo());
        paint(&mut history, &mut grid, &[1], 0);
        assert!(!history.can_redo());
    }

    #[test]
    fn empty_stacks_are_no_ops() {
        let mut grid = split_grid();
        let mut active = 0;
        let mut history = StrokeHistory::default();
        let before = grid.clone();
        assert!(!history.undo(&mut grid, &mut active));
        assert!(!history.redo(&mut grid, &mut active));
        assert_eq!(grid, before);
        assert_eq!(history.memory_usage(), 0);
    }

    #[test]
    fn cap_drops_oldest_strokes() {
        let mut grid = split_grid();
        let mut history = StrokeHistory::new(Some(2));
        for i in [0, 1, 4] {
            paint(&mut history, &mut grid, &[i], 0);
        }
        assert_eq!(history.undo_count(), 2);
        let mut active = 0;
        history.undo(&mut grid, &mut active);
        history.undo(&mut grid, &mut active);
        // first stroke can no longer be undone
        assert_eq!(grid.completed(), 1);
    }
}
