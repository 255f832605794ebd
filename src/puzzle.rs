//! One playable puzzle: grid, active color, stroke history and the completion
//! latch, glued together so that every paint goes through the same
//! snapshot → mutate → cycle sequence.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::seq::IteratorRandom;
use rand::Rng;
use uuid::Uuid;

use crate::components::cycle::{next_active_color, CycleOutcome};
use crate::components::gesture::Difficulty;
use crate::components::history::StrokeHistory;
use crate::grid::PuzzleGrid;
use crate::ops::quantize::PaletteColor;

/// Descriptive fields carried alongside the grid.
#[derive(Clone, Debug, PartialEq)]
pub struct PuzzleMeta {
    pub prompt: String,
    pub style: String,
    pub category: Option<String>,
    pub difficulty: Difficulty,
    /// Requested palette size (the actual palette may be smaller).
    pub color_count: usize,
}

impl Default for PuzzleMeta {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            style: crate::prompt::DEFAULT_STYLE.to_string(),
            category: None,
            difficulty: Difficulty::default(),
            color_count: 10,
        }
    }
}

/// Result of one paint batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PaintOutcome {
    pub painted: usize,
    /// Set when the active color finished and the cycle moved on.
    pub advanced_to: Option<usize>,
    /// True on the one paint that colors the last cell.
    pub completed_now: bool,
}

/// Per-palette-entry progress for the palette strip.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorProgress {
    pub color: PaletteColor,
    pub total: usize,
    pub remaining: usize,
}

impl ColorProgress {
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

pub struct Puzzle {
    id: Uuid,
    meta: PuzzleMeta,
    grid: PuzzleGrid,
    active_color: usize,
    history: StrokeHistory,
    /// Unix milliseconds.
    created_at: u64,
    completion_reported: bool,
}

impl Puzzle {
    /// A freshly generated puzzle: nothing colored, color 0 active.
    pub fn new(grid: PuzzleGrid, meta: PuzzleMeta, max_undo_steps: Option<usize>) -> Self {
        Self::restore(Uuid::new_v4(), meta, grid, 0, now_millis(), max_undo_steps)
    }

    /// Rebuild a puzzle from stored parts. History starts empty; an
    /// out-of-range active color falls back to 0.
    pub fn restore(
        id: Uuid,
        meta: PuzzleMeta,
        grid: PuzzleGrid,
        active_color: usize,
        created_at: u64,
        max_undo_steps: Option<usize>,
    ) -> Self {
        let active_color = if active_color < grid.palette().len() { active_color } else { 0 };
        let completion_reported = grid.is_complete();
        Self {
            id,
            meta,
            grid,
            active_color,
            history: StrokeHistory::new(max_undo_steps),
            created_at,
            completion_reported,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn meta(&self) -> &PuzzleMeta {
        &self.meta
    }

    pub fn grid(&self) -> &PuzzleGrid {
        &self.grid
    }

    pub fn active_color(&self) -> usize {
        self.active_color
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn history(&self) -> &StrokeHistory {
        &self.history
    }

    pub fn is_complete(&self) -> bool {
        self.grid.is_complete()
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.meta.difficulty = difficulty;
    }

    pub fn begin_stroke(&mut self) {
        self.history.begin_stroke();
    }

    pub fn end_stroke(&mut self) {
        self.history.end_stroke();
    }

    /// Paint candidate cells with the active color.
    pub fn paint(&mut self, indices: &[usize]) -> PaintOutcome {
        if self.grid.paintable_count(indices, self.active_color) == 0 {
            return PaintOutcome::default();
        }

        self.history.record_before_paint(&self.grid, self.active_color);
        let painted = self.grid.paint(indices, self.active_color);
        let mut outcome = PaintOutcome {
            painted,
            ..Default::default()
        };

        match next_active_color(&self.grid, self.active_color) {
            CycleOutcome::Advanced { to, .. } => {
                self.active_color = to;
                outcome.advanced_to = Some(to);
            }
            CycleOutcome::Complete => {
                if !self.completion_reported {
                    self.completion_reported = true;
                    outcome.completed_now = true;
                }
            }
            CycleOutcome::Unchanged => {}
        }
        outcome
    }

    pub fn undo(&mut self) -> bool {
        self.history.undo(&mut self.grid, &mut self.active_color)
    }

    pub fn redo(&mut self) -> bool {
        self.history.redo(&mut self.grid, &mut self.active_color)
    }

    /// Manual palette selection. Completed colors may be selected too.
    pub fn select_color(&mut self, index: usize) -> bool {
        if index >= self.grid.palette().len() {
            return false;
        }
        self.active_color = index;
        true
    }

    /// Uncolor everything, activate color 0 and forget history.
    pub fn restart(&mut self) {
        self.grid.reset_progress();
        self.active_color = 0;
        self.history.clear();
        self.completion_reported = false;
    }

    /// A random uncolored cell of the active color.
    pub fn hint_candidate<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<usize> {
        self.grid.uncolored_of(self.active_color).choose(rng)
    }

    pub fn palette_progress(&self) -> Vec<ColorProgress> {
        let mut totals = vec![0usize; self.grid.palette().len()];
        for cell in self.grid.cells() {
            totals[cell.color()] += 1;
        }
        self.grid
            .palette()
            .iter()
            .zip(totals)
            .enumerate()
            .map(|(i, (&color, total))| ColorProgress {
                color,
                total,
                remaining: self.grid.remaining(i),
            })
            .collect()
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::split_grid;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn puzzle() -> Puzzle {
        Puzzle::new(split_grid(), PuzzleMeta::default(), None)
    }

    const LEFT: [usize; 8] = [0, 1, 4, 5, 8, 9, 12, 13];
    const RIGHT: [usize; 8] = [2, 3, 6, 7, 10, 11, 14, 15];

    #[test]
    fn finishing_a_color_advances_and_undo_restores_it() {
        let mut p = puzzle();
        p.begin_stroke();
        let out = p.paint(&LEFT);
        p.end_stroke();
        assert_eq!(out.painted, 8);
        assert_eq!(out.advanced_to, Some(1));
        assert_eq!(p.active_color(), 1);

        assert!(p.undo());
        assert_eq!(p.active_color(), 0);
        assert_eq!(p.grid().completed(), 0);
    }

    #[test]
    fn completion_fires_once() {
        let mut p = puzzle();
        p.paint(&LEFT);
        let out = p.paint(&RIGHT);
        assert!(out.completed_now);
        assert!(p.is_complete());
        assert_eq!(p.paint(&RIGHT), PaintOutcome::default());
    }

    #[test]
    fn wrong_color_paint_leaves_no_history() {
        let mut p = puzzle();
        assert_eq!(p.paint(&RIGHT).painted, 0);
        assert!(!p.history().can_undo());
    }

    #[test]
    fn restart_clears_progress_and_history() {
        let mut p = puzzle();
        p.paint(&LEFT);
        p.paint(&RIGHT);
        p.restart();
        assert_eq!(p.grid().completed(), 0);
        assert_eq!(p.active_color(), 0);
        assert!(!p.history().can_undo());
        p.paint(&LEFT);
        assert!(p.paint(&RIGHT).completed_now);
    }

    #[test]
    fn select_color_rejects_unknown_index() {
        let mut p = puzzle();
        assert!(p.select_color(1));
        assert_eq!(p.active_color(), 1);
        assert!(!p.select_color(2));
        assert_eq!(p.active_color(), 1);
    }

    #[test]
    fn hint_picks_uncolored_cell_of_active_color() {
        let mut p = puzzle();
        p.paint(&[0, 1, 4, 5, 8, 9, 12]);
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(p.hint_candidate(&mut rng), Some(13));

        p.paint(&[13]);
        p.paint(&RIGHT);
        assert_eq!(p.hint_candidate(&mut rng), None);
    }

    #[test]
    fn palette_progress_counts_per_color() {
        let mut p = puzzle();
        p.paint(&[0, 1]);
        let progress = p.palette_progress();
        assert_eq!(progress.len(), 2);
        assert_eq!((progress[0].total, progress[0].remaining), (8, 6));
        assert_eq!((progress[1].total, progress[1].remaining), (8, 8));
        assert!(!progress[0].is_complete());
    }
}
