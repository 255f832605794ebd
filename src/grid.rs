//! Puzzle grid model: the paintable cell collection and its palette.
//!
//! Cells are allocated once per generated puzzle and never resized. Only the
//! `is_colored` flag ever changes; per-color remaining counters make
//! [`PuzzleGrid::is_color_complete`] O(1).

use serde::{Deserialize, Serialize};

use crate::ops::quantize::{PaletteColor, Quantized};

/// One paintable unit, permanently bound to one palette color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub palette_index: u16,
    pub is_colored: bool,
}

impl Cell {
    pub fn new(palette_index: u16) -> Self {
        Self {
            palette_index,
            is_colored: false,
        }
    }

    #[inline]
    pub fn color(&self) -> usize {
        self.palette_index as usize
    }
}

/// Why a set of cells could not become a grid.
#[derive(Debug, Clone, PartialEq)]
pub enum GridError {
    /// `cells.len()` is not `size²`.
    CellCount { expected: usize, found: usize },
    /// A cell refers to a palette entry that does not exist.
    PaletteIndex { cell: usize, index: usize, palette_len: usize },
    EmptyPalette,
}

impl std::fmt::Display for GridError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GridError::CellCount { expected, found } => {
                write!(f, "expected {} cells, found {}", expected, found)
            }
            GridError::PaletteIndex { cell, index, palette_len } => write!(
                f,
                "cell {} uses palette index {} but palette has {} colors",
                cell, index, palette_len
            ),
            GridError::EmptyPalette => write!(f, "palette is empty"),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PuzzleGrid {
    size: u32,
    palette: Vec<PaletteColor>,
    cells: Vec<Cell>,
    completed: usize,
    /// Uncolored cell count per palette index.
    remaining: Vec<usize>,
}

impl PuzzleGrid {
    /// Fresh, fully uncolored grid from a quantization result.
    pub fn from_quantized(q: Quantized) -> Result<Self, GridError> {
        let cells = q.indices.iter().map(|&i| Cell::new(i as u16)).collect();
        Self::from_parts(q.grid_size, q.palette, cells)
    }

    /// Validate and assemble a grid. Completion counters are derived from the
    /// cells, never trusted from the caller.
    pub fn from_parts(size: u32, palette: Vec<PaletteColor>, cells: Vec<Cell>) -> Result<Self, GridError> {
        if palette.is_empty() {
            return Err(GridError::EmptyPalette);
        }
        let expected = size as usize * size as usize;
        if cells.len() != expected {
            return Err(GridError::CellCount {
                expected,
                found: cells.len(),
            });
        }
        if let Some((cell, bad)) = cells.iter().enumerate().find(|(_, c)| c.color() >= palette.len()) {
            return Err(GridError::PaletteIndex {
                cell,
                index: bad.color(),
                palette_len: palette.len(),
            });
        }

        let mut grid = Self {
            size,
            remaining: vec![0; palette.len()],
            palette,
            cells,
            completed: 0,
        };
        grid.recount();
        Ok(grid)
    }

    fn recount(&mut self) {
        self.remaining.iter_mut().for_each(|r| *r = 0);
        self.completed = 0;
        for cell in &self.cells {
            if cell.is_colored {
                self.completed += 1;
            } else {
                self.remaining[cell.color()] += 1;
            }
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn palette(&self) -> &[PaletteColor] {
        &self.palette
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn total(&self) -> usize {
        self.cells.len()
    }

    pub fn completed(&self) -> usize {
        self.completed
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.cells.len()
    }

    /// True iff no cell of `color` remains uncolored. Unknown colors count as complete.
    pub fn is_color_complete(&self, color: usize) -> bool {
        self.remaining.get(color).is_none_or(|&r| r == 0)
    }

    /// Uncolored cells left for `color`.
    pub fn remaining(&self, color: usize) -> usize {
        self.remaining.get(color).copied().unwrap_or(0)
    }

    /// Number of distinct cells in `indices` that `paint` would color.
    pub fn paintable_count(&self, indices: &[usize], active: usize) -> usize {
        let mut seen = std::collections::HashSet::new();
        indices
            .iter()
            .filter(|&&i| self.is_paintable(i, active) && seen.insert(i))
            .count()
    }

    fn is_paintable(&self, index: usize, active: usize) -> bool {
        self.cells
            .get(index)
            .is_some_and(|c| !c.is_colored && c.color() == active)
    }

    /// Color every listed cell whose palette index is `active` and which is not
    /// yet colored. Everything else is ignored. Returns how many cells changed.
    pub fn paint(&mut self, indices: &[usize], active: usize) -> usize {
        let mut painted = 0;
        for &i in indices {
            if self.is_paintable(i, active) {
                self.cells[i].is_colored = true;
                self.remaining[active] -= 1;
                painted += 1;
            }
        }
        self.completed += painted;
        painted
    }

    /// Replace every cell's state from a snapshot of this same grid.
    /// Snapshots of a different size are ignored.
    pub(crate) fn restore(&mut self, cells: &[Cell]) {
        if cells.len() != self.cells.len() {
            crate::log_warn!(
                "Snapshot size {} does not match grid size {}; ignored",
                cells.len(),
                self.cells.len()
            );
            return;
        }
        self.cells.copy_from_slice(cells);
        self.recount();
    }

    /// Mark every cell uncolored again.
    pub fn reset_progress(&mut self) {
        self.cells.iter_mut().for_each(|c| c.is_colored = false);
        self.recount();
    }

    /// Indices of uncolored cells of `color`, in row-major order.
    pub fn uncolored_of(&self, color: usize) -> impl Iterator<Item = usize> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(move |(_, c)| !c.is_colored && c.color() == color)
            .map(|(i, _)| i)
    }

    /// Row-major index of `(col, row)`, if inside the grid.
    pub fn index_of(&self, col: i64, row: i64) -> Option<usize> {
        let g = self.size as i64;
        if col < 0 || row < 0 || col >= g || row >= g {
            None
        } else {
            Some((row * g + col) as usize)
        }
    }
}
