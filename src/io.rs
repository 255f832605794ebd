use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::components::gesture::Difficulty;
use crate::grid::{Cell, GridError, PuzzleGrid};
use crate::ops::quantize::PaletteColor;
use crate::puzzle::{now_millis, Puzzle, PuzzleMeta};

// ============================================================================
// CSP PUZZLE RECORD FORMAT
// ============================================================================

/// Magic header for records written before difficulty/category were stored
const CSP_MAGIC_V0: &str = "CSP0";
/// Magic header for the current record layout
const CSP_MAGIC_V1: &str = "CSP1";

/// File extension of a stored puzzle record.
pub const RECORD_EXTENSION: &str = "csp";
/// Largest side, in pixels, of a rendered solution image.
pub const MAX_SOLUTION_SIDE_PX: u32 = 16384;

/// Largest grid side accepted from a record file.
const MAX_GRID_SIZE: u32 = 512;
/// Largest palette accepted from a record file.
const MAX_PALETTE: usize = 1024;

/// V0 (legacy) record
#[derive(Serialize, Deserialize)]
struct RecordV0 {
    magic: String,
    id: String,
    timestamp: u64,
    prompt: String,
    style: String,
    grid_size: u32,
    color_count: u32,
    palette: Vec<String>,
    cells: Vec<Cell>,
    active_color: u32,
    completed: u64,
    total: u64,
}

/// V1 record
#[derive(Serialize, Deserialize)]
struct RecordV1 {
    magic: String,
    id: String,
    timestamp: u64,
    prompt: String,
    style: String,
    category: Option<String>,
    difficulty: String,
    grid_size: u32,
    color_count: u32,
    palette: Vec<String>,
    cells: Vec<Cell>,
    active_color: u32,
    completed: u64,
    total: u64,
}

/// Error type for puzzle record operations
#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialize(String),
    InvalidFormat(String),
    Image(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "I/O error: {}", e),
            StoreError::Serialize(e) => write!(f, "Serialization error: {}", e),
            StoreError::InvalidFormat(e) => write!(f, "Invalid format: {}", e),
            StoreError::Image(e) => write!(f, "Image error: {}", e),
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e)
    }
}

impl From<Box<bincode::ErrorKind>> for StoreError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        StoreError::Serialize(e.to_string())
    }
}

impl From<GridError> for StoreError {
    fn from(e: GridError) -> Self {
        StoreError::InvalidFormat(e.to_string())
    }
}

impl From<image::ImageError> for StoreError {
    fn from(e: image::ImageError) -> Self {
        StoreError::Image(e.to_string())
    }
}

/// A stored puzzle, decoded and validated.
#[derive(Clone, Debug, PartialEq)]
pub struct SavedPuzzle {
    pub id: Uuid,
    /// Unix milliseconds of the last save.
    pub timestamp: u64,
    pub meta: PuzzleMeta,
    pub grid_size: u32,
    pub palette: Vec<PaletteColor>,
    pub cells: Vec<Cell>,
    pub active_color: usize,
    pub completed: usize,
    pub total: usize,
}

impl SavedPuzzle {
    /// Snapshot a live puzzle, stamped with the current time.
    pub fn from_puzzle(puzzle: &Puzzle) -> Self {
        let grid = puzzle.grid();
        Self {
            id: puzzle.id(),
            timestamp: now_millis(),
            meta: puzzle.meta().clone(),
            grid_size: grid.size(),
            palette: grid.palette().to_vec(),
            cells: grid.cells().to_vec(),
            active_color: puzzle.active_color(),
            completed: grid.completed(),
            total: grid.total(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completed == self.total
    }

    /// Rebuild the playable puzzle. History starts empty.
    pub fn to_puzzle(&self, max_undo_steps: Option<usize>) -> Result<Puzzle, StoreError> {
        let grid = PuzzleGrid::from_parts(self.grid_size, self.palette.clone(), self.cells.clone())?;
        Ok(Puzzle::restore(
            self.id,
            self.meta.clone(),
            grid,
            self.active_color,
            self.timestamp,
            max_undo_steps,
        ))
    }
}

/// Serialize a record in the current (v1) layout.
pub fn encode_record(saved: &SavedPuzzle) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(&to_v1(saved))?)
}

fn to_v1(saved: &SavedPuzzle) -> RecordV1 {
    RecordV1 {
        magic: CSP_MAGIC_V1.to_string(),
        id: saved.id.to_string(),
        timestamp: saved.timestamp,
        prompt: saved.meta.prompt.clone(),
        style: saved.meta.style.clone(),
        category: saved.meta.category.clone(),
        difficulty: saved.meta.difficulty.name().to_string(),
        grid_size: saved.grid_size,
        color_count: saved.meta.color_count as u32,
        palette: saved.palette.iter().map(|c| c.hex()).collect(),
        cells: saved.cells.clone(),
        active_color: saved.active_color as u32,
        completed: saved.completed as u64,
        total: saved.total as u64,
    }
}

/// Decode any supported record version.
pub fn decode_record(raw: &[u8]) -> Result<SavedPuzzle, StoreError> {
    if raw.len() < 12 {
        return Err(StoreError::InvalidFormat("File too small".into()));
    }

    // bincode length-prefixes a String with 8 bytes; the 4-char magic follows
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");

    match magic {
        "CSP1" => {
            let r: RecordV1 = bincode::deserialize(raw)?;
            let difficulty = Difficulty::parse(&r.difficulty).unwrap_or_default();
            let meta = PuzzleMeta {
                prompt: r.prompt,
                style: r.style,
                category: r.category,
                difficulty,
                color_count: r.color_count as usize,
            };
            build_saved(&r.id, r.timestamp, meta, r.grid_size, &r.palette, r.cells, r.active_color)
        }
        "CSP0" => {
            let r: RecordV0 = bincode::deserialize(raw)?;
            // v0 predates difficulty/category: fill from defaults
            let meta = PuzzleMeta {
                prompt: r.prompt,
                style: r.style,
                color_count: r.color_count as usize,
                ..PuzzleMeta::default()
            };
            build_saved(&r.id, r.timestamp, meta, r.grid_size, &r.palette, r.cells, r.active_color)
        }
        _ => Err(StoreError::InvalidFormat(format!("Unknown magic '{}'", magic))),
    }
}

fn build_saved(
    id: &str,
    timestamp: u64,
    meta: PuzzleMeta,
    grid_size: u32,
    palette_hex: &[String],
    cells: Vec<Cell>,
    active_color: u32,
) -> Result<SavedPuzzle, StoreError> {
    let id = Uuid::parse_str(id).map_err(|e| StoreError::InvalidFormat(format!("Bad record id '{}': {}", id, e)))?;

    if grid_size == 0 || grid_size > MAX_GRID_SIZE {
        return Err(StoreError::InvalidFormat(format!(
            "Grid size {} outside 1..={}",
            grid_size, MAX_GRID_SIZE
        )));
    }
    if palette_hex.len() > MAX_PALETTE {
        return Err(StoreError::InvalidFormat(format!(
            "Palette has {} colors, which exceeds the maximum of {}",
            palette_hex.len(),
            MAX_PALETTE
        )));
    }
    let palette = palette_hex
        .iter()
        .map(|h| {
            PaletteColor::from_hex(h).ok_or_else(|| StoreError::InvalidFormat(format!("Bad palette entry '{}'", h)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    // Validates shape/indices and recounts progress from the cells
    let grid = PuzzleGrid::from_parts(grid_size, palette, cells)?;
    let active_color = active_color as usize;

    Ok(SavedPuzzle {
        id,
        timestamp,
        meta,
        grid_size,
        completed: grid.completed(),
        total: grid.total(),
        active_color: if active_color < grid.palette().len() { active_color } else { 0 },
        palette: grid.palette().to_vec(),
        cells: grid.cells().to_vec(),
    })
}

/// Write a record to `path` (v1 layout).
pub fn write_record(saved: &SavedPuzzle, path: &Path) -> Result<(), StoreError> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, &to_v1(saved))?;
    Ok(())
}

pub fn read_record(path: &Path) -> Result<SavedPuzzle, StoreError> {
    let raw = std::fs::read(path)?;
    decode_record(&raw)
}

// ============================================================================
// GALLERY STORE: one record file per puzzle
// ============================================================================

pub struct PuzzleStore {
    dir: PathBuf,
}

impl PuzzleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// `<config dir>/gallery`, next to the settings file.
    pub fn default_dir() -> Option<PathBuf> {
        crate::settings::AppSettings::settings_path().and_then(|p| p.parent().map(|d| d.join("gallery")))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{}.{}", id, RECORD_EXTENSION))
    }

    /// Insert or replace the record with `saved.id`.
    pub fn save(&self, saved: &SavedPuzzle) -> Result<PathBuf, StoreError> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(saved.id);
        write_record(saved, &path)?;
        crate::log_info!("Saved puzzle {} to {}", saved.id, path.display());
        Ok(path)
    }

    pub fn load(&self, id: Uuid) -> Result<SavedPuzzle, StoreError> {
        read_record(&self.path_for(id))
    }

    /// Every readable record, newest first. Unreadable files are skipped.
    pub fn list(&self) -> Vec<SavedPuzzle> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut saves: Vec<SavedPuzzle> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION))
            .filter_map(|p| match read_record(&p) {
                Ok(saved) => Some(saved),
                Err(e) => {
                    crate::log_warn!("Skipping unreadable puzzle {}: {}", p.display(), e);
                    None
                }
            })
            .collect();
        saves.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        saves
    }

    /// Returns `false` when no such record existed.
    pub fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let path = self.path_for(id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

// ============================================================================
// SOLUTION RENDERING
// ============================================================================

/// Every cell filled with its palette color, `cell_px` pixels per cell.
pub fn render_solution(grid: &PuzzleGrid, cell_px: u32) -> Result<RgbImage, StoreError> {
    let cell_px = cell_px.max(1);
    let side = grid
        .size()
        .checked_mul(cell_px)
        .filter(|&side| side <= MAX_SOLUTION_SIDE_PX)
        .ok_or_else(|| {
            StoreError::InvalidFormat(format!(
                "{} cells at {} px each exceeds {} px",
                grid.size(),
                cell_px,
                MAX_SOLUTION_SIDE_PX
            ))
        })?;
    let g = grid.size() as usize;
    Ok(RgbImage::from_fn(side, side, |x, y| {
        let index = (y / cell_px) as usize * g + (x / cell_px) as usize;
        let color = grid
            .cell(index)
            .and_then(|c| grid.palette().get(c.color()))
            .copied()
            .unwrap_or(PaletteColor::new(255, 255, 255));
        Rgb(color.to_array())
    }))
}

/// Write [`render_solution`] output as a PNG.
pub fn save_solution_png(grid: &PuzzleGrid, cell_px: u32, path: &Path) -> Result<(), StoreError> {
    render_solution(grid, cell_px)?.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::split_grid;

    fn saved() -> SavedPuzzle {
        let mut puzzle = Puzzle::new(
            split_grid(),
            PuzzleMeta {
                prompt: "A cat".into(),
                style: "pixel".into(),
                category: Some("animals".into()),
                difficulty: Difficulty::Hard,
                color_count: 4,
            },
            None,
        );
        puzzle.paint(&[0, 1]);
        SavedPuzzle::from_puzzle(&puzzle)
    }

    #[test]
    fn v1_record_decodes_to_same_puzzle() {
        let s = saved();
        let decoded = decode_record(&encode_record(&s).unwrap()).unwrap();
        assert_eq!(decoded, s);
        assert_eq!(decoded.completed, 2);
        assert!(!decoded.is_complete());
    }

    #[test]
    fn v0_record_loads_with_defaults() {
        let s = saved();
        let v0 = RecordV0 {
            magic: CSP_MAGIC_V0.to_string(),
            id: s.id.to_string(),
            timestamp: 42,
            prompt: "A dog".into(),
            style: "cute".into(),
            grid_size: 4,
            color_count: 2,
            palette: s.palette.iter().map(|c| c.hex()).collect(),
            cells: s.cells.clone(),
            active_color: 1,
            // stale counters are ignored
            completed: 99,
            total: 99,
        };
        let decoded = decode_record(&bincode::serialize(&v0).unwrap()).unwrap();
        assert_eq!(decoded.meta.difficulty, Difficulty::Medium);
        assert_eq!(decoded.meta.category, None);
        assert_eq!(decoded.active_color, 1);
        assert_eq!((decoded.completed, decoded.total), (2, 16));
    }

    #[test]
    fn rejects_garbage_and_unknown_magic() {
        assert!(matches!(decode_record(b"tiny"), Err(StoreError::InvalidFormat(_))));
        let mut raw = encode_record(&saved()).unwrap();
        raw[8..12].copy_from_slice(b"XYZ9");
        assert!(matches!(decode_record(&raw), Err(StoreError::InvalidFormat(_))));
    }

    #[test]
    fn rejects_cells_pointing_outside_palette() {
        let mut s = saved();
        s.cells[3].palette_index = 7;
        let raw = encode_record(&s).unwrap();
        assert!(matches!(decode_record(&raw), Err(StoreError::InvalidFormat(_))));
    }

    #[test]
    fn restored_puzzle_keeps_progress() {
        let puzzle = saved().to_puzzle(None).unwrap();
        assert_eq!(puzzle.grid().completed(), 2);
        assert!(!puzzle.history().can_undo());
    }

    #[test]
    fn solution_render_uses_palette_colors() {
        let grid = split_grid();
        let img = render_solution(&grid, 3).unwrap();
        assert_eq!(img.dimensions(), (12, 12));
        assert_eq!(img.get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(img.get_pixel(11, 11), &Rgb([0, 0, 255]));
    }

    #[test]
    fn oversized_solution_is_an_error_not_a_panic() {
        let grid = split_grid();
        assert!(matches!(render_solution(&grid, 1_500_000_000), Err(StoreError::InvalidFormat(_))));
        assert!(matches!(render_solution(&grid, u32::MAX), Err(StoreError::InvalidFormat(_))));
        assert!(render_solution(&grid, MAX_SOLUTION_SIDE_PX / 4 + 1).is_err());
        assert!(render_solution(&grid, 64).is_ok());
    }
}
