// ============================================================================
// COLOR QUANTIZER: raster image → capped distinct palette + per-cell index
// ============================================================================
//
// Four steps:
//   1. Nearest-neighbour downsample to G×G (no smoothing, flat regions stay flat)
//   2. Round every channel to the nearest multiple of 5 and count buckets
//   3. Greedy palette from the most frequent buckets, skipping near-duplicates
//   4. Map every raw sample to its nearest palette entry
//
// Output is fully deterministic for a given input image.

use image::{Rgb, RgbImage, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// Minimum RGB distance between two accepted palette colors.
pub const DISTINCT_THRESHOLD: u32 = 40;
/// Bucket width used to collapse anti-aliasing noise.
pub const BUCKET_STEP: u16 = 5;

/// One palette entry. Immutable once a puzzle is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaletteColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl PaletteColor {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    pub fn hex(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('#');
        if s.len() != 6 || !s.is_ascii() {
            return None;
        }
        let r = u8::from_str_radix(&s[0..2], 16).ok()?;
        let g = u8::from_str_radix(&s[2..4], 16).ok()?;
        let b = u8::from_str_radix(&s[4..6], 16).ok()?;
        Some(Self { r, g, b })
    }

    pub fn to_array(self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    /// Squared Euclidean distance in RGB space.
    pub fn dist_sq(&self, other: &PaletteColor) -> u32 {
        dist_sq([self.r, self.g, self.b], [other.r, other.g, other.b])
    }
}

/// Result of a quantization run.
#[derive(Clone, Debug, PartialEq)]
pub struct Quantized {
    pub grid_size: u32,
    pub palette: Vec<PaletteColor>,
    /// Row-major palette index per cell, `grid_size²` entries.
    pub indices: Vec<usize>,
    /// Palette index where relaxed-fill entries begin (`palette.len()` when
    /// every entry passed the distinctiveness check).
    pub relaxed_from: usize,
}

/// Error type for quantization.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizeError {
    /// The bytes could not be decoded as an image.
    Decode(String),
    /// Grid size or color count of zero.
    InvalidRequest(String),
    /// The job's cancel flag was raised before it finished.
    Cancelled,
}

impl std::fmt::Display for QuantizeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QuantizeError::Decode(e) => write!(f, "Image decode error: {}", e),
            QuantizeError::InvalidRequest(e) => write!(f, "Invalid quantize request: {}", e),
            QuantizeError::Cancelled => write!(f, "Quantization cancelled"),
        }
    }
}

impl From<image::ImageError> for QuantizeError {
    fn from(e: image::ImageError) -> Self {
        QuantizeError::Decode(e.to_string())
    }
}

/// Decode encoded image bytes (PNG, JPEG, WEBP, …) and quantize them.
pub fn quantize_bytes(
    bytes: &[u8],
    grid_size: u32,
    color_count: usize,
    cancel: Option<&AtomicBool>,
) -> Result<Quantized, QuantizeError> {
    let img = flatten_alpha(&image::load_from_memory(bytes)?.to_rgba8());
    quantize_image(&img, grid_size, color_count, cancel)
}

/// Drop alpha the way a browser canvas reports pixels: fully transparent
/// pixels read as black, everything else keeps its straight RGB.
pub fn flatten_alpha(img: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(img.width(), img.height(), |x, y| {
        let [r, g, b, a] = img.get_pixel(x, y).0;
        if a == 0 { Rgb([0, 0, 0]) } else { Rgb([r, g, b]) }
    })
}

/// Quantize an already-decoded RGB image.
pub fn quantize_image(
    img: &RgbImage,
    grid_size: u32,
    color_count: usize,
    cancel: Option<&AtomicBool>,
) -> Result<Quantized, QuantizeError> {
    if grid_size == 0 || color_count == 0 {
        return Err(QuantizeError::InvalidRequest(format!(
            "grid size {} / color count {}",
            grid_size, color_count
        )));
    }
    if img.width() == 0 || img.height() == 0 {
        return Err(QuantizeError::Decode("image has no pixels".into()));
    }

    let samples = downsample_nearest(img, grid_size);
    check_cancel(cancel)?;

    let candidates = ranked_buckets(&samples);
    let (palette, relaxed_from) = select_palette(&candidates, color_count);
    check_cancel(cancel)?;

    // Map raw samples (not bucket representatives) row by row
    let g = grid_size as usize;
    let rows: Vec<Option<Vec<usize>>> = samples
        .par_chunks(g)
        .map(|row| {
            if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
                return None;
            }
            Some(row.iter().map(|s| nearest_index(*s, &palette)).collect())
        })
        .collect();

    let mut indices = Vec::with_capacity(g * g);
    for row in rows {
        match row {
            Some(r) => indices.extend(r),
            None => return Err(QuantizeError::Cancelled),
        }
    }

    Ok(Quantized {
        grid_size,
        palette,
        indices,
        relaxed_from,
    })
}

fn check_cancel(cancel: Option<&AtomicBool>) -> Result<(), QuantizeError> {
    if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
        Err(QuantizeError::Cancelled)
    } else {
        Ok(())
    }
}

/// Sample the source pixel under each output cell's centre.
///
/// Done by hand rather than through `imageops::resize` so no filter kernel can
/// ever blend neighbouring pixels.
fn downsample_nearest(img: &RgbImage, grid_size: u32) -> Vec<[u8; 3]> {
    let (w, h) = img.dimensions();
    let g = grid_size as u64;
    let mut out = Vec::with_capacity((g * g) as usize);
    for gy in 0..g {
        let sy = (((2 * gy + 1) * h as u64) / (2 * g)).min(h as u64 - 1) as u32;
        for gx in 0..g {
            let sx = (((2 * gx + 1) * w as u64) / (2 * g)).min(w as u64 - 1) as u32;
            out.push(img.get_pixel(sx, sy).0);
        }
    }
    out
}

/// Round a channel to the nearest multiple of [`BUCKET_STEP`] (half rounds up).
fn bucket_channel(c: u8) -> u8 {
    let step = BUCKET_STEP;
    (((c as u16 + step / 2) / step) * step).min(255) as u8
}

/// A bucket representative and how many samples fell into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Candidate {
    pub color: [u8; 3],
    pub count: u32,
}

/// Bucket samples and rank by descending frequency. Equal counts keep the
/// order in which the bucket was first seen.
pub(crate) fn ranked_buckets(samples: &[[u8; 3]]) -> Vec<Candidate> {
    let mut slot: HashMap<[u8; 3], usize> = HashMap::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    for s in samples {
        let key = [bucket_channel(s[0]), bucket_channel(s[1]), bucket_channel(s[2])];
        match slot.get(&key) {
            Some(&i) => candidates[i].count += 1,
            None => {
                slot.insert(key, candidates.len());
                candidates.push(Candidate { color: key, count: 1 });
            }
        }
    }
    // sort_by is stable, so first-seen order survives among ties
    candidates.sort_by(|a, b| b.count.cmp(&a.count));
    candidates
}

/// Greedy distinct selection followed by relaxed fill.
/// Returns the palette and the index where relaxed entries start.
pub(crate) fn select_palette(candidates: &[Candidate], color_count: usize) -> (Vec<PaletteColor>, usize) {
    let threshold_sq = DISTINCT_THRESHOLD * DISTINCT_THRESHOLD;
    let mut picked: Vec<[u8; 3]> = Vec::with_capacity(color_count);

    if let Some(first) = candidates.first() {
        picked.push(first.color);
    }

    for cand in candidates.iter().skip(1) {
        if picked.len() >= color_count {
            break;
        }
        if picked.iter().all(|p| dist_sq(*p, cand.color) > threshold_sq) {
            picked.push(cand.color);
        }
    }

    let relaxed_from = picked.len();

    if picked.len() < color_count {
        for cand in candidates.iter().skip(1) {
            if picked.len() >= color_count {
                break;
            }
            if !picked.contains(&cand.color) {
                picked.push(cand.color);
            }
        }
    }

    let palette = picked
        .into_iter()
        .map(|[r, g, b]| PaletteColor { r, g, b })
        .collect();
    (palette, relaxed_from)
}

/// Index of the nearest palette color; ties go to the lowest index.
pub fn nearest_index(sample: [u8; 3], palette: &[PaletteColor]) -> usize {
    let mut best = 0;
    let mut best_dist = u32::MAX;
    for (i, p) in palette.iter().enumerate() {
        let d = dist_sq(sample, p.to_array());
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

#[inline]
fn dist_sq(a: [u8; 3], b: [u8; 3]) -> u32 {
    let dr = a[0] as i32 - b[0] as i32;
    let dg = a[1] as i32 - b[1] as i32;
    let db = a[2] as i32 - b[2] as i32;
    (dr * dr + dg * dg + db * db) as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn quadrant_image() -> RgbImage {
        // 64×64: red / green / blue / white quadrants, mostly red
        RgbImage::from_fn(64, 64, |x, y| match (x < 40, y < 40) {
            (true, true) => Rgb([220, 20, 20]),
            (false, true) => Rgb([20, 200, 20]),
            (true, false) => Rgb([20, 20, 220]),
            (false, false) => Rgb([250, 250, 250]),
        })
    }

    #[test]
    fn bucket_rounding_matches_nearest_multiple_of_five() {
        assert_eq!(bucket_channel(0), 0);
        assert_eq!(bucket_channel(2), 0);
        assert_eq!(bucket_channel(3), 5);
        assert_eq!(bucket_channel(252), 250);
        assert_eq!(bucket_channel(253), 255);
        assert_eq!(bucket_channel(255), 255);
    }

    #[test]
    fn produces_one_index_per_cell_within_palette() {
        let q = quantize_image(&quadrant_image(), 16, 10, None).unwrap();
        assert_eq!(q.indices.len(), 256);
        assert!(q.palette.len() <= 10);
        assert!(q.indices.iter().all(|&i| i < q.palette.len()));
    }

    #[test]
    fn most_frequent_color_is_palette_zero() {
        let q = quantize_image(&quadrant_image(), 16, 4, None).unwrap();
        assert_eq!(q.palette.len(), 4);
        assert_eq!(q.palette[0], PaletteColor::new(220, 20, 20));
        // top-left cell is red
        assert_eq!(q.indices[0], 0);
    }

    #[test]
    fn near_duplicate_shades_collapse() {
        // two reds 10 apart, one blue, so asking for 2 colors keeps red + blue
        let img = RgbImage::from_fn(30, 10, |x, _| match x {
            0..=14 => Rgb([200, 0, 0]),
            15..=24 => Rgb([210, 0, 0]),
            _ => Rgb([0, 0, 200]),
        });
        let q = quantize_image(&img, 30, 2, None).unwrap();
        assert_eq!(q.palette, vec![PaletteColor::new(200, 0, 0), PaletteColor::new(0, 0, 200)]);
        assert_eq!(q.relaxed_from, 2);
        // the lighter red maps to the red entry
        assert_eq!(q.indices[20], 0);
    }

    #[test]
    fn accepted_palette_is_pairwise_distinct() {
        let img = RgbImage::from_fn(50, 50, |x, y| Rgb([(x * 5) as u8, (y * 5) as u8, ((x + y) * 2) as u8]));
        let q = quantize_image(&img, 25, 12, None).unwrap();
        let strict = &q.palette[..q.relaxed_from];
        for (i, a) in strict.iter().enumerate() {
            for b in &strict[i + 1..] {
                assert!(a.dist_sq(b) > DISTINCT_THRESHOLD * DISTINCT_THRESHOLD);
            }
        }
    }

    #[test]
    fn relaxed_fill_tops_up_with_close_shades() {
        // only near-identical shades: strict pass accepts one, relaxed adds the rest
        let img = RgbImage::from_fn(3, 1, |x, _| Rgb([100 + (x as u8) * 10, 100, 100]));
        let q = quantize_image(&img, 3, 3, None).unwrap();
        assert_eq!(q.relaxed_from, 1);
        assert_eq!(q.palette.len(), 3);
    }

    #[test]
    fn fewer_distinct_colors_than_requested_is_kept() {
        let img = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        let q = quantize_image(&img, 8, 10, None).unwrap();
        assert_eq!(q.palette.len(), 1);
        assert!(q.indices.iter().all(|&i| i == 0));
    }

    #[test]
    fn nearest_ties_resolve_to_lowest_index() {
        let palette = [PaletteColor::new(0, 0, 0), PaletteColor::new(20, 0, 0)];
        assert_eq!(nearest_index([10, 0, 0], &palette), 0);
    }

    #[test]
    fn nearest_neighbour_downsample_does_not_blend() {
        // 2×2 checker scaled to 2×2 must keep exact colors
        let img = RgbImage::from_fn(4, 4, |x, y| if (x / 2 + y / 2) % 2 == 0 { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) });
        let samples = downsample_nearest(&img, 2);
        assert_eq!(samples, vec![[0, 0, 0], [255, 255, 255], [255, 255, 255], [0, 0, 0]]);
    }

    #[test]
    fn transparent_pixels_quantize_as_black() {
        // left half fully transparent but carrying white RGB, right half opaque red
        let img = RgbaImage::from_fn(8, 8, |x, _| {
            if x < 4 { image::Rgba([255, 255, 255, 0]) } else { image::Rgba([200, 0, 0, 255]) }
        });
        let flat = flatten_alpha(&img);
        assert_eq!(flat.get_pixel(0, 0), &Rgb([0, 0, 0]));
        assert_eq!(flat.get_pixel(7, 0), &Rgb([200, 0, 0]));

        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, image::ImageOutputFormat::Png).unwrap();
        let q = quantize_bytes(bytes.get_ref(), 8, 4, None).unwrap();
        let mut palette = q.palette.clone();
        palette.sort_by_key(|c| c.to_array());
        assert_eq!(palette, vec![PaletteColor::new(0, 0, 0), PaletteColor::new(200, 0, 0)]);
        assert_eq!(q.palette[q.indices[0]], PaletteColor::new(0, 0, 0));
    }

    #[test]
    fn undecodable_bytes_fail_with_decode_error() {
        let err = quantize_bytes(b"definitely not an image", 8, 4, None).unwrap_err();
        assert!(matches!(err, QuantizeError::Decode(_)));
    }

    #[test]
    fn raised_cancel_flag_aborts() {
        let flag = AtomicBool::new(true);
        let err = quantize_image(&quadrant_image(), 16, 4, Some(&flag)).unwrap_err();
        assert_eq!(err, QuantizeError::Cancelled);
    }

    #[test]
    fn zero_sized_requests_are_rejected() {
        assert!(matches!(
            quantize_image(&quadrant_image(), 0, 4, None),
            Err(QuantizeError::InvalidRequest(_))
        ));
        assert!(matches!(
            quantize_image(&quadrant_image(), 8, 0, None),
            Err(QuantizeError::InvalidRequest(_))
        ));
    }

    #[test]
    fn hex_round_trips_through_parser() {
        let c = PaletteColor::new(0xf1, 0x05, 0xa9);
        assert_eq!(c.hex(), "#f105a9");
        assert_eq!(PaletteColor::from_hex("#f105a9"), Some(c));
        assert_eq!(PaletteColor::from_hex("nope"), None);
    }
}
