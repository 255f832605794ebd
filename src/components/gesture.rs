// ============================================================================
// GESTURE / TRANSFORM ENGINE: multi-pointer input → affected grid cells
// ============================================================================
//
// States (derived from the pointer map):
//   Idle         : no pointers
//   Single(mode) : one pointer; paints or pans depending on `mode`
//   Multi        : two pointers; pinch zoom + two-finger pan
//
// Screen → grid: undo pan, undo zoom (both about the viewport centre), then
// scale content coordinates by grid_size / content_size.

use std::collections::{BTreeMap, BTreeSet};

use egui::{Pos2, Rect, Vec2};
use serde::{Deserialize, Serialize};

use crate::timer::Deadline;

pub const MIN_ZOOM: f32 = 1.0;
pub const MAX_ZOOM: f32 = 5.0;
/// Inter-pointer distance change (px) below which pinch zoom is ignored.
pub const PINCH_DEADZONE_PX: f32 = 10.0;
/// Zoom added per pixel of pinch distance change.
pub const PINCH_ZOOM_PER_PX: f32 = 0.005;
/// Spacing of interpolated hit-test points along a fast drag.
pub const INTERPOLATION_STEP_PX: f32 = 5.0;
/// Upper bound on interpolated points for one move event.
const MAX_INTERPOLATION_STEPS: usize = 1024;
/// Idle time after which Move mode falls back to Paint.
pub const IDLE_REVERT_SECS: f64 = 3.0;
/// Zoom change of one zoom-button press.
pub const ZOOM_BUTTON_STEP: f32 = 0.5;
/// Zoom change per point of wheel scroll.
pub const WHEEL_ZOOM_PER_POINT: f32 = 0.01;

/// Identifier of one pointer (mouse, pen, or touch contact).
pub type PointerId = u64;

/// Brush size preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Screen-space hit-test radius in pixels.
    pub fn brush_radius_px(&self) -> f32 {
        match self {
            Difficulty::Easy => 25.0,
            Difficulty::Medium => 12.0,
            Difficulty::Hard => 4.0,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn all() -> &'static [Difficulty] {
        &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }
}

/// What a single pointer does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InteractionMode {
    #[default]
    Paint,
    Move,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Single(InteractionMode),
    Multi,
}

// ============================================================================
// VIEWPORT
// ============================================================================

/// Zoom/pan applied to the content, anchored at the viewport centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub zoom: f32,
    pub pan: Vec2,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: MIN_ZOOM,
            pan: Vec2::ZERO,
        }
    }
}

impl Viewport {
    /// Add `delta` to the zoom, clamped to `[MIN_ZOOM, MAX_ZOOM]`. Returning
    /// to the minimum zoom also recentres the content.
    pub fn zoom_by(&mut self, delta: f32) {
        if !delta.is_finite() {
            return;
        }
        self.zoom = (self.zoom + delta).clamp(MIN_ZOOM, MAX_ZOOM);
        if self.zoom == MIN_ZOOM {
            self.pan = Vec2::ZERO;
        }
    }

    pub fn pan_by(&mut self, delta: Vec2) {
        if delta.x.is_finite() && delta.y.is_finite() {
            self.pan += delta;
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Screen point → unscaled content point (content spans `0..area.size()`).
    /// `None` for an unusable (empty or non-finite) area.
    pub fn screen_to_content(&self, pos: Pos2, area: Rect) -> Option<Pos2> {
        if !usable(area) || !pos.x.is_finite() || !pos.y.is_finite() {
            return None;
        }
        let center = area.size() / 2.0;
        let raw = pos - area.min;
        Some(((raw - self.pan - center) / self.zoom + center).to_pos2())
    }

    /// Inverse of [`screen_to_content`](Self::screen_to_content).
    pub fn content_to_screen(&self, content: Pos2, area: Rect) -> Pos2 {
        let center = area.size() / 2.0;
        area.min + (content.to_vec2() - center) * self.zoom + center + self.pan
    }

    /// Screen point → fractional grid coordinate (cell `(c, r)` spans `c..c+1`).
    pub fn screen_to_grid(&self, pos: Pos2, area: Rect, grid_size: u32) -> Option<Pos2> {
        let content = self.screen_to_content(pos, area)?;
        let g = grid_size as f32;
        Some(Pos2::new(content.x * (g / area.width()), content.y * (g / area.height())))
    }

    /// Screen rectangle covered by cell `index`, for rendering.
    pub fn cell_screen_rect(&self, index: usize, grid_size: u32, area: Rect) -> Rect {
        let g = grid_size.max(1) as usize;
        let (col, row) = ((index % g) as f32, (index / g) as f32);
        let cell = Vec2::new(area.width() / g as f32, area.height() / g as f32);
        let min = Pos2::new(col * cell.x, row * cell.y);
        Rect::from_min_max(
            self.content_to_screen(min, area),
            self.content_to_screen(min + cell, area),
        )
    }
}

fn usable(area: Rect) -> bool {
    let (w, h) = (area.width(), area.height());
    w > 0.0 && h > 0.0 && w.is_finite() && h.is_finite() && area.min.x.is_finite() && area.min.y.is_finite()
}

// ============================================================================
// GESTURE ENGINE
// ============================================================================

/// What one input event produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GestureOutput {
    /// Sorted, de-duplicated candidate cells for the active color.
    pub cells: Vec<usize>,
    /// The first pointer went down.
    pub stroke_started: bool,
    /// The last pointer lifted (or was cancelled).
    pub stroke_ended: bool,
    pub view_changed: bool,
    pub mode_changed: bool,
}

impl GestureOutput {
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty() && !self.stroke_started && !self.stroke_ended && !self.view_changed && !self.mode_changed
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct PinchAnchor {
    distance: f32,
    center: Pos2,
}

pub struct GestureEngine {
    viewport: Viewport,
    mode: InteractionMode,
    difficulty: Difficulty,
    grid_size: u32,
    pointers: BTreeMap<PointerId, Pos2>,
    /// Last position of the single dragging pointer.
    drag_anchor: Option<Pos2>,
    pinch: Option<PinchAnchor>,
    idle_revert: Deadline,
}

impl GestureEngine {
    pub fn new(grid_size: u32, difficulty: Difficulty) -> Self {
        Self {
            viewport: Viewport::default(),
            mode: InteractionMode::Paint,
            difficulty,
            grid_size,
            pointers: BTreeMap::new(),
            drag_anchor: None,
            pinch: None,
            idle_revert: Deadline::default(),
        }
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn mode(&self) -> InteractionMode {
        self.mode
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.difficulty = difficulty;
    }

    pub fn grid_size(&self) -> u32 {
        self.grid_size
    }

    pub fn active_pointers(&self) -> usize {
        self.pointers.len()
    }

    pub fn phase(&self) -> GesturePhase {
        match self.pointers.len() {
            0 => GesturePhase::Idle,
            1 => GesturePhase::Single(self.mode),
            _ => GesturePhase::Multi,
        }
    }

    /// New puzzle on screen: fresh view, no pointers, paint mode.
    pub fn reset_for_puzzle(&mut self, grid_size: u32) {
        self.grid_size = grid_size;
        self.pointers.clear();
        self.drag_anchor = None;
        self.pinch = None;
        self.reset_view();
    }

    /// Zoom 1, no pan, paint mode, revert timer cancelled.
    pub fn reset_view(&mut self) {
        self.idle_revert.cancel();
        self.viewport.reset();
        self.mode = InteractionMode::Paint;
    }

    pub fn set_mode(&mut self, mode: InteractionMode, now: f64) -> bool {
        let changed = self.mode != mode;
        self.mode = mode;
        match mode {
            InteractionMode::Move => self.idle_revert.start(now, IDLE_REVERT_SECS),
            InteractionMode::Paint => self.idle_revert.cancel(),
        }
        changed
    }

    pub fn toggle_mode(&mut self, now: f64) -> InteractionMode {
        let next = match self.mode {
            InteractionMode::Paint => InteractionMode::Move,
            InteractionMode::Move => InteractionMode::Paint,
        };
        self.set_mode(next, now);
        next
    }

    /// Button / keyboard zoom. Restarts the idle revert timer afterwards.
    pub fn zoom_step(&mut self, delta: f32, now: f64) -> bool {
        self.idle_revert.cancel();
        let before = self.viewport;
        self.viewport.zoom_by(delta);
        self.idle_revert.start(now, IDLE_REVERT_SECS);
        before != self.viewport
    }

    /// Ctrl+wheel zoom; `scroll_points` is positive for "zoom in".
    pub fn wheel_zoom(&mut self, scroll_points: f32, now: f64) -> bool {
        self.zoom_step(scroll_points * WHEEL_ZOOM_PER_POINT, now)
    }

    /// Advance timers. Returns `true` if the mode reverted to Paint.
    pub fn tick(&mut self, now: f64) -> bool {
        if self.idle_revert.fire(now) && self.mode != InteractionMode::Paint {
            self.mode = InteractionMode::Paint;
            return true;
        }
        false
    }

    // --- Pointer events ----------------------------------------------------

    pub fn pointer_down(&mut self, id: PointerId, pos: Pos2, area: Rect) -> GestureOutput {
        let mut out = GestureOutput::default();
        self.idle_revert.cancel();

        let was_idle = self.pointers.is_empty();
        if self.pointers.insert(id, pos).is_some() {
            // Repeated down for a tracked pointer: just a position update
            return out;
        }
        out.stroke_started = was_idle;

        match self.pointers.len() {
            2 => {
                self.pinch = self.pinch_measure().map(|(distance, center)| PinchAnchor { distance, center });
            }
            n => {
                self.drag_anchor = Some(pos);
                if n == 1 && self.mode == InteractionMode::Paint {
                    out.cells = self.hit_test(pos, area);
                }
            }
        }
        out
    }

    pub fn pointer_move(&mut self, id: PointerId, pos: Pos2, area: Rect) -> GestureOutput {
        let mut out = GestureOutput::default();
        if !self.pointers.contains_key(&id) {
            return out;
        }
        self.idle_revert.cancel();
        self.pointers.insert(id, pos);

        match self.pointers.len() {
            2 => {
                let Some((distance, center)) = self.pinch_measure() else { return out };
                if let Some(prev) = self.pinch {
                    let before = self.viewport;
                    let distance_delta = distance - prev.distance;
                    if distance_delta.abs() > PINCH_DEADZONE_PX {
                        self.viewport.zoom_by(distance_delta * PINCH_ZOOM_PER_PX);
                    }
                    // Pan follows the midpoint regardless of the zoom deadzone
                    self.viewport.pan_by(center - prev.center);
                    out.view_changed = before != self.viewport;
                }
                self.pinch = Some(PinchAnchor { distance, center });
            }
            1 => {
                let Some(anchor) = self.drag_anchor else { return out };
                match self.mode {
                    InteractionMode::Move => {
                        let before = self.viewport;
                        self.viewport.pan_by(pos - anchor);
                        out.view_changed = before != self.viewport;
                    }
                    InteractionMode::Paint => {
                        out.cells = self.stroke_segment(anchor, pos, area);
                    }
                }
                self.drag_anchor = Some(pos);
            }
            _ => {}
        }
        out
    }

    pub fn pointer_up(&mut self, id: PointerId, now: f64) -> GestureOutput {
        let mut out = GestureOutput::default();
        if self.pointers.remove(&id).is_none() {
            return out;
        }

        match self.pointers.len() {
            0 => {
                self.drag_anchor = None;
                self.pinch = None;
                self.idle_revert.start(now, IDLE_REVERT_SECS);
                out.stroke_ended = true;
            }
            1 => {
                // Remaining pointer continues from where it is, not from the old anchor
                self.drag_anchor = self.pointers.values().next().copied();
                self.pinch = None;
            }
            2 => {
                self.pinch = self.pinch_measure().map(|(distance, center)| PinchAnchor { distance, center });
            }
            _ => {}
        }
        out
    }

    /// Drop every pointer (focus loss, teardown). Cancels the revert timer.
    pub fn cancel_all(&mut self) -> GestureOutput {
        let had_pointers = !self.pointers.is_empty();
        self.pointers.clear();
        self.drag_anchor = None;
        self.pinch = None;
        self.idle_revert.cancel();
        GestureOutput {
            stroke_ended: had_pointers,
            ..Default::default()
        }
    }

    fn pinch_measure(&self) -> Option<(f32, Pos2)> {
        let mut it = self.pointers.values();
        let (a, b) = (*it.next()?, *it.next()?);
        Some((a.distance(b), a.lerp(b, 0.5)))
    }

    // --- Hit testing -------------------------------------------------------

    /// Cells whose centres lie inside the brush around screen point `pos`.
    /// Falls back to the single cell under the pointer when the brush is
    /// smaller than a cell. Empty when the pointer is off the grid or the
    /// area is unusable.
    pub fn hit_test(&self, pos: Pos2, area: Rect) -> Vec<usize> {
        if self.grid_size == 0 {
            return Vec::new();
        }
        let Some(center) = self.viewport.screen_to_grid(pos, area, self.grid_size) else {
            return Vec::new();
        };

        let g = self.grid_size as i64;
        let scale = (self.grid_size as f32 / area.width()) / self.viewport.zoom;
        let radius = self.difficulty.brush_radius_px() * scale;
        let radius_sq = radius * radius;

        let min_col = ((center.x - radius).floor() as i64).max(0);
        let max_col = ((center.x + radius).ceil() as i64).min(g - 1);
        let min_row = ((center.y - radius).floor() as i64).max(0);
        let max_row = ((center.y + radius).ceil() as i64).min(g - 1);

        let mut hits = Vec::new();
        for row in min_row..=max_row {
            for col in min_col..=max_col {
                let dx = col as f32 + 0.5 - center.x;
                let dy = row as f32 + 0.5 - center.y;
                if dx * dx + dy * dy <= radius_sq {
                    hits.push((row * g + col) as usize);
                }
            }
        }

        if hits.is_empty() {
            let col = center.x.floor() as i64;
            let row = center.y.floor() as i64;
            if (0..g).contains(&col) && (0..g).contains(&row) {
                hits.push((row * g + col) as usize);
            }
        }
        hits
    }

    /// Union of hits along `from → to`, sampled every [`INTERPOLATION_STEP_PX`].
    fn stroke_segment(&self, from: Pos2, to: Pos2, area: Rect) -> Vec<usize> {
        let mut cells = BTreeSet::new();
        let dist = from.distance(to);
        let steps = ((dist / INTERPOLATION_STEP_PX).ceil() as usize).min(MAX_INTERPOLATION_STEPS);
        for i in 1..=steps {
            let t = i as f32 / steps as f32;
            cells.extend(self.hit_test(from.lerp(to, t), area));
        }
        cells.extend(self.hit_test(to, area));
        cells.into_iter().collect()
    }
}
