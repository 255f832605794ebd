//! Application state for one running ColorSplash instance.
//!
//! Every mutation happens synchronously on the caller's thread. Observers
//! (the GUI) compare [`Session::revision`] against the value they last drew
//! and repaint when it moved. Time is passed in as seconds (`f64`) so timers
//! are driven by whatever clock the host uses.

use std::path::PathBuf;
use std::sync::Arc;

use egui::{Pos2, Rect};
use rand::Rng;

use crate::components::gesture::{Difficulty, GestureEngine, GestureOutput, InteractionMode, PointerId};
use crate::grid::PuzzleGrid;
use crate::io::{PuzzleStore, SavedPuzzle, StoreError};
use crate::learning::{feedback_weight, Feedback, LearningStore};
use crate::ops::jobs::{JobPurpose, QuantizeJobs, QuantizeResult};
use crate::prompt;
use crate::provider::{GeneratedImage, GenerationError, GenerationRequest, UsageStats};
use crate::puzzle::{PaintOutcome, Puzzle, PuzzleMeta};
use crate::settings::{AppSettings, MAX_COLOR_COUNT, MAX_GRID_SIZE, MIN_COLOR_COUNT, MIN_GRID_SIZE};
use crate::timer::Deadline;

pub const GENERATION_COOLDOWN_SECS: f64 = 10.0;
pub const HINT_SECS: f64 = 3.0;
pub const TOAST_SECS: f64 = 2.0;

pub const QUANTIZE_ERROR_MESSAGE: &str = "Error creating your puzzle.";
pub const GALLERY_ERROR_MESSAGE: &str = "Could not save to gallery. Try starting the game instead.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Input,
    Preview,
    Processing,
    Playing,
    Complete,
}

/// Why `begin_generation` did not start anything.
#[derive(Clone, Debug, PartialEq)]
pub enum StartRefusal {
    CoolingDown { remaining_secs: f64 },
    EmptyPrompt,
    UnknownItem,
    WrongStage(Stage),
    AlreadyGenerating,
}

/// A generated (or loaded) image waiting for confirmation.
#[derive(Clone, Debug)]
pub struct Preview {
    pub bytes: Arc<[u8]>,
    pub stats: Option<UsageStats>,
    /// Cheer line shown above the preview.
    pub title: &'static str,
}

/// Something `poll_jobs` finished.
#[derive(Clone, Debug, PartialEq)]
pub enum JobEvent {
    PuzzleReady,
    SavedToGallery(PathBuf),
    Failed(String),
}

pub struct Session {
    stage: Stage,
    settings: AppSettings,
    prompt: String,
    category: Option<String>,
    preview: Option<Preview>,
    puzzle: Option<Puzzle>,
    gesture: GestureEngine,
    jobs: QuantizeJobs,
    error: Option<String>,
    generating: bool,
    saving_to_gallery: bool,
    /// Set after a gallery save until the gallery is next opened.
    just_saved: bool,
    cooldown: Deadline,
    hint: Option<usize>,
    hint_timer: Deadline,
    toast: Option<String>,
    toast_timer: Deadline,
    revision: u64,
}

impl Session {
    pub fn new(settings: AppSettings) -> Self {
        Self {
            stage: Stage::Input,
            gesture: GestureEngine::new(settings.grid_size, settings.difficulty),
            settings,
            prompt: String::new(),
            category: None,
            preview: None,
            puzzle: None,
            jobs: QuantizeJobs::new(),
            error: None,
            generating: false,
            saving_to_gallery: false,
            just_saved: false,
            cooldown: Deadline::default(),
            hint: None,
            hint_timer: Deadline::default(),
            toast: None,
            toast_timer: Deadline::default(),
            revision: 0,
        }
    }

    fn touch(&mut self) {
        self.revision = self.revision.wrapping_add(1);
    }

    // --- Accessors -----------------------------------------------------------

    /// Bumped on every visible change.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn settings(&self) -> &AppSettings {
        &self.settings
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn preview(&self) -> Option<&Preview> {
        self.preview.as_ref()
    }

    pub fn puzzle(&self) -> Option<&Puzzle> {
        self.puzzle.as_ref()
    }

    pub fn gesture(&self) -> &GestureEngine {
        &self.gesture
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn clear_error(&mut self) {
        if self.error.take().is_some() {
            self.touch();
        }
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    pub fn is_processing(&self) -> bool {
        self.jobs.is_busy()
    }

    pub fn is_saving_to_gallery(&self) -> bool {
        self.saving_to_gallery
    }

    /// Returns and clears the "just saved" flag.
    pub fn take_just_saved(&mut self) -> bool {
        std::mem::take(&mut self.just_saved)
    }

    pub fn hint_cell(&self) -> Option<usize> {
        self.hint
    }

    pub fn toast_message(&self) -> Option<&str> {
        self.toast.as_deref()
    }

    /// Whole seconds left before another generation may start.
    pub fn cooldown_remaining(&self, now: f64) -> u64 {
        self.cooldown.remaining(now).map_or(0, |s| s.ceil() as u64)
    }

    // --- Preferences -----------------------------------------------------------

    pub fn set_prompt(&mut self, text: &str) {
        self.prompt = text.to_string();
        self.touch();
    }

    /// Choosing (or leaving) a category clears the typed prompt.
    pub fn select_category(&mut self, category: Option<&str>) {
        self.category = category.map(str::to_string);
        self.prompt.clear();
        self.touch();
    }

    pub fn set_style(&mut self, style: &str) {
        if prompt::style(style).is_some() {
            self.settings.style = style.to_string();
            self.touch();
        }
    }

    pub fn set_difficulty(&mut self, difficulty: Difficulty) {
        self.settings.difficulty = difficulty;
        self.gesture.set_difficulty(difficulty);
        if let Some(p) = self.puzzle.as_mut() {
            p.set_difficulty(difficulty);
        }
        self.touch();
    }

    pub fn set_grid_size(&mut self, grid_size: u32) {
        self.settings.grid_size = grid_size.clamp(MIN_GRID_SIZE, MAX_GRID_SIZE);
        self.touch();
    }

    pub fn set_color_count(&mut self, color_count: usize) {
        self.settings.color_count = color_count.clamp(MIN_COLOR_COUNT, MAX_COLOR_COUNT);
        self.touch();
    }

    pub fn set_transparent_mode(&mut self, on: bool) {
        self.settings.transparent_mode = on;
        self.touch();
    }

    // --- Generation ------------------------------------------------------------

    /// Start generating from the typed prompt. On success the caller hands
    /// the returned request to an image provider and reports back through
    /// [`finish_generation`](Self::finish_generation).
    pub fn begin_generation(&mut self, now: f64, learning: &LearningStore) -> Result<GenerationRequest, StartRefusal> {
        let subject = self.prompt.trim().to_string();
        self.start_request(subject, now, learning)
    }

    /// Start generating from a category item, letting the learned profile
    /// decide whether a companion character may join the scene.
    pub fn begin_category_generation<R: Rng + ?Sized>(
        &mut self,
        category_id: &str,
        item_label: &str,
        now: f64,
        learning: &LearningStore,
        rng: &mut R,
    ) -> Result<GenerationRequest, StartRefusal> {
        self.check_can_start(now)?;
        let item = prompt::category(category_id)
            .and_then(|c| c.items.iter().find(|i| i.label == item_label))
            .ok_or(StartRefusal::UnknownItem)?;
        self.category = Some(category_id.to_string());
        let allow_extras = learning.should_include_extra_objects(category_id);
        let subject = prompt::smart_prompt(category_id, item.label, item.prompt, allow_extras, rng);
        self.start_request(subject, now, learning)
    }

    fn check_can_start(&self, now: f64) -> Result<(), StartRefusal> {
        if self.generating {
            return Err(StartRefusal::AlreadyGenerating);
        }
        if !matches!(self.stage, Stage::Input | Stage::Preview) {
            return Err(StartRefusal::WrongStage(self.stage));
        }
        if let Some(remaining_secs) = self.cooldown.remaining(now).filter(|&r| r > 0.0) {
            return Err(StartRefusal::CoolingDown { remaining_secs });
        }
        Ok(())
    }

    fn start_request(&mut self, subject: String, now: f64, learning: &LearningStore) -> Result<GenerationRequest, StartRefusal> {
        self.check_can_start(now)?;
        if subject.is_empty() {
            return Err(StartRefusal::EmptyPrompt);
        }

        let modifiers = self.category.as_deref().map(|c| learning.prompt_modifiers(c));
        let request = GenerationRequest::new(&subject, &self.settings.style, modifiers);

        self.prompt = subject;
        self.preview = None;
        self.error = None;
        self.generating = true;
        self.cooldown.start(now, GENERATION_COOLDOWN_SECS);
        self.touch();
        crate::log_info!("Generating '{}' ({})", request.subject, request.style);
        Ok(request)
    }

    /// Install the provider's answer. Failures keep the current stage and
    /// surface a message; a result arriving after a reset is dropped.
    pub fn finish_generation<R: Rng + ?Sized>(&mut self, result: Result<GeneratedImage, GenerationError>, rng: &mut R) {
        if !self.generating {
            return;
        }
        self.generating = false;
        match result {
            Ok(image) => {
                self.preview = Some(Preview {
                    bytes: image.bytes.into(),
                    stats: Some(image.stats),
                    title: prompt::success_title(self.category.as_deref(), rng),
                });
                self.stage = Stage::Preview;
            }
            Err(e) => {
                crate::log_warn!("Generation failed: {:?}", e);
                self.error = Some(e.to_string());
            }
        }
        self.touch();
    }

    /// Use an image from elsewhere (file, clipboard) as the preview.
    pub fn load_preview_image(&mut self, bytes: Vec<u8>, subject: &str) {
        self.jobs.cancel();
        self.generating = false;
        self.saving_to_gallery = false;
        self.prompt = subject.to_string();
        self.preview = Some(Preview {
            bytes: bytes.into(),
            stats: None,
            title: "Nice!",
        });
        self.error = None;
        self.stage = Stage::Preview;
        self.touch();
    }

    /// Turn the preview into a playable puzzle in the background.
    pub fn confirm_puzzle(&mut self) -> bool {
        let Some(preview) = &self.preview else { return false };
        if self.stage != Stage::Preview {
            return false;
        }
        let bytes = preview.bytes.clone();
        self.saving_to_gallery = false;
        self.jobs
            .spawn(bytes, self.settings.grid_size, self.settings.color_count, JobPurpose::Play);
        self.stage = Stage::Processing;
        self.error = None;
        self.touch();
        true
    }

    /// Quantize the preview and store it in the gallery without playing.
    pub fn save_preview_to_gallery(&mut self) -> bool {
        let Some(preview) = &self.preview else { return false };
        if self.stage != Stage::Preview {
            return false;
        }
        let bytes = preview.bytes.clone();
        self.jobs
            .spawn(bytes, self.settings.grid_size, self.settings.color_count, JobPurpose::Gallery);
        self.saving_to_gallery = true;
        self.error = None;
        self.touch();
        true
    }

    /// Pick up a finished quantize job, if any.
    pub fn poll_jobs<R: Rng + ?Sized>(
        &mut self,
        store: Option<&PuzzleStore>,
        learning: &mut LearningStore,
        rng: &mut R,
    ) -> Option<JobEvent> {
        let result = self.jobs.poll()?;
        Some(self.install_job(result, store, learning, rng))
    }

    /// Blocking variant of [`poll_jobs`](Self::poll_jobs).
    pub fn wait_jobs<R: Rng + ?Sized>(
        &mut self,
        timeout: std::time::Duration,
        store: Option<&PuzzleStore>,
        learning: &mut LearningStore,
        rng: &mut R,
    ) -> Option<JobEvent> {
        let result = self.jobs.wait(timeout)?;
        Some(self.install_job(result, store, learning, rng))
    }

    fn install_job<R: Rng + ?Sized>(
        &mut self,
        result: QuantizeResult,
        store: Option<&PuzzleStore>,
        learning: &mut LearningStore,
        rng: &mut R,
    ) -> JobEvent {
        let grid = result
            .outcome
            .map_err(|e| e.to_string())
            .and_then(|q| PuzzleGrid::from_quantized(q).map_err(|e| e.to_string()));

        let event = match (result.purpose, grid) {
            (JobPurpose::Play, Ok(grid)) => {
                let puzzle = Puzzle::new(grid, self.meta_for_new_puzzle(), self.settings.undo_cap());
                crate::log_info!(
                    "Puzzle {} ready: {}x{} cells, {} colors",
                    puzzle.id(),
                    puzzle.grid().size(),
                    puzzle.grid().size(),
                    puzzle.grid().palette().len()
                );
                self.gesture.reset_for_puzzle(puzzle.grid().size());
                self.puzzle = Some(puzzle);
                self.clear_hint();
                self.stage = Stage::Playing;
                JobEvent::PuzzleReady
            }
            (JobPurpose::Play, Err(msg)) => {
                crate::log_err!("Quantization failed: {}", msg);
                self.error = Some(QUANTIZE_ERROR_MESSAGE.to_string());
                self.stage = Stage::Preview;
                JobEvent::Failed(msg)
            }
            (JobPurpose::Gallery, grid) => {
                self.saving_to_gallery = false;
                let saved = grid.map_err(StoreError::InvalidFormat).and_then(|grid| {
                    let puzzle = Puzzle::new(grid, self.meta_for_new_puzzle(), None);
                    let store = store.ok_or_else(|| StoreError::InvalidFormat("No gallery directory".into()))?;
                    store.save(&SavedPuzzle::from_puzzle(&puzzle))
                });
                match saved {
                    Ok(path) => {
                        if let Some(category) = self.category.clone() {
                            learning.record_save(&category, rng);
                        }
                        self.reset_to_input();
                        self.just_saved = true;
                        JobEvent::SavedToGallery(path)
                    }
                    Err(e) => {
                        crate::log_err!("Gallery save failed: {}", e);
                        self.error = Some(GALLERY_ERROR_MESSAGE.to_string());
                        JobEvent::Failed(e.to_string())
                    }
                }
            }
        };
        self.touch();
        event
    }

    fn meta_for_new_puzzle(&self) -> PuzzleMeta {
        PuzzleMeta {
            prompt: self.prompt.clone(),
            style: self.settings.style.clone(),
            category: self.category.clone(),
            difficulty: self.settings.difficulty,
            color_count: self.settings.color_count,
        }
    }

    /// Drop the preview and go back to input. With a category selected, the
    /// feedback (if any) is recorded first.
    pub fn discard_preview(&mut self, feedback: Option<Feedback>, learning: &mut LearningStore) {
        if let (Some(category), Some(feedback)) = (self.category.as_deref(), feedback) {
            learning.record_feedback(category, feedback, feedback_weight(self.settings.transparent_mode));
        }
        self.jobs.cancel();
        self.saving_to_gallery = false;
        self.preview = None;
        self.stage = Stage::Input;
        self.touch();
    }

    // --- Saved puzzles -----------------------------------------------------------

    /// Save the current puzzle's progress and show a toast.
    pub fn save_progress<R: Rng + ?Sized>(
        &mut self,
        store: &PuzzleStore,
        learning: &mut LearningStore,
        rng: &mut R,
        now: f64,
    ) -> Result<PathBuf, StoreError> {
        let Some(puzzle) = &self.puzzle else {
            return Err(StoreError::InvalidFormat("No puzzle to save".into()));
        };
        let path = store.save(&SavedPuzzle::from_puzzle(puzzle))?;
        if let Some(category) = self.category.clone() {
            learning.record_save(&category, rng);
        }
        self.show_toast("Saved to gallery!", now);
        Ok(path)
    }

    /// Resume a stored puzzle with empty history.
    pub fn load_saved(&mut self, saved: &SavedPuzzle) -> Result<(), StoreError> {
        let puzzle = saved.to_puzzle(self.settings.undo_cap())?;
        self.jobs.cancel();
        self.generating = false;
        self.saving_to_gallery = false;
        self.settings.difficulty = saved.meta.difficulty;
        self.settings.style = saved.meta.style.clone();
        self.gesture.set_difficulty(saved.meta.difficulty);
        self.gesture.reset_for_puzzle(puzzle.grid().size());
        self.stage = if puzzle.is_complete() { Stage::Complete } else { Stage::Playing };
        self.prompt = saved.meta.prompt.clone();
        self.category = None;
        self.preview = None;
        self.error = None;
        self.puzzle = Some(puzzle);
        self.clear_hint();
        self.touch();
        Ok(())
    }

    pub fn restart_puzzle(&mut self) {
        let Some(puzzle) = self.puzzle.as_mut() else { return };
        puzzle.restart();
        self.gesture.cancel_all();
        self.clear_hint();
        self.stage = Stage::Playing;
        self.touch();
    }

    /// Back to the start screen, keeping preferences.
    pub fn reset_to_input(&mut self) {
        self.jobs.cancel();
        self.gesture.cancel_all();
        self.gesture.reset_view();
        self.generating = false;
        self.saving_to_gallery = false;
        self.puzzle = None;
        self.preview = None;
        self.category = None;
        self.prompt.clear();
        self.clear_hint();
        self.stage = Stage::Input;
        self.touch();
    }

    // --- Canvas input ------------------------------------------------------------

    pub fn pointer_down(&mut self, id: PointerId, pos: Pos2, area: Rect) -> PaintOutcome {
        if !self.accepts_canvas_input() {
            return PaintOutcome::default();
        }
        let out = self.gesture.pointer_down(id, pos, area);
        self.apply_gesture(out)
    }

    pub fn pointer_move(&mut self, id: PointerId, pos: Pos2, area: Rect) -> PaintOutcome {
        if !self.accepts_canvas_input() {
            return PaintOutcome::default();
        }
        let out = self.gesture.pointer_move(id, pos, area);
        self.apply_gesture(out)
    }

    pub fn pointer_up(&mut self, id: PointerId, now: f64) {
        let out = self.gesture.pointer_up(id, now);
        self.apply_gesture(out);
    }

    /// Drop every pointer (focus lost, window hidden).
    pub fn pointer_cancel(&mut self) {
        let out = self.gesture.cancel_all();
        self.apply_gesture(out);
    }

    fn accepts_canvas_input(&self) -> bool {
        self.puzzle.is_some() && matches!(self.stage, Stage::Playing | Stage::Complete)
    }

    fn apply_gesture(&mut self, out: GestureOutput) -> PaintOutcome {
        let mut outcome = PaintOutcome::default();
        let Some(puzzle) = self.puzzle.as_mut() else { return outcome };
        let puzzle_id = puzzle.id();

        if out.stroke_started {
            puzzle.begin_stroke();
        }
        if !out.cells.is_empty() && self.stage == Stage::Playing {
            outcome = puzzle.paint(&out.cells);
        }
        if out.stroke_ended {
            puzzle.end_stroke();
        }

        if outcome.painted > 0 {
            self.clear_hint();
        }
        if outcome.completed_now {
            crate::log_info!("Puzzle {} complete", puzzle_id);
            self.stage = Stage::Complete;
        }
        if outcome.painted > 0 || out.view_changed || out.mode_changed {
            self.touch();
        }
        outcome
    }

    pub fn zoom_step(&mut self, delta: f32, now: f64) {
        if self.gesture.zoom_step(delta, now) {
            self.touch();
        }
    }

    /// `scroll_points` positive zooms in.
    pub fn wheel_zoom(&mut self, scroll_points: f32, now: f64) {
        if self.gesture.wheel_zoom(scroll_points, now) {
            self.touch();
        }
    }

    pub fn toggle_mode(&mut self, now: f64) -> InteractionMode {
        let mode = self.gesture.toggle_mode(now);
        self.touch();
        mode
    }

    pub fn reset_view(&mut self) {
        self.gesture.reset_view();
        self.touch();
    }

    // --- Puzzle actions ------------------------------------------------------------

    /// Undo/redo only while playing; a finished puzzle stays finished.
    pub fn undo(&mut self) -> bool {
        if self.stage != Stage::Playing {
            return false;
        }
        let done = self.puzzle.as_mut().is_some_and(|p| p.undo());
        if done {
            self.clear_hint();
            self.touch();
        }
        done
    }

    pub fn redo(&mut self) -> bool {
        if self.stage != Stage::Playing {
            return false;
        }
        let done = self.puzzle.as_mut().is_some_and(|p| p.redo());
        if done {
            self.clear_hint();
            self.touch();
        }
        done
    }

    pub fn select_color(&mut self, index: usize) -> bool {
        let done = self.puzzle.as_mut().is_some_and(|p| p.select_color(index));
        if done {
            self.touch();
        }
        done
    }

    /// Highlight a random uncolored cell of the active color for a few seconds.
    pub fn hint<R: Rng + ?Sized>(&mut self, now: f64, rng: &mut R) -> Option<usize> {
        if self.stage != Stage::Playing {
            return None;
        }
        let cell = self.puzzle.as_ref()?.hint_candidate(rng)?;
        self.hint = Some(cell);
        self.hint_timer.start(now, HINT_SECS);
        self.touch();
        Some(cell)
    }

    fn clear_hint(&mut self) {
        self.hint = None;
        self.hint_timer.cancel();
    }

    pub fn show_toast(&mut self, message: &str, now: f64) {
        self.toast = Some(message.to_string());
        self.toast_timer.start(now, TOAST_SECS);
        self.touch();
    }

    /// Advance every timer. Returns `true` if anything visible changed.
    pub fn tick(&mut self, now: f64) -> bool {
        let mut changed = self.gesture.tick(now);
        if self.hint_timer.fire(now) {
            self.hint = None;
            changed = true;
        }
        if self.toast_timer.fire(now) {
            self.toast = None;
            changed = true;
        }
        if self.cooldown.fire(now) {
            changed = true;
        }
        if changed {
            self.touch();
        }
        changed
    }

    /// Cancel every timer, pointer and background job.
    pub fn teardown(&mut self) {
        self.jobs.cancel();
        self.gesture.cancel_all();
        self.hint_timer.cancel();
        self.toast_timer.cancel();
        self.cooldown.cancel();
        self.generating = false;
        self.saving_to_gallery = false;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::tests::split_grid;
    use crate::provider::UsageStats;
    use egui::Vec2;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(9)
    }

    fn image() -> Result<GeneratedImage, GenerationError> {
        Ok(GeneratedImage {
            bytes: vec![1, 2, 3],
            stats: UsageStats::default(),
        })
    }

    fn playing_session() -> Session {
        let mut s = Session::new(AppSettings::default());
        let saved = SavedPuzzle::from_puzzle(&Puzzle::new(split_grid(), PuzzleMeta::default(), None));
        s.load_saved(&saved).unwrap();
        s.set_difficulty(Difficulty::Hard);
        s
    }

    /// 4×4 grid in a 40×40 area: 10 px per cell.
    fn area() -> Rect {
        Rect::from_min_size(Pos2::ZERO, Vec2::splat(40.0))
    }

    fn cell_center(index: usize) -> Pos2 {
        Pos2::new((index % 4) as f32 * 10.0 + 5.0, (index / 4) as f32 * 10.0 + 5.0)
    }

    #[test]
    fn generation_respects_cooldown_and_empty_prompt() {
        let learning = LearningStore::in_memory();
        let mut s = Session::new(AppSettings::default());
        assert_eq!(s.begin_generation(0.0, &learning), Err(StartRefusal::EmptyPrompt));

        s.set_prompt("  a red fox ");
        let req = s.begin_generation(0.0, &learning).unwrap();
        assert_eq!(req.subject, "a red fox");
        assert!(s.is_generating());
        s.finish_generation(image(), &mut rng());
        assert_eq!(s.stage(), Stage::Preview);

        s.set_prompt("another");
        assert!(matches!(
            s.begin_generation(4.0, &learning),
            Err(StartRefusal::CoolingDown { .. })
        ));
        assert_eq!(s.cooldown_remaining(4.0), 6);
        assert!(s.begin_generation(10.0, &learning).is_ok());
    }

    #[test]
    fn failed_generation_keeps_stage_and_reports() {
        let learning = LearningStore::in_memory();
        let mut s = Session::new(AppSettings::default());
        s.set_prompt("cat");
        s.begin_generation(0.0, &learning).unwrap();
        s.finish_generation(Err(GenerationError::RateLimited), &mut rng());
        assert_eq!(s.stage(), Stage::Input);
        assert_eq!(s.error(), Some("The magic pencil is tired. Wait a few seconds!"));
    }

    #[test]
    fn category_generation_uses_learned_modifiers() {
        let mut learning = LearningStore::in_memory();
        learning.record_feedback("animals", Feedback::Boring, 1);
        let mut s = Session::new(AppSettings::default());
        let req = s
            .begin_category_generation("animals", "Lion", 0.0, &learning, &mut rng())
            .unwrap();
        assert_eq!(req.subject, "A lion");
        assert_eq!(req.modifiers.as_deref(), Some("active pose"));
        assert_eq!(s.category(), Some("animals"));
    }

    #[test]
    fn discard_records_weighted_feedback() {
        let mut learning = LearningStore::in_memory();
        let mut settings = AppSettings::default();
        settings.transparent_mode = true;
        let mut s = Session::new(settings);
        s.begin_category_generation("space", "Rocket", 0.0, &learning, &mut rng())
            .unwrap();
        s.finish_generation(image(), &mut rng());
        s.discard_preview(Some(Feedback::Complex), &mut learning);
        assert_eq!(s.stage(), Stage::Input);
        assert!(s.preview().is_none());
        assert_eq!(learning.profile("space").unwrap().simplify, 2);
    }

    #[test]
    fn undecodable_preview_returns_to_preview_with_message() {
        let mut learning = LearningStore::in_memory();
        let mut s = Session::new(AppSettings::default());
        s.load_preview_image(b"not an image".to_vec(), "junk");
        assert!(s.confirm_puzzle());
        assert_eq!(s.stage(), Stage::Processing);
        let event = s
            .wait_jobs(std::time::Duration::from_secs(10), None, &mut learning, &mut rng())
            .unwrap();
        assert!(matches!(event, JobEvent::Failed(_)));
        assert_eq!(s.stage(), Stage::Preview);
        assert_eq!(s.error(), Some(QUANTIZE_ERROR_MESSAGE));
        assert!(s.preview().is_some());
    }

    #[test]
    fn drag_paints_one_undo_unit_and_advances_color() {
        let mut s = playing_session();
        s.pointer_down(1, cell_center(0), area());
        for i in [1usize, 5, 4, 8, 9, 13, 12] {
            s.pointer_move(1, cell_center(i), area());
        }
        s.pointer_up(1, 1.0);

        let p = s.puzzle().unwrap();
        assert_eq!(p.grid().completed(), 8);
        assert_eq!(p.active_color(), 1);
        assert_eq!(p.history().undo_count(), 1);

        assert!(s.undo());
        assert_eq!(s.puzzle().unwrap().grid().completed(), 0);
        assert_eq!(s.puzzle().unwrap().active_color(), 0);
    }

    #[test]
    fn completing_switches_stage_and_locks_undo() {
        let mut s = playing_session();
        let left = [0usize, 1, 4, 5, 8, 9, 12, 13];
        let right = [2usize, 3, 6, 7, 10, 11, 14, 15];
        for (stroke, cells) in [left, right].iter().enumerate() {
            let id = stroke as u64;
            s.pointer_down(id, cell_center(cells[0]), area());
            let mut last = PaintOutcome::default();
            for &c in &cells[1..] {
                last = s.pointer_move(id, cell_center(c), area());
            }
            s.pointer_up(id, 1.0);
            if stroke == 1 {
                assert!(last.completed_now);
            }
        }
        assert_eq!(s.stage(), Stage::Complete);
        assert!(!s.undo());

        s.restart_puzzle();
        assert_eq!(s.stage(), Stage::Playing);
        assert_eq!(s.puzzle().unwrap().grid().completed(), 0);
    }

    #[test]
    fn hint_clears_after_timeout_or_paint() {
        let mut s = playing_session();
        let cell = s.hint(0.0, &mut rng()).unwrap();
        assert!(s.puzzle().unwrap().grid().cell(cell).unwrap().color() == 0);
        assert!(!s.tick(2.9));
        assert!(s.tick(3.0));
        assert_eq!(s.hint_cell(), None);

        s.hint(5.0, &mut rng());
        s.pointer_down(1, cell_center(0), area());
        assert_eq!(s.hint_cell(), None);
    }

    #[test]
    fn toast_dismisses_itself() {
        let mut s = Session::new(AppSettings::default());
        s.show_toast("hello", 1.0);
        assert_eq!(s.toast_message(), Some("hello"));
        s.tick(3.0);
        assert_eq!(s.toast_message(), None);
    }

    #[test]
    fn canvas_input_is_ignored_outside_play() {
        let mut s = Session::new(AppSettings::default());
        let before = s.revision();
        assert_eq!(s.pointer_down(1, Pos2::new(5.0, 5.0), area()), PaintOutcome::default());
        s.pointer_up(1, 0.0);
        assert_eq!(s.revision(), before);
    }

    #[test]
    fn reset_to_input_keeps_preferences() {
        let mut s = playing_session();
        s.set_grid_size(64);
        s.reset_to_input();
        assert_eq!(s.stage(), Stage::Input);
        assert!(s.puzzle().is_none());
        assert_eq!(s.settings().grid_size, 64);
        assert_eq!(s.settings().difficulty, Difficulty::Hard);
    }
}
