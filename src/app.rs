use crate::components::gesture::{Difficulty, InteractionMode, PointerId};
use crate::io::{PuzzleStore, SavedPuzzle};
use crate::learning::{Feedback, LearningStore};
use crate::prompt::{CATEGORIES, STYLES};
use crate::provider::{FolderProvider, GeneratedImage, GenerationError, GenerationRequest, ImageProvider, request_image};
use crate::session::{JobEvent, Session, Stage, StartRefusal};
use crate::settings::{AppSettings, MAX_COLOR_COUNT, MAX_GRID_SIZE, MIN_COLOR_COUNT, MIN_GRID_SIZE};
use eframe::egui;
use egui::{Align2, Color32, FontId, Key, Pos2, Rect, Sense, Stroke, Vec2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;

// ============================================================================
// ASYNC GENERATION PIPELINE: provider calls off the UI thread
// ============================================================================

/// Result delivered from a background provider call. The token identifies
/// the request; anything but the latest is stale and dropped.
struct GenerationResult {
    token: u64,
    outcome: Result<GeneratedImage, GenerationError>,
}

/// Mouse pointer id; touch ids are shifted up by one to stay distinct.
const MOUSE_POINTER: PointerId = 0;
/// Pointer events arriving this soon after a touch are the platform's
/// emulated mouse and are ignored.
const TOUCH_MOUSE_SUPPRESS_SECS: f64 = 0.5;
/// Ctrl+wheel arrives as a zoom factor; this maps `ln(factor)` to wheel points.
const ZOOM_FACTOR_TO_POINTS: f32 = 200.0;
/// Smallest on-screen cell width that still gets its number drawn.
const MIN_NUMBER_CELL_PX: f32 = 9.0;
/// Repaint cadence while timers or background work are pending.
const TICK_INTERVAL: Duration = Duration::from_millis(100);

pub struct PuzzleApp {
    session: Session,
    learning: LearningStore,
    store: Option<PuzzleStore>,
    provider: Arc<dyn ImageProvider>,
    generation_sender: mpsc::Sender<GenerationResult>,
    generation_receiver: mpsc::Receiver<GenerationResult>,
    generation_token: u64,
    rng: StdRng,

    /// Last settings written to disk; compared each frame.
    saved_settings: AppSettings,

    show_gallery: bool,
    gallery: Vec<SavedPuzzle>,

    /// Decoded preview keyed by the address of the preview bytes.
    preview_texture: Option<(usize, egui::TextureHandle)>,
    preview_decode_failed: bool,

    /// One-line message from the last refused action.
    notice: Option<String>,

    last_touch_time: f64,
    was_focused: bool,
}

impl PuzzleApp {
    pub fn new(_cc: &eframe::CreationContext<'_>) -> Self {
        // Initialize settings from disk (or defaults if no saved file)
        let settings = AppSettings::load();

        let learning = match LearningStore::default_path() {
            Some(path) => LearningStore::open(&path),
            None => LearningStore::in_memory(),
        };

        let store = settings.gallery_path().map(PuzzleStore::new);
        let library = settings
            .image_library_path()
            .unwrap_or_else(|| PathBuf::from("library"));
        crate::log_info!("Image library: {}", library.display());
        if let Some(store) = &store {
            crate::log_info!("Gallery: {}", store.dir().display());
        }

        let (generation_sender, generation_receiver) = mpsc::channel();

        Self {
            session: Session::new(settings.clone()),
            learning,
            store,
            provider: Arc::new(FolderProvider::new(library)),
            generation_sender,
            generation_receiver,
            generation_token: 0,
            rng: StdRng::from_entropy(),
            saved_settings: settings,
            show_gallery: false,
            gallery: Vec::new(),
            preview_texture: None,
            preview_decode_failed: false,
            notice: None,
            last_touch_time: f64::NEG_INFINITY,
            was_focused: true,
        }
    }

    // --- Generation ----------------------------------------------------------

    fn start_generation(&mut self, request: Result<GenerationRequest, StartRefusal>, now: f64) {
        let request = match request {
            Ok(r) => r,
            Err(refusal) => {
                self.notice = refusal_message(&refusal, &self.session, now);
                return;
            }
        };
        self.notice = None;
        self.generation_token += 1;
        let token = self.generation_token;
        let provider = Arc::clone(&self.provider);
        let sender = self.generation_sender.clone();
        rayon::spawn(move || {
            let outcome = request_image(provider.as_ref(), &request);
            let _ = sender.send(GenerationResult { token, outcome });
        });
    }

    fn poll_background(&mut self, now: f64) {
        while let Ok(result) = self.generation_receiver.try_recv() {
            if result.token != self.generation_token {
                continue;
            }
            self.session.finish_generation(result.outcome, &mut self.rng);
        }

        while let Some(event) = self
            .session
            .poll_jobs(self.store.as_ref(), &mut self.learning, &mut self.rng)
        {
            match event {
                JobEvent::PuzzleReady => {}
                JobEvent::SavedToGallery(path) => {
                    crate::log_info!("Saved puzzle to {}", path.display());
                    self.session.show_toast("Saved to gallery!", now);
                }
                JobEvent::Failed(msg) => {
                    crate::log_warn!("Background job failed: {}", msg);
                }
            }
        }
    }

    fn refresh_gallery(&mut self) {
        self.gallery = self.store.as_ref().map(|s| s.list()).unwrap_or_default();
    }

    fn persist_settings_if_changed(&mut self) {
        if self.session.settings() != &self.saved_settings {
            self.saved_settings = self.session.settings().clone();
            self.saved_settings.save();
        }
    }

    // --- Input stage -----------------------------------------------------------

    fn show_input(&mut self, ui: &mut egui::Ui, now: f64) {
        ui.vertical_centered(|ui| {
            ui.heading("What do you want to color?");
        });
        ui.add_space(8.0);

        let mut prompt = self.session.prompt().to_string();
        let generating = self.session.is_generating();
        let mut submit = false;
        ui.horizontal(|ui| {
            let edit = ui.add_enabled(
                !generating,
                egui::TextEdit::singleline(&mut prompt)
                    .hint_text("A dragon eating ice cream")
                    .desired_width(ui.available_width() - 90.0),
            );
            if edit.changed() {
                self.session.set_prompt(&prompt);
            }
            if edit.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter)) {
                submit = true;
            }
            if ui.add_enabled(!generating, egui::Button::new("Create!")).clicked() {
                submit = true;
            }
        });
        if submit {
            let request = self.session.begin_generation(now, &self.learning);
            self.start_generation(request, now);
        }

        if generating {
            ui.horizontal(|ui| {
                ui.spinner();
                ui.label("Drawing your picture...");
            });
        }
        let cooldown = self.session.cooldown_remaining(now);
        if cooldown > 0 && !generating {
            ui.weak(format!("Next picture in {}s", cooldown));
        }

        ui.add_space(12.0);
        ui.label("Or pick something:");
        let mut picked: Option<(&'static str, &'static str)> = None;
        egui::ScrollArea::vertical().max_height(260.0).show(ui, |ui| {
            for category in CATEGORIES {
                egui::CollapsingHeader::new(category.label)
                    .id_source(category.id)
                    .show(ui, |ui| {
                        ui.horizontal_wrapped(|ui| {
                            for item in category.items {
                                if ui.add_enabled(!generating, egui::Button::new(item.label)).clicked() {
                                    picked = Some((category.id, item.label));
                                }
                            }
                        });
                        if self.session.settings().transparent_mode {
                            ui.weak(self.learning.profile_stats(category.id));
                        }
                    });
            }
        });
        if let Some((category_id, label)) = picked {
            let request =
                self.session
                    .begin_category_generation(category_id, label, now, &self.learning, &mut self.rng);
            self.start_generation(request, now);
        }

        ui.add_space(12.0);
        ui.separator();
        self.show_preferences(ui);

        ui.add_space(8.0);
        ui.horizontal(|ui| {
            if ui.button("My gallery").clicked() {
                self.refresh_gallery();
                self.show_gallery = true;
            }
            ui.weak("Tip: drop an image file here to color it.");
        });
    }

    fn show_preferences(&mut self, ui: &mut egui::Ui) {
        let settings = self.session.settings().clone();

        egui::Grid::new("preferences").num_columns(2).show(ui, |ui| {
            ui.label("Style");
            let mut style = settings.style.clone();
            let current = STYLES
                .iter()
                .find(|s| s.id == style)
                .map(|s| s.label)
                .unwrap_or("?");
            egui::ComboBox::from_id_source("style")
                .selected_text(current)
                .show_ui(ui, |ui| {
                    for s in STYLES {
                        ui.selectable_value(&mut style, s.id.to_string(), s.label);
                    }
                });
            if style != settings.style {
                self.session.set_style(&style);
            }
            ui.end_row();

            ui.label("Brush");
            ui.horizontal(|ui| {
                for &d in Difficulty::all() {
                    if ui.selectable_label(settings.difficulty == d, d.name()).clicked() {
                        self.session.set_difficulty(d);
                    }
                }
            });
            ui.end_row();

            ui.label("Grid size");
            let mut grid_size = settings.grid_size;
            if ui
                .add(egui::Slider::new(&mut grid_size, MIN_GRID_SIZE..=MAX_GRID_SIZE))
                .changed()
            {
                self.session.set_grid_size(grid_size);
            }
            ui.end_row();

            ui.label("Colors");
            let mut colors = settings.color_count;
            if ui
                .add(egui::Slider::new(&mut colors, MIN_COLOR_COUNT..=MAX_COLOR_COUNT))
                .changed()
            {
                self.session.set_color_count(colors);
            }
            ui.end_row();

            ui.label("Grown-up mode");
            let mut transparent = settings.transparent_mode;
            if ui.checkbox(&mut transparent, "Show details").changed() {
                self.session.set_transparent_mode(transparent);
            }
            ui.end_row();
        });
    }

    // --- Preview stage -----------------------------------------------------------

    fn show_preview(&mut self, ui: &mut egui::Ui, ctx: &egui::Context) {
        let Some(preview) = self.session.preview() else { return };
        let key = Arc::as_ptr(&preview.bytes) as *const u8 as usize;
        let title = preview.title;
        let stats = preview.stats.clone();

        if self.preview_texture.as_ref().is_none_or(|(k, _)| *k != key) {
            self.preview_texture = None;
            self.preview_decode_failed = false;
            match image::load_from_memory(&preview.bytes) {
                Ok(img) => {
                    let rgba = img.to_rgba8();
                    let size = [rgba.width() as usize, rgba.height() as usize];
                    let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
                    let tex = ctx.load_texture("preview", color_image, egui::TextureOptions::LINEAR);
                    self.preview_texture = Some((key, tex));
                }
                Err(e) => {
                    crate::log_warn!("Preview decode failed: {}", e);
                    self.preview_decode_failed = true;
                }
            }
        }

        ui.vertical_centered(|ui| {
            ui.heading(title);
        });

        let side = (ui.available_width().min(ui.available_height() - 140.0)).max(64.0);
        ui.vertical_centered(|ui| {
            let (rect, _) = ui.allocate_exact_size(Vec2::splat(side), Sense::hover());
            if let Some((_, tex)) = &self.preview_texture {
                let size = tex.size_vec2();
                let scale = (side / size.x).min(side / size.y);
                let image_rect = Rect::from_center_size(rect.center(), size * scale);
                let uv = Rect::from_min_max(Pos2::ZERO, Pos2::new(1.0, 1.0));
                ui.painter().image(tex.id(), image_rect, uv, Color32::WHITE);
            } else if self.preview_decode_failed {
                ui.painter().text(
                    rect.center(),
                    Align2::CENTER_CENTER,
                    "Could not show this picture",
                    FontId::proportional(18.0),
                    Color32::GRAY,
                );
            }
        });

        let busy = self.session.is_saving_to_gallery();
        ui.horizontal(|ui| {
            if ui.add_enabled(!busy, egui::Button::new("Start coloring!")).clicked() {
                self.session.confirm_puzzle();
            }
            if ui.add_enabled(!busy, egui::Button::new("Save for later")).clicked() {
                self.session.save_preview_to_gallery();
            }
            if busy {
                ui.spinner();
            }
        });

        ui.horizontal_wrapped(|ui| {
            ui.label("Not quite right?");
            if self.session.category().is_some() {
                for &fb in Feedback::all() {
                    if ui.button(fb.label()).clicked() {
                        self.session.discard_preview(Some(fb), &mut self.learning);
                    }
                }
            }
            if ui.button("Try again").clicked() {
                self.session.discard_preview(None, &mut self.learning);
            }
        });

        if self.session.settings().transparent_mode {
            ui.separator();
            if let Some(stats) = stats {
                ui.weak(format!(
                    "{} · in {} · out {} · total {} tokens",
                    stats.model, stats.input_tokens, stats.output_tokens, stats.total_tokens
                ));
            }
            if let Some(category) = self.session.category() {
                for line in self.learning.explanation(category) {
                    ui.weak(line);
                }
            }
        }
    }

    // --- Play stage ----------------------------------------------------------------

    fn show_toolbar(&mut self, ui: &mut egui::Ui, now: f64) {
        let Some(puzzle) = self.session.puzzle() else { return };
        let can_undo = puzzle.history().can_undo();
        let can_redo = puzzle.history().can_redo();
        let progress = puzzle.grid().completed() as f32 / puzzle.grid().total().max(1) as f32;
        let playing = self.session.stage() == Stage::Playing;
        let mode = self.session.gesture().mode();
        let zoom = self.session.gesture().viewport().zoom;

        ui.horizontal(|ui| {
            if ui.button("⬅ Menu").clicked() {
                self.session.reset_to_input();
                return;
            }
            ui.separator();
            if ui.add_enabled(playing && can_undo, egui::Button::new("Undo")).clicked() {
                self.session.undo();
            }
            if ui.add_enabled(playing && can_redo, egui::Button::new("Redo")).clicked() {
                self.session.redo();
            }
            if ui.add_enabled(playing, egui::Button::new("Hint")).clicked() {
                self.session.hint(now, &mut self.rng);
            }
            ui.separator();
            if ui.button("−").clicked() {
                self.session.zoom_step(-crate::components::gesture::ZOOM_BUTTON_STEP, now);
            }
            ui.label(format!("{:.1}×", zoom));
            if ui.button("+").clicked() {
                self.session.zoom_step(crate::components::gesture::ZOOM_BUTTON_STEP, now);
            }
            let mode_label = match mode {
                InteractionMode::Paint => "✏ Paint",
                InteractionMode::Move => "✋ Move",
            };
            if ui.selectable_label(mode == InteractionMode::Move, mode_label).clicked() {
                self.session.toggle_mode(now);
            }
            if ui.button("Fit").clicked() {
                self.session.reset_view();
            }
            ui.separator();
            if ui.button("Save").clicked() {
                self.save_progress(now);
            }
            ui.add(egui::ProgressBar::new(progress).desired_width(100.0).show_percentage());
        });
    }

    fn save_progress(&mut self, now: f64) {
        let Some(store) = &self.store else {
            self.notice = Some("No gallery folder available.".to_string());
            return;
        };
        if let Err(e) = self
            .session
            .save_progress(store, &mut self.learning, &mut self.rng, now)
        {
            crate::log_err!("Save failed: {}", e);
            self.notice = Some(format!("Could not save: {}", e));
        }
    }

    fn show_palette(&mut self, ui: &mut egui::Ui) {
        let Some(puzzle) = self.session.puzzle() else { return };
        let active = puzzle.active_color();
        let progress = puzzle.palette_progress();

        let mut clicked = None;
        egui::ScrollArea::horizontal().show(ui, |ui| {
            ui.horizontal(|ui| {
                for (index, entry) in progress.iter().enumerate() {
                    let fill = Color32::from_rgb(entry.color.r, entry.color.g, entry.color.b);
                    let label = if entry.is_complete() {
                        "✔".to_string()
                    } else {
                        (index + 1).to_string()
                    };
                    let stroke = if index == active {
                        Stroke::new(3.0, ui.visuals().strong_text_color())
                    } else {
                        Stroke::new(1.0, Color32::from_gray(120))
                    };
                    let button = egui::Button::new(egui::RichText::new(label).color(contrast_text(fill)).strong())
                        .fill(fill)
                        .stroke(stroke)
                        .min_size(Vec2::splat(40.0));
                    if ui.add(button).on_hover_text(format!("{} left", entry.remaining)).clicked() {
                        clicked = Some(index);
                    }
                }
            });
        });
        if let Some(index) = clicked {
            self.session.select_color(index);
        }
    }

    fn show_canvas(&mut self, ui: &mut egui::Ui, ctx: &egui::Context, now: f64) {
        let avail = ui.available_size();
        let (response, painter) = ui.allocate_painter(avail, Sense::click_and_drag());
        let side = avail.x.min(avail.y).max(1.0);
        let area = Rect::from_center_size(response.rect.center(), Vec2::splat(side));

        let blocked = self.show_gallery || ctx.memory(|m| m.any_popup_open());
        if !blocked {
            self.route_canvas_events(ctx, area, response.hovered(), now);
        }

        let Some(puzzle) = self.session.puzzle() else { return };
        let grid = puzzle.grid();
        let g = grid.size();
        let viewport = *self.session.gesture().viewport();
        let active = puzzle.active_color();
        let hint = self.session.hint_cell();
        let painter = painter.with_clip_rect(area);

        painter.rect_filled(area, 0.0, Color32::WHITE);
        let font = FontId::proportional((side / g as f32 * viewport.zoom * 0.55).clamp(6.0, 22.0));
        for (index, cell) in grid.cells().iter().enumerate() {
            let rect = viewport.cell_screen_rect(index, g, area);
            if !rect.intersects(area) {
                continue;
            }
            let color = cell.color();
            if cell.is_colored {
                let c = grid.palette()[color];
                painter.rect_filled(rect, 0.0, Color32::from_rgb(c.r, c.g, c.b));
                continue;
            }
            if color == active {
                painter.rect_filled(rect, 0.0, Color32::from_gray(215));
            }
            painter.rect_stroke(rect, 0.0, Stroke::new(0.5, Color32::from_gray(190)));
            if rect.width() >= MIN_NUMBER_CELL_PX {
                painter.text(
                    rect.center(),
                    Align2::CENTER_CENTER,
                    (color + 1).to_string(),
                    font.clone(),
                    Color32::from_gray(90),
                );
            }
        }

        if let Some(index) = hint {
            let rect = viewport.cell_screen_rect(index, g, area);
            painter.rect_stroke(rect.expand(2.0), 2.0, Stroke::new(3.0, Color32::from_rgb(255, 200, 0)));
        }
    }

    /// Feed raw pointer/touch events for this frame into the session.
    fn route_canvas_events(&mut self, ctx: &egui::Context, area: Rect, hovered: bool, now: f64) {
        let events = ctx.input(|i| i.events.clone());
        for event in events {
            match event {
                egui::Event::Touch { id, phase, pos, .. } => {
                    self.last_touch_time = now;
                    let pointer = id.0.wrapping_add(1);
                    match phase {
                        egui::TouchPhase::Start => {
                            if area.contains(pos) {
                                self.session.pointer_down(pointer, pos, area);
                            }
                        }
                        egui::TouchPhase::Move => {
                            self.session.pointer_move(pointer, pos, area);
                        }
                        egui::TouchPhase::End | egui::TouchPhase::Cancel => {
                            self.session.pointer_up(pointer, now);
                        }
                    }
                }
                _ if now - self.last_touch_time < TOUCH_MOUSE_SUPPRESS_SECS => {}
                egui::Event::PointerButton {
                    pos,
                    button: egui::PointerButton::Primary,
                    pressed,
                    ..
                } => {
                    if pressed {
                        if area.contains(pos) {
                            self.session.pointer_down(MOUSE_POINTER, pos, area);
                        }
                    } else {
                        self.session.pointer_up(MOUSE_POINTER, now);
                    }
                }
                egui::Event::PointerMoved(pos) => {
                    self.session.pointer_move(MOUSE_POINTER, pos, area);
                }
                egui::Event::PointerGone => {
                    self.session.pointer_up(MOUSE_POINTER, now);
                }
                egui::Event::Zoom(factor) if hovered && factor > 0.0 => {
                    self.session.wheel_zoom(ZOOM_FACTOR_TO_POINTS * factor.ln(), now);
                }
                _ => {}
            }
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context, now: f64) {
        if ctx.wants_keyboard_input() {
            return;
        }
        let (undo, redo, hint, mode) = ctx.input(|i| {
            let cmd = i.modifiers.command;
            (
                cmd && !i.modifiers.shift && i.key_pressed(Key::Z),
                cmd && ((i.modifiers.shift && i.key_pressed(Key::Z)) || i.key_pressed(Key::Y)),
                !cmd && i.key_pressed(Key::H),
                !cmd && i.key_pressed(Key::M),
            )
        });
        if undo {
            self.session.undo();
        }
        if redo {
            self.session.redo();
        }
        if hint {
            self.session.hint(now, &mut self.rng);
        }
        if mode {
            self.session.toggle_mode(now);
        }
    }

    fn show_complete_window(&mut self, ctx: &egui::Context, now: f64) {
        let mut action = None;
        egui::Window::new("You did it!")
            .collapsible(false)
            .resizable(false)
            .anchor(Align2::CENTER_CENTER, Vec2::ZERO)
            .show(ctx, |ui| {
                ui.label("Every cell is colored. Beautiful!");
                ui.horizontal(|ui| {
                    if ui.button("Save to gallery").clicked() {
                        action = Some(0);
                    }
                    if ui.button("Color again").clicked() {
                        action = Some(1);
                    }
                    if ui.button("New picture").clicked() {
                        action = Some(2);
                    }
                });
            });
        match action {
            Some(0) => self.save_progress(now),
            Some(1) => self.session.restart_puzzle(),
            Some(2) => self.session.reset_to_input(),
            _ => {}
        }
    }

    // --- Gallery ----------------------------------------------------------------------

    fn show_gallery_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_gallery;
        let mut play: Option<usize> = None;
        let mut delete: Option<usize> = None;

        egui::Window::new("My gallery")
            .open(&mut open)
            .default_width(360.0)
            .show(ctx, |ui| {
                if self.gallery.is_empty() {
                    ui.weak("Nothing saved yet.");
                }
                egui::ScrollArea::vertical().max_height(400.0).show(ui, |ui| {
                    for (i, saved) in self.gallery.iter().enumerate() {
                        ui.horizontal(|ui| {
                            let name = if saved.meta.prompt.is_empty() {
                                "Untitled"
                            } else {
                                saved.meta.prompt.as_str()
                            };
                            ui.label(name);
                            if saved.is_complete() {
                                ui.weak("done");
                            } else {
                                ui.weak(format!(
                                    "{}%",
                                    saved.completed * 100 / saved.total.max(1)
                                ));
                            }
                            if ui.button("Play").clicked() {
                                play = Some(i);
                            }
                            if ui.button("Delete").clicked() {
                                delete = Some(i);
                            }
                        });
                    }
                });
            });

        if let Some(i) = play
            && let Some(saved) = self.gallery.get(i)
        {
            match self.session.load_saved(saved) {
                Ok(()) => open = false,
                Err(e) => {
                    crate::log_err!("Failed to open saved puzzle {}: {}", saved.id, e);
                    self.notice = Some("That puzzle could not be opened.".to_string());
                }
            }
        }
        if let Some(i) = delete
            && let (Some(saved), Some(store)) = (self.gallery.get(i), &self.store)
        {
            if let Err(e) = store.delete(saved.id) {
                crate::log_err!("Failed to delete {}: {}", saved.id, e);
            }
            self.refresh_gallery();
        }
        self.show_gallery = open;
    }

    fn show_toast(&self, ctx: &egui::Context) {
        let Some(message) = self.session.toast_message() else { return };
        egui::Area::new("toast")
            .anchor(Align2::CENTER_BOTTOM, Vec2::new(0.0, -80.0))
            .interactable(false)
            .show(ctx, |ui| {
                egui::Frame::popup(ui.style()).show(ui, |ui| {
                    ui.label(message);
                });
            });
    }

    fn handle_dropped_files(&mut self, ctx: &egui::Context) {
        let dropped = ctx.input(|i| i.raw.dropped_files.clone());
        let Some(file) = dropped.into_iter().next() else { return };
        if !matches!(self.session.stage(), Stage::Input | Stage::Preview) {
            return;
        }
        let name = file
            .path
            .as_ref()
            .and_then(|p| p.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.name.clone());
        let bytes = match (&file.bytes, &file.path) {
            (Some(bytes), _) => Ok(bytes.to_vec()),
            (None, Some(path)) => std::fs::read(path),
            (None, None) => return,
        };
        match bytes {
            Ok(bytes) => {
                crate::log_info!("Loaded dropped image '{}' ({} bytes)", name, bytes.len());
                self.session.load_preview_image(bytes, &name);
            }
            Err(e) => {
                crate::log_err!("Failed to read dropped file: {}", e);
                self.notice = Some(format!("Could not open that file: {}", e));
            }
        }
    }
}

impl eframe::App for PuzzleApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        let now = ctx.input(|i| i.time);

        // --- Focus loss drops every pointer ---
        let focused = ctx.input(|i| i.focused);
        if self.was_focused && !focused {
            self.session.pointer_cancel();
        }
        self.was_focused = focused;

        self.poll_background(now);
        self.handle_dropped_files(ctx);
        self.session.tick(now);
        if self.session.take_just_saved() {
            self.refresh_gallery();
        }

        let stage = self.session.stage();
        if matches!(stage, Stage::Playing | Stage::Complete) {
            self.handle_shortcuts(ctx, now);
            egui::TopBottomPanel::top("toolbar").show(ctx, |ui| self.show_toolbar(ui, now));
            egui::TopBottomPanel::bottom("palette").show(ctx, |ui| self.show_palette(ui));
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            if let Some(error) = self.session.error().map(str::to_string) {
                ui.horizontal(|ui| {
                    ui.colored_label(ui.visuals().error_fg_color, error);
                    if ui.small_button("✖").clicked() {
                        self.session.clear_error();
                    }
                });
            }
            if let Some(notice) = self.notice.clone() {
                ui.horizontal(|ui| {
                    ui.colored_label(ui.visuals().warn_fg_color, notice);
                    if ui.small_button("✖").clicked() {
                        self.notice = None;
                    }
                });
            }

            match stage {
                Stage::Input => self.show_input(ui, now),
                Stage::Preview => self.show_preview(ui, ctx),
                Stage::Processing => {
                    ui.vertical_centered(|ui| {
                        ui.add_space(ui.available_height() / 3.0);
                        ui.spinner();
                        ui.label("Creating your puzzle...");
                    });
                }
                Stage::Playing | Stage::Complete => self.show_canvas(ui, ctx, now),
            }
        });

        if self.session.stage() == Stage::Complete {
            self.show_complete_window(ctx, now);
        }
        if self.show_gallery {
            self.show_gallery_window(ctx);
        }
        self.show_toast(ctx);

        self.persist_settings_if_changed();

        // Timers (hint, toast, idle revert, cooldown) and background work need frames
        let pending = self.session.is_generating()
            || self.session.is_processing()
            || self.session.hint_cell().is_some()
            || self.session.toast_message().is_some()
            || self.session.cooldown_remaining(now) > 0
            || self.session.gesture().mode() == InteractionMode::Move;
        if pending {
            ctx.request_repaint_after(TICK_INTERVAL);
        }
    }
}

/// Black or white, whichever reads better on `fill`.
fn contrast_text(fill: Color32) -> Color32 {
    let luma = 0.299 * fill.r() as f32 + 0.587 * fill.g() as f32 + 0.114 * fill.b() as f32;
    if luma > 150.0 { Color32::BLACK } else { Color32::WHITE }
}

fn refusal_message(refusal: &StartRefusal, session: &Session, now: f64) -> Option<String> {
    match refusal {
        StartRefusal::CoolingDown { .. } => Some(format!(
            "Wait {}s before making another picture.",
            session.cooldown_remaining(now)
        )),
        StartRefusal::EmptyPrompt => Some("Type what you want to color first!".to_string()),
        StartRefusal::UnknownItem => Some("That picture idea is not available.".to_string()),
        StartRefusal::WrongStage(_) | StartRefusal::AlreadyGenerating => None,
    }
}
