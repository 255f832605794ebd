use std::io::Cursor;
use std::time::Duration;

use colorsplash::components::gesture::Difficulty;
use colorsplash::grid::{Cell, PuzzleGrid};
use colorsplash::io::PuzzleStore;
use colorsplash::learning::LearningStore;
use colorsplash::ops::quantize::PaletteColor;
use colorsplash::puzzle::{Puzzle, PuzzleMeta};
use colorsplash::session::{JobEvent, Session, Stage};
use colorsplash::settings::AppSettings;
use egui::{Pos2, Rect, Vec2};
use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use rand::SeedableRng;
use rand::rngs::StdRng;

/// 8×8 PNG: left half red, right half blue.
fn two_tone_png() -> Vec<u8> {
    let img = RgbImage::from_fn(8, 8, |x, _| if x < 4 { Rgb([220, 30, 30]) } else { Rgb([30, 30, 220]) });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
        .unwrap();
    bytes
}

fn settings() -> AppSettings {
    AppSettings {
        grid_size: 8,
        color_count: 2,
        difficulty: Difficulty::Hard,
        ..AppSettings::default()
    }
}

/// 8×8 grid drawn into an 80×80 area: 10 px per cell.
fn area() -> Rect {
    Rect::from_min_size(Pos2::ZERO, Vec2::splat(80.0))
}

fn center(index: usize) -> Pos2 {
    Pos2::new((index % 8) as f32 * 10.0 + 5.0, (index / 8) as f32 * 10.0 + 5.0)
}

fn tap(session: &mut Session, index: usize, now: f64) {
    session.pointer_down(1, center(index), area());
    session.pointer_up(1, now);
}

fn playing_session(rng: &mut StdRng, learning: &mut LearningStore) -> Session {
    let mut session = Session::new(settings());
    session.load_preview_image(two_tone_png(), "two tone");
    assert!(session.confirm_puzzle());
    let event = session.wait_jobs(Duration::from_secs(30), None, learning, rng);
    assert_eq!(event, Some(JobEvent::PuzzleReady));
    session
}

#[test]
fn image_to_completed_puzzle() {
    let mut rng = StdRng::seed_from_u64(1);
    let mut learning = LearningStore::in_memory();
    let mut session = playing_session(&mut rng, &mut learning);
    assert_eq!(session.stage(), Stage::Playing);

    let grid = session.puzzle().unwrap().grid();
    assert_eq!(grid.size(), 8);
    assert_eq!(grid.palette().len(), 2);
    // each half is one color
    assert_eq!(grid.cell(0).unwrap().color(), grid.cell(3).unwrap().color());
    assert_ne!(grid.cell(0).unwrap().color(), grid.cell(4).unwrap().color());

    let mut taps = 0;
    while session.stage() == Stage::Playing {
        let puzzle = session.puzzle().unwrap();
        let active = puzzle.active_color();
        let next = puzzle
            .grid()
            .cells()
            .iter()
            .position(|c| !c.is_colored && c.color() == active)
            .unwrap();
        tap(&mut session, next, taps as f64);
        taps += 1;
        assert!(taps <= 64);
    }

    assert_eq!(taps, 64);
    assert_eq!(session.stage(), Stage::Complete);
    assert!(session.puzzle().unwrap().is_complete());
    assert!(!session.undo());
}

#[test]
fn stroke_undo_redo_round_trip() {
    let mut rng = StdRng::seed_from_u64(2);
    let mut learning = LearningStore::in_memory();
    let mut session = playing_session(&mut rng, &mut learning);

    let active = session.puzzle().unwrap().active_color();
    let column = if session.puzzle().unwrap().grid().cell(0).unwrap().color() == active { 0 } else { 4 };

    // one drag down a column = one undo unit
    session.pointer_down(7, center(column), area());
    for row in 1..8 {
        session.pointer_move(7, center(row * 8 + column), area());
    }
    session.pointer_up(7, 1.0);
    assert_eq!(session.puzzle().unwrap().grid().completed(), 8);
    assert_eq!(session.puzzle().unwrap().history().undo_count(), 1);

    assert!(session.undo());
    assert_eq!(session.puzzle().unwrap().grid().completed(), 0);
    assert!(session.redo());
    assert_eq!(session.puzzle().unwrap().grid().completed(), 8);
    assert!(!session.redo());
}

#[test]
fn three_colors_cycle_with_wrap() {
    let palette = vec![
        PaletteColor::new(255, 0, 0),
        PaletteColor::new(0, 255, 0),
        PaletteColor::new(0, 0, 255),
    ];
    let cells = [0u16, 0, 0, 1, 1, 1, 2, 2, 2].iter().map(|&c| Cell::new(c)).collect();
    let grid = PuzzleGrid::from_parts(3, palette, cells).unwrap();
    let mut puzzle = Puzzle::new(grid, PuzzleMeta::default(), None);

    assert!(puzzle.select_color(2));
    let out = puzzle.paint(&[6, 7, 8]);
    assert_eq!(out.advanced_to, Some(0));

    let out = puzzle.paint(&[0, 1, 2]);
    assert_eq!(out.advanced_to, Some(1));

    let out = puzzle.paint(&[3, 4]);
    assert_eq!(out.advanced_to, None);
    let out = puzzle.paint(&[5]);
    assert!(out.completed_now);
    // a second paint cannot report completion again
    assert!(!puzzle.paint(&[5]).completed_now);
}

#[test]
fn gallery_save_list_resume_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = PuzzleStore::new(dir.path());
    let mut rng = StdRng::seed_from_u64(3);
    let mut learning = LearningStore::in_memory();
    let mut session = playing_session(&mut rng, &mut learning);

    let active = session.puzzle().unwrap().active_color();
    let first = session
        .puzzle()
        .unwrap()
        .grid()
        .cells()
        .iter()
        .position(|c| c.color() == active)
        .unwrap();
    tap(&mut session, first, 0.5);
    session.save_progress(&store, &mut learning, &mut rng, 1.0).unwrap();
    assert_eq!(session.toast_message(), Some("Saved to gallery!"));

    std::fs::write(dir.path().join("broken.csp"), b"garbage").unwrap();
    let listed = store.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].completed, 1);
    assert_eq!(listed[0].meta.prompt, "two tone");

    let mut resumed = Session::new(settings());
    resumed.load_saved(&listed[0]).unwrap();
    assert_eq!(resumed.stage(), Stage::Playing);
    let puzzle = resumed.puzzle().unwrap();
    assert_eq!(puzzle.id(), session.puzzle().unwrap().id());
    assert_eq!(puzzle.grid().completed(), 1);
    assert!(!puzzle.history().can_undo());

    assert!(store.delete(listed[0].id).unwrap());
    assert!(!store.delete(listed[0].id).unwrap());
    assert!(store.list().is_empty());
}

#[test]
fn preview_saved_straight_to_gallery() {
    let dir = tempfile::tempdir().unwrap();
    let store = PuzzleStore::new(dir.path());
    let mut rng = StdRng::seed_from_u64(4);
    let mut learning = LearningStore::in_memory();

    let mut session = Session::new(settings());
    session.load_preview_image(two_tone_png(), "later");
    assert!(session.save_preview_to_gallery());
    let event = session.wait_jobs(Duration::from_secs(30), Some(&store), &mut learning, &mut rng);
    assert!(matches!(event, Some(JobEvent::SavedToGallery(_))));
    assert_eq!(session.stage(), Stage::Input);
    assert!(session.take_just_saved());
    assert!(!session.take_just_saved());

    let listed = store.list();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].completed, 0);
    assert_eq!(listed[0].total, 64);
}
