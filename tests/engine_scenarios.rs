//! End-to-end scenarios driving `ColoringEngine` the way a host UI does.

use std::time::{Duration, Instant};

use egui::{Pos2, Vec2};
use image::{Rgba, RgbaImage};
use linefill::canvas::SurfaceKind;
use linefill::components::history::HistoryKind;
use linefill::components::tools::ToolKind;
use linefill::input::{ContactId, InputEvent};
use linefill::ops::flood_fill::FillSkip;
use linefill::settings::EngineSettings;
use linefill::viewport::ViewMode;
use linefill::{ColoringEngine, FillOutcome};

const RED: [u8; 4] = [255, 0, 0, 255];
const WHITE: [u8; 4] = [255, 255, 255, 255];
const BLACK: [u8; 4] = [0, 0, 0, 255];

/// 100x100 white with a closed 1px black square from (20,20) to (79,79).
fn ring_image() -> RgbaImage {
    let mut img = RgbaImage::from_pixel(100, 100, Rgba(WHITE));
    for i in 20..80 {
        img.put_pixel(i, 20, Rgba(BLACK));
        img.put_pixel(i, 79, Rgba(BLACK));
        img.put_pixel(20, i, Rgba(BLACK));
        img.put_pixel(79, i, Rgba(BLACK));
    }
    img
}

fn ring_engine() -> ColoringEngine {
    let mut engine = ColoringEngine::default();
    engine.load_image(&ring_image(), "ring").unwrap();
    engine.set_color("#FF0000").unwrap();
    engine
}

fn paint_state(engine: &ColoringEngine) -> (Vec<u8>, Vec<u8>) {
    let stack = engine.stack().unwrap();
    (
        stack.surface(SurfaceKind::Interaction).as_raw().to_vec(),
        stack.surface(SurfaceKind::Fill).as_raw().to_vec(),
    )
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

// ============================================================================
// FILL
// ============================================================================

#[test]
fn ring_inside_and_outside_fill_counts() {
    let mut engine = ring_engine();
    let t0 = Instant::now();

    match engine.fill_at(50, 50, t0) {
        FillOutcome::Started { pixels, bounds } => {
            assert_eq!(pixels, 58 * 58);
            assert_eq!((bounds.min_x, bounds.min_y, bounds.max_x, bounds.max_y), (21, 21, 79, 79));
        }
        other => panic!("expected inside fill, got {:?}", other),
    }
    engine.tick(t0 + ms(300));
    assert_eq!(engine.history().len(), 2);
    assert!(engine.can_undo());

    engine.set_color("#0000FF").unwrap();
    match engine.fill_at(5, 5, t0 + ms(600)) {
        FillOutcome::Started { pixels, .. } => assert_eq!(pixels, 100 * 100 - 58 * 58 - 236),
        other => panic!("expected outside fill, got {:?}", other),
    }
    engine.finish_pending();
    assert_eq!(engine.history().len(), 3);

    let out = engine.export_composite().unwrap();
    assert_eq!(out.get_pixel(50, 50).0, RED);
    assert_eq!(out.get_pixel(5, 5).0, [0, 0, 255, 255]);
    assert_eq!(out.get_pixel(20, 50).0, BLACK);
}

#[test]
fn fill_then_undo_restores_pristine_export() {
    let mut engine = ring_engine();
    let pristine = engine.export_composite().unwrap();
    let t0 = Instant::now();

    assert!(engine.fill_at(50, 50, t0).is_started());
    engine.tick(t0 + ms(400));
    assert_ne!(engine.export_composite().unwrap(), pristine);

    assert!(engine.undo().unwrap());
    assert_eq!(engine.export_composite().unwrap(), pristine);
    assert!(!engine.can_undo());
    assert!(engine.can_redo());
}

#[test]
fn mid_fade_state_is_never_recorded() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    engine.fill_at(50, 50, t0);
    engine.tick(t0 + ms(150));
    let mid = engine.stack().unwrap().surface(SurfaceKind::Fill).get_pixel(50, 50);
    assert!(mid[3] > 0 && mid[3] < 255);
    assert_eq!(engine.history().len(), 1);

    engine.tick(t0 + ms(300));
    let entry = engine.history().current().unwrap();
    assert_eq!(entry.kind, HistoryKind::Fill);
    let stack = engine.stack().unwrap();
    let idx = stack.surface(SurfaceKind::Fill).index(50, 50) * 4;
    match &entry.fill {
        linefill::components::history::FillRestore::Snapshot(px) => {
            assert_eq!(&px[idx..idx + 4], &RED)
        }
        other => panic!("expected a snapshot, got {:?}", other),
    }
}

#[test]
fn refill_with_same_colour_adds_no_entry() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    let (pixels, bounds) = match engine.fill_at(50, 50, t0) {
        FillOutcome::Started { pixels, bounds } => (pixels, bounds),
        other => panic!("expected a fill, got {:?}", other),
    };
    engine.finish_pending();
    let (_, fill_before) = paint_state(&engine);

    // The same region is reported back without being painted again
    assert_eq!(
        engine.fill_at(60, 60, t0 + ms(600)),
        FillOutcome::Unchanged { pixels, bounds }
    );
    assert_eq!(pixels, 58 * 58);
    assert_eq!(engine.history().len(), 2);
    assert_eq!(paint_state(&engine).1, fill_before);

    // A different colour over the same region is a real change
    engine.set_color("#00FF00").unwrap();
    assert!(engine.fill_at(60, 60, t0 + ms(1200)).is_started());
    engine.finish_pending();
    assert_eq!(engine.history().len(), 3);
}

#[test]
fn pencil_over_fill_shows_in_export() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    assert!(engine.fill_at(50, 50, t0).is_started());
    engine.finish_pending();

    engine.select_tool(ToolKind::Pencil);
    engine.set_color("#00AA00").unwrap();
    engine.set_pencil_size(6.0);
    assert!(engine.begin_stroke(Pos2::new(40.5, 50.5), t0 + ms(600)));
    engine.extend_stroke(Pos2::new(60.5, 50.5), t0 + ms(620));
    assert!(engine.end_stroke().is_some());
    assert_eq!(engine.history().len(), 3);

    let out = engine.export_composite().unwrap();
    assert_eq!(out.get_pixel(50, 50).0, [0, 170, 0, 255]);
    // Fill still shows around the stroke
    assert_eq!(out.get_pixel(50, 30).0, RED);
}

#[test]
fn fill_seeds_on_lines_or_outside_do_nothing() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    assert_eq!(engine.fill_at(20, 40, t0), FillOutcome::Skipped(FillSkip::BoundarySeed));
    assert_eq!(engine.fill_at(-3, 40, t0), FillOutcome::Skipped(FillSkip::OutOfBounds));
    assert_eq!(engine.fill_at(40, 100, t0), FillOutcome::Skipped(FillSkip::OutOfBounds));
    assert_eq!(engine.history().len(), 1);
}

// ============================================================================
// UNDO / REDO ROUND TRIPS
// ============================================================================

#[test]
fn undo_redo_round_trip_for_every_tool() {
    let mut engine = ring_engine();
    let t0 = Instant::now();

    // Fill
    let before = paint_state(&engine);
    engine.fill_at(50, 50, t0);
    engine.finish_pending();
    let after_fill = paint_state(&engine);

    // Pencil
    engine.select_tool(ToolKind::Pencil);
    engine.set_color("#00AA00").unwrap();
    assert!(engine.begin_stroke(Pos2::new(30.0, 30.0), t0 + ms(600)));
    engine.extend_stroke(Pos2::new(60.0, 40.0), t0 + ms(620));
    engine.end_stroke().unwrap();
    let after_pencil = paint_state(&engine);

    // Eraser across both the pencil line and the fill
    engine.select_tool(ToolKind::Eraser);
    assert!(engine.begin_stroke(Pos2::new(25.0, 35.0), t0 + ms(700)));
    engine.extend_stroke(Pos2::new(70.0, 35.0), t0 + ms(720));
    let erase = engine.end_stroke().unwrap();
    assert!(!erase.fill_changes.is_empty());
    let after_eraser = paint_state(&engine);
    assert_eq!(engine.history().len(), 4);

    assert!(engine.undo().unwrap());
    assert_eq!(paint_state(&engine), after_pencil);
    assert!(engine.undo().unwrap());
    assert_eq!(paint_state(&engine), after_fill);
    assert!(engine.undo().unwrap());
    assert_eq!(paint_state(&engine), before);
    assert!(!engine.undo().unwrap());

    assert!(engine.redo().unwrap());
    assert_eq!(paint_state(&engine), after_fill);
    assert!(engine.redo().unwrap());
    assert_eq!(paint_state(&engine), after_pencil);
    assert!(engine.redo().unwrap());
    assert_eq!(paint_state(&engine), after_eraser);
    assert!(!engine.redo().unwrap());
}

#[test]
fn undo_then_new_action_drops_redo() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    engine.fill_at(50, 50, t0);
    engine.finish_pending();
    engine.undo().unwrap();
    assert!(engine.can_redo());

    engine.select_tool(ToolKind::Pencil);
    engine.begin_stroke(Pos2::new(10.0, 10.0), t0 + ms(600));
    engine.end_stroke();
    assert!(!engine.can_redo());
    assert_eq!(engine.history().len(), 2);
}

#[test]
fn undone_wall_no_longer_blocks_fill() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    engine.select_tool(ToolKind::Pencil);
    engine.set_color("#000000").unwrap();
    // Seal off the left part of the ring's interior at x = 40
    engine.begin_stroke(Pos2::new(40.5, 20.5), t0);
    engine.extend_stroke(Pos2::new(40.5, 79.5), t0 + ms(20));
    engine.end_stroke();
    engine.undo().unwrap();

    // With the wall undone the fill reaches the whole interior again
    engine.select_tool(ToolKind::Fill);
    engine.set_color("#FF0000").unwrap();
    match engine.fill_at(30, 50, t0 + ms(100)) {
        FillOutcome::Started { pixels, .. } => assert_eq!(pixels, 58 * 58),
        other => panic!("expected a fill, got {:?}", other),
    }
}

#[test]
fn history_is_capped_at_fifty_entries() {
    let mut engine = ring_engine();
    engine.select_tool(ToolKind::Pencil);
    let t0 = Instant::now();
    for i in 0..60u64 {
        let x = (i % 90) as f32 + 5.0;
        engine.begin_stroke(Pos2::new(x, 5.0), t0 + ms(i * 20));
        engine.end_stroke();
    }
    assert_eq!(engine.history().len(), 50);
    let mut undos = 0;
    while engine.undo().unwrap() {
        undos += 1;
    }
    assert_eq!(undos, 49);
}

// ============================================================================
// INPUT + VIEWPORT
// ============================================================================

fn touch(id: u64) -> ContactId {
    ContactId::Touch(id)
}

#[test]
fn pinch_apart_doubles_scale_about_the_centre() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    let centre = Pos2::new(50.0, 50.0);
    let centre_on_screen = engine.viewport().canvas_to_screen(centre);

    engine.handle_input(InputEvent::Down { id: touch(1), pos: Pos2::new(40.0, 50.0) }, t0);
    engine.handle_input(InputEvent::Down { id: touch(2), pos: Pos2::new(60.0, 50.0) }, t0);
    engine.handle_input(InputEvent::Move { id: touch(1), pos: Pos2::new(30.0, 50.0) }, t0);
    engine.handle_input(InputEvent::Move { id: touch(2), pos: Pos2::new(70.0, 50.0) }, t0);
    engine.handle_input(InputEvent::Up { id: touch(1), pos: Pos2::new(30.0, 50.0) }, t0);
    engine.handle_input(InputEvent::Up { id: touch(2), pos: Pos2::new(70.0, 50.0) }, t0);

    assert!((engine.viewport().scale() - 2.0).abs() < 1e-4);
    let after = engine.viewport().canvas_to_screen(centre);
    assert!((after - centre_on_screen).length() < 1e-3);

    // The first finger's press must not have turned into a fill
    assert_eq!(engine.history().len(), 1);
    assert!(!engine.is_busy());
}

#[test]
fn click_in_draw_mode_fills_through_the_view_transform() {
    let mut engine = ring_engine();
    engine.viewport_mut().zoom_about(2.0, Pos2::ZERO);
    engine.viewport_mut().pan_by(Vec2::new(10.0, 10.0));
    let t0 = Instant::now();

    // Screen (110, 110) is canvas (50, 50)
    let at = Pos2::new(110.0, 110.0);
    engine.handle_input(InputEvent::Down { id: ContactId::Mouse, pos: at }, t0);
    assert!(engine.handle_input(InputEvent::Up { id: ContactId::Mouse, pos: at }, t0));
    engine.finish_pending();
    let stack = engine.stack().unwrap();
    assert_eq!(stack.surface(SurfaceKind::Fill).get_pixel(50, 50), RED);
    assert_eq!(stack.surface(SurfaceKind::Fill).get_pixel(5, 5), [0, 0, 0, 0]);
}

#[test]
fn drag_in_zoom_mode_pans_without_painting() {
    let mut engine = ring_engine();
    engine.select_tool(ToolKind::Pencil);
    engine.toggle_mode();
    assert_eq!(engine.viewport().mode(), ViewMode::Zoom);
    let before = paint_state(&engine);
    let t0 = Instant::now();

    engine.handle_input(InputEvent::Down { id: ContactId::Mouse, pos: Pos2::new(10.0, 10.0) }, t0);
    engine.handle_input(InputEvent::Move { id: ContactId::Mouse, pos: Pos2::new(30.0, 25.0) }, t0 + ms(20));
    engine.handle_input(InputEvent::Up { id: ContactId::Mouse, pos: Pos2::new(30.0, 25.0) }, t0 + ms(40));

    assert_eq!(engine.viewport().pan(), Vec2::new(20.0, 15.0));
    assert_eq!(paint_state(&engine), before);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn wheel_zoom_only_applies_in_zoom_mode() {
    let mut engine = ring_engine();
    let t0 = Instant::now();
    let wheel = InputEvent::Wheel { pos: Pos2::new(50.0, 50.0), delta: 1.0 };
    assert!(!engine.handle_input(wheel, t0));
    assert_eq!(engine.viewport().scale(), 1.0);

    engine.toggle_mode();
    assert!(engine.handle_input(wheel, t0));
    assert!((engine.viewport().scale() - 1.1).abs() < 1e-6);
}

#[test]
fn second_finger_cancels_a_pencil_stroke() {
    let mut engine = ring_engine();
    engine.select_tool(ToolKind::Pencil);
    let before = paint_state(&engine);
    let t0 = Instant::now();

    engine.handle_input(InputEvent::Down { id: touch(1), pos: Pos2::new(30.0, 30.0) }, t0);
    engine.handle_input(InputEvent::Move { id: touch(1), pos: Pos2::new(40.0, 30.0) }, t0 + ms(20));
    assert!(engine.stroke_active());
    assert_ne!(paint_state(&engine), before);

    engine.handle_input(InputEvent::Down { id: touch(2), pos: Pos2::new(60.0, 60.0) }, t0 + ms(30));
    assert!(!engine.stroke_active());
    assert_eq!(paint_state(&engine), before);
    assert_eq!(engine.history().len(), 1);
}

#[test]
fn pencil_drag_records_one_entry() {
    let mut engine = ring_engine();
    engine.select_tool(ToolKind::Pencil);
    let t0 = Instant::now();
    engine.handle_input(InputEvent::Down { id: ContactId::Mouse, pos: Pos2::new(30.0, 30.0) }, t0);
    for i in 1..10u64 {
        let pos = Pos2::new(30.0 + i as f32 * 3.0, 30.0);
        engine.handle_input(InputEvent::Move { id: ContactId::Mouse, pos }, t0 + ms(i * 5));
    }
    engine.handle_input(InputEvent::Up { id: ContactId::Mouse, pos: Pos2::new(60.0, 30.0) }, t0 + ms(60));

    assert_eq!(engine.history().len(), 2);
    assert_eq!(engine.history().current().unwrap().kind, HistoryKind::Pencil);
    let stack = engine.stack().unwrap();
    // Throttled points are still joined into one continuous line
    for x in 30..60 {
        assert_eq!(stack.surface(SurfaceKind::Interaction).get_pixel(x, 30), RED, "gap at x={}", x);
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[test]
fn settings_drive_engine_limits() {
    let settings = EngineSettings::parse("history_limit=3\nfill_fade_ms=0\nfill_debounce_ms=0\n");
    let mut engine = ColoringEngine::new(settings);
    engine.load_image(&ring_image(), "ring").unwrap();
    let t0 = Instant::now();

    // No fade: the entry is written immediately
    assert!(engine.fill_at(50, 50, t0).is_started());
    assert!(!engine.is_busy());
    assert_eq!(engine.history().len(), 2);

    for (i, hex) in ["#00FF00", "#0000FF", "#FFFF00"].iter().enumerate() {
        engine.set_color(hex).unwrap();
        assert!(engine.fill_at(50, 50, t0 + ms(i as u64)).is_started());
    }
    assert_eq!(engine.history().len(), 3);
}
