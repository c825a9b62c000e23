use std::sync::Arc;
use std::time::Duration;

use photofe::io::{self, DecodeQueue};
use photofe::ops::filters::FilterKind;
use photofe::ops::frame::Frame;
use photofe::ops::text::{FontBook, TextStyle};
use photofe::{
    Bitmap, Color, EditError, EditMode, EditSession, EditorSettings, ExportFormat, LoadOutcome, PointerEvent, Viewport,
};

fn session() -> EditSession {
    EditSession::with_fonts(EditorSettings::default(), Arc::new(FontBook::offline()))
}

fn loaded(w: u32, h: u32, color: Color) -> EditSession {
    let mut s = session();
    assert!(s.load_bitmap(Bitmap::filled(w, h, color)));
    s
}

fn px(s: &EditSession, x: u32, y: u32) -> [u8; 4] {
    s.current().and_then(|b| b.pixel(x, y)).map(|p| p.0).expect("pixel")
}

fn mouse(x: f32, y: f32) -> PointerEvent {
    PointerEvent::Mouse { x, y }
}

#[test]
fn grayscale_on_red() {
    let mut s = loaded(100, 100, Color::rgb(255, 0, 0));
    assert!(s.apply_filter(FilterKind::Grayscale));
    assert_eq!(px(&s, 50, 50), [85, 85, 85, 255]);
    assert_eq!(s.history_len(), 2);
}

#[test]
fn invert_white_then_switch_filter_starts_from_source() {
    let mut s = loaded(10, 10, Color::WHITE);
    s.apply_filter(FilterKind::Invert);
    assert_eq!(px(&s, 0, 0), [0, 0, 0, 255]);
    // Filters replace each other rather than stacking.
    s.apply_filter(FilterKind::Grayscale);
    assert_eq!(px(&s, 0, 0), [255, 255, 255, 255]);
    s.apply_filter(FilterKind::Original);
    assert_eq!(s.active_filter(), None);
}

#[test]
fn undo_redo_restore_parameters_and_pixels() {
    let mut s = loaded(4, 4, Color::WHITE);
    s.apply_filter(FilterKind::Sepia);
    assert!(s.undo());
    assert_eq!(s.active_filter(), None);
    assert_eq!(px(&s, 0, 0), [255, 255, 255, 255]);
    assert_eq!(s.history_index(), Some(0));
    assert!(!s.undo());
    assert!(s.redo());
    assert_eq!(s.active_filter(), Some(FilterKind::Sepia));
    assert!(!s.redo());
}

#[test]
fn edit_after_undo_drops_redo_branch() {
    let mut s = loaded(4, 4, Color::WHITE);
    s.apply_filter(FilterKind::Sepia);
    s.apply_filter(FilterKind::Noir);
    s.undo();
    s.undo();
    s.rotate(90);
    assert_eq!(s.history_len(), 2);
    assert_eq!(s.history_index(), Some(1));
    assert!(!s.can_redo());
    assert!(s.can_undo());
}

#[test]
fn history_is_bounded() {
    let settings = EditorSettings { max_undo_steps: 3, ..Default::default() };
    let mut s = EditSession::with_fonts(settings, Arc::new(FontBook::offline()));
    s.load_bitmap(Bitmap::filled(4, 4, Color::WHITE));
    for _ in 0..5 {
        s.rotate(90);
    }
    assert_eq!(s.history_len(), 3);
    assert_eq!(s.history_index(), Some(2));
}

#[test]
fn rotate_quarter_swaps_dimensions() {
    let mut s = loaded(30, 10, Color::WHITE);
    s.rotate(90);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((10, 30)));
    s.rotate(-90);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((30, 10)));
}

#[test]
fn load_resets_stack_but_keeps_annotations() {
    let mut s = loaded(20, 20, Color::WHITE);
    s.apply_filter(FilterKind::Sepia);
    s.apply_frame(Frame::default());
    s.add_text("keep", 5.0, 15.0, TextStyle::default());
    assert!(s.load_bitmap(Bitmap::filled(8, 8, Color::BLACK)));
    assert_eq!(s.active_filter(), None);
    assert!(s.composition().stack.frame.is_none());
    assert_eq!(s.texts().len(), 1);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((8, 8)));
}

#[test]
fn frame_insets_image() {
    let mut s = loaded(200, 200, Color::rgb(255, 0, 0));
    let frame = Frame { border_width: 10, padding: 5, border_color: Color::BLACK, ..Default::default() };
    assert!(s.apply_frame(frame.clone()));
    assert_eq!(s.current().map(|b| b.dimensions()), Some((230, 230)));
    assert_eq!(px(&s, 15, 15), [255, 0, 0, 255]);
    assert_eq!(px(&s, 2, 2), [0, 0, 0, 255]);

    // Applying again replaces the frame instead of nesting it.
    assert!(s.apply_frame(frame));
    assert_eq!(s.current().map(|b| b.dimensions()), Some((230, 230)));
    assert!(s.clear_frame());
    assert!(!s.clear_frame());
    assert_eq!(s.current().map(|b| b.dimensions()), Some((200, 200)));
}

#[test]
fn zero_size_crop_is_a_no_op() {
    let mut s = loaded(50, 50, Color::WHITE);
    let vp = Viewport::unscaled(50, 50);
    assert!(s.enter_crop_mode());
    s.pointer_down(&mouse(10.0, 10.0), &vp);
    s.pointer_up();
    assert!(!s.commit_crop(&vp));
    assert_eq!(s.history_len(), 1);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((50, 50)));
}

#[test]
fn crop_scales_from_display_to_backing() {
    let mut s = loaded(100, 100, Color::WHITE);
    // Canvas shown at half size, 20px from the client origin.
    let vp = Viewport::new(20.0, 20.0, 50.0, 50.0);
    s.set_mode(EditMode::Crop);
    s.pointer_down(&mouse(30.0, 30.0), &vp);
    s.pointer_move(&mouse(50.0, 50.0), &vp);
    s.pointer_up();
    assert!(s.commit_crop(&vp));
    assert_eq!(s.current().map(|b| b.dimensions()), Some((40, 40)));
    assert_eq!(s.mode(), EditMode::Select);
    assert_eq!(s.history_len(), 2);
}

#[test]
fn crop_through_frame_shifts_text() {
    let mut s = loaded(100, 100, Color::WHITE);
    s.apply_frame(Frame { border_width: 5, padding: 5, ..Default::default() });
    s.add_text("note", 40.0, 40.0, TextStyle::default());
    let vp = Viewport::unscaled(120, 120);
    s.enter_crop_mode();
    s.crop_pointer_down(30.0, 30.0);
    s.crop_pointer_move(80.0, 80.0);
    s.crop_pointer_up();
    assert!(s.commit_crop(&vp));
    assert_eq!(s.source().map(|b| b.dimensions()), Some((50, 50)));
    assert_eq!(s.current().map(|b| b.dimensions()), Some((70, 70)));
    assert_eq!((s.texts()[0].x, s.texts()[0].y), (20.0, 20.0));
}

#[test]
fn text_drag_commits_one_entry() {
    let mut s = loaded(100, 100, Color::BLACK);
    s.add_text("Hi", 50.0, 50.0, TextStyle::default());
    let before = s.history_len();
    let vp = Viewport::unscaled(100, 100);

    assert!(s.pointer_down(&mouse(55.0, 45.0), &vp));
    assert!(s.pointer_move(&mouse(60.0, 50.0), &vp));
    assert!(s.pointer_move(&mouse(65.0, 55.0), &vp));
    assert_eq!(s.history_len(), before);
    assert!(s.pointer_up());

    assert_eq!((s.texts()[0].x, s.texts()[0].y), (60.0, 60.0));
    assert_eq!(s.history_len(), before + 1);
    s.undo();
    assert_eq!((s.texts()[0].x, s.texts()[0].y), (50.0, 50.0));
}

#[test]
fn pointer_miss_does_nothing() {
    let mut s = loaded(100, 100, Color::BLACK);
    s.add_text("Hi", 50.0, 50.0, TextStyle::default());
    let vp = Viewport::unscaled(100, 100);
    assert!(!s.pointer_down(&mouse(5.0, 95.0), &vp));
    assert!(!s.pointer_move(&mouse(10.0, 90.0), &vp));
    assert!(!s.pointer_up());
}

#[test]
fn touch_brush_stroke() {
    let mut s = loaded(40, 40, Color::BLACK);
    s.set_mode(EditMode::Brush);
    let vp = Viewport::unscaled(40, 40);
    let touch = |x: f32, y: f32| PointerEvent::Touch { points: vec![(x, y), (0.0, 0.0)] };
    s.pointer_down(&touch(5.0, 20.0), &vp);
    s.pointer_move(&touch(35.0, 20.0), &vp);
    s.pointer_up();
    assert_eq!(px(&s, 20, 20), [255, 255, 255, 255]);
    assert_eq!(px(&s, 20, 5), [0, 0, 0, 255]);
    // The stroke survives a filter change.
    s.apply_filter(FilterKind::Invert);
    assert_eq!(px(&s, 20, 20), [255, 255, 255, 255]);
    assert_eq!(px(&s, 20, 5), [255, 255, 255, 255]);
}

#[test]
fn rejected_upload_leaves_state() {
    let mut s = loaded(4, 4, Color::WHITE);
    let err = s.load_data_uri("data:text/plain;base64,aGVsbG8=").unwrap_err();
    assert!(matches!(err, EditError::UnsupportedType(_)));
    let err = s.load_data_uri("data:image/png;base64,AAAA").unwrap_err();
    assert!(matches!(err, EditError::Decode(_)));
    assert_eq!(s.history_len(), 1);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((4, 4)));
}

#[test]
fn data_uri_round_trip_through_session() {
    let mut s = loaded(6, 3, Color::rgb(10, 20, 30));
    let uri = s.export(ExportFormat::Png, 90).expect("export").expect("image");
    assert!(uri.starts_with("data:image/png;base64,"));

    let mut other = session();
    assert!(other.load_data_uri(&uri).expect("load"));
    assert_eq!(other.current().and_then(|b| b.pixel(1, 1)).map(|p| p.0), Some([10, 20, 30, 255]));
}

#[test]
fn latest_load_wins() {
    let first_uri = io::export_data_uri(&Bitmap::filled(3, 3, Color::WHITE), ExportFormat::Png, 90).expect("uri");
    let second_uri = io::export_data_uri(&Bitmap::filled(5, 5, Color::BLACK), ExportFormat::Png, 90).expect("uri");

    let mut s = session();
    let mut queue = DecodeQueue::new();
    let first = s.begin_load();
    queue.submit(first, first_uri, 1 << 20);
    let second = s.begin_load();
    queue.submit(second, second_uri, 1 << 20);

    let mut outcomes = Vec::new();
    while queue.pending() > 0 {
        let (ticket, result) = queue.recv_timeout(Duration::from_secs(10)).expect("decode");
        outcomes.push((ticket, s.finish_load(ticket, result).expect("finish")));
    }
    for (ticket, outcome) in outcomes {
        let expected = if ticket == second { LoadOutcome::Applied } else { LoadOutcome::Stale };
        assert_eq!(outcome, expected);
    }
    assert_eq!(s.history_len(), 1);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((5, 5)));
}

#[test]
fn sync_load_supersedes_pending_async_load() {
    let mut s = session();
    let ticket = s.begin_load();
    let uri = io::export_data_uri(&Bitmap::filled(2, 2, Color::WHITE), ExportFormat::Png, 90).expect("uri");
    s.load_data_uri(&uri).expect("load");
    let late = s.finish_load(ticket, Ok(Bitmap::filled(9, 9, Color::BLACK))).expect("finish");
    assert_eq!(late, LoadOutcome::Stale);
    assert_eq!(s.current().map(|b| b.dimensions()), Some((2, 2)));
}

#[test]
fn failed_current_load_is_reported() {
    let mut s = loaded(4, 4, Color::WHITE);
    let ticket = s.begin_load();
    let err = s.finish_load(ticket, Err(EditError::Decode("bad".into()))).unwrap_err();
    assert!(matches!(err, EditError::Decode(_)));
    assert_eq!(s.history_len(), 1);
}

#[test]
fn stickers_and_overlays_are_undoable() {
    use photofe::ops::overlays::{Overlay, OverlayKind};

    let mut s = loaded(20, 20, Color::WHITE);
    let id = s.add_sticker("*", 10.0, 10.0).expect("sticker");
    assert!(s.update_sticker(id, |st| st.rotation = 45.0));
    assert_eq!(s.stickers()[0].rotation, 45.0);
    let overlay = Overlay::new(OverlayKind::Color { color: Color::BLACK });
    let oid = overlay.id;
    assert!(s.add_overlay(overlay));
    assert!(s.remove_overlay(oid));
    assert!(!s.remove_overlay(oid));
    assert!(s.remove_sticker(id));
    assert_eq!(s.history_len(), 6);
    s.undo();
    assert_eq!(s.stickers().len(), 1);
}

#[test]
fn text_follows_quarter_turn_and_stays_grabbable() {
    let mut s = loaded(300, 100, Color::BLACK);
    s.add_text("Hi", 250.0, 50.0, TextStyle::default());
    assert!(s.rotate(90));
    assert_eq!(s.current().map(|b| b.dimensions()), Some((100, 300)));
    assert_eq!((s.texts()[0].x, s.texts()[0].y), (50.0, 250.0));

    let vp = Viewport::unscaled(100, 300);
    assert!(s.pointer_down(&mouse(55.0, 245.0), &vp));
    assert!(!s.pointer_up());

    s.undo();
    assert_eq!((s.texts()[0].x, s.texts()[0].y), (250.0, 50.0));
}

#[test]
fn flip_mirrors_strokes_inside_frame() {
    let mut s = loaded(40, 20, Color::BLACK);
    s.apply_frame(Frame { border_width: 2, padding: 2, ..Default::default() });
    s.set_mode(EditMode::Brush);
    let vp = Viewport::unscaled(48, 28);
    s.pointer_down(&mouse(10.0, 14.0), &vp);
    s.pointer_up();
    assert!(s.flip(photofe::ops::transform::FlipAxis::Horizontal));
    // Source x 6 becomes 34, drawn at inset 4.
    assert_eq!(s.strokes()[0].points[0], (38.0, 14.0));
}
