// ============================================================================
// EDIT SESSION: owns the source, the composition and the undo history
// ============================================================================

use std::sync::Arc;

use uuid::Uuid;

use crate::canvas::Bitmap;
use crate::components::history::{EditHistory, Snapshot};
use crate::error::Result;
use crate::io::{self, ExportFormat};
use crate::ops::adjustments::Adjustments;
use crate::ops::brush::{BrushSettings, BrushStroke};
use crate::ops::filters::FilterKind;
use crate::ops::focus::FocusEffect;
use crate::ops::frame::Frame;
use crate::ops::overlays::Overlay;
use crate::ops::text::{hit_test_texts, FontBook, Sticker, TextOverlay, TextStyle};
use crate::ops::transform::{self, CropSelection, FlipAxis};
use crate::pipeline::{render, Composition};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

// ----------------------------------------------------------------------------
// Pointer input
// ----------------------------------------------------------------------------

/// Where the canvas is displayed, in client coordinates. The displayed size
/// may differ from the bitmap size; pointer positions are scaled by
/// `backing / displayed` on the way in.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    pub fn new(left: f32, top: f32, width: f32, height: f32) -> Self {
        Self { left, top, width, height }
    }

    /// Displayed at backing size with the origin at (0,0).
    pub fn unscaled(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Client position relative to the displayed canvas' top-left corner.
    pub fn to_display(&self, x: f32, y: f32) -> (f32, f32) {
        (x - self.left, y - self.top)
    }

    /// Client position in backing-store pixels of a `backing`-sized bitmap.
    pub fn to_backing(&self, x: f32, y: f32, backing: (u32, u32)) -> Option<(f32, f32)> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        let (dx, dy) = self.to_display(x, y);
        Some((
            dx * backing.0 as f32 / self.width,
            dy * backing.1 as f32 / self.height,
        ))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PointerEvent {
    Mouse { x: f32, y: f32 },
    /// Only the first touch point is used.
    Touch { points: Vec<(f32, f32)> },
}

impl PointerEvent {
    pub fn position(&self) -> Option<(f32, f32)> {
        match self {
            PointerEvent::Mouse { x, y } => Some((*x, *y)),
            PointerEvent::Touch { points } => points.first().copied(),
        }
    }
}

/// What a pointer drag does.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum EditMode {
    /// Drags move text overlays.
    #[default]
    Select,
    Crop,
    Brush,
}

enum Gesture {
    Idle,
    CropDrag,
    TextDrag {
        index: usize,
        offset: (f32, f32),
        origin: (f32, f32),
    },
    Stroke {
        stroke: BrushStroke,
        /// Render from before the stroke started; each move draws the stroke
        /// onto a copy of it.
        base: Bitmap,
    },
}

// ----------------------------------------------------------------------------
// Load tokens
// ----------------------------------------------------------------------------

/// Issued by [`EditSession::begin_load`]. Only the most recent ticket may
/// still apply its result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LoadTicket(u64);

impl LoadTicket {
    pub fn from_raw(seq: u64) -> Self {
        Self(seq)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadOutcome {
    Applied,
    /// A newer load was started after this one; the result was dropped.
    Stale,
}

// ----------------------------------------------------------------------------
// Session
// ----------------------------------------------------------------------------

pub struct EditSession {
    settings: EditorSettings,
    fonts: Arc<FontBook>,
    source: Option<Bitmap>,
    composition: Composition,
    /// Last values set on the adjust panel; kept across image loads even
    /// though the applied adjustments are reset.
    adjustments: Adjustments,
    brush: BrushSettings,
    display: Option<Bitmap>,
    history: EditHistory,
    mode: EditMode,
    crop: CropSelection,
    gesture: Gesture,
    load_seq: u64,
}

impl EditSession {
    pub fn new(settings: EditorSettings) -> Self {
        Self::with_fonts(settings, Arc::new(FontBook::system()))
    }

    pub fn with_fonts(settings: EditorSettings, fonts: Arc<FontBook>) -> Self {
        let settings = settings.sanitized();
        let history = EditHistory::new(settings.max_undo_steps).with_memory_limit(Some(settings.max_history_bytes));
        Self {
            settings,
            fonts,
            source: None,
            composition: Composition::default(),
            adjustments: Adjustments::default(),
            brush: BrushSettings::default(),
            display: None,
            history,
            mode: EditMode::Select,
            crop: CropSelection::default(),
            gesture: Gesture::Idle,
            load_seq: 0,
        }
    }

    /// Rebuild a session from saved parts and commit it as the first entry.
    pub fn restore(
        settings: EditorSettings,
        fonts: Arc<FontBook>,
        source: Bitmap,
        composition: Composition,
        adjustments: Adjustments,
        brush: BrushSettings,
    ) -> Self {
        let mut session = Self::with_fonts(settings, fonts);
        session.source = Some(source);
        session.composition = composition;
        session.adjustments = adjustments;
        session.brush = brush;
        session.commit("Open project");
        session
    }

    // ---- accessors ---------------------------------------------------------

    pub fn settings(&self) -> &EditorSettings {
        &self.settings
    }

    pub fn fonts(&self) -> &Arc<FontBook> {
        &self.fonts
    }

    /// The bitmap currently displayed.
    pub fn current(&self) -> Option<&Bitmap> {
        self.display.as_ref()
    }

    /// The pristine source every render starts from.
    pub fn source(&self) -> Option<&Bitmap> {
        self.source.as_ref()
    }

    pub fn has_image(&self) -> bool {
        self.source.is_some()
    }

    pub fn composition(&self) -> &Composition {
        &self.composition
    }

    pub fn adjustments(&self) -> &Adjustments {
        &self.adjustments
    }

    pub fn active_filter(&self) -> Option<FilterKind> {
        self.composition.stack.filter
    }

    pub fn texts(&self) -> &[TextOverlay] {
        &self.composition.texts
    }

    pub fn stickers(&self) -> &[Sticker] {
        &self.composition.stickers
    }

    pub fn overlays(&self) -> &[Overlay] {
        &self.composition.overlays
    }

    pub fn strokes(&self) -> &[BrushStroke] {
        &self.composition.strokes
    }

    pub fn brush(&self) -> &BrushSettings {
        &self.brush
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn crop_selection(&self) -> &CropSelection {
        &self.crop
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn history_index(&self) -> Option<usize> {
        self.history.index()
    }

    pub fn history(&self) -> &EditHistory {
        &self.history
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    // ---- commit / restore --------------------------------------------------

    /// Re-render from the source and push a snapshot.
    fn commit(&mut self, description: &str) -> bool {
        let Some(source) = self.source.clone() else {
            return false;
        };
        let bitmap = render(&source, &self.composition, &self.fonts);
        self.display = Some(bitmap.clone());
        self.history.push(Snapshot {
            description: description.to_string(),
            bitmap,
            source,
            composition: self.composition.clone(),
        });
        true
    }

    /// Re-render the display without recording history.
    fn refresh(&mut self) {
        if let Some(source) = &self.source {
            self.display = Some(render(source, &self.composition, &self.fonts));
        }
    }

    fn restore_snapshot(&mut self, snap: Snapshot) {
        self.display = Some(snap.bitmap);
        self.source = Some(snap.source);
        self.composition = snap.composition;
        self.gesture = Gesture::Idle;
        self.crop = CropSelection::default();
    }

    // ---- ingestion ---------------------------------------------------------

    /// New pristine source. Clears the applied filter, adjustments, focus and
    /// frame; keeps overlays, annotations and strokes.
    pub fn load_bitmap(&mut self, bitmap: Bitmap) -> bool {
        if bitmap.is_empty() {
            return false;
        }
        log_info!("Loaded image {}x{}", bitmap.width(), bitmap.height());
        self.source = Some(bitmap);
        self.composition.stack = Default::default();
        self.mode = EditMode::Select;
        self.crop = CropSelection::default();
        self.gesture = Gesture::Idle;
        self.commit("Load image")
    }

    /// Validate, decode and load a data URI synchronously. Supersedes any
    /// load still in flight. On error nothing changes.
    pub fn load_data_uri(&mut self, uri: &str) -> Result<bool> {
        let bitmap = io::decode_data_uri(uri, self.settings.max_upload_bytes)?;
        self.load_seq += 1;
        Ok(self.load_bitmap(bitmap))
    }

    /// Start an asynchronous load. Any earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> LoadTicket {
        self.load_seq += 1;
        LoadTicket(self.load_seq)
    }

    /// Apply the result of an asynchronous load if its ticket is still the
    /// latest. Stale results are dropped whether they succeeded or not; a
    /// current failure is returned and leaves the session untouched.
    pub fn finish_load(&mut self, ticket: LoadTicket, result: Result<Bitmap>) -> Result<LoadOutcome> {
        if ticket.0 != self.load_seq {
            log_warn!("Discarding stale load #{} (latest is #{})", ticket.0, self.load_seq);
            return Ok(LoadOutcome::Stale);
        }
        let bitmap = result?;
        if self.load_bitmap(bitmap) {
            Ok(LoadOutcome::Applied)
        } else {
            Ok(LoadOutcome::Stale)
        }
    }

    // ---- whole-image operations ---------------------------------------------

    pub fn apply_filter(&mut self, kind: FilterKind) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.composition.stack.filter = (kind != FilterKind::Original).then_some(kind);
        self.commit(&format!("Filter: {}", kind.label()))
    }

    /// Replace the adjustment record wholesale and re-render from the source.
    pub fn set_adjustments(&mut self, adjustments: Adjustments) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.adjustments = adjustments;
        self.composition.stack.adjustments = (!adjustments.is_identity()).then_some(adjustments);
        self.commit("Adjustments")
    }

    /// Turn the source clockwise. Annotations and strokes move with it.
    pub fn rotate(&mut self, degrees: i32) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        let dims = source.dimensions();
        let rotated = transform::rotate(source.as_image(), degrees);
        self.source = Some(Bitmap::from_image(rotated));
        self.composition.rotate(degrees, dims);
        self.commit(&format!("Rotate {}°", degrees))
    }

    pub fn flip(&mut self, axis: FlipAxis) -> bool {
        let Some(source) = &self.source else {
            return false;
        };
        let dims = source.dimensions();
        let flipped = transform::flip(source.as_image(), axis);
        self.source = Some(Bitmap::from_image(flipped));
        self.composition.flip(axis, dims);
        let label = match axis {
            FlipAxis::Horizontal => "Flip horizontal",
            FlipAxis::Vertical => "Flip vertical",
        };
        self.commit(label)
    }

    pub fn apply_focus(&mut self, effect: FocusEffect) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.composition.stack.focus = Some(effect);
        self.commit("Focus effect")
    }

    pub fn clear_focus(&mut self) -> bool {
        if self.composition.stack.focus.is_none() {
            return false;
        }
        self.composition.stack.focus = None;
        self.commit("Remove focus effect")
    }

    /// Set the frame. Frames are drawn from the unframed image, so applying
    /// a new one replaces the old.
    pub fn apply_frame(&mut self, frame: Frame) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.composition.stack.frame = Some(frame);
        self.commit("Frame")
    }

    pub fn clear_frame(&mut self) -> bool {
        if self.composition.stack.frame.is_none() {
            return false;
        }
        self.composition.stack.frame = None;
        self.commit("Remove frame")
    }

    // ---- crop --------------------------------------------------------------

    pub fn enter_crop_mode(&mut self) -> bool {
        if self.source.is_none() {
            return false;
        }
        self.mode = EditMode::Crop;
        self.crop = CropSelection::default();
        true
    }

    pub fn cancel_crop(&mut self) {
        if self.mode == EditMode::Crop {
            self.mode = EditMode::Select;
        }
        self.crop = CropSelection::default();
        if matches!(self.gesture, Gesture::CropDrag) {
            self.gesture = Gesture::Idle;
        }
    }

    /// Crop gestures work in display coordinates relative to the canvas'
    /// top-left corner.
    pub fn crop_pointer_down(&mut self, x: f32, y: f32) -> bool {
        if self.mode != EditMode::Crop {
            return false;
        }
        self.crop = CropSelection::begin(x, y);
        self.gesture = Gesture::CropDrag;
        true
    }

    pub fn crop_pointer_move(&mut self, x: f32, y: f32) -> bool {
        if self.mode != EditMode::Crop || !self.crop.is_selecting {
            return false;
        }
        self.crop.update(x, y);
        true
    }

    pub fn crop_pointer_up(&mut self) -> bool {
        if self.mode != EditMode::Crop {
            return false;
        }
        self.crop.finish();
        self.gesture = Gesture::Idle;
        true
    }

    /// Crop to the staged selection. The selection is mapped from the
    /// displayed canvas to rendered pixels, then past the frame inset into
    /// the source. Annotations keep their place on the image. An empty
    /// selection is a no-op.
    pub fn commit_crop(&mut self, viewport: &Viewport) -> bool {
        let (Some(source), Some(display)) = (&self.source, &self.display) else {
            return false;
        };
        let Some(rect) = self.crop.to_backing(viewport.size(), display.dimensions()) else {
            return false;
        };

        let inset = self.composition.stack.frame_inset() as i64;
        let sx0 = (rect.x as i64 - inset).clamp(0, source.width() as i64);
        let sy0 = (rect.y as i64 - inset).clamp(0, source.height() as i64);
        let sx1 = (rect.x as i64 + rect.width as i64 - inset).clamp(0, source.width() as i64);
        let sy1 = (rect.y as i64 + rect.height as i64 - inset).clamp(0, source.height() as i64);
        if sx1 <= sx0 || sy1 <= sy0 {
            return false;
        }

        let cropped = transform::crop(
            source.as_image(),
            transform::PixelRect {
                x: sx0 as u32,
                y: sy0 as u32,
                width: (sx1 - sx0) as u32,
                height: (sy1 - sy0) as u32,
            },
        );
        self.source = Some(Bitmap::from_image(cropped));
        self.composition.translate(-(sx0 as f32), -(sy0 as f32));
        self.crop = CropSelection::default();
        self.mode = EditMode::Select;
        self.gesture = Gesture::Idle;
        self.commit("Crop")
    }

    // ---- overlays ----------------------------------------------------------

    pub fn add_overlay(&mut self, overlay: Overlay) -> bool {
        if self.source.is_none() {
            return false;
        }
        let label = format!("Add {} overlay", overlay.kind.type_name());
        self.composition.overlays.push(overlay);
        self.commit(&label)
    }

    pub fn remove_overlay(&mut self, id: Uuid) -> bool {
        let before = self.composition.overlays.len();
        self.composition.overlays.retain(|o| o.id != id);
        if self.composition.overlays.len() == before {
            return false;
        }
        self.commit("Remove overlay")
    }

    // ---- text --------------------------------------------------------------

    /// Add a text overlay in rendered-canvas coordinates. Empty text is
    /// ignored.
    pub fn add_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle) -> Option<Uuid> {
        if self.source.is_none() || text.trim().is_empty() {
            return None;
        }
        let overlay = TextOverlay::new(text, x, y, style);
        let id = overlay.id;
        self.composition.texts.push(overlay);
        self.commit("Add text");
        Some(id)
    }

    /// Edit a text overlay in place. One history entry if anything changed.
    pub fn update_text(&mut self, id: Uuid, edit: impl FnOnce(&mut TextOverlay)) -> bool {
        let Some(text) = self.composition.texts.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        let before = text.clone();
        edit(text);
        text.id = id;
        if *text == before {
            return false;
        }
        self.commit("Edit text")
    }

    pub fn remove_text(&mut self, id: Uuid) -> bool {
        let before = self.composition.texts.len();
        self.composition.texts.retain(|t| t.id != id);
        if self.composition.texts.len() == before {
            return false;
        }
        self.commit("Remove text")
    }

    // ---- stickers ----------------------------------------------------------

    pub fn add_sticker(&mut self, content: &str, x: f32, y: f32) -> Option<Uuid> {
        if self.source.is_none() || content.is_empty() {
            return None;
        }
        let sticker = Sticker::new(content, x, y);
        let id = sticker.id;
        self.composition.stickers.push(sticker);
        self.commit("Add sticker");
        Some(id)
    }

    pub fn update_sticker(&mut self, id: Uuid, edit: impl FnOnce(&mut Sticker)) -> bool {
        let Some(sticker) = self.composition.stickers.iter_mut().find(|s| s.id == id) else {
            return false;
        };
        let before = sticker.clone();
        edit(sticker);
        sticker.id = id;
        if *sticker == before {
            return false;
        }
        self.commit("Edit sticker")
    }

    pub fn remove_sticker(&mut self, id: Uuid) -> bool {
        let before = self.composition.stickers.len();
        self.composition.stickers.retain(|s| s.id != id);
        if self.composition.stickers.len() == before {
            return false;
        }
        self.commit("Remove sticker")
    }

    // ---- brush -------------------------------------------------------------

    /// Settings for subsequent strokes. Not an undoable edit.
    pub fn set_brush(&mut self, settings: BrushSettings) {
        self.brush = settings.sanitized();
    }

    pub fn set_mode(&mut self, mode: EditMode) -> bool {
        match mode {
            EditMode::Crop => self.enter_crop_mode(),
            _ => {
                if self.mode == EditMode::Crop {
                    self.cancel_crop();
                }
                self.mode = mode;
                self.gesture = Gesture::Idle;
                true
            }
        }
    }

    // ---- pointer protocol --------------------------------------------------

    /// Pointer pressed. Starts a crop drag, a brush stroke, or grabs the
    /// top-most text under the pointer, depending on the mode.
    pub fn pointer_down(&mut self, event: &PointerEvent, viewport: &Viewport) -> bool {
        let Some((cx, cy)) = event.position() else {
            return false;
        };
        if self.mode == EditMode::Crop {
            let (dx, dy) = viewport.to_display(cx, cy);
            return self.crop_pointer_down(dx, dy);
        }
        let Some(display) = self.display.clone() else {
            return false;
        };
        let Some((x, y)) = viewport.to_backing(cx, cy, display.dimensions()) else {
            return false;
        };

        match self.mode {
            EditMode::Brush => {
                let stroke = BrushStroke::begin(self.brush, x, y);
                let mut preview = display.clone();
                stroke.render(preview.make_mut());
                self.display = Some(preview);
                self.gesture = Gesture::Stroke { stroke, base: display };
                true
            }
            EditMode::Select => {
                let Some(index) = hit_test_texts(&self.composition.texts, x, y, &self.fonts) else {
                    return false;
                };
                let text = &self.composition.texts[index];
                self.gesture = Gesture::TextDrag {
                    index,
                    offset: (text.x - x, text.y - y),
                    origin: (text.x, text.y),
                };
                true
            }
            EditMode::Crop => false,
        }
    }

    /// Pointer moved. Updates the display only; nothing is committed.
    pub fn pointer_move(&mut self, event: &PointerEvent, viewport: &Viewport) -> bool {
        let Some((cx, cy)) = event.position() else {
            return false;
        };
        if self.mode == EditMode::Crop {
            let (dx, dy) = viewport.to_display(cx, cy);
            return self.crop_pointer_move(dx, dy);
        }
        let Some(dims) = self.display.as_ref().map(|d| d.dimensions()) else {
            return false;
        };
        let Some((x, y)) = viewport.to_backing(cx, cy, dims) else {
            return false;
        };

        match &mut self.gesture {
            Gesture::Stroke { stroke, base } => {
                stroke.extend(x, y);
                let mut preview = base.clone();
                stroke.render(preview.make_mut());
                self.display = Some(preview);
                true
            }
            Gesture::TextDrag { index, offset, .. } => {
                let (index, offset) = (*index, *offset);
                let Some(text) = self.composition.texts.get_mut(index) else {
                    return false;
                };
                text.x = x + offset.0;
                text.y = y + offset.1;
                self.refresh();
                true
            }
            _ => false,
        }
    }

    /// Pointer released. Commits at most one history entry for the gesture.
    pub fn pointer_up(&mut self) -> bool {
        if self.mode == EditMode::Crop {
            return self.crop_pointer_up();
        }
        match std::mem::replace(&mut self.gesture, Gesture::Idle) {
            Gesture::Stroke { stroke, .. } => {
                self.composition.strokes.push(stroke);
                self.commit("Brush stroke")
            }
            Gesture::TextDrag { index, origin, .. } => {
                let moved = self
                    .composition
                    .texts
                    .get(index)
                    .map(|t| (t.x, t.y) != origin)
                    .unwrap_or(false);
                if moved { self.commit("Move text") } else { false }
            }
            _ => false,
        }
    }

    // ---- history -----------------------------------------------------------

    pub fn undo(&mut self) -> bool {
        match self.history.undo().cloned() {
            Some(snap) => {
                self.restore_snapshot(snap);
                true
            }
            None => false,
        }
    }

    pub fn redo(&mut self) -> bool {
        match self.history.redo().cloned() {
            Some(snap) => {
                self.restore_snapshot(snap);
                true
            }
            None => false,
        }
    }

    // ---- export ------------------------------------------------------------

    /// Current canvas as encoded bytes; `None` when nothing is loaded.
    pub fn export_bytes(&self, format: ExportFormat, quality: u8) -> Result<Option<Vec<u8>>> {
        match &self.display {
            Some(bitmap) => io::encode_bitmap(bitmap, format, quality).map(Some),
            None => Ok(None),
        }
    }

    /// Current canvas as a data URI; `None` when nothing is loaded.
    pub fn export(&self, format: ExportFormat, quality: u8) -> Result<Option<String>> {
        match &self.display {
            Some(bitmap) => io::export_data_uri(bitmap, format, quality).map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Color;

    fn session() -> EditSession {
        EditSession::with_fonts(EditorSettings::default(), Arc::new(FontBook::offline()))
    }

    #[test]
    fn viewport_scales_client_to_backing() {
        let vp = Viewport::new(10.0, 20.0, 100.0, 50.0);
        assert_eq!(vp.to_backing(60.0, 45.0, (200, 100)), Some((100.0, 50.0)));
        assert_eq!(vp.to_display(60.0, 45.0), (50.0, 25.0));
        assert_eq!(Viewport::new(0.0, 0.0, 0.0, 10.0).to_backing(1.0, 1.0, (5, 5)), None);
    }

    #[test]
    fn touch_uses_first_point() {
        let ev = PointerEvent::Touch { points: vec![(3.0, 4.0), (9.0, 9.0)] };
        assert_eq!(ev.position(), Some((3.0, 4.0)));
        assert_eq!(PointerEvent::Touch { points: vec![] }.position(), None);
    }

    #[test]
    fn operations_without_image_are_no_ops() {
        let mut s = session();
        assert!(!s.apply_filter(FilterKind::Sepia));
        assert!(!s.rotate(90));
        assert!(!s.enter_crop_mode());
        assert!(s.add_text("hi", 1.0, 1.0, TextStyle::default()).is_none());
        assert!(!s.undo());
        assert_eq!(s.history_len(), 0);
        assert_eq!(s.export(ExportFormat::Png, 90).ok().flatten(), None);
    }

    #[test]
    fn stale_ticket_is_dropped() {
        let mut s = session();
        let first = s.begin_load();
        let second = s.begin_load();
        let img = Bitmap::filled(4, 4, Color::WHITE);
        assert_eq!(s.finish_load(first, Ok(img.clone())).ok(), Some(LoadOutcome::Stale));
        assert_eq!(s.history_len(), 0);
        assert_eq!(s.finish_load(second, Ok(img)).ok(), Some(LoadOutcome::Applied));
        assert_eq!(s.history_len(), 1);
    }

    #[test]
    fn brush_preview_commits_once() {
        let mut s = session();
        s.load_bitmap(Bitmap::filled(30, 30, Color::BLACK));
        s.set_mode(EditMode::Brush);
        s.set_brush(BrushSettings { size: 4.0, ..Default::default() });
        let vp = Viewport::unscaled(30, 30);
        assert!(s.pointer_down(&PointerEvent::Mouse { x: 5.0, y: 15.0 }, &vp));
        assert!(s.pointer_move(&PointerEvent::Mouse { x: 15.0, y: 15.0 }, &vp));
        assert!(s.pointer_move(&PointerEvent::Mouse { x: 25.0, y: 15.0 }, &vp));
        assert_eq!(s.history_len(), 1);
        assert_eq!(s.current().and_then(|b| b.pixel(15, 15)).map(|p| p[0]), Some(255));
        assert!(s.pointer_up());
        assert_eq!(s.history_len(), 2);
        assert_eq!(s.strokes().len(), 1);
        assert_eq!(s.strokes()[0].points.len(), 3);
    }

    #[test]
    fn click_on_text_without_moving_commits_nothing() {
        let mut s = session();
        s.load_bitmap(Bitmap::filled(100, 100, Color::BLACK));
        s.add_text("Hi", 50.0, 50.0, TextStyle::default());
        let vp = Viewport::unscaled(100, 100);
        assert!(s.pointer_down(&PointerEvent::Mouse { x: 55.0, y: 45.0 }, &vp));
        assert!(!s.pointer_up());
        assert_eq!(s.history_len(), 2);
    }

    #[test]
    fn update_text_restyles() {
        let mut s = session();
        s.load_bitmap(Bitmap::filled(10, 10, Color::BLACK));
        let id = s.add_text("a", 1.0, 1.0, TextStyle::default()).expect("id");
        assert!(s.update_text(id, |t| t.style.bold = true));
        assert!(!s.update_text(id, |t| t.style.bold = true));
        assert!(s.texts()[0].style.bold);
        assert!(s.remove_text(id));
        assert!(!s.remove_text(id));
        assert_eq!(s.history_len(), 4);
    }
}
