// ============================================================================
// RENDER PIPELINE: pristine source + composition -> displayed bitmap
// ============================================================================
//
// Order is fixed: adjustments, filter, focus, frame, overlays, brush strokes,
// text, stickers. Every render starts again from the source, so switching a
// filter never loses the adjustments and re-applying a frame never nests.

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::canvas::Bitmap;
use crate::ops::adjustments::{apply_adjustments, Adjustments};
use crate::ops::brush::{render_strokes, BrushStroke};
use crate::ops::filters::{apply_filter, FilterKind};
use crate::ops::focus::{apply_focus, FocusEffect};
use crate::ops::frame::{apply_frame, Frame};
use crate::ops::overlays::{composite_overlays, Overlay};
use crate::ops::text::{render_stickers, render_texts, FontBook, Sticker, TextOverlay};
use crate::ops::transform::FlipAxis;

/// Whole-image passes, each optional.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStack {
    pub adjustments: Option<Adjustments>,
    pub filter: Option<FilterKind>,
    pub focus: Option<FocusEffect>,
    pub frame: Option<Frame>,
}

impl RenderStack {
    /// Pixel offset of source (0,0) in the rendered canvas.
    pub fn frame_inset(&self) -> u32 {
        self.frame.as_ref().map(|f| f.inset()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.adjustments.is_none() && self.filter.is_none() && self.focus.is_none() && self.frame.is_none()
    }
}

/// Everything drawn on top of the source. Snapshotted with each history
/// entry so undo restores parameters along with pixels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Composition {
    pub stack: RenderStack,
    pub overlays: Vec<Overlay>,
    pub strokes: Vec<BrushStroke>,
    pub texts: Vec<TextOverlay>,
    pub stickers: Vec<Sticker>,
}

impl Composition {
    /// Move every text, sticker and stroke point through `f`.
    pub fn map_positions(&mut self, f: impl Fn(f32, f32) -> (f32, f32)) {
        for t in &mut self.texts {
            (t.x, t.y) = f(t.x, t.y);
        }
        for s in &mut self.stickers {
            (s.x, s.y) = f(s.x, s.y);
        }
        for stroke in &mut self.strokes {
            for p in &mut stroke.points {
                *p = f(p.0, p.1);
            }
        }
    }

    /// Move every positioned element by (`dx`, `dy`). Used after a crop.
    pub fn translate(&mut self, dx: f32, dy: f32) {
        self.map_positions(|x, y| (x + dx, y + dy));
    }

    /// Follow a clockwise turn of a `source`-sized image so annotations stay
    /// on the same content. Positions sit in the framed canvas, so the inset
    /// comes off before turning and goes back on after. Text stays upright;
    /// stickers turn with the image.
    pub fn rotate(&mut self, degrees: i32, source: (u32, u32)) {
        let deg = degrees.rem_euclid(360);
        if deg == 0 {
            return;
        }
        let inset = self.stack.frame_inset() as f32;
        let (w, h) = (source.0 as f32, source.1 as f32);
        let (sin, cos) = (deg as f32).to_radians().sin_cos();
        self.map_positions(|x, y| {
            let (sx, sy) = (x - inset, y - inset);
            let (rx, ry) = match deg {
                90 => (h - sy, sx),
                180 => (w - sx, h - sy),
                270 => (sy, w - sx),
                // Same-size canvas, turned about its centre.
                _ => {
                    let (dx, dy) = (sx - w / 2.0, sy - h / 2.0);
                    (w / 2.0 + dx * cos - dy * sin, h / 2.0 + dx * sin + dy * cos)
                }
            };
            (rx + inset, ry + inset)
        });
        for s in &mut self.stickers {
            s.rotation = (s.rotation + deg as f32).rem_euclid(360.0);
        }
    }

    /// Mirror positions across the centre line of a `source`-sized image.
    pub fn flip(&mut self, axis: FlipAxis, source: (u32, u32)) {
        let inset = self.stack.frame_inset() as f32;
        let (w, h) = (source.0 as f32, source.1 as f32);
        self.map_positions(|x, y| match axis {
            FlipAxis::Horizontal => (w + 2.0 * inset - x, y),
            FlipAxis::Vertical => (x, h + 2.0 * inset - y),
        });
        for s in &mut self.stickers {
            s.rotation = (-s.rotation).rem_euclid(360.0);
        }
    }
}

/// The whole-image passes only: adjustments, filter, focus, frame.
pub fn render_base(source: &RgbaImage, stack: &RenderStack) -> RgbaImage {
    let mut img = match &stack.adjustments {
        Some(adj) if !adj.is_identity() => apply_adjustments(source, adj),
        _ => source.clone(),
    };
    if let Some(kind) = stack.filter
        && kind != FilterKind::Original
    {
        img = apply_filter(&img, kind);
    }
    if let Some(focus) = &stack.focus {
        img = apply_focus(&img, focus);
    }
    if let Some(frame) = &stack.frame {
        img = apply_frame(&img, frame);
    }
    img
}

/// Full render of `source` under `comp`.
pub fn render(source: &Bitmap, comp: &Composition, fonts: &FontBook) -> Bitmap {
    let mut img = render_base(source.as_image(), &comp.stack);
    composite_overlays(&mut img, &comp.overlays);
    render_strokes(&mut img, &comp.strokes);
    render_texts(&mut img, &comp.texts, fonts);
    render_stickers(&mut img, &comp.stickers, fonts);
    Bitmap::from_image(img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::{BlendMode, Color};
    use crate::ops::brush::BrushSettings;
    use crate::ops::overlays::OverlayKind;

    fn source() -> Bitmap {
        Bitmap::filled(20, 20, Color::rgb(200, 100, 50))
    }

    #[test]
    fn empty_composition_is_identity() {
        let src = source();
        let out = render(&src, &Composition::default(), &FontBook::offline());
        assert_eq!(out.as_image(), src.as_image());
    }

    #[test]
    fn original_filter_is_a_no_op() {
        let src = source();
        let comp = Composition {
            stack: RenderStack {
                filter: Some(FilterKind::Original),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(render(&src, &comp, &FontBook::offline()).as_image(), src.as_image());
    }

    #[test]
    fn adjustments_feed_the_filter() {
        let src = Bitmap::filled(4, 4, Color::rgb(100, 100, 100));
        let comp = Composition {
            stack: RenderStack {
                adjustments: Some(Adjustments { brightness: 200.0, ..Default::default() }),
                filter: Some(FilterKind::Invert),
                ..Default::default()
            },
            ..Default::default()
        };
        let out = render(&src, &comp, &FontBook::offline());
        assert_eq!(out.pixel(0, 0).map(|p| p.0), Some([55, 55, 55, 255]));
    }

    #[test]
    fn frame_wraps_filtered_image_and_overlays_cover_frame() {
        let src = Bitmap::filled(10, 10, Color::rgb(255, 0, 0));
        let mut comp = Composition {
            stack: RenderStack {
                filter: Some(FilterKind::Grayscale),
                frame: Some(Frame { border_width: 2, padding: 3, border_color: Color::BLACK, ..Default::default() }),
                ..Default::default()
            },
            ..Default::default()
        };
        let out = render(&src, &comp, &FontBook::offline());
        assert_eq!(out.dimensions(), (20, 20));
        assert_eq!(out.pixel(5, 5).map(|p| p.0), Some([85, 85, 85, 255]));
        assert_eq!(comp.stack.frame_inset(), 5);

        comp.overlays.push(
            Overlay::new(OverlayKind::Color { color: Color::WHITE }).with_blend(BlendMode::Normal, 100.0),
        );
        let covered = render(&src, &comp, &FontBook::offline());
        assert_eq!(covered.pixel(0, 0).map(|p| p.0), Some([255, 255, 255, 255]));
    }

    #[test]
    fn strokes_draw_over_overlays() {
        let src = source();
        let mut comp = Composition::default();
        comp.overlays.push(
            Overlay::new(OverlayKind::Color { color: Color::BLACK }).with_blend(BlendMode::Normal, 100.0),
        );
        let settings = BrushSettings { color: Color::WHITE, size: 6.0, ..Default::default() };
        comp.strokes.push(BrushStroke::begin(settings, 10.0, 10.0));
        let out = render(&src, &comp, &FontBook::offline());
        assert_eq!(out.pixel(10, 10).map(|p| p.0), Some([255, 255, 255, 255]));
        assert_eq!(out.pixel(0, 0).map(|p| p.0), Some([0, 0, 0, 255]));
    }

    #[test]
    fn translate_moves_annotations_and_strokes() {
        let mut comp = Composition::default();
        comp.texts.push(TextOverlay::new("a", 30.0, 40.0, Default::default()));
        comp.stickers.push(Sticker::new("*", 10.0, 10.0));
        comp.strokes.push(BrushStroke::begin(BrushSettings::default(), 5.0, 6.0));
        comp.translate(-5.0, -6.0);
        assert_eq!((comp.texts[0].x, comp.texts[0].y), (25.0, 34.0));
        assert_eq!((comp.stickers[0].x, comp.stickers[0].y), (5.0, 4.0));
        assert_eq!(comp.strokes[0].points[0], (0.0, 0.0));
    }

    #[test]
    fn quarter_turns_carry_positions() {
        let mut comp = Composition::default();
        comp.texts.push(TextOverlay::new("a", 250.0, 50.0, Default::default()));
        comp.stickers.push(Sticker::new("*", 10.0, 20.0));

        comp.rotate(90, (300, 100));
        assert_eq!((comp.texts[0].x, comp.texts[0].y), (50.0, 250.0));
        assert_eq!((comp.stickers[0].x, comp.stickers[0].y), (80.0, 10.0));
        assert_eq!(comp.stickers[0].rotation, 90.0);

        // Back the other way on the turned 100x300 source.
        comp.rotate(-90, (100, 300));
        assert_eq!((comp.texts[0].x, comp.texts[0].y), (250.0, 50.0));
        assert_eq!(comp.stickers[0].rotation, 0.0);

        comp.rotate(180, (300, 100));
        assert_eq!((comp.texts[0].x, comp.texts[0].y), (50.0, 50.0));
    }

    #[test]
    fn flips_respect_frame_inset() {
        let mut comp = Composition {
            stack: RenderStack {
                frame: Some(Frame { border_width: 5, padding: 5, ..Default::default() }),
                ..Default::default()
            },
            ..Default::default()
        };
        comp.strokes.push(BrushStroke::begin(BrushSettings::default(), 15.0, 30.0));
        // Source (5, 20) in a 40x60 image.
        comp.flip(FlipAxis::Horizontal, (40, 60));
        assert_eq!(comp.strokes[0].points[0], (45.0, 30.0));
        comp.flip(FlipAxis::Vertical, (40, 60));
        assert_eq!(comp.strokes[0].points[0], (45.0, 50.0));
    }
}
