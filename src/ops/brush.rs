// ============================================================================
// BRUSH: freehand strokes rasterised into anti-aliased coverage
// ============================================================================

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{BlendMode, Color, CoverageMask};

pub const MIN_BRUSH_SIZE: f32 = 1.0;
pub const MAX_BRUSH_SIZE: f32 = 50.0;

/// Swatches offered next to the colour picker.
pub const BRUSH_PRESETS: [Color; 10] = [
    Color::rgb(0xff, 0xff, 0xff),
    Color::rgb(0x00, 0x00, 0x00),
    Color::rgb(0xff, 0x00, 0x00),
    Color::rgb(0x00, 0xff, 0x00),
    Color::rgb(0x00, 0x00, 0xff),
    Color::rgb(0xff, 0xff, 0x00),
    Color::rgb(0x00, 0xff, 0xff),
    Color::rgb(0xff, 0x00, 0xff),
    Color::rgb(0xff, 0x88, 0x00),
    Color::rgb(0x88, 0xff, 0x00),
];

/// Calligraphy nib angle (degrees) and thickness relative to its width.
const NIB_ANGLE: f32 = 45.0;
const NIB_THICKNESS: f32 = 0.25;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrushStyle {
    #[default]
    Round,
    Square,
    Calligraphy,
}

impl BrushStyle {
    pub fn label(&self) -> &'static str {
        match self {
            BrushStyle::Round => "Round",
            BrushStyle::Square => "Square",
            BrushStyle::Calligraphy => "Calligraphy",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    pub color: Color,
    pub size: f32,
    pub opacity: f32,
    pub style: BrushStyle,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            color: Color::WHITE,
            size: 5.0,
            opacity: 100.0,
            style: BrushStyle::Round,
        }
    }
}

impl BrushSettings {
    /// Same settings with size and opacity pulled into range.
    pub fn sanitized(mut self) -> Self {
        self.size = self.size.clamp(MIN_BRUSH_SIZE, MAX_BRUSH_SIZE);
        self.opacity = self.opacity.clamp(0.0, 100.0);
        self
    }
}

/// One pointer-down to pointer-up gesture, in backing-store coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BrushStroke {
    pub id: Uuid,
    pub settings: BrushSettings,
    pub points: Vec<(f32, f32)>,
}

impl BrushStroke {
    pub fn begin(settings: BrushSettings, x: f32, y: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings: settings.sanitized(),
            points: vec![(x, y)],
        }
    }

    pub fn extend(&mut self, x: f32, y: f32) {
        if self.points.last() != Some(&(x, y)) {
            self.points.push((x, y));
        }
    }

    /// Coverage of the whole stroke. Overlapping segments take the max, so
    /// a stroke never darkens itself where it crosses.
    pub fn coverage(&self) -> Option<CoverageMask> {
        let first = *self.points.first()?;
        let r = self.settings.size * 0.5;
        let reach = r * std::f32::consts::SQRT_2 + 1.0;
        let (mut x0, mut y0, mut x1, mut y1) = (first.0, first.1, first.0, first.1);
        for &(x, y) in &self.points {
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
        let mx = (x0 - reach).floor() as i64;
        let my = (y0 - reach).floor() as i64;
        let mw = ((x1 + reach).ceil() as i64 - mx).max(1) as u32;
        let mh = ((y1 + reach).ceil() as i64 - my).max(1) as u32;
        let mut mask = CoverageMask::new(mx, my, mw, mh);

        let segments: Vec<((f32, f32), (f32, f32))> = if self.points.len() == 1 {
            vec![(first, first)]
        } else {
            self.points.windows(2).map(|w| (w[0], w[1])).collect()
        };

        for (a, b) in segments {
            match self.settings.style {
                BrushStyle::Round => stroke_capsule(&mut mask, a, b, r),
                BrushStyle::Square => stamp_along(&mut mask, a, b, r, |dx, dy| sdf_square(dx, dy, r)),
                BrushStyle::Calligraphy => stamp_along(&mut mask, a, b, r, |dx, dy| sdf_nib(dx, dy, r)),
            }
        }
        Some(mask)
    }

    pub fn render(&self, dst: &mut RgbaImage) {
        if let Some(mask) = self.coverage() {
            mask.paint(dst, self.settings.color, BlendMode::Normal, self.settings.opacity / 100.0);
        }
    }
}

pub fn render_strokes(dst: &mut RgbaImage, strokes: &[BrushStroke]) {
    for stroke in strokes {
        stroke.render(dst);
    }
}

/// Round-capped segment: distance to the segment against the radius.
fn stroke_capsule(mask: &mut CoverageMask, a: (f32, f32), b: (f32, f32), r: f32) {
    let reach = r + 1.0;
    let x0 = (a.0.min(b.0) - reach).floor() as i64;
    let x1 = (a.0.max(b.0) + reach).ceil() as i64;
    let y0 = (a.1.min(b.1) - reach).floor() as i64;
    let y1 = (a.1.max(b.1) + reach).ceil() as i64;
    for py in y0..y1 {
        for px in x0..x1 {
            let d = dist_to_segment(px as f32 + 0.5, py as f32 + 0.5, a, b);
            let cov = (r + 0.5 - d).clamp(0.0, 1.0);
            if cov > 0.0 {
                mask.add(px, py, cov);
            }
        }
    }
}

/// Sweep a shape given as an SDF along a segment in half-pixel steps. The
/// shape must fit inside a `2r` square rotated any way.
fn stamp_along<F>(mask: &mut CoverageMask, a: (f32, f32), b: (f32, f32), r: f32, sdf: F)
where
    F: Fn(f32, f32) -> f32,
{
    let len = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
    let steps = (len * 2.0).ceil().max(1.0) as usize;
    let extent = r * std::f32::consts::SQRT_2 + 1.0;
    for i in 0..=steps {
        let t = i as f32 / steps as f32;
        let cx = a.0 + (b.0 - a.0) * t;
        let cy = a.1 + (b.1 - a.1) * t;
        let x0 = (cx - extent).floor() as i64;
        let x1 = (cx + extent).ceil() as i64;
        let y0 = (cy - extent).floor() as i64;
        let y1 = (cy + extent).ceil() as i64;
        for py in y0..y1 {
            for px in x0..x1 {
                let cov = (0.5 - sdf(px as f32 + 0.5 - cx, py as f32 + 0.5 - cy)).clamp(0.0, 1.0);
                if cov > 0.0 {
                    mask.add(px, py, cov);
                }
            }
        }
    }
}

fn sdf_square(dx: f32, dy: f32, r: f32) -> f32 {
    let qx = dx.abs() - r;
    let qy = dy.abs() - r;
    let outside = (qx.max(0.0).powi(2) + qy.max(0.0).powi(2)).sqrt();
    outside + qx.max(qy).min(0.0)
}

/// Flat nib of width `2r` held at [`NIB_ANGLE`].
fn sdf_nib(dx: f32, dy: f32, r: f32) -> f32 {
    let (sin, cos) = NIB_ANGLE.to_radians().sin_cos();
    let u = dx * cos + dy * sin;
    let v = -dx * sin + dy * cos;
    sdf_square(u, v, r).max(v.abs() - (r * NIB_THICKNESS).max(0.5))
}

fn dist_to_segment(px: f32, py: f32, a: (f32, f32), b: (f32, f32)) -> f32 {
    let (abx, aby) = (b.0 - a.0, b.1 - a.1);
    let len_sq = abx * abx + aby * aby;
    let t = if len_sq > 0.0 {
        (((px - a.0) * abx + (py - a.1) * aby) / len_sq).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let (cx, cy) = (a.0 + abx * t, a.1 + aby * t);
    ((px - cx).powi(2) + (py - cy).powi(2)).sqrt()
}
