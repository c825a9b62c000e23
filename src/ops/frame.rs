// ============================================================================
// FRAME: border, padding and shadow around the image on an enlarged canvas
// ============================================================================

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{composite_at, BlendMode, Color, CoverageMask};
use crate::ops::filters::gaussian_blur;
use crate::ops::noise::{fbm, hash_f32};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameStyle {
    #[default]
    Simple,
    Polaroid,
    Vintage,
    Modern,
    Shadow,
    Rounded,
    Film,
    Scalloped,
}

impl FrameStyle {
    pub fn all() -> &'static [FrameStyle] {
        &[
            FrameStyle::Simple,
            FrameStyle::Polaroid,
            FrameStyle::Vintage,
            FrameStyle::Modern,
            FrameStyle::Shadow,
            FrameStyle::Rounded,
            FrameStyle::Film,
            FrameStyle::Scalloped,
        ]
    }

    pub fn label(&self) -> &'static str {
        match self {
            FrameStyle::Simple => "Simple",
            FrameStyle::Polaroid => "Polaroid",
            FrameStyle::Vintage => "Vintage",
            FrameStyle::Modern => "Modern",
            FrameStyle::Shadow => "Shadow",
            FrameStyle::Rounded => "Rounded",
            FrameStyle::Film => "Film",
            FrameStyle::Scalloped => "Scalloped",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    pub style: FrameStyle,
    pub border_width: u32,
    pub border_color: Color,
    pub border_radius: u32,
    pub padding: u32,
    pub shadow_intensity: f32,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            style: FrameStyle::Simple,
            border_width: 10,
            border_color: Color::WHITE,
            border_radius: 0,
            padding: 20,
            shadow_intensity: 20.0,
        }
    }
}

impl Frame {
    /// Offset of the image inside the framed canvas, on every side but the
    /// polaroid bottom.
    pub fn inset(&self) -> u32 {
        self.border_width + self.padding
    }

    /// Framed canvas size for an image of `w` x `h`.
    pub fn canvas_size(&self, w: u32, h: u32) -> (u32, u32) {
        let inset = self.inset();
        let extra_bottom = match self.style {
            FrameStyle::Polaroid => inset * 2,
            _ => 0,
        };
        (w + inset * 2, h + inset * 2 + extra_bottom)
    }

    fn corner_radius(&self, w: u32, h: u32) -> f32 {
        if self.border_radius > 0 {
            self.border_radius as f32
        } else if self.style == FrameStyle::Rounded {
            w.min(h) as f32 * 0.05
        } else {
            0.0
        }
    }
}

/// Draw `src` inside `frame`. Always called with the un-framed image, so
/// re-applying a frame replaces it instead of nesting.
pub fn apply_frame(src: &RgbaImage, frame: &Frame) -> RgbaImage {
    let (iw, ih) = src.dimensions();
    let (w, h) = frame.canvas_size(iw, ih);
    let inset = frame.inset() as i64;

    let mut out = RgbaImage::new(w, h);
    fill_background(&mut out, frame);

    match frame.style {
        FrameStyle::Vintage => age_border(&mut out, frame, iw, ih),
        FrameStyle::Modern => modern_keyline(&mut out, frame),
        FrameStyle::Film => film_sprockets(&mut out, frame),
        FrameStyle::Scalloped => scallop_edges(&mut out, frame),
        _ => {}
    }

    if frame.style == FrameStyle::Shadow && frame.shadow_intensity > 0.0 {
        let shadow = drop_shadow(src, frame.shadow_intensity);
        let offset = (frame.shadow_intensity / 5.0).round() as i64;
        let pad = shadow_pad(frame.shadow_intensity) as i64;
        composite_at(&mut out, &shadow, inset + offset - pad, inset + offset - pad, BlendMode::Normal, 1.0);
    }

    composite_at(&mut out, src, inset, inset, BlendMode::Normal, 1.0);
    out
}

/// Fill with the border colour, clipped to a rounded rectangle when the frame
/// has a corner radius.
fn fill_background(out: &mut RgbaImage, frame: &Frame) {
    let (w, h) = out.dimensions();
    let radius = frame.corner_radius(w, h);
    let color = frame.border_color.to_rgba();
    if radius <= 0.0 {
        for px in out.pixels_mut() {
            *px = color;
        }
        return;
    }

    let hx = w as f32 * 0.5;
    let hy = h as f32 * 0.5;
    let stride = w as usize * 4;
    out.as_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let py = y as f32 + 0.5 - hy;
        for x in 0..w as usize {
            let px = x as f32 + 0.5 - hx;
            let cov = (0.5 - sdf_rounded_box(px, py, hx, hy, radius)).clamp(0.0, 1.0);
            let a = (color[3] as f32 * cov).round() as u8;
            row[x * 4..x * 4 + 4].copy_from_slice(&[color[0], color[1], color[2], a]);
        }
    });
}

#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

#[inline]
fn sdf_rounded_box(px: f32, py: f32, hx: f32, hy: f32, r: f32) -> f32 {
    let r = r.min(hx).min(hy);
    sdf_box(px, py, hx - r, hy - r) - r
}

fn shadow_pad(intensity: f32) -> u32 {
    (intensity / 4.0 * 3.0).ceil() as u32
}

/// Black silhouette of `src` at `intensity`% alpha, blurred, with room
/// around it for the blur to spread.
fn drop_shadow(src: &RgbaImage, intensity: f32) -> RgbaImage {
    let pad = shadow_pad(intensity);
    let (w, h) = src.dimensions();
    let alpha = (intensity / 100.0).clamp(0.0, 1.0);
    let mut silhouette = RgbaImage::new(w + pad * 2, h + pad * 2);
    for (x, y, px) in src.enumerate_pixels() {
        let a = (px[3] as f32 * alpha).round() as u8;
        silhouette.put_pixel(x + pad, y + pad, Rgba([0, 0, 0, a]));
    }
    gaussian_blur(&silhouette, intensity / 4.0)
}

/// Colour that reads against `c`.
fn contrast_color(c: Color) -> Color {
    let luma = 0.299 * c.r as f32 + 0.587 * c.g as f32 + 0.114 * c.b as f32;
    if luma > 128.0 { Color::rgb(20, 20, 20) } else { Color::rgb(235, 235, 235) }
}

/// Mottle and yellow the border with low-frequency noise.
fn age_border(out: &mut RgbaImage, frame: &Frame, iw: u32, ih: u32) {
    let inset = frame.inset();
    let (w, h) = out.dimensions();
    let seed = frame.border_color.r as u32 * 65_536 + frame.border_color.g as u32 * 256 + frame.border_color.b as u32;
    for y in 0..h {
        for x in 0..w {
            let inside_image = x >= inset && x < inset + iw && y >= inset && y < inset + ih;
            if inside_image {
                continue;
            }
            let n = fbm(x as f32 / 24.0, y as f32 / 24.0, seed, 4);
            let speck = hash_f32(x as i32, y as i32, seed ^ 0x5EED);
            let px = out.get_pixel_mut(x, y);
            let shade = 0.82 + 0.18 * n - if speck > 0.995 { 0.25 } else { 0.0 };
            px[0] = (px[0] as f32 * shade).round() as u8;
            px[1] = (px[1] as f32 * shade * 0.96).round() as u8;
            px[2] = (px[2] as f32 * shade * 0.85).round() as u8;
        }
    }
}

/// Thin contrasting line where the border meets the padding.
fn modern_keyline(out: &mut RgbaImage, frame: &Frame) {
    if frame.border_width == 0 {
        return;
    }
    let (w, h) = out.dimensions();
    let b = frame.border_width as i64;
    let mut mask = CoverageMask::new(0, 0, w, h);
    let (right, bottom) = (w as i64 - b - 1, h as i64 - b - 1);
    for x in b..=right {
        mask.add(x, b, 1.0);
        mask.add(x, bottom, 1.0);
    }
    for y in b..=bottom {
        mask.add(b, y, 1.0);
        mask.add(right, y, 1.0);
    }
    mask.paint(out, contrast_color(frame.border_color), BlendMode::Normal, 1.0);
}

/// Sprocket holes along the top and bottom border bands.
fn film_sprockets(out: &mut RgbaImage, frame: &Frame) {
    let b = frame.border_width;
    if b < 4 {
        return;
    }
    let (w, h) = out.dimensions();
    let hole = (b / 2).max(2);
    let pitch = hole * 2;
    let top = (b - hole) / 2;
    let bottom = h - b + top;
    let mut mask = CoverageMask::new(0, 0, w, h);
    let mut x = pitch / 2;
    while x + hole <= w {
        for dy in 0..hole {
            for dx in 0..hole {
                mask.add((x + dx) as i64, (top + dy) as i64, 1.0);
                mask.add((x + dx) as i64, (bottom + dy) as i64, 1.0);
            }
        }
        x += pitch;
    }
    mask.paint(out, contrast_color(frame.border_color), BlendMode::Normal, 1.0);
}

/// Cut half-circle bites out of the outer edge.
fn scallop_edges(out: &mut RgbaImage, frame: &Frame) {
    let (w, h) = out.dimensions();
    let r = (frame.border_width as f32 * 0.5).max(2.0);
    let pitch = r * 2.0;
    let bite = |px: f32, along: f32| -> f32 {
        // Distance to the nearest bite centre on this edge.
        let centre = (along / pitch).floor() * pitch + r;
        let d = ((along - centre).powi(2) + px * px).sqrt();
        (d - r + 0.5).clamp(0.0, 1.0)
    };
    for y in 0..h {
        for x in 0..w {
            let fx = x as f32 + 0.5;
            let fy = y as f32 + 0.5;
            let keep = bite(fy, fx)
                .min(bite(h as f32 - fy, fx))
                .min(bite(fx, fy))
                .min(bite(w as f32 - fx, fy));
            if keep < 1.0 {
                let px = out.get_pixel_mut(x, y);
                px[3] = (px[3] as f32 * keep).round() as u8;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn red(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255]))
    }

    fn frame(style: FrameStyle, border: u32, padding: u32) -> Frame {
        Frame {
            style,
            border_width: border,
            padding,
            border_color: Color::rgb(0, 0, 255),
            ..Default::default()
        }
    }

    #[test]
    fn simple_frame_grows_and_centres() {
        let out = apply_frame(&red(200, 200), &frame(FrameStyle::Simple, 10, 5));
        assert_eq!(out.dimensions(), (230, 230));
        assert_eq!(out.get_pixel(15, 15).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(214, 214).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(14, 15).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(215, 214).0, [0, 0, 255, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn polaroid_has_tall_bottom() {
        let out = apply_frame(&red(200, 200), &frame(FrameStyle::Polaroid, 10, 5));
        assert_eq!(out.dimensions(), (230, 260));
        assert_eq!(out.get_pixel(15, 15).0, [255, 0, 0, 255]);
        assert_eq!(out.get_pixel(100, 240).0, [0, 0, 255, 255]);
    }

    #[test]
    fn rounded_corners_are_transparent() {
        let out = apply_frame(&red(100, 100), &frame(FrameStyle::Rounded, 10, 10));
        assert_eq!(out.dimensions(), (140, 140));
        assert_eq!(out.get_pixel(0, 0)[3], 0);
        assert_eq!(out.get_pixel(70, 1)[3], 255);
    }

    #[test]
    fn shadow_darkens_below_right_of_image() {
        let mut f = frame(FrameStyle::Shadow, 10, 20);
        f.border_color = Color::WHITE;
        f.shadow_intensity = 40.0;
        let out = apply_frame(&red(60, 60), &f);
        // Image spans 30..90; shadow offset is 8px.
        let below = out.get_pixel(60, 94);
        assert!(below[0] < 255, "{:?}", below);
        assert_eq!(out.get_pixel(2, 2).0, [255, 255, 255, 255]);
    }

    #[test]
    fn decorations_leave_the_image_alone() {
        let img = red(40, 30);
        for &style in FrameStyle::all() {
            let f = frame(style, 12, 6);
            let out = apply_frame(&img, &f);
            let (w, h) = f.canvas_size(40, 30);
            assert_eq!(out.dimensions(), (w, h));
            assert_eq!(out.get_pixel(18 + 20, 18 + 15).0, [255, 0, 0, 255], "{:?}", style);
        }
    }

    #[test]
    fn reapplying_from_source_does_not_nest() {
        let img = red(50, 50);
        let a = apply_frame(&img, &frame(FrameStyle::Simple, 10, 5));
        let b = apply_frame(&img, &frame(FrameStyle::Simple, 4, 0));
        assert_eq!(a.dimensions(), (80, 80));
        assert_eq!(b.dimensions(), (58, 58));
    }
}
