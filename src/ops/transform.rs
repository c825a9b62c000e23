// ============================================================================
// GEOMETRY: rotate, flip, crop
// ============================================================================

use image::{imageops, Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlipAxis {
    Horizontal,
    Vertical,
}

/// Rotate clockwise by `degrees` (any integer, normalised mod 360).
///
/// Quarter turns are exact pixel permutations; 90 and 270 swap the canvas
/// dimensions. Other angles turn about the centre on a same-size canvas with
/// bilinear sampling, leaving uncovered corners transparent.
pub fn rotate(src: &RgbaImage, degrees: i32) -> RgbaImage {
    match degrees.rem_euclid(360) {
        0 => src.clone(),
        90 => imageops::rotate90(src),
        180 => imageops::rotate180(src),
        270 => imageops::rotate270(src),
        other => rotate_free(src, other as f32),
    }
}

fn rotate_free(src: &RgbaImage, degrees: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let stride = w as usize * 4;
    let mut dst_raw = vec![0u8; stride * h as usize];

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 + 0.5 - cy;
        for x in 0..w as usize {
            let dx = x as f32 + 0.5 - cx;
            // Inverse rotation maps the destination pixel back into the source.
            let sx = dx * cos + dy * sin + cx - 0.5;
            let sy = -dx * sin + dy * cos + cy - 0.5;
            if let Some(px) = bilinear_sample(src, sx, sy) {
                row[x * 4..x * 4 + 4].copy_from_slice(&px.0);
            }
        }
    });

    RgbaImage::from_raw(w, h, dst_raw).unwrap()
}

/// Sample `src` at a fractional position. `None` when fully outside.
pub fn bilinear_sample(src: &RgbaImage, x: f32, y: f32) -> Option<Rgba<u8>> {
    let (w, h) = (src.width() as i64, src.height() as i64);
    if x <= -1.0 || y <= -1.0 || x >= w as f32 || y >= h as f32 {
        return None;
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let fetch = |px: i64, py: i64| -> [f32; 4] {
        if px < 0 || py < 0 || px >= w || py >= h {
            [0.0; 4]
        } else {
            let p = src.get_pixel(px as u32, py as u32);
            let a = p[3] as f32;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, a]
        }
    };

    let taps = [
        (fetch(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (fetch(x0 + 1, y0), fx * (1.0 - fy)),
        (fetch(x0, y0 + 1), (1.0 - fx) * fy),
        (fetch(x0 + 1, y0 + 1), fx * fy),
    ];
    let mut acc = [0.0f32; 4];
    for (px, wgt) in taps {
        for c in 0..4 {
            acc[c] += px[c] * wgt;
        }
    }
    if acc[3] <= 0.0 {
        return None;
    }
    let a = acc[3];
    Some(Rgba([
        (acc[0] / a).round().clamp(0.0, 255.0) as u8,
        (acc[1] / a).round().clamp(0.0, 255.0) as u8,
        (acc[2] / a).round().clamp(0.0, 255.0) as u8,
        a.round().clamp(0.0, 255.0) as u8,
    ]))
}

pub fn flip(src: &RgbaImage, axis: FlipAxis) -> RgbaImage {
    match axis {
        FlipAxis::Horizontal => imageops::flip_horizontal(src),
        FlipAxis::Vertical => imageops::flip_vertical(src),
    }
}

// ---------------------------------------------------------------------------
// Crop
// ---------------------------------------------------------------------------

/// Integer rectangle in backing-store pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A crop drag in displayed (on-screen) coordinates, relative to the top-left
/// of the displayed canvas. Width and height go negative when the drag runs
/// up or left.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CropSelection {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub is_selecting: bool,
}

impl CropSelection {
    pub fn begin(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            width: 0.0,
            height: 0.0,
            is_selecting: true,
        }
    }

    /// Extend the drag to the pointer at (`x`, `y`).
    pub fn update(&mut self, x: f32, y: f32) {
        if self.is_selecting {
            self.width = x - self.x;
            self.height = y - self.y;
        }
    }

    pub fn finish(&mut self) {
        self.is_selecting = false;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0.0 || self.height == 0.0
    }

    /// Same rectangle with a top-left origin and positive extent.
    pub fn normalized(&self) -> Self {
        Self {
            x: self.x.min(self.x + self.width),
            y: self.y.min(self.y + self.height),
            width: self.width.abs(),
            height: self.height.abs(),
            is_selecting: self.is_selecting,
        }
    }

    /// Map into backing pixels of a `backing` sized bitmap displayed at
    /// `display` size. The origin floors, the extent truncates, and the result
    /// is clamped to the bitmap. `None` for an empty result.
    pub fn to_backing(&self, display: (f32, f32), backing: (u32, u32)) -> Option<PixelRect> {
        if self.is_empty() || display.0 <= 0.0 || display.1 <= 0.0 {
            return None;
        }
        let n = self.normalized();
        let sx = backing.0 as f32 / display.0;
        let sy = backing.1 as f32 / display.1;

        let left = (n.x * sx).floor().max(0.0);
        let top = (n.y * sy).floor().max(0.0);
        let right = ((n.x * sx).floor() + (n.width * sx).trunc()).min(backing.0 as f32);
        let bottom = ((n.y * sy).floor() + (n.height * sy).trunc()).min(backing.1 as f32);
        if right <= left || bottom <= top {
            return None;
        }
        Some(PixelRect {
            x: left as u32,
            y: top as u32,
            width: (right - left) as u32,
            height: (bottom - top) as u32,
        })
    }
}

/// Cut `rect` out of `src`. The rectangle is clamped to the image.
pub fn crop(src: &RgbaImage, rect: PixelRect) -> RgbaImage {
    let x = rect.x.min(src.width());
    let y = rect.y.min(src.height());
    let w = rect.width.min(src.width() - x);
    let h = rect.height.min(src.height() - y);
    imageops::crop_imm(src, x, y, w, h).to_image()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 20) as u8, (y * 25) as u8, (x + y) as u8, 255]))
    }

    #[test]
    fn flip_twice_restores() {
        let img = pattern(7, 4);
        for axis in [FlipAxis::Horizontal, FlipAxis::Vertical] {
            let once = flip(&img, axis);
            assert_ne!(once, img);
            assert_eq!(flip(&once, axis), img);
        }
    }

    #[test]
    fn quarter_turns_swap_and_restore() {
        let img = pattern(6, 3);
        let r90 = rotate(&img, 90);
        assert_eq!(r90.dimensions(), (3, 6));
        assert_eq!(r90.get_pixel(2, 0), img.get_pixel(0, 0));
        assert_eq!(rotate(&r90, 270), img);
        assert_eq!(rotate(&rotate(&img, -90), 90), img);

        let mut full = img.clone();
        for _ in 0..4 {
            full = rotate(&full, 90);
        }
        assert_eq!(full, img);
        assert_eq!(rotate(&img, 360), img);
        assert_eq!(rotate(&img, 450).dimensions(), (3, 6));
    }

    #[test]
    fn free_rotation_keeps_size_and_centre() {
        let img = RgbaImage::from_pixel(21, 21, Rgba([50, 60, 70, 255]));
        let out = rotate(&img, 45);
        assert_eq!(out.dimensions(), (21, 21));
        assert_eq!(out.get_pixel(10, 10).0, [50, 60, 70, 255]);
        assert_eq!(out.get_pixel(0, 0)[3], 0);
    }

    #[test]
    fn selection_normalises_reverse_drag() {
        let mut sel = CropSelection::begin(50.0, 40.0);
        sel.update(10.0, 20.0);
        let n = sel.normalized();
        assert_eq!((n.x, n.y, n.width, n.height), (10.0, 20.0, 40.0, 20.0));
    }

    #[test]
    fn selection_scales_to_backing_pixels() {
        let mut sel = CropSelection::begin(10.0, 10.0);
        sel.update(60.0, 35.0);
        // 400x200 bitmap shown at 200x100
        let rect = sel.to_backing((200.0, 100.0), (400, 200)).expect("rect");
        assert_eq!(rect, PixelRect { x: 20, y: 20, width: 100, height: 50 });
    }

    #[test]
    fn selection_clamps_and_rejects_empty() {
        let mut sel = CropSelection::begin(90.0, 90.0);
        sel.update(150.0, 150.0);
        let rect = sel.to_backing((100.0, 100.0), (100, 100)).expect("rect");
        assert_eq!(rect, PixelRect { x: 90, y: 90, width: 10, height: 10 });

        let zero = CropSelection::begin(5.0, 5.0);
        assert!(zero.to_backing((100.0, 100.0), (100, 100)).is_none());
        let mut flat = CropSelection::begin(5.0, 5.0);
        flat.update(40.0, 5.0);
        assert!(flat.to_backing((100.0, 100.0), (100, 100)).is_none());
    }

    #[test]
    fn crop_extracts_region() {
        let img = pattern(10, 10);
        let out = crop(&img, PixelRect { x: 2, y: 3, width: 4, height: 5 });
        assert_eq!(out.dimensions(), (4, 5));
        assert_eq!(out.get_pixel(0, 0), img.get_pixel(2, 3));
    }
}
