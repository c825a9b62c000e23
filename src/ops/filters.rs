// ============================================================================
// FILTERS: named one-click looks plus the colour primitives they use
// ============================================================================
//
// Every filter is a pure `&RgbaImage -> RgbaImage` function. Alpha is carried
// through untouched except where a convolution mixes neighbouring pixels.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{blend_pixel, BlendMode};

/// The filter presets offered by the filter panel. At most one is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Original,
    Grayscale,
    Sepia,
    Invert,
    Vintage,
    Duotone,
    Vignette,
    Sharpen,
    Blur,
    Noir,
    Dramatic,
    Rainbow,
}

impl FilterKind {
    pub fn all() -> &'static [FilterKind] {
        &[
            FilterKind::Original,
            FilterKind::Grayscale,
            FilterKind::Sepia,
            FilterKind::Invert,
            FilterKind::Vintage,
            FilterKind::Duotone,
            FilterKind::Vignette,
            FilterKind::Sharpen,
            FilterKind::Blur,
            FilterKind::Noir,
            FilterKind::Dramatic,
            FilterKind::Rainbow,
        ]
    }

    pub fn id(&self) -> &'static str {
        match self {
            FilterKind::Original => "original",
            FilterKind::Grayscale => "grayscale",
            FilterKind::Sepia => "sepia",
            FilterKind::Invert => "invert",
            FilterKind::Vintage => "vintage",
            FilterKind::Duotone => "duotone",
            FilterKind::Vignette => "vignette",
            FilterKind::Sharpen => "sharpen",
            FilterKind::Blur => "blur",
            FilterKind::Noir => "noir",
            FilterKind::Dramatic => "dramatic",
            FilterKind::Rainbow => "rainbow",
        }
    }

    pub fn from_id(id: &str) -> Option<FilterKind> {
        Self::all().iter().copied().find(|k| k.id() == id)
    }

    pub fn label(&self) -> &'static str {
        match self {
            FilterKind::Original => "Original",
            FilterKind::Grayscale => "Grayscale",
            FilterKind::Sepia => "Sepia",
            FilterKind::Invert => "Invert",
            FilterKind::Vintage => "Vintage",
            FilterKind::Duotone => "Duotone",
            FilterKind::Vignette => "Vignette",
            FilterKind::Sharpen => "Sharpen",
            FilterKind::Blur => "Blur",
            FilterKind::Noir => "Noir",
            FilterKind::Dramatic => "Dramatic",
            FilterKind::Rainbow => "Rainbow",
        }
    }
}

/// Run a filter preset over `src`.
pub fn apply_filter(src: &RgbaImage, kind: FilterKind) -> RgbaImage {
    match kind {
        FilterKind::Original => src.clone(),
        FilterKind::Grayscale => grayscale(src),
        FilterKind::Sepia => sepia(src),
        FilterKind::Invert => invert(src),
        FilterKind::Vintage => vintage(src),
        FilterKind::Duotone => duotone(src, [255.0, 0.0, 0.0], [0.0, 0.0, 255.0]),
        FilterKind::Vignette => vignette(src),
        FilterKind::Sharpen => sharpen(src, 1.0),
        FilterKind::Blur => gaussian_blur(src, 5.0),
        FilterKind::Noir => noir(src),
        FilterKind::Dramatic => apply_css_chain(
            src,
            &[CssFilter::Contrast(1.5), CssFilter::Brightness(0.8)],
        ),
        FilterKind::Rainbow => apply_css_chain(
            src,
            &[CssFilter::HueRotate(180.0), CssFilter::Saturate(2.0)],
        ),
    }
}

// ---------------------------------------------------------------------------
// Per-pixel core
// ---------------------------------------------------------------------------

/// Map every pixel through `transform` (channels as 0..255 floats), rounding
/// and clamping the result back to u8.
pub fn map_pixels<F>(src: &RgbaImage, transform: F) -> RgbaImage
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let (w, h) = src.dimensions();
    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let mut dst_raw = vec![0u8; src_raw.len()];
    if stride == 0 {
        return src.clone();
    }

    dst_raw.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &src_raw[y * stride..(y + 1) * stride];
        for pi in (0..stride).step_by(4) {
            let (r, g, b, a) = transform(
                row_in[pi] as f32,
                row_in[pi + 1] as f32,
                row_in[pi + 2] as f32,
                row_in[pi + 3] as f32,
            );
            row_out[pi] = r.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 1] = g.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 2] = b.round().clamp(0.0, 255.0) as u8;
            row_out[pi + 3] = a.round().clamp(0.0, 255.0) as u8;
        }
    });

    RgbaImage::from_raw(w, h, dst_raw).unwrap()
}

/// Integer mean of the three colour channels.
fn channel_mean(r: f32, g: f32, b: f32) -> f32 {
    ((r + g + b) / 3.0).floor()
}

pub fn grayscale(src: &RgbaImage) -> RgbaImage {
    map_pixels(src, |r, g, b, a| {
        let v = channel_mean(r, g, b);
        (v, v, v, a)
    })
}

pub fn sepia(src: &RgbaImage) -> RgbaImage {
    map_pixels(src, |r, g, b, a| {
        (
            (r * 0.393 + g * 0.769 + b * 0.189).min(255.0),
            (r * 0.349 + g * 0.686 + b * 0.168).min(255.0),
            (r * 0.272 + g * 0.534 + b * 0.131).min(255.0),
            a,
        )
    })
}

pub fn invert(src: &RgbaImage) -> RgbaImage {
    map_pixels(src, |r, g, b, a| (255.0 - r, 255.0 - g, 255.0 - b, a))
}

pub fn vintage(src: &RgbaImage) -> RgbaImage {
    map_pixels(src, |r, g, b, a| (r * 1.2, g * 0.9, b * 0.8, a))
}

pub fn noir(src: &RgbaImage) -> RgbaImage {
    let remap = |v: f32| if v < 128.0 { v * 0.8 } else { (v * 1.2).min(255.0) };
    map_pixels(src, move |r, g, b, a| {
        let v = channel_mean(r, g, b);
        (remap(v), remap(v), remap(v), a)
    })
}

/// Grayscale, then lerp from `dark` to `light` by the grey level.
pub fn duotone(src: &RgbaImage, dark: [f32; 3], light: [f32; 3]) -> RgbaImage {
    map_pixels(src, move |r, g, b, a| {
        let t = channel_mean(r, g, b) / 255.0;
        (
            dark[0] * (1.0 - t) + light[0] * t,
            dark[1] * (1.0 - t) + light[1] * t,
            dark[2] * (1.0 - t) + light[2] * t,
            a,
        )
    })
}

/// Black radial falloff composited with the Overlay blend mode.
///
/// Transparent inside half the radius, ramping to 0.8 alpha at the radius
/// (90% of the shorter half-extent) and held there to the corners.
pub fn vignette(src: &RgbaImage) -> RgbaImage {
    let (w, h) = src.dimensions();
    let cx = w as f32 / 2.0;
    let cy = h as f32 / 2.0;
    let radius = cx.min(cy) * 0.9;
    let inner = radius * 0.5;
    let span = (radius - inner).max(f32::EPSILON);

    let mut out = src.clone();
    let stride = w as usize * 4;
    if stride == 0 {
        return out;
    }
    out.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let dy = y as f32 + 0.5 - cy;
            for x in 0..w as usize {
                let dx = x as f32 + 0.5 - cx;
                let t = (((dx * dx + dy * dy).sqrt() - inner) / span).clamp(0.0, 1.0);
                let alpha = (t * 0.8 * 255.0).round() as u8;
                if alpha == 0 {
                    continue;
                }
                let i = x * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                let shade = Rgba([0, 0, 0, alpha]);
                row[i..i + 4].copy_from_slice(&blend_pixel(base, shade, BlendMode::Overlay, 1.0).0);
            }
        });
    out
}

// ---------------------------------------------------------------------------
// CSS filter functions
// ---------------------------------------------------------------------------

/// The subset of CSS `filter` functions the editor relies on. Amounts are
/// fractions (1.0 = 100%), hue rotation is in degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CssFilter {
    Brightness(f32),
    Contrast(f32),
    Saturate(f32),
    HueRotate(f32),
}

impl CssFilter {
    fn is_identity(&self) -> bool {
        match *self {
            CssFilter::Brightness(v) | CssFilter::Contrast(v) | CssFilter::Saturate(v) => v == 1.0,
            CssFilter::HueRotate(deg) => deg.rem_euclid(360.0) == 0.0,
        }
    }

    /// Apply to one colour (0..1 channels), clamping like the browser does
    /// between filter functions.
    fn apply(&self, c: [f32; 3]) -> [f32; 3] {
        let out = match *self {
            CssFilter::Brightness(v) => [c[0] * v, c[1] * v, c[2] * v],
            CssFilter::Contrast(v) => {
                let k = |x: f32| (x - 0.5) * v + 0.5;
                [k(c[0]), k(c[1]), k(c[2])]
            }
            CssFilter::Saturate(s) => mul3(&saturate_matrix(s), c),
            CssFilter::HueRotate(deg) => mul3(&hue_rotate_matrix(deg), c),
        };
        [
            out[0].clamp(0.0, 1.0),
            out[1].clamp(0.0, 1.0),
            out[2].clamp(0.0, 1.0),
        ]
    }
}

fn saturate_matrix(s: f32) -> [[f32; 3]; 3] {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

fn hue_rotate_matrix(deg: f32) -> [[f32; 3]; 3] {
    let (sin, cos) = deg.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn mul3(m: &[[f32; 3]; 3], c: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * c[0] + m[0][1] * c[1] + m[0][2] * c[2],
        m[1][0] * c[0] + m[1][1] * c[1] + m[1][2] * c[2],
        m[2][0] * c[0] + m[2][1] * c[1] + m[2][2] * c[2],
    ]
}

/// Run a chain of CSS filter functions as one pass, left to right.
pub fn apply_css_chain(src: &RgbaImage, chain: &[CssFilter]) -> RgbaImage {
    let active: Vec<CssFilter> = chain.iter().copied().filter(|f| !f.is_identity()).collect();
    if active.is_empty() {
        return src.clone();
    }
    map_pixels(src, |r, g, b, a| {
        let mut c = [r / 255.0, g / 255.0, b / 255.0];
        for f in &active {
            c = f.apply(c);
        }
        (c[0] * 255.0, c[1] * 255.0, c[2] * 255.0, a)
    })
}

// ---------------------------------------------------------------------------
// Convolutions
// ---------------------------------------------------------------------------

/// 3×3 unsharp kernel `[0,-a,0; -a,1+4a,-a; 0,-a,0]` on RGB. The one-pixel
/// border and the alpha channel are left as they are.
pub fn sharpen(src: &RgbaImage, amount: f32) -> RgbaImage {
    let (w, h) = src.dimensions();
    let mut out = src.clone();
    if w < 3 || h < 3 || amount <= 0.0 {
        return out;
    }
    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let centre = 1.0 + 4.0 * amount;

    out.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(1)
        .take(h as usize - 2)
        .for_each(|(y, row)| {
            let above = &src_raw[(y - 1) * stride..y * stride];
            let here = &src_raw[y * stride..(y + 1) * stride];
            let below = &src_raw[(y + 1) * stride..(y + 2) * stride];
            for x in 1..w as usize - 1 {
                for c in 0..3 {
                    let i = x * 4 + c;
                    let v = here[i] as f32 * centre
                        - amount
                            * (above[i] as f32
                                + below[i] as f32
                                + here[i - 4] as f32
                                + here[i + 4] as f32);
                    row[i] = v.round().clamp(0.0, 255.0) as u8;
                }
            }
        });
    out
}

fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil().max(1.0) as i32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-radius..=radius)
        .map(|i| (-(i * i) as f32 / two_sigma_sq).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for k in kernel.iter_mut() {
        *k /= sum;
    }
    kernel
}

/// Separable Gaussian blur with clamped edges. Colour is weighted by alpha
/// so transparent pixels do not bleed dark fringes into their neighbours.
pub fn gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = (kernel.len() / 2) as isize;

    let premul: Vec<f32> = src
        .as_raw()
        .chunks_exact(4)
        .flat_map(|p| {
            let a = p[3] as f32 / 255.0;
            [p[0] as f32 * a, p[1] as f32 * a, p[2] as f32 * a, p[3] as f32]
        })
        .collect();

    let mut buf_h = vec![0.0f32; premul.len()];
    buf_h.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        let row_in = &premul[y * w * 4..(y + 1) * w * 4];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    let mut dst_raw = vec![0u8; premul.len()];
    dst_raw.par_chunks_mut(w * 4).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius).clamp(0, h as isize - 1) as usize;
                let idx = sy * w * 4 + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            let a = acc[3];
            let unpremul = |v: f32| if a > 0.0 { v * 255.0 / a } else { 0.0 };
            let o = x * 4;
            row_out[o] = unpremul(acc[0]).round().clamp(0.0, 255.0) as u8;
            row_out[o + 1] = unpremul(acc[1]).round().clamp(0.0, 255.0) as u8;
            row_out[o + 2] = unpremul(acc[2]).round().clamp(0.0, 255.0) as u8;
            row_out[o + 3] = a.round().clamp(0.0, 255.0) as u8;
        }
    });

    RgbaImage::from_raw(w as u32, h as u32, dst_raw).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(px))
    }

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 37 % 256) as u8, (y * 53 % 256) as u8, ((x + y) * 11 % 256) as u8, 255])
        })
    }

    #[test]
    fn grayscale_of_red_is_truncated_mean() {
        let out = grayscale(&solid(100, 100, [255, 0, 0, 255]));
        assert!(out.pixels().all(|p| p.0 == [85, 85, 85, 255]));
    }

    #[test]
    fn invert_white_is_black() {
        let out = invert(&solid(4, 4, [255, 255, 255, 255]));
        assert!(out.pixels().all(|p| p.0 == [0, 0, 0, 255]));
    }

    #[test]
    fn invert_twice_is_identity() {
        let img = gradient(17, 9);
        assert_eq!(invert(&invert(&img)), img);
    }

    #[test]
    fn sepia_matches_matrix() {
        let out = sepia(&solid(1, 1, [100, 100, 100, 255]));
        assert_eq!(out.get_pixel(0, 0).0, [135, 120, 94, 255]);
        let out = sepia(&solid(1, 1, [255, 255, 255, 255]));
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 239, 255]);
    }

    #[test]
    fn noir_and_vintage() {
        let out = noir(&solid(1, 1, [90, 90, 90, 255]));
        assert_eq!(out.get_pixel(0, 0).0, [72, 72, 72, 255]);
        let out = noir(&solid(1, 1, [240, 240, 240, 255]));
        assert_eq!(out.get_pixel(0, 0).0, [255, 255, 255, 255]);
        let out = vintage(&solid(1, 1, [100, 100, 100, 7]));
        assert_eq!(out.get_pixel(0, 0).0, [120, 90, 80, 7]);
    }

    #[test]
    fn duotone_endpoints() {
        let dark = apply_filter(&solid(1, 1, [0, 0, 0, 255]), FilterKind::Duotone);
        let light = apply_filter(&solid(1, 1, [255, 255, 255, 255]), FilterKind::Duotone);
        assert_eq!(dark.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(light.get_pixel(0, 0).0, [0, 0, 255, 255]);
    }

    #[test]
    fn vignette_leaves_centre_and_darkens_corners() {
        let img = solid(64, 64, [200, 200, 200, 255]);
        let out = vignette(&img);
        assert_eq!(out.get_pixel(32, 32), img.get_pixel(32, 32));
        assert!(out.get_pixel(0, 0)[0] < 200);
    }

    #[test]
    fn sharpen_keeps_border_and_flat_regions() {
        let img = solid(5, 5, [120, 60, 30, 200]);
        assert_eq!(sharpen(&img, 2.0), img);

        let mut spot = solid(5, 5, [100, 100, 100, 255]);
        spot.put_pixel(2, 2, Rgba([150, 150, 150, 255]));
        let out = sharpen(&spot, 1.0);
        assert_eq!(out.get_pixel(2, 2)[0], 255);
        assert_eq!(out.get_pixel(2, 1)[0], 50);
        assert_eq!(out.get_pixel(0, 0)[0], 100);
    }

    #[test]
    fn blur_preserves_flat_colour() {
        let img = solid(12, 12, [10, 20, 30, 255]);
        assert_eq!(gaussian_blur(&img, 3.0), img);
    }

    #[test]
    fn css_identity_chain_is_exact() {
        let img = gradient(8, 8);
        let chain = [
            CssFilter::Brightness(1.0),
            CssFilter::Contrast(1.0),
            CssFilter::Saturate(1.0),
        ];
        assert_eq!(apply_css_chain(&img, &chain), img);
    }

    #[test]
    fn brightness_zero_is_black() {
        let out = apply_css_chain(&gradient(4, 4), &[CssFilter::Brightness(0.0)]);
        assert!(out.pixels().all(|p| p[0] == 0 && p[1] == 0 && p[2] == 0 && p[3] == 255));
    }

    #[test]
    fn filter_ids_round_trip() {
        for kind in FilterKind::all() {
            assert_eq!(FilterKind::from_id(kind.id()), Some(*kind));
        }
        assert_eq!(FilterKind::from_id("sparkle"), None);
    }
}
