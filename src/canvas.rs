use std::fmt;
use std::sync::Arc;

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

// ============================================================================
// BITMAP
// ============================================================================

/// A decoded RGBA8 raster (straight alpha).
///
/// Pixel storage is shared between clones, so history snapshots and render
/// caches cost a pointer until someone writes. Writers go through
/// [`Bitmap::make_mut`], which detaches the buffer first.
#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
    pixels: Arc<RgbaImage>,
}

impl Bitmap {
    /// Fully transparent bitmap.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_image(RgbaImage::new(width, height))
    }

    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self::from_image(RgbaImage::from_pixel(width, height, color.to_rgba()))
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self {
            pixels: Arc::new(image),
        }
    }

    /// Build from a raw RGBA byte vector. `None` if the length does not match.
    pub fn from_raw(width: u32, height: u32, rgba: Vec<u8>) -> Option<Self> {
        RgbaImage::from_raw(width, height, rgba).map(Self::from_image)
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn as_image(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn make_mut(&mut self) -> &mut RgbaImage {
        Arc::make_mut(&mut self.pixels)
    }

    pub fn into_image(self) -> RgbaImage {
        Arc::try_unwrap(self.pixels).unwrap_or_else(|shared| (*shared).clone())
    }

    /// Number of bytes held by the pixel buffer.
    pub fn byte_size(&self) -> usize {
        self.pixels.as_raw().len()
    }

    /// True when both bitmaps point at the same storage.
    pub fn shares_storage(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.pixels, &other.pixels)
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba<u8>> {
        if x < self.width() && y < self.height() {
            Some(*self.pixels.get_pixel(x, y))
        } else {
            None
        }
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, px: Rgba<u8>) {
        if x < self.width() && y < self.height() {
            self.make_mut().put_pixel(x, y, px);
        }
    }

    /// Copy out a rectangle. The rectangle is clamped to the bitmap, so the
    /// result may be smaller than requested (or empty).
    pub fn region(&self, x: u32, y: u32, width: u32, height: u32) -> Bitmap {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let w = width.min(self.width() - x);
        let h = height.min(self.height() - y);
        let sub = image::imageops::crop_imm(self.as_image(), x, y, w, h).to_image();
        Bitmap::from_image(sub)
    }

    /// Overwrite a rectangle with `src` placed at (`x`, `y`). Parts falling
    /// outside the bitmap are clipped.
    pub fn put_region(&mut self, src: &Bitmap, x: i64, y: i64) {
        let (dw, dh) = (self.width() as i64, self.height() as i64);
        let (sw, sh) = (src.width() as i64, src.height() as i64);
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + sw).min(dw);
        let y1 = (y + sh).min(dh);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let src_img = src.as_image();
        let dst = self.make_mut();
        let row_bytes = ((x1 - x0) * 4) as usize;
        for dy in y0..y1 {
            let sy = (dy - y) as u32;
            let sx = (x0 - x) as u32;
            let s_off = ((sy * src_img.width() + sx) * 4) as usize;
            let d_off = ((dy as u32 * dst.width() + x0 as u32) * 4) as usize;
            let raw_src = &src_img.as_raw()[s_off..s_off + row_bytes];
            dst.as_mut()[d_off..d_off + row_bytes].copy_from_slice(raw_src);
        }
    }

    pub fn fill(&mut self, color: Color) {
        let px = color.to_rgba();
        for p in self.make_mut().pixels_mut() {
            *p = px;
        }
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(image: RgbaImage) -> Self {
        Bitmap::from_image(image)
    }
}

// ============================================================================
// COLOR
// ============================================================================

/// Straight-alpha RGBA colour, serialised as a `#rrggbb[aa]` string.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn from_hex(s: &str) -> Option<Self> {
        let hex = s.trim().trim_start_matches('#');
        let nibble = |c: u8| -> Option<u8> { (c as char).to_digit(16).map(|d| d as u8) };
        let bytes = hex.as_bytes();
        match bytes.len() {
            3 => {
                let r = nibble(bytes[0])?;
                let g = nibble(bytes[1])?;
                let b = nibble(bytes[2])?;
                Some(Self::rgb(r * 17, g * 17, b * 17))
            }
            6 | 8 => {
                let byte = |i: usize| Some(nibble(bytes[i])? * 16 + nibble(bytes[i + 1])?);
                let a = if bytes.len() == 8 { byte(6)? } else { 255 };
                Some(Self::rgba(byte(0)?, byte(2)?, byte(4)?, a))
            }
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Color::from_hex(&s).ok_or_else(|| format!("invalid colour '{}'", s))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> Self {
        c.to_hex()
    }
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// The CSS compositing modes an overlay can be drawn with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Hue,
    Saturation,
    Color,
    Luminosity,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
            BlendMode::Hue,
            BlendMode::Saturation,
            BlendMode::Color,
            BlendMode::Luminosity,
        ]
    }

    /// CSS keyword for this mode.
    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Hue => "hue",
            BlendMode::Saturation => "saturation",
            BlendMode::Color => "color",
            BlendMode::Luminosity => "luminosity",
        }
    }

    pub fn from_name(name: &str) -> Option<BlendMode> {
        Self::all().iter().copied().find(|m| m.name() == name)
    }

    /// B(cb, cs) for one pixel, colours in 0..1.
    fn mix(self, base: [f32; 3], top: [f32; 3]) -> [f32; 3] {
        let sep = |f: fn(f32, f32) -> f32| {
            [f(base[0], top[0]), f(base[1], top[1]), f(base[2], top[2])]
        };
        match self {
            BlendMode::Normal => top,
            BlendMode::Multiply => sep(|b, t| b * t),
            BlendMode::Screen => sep(|b, t| 1.0 - (1.0 - b) * (1.0 - t)),
            BlendMode::Overlay => sep(overlay_channel),
            BlendMode::Darken => sep(f32::min),
            BlendMode::Lighten => sep(f32::max),
            BlendMode::ColorDodge => sep(color_dodge_channel),
            BlendMode::ColorBurn => sep(color_burn_channel),
            BlendMode::HardLight => sep(|b, t| overlay_channel(t, b)),
            BlendMode::SoftLight => sep(soft_light_channel),
            BlendMode::Difference => sep(|b, t| (b - t).abs()),
            BlendMode::Exclusion => sep(|b, t| b + t - 2.0 * b * t),
            BlendMode::Hue => set_lum(set_sat(top, sat(base)), lum(base)),
            BlendMode::Saturation => set_lum(set_sat(base, sat(top)), lum(base)),
            BlendMode::Color => set_lum(top, lum(base)),
            BlendMode::Luminosity => set_lum(base, lum(top)),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Composite `top` over `base` with the given mode and extra opacity.
///
/// Follows the W3C compositing model: the blended colour is weighted by the
/// backdrop alpha, then combined source-over.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);
    let base_a = base[3] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;
    let cb = [
        base[0] as f32 / 255.0,
        base[1] as f32 / 255.0,
        base[2] as f32 / 255.0,
    ];
    let cs = [
        top[0] as f32 / 255.0,
        top[1] as f32 / 255.0,
        top[2] as f32 / 255.0,
    ];

    let mixed = mode.mix(cb, cs);
    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a <= 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let mut out = [0u8; 4];
    for c in 0..3 {
        let src = (1.0 - base_a) * cs[c] + base_a * mixed[c];
        let v = (src * top_a + cb[c] * base_a * (1.0 - top_a)) / out_a;
        out[c] = (v * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    Rgba(out)
}

/// Composite `src` onto `dst` with its top-left corner at (`x`, `y`).
pub fn composite_at(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    x: i64,
    y: i64,
    mode: BlendMode,
    opacity: f32,
) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    let (sw, sh) = (src.width() as i64, src.height() as i64);
    let x0 = x.max(0);
    let x1 = (x + sw).min(dw);
    let y0 = y.max(0);
    let y1 = (y + sh).min(dh);
    if x0 >= x1 || y0 >= y1 {
        return;
    }
    let stride = dw as usize * 4;
    let src_w = src.width();
    let src_raw = src.as_raw();

    dst.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(dy, row)| {
            let sy = (dy as i64 - y) as u32;
            for dx in x0..x1 {
                let sx = (dx - x) as u32;
                let si = ((sy * src_w + sx) * 4) as usize;
                let top = Rgba([src_raw[si], src_raw[si + 1], src_raw[si + 2], src_raw[si + 3]]);
                let di = dx as usize * 4;
                let base = Rgba([row[di], row[di + 1], row[di + 2], row[di + 3]]);
                let out = blend_pixel(base, top, mode, opacity);
                row[di..di + 4].copy_from_slice(&out.0);
            }
        });
}

/// Composite a same-sized layer over `dst`.
pub fn composite_over(dst: &mut RgbaImage, src: &RgbaImage, mode: BlendMode, opacity: f32) {
    composite_at(dst, src, 0, 0, mode, opacity);
}

// ============================================================================
// COVERAGE MASKS
// ============================================================================

/// Anti-aliased coverage (0..1) over a rectangular window of the canvas.
/// Used by everything that paints a shape in a single colour: brush strokes,
/// glyph runs, frame borders.
#[derive(Clone, Debug)]
pub struct CoverageMask {
    pub x: i64,
    pub y: i64,
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl CoverageMask {
    pub fn new(x: i64, y: i64, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    /// Accumulate coverage at canvas position (`cx`, `cy`), keeping the max.
    pub fn add(&mut self, cx: i64, cy: i64, value: f32) {
        let lx = cx - self.x;
        let ly = cy - self.y;
        if lx < 0 || ly < 0 || lx >= self.width as i64 || ly >= self.height as i64 {
            return;
        }
        let idx = ly as usize * self.width as usize + lx as usize;
        if value > self.data[idx] {
            self.data[idx] = value.min(1.0);
        }
    }

    pub fn get(&self, lx: u32, ly: u32) -> f32 {
        self.data[ly as usize * self.width as usize + lx as usize]
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&c| c <= 0.0)
    }

    /// Paint `color` through this mask onto `dst`.
    pub fn paint(&self, dst: &mut RgbaImage, color: Color, mode: BlendMode, opacity: f32) {
        let (dw, dh) = (dst.width() as i64, dst.height() as i64);
        let stride = dw as usize * 4;
        let y0 = self.y.max(0);
        let y1 = (self.y + self.height as i64).min(dh);
        let x0 = self.x.max(0);
        let x1 = (self.x + self.width as i64).min(dw);
        if x0 >= x1 || y0 >= y1 {
            return;
        }
        let top_alpha = color.a as f32 / 255.0;

        dst.as_mut()
            .par_chunks_mut(stride)
            .enumerate()
            .skip(y0 as usize)
            .take((y1 - y0) as usize)
            .for_each(|(py, row)| {
                let ly = (py as i64 - self.y) as u32;
                for px in x0..x1 {
                    let lx = (px - self.x) as u32;
                    let cov = self.get(lx, ly);
                    if cov <= 0.0 {
                        continue;
                    }
                    let a = (top_alpha * cov * 255.0).round().clamp(0.0, 255.0) as u8;
                    let top = Rgba([color.r, color.g, color.b, a]);
                    let i = px as usize * 4;
                    let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                    row[i..i + 4].copy_from_slice(&blend_pixel(base, top, mode, opacity).0);
                }
            });
    }
}

// ============================================================================
// CHANNEL HELPERS
// ============================================================================

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if base >= 1.0 {
        1.0
    } else if top <= 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if base <= 0.0 {
        0.0
    } else if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

fn lum(c: [f32; 3]) -> f32 {
    0.3 * c[0] + 0.59 * c[1] + 0.11 * c[2]
}

fn clip_color(c: [f32; 3]) -> [f32; 3] {
    let l = lum(c);
    let n = c[0].min(c[1]).min(c[2]);
    let x = c[0].max(c[1]).max(c[2]);
    let mut out = c;
    if n < 0.0 {
        for v in out.iter_mut() {
            *v = l + (*v - l) * l / (l - n);
        }
    }
    if x > 1.0 {
        for v in out.iter_mut() {
            *v = l + (*v - l) * (1.0 - l) / (x - l);
        }
    }
    out
}

fn set_lum(c: [f32; 3], l: f32) -> [f32; 3] {
    let d = l - lum(c);
    clip_color([c[0] + d, c[1] + d, c[2] + d])
}

fn sat(c: [f32; 3]) -> f32 {
    c[0].max(c[1]).max(c[2]) - c[0].min(c[1]).min(c[2])
}

fn set_sat(c: [f32; 3], s: f32) -> [f32; 3] {
    let mut idx = [0usize, 1, 2];
    idx.sort_by(|&a, &b| c[a].total_cmp(&c[b]));
    let (lo, mid, hi) = (idx[0], idx[1], idx[2]);
    let mut out = [0.0f32; 3];
    if c[hi] > c[lo] {
        out[mid] = (c[mid] - c[lo]) * s / (c[hi] - c[lo]);
        out[hi] = s;
    }
    out
}
