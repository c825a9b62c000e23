// ============================================================================
// OVERLAYS: full-canvas colour, gradient, texture and weather layers
// ============================================================================
//
// Each overlay renders into its own straight-alpha layer the size of the
// canvas, which is then composited with the overlay's blend mode and opacity.
// Overlays composite in insertion order.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{composite_over, BlendMode, Color};
use crate::ops::noise::{fbm, hash_f32, hash_u32};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextureKind {
    #[default]
    Grain,
    Paper,
    Canvas,
    Concrete,
    Wood,
    Metal,
}

/// Strength and feature size of a procedural overlay, both in percent.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Procedural {
    pub intensity: f32,
    pub scale: f32,
}

impl Default for Procedural {
    fn default() -> Self {
        Self {
            intensity: 50.0,
            scale: 100.0,
        }
    }
}

impl Procedural {
    fn density(&self) -> f32 {
        (self.intensity / 100.0).clamp(0.0, 1.0)
    }

    fn size(&self, base: f32) -> f32 {
        (base * self.scale / 100.0).max(1.0)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverlayKind {
    Color { color: Color },
    /// `angle` in CSS degrees (0 = towards the top, 90 = towards the right).
    /// Without an angle the gradient runs from the top-left to the
    /// bottom-right corner.
    Gradient {
        start: Color,
        end: Color,
        angle: Option<f32>,
    },
    Texture { texture: TextureKind },
    Light(Procedural),
    Dust(Procedural),
    Rain(Procedural),
    Snow(Procedural),
    Fog(Procedural),
    Bokeh(Procedural),
}

impl OverlayKind {
    /// The overlay panel's type names.
    pub fn type_names() -> &'static [&'static str] {
        &[
            "color", "gradient", "texture", "light", "dust", "rain", "snow", "fog", "bokeh",
        ]
    }

    /// Build an overlay of the named type with the panel's default settings.
    pub fn with_defaults(type_name: &str) -> Option<OverlayKind> {
        let orange = Color::rgb(0xff, 0x55, 0x00);
        let p = Procedural::default();
        Some(match type_name {
            "color" => OverlayKind::Color { color: orange },
            "gradient" => OverlayKind::Gradient {
                start: orange,
                end: Color::rgb(0x00, 0x55, 0xff),
                angle: Some(45.0),
            },
            "texture" => OverlayKind::Texture {
                texture: TextureKind::Grain,
            },
            "light" => OverlayKind::Light(p),
            "dust" => OverlayKind::Dust(p),
            "rain" => OverlayKind::Rain(p),
            "snow" => OverlayKind::Snow(p),
            "fog" => OverlayKind::Fog(p),
            "bokeh" => OverlayKind::Bokeh(p),
            _ => return None,
        })
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            OverlayKind::Color { .. } => "color",
            OverlayKind::Gradient { .. } => "gradient",
            OverlayKind::Texture { .. } => "texture",
            OverlayKind::Light(_) => "light",
            OverlayKind::Dust(_) => "dust",
            OverlayKind::Rain(_) => "rain",
            OverlayKind::Snow(_) => "snow",
            OverlayKind::Fog(_) => "fog",
            OverlayKind::Bokeh(_) => "bokeh",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Overlay {
    pub id: Uuid,
    pub kind: OverlayKind,
    pub blend_mode: BlendMode,
    /// 0..100
    pub opacity: f32,
}

impl Overlay {
    pub fn new(kind: OverlayKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            blend_mode: BlendMode::Normal,
            opacity: 50.0,
        }
    }

    pub fn with_blend(mut self, mode: BlendMode, opacity: f32) -> Self {
        self.blend_mode = mode;
        self.opacity = opacity.clamp(0.0, 100.0);
        self
    }

    fn seed(&self) -> u32 {
        let v = self.id.as_u128();
        hash_u32((v as u32) ^ ((v >> 64) as u32))
    }

    /// Render this overlay's own layer at canvas size, before blending.
    pub fn render_layer(&self, width: u32, height: u32) -> RgbaImage {
        let seed = self.seed();
        match &self.kind {
            OverlayKind::Color { color } => RgbaImage::from_pixel(width, height, color.to_rgba()),
            OverlayKind::Gradient { start, end, angle } => {
                linear_gradient(width, height, *start, *end, *angle)
            }
            OverlayKind::Texture { .. } => dot_texture(width, height),
            OverlayKind::Light(p) => light_leak(width, height, p, seed),
            OverlayKind::Dust(p) => dust(width, height, p, seed),
            OverlayKind::Rain(p) => rain(width, height, p, seed),
            OverlayKind::Snow(p) => snow(width, height, p, seed),
            OverlayKind::Fog(p) => fog(width, height, p, seed),
            OverlayKind::Bokeh(p) => bokeh(width, height, p, seed),
        }
    }
}

/// Composite every overlay onto `dst`, in order.
pub fn composite_overlays(dst: &mut RgbaImage, overlays: &[Overlay]) {
    let (w, h) = dst.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    for overlay in overlays {
        if overlay.opacity <= 0.0 {
            continue;
        }
        let layer = overlay.render_layer(w, h);
        composite_over(dst, &layer, overlay.blend_mode, overlay.opacity / 100.0);
    }
}

// ---------------------------------------------------------------------------
// Layer renderers
// ---------------------------------------------------------------------------

fn render_per_pixel<F>(width: u32, height: u32, shade: F) -> RgbaImage
where
    F: Fn(u32, u32) -> Rgba<u8> + Sync,
{
    let stride = width as usize * 4;
    let mut raw = vec![0u8; stride * height as usize];
    if stride > 0 {
        raw.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
            for x in 0..width as usize {
                let px = shade(x as u32, y as u32);
                row[x * 4..x * 4 + 4].copy_from_slice(&px.0);
            }
        });
    }
    RgbaImage::from_raw(width, height, raw).unwrap()
}

fn lerp_color(a: Color, b: Color, t: f32) -> Rgba<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |p: u8, q: u8| (p as f32 + (q as f32 - p as f32) * t).round() as u8;
    Rgba([mix(a.r, b.r), mix(a.g, b.g), mix(a.b, b.b), mix(a.a, b.a)])
}

fn with_alpha(rgb: [u8; 3], alpha: f32) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], (alpha.clamp(0.0, 1.0) * 255.0).round() as u8])
}

pub fn linear_gradient(width: u32, height: u32, start: Color, end: Color, angle: Option<f32>) -> RgbaImage {
    let w = width as f32;
    let h = height as f32;
    match angle {
        None => {
            let len_sq = (w * w + h * h).max(f32::EPSILON);
            render_per_pixel(width, height, |x, y| {
                let px = x as f32 + 0.5;
                let py = y as f32 + 0.5;
                lerp_color(start, end, (px * w + py * h) / len_sq)
            })
        }
        Some(deg) => {
            let (sin, cos) = deg.to_radians().sin_cos();
            let (dx, dy) = (sin, -cos);
            let half = ((w / 2.0) * sin.abs() + (h / 2.0) * cos.abs()).max(f32::EPSILON);
            render_per_pixel(width, height, |x, y| {
                let px = x as f32 + 0.5 - w / 2.0;
                let py = y as f32 + 0.5 - h / 2.0;
                let t = (px * dx + py * dy) / (2.0 * half) + 0.5;
                lerp_color(start, end, t)
            })
        }
    }
}

/// Placeholder texture: 2×2 grey dots on a 10px lattice, every other diagonal.
pub fn dot_texture(width: u32, height: u32) -> RgbaImage {
    let dot = Color::rgb(0x88, 0x88, 0x88).to_rgba();
    render_per_pixel(width, height, |x, y| {
        let cell_x = x - x % 10;
        let cell_y = y - y % 10;
        if x % 10 < 2 && y % 10 < 2 && (cell_x + cell_y) % 20 == 0 {
            dot
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

fn rain(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let spacing = p.size(6.0);
    let length = p.size(28.0);
    let density = p.density();
    let period = height as f32 * 0.5 + length;
    render_per_pixel(width, height, |x, y| {
        let yf = y as f32;
        // Streaks lean to the right going down.
        let u = x as f32 - yf * 0.25;
        let col = (u / spacing).floor() as i32;
        if hash_f32(col, 0, seed) >= density {
            return Rgba([0, 0, 0, 0]);
        }
        let offset = (u / spacing).fract().abs();
        if !(0.4..0.6).contains(&offset) {
            return Rgba([0, 0, 0, 0]);
        }
        let phase = hash_f32(col, 1, seed) * period;
        let along = (yf + phase).rem_euclid(period);
        if along > length {
            return Rgba([0, 0, 0, 0]);
        }
        with_alpha([200, 215, 235], 0.7 * (1.0 - along / length))
    })
}

fn snow(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let cell = p.size(22.0);
    let density = p.density();
    render_per_pixel(width, height, |x, y| {
        let cx = (x as f32 / cell).floor() as i32;
        let cy = (y as f32 / cell).floor() as i32;
        if hash_f32(cx, cy, seed) >= density {
            return Rgba([0, 0, 0, 0]);
        }
        let fx = (cx as f32 + 0.2 + 0.6 * hash_f32(cx, cy, seed ^ 0x51)) * cell;
        let fy = (cy as f32 + 0.2 + 0.6 * hash_f32(cx, cy, seed ^ 0xA3)) * cell;
        let radius = (cell * 0.05) + cell * 0.1 * hash_f32(cx, cy, seed ^ 0x77);
        let d = ((x as f32 + 0.5 - fx).powi(2) + (y as f32 + 0.5 - fy).powi(2)).sqrt();
        let a = (radius + 0.5 - d).clamp(0.0, 1.0);
        if a <= 0.0 {
            Rgba([0, 0, 0, 0])
        } else {
            with_alpha([255, 255, 255], a * 0.9)
        }
    })
}

fn fog(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let feature = p.size(140.0);
    let density = p.density();
    render_per_pixel(width, height, |x, y| {
        let n = fbm(x as f32 / feature, y as f32 / feature, seed, 4);
        // Thicker towards the bottom of the frame.
        let rise = 0.6 + 0.4 * (y as f32 / height.max(1) as f32);
        with_alpha([225, 228, 232], n * density * rise)
    })
}

fn bokeh(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let cell = p.size(90.0);
    let density = p.density() * 0.8;
    render_per_pixel(width, height, |x, y| {
        let cx = (x as f32 / cell).floor() as i32;
        let cy = (y as f32 / cell).floor() as i32;
        let mut best = Rgba([0, 0, 0, 0]);
        // Discs may spill into neighbouring cells.
        for oy in -1..=1 {
            for ox in -1..=1 {
                let gx = cx + ox;
                let gy = cy + oy;
                if hash_f32(gx, gy, seed) >= density {
                    continue;
                }
                let px = (gx as f32 + hash_f32(gx, gy, seed ^ 0x1F)) * cell;
                let py = (gy as f32 + hash_f32(gx, gy, seed ^ 0x2E)) * cell;
                let radius = cell * (0.15 + 0.3 * hash_f32(gx, gy, seed ^ 0x3D));
                let d = ((x as f32 + 0.5 - px).powi(2) + (y as f32 + 0.5 - py).powi(2)).sqrt();
                let edge = (radius - d).clamp(0.0, 2.0) / 2.0;
                if edge <= 0.0 {
                    continue;
                }
                let warm = hash_f32(gx, gy, seed ^ 0x4C);
                let rgb = [255, (190.0 + 50.0 * warm) as u8, (120.0 + 110.0 * (1.0 - warm)) as u8];
                let a = ((edge * 0.45 * 255.0).round() as u8).max(best[3]);
                if a > best[3] {
                    best = Rgba([rgb[0], rgb[1], rgb[2], a]);
                }
            }
        }
        best
    })
}

fn dust(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let chance = p.density() * 0.004 / (p.scale / 100.0).max(0.1);
    render_per_pixel(width, height, |x, y| {
        let h = hash_f32(x as i32, y as i32, seed);
        if h >= chance {
            return Rgba([0, 0, 0, 0]);
        }
        // Mix of bright and dark specks.
        if hash_f32(x as i32, y as i32, seed ^ 0x99) < 0.5 {
            with_alpha([250, 248, 240], 0.8)
        } else {
            with_alpha([30, 26, 22], 0.6)
        }
    })
}

fn light_leak(width: u32, height: u32, p: &Procedural, seed: u32) -> RgbaImage {
    let w = width as f32;
    let h = height as f32;
    // Leak enters from one of the four corners.
    let corner = hash_u32(seed) % 4;
    let (ox, oy) = match corner {
        0 => (0.0, 0.0),
        1 => (w, 0.0),
        2 => (0.0, h),
        _ => (w, h),
    };
    let reach = (w.max(h) * p.scale / 100.0).max(1.0);
    let strength = p.density();
    render_per_pixel(width, height, |x, y| {
        let d = ((x as f32 + 0.5 - ox).powi(2) + (y as f32 + 0.5 - oy).powi(2)).sqrt() / reach;
        if d >= 1.0 {
            return Rgba([0, 0, 0, 0]);
        }
        let falloff = (1.0 - d).powi(2);
        let rgb = [255, (120.0 + 100.0 * d) as u8, (40.0 + 60.0 * d) as u8];
        with_alpha(rgb, falloff * strength)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grey(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([128, 128, 128, 255]))
    }

    #[test]
    fn color_overlay_respects_opacity() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let overlay = Overlay::new(OverlayKind::Color { color: Color::WHITE }).with_blend(BlendMode::Normal, 50.0);
        composite_overlays(&mut img, &[overlay]);
        assert_eq!(img.get_pixel(2, 2).0, [128, 128, 128, 255]);
    }

    #[test]
    fn overlays_apply_in_insertion_order() {
        let red = Overlay::new(OverlayKind::Color { color: Color::rgb(255, 0, 0) }).with_blend(BlendMode::Normal, 100.0);
        let blue = Overlay::new(OverlayKind::Color { color: Color::rgb(0, 0, 255) }).with_blend(BlendMode::Normal, 100.0);

        let mut a = grey(2, 2);
        composite_overlays(&mut a, &[red.clone(), blue.clone()]);
        assert_eq!(a.get_pixel(0, 0).0, [0, 0, 255, 255]);

        let mut b = grey(2, 2);
        composite_overlays(&mut b, &[blue, red]);
        assert_eq!(b.get_pixel(0, 0).0, [255, 0, 0, 255]);
    }

    #[test]
    fn corner_gradient_runs_diagonally() {
        let img = linear_gradient(100, 100, Color::BLACK, Color::WHITE, None);
        assert!(img.get_pixel(0, 0)[0] < 5);
        assert!(img.get_pixel(99, 99)[0] > 250);
        let mid = img.get_pixel(50, 49)[0] as i32;
        assert!((mid - 128).abs() <= 3);
    }

    #[test]
    fn angled_gradient_follows_css_direction() {
        let right = linear_gradient(50, 10, Color::BLACK, Color::WHITE, Some(90.0));
        assert!(right.get_pixel(0, 5)[0] < 10);
        assert!(right.get_pixel(49, 5)[0] > 245);
        assert_eq!(right.get_pixel(10, 0), right.get_pixel(10, 9));

        let down = linear_gradient(10, 50, Color::BLACK, Color::WHITE, Some(180.0));
        assert!(down.get_pixel(5, 0)[0] < 10);
        assert!(down.get_pixel(5, 49)[0] > 245);
    }

    #[test]
    fn texture_dots_land_on_even_diagonals() {
        let tex = dot_texture(40, 40);
        assert_eq!(tex.get_pixel(0, 0).0, [0x88, 0x88, 0x88, 255]);
        assert_eq!(tex.get_pixel(11, 11).0, [0x88, 0x88, 0x88, 255]);
        assert_eq!(tex.get_pixel(10, 0)[3], 0);
        assert_eq!(tex.get_pixel(2, 2)[3], 0);
    }

    #[test]
    fn procedural_layers_are_stable_and_scale_with_intensity() {
        for name in ["rain", "snow", "fog", "bokeh", "dust", "light"] {
            let kind = OverlayKind::with_defaults(name).expect("known type");
            let overlay = Overlay::new(kind.clone());
            let a = overlay.render_layer(120, 90);
            assert_eq!(a, overlay.render_layer(120, 90), "{} not deterministic", name);

            let silent = match kind {
                OverlayKind::Light(_) => OverlayKind::Light(Procedural { intensity: 0.0, scale: 100.0 }),
                OverlayKind::Dust(_) => OverlayKind::Dust(Procedural { intensity: 0.0, scale: 100.0 }),
                OverlayKind::Rain(_) => OverlayKind::Rain(Procedural { intensity: 0.0, scale: 100.0 }),
                OverlayKind::Snow(_) => OverlayKind::Snow(Procedural { intensity: 0.0, scale: 100.0 }),
                OverlayKind::Fog(_) => OverlayKind::Fog(Procedural { intensity: 0.0, scale: 100.0 }),
                OverlayKind::Bokeh(_) => OverlayKind::Bokeh(Procedural { intensity: 0.0, scale: 100.0 }),
                other => other,
            };
            let blank = Overlay { kind: silent, ..overlay }.render_layer(120, 90);
            assert!(blank.pixels().all(|p| p[3] == 0), "{} drew at zero intensity", name);
        }
    }

    #[test]
    fn every_type_name_has_defaults() {
        for name in OverlayKind::type_names() {
            let kind = OverlayKind::with_defaults(name).expect("defaults");
            assert_eq!(kind.type_name(), *name);
        }
        assert!(OverlayKind::with_defaults("plasma").is_none());
    }
}
