// ============================================================================
// FOCUS: an effect applied outside a feathered shape, leaving its centre sharp
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ops::filters::gaussian_blur;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusShape {
    #[default]
    Circle,
    Rectangle,
    Hexagon,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusEffectKind {
    #[default]
    Blur,
    Darken,
    Lighten,
    Desaturate,
    Vignette,
}

impl FocusEffectKind {
    pub fn all() -> &'static [FocusEffectKind] {
        &[
            FocusEffectKind::Blur,
            FocusEffectKind::Darken,
            FocusEffectKind::Lighten,
            FocusEffectKind::Desaturate,
            FocusEffectKind::Vignette,
        ]
    }
}

/// Focus region parameters. `size` and `feather` are percentages (of the
/// short side and of the radius), `x`/`y` are the centre in percent of the
/// canvas.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusEffect {
    pub shape: FocusShape,
    pub effect: FocusEffectKind,
    pub intensity: f32,
    pub feather: f32,
    pub size: f32,
    pub x: f32,
    pub y: f32,
}

impl Default for FocusEffect {
    fn default() -> Self {
        Self {
            shape: FocusShape::Circle,
            effect: FocusEffectKind::Blur,
            intensity: 50.0,
            feather: 30.0,
            size: 50.0,
            x: 50.0,
            y: 50.0,
        }
    }
}

/// Centre, outer radius and inner (unfeathered) radius in pixels.
struct Geometry {
    cx: f32,
    cy: f32,
    radius: f32,
    inner: f32,
}

impl FocusEffect {
    fn geometry(&self, w: u32, h: u32) -> Geometry {
        let radius = w.min(h) as f32 * self.size.max(0.0) / 100.0;
        let feather = radius * self.feather.clamp(0.0, 100.0) / 100.0;
        Geometry {
            cx: w as f32 * self.x / 100.0,
            cy: h as f32 * self.y / 100.0,
            radius,
            inner: radius - feather,
        }
    }

    /// Distance from the centre in the shape's own metric; the shape edge
    /// sits where this equals the radius.
    fn distance(&self, dx: f32, dy: f32) -> f32 {
        match self.shape {
            FocusShape::Circle => (dx * dx + dy * dy).sqrt(),
            FocusShape::Rectangle => dx.abs().max(dy.abs()),
            FocusShape::Hexagon => hexagon_distance(dx, dy),
        }
    }

    /// 1.0 where the original is kept, 0.0 where the effect shows.
    pub fn mask_at(&self, w: u32, h: u32, px: f32, py: f32) -> f32 {
        let g = self.geometry(w, h);
        self.mask_value(&g, px, py)
    }

    fn mask_value(&self, g: &Geometry, px: f32, py: f32) -> f32 {
        let d = self.distance(px - g.cx, py - g.cy);
        if d <= g.inner {
            1.0
        } else if d >= g.radius {
            0.0
        } else {
            (g.radius - d) / (g.radius - g.inner)
        }
    }
}

/// Regular hexagon metric: vertices sit at distance 1 on the unit circle, one
/// pointing straight up.
fn hexagon_distance(px: f32, py: f32) -> f32 {
    let angle = std::f32::consts::TAU / 6.0;
    let half = angle * 0.5;
    let theta = py.atan2(px) + std::f32::consts::FRAC_PI_2;
    let theta = ((theta % angle) + angle) % angle - half;
    let len = (px * px + py * py).sqrt();
    len * theta.cos() / half.cos()
}

/// Render `effect` onto `src`: the effect is computed for the whole frame and
/// blended back over the original by the focus mask.
pub fn apply_focus(src: &RgbaImage, effect: &FocusEffect) -> RgbaImage {
    let (w, h) = src.dimensions();
    if w == 0 || h == 0 {
        return src.clone();
    }
    let g = effect.geometry(w, h);
    let strength = (effect.intensity / 100.0).clamp(0.0, 1.0);

    let blurred = match effect.effect {
        FocusEffectKind::Blur => Some(gaussian_blur(src, effect.intensity.max(0.0) / 5.0)),
        _ => None,
    };
    // Vignette falloff runs from the focus edge to the farthest corner.
    let reach = {
        let far_x = g.cx.max(w as f32 - g.cx);
        let far_y = g.cy.max(h as f32 - g.cy);
        (effect.distance(far_x, far_y) - g.radius).max(1.0)
    };

    let stride = w as usize * 4;
    let src_raw = src.as_raw();
    let blur_raw = blurred.as_ref().map(|b| b.as_raw());
    let mut out = vec![0u8; stride * h as usize];

    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let py = y as f32 + 0.5;
        for x in 0..w as usize {
            let i = y * stride + x * 4;
            let px = x as f32 + 0.5;
            let m = effect.mask_value(&g, px, py);
            let orig = [
                src_raw[i] as f32,
                src_raw[i + 1] as f32,
                src_raw[i + 2] as f32,
                src_raw[i + 3] as f32,
            ];

            let fx = match effect.effect {
                FocusEffectKind::Blur => {
                    let b = blur_raw.unwrap_or(src_raw);
                    [b[i] as f32, b[i + 1] as f32, b[i + 2] as f32, b[i + 3] as f32]
                }
                FocusEffectKind::Darken => {
                    let k = 1.0 - strength;
                    [orig[0] * k, orig[1] * k, orig[2] * k, orig[3]]
                }
                FocusEffectKind::Lighten => {
                    let lift = |c: f32| c + (255.0 - c) * strength;
                    [lift(orig[0]), lift(orig[1]), lift(orig[2]), orig[3]]
                }
                FocusEffectKind::Desaturate => {
                    let grey = 0.2126 * orig[0] + 0.7152 * orig[1] + 0.0722 * orig[2];
                    let mix = |c: f32| c + (grey - c) * strength;
                    [mix(orig[0]), mix(orig[1]), mix(orig[2]), orig[3]]
                }
                FocusEffectKind::Vignette => {
                    let d = effect.distance(px - g.cx, py - g.cy);
                    let t = ((d - g.radius) / reach).clamp(0.0, 1.0);
                    let k = 1.0 - strength * t * t * (3.0 - 2.0 * t);
                    [orig[0] * k, orig[1] * k, orig[2] * k, orig[3]]
                }
            };

            for c in 0..4 {
                let v = fx[c] + (orig[c] - fx[c]) * m;
                row[x * 4 + c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    RgbaImage::from_raw(w, h, out).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([255, 255, 255, 255])
            } else {
                Rgba([0, 0, 0, 255])
            }
        })
    }

    #[test]
    fn centre_is_untouched_and_outside_is_blurred() {
        let img = checker(100, 100);
        let out = apply_focus(&img, &FocusEffect::default());
        // radius 50, feather 15 -> inner radius 35
        assert_eq!(out.get_pixel(50, 50), img.get_pixel(50, 50));
        assert_eq!(out.get_pixel(45, 52), img.get_pixel(45, 52));
        let corner = out.get_pixel(2, 3);
        assert!(corner[0] > 60 && corner[0] < 200, "corner {:?}", corner);
    }

    #[test]
    fn mask_ramps_through_feather() {
        let fx = FocusEffect::default();
        assert_eq!(fx.mask_at(100, 100, 50.0, 50.0), 1.0);
        assert_eq!(fx.mask_at(100, 100, 50.0, 0.0), 0.0);
        let mid = fx.mask_at(100, 100, 50.0 + 42.5, 50.0);
        assert!((mid - 0.5).abs() < 1e-4);
    }

    #[test]
    fn rectangle_uses_square_distance() {
        let fx = FocusEffect {
            shape: FocusShape::Rectangle,
            feather: 0.0,
            ..Default::default()
        };
        // Diagonal point inside the square but outside the inscribed circle.
        assert_eq!(fx.mask_at(100, 100, 90.0, 90.0), 1.0);
        let circle = FocusEffect { feather: 0.0, ..Default::default() };
        assert_eq!(circle.mask_at(100, 100, 90.0, 90.0), 0.0);
    }

    #[test]
    fn hexagon_vertex_and_edge() {
        // Vertex straight up, edge midpoint 60 degrees round from it.
        assert!((hexagon_distance(0.0, -1.0) - 1.0).abs() < 1e-4);
        let apothem = (std::f32::consts::PI / 6.0).cos();
        let a = -std::f32::consts::PI / 3.0;
        assert!((hexagon_distance(apothem * a.cos(), apothem * a.sin()) - 1.0).abs() < 1e-4);
        assert!((hexagon_distance(0.0, -0.5) - 0.5).abs() < 1e-4);
    }

    #[test]
    fn darken_and_desaturate_only_outside() {
        let img = RgbaImage::from_pixel(60, 60, Rgba([200, 100, 50, 255]));
        let dark = FocusEffect {
            effect: FocusEffectKind::Darken,
            intensity: 50.0,
            feather: 0.0,
            size: 20.0,
            ..Default::default()
        };
        let out = apply_focus(&img, &dark);
        assert_eq!(out.get_pixel(30, 30).0, [200, 100, 50, 255]);
        assert_eq!(out.get_pixel(0, 0).0, [100, 50, 25, 255]);

        let grey = FocusEffect {
            effect: FocusEffectKind::Desaturate,
            intensity: 100.0,
            ..dark
        };
        let p = apply_focus(&img, &grey).get_pixel(0, 0).0;
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
    }

    #[test]
    fn lighten_moves_towards_white() {
        let img = RgbaImage::from_pixel(40, 40, Rgba([0, 100, 200, 255]));
        let fx = FocusEffect {
            effect: FocusEffectKind::Lighten,
            intensity: 100.0,
            size: 10.0,
            feather: 0.0,
            ..Default::default()
        };
        assert_eq!(apply_focus(&img, &fx).get_pixel(0, 0).0, [255, 255, 255, 255]);
    }

    #[test]
    fn vignette_darkens_corners_more_than_edges() {
        let img = RgbaImage::from_pixel(80, 80, Rgba([200, 200, 200, 255]));
        let fx = FocusEffect {
            effect: FocusEffectKind::Vignette,
            intensity: 100.0,
            size: 20.0,
            feather: 0.0,
            ..Default::default()
        };
        let out = apply_focus(&img, &fx);
        assert_eq!(out.get_pixel(40, 40)[0], 200);
        assert!(out.get_pixel(0, 0)[0] < out.get_pixel(40, 10)[0]);
    }
}
