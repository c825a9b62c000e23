// ============================================================================
// ADJUSTMENTS: the global correction sliders, applied as one combined pass
// ============================================================================

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use crate::ops::filters::{apply_css_chain, gaussian_blur, map_pixels, sharpen, CssFilter};

/// Slider values of the adjust panel.
///
/// Brightness, contrast and saturation are percentages where 100 is the
/// identity. Temperature is a signed bias, blur and sharpen are slider units
/// (tenths of a pixel / tenths of kernel strength), vibrance is 0..100.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Adjustments {
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    pub temperature: f32,
    pub blur: f32,
    pub sharpen: f32,
    pub vibrance: f32,
}

impl Default for Adjustments {
    fn default() -> Self {
        Self {
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            temperature: 0.0,
            blur: 0.0,
            sharpen: 0.0,
            vibrance: 0.0,
        }
    }
}

impl Adjustments {
    pub fn is_identity(&self) -> bool {
        *self == Self::default()
    }

    fn has_color_curve(&self) -> bool {
        self.brightness != 100.0 || self.contrast != 100.0 || self.saturation != 100.0
    }
}

/// Apply every adjustment to `src`, in panel order: brightness / contrast /
/// saturation, temperature, vibrance, blur, sharpen.
pub fn apply_adjustments(src: &RgbaImage, adj: &Adjustments) -> RgbaImage {
    if adj.is_identity() {
        return src.clone();
    }

    let mut out = if adj.has_color_curve() {
        apply_css_chain(
            src,
            &[
                CssFilter::Brightness(adj.brightness.max(0.0) / 100.0),
                CssFilter::Contrast(adj.contrast.max(0.0) / 100.0),
                CssFilter::Saturate(adj.saturation.max(0.0) / 100.0),
            ],
        )
    } else {
        src.clone()
    };

    if adj.temperature != 0.0 {
        let shift = adj.temperature * 0.5;
        out = map_pixels(&out, |r, g, b, a| (r + shift, g, b - shift, a));
    }

    if adj.vibrance != 0.0 {
        let strength = adj.vibrance / 100.0;
        out = map_pixels(&out, |r, g, b, a| {
            let avg = (r + g + b) / 3.0;
            let max = r.max(g).max(b);
            let amt = (max - avg) * strength;
            let lift = |c: f32| if c != max { c + amt } else { c };
            (lift(r), lift(g), lift(b), a)
        });
    }

    if adj.blur > 0.0 {
        out = gaussian_blur(&out, adj.blur / 10.0);
    }
    if adj.sharpen > 0.0 {
        out = sharpen(&out, adj.sharpen / 10.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(px: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(3, 3, Rgba(px))
    }

    fn noisy() -> RgbaImage {
        RgbaImage::from_fn(9, 7, |x, y| {
            Rgba([(x * 29 + y * 7) as u8, (y * 31) as u8, (x * y * 13 % 256) as u8, (255 - x * 3) as u8])
        })
    }

    #[test]
    fn identity_is_pixel_exact() {
        let img = noisy();
        assert_eq!(apply_adjustments(&img, &Adjustments::default()), img);
    }

    #[test]
    fn temperature_biases_red_and_blue() {
        let adj = Adjustments { temperature: 40.0, ..Default::default() };
        let out = apply_adjustments(&solid([100, 100, 100, 255]), &adj);
        assert_eq!(out.get_pixel(1, 1).0, [120, 100, 80, 255]);

        let adj = Adjustments { temperature: -100.0, ..Default::default() };
        let out = apply_adjustments(&solid([20, 100, 230, 255]), &adj);
        assert_eq!(out.get_pixel(1, 1).0, [0, 100, 255, 255]);
    }

    #[test]
    fn vibrance_lifts_weaker_channels() {
        let adj = Adjustments { vibrance: 50.0, ..Default::default() };
        let out = apply_adjustments(&solid([200, 100, 100, 255]), &adj);
        assert_eq!(out.get_pixel(0, 0).0, [200, 133, 133, 255]);
    }

    #[test]
    fn brightness_doubles_and_saturation_zero_greys() {
        let adj = Adjustments { brightness: 200.0, ..Default::default() };
        let out = apply_adjustments(&solid([100, 50, 0, 255]), &adj);
        assert_eq!(out.get_pixel(0, 0).0, [200, 100, 0, 255]);

        let adj = Adjustments { saturation: 0.0, ..Default::default() };
        let out = apply_adjustments(&solid([255, 0, 0, 255]), &adj);
        let p = out.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[0], 54);
    }

    #[test]
    fn adjustments_do_not_accumulate() {
        let img = solid([100, 100, 100, 255]);
        let adj = Adjustments { brightness: 150.0, ..Default::default() };
        let once = apply_adjustments(&img, &adj);
        let again = apply_adjustments(&img, &adj);
        assert_eq!(once, again);
        assert_eq!(once.get_pixel(0, 0)[0], 150);
    }
}
