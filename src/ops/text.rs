use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use ab_glyph::{point, Font, FontArc, GlyphId, OutlinedGlyph, ScaleFont};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::canvas::{BlendMode, Color, CoverageMask};
use crate::log_warn;

/// Stickers are always drawn from a 30px run before their own scale.
pub const STICKER_FONT_SIZE: f32 = 30.0;
/// Slack around a text's box when testing whether the pointer grabbed it.
pub const HIT_PAD: f32 = 10.0;
/// Text box height as a multiple of the font size.
const LINE_HEIGHT_FACTOR: f32 = 1.2;
/// Advance per character when no face is available.
const ESTIMATED_ADVANCE: f32 = 0.6;
/// Horizontal shear for synthetic italics.
const ITALIC_SHEAR: f32 = 0.2;
/// Faces tried for characters the requested face does not cover (emoji,
/// symbols).
const FALLBACK_FAMILIES: &[&str] = &[
    "Noto Emoji",
    "Segoe UI Emoji",
    "Segoe UI Symbol",
    "Symbola",
    "DejaVu Sans",
];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

impl TextAlign {
    /// Offset from the anchor to the left edge of a run `width` wide.
    pub fn offset(self, width: f32) -> f32 {
        match self {
            TextAlign::Left => 0.0,
            TextAlign::Center => -width * 0.5,
            TextAlign::Right => -width,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_size: f32,
    pub font_family: String,
    pub color: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub align: TextAlign,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_size: 24.0,
            font_family: "Arial".to_string(),
            color: Color::WHITE,
            bold: false,
            italic: false,
            underline: false,
            align: TextAlign::Left,
        }
    }
}

impl TextStyle {
    /// CSS font shorthand, e.g. `bold italic 24px Arial`.
    pub fn font_string(&self) -> String {
        format!(
            "{}{}{}px {}",
            if self.bold { "bold " } else { "" },
            if self.italic { "italic " } else { "" },
            self.font_size,
            self.font_family
        )
    }
}

/// A run of text anchored at (`x`, `y`); `y` is the alphabetic baseline and
/// `x` is interpreted through the style's alignment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    pub id: Uuid,
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub style: TextStyle,
}

impl TextOverlay {
    pub fn new(text: impl Into<String>, x: f32, y: f32, style: TextStyle) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            x,
            y,
            style,
        }
    }

    /// Box used for pointer hit testing, padded by [`HIT_PAD`].
    pub fn hit_box(&self, fonts: &FontBook) -> HitBox {
        let width = fonts.measure(&self.text, &self.style);
        let size = self.style.font_size;
        let left = self.x + self.style.align.offset(width);
        let top = self.y - size;
        HitBox {
            left: left - HIT_PAD,
            top: top - HIT_PAD,
            right: left + width + HIT_PAD,
            bottom: top + size * LINE_HEIGHT_FACTOR + HIT_PAD,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HitBox {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl HitBox {
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.left && x <= self.right && y >= self.top && y <= self.bottom
    }
}

/// A glyph or short token stamped at (`x`, `y`) with its own rotation
/// (degrees, clockwise) and uniform scale.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sticker {
    pub id: Uuid,
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub scale: f32,
    pub rotation: f32,
}

impl Sticker {
    pub fn new(content: impl Into<String>, x: f32, y: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: content.into(),
            x,
            y,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

/// Index of the top-most text whose hit box contains the point. Later texts
/// draw on top, so they are tested first.
pub fn hit_test_texts(texts: &[TextOverlay], x: f32, y: f32, fonts: &FontBook) -> Option<usize> {
    texts
        .iter()
        .enumerate()
        .rev()
        .find(|(_, t)| t.hit_box(fonts).contains(x, y))
        .map(|(i, _)| i)
}

// ============================================================================
// FONT BOOK
// ============================================================================

#[derive(Clone)]
struct Face {
    font: FontArc,
    synthetic_bold: bool,
    synthetic_italic: bool,
}

type FaceKey = (String, bool, bool);

/// Resolves CSS-style family names to system faces and caches the result.
pub struct FontBook {
    use_system: bool,
    faces: Mutex<HashMap<FaceKey, Option<Face>>>,
    fallbacks: OnceLock<Vec<FontArc>>,
}

impl Default for FontBook {
    fn default() -> Self {
        Self::system()
    }
}

impl FontBook {
    pub fn system() -> Self {
        Self {
            use_system: true,
            faces: Mutex::new(HashMap::new()),
            fallbacks: OnceLock::new(),
        }
    }

    /// A font book that never looks at installed fonts. Text is measured
    /// with an average advance and glyphs are not drawn; underlines still
    /// are. Used for headless tests.
    pub fn offline() -> Self {
        Self {
            use_system: false,
            faces: Mutex::new(HashMap::new()),
            fallbacks: OnceLock::new(),
        }
    }

    fn face(&self, family: &str, bold: bool, italic: bool) -> Option<Face> {
        if !self.use_system {
            return None;
        }
        let key = (family.to_lowercase(), bold, italic);
        let mut faces = self.faces.lock().unwrap_or_else(|e| e.into_inner());
        faces
            .entry(key)
            .or_insert_with(|| {
                let face = load_system_face(family, bold, italic);
                if face.is_none() {
                    log_warn!("No usable font for '{}' (bold={}, italic={})", family, bold, italic);
                }
                face
            })
            .clone()
    }

    fn fallback_fonts(&self) -> &[FontArc] {
        self.fallbacks.get_or_init(|| {
            if !self.use_system {
                return Vec::new();
            }
            FALLBACK_FAMILIES
                .iter()
                .filter_map(|family| load_system_face(family, false, false))
                .map(|f| f.font)
                .collect()
        })
    }

    /// Shape a single line. `None` when no face could be loaded.
    fn layout(&self, text: &str, size: f32, family: &str, bold: bool, italic: bool) -> Option<(TextLayout, Face)> {
        let face = self.face(family, bold, italic)?;
        let mut fonts = vec![face.font.clone()];
        fonts.extend(self.fallback_fonts().iter().cloned());

        let scaled = face.font.as_scaled(size);
        let mut glyphs = Vec::new();
        let mut cursor = 0.0f32;
        let mut prev: Option<(usize, GlyphId)> = None;

        for ch in text.chars() {
            let (fi, id) = pick_glyph(&fonts, ch);
            let run = fonts[fi].as_scaled(size);
            if let Some((pfi, pid)) = prev
                && pfi == fi
            {
                cursor += run.kern(pid, id);
            }
            glyphs.push((fi, id, cursor));
            cursor += run.h_advance(id);
            prev = Some((fi, id));
        }

        Some((
            TextLayout {
                fonts,
                glyphs,
                size,
                width: cursor,
                ascent: scaled.ascent(),
                descent: scaled.descent(),
            },
            face,
        ))
    }

    /// Advance width of `text` in pixels.
    pub fn measure(&self, text: &str, style: &TextStyle) -> f32 {
        match self.layout(text, style.font_size, &style.font_family, style.bold, style.italic) {
            Some((layout, _)) => layout.width,
            None => estimate_width(text, style.font_size),
        }
    }
}

fn estimate_width(text: &str, size: f32) -> f32 {
    text.chars().count() as f32 * size * ESTIMATED_ADVANCE
}

fn pick_glyph(fonts: &[FontArc], ch: char) -> (usize, GlyphId) {
    let primary = fonts[0].glyph_id(ch);
    if primary.0 != 0 || ch.is_whitespace() {
        return (0, primary);
    }
    fonts
        .iter()
        .enumerate()
        .skip(1)
        .map(|(i, f)| (i, f.glyph_id(ch)))
        .find(|(_, id)| id.0 != 0)
        .unwrap_or((0, primary))
}

/// Sorted list of installed font families.
pub fn system_families() -> Vec<String> {
    match font_kit::source::SystemSource::new().all_families() {
        Ok(mut families) => {
            families.sort();
            families.dedup();
            families
        }
        Err(_) => Vec::new(),
    }
}

fn load_system_face(family: &str, bold: bool, italic: bool) -> Option<Face> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let requested = match family.trim().to_lowercase().as_str() {
        "serif" => FamilyName::Serif,
        "sans-serif" => FamilyName::SansSerif,
        "monospace" => FamilyName::Monospace,
        "cursive" => FamilyName::Cursive,
        "fantasy" => FamilyName::Fantasy,
        _ => FamilyName::Title(family.trim().to_string()),
    };

    let mut props = Properties::new();
    if bold {
        props.weight = Weight::BOLD;
    }
    if italic {
        props.style = Style::Italic;
    }

    let handle = SystemSource::new()
        .select_best_match(&[requested, FamilyName::SansSerif], &props)
        .ok()?;
    let loaded = handle.load().ok()?;
    let actual = loaded.properties();
    let data = loaded.copy_font_data()?;
    let font = FontArc::try_from_vec((*data).clone()).ok()?;

    Some(Face {
        font,
        synthetic_bold: bold && actual.weight.0 < 600.0,
        synthetic_italic: italic && actual.style == Style::Normal,
    })
}

// ============================================================================
// LAYOUT + RASTERIZATION
// ============================================================================

struct TextLayout {
    fonts: Vec<FontArc>,
    /// (font index, glyph, x offset from the run start)
    glyphs: Vec<(usize, GlyphId, f32)>,
    size: f32,
    width: f32,
    ascent: f32,
    descent: f32,
}

/// Ink for one run: outlined glyphs plus solid rectangles (underlines).
struct Ink {
    glyphs: Vec<OutlinedGlyph>,
    rects: Vec<(f32, f32, f32, f32)>,
    bold: bool,
    shear: Option<f32>,
}

impl Ink {
    fn lay_glyphs(layout: &TextLayout, left: f32, baseline: f32, face: &Face) -> Self {
        let glyphs = layout
            .glyphs
            .iter()
            .filter_map(|&(fi, id, gx)| {
                let glyph = id.with_scale_and_position(layout.size, point(left + gx, baseline));
                layout.fonts[fi].outline_glyph(glyph)
            })
            .collect();
        Self {
            glyphs,
            rects: Vec::new(),
            bold: face.synthetic_bold,
            shear: face.synthetic_italic.then_some(baseline),
        }
    }

    fn empty() -> Self {
        Self {
            glyphs: Vec::new(),
            rects: Vec::new(),
            bold: false,
            shear: None,
        }
    }

    /// Bounds of everything this ink will touch, or `None` when blank.
    fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let mut b: Option<(f32, f32, f32, f32)> = None;
        let mut grow = |x0: f32, y0: f32, x1: f32, y1: f32| {
            b = Some(match b {
                None => (x0, y0, x1, y1),
                Some((a0, b0, a1, b1)) => (a0.min(x0), b0.min(y0), a1.max(x1), b1.max(y1)),
            });
        };
        for g in &self.glyphs {
            let r = g.px_bounds();
            let mut x0 = r.min.x;
            let mut x1 = r.max.x + if self.bold { 1.0 } else { 0.0 };
            if let Some(baseline) = self.shear {
                x0 += (baseline - r.max.y) * ITALIC_SHEAR;
                x1 += (baseline - r.min.y) * ITALIC_SHEAR;
            }
            grow(x0, r.min.y, x1, r.max.y);
        }
        for &(x0, y0, x1, y1) in &self.rects {
            grow(x0, y0, x1, y1);
        }
        b
    }

    fn into_mask(self) -> Option<CoverageMask> {
        let (x0, y0, x1, y1) = self.bounds()?;
        let mx = x0.floor() as i64 - 1;
        let my = y0.floor() as i64 - 1;
        let mw = (x1.ceil() as i64 + 1 - mx).max(0) as u32;
        let mh = (y1.ceil() as i64 + 1 - my).max(0) as u32;
        if mw == 0 || mh == 0 {
            return None;
        }
        let mut mask = CoverageMask::new(mx, my, mw, mh);

        for g in &self.glyphs {
            let r = g.px_bounds();
            g.draw(|px, py, cov| {
                let cy = r.min.y + py as f32;
                let mut cx = r.min.x + px as f32;
                if let Some(baseline) = self.shear {
                    cx += (baseline - cy) * ITALIC_SHEAR;
                }
                let ix = cx.round() as i64;
                let iy = cy.round() as i64;
                mask.add(ix, iy, cov);
                if self.bold {
                    mask.add(ix + 1, iy, cov);
                }
            });
        }

        for &(rx0, ry0, rx1, ry1) in &self.rects {
            fill_rect_coverage(&mut mask, rx0, ry0, rx1, ry1);
        }
        Some(mask)
    }
}

/// Add area coverage of a float rectangle.
fn fill_rect_coverage(mask: &mut CoverageMask, x0: f32, y0: f32, x1: f32, y1: f32) {
    let px0 = x0.floor() as i64;
    let px1 = x1.ceil() as i64;
    let py0 = y0.floor() as i64;
    let py1 = y1.ceil() as i64;
    for py in py0..py1 {
        let cov_y = (y1.min(py as f32 + 1.0) - y0.max(py as f32)).clamp(0.0, 1.0);
        for px in px0..px1 {
            let cov_x = (x1.min(px as f32 + 1.0) - x0.max(px as f32)).clamp(0.0, 1.0);
            mask.add(px, py, cov_x * cov_y);
        }
    }
}

// ============================================================================
// RENDERING
// ============================================================================

/// Draw one text overlay onto `dst`.
pub fn render_text(dst: &mut RgbaImage, overlay: &TextOverlay, fonts: &FontBook) {
    let style = &overlay.style;
    if overlay.text.is_empty() || style.font_size <= 0.0 {
        return;
    }

    let laid = fonts.layout(&overlay.text, style.font_size, &style.font_family, style.bold, style.italic);
    let width = laid
        .as_ref()
        .map(|(l, _)| l.width)
        .unwrap_or_else(|| estimate_width(&overlay.text, style.font_size));
    let left = overlay.x + style.align.offset(width);

    let mut ink = match &laid {
        Some((layout, face)) => Ink::lay_glyphs(layout, left, overlay.y, face),
        None => Ink::empty(),
    };
    if style.underline && width > 0.0 {
        // One pixel line centred three pixels under the baseline.
        let uy = overlay.y + 3.0;
        ink.rects.push((left, uy - 0.5, left + width, uy + 0.5));
    }

    if let Some(mask) = ink.into_mask() {
        mask.paint(dst, style.color, BlendMode::Normal, 1.0);
    }
}

pub fn render_texts(dst: &mut RgbaImage, texts: &[TextOverlay], fonts: &FontBook) {
    for text in texts {
        render_text(dst, text, fonts);
    }
}

/// Draw one sticker: translate to its position, rotate, scale, then draw the
/// content centred on the origin.
pub fn render_sticker(dst: &mut RgbaImage, sticker: &Sticker, fonts: &FontBook) {
    if sticker.content.is_empty() || sticker.scale <= 0.0 {
        return;
    }
    let Some((layout, face)) = fonts.layout(&sticker.content, STICKER_FONT_SIZE, "Arial", false, false) else {
        return;
    };
    // Centre horizontally, and vertically on the middle of the em box.
    let left = -layout.width * 0.5;
    let baseline = (layout.ascent + layout.descent) * 0.5;
    let Some(local) = Ink::lay_glyphs(&layout, left, baseline, &face).into_mask() else {
        return;
    };

    let (sin, cos) = sticker.rotation.to_radians().sin_cos();
    let s = sticker.scale;
    let to_canvas = |lx: f32, ly: f32| {
        (
            sticker.x + (lx * cos - ly * sin) * s,
            sticker.y + (lx * sin + ly * cos) * s,
        )
    };

    let lx0 = local.x as f32;
    let ly0 = local.y as f32;
    let lx1 = lx0 + local.width as f32;
    let ly1 = ly0 + local.height as f32;
    let corners = [to_canvas(lx0, ly0), to_canvas(lx1, ly0), to_canvas(lx0, ly1), to_canvas(lx1, ly1)];
    let cx0 = corners.iter().map(|c| c.0).fold(f32::MAX, f32::min).floor() as i64;
    let cy0 = corners.iter().map(|c| c.1).fold(f32::MAX, f32::min).floor() as i64;
    let cx1 = corners.iter().map(|c| c.0).fold(f32::MIN, f32::max).ceil() as i64;
    let cy1 = corners.iter().map(|c| c.1).fold(f32::MIN, f32::max).ceil() as i64;

    let mut mask = CoverageMask::new(cx0, cy0, (cx1 - cx0).max(0) as u32, (cy1 - cy0).max(0) as u32);
    for py in cy0..cy1 {
        for px in cx0..cx1 {
            // Inverse transform back into the unrotated, unscaled run.
            let dx = (px as f32 + 0.5 - sticker.x) / s;
            let dy = (py as f32 + 0.5 - sticker.y) / s;
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;
            let cov = sample_mask(&local, lx - 0.5, ly - 0.5);
            if cov > 0.0 {
                mask.add(px, py, cov);
            }
        }
    }
    mask.paint(dst, Color::BLACK, BlendMode::Normal, 1.0);
}

pub fn render_stickers(dst: &mut RgbaImage, stickers: &[Sticker], fonts: &FontBook) {
    for sticker in stickers {
        render_sticker(dst, sticker, fonts);
    }
}

/// Bilinear coverage lookup in canvas-space coordinates of `mask`.
fn sample_mask(mask: &CoverageMask, x: f32, y: f32) -> f32 {
    let fx = x - mask.x as f32;
    let fy = y - mask.y as f32;
    let x0 = fx.floor() as i64;
    let y0 = fy.floor() as i64;
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;
    let at = |ix: i64, iy: i64| -> f32 {
        if ix < 0 || iy < 0 || ix >= mask.width as i64 || iy >= mask.height as i64 {
            0.0
        } else {
            mask.get(ix as u32, iy as u32)
        }
    };
    let top = at(x0, y0) * (1.0 - tx) + at(x0 + 1, y0) * tx;
    let bottom = at(x0, y0 + 1) * (1.0 - tx) + at(x0 + 1, y0 + 1) * tx;
    top * (1.0 - ty) + bottom * ty
}
