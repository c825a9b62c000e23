use std::fs::File;
use std::io::{BufWriter, Cursor};
use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::io::{Limits, Reader as ImageReader};
use image::{DynamicImage, ImageEncoder};
use serde::{Deserialize, Serialize};

use crate::canvas::Bitmap;
use crate::error::{EditError, Result};
use crate::ops::adjustments::Adjustments;
use crate::ops::brush::BrushSettings;
use crate::pipeline::Composition;
use crate::session::LoadTicket;
use crate::{log_info, log_warn};

/// Largest canvas side accepted from decoded images and project files.
pub const MAX_CANVAS_DIM: u32 = 32_768;

/// Image subtypes accepted for upload (`image/<subtype>`).
pub const ACCEPTED_SUBTYPES: &[&str] = &["jpeg", "jpg", "png", "gif", "webp", "svg", "bmp", "tiff"];

// ============================================================================
// EXPORT FORMATS
// ============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ExportFormat {
    pub fn all() -> &'static [ExportFormat] {
        &[ExportFormat::Png, ExportFormat::Jpeg, ExportFormat::Webp]
    }

    pub fn mime(&self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Webp => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Webp => "webp",
        }
    }

    /// Parse a format name or file extension.
    pub fn from_name(name: &str) -> Option<ExportFormat> {
        match name.trim().trim_start_matches('.').to_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg),
            "webp" => Some(ExportFormat::Webp),
            _ => None,
        }
    }
}

// ============================================================================
// DATA URIs + UPLOAD VALIDATION
// ============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataUri {
    pub mime: String,
    pub data: Vec<u8>,
}

/// Split a `data:<mime>;base64,<payload>` URI.
pub fn parse_data_uri(uri: &str) -> Result<DataUri> {
    let rest = uri
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| EditError::MalformedDataUri("missing 'data:' prefix".into()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| EditError::MalformedDataUri("missing ',' separator".into()))?;

    let mut parts = header.split(';');
    let mime = parts.next().unwrap_or("").trim().to_lowercase();
    if !parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(EditError::MalformedDataUri("only base64 payloads are supported".into()));
    }
    let data = BASE64
        .decode(payload.trim())
        .map_err(|e| EditError::MalformedDataUri(e.to_string()))?;
    Ok(DataUri { mime, data })
}

pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, BASE64.encode(bytes))
}

/// Check a payload before decoding: it must be an accepted `image/*` type
/// and no larger than `limit` bytes.
pub fn validate_upload(mime: &str, size: usize, limit: usize) -> Result<()> {
    let mime = mime.trim().to_lowercase();
    let subtype = mime
        .strip_prefix("image/")
        .ok_or_else(|| EditError::UnsupportedType(mime.clone()))?;
    let subtype = subtype.strip_suffix("+xml").unwrap_or(subtype);
    if !ACCEPTED_SUBTYPES.contains(&subtype) {
        return Err(EditError::UnsupportedType(mime.clone()));
    }
    if size > limit {
        return Err(EditError::TooLarge { size, limit });
    }
    Ok(())
}

/// Decode raster bytes to a straight-alpha RGBA bitmap.
pub fn decode_bitmap(bytes: &[u8]) -> Result<Bitmap> {
    decode_bitmap_within(bytes, MAX_CANVAS_DIM)
}

/// Decode, refusing images wider or taller than `max_dim` before any pixel
/// buffer is allocated.
pub fn decode_bitmap_within(bytes: &[u8], max_dim: u32) -> Result<Bitmap> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| EditError::Decode(e.to_string()))?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(max_dim);
    limits.max_image_height = Some(max_dim);
    reader.limits(limits);

    let img = reader.decode().map_err(|e| EditError::Decode(e.to_string()))?;
    let (w, h) = (img.width(), img.height());
    if w > max_dim || h > max_dim {
        return Err(EditError::Decode(format!("{}x{} exceeds the {}px limit", w, h, max_dim)));
    }
    Ok(Bitmap::from_image(img.to_rgba8()))
}

/// Parse, validate and decode a data URI in one go.
pub fn decode_data_uri(uri: &str, limit: usize) -> Result<Bitmap> {
    let parsed = parse_data_uri(uri)?;
    validate_upload(&parsed.mime, parsed.data.len(), limit)?;
    decode_bitmap(&parsed.data)
}

// ============================================================================
// ENCODING
// ============================================================================

/// Encode for export. `quality` (0..=100) is only used by JPEG; PNG and
/// WEBP are lossless.
pub fn encode_bitmap(bitmap: &Bitmap, format: ExportFormat, quality: u8) -> Result<Vec<u8>> {
    let image = bitmap.as_image();
    let mut out = Cursor::new(Vec::new());
    let res = match format {
        ExportFormat::Png => PngEncoder::new(&mut out).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        ),
        ExportFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                image::ColorType::Rgb8,
            )
        }
        ExportFormat::Webp => WebPEncoder::new_lossless(&mut out).write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            image::ColorType::Rgba8,
        ),
    };
    res.map_err(|e| EditError::Encode(e.to_string()))?;
    Ok(out.into_inner())
}

pub fn export_data_uri(bitmap: &Bitmap, format: ExportFormat, quality: u8) -> Result<String> {
    let bytes = encode_bitmap(bitmap, format, quality)?;
    Ok(to_data_uri(&bytes, format.mime()))
}

/// Encode and write to `path`.
pub fn write_bitmap(bitmap: &Bitmap, path: &Path, format: ExportFormat, quality: u8) -> Result<()> {
    let bytes = encode_bitmap(bitmap, format, quality)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

// ============================================================================
// BACKGROUND DECODING
// ============================================================================

/// Decodes data URIs on the rayon pool. Results come back tagged with the
/// ticket they were submitted under; `EditSession::finish_load` drops the
/// ones that have been superseded.
pub struct DecodeQueue {
    sender: mpsc::Sender<(LoadTicket, Result<Bitmap>)>,
    receiver: mpsc::Receiver<(LoadTicket, Result<Bitmap>)>,
    pending: usize,
}

impl Default for DecodeQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            sender,
            receiver,
            pending: 0,
        }
    }

    pub fn submit(&mut self, ticket: LoadTicket, uri: String, limit: usize) {
        let sender = self.sender.clone();
        self.pending += 1;
        rayon::spawn(move || {
            let result = decode_data_uri(&uri, limit);
            let _ = sender.send((ticket, result));
        });
    }

    /// Number of submitted jobs not yet received.
    pub fn pending(&self) -> usize {
        self.pending
    }

    pub fn try_recv(&mut self) -> Option<(LoadTicket, Result<Bitmap>)> {
        let got = self.receiver.try_recv().ok();
        if got.is_some() {
            self.pending = self.pending.saturating_sub(1);
        }
        got
    }

    pub fn recv_timeout(&mut self, timeout: Duration) -> Option<(LoadTicket, Result<Bitmap>)> {
        let got = self.receiver.recv_timeout(timeout).ok();
        if got.is_some() {
            self.pending = self.pending.saturating_sub(1);
        }
        got
    }
}

// ============================================================================
// PROJECT FILE FORMAT
// ============================================================================

/// Magic header for project files.
const PROJECT_MAGIC: &str = "PHF1";
pub const PROJECT_EXTENSION: &str = "photofe";

/// Serialisable editor state: the pristine source plus everything composed
/// on top of it.
#[derive(Serialize, Deserialize)]
pub struct ProjectFile {
    magic: String,
    pub width: u32,
    pub height: u32,
    pub source: Vec<u8>,
    pub composition: Composition,
    pub adjustments: Adjustments,
    pub brush: BrushSettings,
}

impl ProjectFile {
    pub fn new(source: &Bitmap, composition: Composition, adjustments: Adjustments, brush: BrushSettings) -> Self {
        Self {
            magic: PROJECT_MAGIC.to_string(),
            width: source.width(),
            height: source.height(),
            source: source.as_image().as_raw().clone(),
            composition,
            adjustments,
            brush,
        }
    }

    pub fn source_bitmap(&self) -> Option<Bitmap> {
        Bitmap::from_raw(self.width, self.height, self.source.clone())
    }
}

pub fn write_project(project: &ProjectFile, path: &Path) -> Result<()> {
    let file = File::create(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, project)?;
    log_info!("Saved project {} ({}x{})", path.display(), project.width, project.height);
    Ok(())
}

pub fn read_project(path: &Path) -> Result<ProjectFile> {
    let raw = std::fs::read(path)?;
    if raw.len() < 12 {
        return Err(EditError::InvalidProject("File too small".into()));
    }
    // bincode writes a String as an 8-byte length followed by its bytes, so
    // the 4-char magic sits at 8..12.
    let magic = std::str::from_utf8(&raw[8..12]).unwrap_or("");
    if magic != PROJECT_MAGIC {
        return Err(EditError::InvalidProject(format!("Unknown magic '{}'", magic)));
    }

    let project: ProjectFile = bincode::deserialize(&raw)?;
    if project.width == 0 || project.height == 0 {
        return Err(EditError::InvalidProject("Canvas dimensions cannot be zero".into()));
    }
    if project.width > MAX_CANVAS_DIM || project.height > MAX_CANVAS_DIM {
        return Err(EditError::InvalidProject(format!(
            "Canvas {}x{} exceeds the {} pixel limit",
            project.width, project.height, MAX_CANVAS_DIM
        )));
    }
    let expected = project.width as usize * project.height as usize * 4;
    if project.source.len() != expected {
        log_warn!(
            "Project {} has {} pixel bytes, expected {}",
            path.display(),
            project.source.len(),
            expected
        );
        return Err(EditError::InvalidProject("Pixel data does not match dimensions".into()));
    }
    log_info!("Loaded project {} ({}x{})", path.display(), project.width, project.height);
    Ok(project)
}
