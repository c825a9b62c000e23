// ============================================================================
// PhotoFE CLI: headless batch editing via command-line arguments
// ============================================================================
//
// Usage examples:
//   photofe photo.png --recipe warm.toml --output result.jpg
//   photofe "shots/*.jpg" --recipe frame.toml --output out/ --format webp
//   photofe a.png b.png --recipe sepia.toml --quality 85
//   photofe --list-fonts
//
// A recipe is a TOML file with an ordered list of steps, each applied to the
// image through an editing session exactly as the editor would:
//
//   [[step]]
//   op = "filter"
//   kind = "sepia"
//
//   [[step]]
//   op = "frame"
//   style = "polaroid"
//   border_width = 12
//
// Inputs are processed in parallel on the rayon pool.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use rayon::prelude::*;
use serde::Deserialize;

use crate::canvas::{BlendMode, Color};
use crate::error::{EditError, Result};
use crate::io::{self, ExportFormat};
use crate::ops::adjustments::Adjustments;
use crate::ops::filters::FilterKind;
use crate::ops::focus::FocusEffect;
use crate::ops::frame::Frame;
use crate::ops::overlays::{Overlay, OverlayKind};
use crate::ops::text::{system_families, FontBook, TextStyle};
use crate::ops::transform::FlipAxis;
use crate::session::{EditSession, Viewport};
use crate::settings::EditorSettings;
use crate::{log_info, log_warn};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PhotoFE headless photo editor.
#[derive(Parser, Debug)]
#[command(
    name = "photofe",
    about = "PhotoFE headless batch photo editor",
    long_about = "Apply a recipe of filters, adjustments, overlays, text, focus effects\n\
                  and frames to image files without opening the editor.\n\n\
                  Example:\n  \
                  photofe photo.png --recipe warm.toml --output result.jpg\n  \
                  photofe \"*.jpg\" --recipe frame.toml --output out/ --format webp"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(num_args = 0.., value_name = "INPUT")]
    pub inputs: Vec<String>,

    /// TOML recipe of edit steps. Without one, images are only re-encoded.
    #[arg(short, long, value_name = "RECIPE.toml")]
    pub recipe: Option<PathBuf>,

    /// Output file (single input) or directory (any number of inputs).
    /// Defaults to writing next to each input.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Output format: png, jpeg, webp. Inferred from --output's extension
    /// when omitted, then from the settings file.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100). Defaults to the settings file value.
    #[arg(short, long, value_name = "1-100")]
    pub quality: Option<u8>,

    /// Settings file to use instead of the platform default.
    #[arg(long, value_name = "SETTINGS.toml")]
    pub config: Option<PathBuf>,

    /// Print the installed font families and exit.
    #[arg(long)]
    pub list_fonts: bool,

    /// Print per-file timing information.
    #[arg(short, long)]
    pub verbose: bool,
}

// ============================================================================
// Recipes
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Recipe {
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One edit. Coordinates are rendered-canvas pixels at the time the step runs.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Step {
    Filter {
        kind: FilterKind,
    },
    Adjust(Adjustments),
    Rotate {
        degrees: i32,
    },
    Flip {
        axis: FlipAxis,
    },
    Crop {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    },
    Overlay {
        kind: OverlayKind,
        #[serde(default)]
        blend: BlendMode,
        #[serde(default = "default_overlay_opacity")]
        opacity: f32,
    },
    Text {
        text: String,
        x: f32,
        y: f32,
        #[serde(default)]
        style: TextStyle,
    },
    Sticker {
        content: String,
        x: f32,
        y: f32,
        #[serde(default)]
        scale: Option<f32>,
        #[serde(default)]
        rotation: Option<f32>,
    },
    Focus(FocusEffect),
    Frame(Frame),
}

fn default_overlay_opacity() -> f32 {
    50.0
}

impl Recipe {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::parse(&std::fs::read_to_string(path)?)
    }

    /// Run every step against `session`. A step whose precondition is not met
    /// (a crop outside the image, empty text) is skipped with a warning.
    pub fn apply(&self, session: &mut EditSession) {
        for (i, step) in self.steps.iter().enumerate() {
            if !apply_step(session, step) {
                log_warn!("Recipe step {} ({:?}) had no effect", i + 1, step);
            }
        }
    }
}

fn apply_step(session: &mut EditSession, step: &Step) -> bool {
    match step {
        Step::Filter { kind } => session.apply_filter(*kind),
        Step::Adjust(adj) => session.set_adjustments(*adj),
        Step::Rotate { degrees } => session.rotate(*degrees),
        Step::Flip { axis } => session.flip(*axis),
        Step::Crop { x, y, width, height } => {
            let Some((w, h)) = session.current().map(|b| b.dimensions()) else {
                return false;
            };
            if !session.enter_crop_mode() {
                return false;
            }
            session.crop_pointer_down(*x, *y);
            session.crop_pointer_move(x + width, y + height);
            session.crop_pointer_up();
            let done = session.commit_crop(&Viewport::unscaled(w, h));
            if !done {
                session.cancel_crop();
            }
            done
        }
        Step::Overlay { kind, blend, opacity } => {
            session.add_overlay(Overlay::new(kind.clone()).with_blend(*blend, *opacity))
        }
        Step::Text { text, x, y, style } => session.add_text(text, *x, *y, style.clone()).is_some(),
        Step::Sticker { content, x, y, scale, rotation } => {
            let Some(id) = session.add_sticker(content, *x, *y) else {
                return false;
            };
            if scale.is_some() || rotation.is_some() {
                session.update_sticker(id, |s| {
                    if let Some(scale) = scale {
                        s.scale = *scale;
                    }
                    if let Some(rotation) = rotation {
                        s.rotation = *rotation;
                    }
                });
            }
            true
        }
        Step::Focus(effect) => session.apply_focus(*effect),
        Step::Frame(frame) => session.apply_frame(frame.clone()),
    }
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing. Per-file failures are reported and counted; the
/// run fails if any file failed.
pub fn run(args: CliArgs) -> std::result::Result<(), String> {
    if args.list_fonts {
        for family in system_families() {
            println!("{}", family);
        }
        return Ok(());
    }

    let inputs = resolve_inputs(&args.inputs);
    if inputs.is_empty() {
        return Err("no input files matched the given pattern(s).".into());
    }

    let settings = match &args.config {
        Some(path) => EditorSettings::load_from(path).map_err(|e| format!("{}: {}", path.display(), e))?,
        None => EditorSettings::load(),
    };

    let recipe = match &args.recipe {
        Some(path) => Recipe::load(path).map_err(|e| format!("recipe '{}': {}", path.display(), e))?,
        None => Recipe::default(),
    };

    let format = parse_format(args.format.as_deref(), args.output.as_deref(), settings.export_format)?;
    let quality = args.quality.unwrap_or(settings.export_quality).clamp(1, 100);

    // An existing directory, or a trailing separator, means "write in here".
    let output_dir = args.output.as_deref().filter(|p| {
        p.is_dir() || inputs.len() > 1 || p.to_string_lossy().ends_with(std::path::MAIN_SEPARATOR)
    });
    if let Some(dir) = output_dir {
        std::fs::create_dir_all(dir).map_err(|e| format!("could not create '{}': {}", dir.display(), e))?;
    }
    let output_file = if output_dir.is_none() { args.output.as_deref() } else { None };

    let fonts = Arc::new(FontBook::system());
    let total = inputs.len();
    let failures = AtomicUsize::new(0);
    log_info!("CLI: {} input(s), {} recipe step(s)", total, recipe.steps.len());

    inputs.par_iter().for_each(|input| {
        let started = Instant::now();
        let Some(output) = build_output_path(input, output_file, output_dir, format) else {
            eprintln!("error: cannot determine output path for '{}'.", input.display());
            failures.fetch_add(1, Ordering::Relaxed);
            return;
        };
        match run_one(input, &output, &recipe, &settings, &fonts, format, quality) {
            Ok(()) => {
                if args.verbose {
                    println!(
                        "{} -> {} ({:.0}ms)",
                        input.display(),
                        output.display(),
                        started.elapsed().as_secs_f64() * 1000.0
                    );
                } else {
                    println!("{} -> {}", input.display(), output.display());
                }
            }
            Err(e) => {
                eprintln!("error: {}: {}", input.display(), e);
                log_warn!("CLI failed on {}: {}", input.display(), e);
                failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    match failures.load(Ordering::Relaxed) {
        0 => Ok(()),
        n => Err(format!("{} of {} file(s) failed", n, total)),
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    input: &Path,
    output: &Path,
    recipe: &Recipe,
    settings: &EditorSettings,
    fonts: &Arc<FontBook>,
    format: ExportFormat,
    quality: u8,
) -> Result<()> {
    let bytes = std::fs::read(input)?;
    if bytes.len() > settings.max_upload_bytes {
        return Err(EditError::TooLarge {
            size: bytes.len(),
            limit: settings.max_upload_bytes,
        });
    }
    let bitmap = io::decode_bitmap(&bytes)?;

    let mut session = EditSession::with_fonts(settings.clone(), Arc::clone(fonts));
    session.load_bitmap(bitmap);
    recipe.apply(&mut session);

    let bitmap = session
        .current()
        .ok_or_else(|| EditError::Decode("image is empty".into()))?;
    io::write_bitmap(bitmap, output, format, quality)
}

// ============================================================================
// Helpers
// ============================================================================

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);

        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins, then the output file's extension, then the settings.
fn parse_format(
    format_arg: Option<&str>,
    output: Option<&Path>,
    fallback: ExportFormat,
) -> std::result::Result<ExportFormat, String> {
    if let Some(f) = format_arg {
        return ExportFormat::from_name(f).ok_or_else(|| format!("unknown format '{}' (png, jpeg, webp)", f));
    }
    let from_ext = output
        .and_then(|p| p.extension())
        .and_then(|e| e.to_str())
        .and_then(ExportFormat::from_name);
    Ok(from_ext.unwrap_or(fallback))
}

/// Compute the output path for a single input file.
///
/// Priority:
/// 1. an explicit output file
/// 2. an output directory, keeping the input's stem
/// 3. next to the input, with `_edit` appended to the stem
fn build_output_path(
    input: &Path,
    output_file: Option<&Path>,
    output_dir: Option<&Path>,
    format: ExportFormat,
) -> Option<PathBuf> {
    if let Some(out) = output_file {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    Some(parent.join(format!("{}_edit.{}", stem, ext)))
}
