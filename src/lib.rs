//! Canvas compositing and editing core for the PhotoFE photo editor.
//!
//! An [`EditSession`] owns a pristine source bitmap and a [`Composition`]
//! (filter, adjustments, focus, frame, overlays, strokes, text, stickers).
//! Every edit re-renders from the source and records a history snapshot.

#![allow(clippy::too_many_arguments)]

#[macro_use]
pub mod logger;

pub mod canvas;
pub mod cli;
pub mod components;
pub mod error;
pub mod io;
pub mod ops;
pub mod pipeline;
pub mod project;
pub mod remote;
pub mod session;
pub mod settings;

pub use canvas::{BlendMode, Bitmap, Color};
pub use error::{EditError, Result};
pub use io::ExportFormat;
pub use pipeline::{Composition, RenderStack};
pub use project::Project;
pub use session::{EditMode, EditSession, LoadOutcome, LoadTicket, PointerEvent, Viewport};
pub use settings::EditorSettings;
