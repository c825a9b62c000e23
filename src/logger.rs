//! Per-launch diagnostics log.
//!
//! `init` opens `photofe.log` in the data folder from
//! [`app_dir`](crate::settings::app_dir) and replaces whatever the previous
//! launch left there. Lines below the threshold are dropped; the threshold
//! starts at `Info` and can be raised with `PHOTOFE_LOG=warn|error`.
//!
//! Library code logs through `log_info!`, `log_warn!` and `log_err!`. They
//! are expressions, so they fit in match arms. Nothing touches the disk until
//! a sink is installed.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::settings::{app_dir, AppDir};

const LOG_FILE_NAME: &str = "photofe.log";
const LEVEL_ENV: &str = "PHOTOFE_LOG";

struct Sink {
    path: PathBuf,
    out: Mutex<LineWriter<File>>,
}

static SINK: OnceLock<Sink> = OnceLock::new();
static THRESHOLD: AtomicU8 = AtomicU8::new(Level::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Level {
    Info = 0,
    Warn = 1,
    Error = 2,
}

impl Level {
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }

    /// Case-insensitive; accepts the usual short and long spellings.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "info" | "debug" | "trace" | "all" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" | "err" => Some(Level::Error),
            _ => None,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Level::Info,
            1 => Level::Warn,
            _ => Level::Error,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

pub fn threshold() -> Level {
    Level::from_u8(THRESHOLD.load(Ordering::Relaxed))
}

pub fn set_threshold(level: Level) {
    THRESHOLD.store(level as u8, Ordering::Relaxed);
}

/// Where the log is being written, once a sink exists.
pub fn log_path() -> Option<&'static Path> {
    SINK.get().map(|s| s.path.as_path())
}

/// True when a line at `level` would reach the file.
pub fn enabled(level: Level) -> bool {
    SINK.get().is_some() && level >= threshold()
}

#[doc(hidden)]
pub fn log(level: Level, args: fmt::Arguments<'_>) {
    if !enabled(level) {
        return;
    }
    let thread = std::thread::current();
    emit(&format_line(&clock(), level, thread.name(), args));
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::log($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Install the sink in the per-user data folder and read `PHOTOFE_LOG`.
pub fn init() -> io::Result<PathBuf> {
    if let Ok(name) = std::env::var(LEVEL_ENV) {
        match Level::from_name(&name) {
            Some(level) => set_threshold(level),
            None => eprintln!("{}={:?} is not a log level, keeping {}", LEVEL_ENV, name, threshold()),
        }
    }
    let dir = app_dir(AppDir::Data).unwrap_or_else(|| PathBuf::from("."));
    let path = dir.join(LOG_FILE_NAME);
    init_at(&path)?;
    Ok(path)
}

/// Install the sink at `path`, truncating it. Later calls are ignored.
pub fn init_at(path: &Path) -> io::Result<()> {
    if SINK.get().is_some() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
    let sink = Sink {
        path: path.to_path_buf(),
        out: Mutex::new(LineWriter::new(file)),
    };
    if SINK.set(sink).is_err() {
        return Ok(());
    }

    emit(&format!(
        "PhotoFE {} log opened at unix {} (threshold {})",
        env!("CARGO_PKG_VERSION"),
        unix_secs(),
        threshold()
    ));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let thread = std::thread::current();
        emit(&format_line(&clock(), Level::Error, thread.name(), format_args!("panic: {}", info)));
        prev(info);
    }));
    Ok(())
}

fn emit(line: &str) {
    if let Some(sink) = SINK.get()
        && let Ok(mut out) = sink.out.lock()
    {
        let _ = writeln!(out, "{}", line);
    }
}

/// `HH:MM:SS LEVEL [thread] message`. Unnamed threads are left untagged.
fn format_line(time: &str, level: Level, thread: Option<&str>, args: fmt::Arguments<'_>) -> String {
    match thread {
        Some(name) => format!("{} {:<5} [{}] {}", time, level.tag(), name, args),
        None => format!("{} {:<5} {}", time, level.tag(), args),
    }
}

fn unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall clock.
fn clock() -> String {
    let day = unix_secs() % 86_400;
    format!("{:02}:{:02}:{:02}", day / 3600, day % 3600 / 60, day % 60)
}
