//! Session log for the mask engine.
//!
//! One file per run in the OS data directory, truncated at start-up:
//!   Windows:  `%APPDATA%\MaskPaint\maskpaint.log`
//!   Linux:    `~/.local/share/MaskPaint/maskpaint.log` (`XDG_DATA_HOME` respected)
//!   macOS:    `~/Library/Application Support/MaskPaint/maskpaint.log`
//!
//! Lines written on behalf of a project carry its [`LogScope`], so the loads and
//! uploads of consecutive images can be told apart:
//!
//! ```text
//! [12:04:31.207] [WARN ] [3f2a9c1e#4] Mask 'mask_ab.png' is 10x10, image is 12x12; drawing at origin
//! ```
//!
//! `log_info!` / `log_warn!` / `log_err!` take an optional `@scope,` prefix.
//! Before [`init`] they are no-ops, which is how embedding hosts and tests run.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use uuid::Uuid;

struct LogSink {
    file: File,
    path: PathBuf,
}

static SINK: OnceLock<Mutex<LogSink>> = OnceLock::new();

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    /// Fixed-width tag so columns line up in the file.
    pub fn tag(self) -> &'static str {
        match self {
            Level::Info => "INFO ",
            Level::Warn => "WARN ",
            Level::Error => "ERROR",
        }
    }
}

/// Which project, and which of its image loads, a line belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LogScope {
    pub project: Uuid,
    pub generation: u64,
}

impl fmt::Display for LogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.project.simple().to_string();
        write!(f, "{}#{}", &id[..8], self.generation)
    }
}

#[macro_export]
macro_rules! log_info {
    (@ $scope:expr, $($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Info, Some($scope), &format!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Info, None, &format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! log_warn {
    (@ $scope:expr, $($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Warn, Some($scope), &format!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Warn, None, &format!($($arg)*));
    }};
}

#[macro_export]
macro_rules! log_err {
    (@ $scope:expr, $($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Error, Some($scope), &format!($($arg)*));
    }};
    ($($arg:tt)*) => {{
        $crate::logger::write($crate::logger::Level::Error, None, &format!($($arg)*));
    }};
}

pub fn is_enabled() -> bool {
    SINK.get().is_some()
}

pub fn log_path() -> Option<PathBuf> {
    let sink = SINK.get()?.lock().ok()?;
    Some(sink.path.clone())
}

/// Append one line.  I/O errors are swallowed: logging never interrupts editing.
pub fn write(level: Level, scope: Option<LogScope>, msg: &str) {
    let Some(sink) = SINK.get() else { return };
    let line = format_line(&clock(), level, scope, msg);
    if let Ok(mut sink) = sink.lock() {
        let _ = writeln!(sink.file, "{}", line);
    }
}

pub fn format_line(clock: &str, level: Level, scope: Option<LogScope>, msg: &str) -> String {
    match scope {
        Some(scope) => format!("[{}] [{}] [{}] {}", clock, level.tag(), scope, msg),
        None => format!("[{}] [{}] {}", clock, level.tag(), msg),
    }
}

/// Open the session log at its default location.  Returns the path in use,
/// or `None` when the file could not be created (logging then stays off).
pub fn init() -> Option<PathBuf> {
    let path = default_log_path();
    match init_at(&path) {
        Ok(()) => Some(path),
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            None
        }
    }
}

/// Truncate `path` and route all logging into it.  Only the first call in a
/// process takes effect.  Panics are mirrored into the file.
pub fn init_at(path: &Path) -> io::Result<()> {
    if is_enabled() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "=== MaskPaint {} session, unix {} ===", env!("CARGO_PKG_VERSION"), unix_secs())?;

    let sink = LogSink {
        file,
        path: path.to_path_buf(),
    };
    if SINK.set(Mutex::new(sink)).is_ok() {
        let prev = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            write(Level::Error, None, &format!("PANIC {}", info));
            prev(info);
        }));
    }
    Ok(())
}

fn default_log_path() -> PathBuf {
    data_dir().join("MaskPaint").join("maskpaint.log")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata);
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join("Library").join("Application Support");
        }
    }
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .or_else(|_| std::env::var("HOME").map(|h| PathBuf::from(h).join(".local").join("share")))
        .unwrap_or_else(|_| PathBuf::from("."))
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

fn unix_secs() -> u128 {
    unix_millis() / 1000
}

/// `HH:MM:SS.mmm`, UTC.
fn clock() -> String {
    let ms = unix_millis();
    let secs = ms / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        ms % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_lines_carry_short_project_id_and_generation() {
        let scope = LogScope {
            project: Uuid::from_u128(0x3f2a9c1e_0000_4000_8000_000000000000),
            generation: 4,
        };
        assert_eq!(scope.to_string(), "3f2a9c1e#4");
        assert_eq!(
            format_line("12:00:00.000", Level::Warn, Some(scope), "mask clipped"),
            "[12:00:00.000] [WARN ] [3f2a9c1e#4] mask clipped"
        );
        assert_eq!(
            format_line("12:00:00.000", Level::Error, None, "boom"),
            "[12:00:00.000] [ERROR] boom"
        );
    }

    #[test]
    fn macros_work_as_statements_and_match_arms() {
        let scope = LogScope {
            project: Uuid::nil(),
            generation: 1,
        };
        let outcome: Result<u8, &str> = Err("offline");
        match outcome {
            Ok(v) => log_info!(@scope, "value {}", v),
            Err(e) => log_err!("failed: {}", e),
        }
        log_warn!("plain {}", 1);
    }

    #[test]
    fn clock_is_fixed_width() {
        let c = clock();
        assert_eq!(c.len(), 12);
        assert_eq!(&c[2..3], ":");
        assert_eq!(&c[8..9], ".");
    }
}
