//! Session logger for the engine and the desktop shell.
//!
//! One log file per session, truncated at launch:
//!   Windows:  `%APPDATA%\LineFill\linefill.log`
//!   Linux:    `~/.local/share/LineFill/linefill.log`
//!   macOS:    `~/Library/Application Support/LineFill/linefill.log`
//!
//! Use `log_info!` / `log_warn!` / `log_err!` anywhere in the crate. Lines go
//! to the file once [`init`] has run and to stderr while echo is on (the
//! headless `--verbose` mode). With neither, logging is a silent no-op, so
//! library users and the test suite never touch the filesystem.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

pub const APP_DIR_NAME: &str = "LineFill";
pub const LOG_FILE_NAME: &str = "linefill.log";

static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();
static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static ECHO_STDERR: AtomicBool = AtomicBool::new(false);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        }
    }
}

/// Path of the current session log, if [`init`] succeeded.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Mirror every log line to stderr.
pub fn set_stderr_echo(on: bool) {
    ECHO_STDERR.store(on, Ordering::Relaxed);
}

fn write_line(line: &str) {
    if let Some(mutex) = LOG_FILE.get()
        && let Ok(mut file) = mutex.lock()
    {
        let _ = writeln!(file, "{}", line);
    }
}

/// Write one timestamped, level-tagged line.
pub fn write(level: Level, msg: &str) {
    let echo = ECHO_STDERR.load(Ordering::Relaxed);
    if LOG_FILE.get().is_none() && !echo {
        return;
    }
    let line = format_line(level, msg, unix_millis());
    write_line(&line);
    if echo {
        eprintln!("{}", line);
    }
}

fn format_line(level: Level, msg: &str, millis: u128) -> String {
    format!("[{}] [{}] {}", clock(millis), level.as_str(), msg)
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Info, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Warn, &format!($($arg)*));
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::write($crate::logger::Level::Error, &format!($($arg)*));
    };
}

/// Open (truncating) the session log and install a panic hook that copies
/// the panic message into it before running the previous hook.
pub fn init() {
    let path = data_dir().join(APP_DIR_NAME).join(LOG_FILE_NAME);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }

    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);
    match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            let _ = LOG_FILE.set(Mutex::new(f));
        }
        Err(e) => {
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            return;
        }
    }

    write_line(&format!(
        "=== LineFill {} session started (unix {}) ===",
        env!("CARGO_PKG_VERSION"),
        unix_millis() / 1000
    ));
    write_line(&format!("Log file: {}", path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_line(&format_line(Level::Error, &format!("PANIC {}", info), unix_millis()));
        prev(info);
    }));
}

/// Platform data directory, without the app sub-folder.
pub fn data_dir() -> PathBuf {
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
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    PathBuf::from(".")
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// `HH:MM:SS.mmm` (UTC) within the day.
fn clock(millis: u128) -> String {
    let secs = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        (secs % 86_400) / 3600,
        (secs % 3600) / 60,
        secs % 60,
        millis % 1000
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_wraps_at_midnight() {
        assert_eq!(clock(0), "00:00:00.000");
        assert_eq!(clock(86_400_000 + 3_723_045), "01:02:03.045");
    }

    #[test]
    fn lines_carry_level_tags() {
        let line = format_line(Level::Warn, "fill abandoned", 1_000);
        assert_eq!(line, "[00:00:01.000] [WARN] fill abandoned");
    }

    #[test]
    fn uninitialised_logger_is_a_no_op() {
        assert!(log_path().is_none());
        crate::log_err!("nobody is listening: {}", 42);
    }
}
