//! File logger for archai.
//!
//! Lines look like `[12:04:31.207] [WARN] [orchestration::executor] message`.
//!
//! Levels:
//! - ERROR: a command could not complete (bad config, unreadable image)
//! - WARN: degraded workflow results (failed, timed out or dropped tasks)
//! - INFO: workflow lifecycle (plan, task outcomes, confidence)
//! - DEBUG: per-task detail (inputs, context sizes, session eviction)
//! - TRACE: raw remote response bodies
//!
//! `--debug` or `ARCHAI_DEBUG=1` raises the level to DEBUG; `ARCHAI_LOG`
//! names a level explicitly and wins over both.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

/// Level implied by the debug flag and environment.
fn resolve_level<F>(debug: bool, lookup: F) -> LogLevel
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(level) = lookup("ARCHAI_LOG").and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = lookup("ARCHAI_DEBUG")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Log to ~/.archai/archai.log, truncated on startup.
pub fn init_with_debug(debug: bool) {
    let level = resolve_level(debug, |key| std::env::var(key).ok());
    if let Some(dir) = dirs::home_dir().map(|h| h.join(".archai")) {
        let _ = std::fs::create_dir_all(&dir);
        init_at(&dir.join("archai.log"), level);
    }
}

/// Log to `path` at `level`. Only the first call chooses the file.
pub fn init_at(path: &Path, level: LogLevel) {
    set_level(level);
    if LOG_PATH.get().is_none() {
        let _ = std::fs::write(path, "");
        LOG_PATH.set(path.to_path_buf()).ok();
    }
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Strip the crate name from a module path.
fn short_target(module_path: &str) -> &str {
    module_path
        .split_once("::")
        .map(|(_, rest)| rest)
        .unwrap_or(module_path)
}

fn format_line(level: LogLevel, target: &str, msg: &str) -> String {
    let timestamp = chrono::Local::now().format("%H:%M:%S%.3f");
    format!(
        "[{}] [{}] [{}] {}",
        timestamp,
        level.as_str(),
        short_target(target),
        msg
    )
}

/// Write one line. Dropped silently before `init` or below the level.
pub fn log_at(level: LogLevel, target: &str, msg: &str) {
    if level > get_level() {
        return;
    }
    if let Some(path) = LOG_PATH.get() {
        if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
            let _ = writeln!(file, "{}", format_line(level, target, msg));
        }
    }
}

#[macro_export]
macro_rules! alog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! alog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! alog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! alog_debug {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Debug, module_path!(), &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! alog_trace {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Trace, module_path!(), &format!($($arg)*))
    };
}
