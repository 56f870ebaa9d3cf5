//! File logging for the dialer.
//!
//! Log levels:
//! - ERROR: Failures that stop a campaign or lose an outcome
//! - WARN: Recoverable anomalies (placement failures, unmatched outcomes, timeouts)
//! - INFO: Lifecycle notifications (start, pause, completion)
//! - DEBUG: Per-tick admission and outcome traces
//! - TRACE: Pacing arithmetic and window evaluation
//!
//! Output goes to `~/.dialer/dialer.log`. `--debug` or `DIALER_DEBUG=1`
//! lowers the threshold to DEBUG; `DIALER_LOG=<level>` sets it explicitly
//! and wins over both.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Mutex;

use crate::config::EngineConfig;

static SINK: Mutex<Option<File>> = Mutex::new(None);
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

/// Threshold from the `--debug` flag and the environment.
fn resolve_level(debug_flag: bool, env_debug: Option<&str>, env_level: Option<&str>) -> LogLevel {
    if let Some(level) = env_level.and_then(|v| v.parse().ok()) {
        return level;
    }
    let env_debug = env_debug.is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));
    if debug_flag || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    }
}

/// Initialize logging to `~/.dialer/dialer.log`.
pub fn init_with_debug(debug: bool) {
    let level = resolve_level(
        debug,
        std::env::var("DIALER_DEBUG").ok().as_deref(),
        std::env::var("DIALER_LOG").ok().as_deref(),
    );
    set_level(level);

    let Ok(dir) = EngineConfig::dialer_dir() else {
        return;
    };
    if std::fs::create_dir_all(&dir).is_ok() {
        init_file(&dir.join("dialer.log"));
    }
}

/// Log to `path`, truncating it. Used by `init_with_debug` and by tests.
pub fn init_file(path: &Path) {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path);
    if let (Ok(file), Ok(mut sink)) = (file, SINK.lock()) {
        *sink = Some(file);
    }
}

pub fn log_path() -> Option<PathBuf> {
    EngineConfig::dialer_dir().ok().map(|d| d.join("dialer.log"))
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

pub fn enabled(level: LogLevel) -> bool {
    level <= get_level()
}

pub fn log_at(level: LogLevel, msg: &str) {
    if !enabled(level) {
        return;
    }
    let Ok(mut sink) = SINK.lock() else {
        return;
    };
    if let Some(file) = sink.as_mut() {
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ");
        let _ = writeln!(file, "[{}] [{}] {}", timestamp, level.as_str(), msg);
    }
}

/// INFO.
#[macro_export]
macro_rules! dlog {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_error {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Error, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! dlog_warn {
    ($($arg:tt)*) => {
        $crate::log::log_at($crate::log::LogLevel::Warn, &format!($($arg)*))
    };
}

/// DEBUG. The message is not formatted unless DEBUG is enabled.
#[macro_export]
macro_rules! dlog_debug {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Debug) {
            $crate::log::log_at($crate::log::LogLevel::Debug, &format!($($arg)*))
        }
    };
}

/// TRACE. The message is not formatted unless TRACE is enabled.
#[macro_export]
macro_rules! dlog_trace {
    ($($arg:tt)*) => {
        if $crate::log::enabled($crate::log::LogLevel::Trace) {
            $crate::log::log_at($crate::log::LogLevel::Trace, &format!($($arg)*))
        }
    };
}
