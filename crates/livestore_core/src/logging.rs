//! Process-wide logging bootstrap.
//!
//! # Responsibility
//! - Start one `flexi_logger` backend per process, writing size-rotated files
//!   or stderr.
//! - Report panics from any thread, worker threads included, as log events.
//!
//! # Invariants
//! - Calling `init_logging` again with the same level and target is a no-op.
//! - A different level or target after initialization is an error.
//! - Initialization returns errors instead of panicking.

use flexi_logger::{
    Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming, WriteMode,
};
use log::{error, info, LevelFilter};
use once_cell::sync::OnceCell;
use std::panic::PanicHookInfo;
use std::path::PathBuf;
use std::str::FromStr;

const FILE_BASENAME: &str = "livestore";
const ROTATE_AT_BYTES: u64 = 8 * 1024 * 1024;
const KEEP_ROTATED_FILES: usize = 4;
const PANIC_MESSAGE_LIMIT: usize = 200;

static ACTIVE: OnceCell<ActiveLogger> = OnceCell::new();
static PANIC_HOOK: OnceCell<()> = OnceCell::new();

/// Destination of log output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    /// Rotated `livestore*.log` files inside an absolute directory. Warnings
    /// and errors are also echoed to stderr.
    Directory(PathBuf),
    Stderr,
}

impl LogTarget {
    /// Builds a directory target, rejecting blank and relative paths.
    pub fn directory(path: impl Into<PathBuf>) -> Result<Self, String> {
        let path: PathBuf = path.into();
        if path.as_os_str().to_string_lossy().trim().is_empty() {
            return Err("log directory is blank".to_string());
        }
        if path.is_relative() {
            return Err(format!(
                "log directory `{}` is relative; an absolute path is required",
                path.display()
            ));
        }
        Ok(Self::Directory(path))
    }
}

impl std::fmt::Display for LogTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Directory(dir) => write!(f, "{}", dir.display()),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

struct ActiveLogger {
    level: LevelFilter,
    target: LogTarget,
    _handle: LoggerHandle,
}

/// Starts logging at `level` (`trace`, `debug`, `info`, `warn`, `error`).
///
/// # Errors
/// - `level` is not one of the names above.
/// - A directory target is blank or relative.
/// - The directory cannot be created or the backend does not start.
/// - Logging already runs with another level or target.
pub fn init_logging(level: &str, target: LogTarget) -> Result<(), String> {
    let level = parse_level(level)?;
    if let LogTarget::Directory(dir) = &target {
        LogTarget::directory(dir.clone())?;
    }
    let active = ACTIVE.get_or_try_init(|| start(level, target.clone()))?;

    if active.level != level || active.target != target {
        return Err(format!(
            "logging is already running with level={} target={}; requested level={} target={}",
            active.level, active.target, level, target
        ));
    }
    Ok(())
}

/// Level and target of the running logger, if any.
pub fn logging_status() -> Option<(LevelFilter, LogTarget)> {
    ACTIVE
        .get()
        .map(|active| (active.level, active.target.clone()))
}

/// Level used when the caller has no preference.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn parse_level(level: &str) -> Result<LevelFilter, String> {
    let trimmed = level.trim();
    match LevelFilter::from_str(trimmed) {
        Ok(LevelFilter::Off) | Err(_) => Err(format!(
            "unknown log level `{trimmed}`; use trace, debug, info, warn or error"
        )),
        Ok(parsed) => Ok(parsed),
    }
}

fn start(level: LevelFilter, target: LogTarget) -> Result<ActiveLogger, String> {
    let spec = level.to_string().to_ascii_lowercase();
    let logger = Logger::try_with_str(&spec).map_err(|err| format!("bad log spec `{spec}`: {err}"))?;

    let logger = match &target {
        LogTarget::Directory(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|err| format!("cannot create log directory `{}`: {err}", dir.display()))?;
            logger
                .log_to_file(FileSpec::default().directory(dir).basename(FILE_BASENAME))
                .rotate(
                    Criterion::Size(ROTATE_AT_BYTES),
                    Naming::Numbers,
                    Cleanup::KeepLogFiles(KEEP_ROTATED_FILES),
                )
                .append()
                .write_mode(WriteMode::BufferAndFlush)
                .duplicate_to_stderr(Duplicate::Warn)
                .format_for_files(flexi_logger::detailed_format)
        }
        LogTarget::Stderr => logger
            .log_to_stderr()
            .format_for_stderr(flexi_logger::default_format),
    };

    let handle = logger
        .start()
        .map_err(|err| format!("logger did not start: {err}"))?;
    install_panic_hook();

    info!(
        "event=logging_init module=logging status=ok level={} target={} version={}",
        spec,
        target,
        env!("CARGO_PKG_VERSION")
    );
    Ok(ActiveLogger {
        level,
        target,
        _handle: handle,
    })
}

fn install_panic_hook() {
    if PANIC_HOOK.set(()).is_err() {
        return;
    }
    let chained = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let current = std::thread::current();
        error!(
            "event=panic module=logging status=error thread={} at={} message={}",
            current.name().unwrap_or("<unnamed>"),
            info.location()
                .map_or_else(|| "?".to_string(), |at| format!("{}:{}", at.file(), at.line())),
            panic_message(info)
        );
        chained(info);
    }));
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    let payload = info.payload();
    let raw = match (payload.downcast_ref::<&str>(), payload.downcast_ref::<String>()) {
        (Some(text), _) => *text,
        (None, Some(text)) => text.as_str(),
        (None, None) => "<non-string payload>",
    };
    single_line(raw, PANIC_MESSAGE_LIMIT)
}

/// Flattens control characters to spaces and caps the length in characters.
fn single_line(raw: &str, limit: usize) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .take(limit)
        .collect();
    if raw.chars().nth(limit).is_some() {
        out.push_str("...");
    }
    out
}
