//! Process logging for the CLI and embedders.
//!
//! [`start_logging`] installs one `tracing` registry built from a resolved
//! [`LoggingConfig`]: an `EnvFilter`, a console layer on stderr (stdout is the
//! report) and, when enabled, a non-blocking file layer writing one
//! `signsafe_<timestamp>.log` per run. The returned [`LoggingSession`] owns the
//! file writer; keep it alive until exit so buffered lines are flushed.

use crate::services::config_store::LoggingConfig;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_PREFIX: &str = "signsafe_";

pub struct LoggingSession {
    log_file: Option<PathBuf>,
    _writer: Option<WorkerGuard>,
}

impl LoggingSession {
    /// File this run logs to, if file logging is active.
    pub fn log_file(&self) -> Option<&Path> {
        self.log_file.as_deref()
    }
}

struct SessionFile {
    path: PathBuf,
    writer: NonBlocking,
    guard: WorkerGuard,
}

fn open_session_file(dir: &Path) -> Option<SessionFile> {
    if let Err(e) = fs::create_dir_all(dir) {
        eprintln!("log directory {} not writable ({}), logging to console only", dir.display(), e);
        return None;
    }
    let name = format!("{}{}.log", LOG_PREFIX, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, &name));
    Some(SessionFile {
        path: dir.join(name),
        writer,
        guard,
    })
}

/// Install the global subscriber. A second call finds one already installed
/// and returns an inactive session.
pub fn start_logging(config: &LoggingConfig) -> LoggingSession {
    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));
    let session_file = if config.file_enabled {
        open_session_file(&config.log_dir())
    } else {
        None
    };

    let (file_layer, log_file, guard) = match session_file {
        Some(file) => (
            Some(
                fmt::layer()
                    .with_writer(file.writer)
                    .with_ansi(false)
                    .with_file(true)
                    .with_line_number(true),
            ),
            Some(file.path),
            Some(file.guard),
        ),
        None => (None, None, None),
    };
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(cfg!(debug_assertions))
        .with_target(true);

    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .is_err()
    {
        return LoggingSession {
            log_file: None,
            _writer: None,
        };
    }

    info!(
        "[logging] signsafe {} started, level={} file={}",
        env!("CARGO_PKG_VERSION"),
        config.level,
        log_file
            .as_deref()
            .map_or_else(|| "off".to_string(), |p| p.display().to_string())
    );

    if let (Some(path), true) = (&log_file, config.keep_files > 0) {
        if let Some(dir) = path.parent().map(Path::to_path_buf) {
            let keep = config.keep_files;
            std::thread::spawn(move || {
                let removed = cleanup_old_logs(&dir, keep);
                if removed > 0 {
                    info!("[logging] removed {} old session logs", removed);
                }
            });
        }
    } else if log_file.is_none() && config.file_enabled {
        warn!("[logging] file logging requested but unavailable");
    }

    LoggingSession {
        log_file,
        _writer: guard,
    }
}

/// Delete all but the `keep` most recently modified session logs.
/// Returns how many were removed.
pub fn cleanup_old_logs(logs_dir: &Path, keep: usize) -> usize {
    let Ok(read_dir) = fs::read_dir(logs_dir) else {
        return 0;
    };
    let mut sessions: Vec<(std::time::SystemTime, PathBuf)> = read_dir
        .filter_map(|e| e.ok())
        .filter(|e| {
            let name = e.file_name();
            let name = name.to_string_lossy();
            name.starts_with(LOG_PREFIX) && name.ends_with(".log")
        })
        .map(|e| {
            let modified = e
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            (modified, e.path())
        })
        .collect();

    let excess = sessions.len().saturating_sub(keep);
    if excess == 0 {
        return 0;
    }
    // oldest first; the timestamped name breaks mtime ties
    sessions.sort();
    sessions
        .into_iter()
        .take(excess)
        .filter(|(_, path)| fs::remove_file(path).is_ok())
        .count()
}
