//! Session logger: routes `tracing` events to a single file in the OS data
//! directory.
//!
//! The file is **truncated (overwritten) at each launch**, so it only ever
//! contains output from the most-recent session.
//!
//! Log location:
//!   Windows:  `%APPDATA%\SizeMarks\sizemarks.log`
//!   Linux:    `~/.local/share/SizeMarks/sizemarks.log`
//!   macOS:    `~/Library/Application Support/SizeMarks/sizemarks.log`
//!
//! `RUST_LOG` overrides the default filter.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Returns the path to the current session log file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Initialise logging. Must be called once before any logging.
///
/// * Creates (or truncates) the log file.
/// * With `verbose`, also echoes events to stderr and lowers the default
///   level to `debug`.
/// * Installs a panic hook that records the panic before running the
///   default handler.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    let path = log_file_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path);

    let file_layer = match file {
        Ok(f) => {
            let _ = LOG_PATH.set(path.clone());
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(f)),
            )
        }
        Err(e) => {
            // Can't open log file; not fatal
            eprintln!("[logger] Failed to open log file {:?}: {}", path, e);
            None
        }
    };

    let stderr_layer = verbose.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });

    if tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .is_err()
    {
        // A subscriber is already installed (tests, embedding hosts)
        return;
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log = %path.display(),
        "=== SizeMarks session started ==="
    );

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC: {}", info);
        prev(info);
    }));
}

fn log_file_path() -> PathBuf {
    data_dir().join("SizeMarks").join("sizemarks.log")
}

/// Platform data directory (without the app sub-folder).
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
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support");
        }
    }
    // Linux / fallback
    if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
        return PathBuf::from(xdg);
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local").join("share");
    }
    // Last resort: current working directory
    PathBuf::from(".")
}
