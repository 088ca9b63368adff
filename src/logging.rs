//! Process-wide `tracing` setup shared by the gateway server and the CLI.
//!
//! Events go to a console stream and to a log file. The file is `RUSTY_EXTRACT_LOG_FILE` when
//! that variable is set and `logs/rusty-extract.log` otherwise; missing parent directories are
//! created and the file is opened for appending. File output is written from a background
//! worker whose guard lives in a static until exit.
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, fmt::writer::BoxMakeWriter, prelude::*};

const LOG_FILE_ENV: &str = "RUSTY_EXTRACT_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/rusty-extract.log";

static FILE_WORKER: OnceLock<WorkerGuard> = OnceLock::new();

/// Stream receiving console log output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Console {
    /// Standard output (server binary).
    Stdout,
    /// Standard error, leaving stdout to command output (CLI).
    Stderr,
}

impl Console {
    fn make_writer(self) -> BoxMakeWriter {
        match self {
            Self::Stdout => BoxMakeWriter::new(std::io::stdout),
            Self::Stderr => BoxMakeWriter::new(std::io::stderr),
        }
    }
}

/// Install the subscriber used by the gateway server.
pub fn init_tracing() {
    init_tracing_to(Console::Stdout);
}

/// Install the global subscriber with console output on `console`.
///
/// `RUST_LOG` selects the filter and falls back to `info`. If the log file cannot be opened the
/// reason is printed to stderr and only the console layer is installed.
pub fn init_tracing_to(console: Console) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = fmt::layer()
        .with_writer(console.make_writer())
        .with_target(false)
        .compact();

    let file_layer = match file_writer(&log_file_path(std::env::var_os(LOG_FILE_ENV))) {
        Ok(writer) => Some(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .compact(),
        ),
        Err(err) => {
            eprintln!("File logging disabled: {err}");
            None
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .init();
}

/// Where file logs go for the given `RUSTY_EXTRACT_LOG_FILE` value.
fn log_file_path(configured: Option<OsString>) -> PathBuf {
    configured
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

fn file_writer(path: &Path) -> Result<NonBlocking, String> {
    let file = open_append(path).map_err(|err| format!("{}: {err}", path.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(file);
    let _ = FILE_WORKER.set(guard);
    Ok(writer)
}
