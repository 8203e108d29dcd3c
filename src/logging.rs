use anyhow::{Context, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log output may go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    /// The REPL owns the terminal (default)
    Interactive,
    /// Diagnostic runs with console logging
    Verbose,
}

/// Initialize logging based on mode
///
/// # Interactive mode
/// - NO stderr output (log lines would interleave with the chat transcript)
/// - File logging only when log_file is Some
///
/// # Verbose mode
/// - Console (stderr) logging enabled
/// - File logging when log_file is Some (in addition to console)
pub fn init_logging(mode: LogMode, log_file: Option<String>) -> Result<()> {
    match mode {
        LogMode::Interactive => {
            if let Some(filename) = log_file {
                init_file_logging(filename)?;
            }
            // Otherwise: no logging initialization at all
        }
        LogMode::Verbose => {
            if let Some(filename) = log_file {
                init_dual_logging(filename)?;
            } else {
                init_console_logging()?;
            }
        }
    }
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())
}

fn open_log_file(filename: &str) -> Result<std::fs::File> {
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(filename)
        .with_context(|| format!("Failed to open log file '{}'", filename))
}

/// Console-only logging (stderr)
fn init_console_logging() -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
        .context("Failed to initialize console logging")
}

/// File-only logging
fn init_file_logging(filename: String) -> Result<()> {
    let file = open_log_file(&filename)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .try_init()
        .context("Failed to initialize file logging")
}

/// Dual logging: both console (stderr) and file
fn init_dual_logging(filename: String) -> Result<()> {
    let file = open_log_file(&filename)?;

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .try_init()
        .context("Failed to initialize logging")
}
