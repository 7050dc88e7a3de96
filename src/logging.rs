// Logging setup - daily rolling file, plus stderr in dev mode

use anyhow::Result;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "melodytail.log";
const DEFAULT_FILTER: &str = "info,melodytail=debug";

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process or buffered lines are lost on exit.
pub fn init_logging(log_dir: &Path, dev: bool) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)?;

    // Daily rotating file appender
    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let base_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let file_layer = fmt::layer()
        .with_writer(file_writer)
        .with_target(true)
        .with_level(true)
        .with_ansi(false);

    // stderr shares the console with the prompt, so only in dev mode
    let stderr_layer = dev.then(|| fmt::layer().with_writer(std::io::stderr).with_target(true).boxed());

    tracing_subscriber::registry()
        .with(base_filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if dev {
        eprintln!("Dev mode: debug output enabled to stderr + file");
    }

    Ok(guard)
}
