//! Logging and tracing configuration
//!
//! Single invocations log compactly to stderr. Suite runs can last an hour,
//! so they additionally append a detailed log file.

use std::path::PathBuf;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, registry::LookupSpan, util::SubscriberInitExt, EnvFilter, Layer,
};

use super::paths;

/// Initialize tracing for one-shot commands (stderr logging)
///
/// Logs are controlled by the `RUST_LOG` environment variable.
/// Default level is INFO for this crate, WARN for dependencies.
pub fn init_cli() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sandbox_dispatch=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}

/// Initialize tracing for suite runs (file + stderr logging)
///
/// The file at `<data dir>/sandbox-dispatch/logs/suite.log` gets everything
/// at DEBUG and above, including forwarded sandbox console output.
pub fn init_suite() -> Option<PathBuf> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("sandbox_dispatch=debug,info"));

    let log_path = paths::log_dir().and_then(|log_dir| {
        std::fs::create_dir_all(&log_dir).ok()?;
        let log_file = log_dir.join("suite.log");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
        {
            Ok(file) => Some((log_file, file)),
            Err(e) => {
                eprintln!("Warning: Could not open log file: {}", e);
                None
            }
        }
    });

    match log_path {
        Some((path, file)) => {
            let file_layer = fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(file_layer)
                .with(stderr_layer())
                .init();

            Some(path)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer())
                .init();
            None
        }
    }
}

/// Compact stderr output that only surfaces warnings while the file gets the detail
fn stderr_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .compact()
        .with_filter(EnvFilter::new("warn"))
}
