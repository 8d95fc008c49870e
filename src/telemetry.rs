//! Tracing setup for the CLI
//!
//! Two layers: a human-readable console layer on stderr filtered by
//! `RUST_LOG`, and an optional JSON file layer writing daily-rolled log
//! files so every run leaves a machine-readable event trail. The returned
//! guard must be held for the life of the process; dropping it flushes the
//! file writer.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter, Layer};

/// Guard keeping the non-blocking file writer alive
pub struct TelemetryGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize tracing with a console layer and, when a log directory is
/// given, a JSON file layer with daily rotation.
pub fn init_tracing(log_dir: Option<&Path>) -> TelemetryGuard {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_default_env());

    let (file_layer, file_guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "vectorization.ndjson");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(EnvFilter::new("info"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    TelemetryGuard {
        _file_guard: file_guard,
    }
}
