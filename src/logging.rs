//! Tracing subscriber setup for binaries and tests that embed the engine.
//!
//! `RUST_LOG` always wins over the directive passed in.

use crate::error::{EngineError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Directive used when neither `RUST_LOG` nor the caller specify one.
pub const DEFAULT_DIRECTIVE: &str = "info,dataflow_rs=debug";

/// `RUST_LOG` if set and valid, otherwise `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a global stderr subscriber. Fails if one is already installed.
pub fn init_tracing(default_directive: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| EngineError::Config(format!("Failed to install tracing subscriber: {}", e)))
}

/// Like [`init_tracing`], plus a daily-rolling file `<dir>/<prefix>.<date>`.
///
/// Keep the returned guard alive; dropping it flushes and stops the file
/// writer.
pub fn init_tracing_with_file(
    dir: impl AsRef<Path>,
    prefix: &str,
    default_directive: &str,
) -> Result<WorkerGuard> {
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir).map_err(|e| {
        EngineError::Config(format!("Failed to create log directory {:?}: {}", dir, e))
    })?;

    let appender = tracing_appender::rolling::daily(dir, prefix);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter(default_directive))
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .try_init()
        .map_err(|e| EngineError::Config(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!("Logging to {:?}", dir);
    Ok(guard)
}
