//! Utilities for logging.

use std::io;

use tracing::level_filters::LevelFilter;
use tracing::subscriber;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    HumanReadable,
    Json,
}

/// Configure the global logger.
///
/// `default_level` is used unless overridden by the `RUST_LOG` environment
/// variable. Calling this more than once is a no-op.
pub fn configure_global_logger<W>(default_level: tracing::Level, format: LogFormat, writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(default_level).into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_thread_ids(true)
        .with_thread_names(true);

    // Errors only when a global subscriber was already set.
    let _ = match format {
        LogFormat::HumanReadable => subscriber::set_global_default(builder.finish()),
        LogFormat::Json => subscriber::set_global_default(builder.json().finish()),
    };
}

/// Initialize a debug level logger writing to test output.
pub fn init_test() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::DEBUG.into())
        .from_env_lossy();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_test_writer()
        .try_init();
}

/// Configure a human readable logger writing to stderr.
pub fn init_stderr(default_level: tracing::Level) {
    configure_global_logger(default_level, LogFormat::HumanReadable, io::stderr);
}
