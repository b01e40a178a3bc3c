use reminder_domain::{LogFormat, LoggingConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level. Output goes to stderr so
/// command results on stdout stay machine-readable. Calling this twice is
/// harmless; the second subscriber is discarded.
pub fn init_tracing(config: &LoggingConfig) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let result = match config.format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Log the outcome of an operator command with structured fields
#[inline]
pub fn log_command_execution(command: &str, elapsed: std::time::Duration, success: bool) {
    let duration_ms = elapsed.as_millis() as u64;

    if success {
        tracing::info!(command, duration_ms, "command_execution_success");
    } else {
        tracing::warn!(command, duration_ms, "command_execution_failure");
    }
}
