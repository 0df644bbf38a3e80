//! Logging setup and the runtime's log sink.
//!
//! Everything logs through `tracing`. [`init_logging`] installs a `fmt`
//! subscriber filtered by `RUST_LOG` (default `info`); calling it again, as a
//! reload does, leaves the installed subscriber in place.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Installs the global subscriber. Returns `false` if one was already set.
pub fn init_logging() -> bool {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_thread_ids(true)
                .with_line_number(true)
                .with_target(false)
                .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339()),
        )
        .try_init()
        .is_ok()
}

/// A line-oriented sink for lifecycle messages.
pub trait LogSink: Send + Sync {
    fn print(&self, message: &str);

    /// Called once while draining, after the last message.
    fn flush(&self) {}
}

/// Forwards lines to `tracing` at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn print(&self, message: &str) {
        tracing::info!("{message}");
    }
}
