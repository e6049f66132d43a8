//! Logging initialization
//!
//! One subscriber for the whole process, initialized once at startup.
//! `RUST_LOG` always takes precedence over the caller-supplied filter.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global tracing subscriber
///
/// Filter resolution order: `RUST_LOG` if set, then `filter` if given,
/// then `info`. Output goes to stderr in the human-readable format with
/// module targets included; ANSI colors respect `NO_COLOR`.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter.unwrap_or("info"))
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var("NO_COLOR").is_err()),
        )
        .with(env_filter)
        .init();
}
