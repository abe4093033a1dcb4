//! Log output for arangraph programs.
//!
//! The library itself only emits spans and events. A binary calls
//! [`init_tracing`] once at startup to decide where they go.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Filter used when `RUST_LOG` is unset. The HTTP client stack stays at
/// `warn` so request chatter does not drown graph operations.
fn default_filter(level: Level) -> EnvFilter {
    EnvFilter::new(format!("{},hyper=warn,reqwest=warn", level.as_str()))
}

/// Send arangraph's logs to stderr, as text or one JSON object per line.
///
/// `level` applies only when `RUST_LOG` is unset. A subscriber installed
/// earlier, by this function or anything else, is kept.
pub fn init_tracing(json: bool, level: Level) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(level));
    let output = fmt::layer().with_writer(std::io::stderr).with_target(false);
    let output: Box<dyn Layer<Registry> + Send + Sync> = if json {
        Box::new(output.json())
    } else {
        Box::new(output)
    };

    tracing_subscriber::registry()
        .with(output)
        .with(filter)
        .try_init()
        .ok();
}
