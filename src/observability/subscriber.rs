use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Filter used when neither `RUST_LOG` nor the host supplies one.
pub const DEFAULT_FILTER: &str = "imdone_plugins=info";

#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Invalid filter directive: {0}")]
    Filter(String),
    #[error("Failed to init subscriber: {0}")]
    Init(String),
}

fn build_filter(directives: Option<&str>) -> Result<EnvFilter, SubscriberError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(directives.unwrap_or(DEFAULT_FILTER))
        .map_err(|e| SubscriberError::Filter(e.to_string()))
}

/// Installs a global fmt subscriber. `RUST_LOG` takes precedence over
/// `directives`, which default to [`DEFAULT_FILTER`].
pub fn init_tracing_subscriber(directives: Option<&str>) -> Result<(), SubscriberError> {
    let env_filter = build_filter(directives)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| SubscriberError::Init(e.to_string()))
}
