//! Structured tracing for the plugin runtime.
//!
//! Spans wrap plugin loading, hook dispatch and reload cycles so a host
//! subscriber can attribute log lines to the plugin that produced them.
//!
//! Enable the `subscriber` feature to let the host install a formatted
//! subscriber with an `EnvFilter`:
//!
//! ```toml
//! imdone-plugins = { version = "0.1", features = ["subscriber"] }
//! ```

mod spans;
#[cfg(feature = "subscriber")]
mod subscriber;

pub use spans::{HookSpan, install_span, load_span, reload_span};
#[cfg(feature = "subscriber")]
pub use subscriber::{DEFAULT_FILTER, SubscriberError, init_tracing_subscriber};
