//! Project configuration read by the plugin runtime.
//!
//! ```rust,no_run
//! use imdone_plugins::config::ProjectConfig;
//!
//! # async fn example() -> Result<(), imdone_plugins::config::ConfigError> {
//! let config = ProjectConfig::load("./my-board").await?;
//! if config.dev_mode {
//!     println!("plugins will hot reload");
//! }
//! # Ok(())
//! # }
//! ```

pub mod settings;

pub use settings::{CONFIG_DIR, CONFIG_FILE, ProjectConfig};

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading project configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be parsed
    #[error("Invalid configuration in {path}: {message}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
