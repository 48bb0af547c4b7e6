//! # imdone-plugins
//!
//! Plugin runtime for the imdone task board.
//!
//! Loads board plugins from a project's `.imdone/plugins` directory, keeps
//! them isolated from one another and from the host, hot reloads them in
//! dev mode, installs and uninstalls them, and fans board events out to
//! every plugin.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imdone_plugins::{Plugin, PluginContext, PluginError, PluginFactory, PluginManager, Project, StaticResolver};
//! use serde_json::json;
//!
//! struct Epics;
//!
//! impl Plugin for Epics {}
//!
//! impl PluginFactory for Epics {
//!     fn create(_ctx: PluginContext) -> Result<Self, PluginError> {
//!         Ok(Epics)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), imdone_plugins::Error> {
//!     let project = Arc::new(Project::open("./my-board").await?);
//!     let manager = PluginManager::start(
//!         PluginManager::builder(project).resolver(StaticResolver::new().register::<Epics>("epics")),
//!     )
//!     .await?;
//!
//!     let actions = manager.get_card_actions(&json!({"text": "Ship it"})).await;
//!     println!("{} card actions", actions.len());
//!
//!     manager.destroy_plugins().await;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod observability;
pub mod plugins;
pub mod prelude;
pub mod project;

// Re-exports for convenience
pub use config::{ConfigError, ProjectConfig};
pub use plugins::{
    ActionRef, BoardAction, CardAction, FnPluginClass, ModuleExport, ModuleResolver, NativeClass,
    PackageFetcher, Plugin, PluginAction, PluginClass, PluginContext, PluginError, PluginEvent,
    PluginFactory, PluginHook, PluginInfo, PluginManager, PluginManagerBuilder, PluginSettings,
    StaticResolver, TarballFetcher,
};
#[cfg(feature = "dylib")]
pub use plugins::DylibResolver;
pub use project::{Project, ProjectContext};

/// Error type for imdone-plugins operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Loading, installing or removing a plugin failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Project configuration could not be read.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// Whether the failure came from plugin code rather than the runtime's
    /// own filesystem, network or configuration work.
    pub fn is_plugin_fault(&self) -> bool {
        match self {
            Error::Plugin(e) => !e.is_administrative(),
            Error::Config(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Opens the project at `path`, loads its plugins with `resolver` and starts
/// dev mode if the project enables it.
pub async fn open<R: ModuleResolver + 'static>(
    path: impl Into<std::path::PathBuf>,
    resolver: R,
) -> Result<PluginManager> {
    let project = std::sync::Arc::new(Project::open(path).await?);
    let manager = PluginManager::start(PluginManager::builder(project).resolver(resolver)).await?;
    Ok(manager)
}
