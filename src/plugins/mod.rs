//! Board plugin runtime: loading, hot reload, install and hook dispatch.
//!
//! Plugins are directories under the project's plugin directory, usually
//! with a `package.json` describing them. The code behind a directory is
//! found by a [`ModuleResolver`]: classes compiled into the host
//! ([`StaticResolver`]) or, with the `dylib` feature, shared libraries
//! (`DylibResolver`).
//!
//! # Directory Structure
//!
//! ```text
//! my-board/
//! └── .imdone/
//!     ├── config.yml          # devMode, plugins.<name> settings
//!     └── plugins/
//!         ├── epics/
//!         │   ├── package.json
//!         │   └── node_modules/   # ignored
//!         └── links -> ~/src/links
//! ```
//!
//! Every loaded plugin is registered under the type name of its class, its
//! *identity*. Hooks are dispatched to plugins in registration order:
//! built-ins first, then plugin directories sorted by name.

pub mod abi;
mod discovery;
mod dispatcher;
#[cfg(feature = "dylib")]
mod dylib;
mod error;
mod events;
mod fetch;
mod guard;
mod installer;
mod loader;
mod manager;
mod manifest;
mod resolver;
mod store;
mod traits;
mod watcher;

pub use discovery::PluginDiscovery;
pub use dispatcher::{ActionRef, BoardAction, CardAction};
#[cfg(feature = "dylib")]
#[cfg_attr(docsrs, doc(cfg(feature = "dylib")))]
pub use dylib::DylibResolver;
pub use error::{PluginError, Result};
pub use events::PluginEvent;
pub use fetch::{PackageFetcher, TarballFetcher};
pub use manager::{DEFAULT_DEBOUNCE, PluginManager, PluginManagerBuilder};
pub use manifest::PluginInfo;
pub use resolver::{ModuleExport, ModuleResolver, StaticResolver};
pub use store::{DescriptorStore, PluginDescriptor};
pub use traits::{
    ActionFn, FnPluginClass, NativeClass, Plugin, PluginAction, PluginClass, PluginContext,
    PluginFactory, PluginHook, PluginSettings,
};
