//! Prelude module for convenient imports.
//!
//! Re-exports what plugin authors and hosts reach for most often.
//!
//! # Usage
//!
//! ```rust
//! use imdone_plugins::prelude::*;
//! ```

// Core types
pub use crate::Error;
pub use crate::Result;

// Plugin authoring
pub use crate::plugins::{Plugin, PluginAction, PluginContext, PluginError, PluginFactory};

// Hosting
pub use crate::plugins::{
    ActionRef, BoardAction, CardAction, ModuleResolver, PluginEvent, PluginInfo, PluginManager,
    StaticResolver,
};
pub use crate::project::{Project, ProjectContext};
