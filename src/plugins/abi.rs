//! Exported symbols that mark a shared library as an imdone plugin.
//!
//! A plugin crate built as a `cdylib` registers its type with
//! [`declare_plugin!`](crate::declare_plugin):
//!
//! ```rust,ignore
//! use imdone_plugins::{Plugin, PluginContext, PluginError, PluginFactory, declare_plugin};
//!
//! pub struct Links;
//!
//! impl Plugin for Links {}
//!
//! impl PluginFactory for Links {
//!     fn create(_ctx: PluginContext) -> Result<Self, PluginError> {
//!         Ok(Links)
//!     }
//! }
//!
//! declare_plugin!(Links);
//! ```
//!
//! Host and plugin must be built with the same compiler and the same version
//! of this crate; the API version guards against the latter.

use std::sync::Arc;

use super::traits::PluginClass;

/// Bumped whenever the [`Plugin`](super::Plugin) trait changes shape.
pub const PLUGIN_API_VERSION: u32 = 1;

/// Symbol holding the library's `u32` API version.
pub const API_VERSION_SYMBOL: &[u8] = b"IMDONE_PLUGIN_API_VERSION\0";

/// Symbol of the [`ClassConstructor`].
pub const CLASS_SYMBOL: &[u8] = b"imdone_plugin_class\0";

/// Signature of the exported class constructor.
pub type ClassConstructor = fn() -> Arc<dyn PluginClass>;

/// Exports the marker symbols for a [`PluginFactory`](crate::PluginFactory)
/// type.
#[macro_export]
macro_rules! declare_plugin {
    ($plugin:ty) => {
        #[unsafe(no_mangle)]
        pub static IMDONE_PLUGIN_API_VERSION: u32 = $crate::plugins::abi::PLUGIN_API_VERSION;

        #[unsafe(no_mangle)]
        pub fn imdone_plugin_class() -> ::std::sync::Arc<dyn $crate::PluginClass> {
            ::std::sync::Arc::new($crate::NativeClass::<$plugin>::new())
        }
    };
}
