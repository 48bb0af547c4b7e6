//! Plugin traits and types.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::PluginError;
use crate::project::ProjectContext;

/// Callback run when a user triggers a plugin-provided action.
pub type ActionFn = Arc<dyn Fn() -> Result<(), PluginError> + Send + Sync>;

/// Capability methods the dispatcher may call on a plugin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PluginHook {
    Destroy,
    GetSettingsSchema,
    OnBoardUpdate,
    OnBeforeBoardUpdate,
    OnTaskUpdate,
    GetCardProperties,
    GetCardActions,
    GetBoardActions,
}

impl PluginHook {
    pub fn all() -> &'static [PluginHook] {
        &[
            PluginHook::Destroy,
            PluginHook::GetSettingsSchema,
            PluginHook::OnBoardUpdate,
            PluginHook::OnBeforeBoardUpdate,
            PluginHook::OnTaskUpdate,
            PluginHook::GetCardProperties,
            PluginHook::GetCardActions,
            PluginHook::GetBoardActions,
        ]
    }
}

impl fmt::Display for PluginHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginHook::Destroy => write!(f, "destroy"),
            PluginHook::GetSettingsSchema => write!(f, "getSettingsSchema"),
            PluginHook::OnBoardUpdate => write!(f, "onBoardUpdate"),
            PluginHook::OnBeforeBoardUpdate => write!(f, "onBeforeBoardUpdate"),
            PluginHook::OnTaskUpdate => write!(f, "onTaskUpdate"),
            PluginHook::GetCardProperties => write!(f, "getCardProperties"),
            PluginHook::GetCardActions => write!(f, "getCardActions"),
            PluginHook::GetBoardActions => write!(f, "getBoardActions"),
        }
    }
}

/// An action offered on a card or on the board.
///
/// `fields` is what the UI renders (`title`, `icon`, ...); `run` is invoked
/// when the host replays the action.
#[derive(Clone)]
pub struct PluginAction {
    pub fields: Map<String, Value>,
    run: ActionFn,
}

impl PluginAction {
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() -> Result<(), PluginError> + Send + Sync + 'static,
    {
        Self {
            fields: Map::new(),
            run: Arc::new(run),
        }
    }

    pub fn titled<F>(title: impl Into<String>, run: F) -> Self
    where
        F: Fn() -> Result<(), PluginError> + Send + Sync + 'static,
    {
        Self::new(run).field("title", title.into())
    }

    /// Adds a display field. `action` is reserved for the dispatcher's
    /// annotation and is ignored.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        if key != "action" {
            self.fields.insert(key, value.into());
        }
        self
    }

    pub fn run(&self) -> Result<(), PluginError> {
        (self.run)()
    }
}

impl fmt::Debug for PluginAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginAction")
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

/// Lazily reads this plugin's settings from the project configuration.
#[derive(Clone)]
pub struct PluginSettings {
    project: Arc<dyn ProjectContext>,
    name: String,
}

impl PluginSettings {
    pub fn new(project: Arc<dyn ProjectContext>, name: impl Into<String>) -> Self {
        Self {
            project,
            name: name.into(),
        }
    }

    /// Package name the settings are keyed by.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current settings object; `{}` when nothing is configured.
    pub fn get(&self) -> Value {
        self.project.plugin_settings(&self.name)
    }
}

impl fmt::Debug for PluginSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginSettings")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Handed to a plugin class when it is instantiated.
#[derive(Clone, Debug)]
pub struct PluginContext {
    pub project: Arc<dyn ProjectContext>,
    pub settings: PluginSettings,
}

/// Trait for board plugins.
///
/// Every method has a no-op default, so a plugin only implements the hooks
/// it cares about. Errors and panics raised here are caught by the manager
/// and never reach the host or other plugins.
///
/// # Example
///
/// ```rust
/// use imdone_plugins::{Plugin, PluginAction, PluginError};
/// use serde_json::{Map, Value, json};
///
/// struct Estimates;
///
/// impl Plugin for Estimates {
///     fn card_properties(&self, _props: &Value) -> Result<Map<String, Value>, PluginError> {
///         let mut props = Map::new();
///         props.insert("estimate".into(), json!("3d"));
///         Ok(props)
///     }
///
///     fn card_actions(&self, _task: &Value) -> Result<Vec<PluginAction>, PluginError> {
///         Ok(vec![PluginAction::titled("Re-estimate", || Ok(()))])
///     }
/// }
/// ```
pub trait Plugin: Send + Sync {
    /// Teardown before the instance is dropped.
    fn destroy(&self) -> Result<(), PluginError> {
        Ok(())
    }

    /// JSON schema describing the plugin's settings, if it has any.
    fn settings_schema(&self) -> Result<Option<Value>, PluginError> {
        Ok(None)
    }

    fn on_board_update(&self, _lists: &[Value]) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_before_board_update(&self) -> Result<(), PluginError> {
        Ok(())
    }

    fn on_task_update(&self, _task: &Value) -> Result<(), PluginError> {
        Ok(())
    }

    fn card_properties(&self, _props: &Value) -> Result<Map<String, Value>, PluginError> {
        Ok(Map::new())
    }

    fn card_actions(&self, _task: &Value) -> Result<Vec<PluginAction>, PluginError> {
        Ok(Vec::new())
    }

    fn board_actions(&self) -> Result<Vec<PluginAction>, PluginError> {
        Ok(Vec::new())
    }
}

/// A loadable plugin type. The class is kept for the plugin's lifetime so
/// it can be instantiated again.
pub trait PluginClass: Send + Sync {
    /// Declared type name; becomes the descriptor identity.
    fn type_name(&self) -> &str;

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError>;
}

/// Plugins constructed from their context, usable with
/// [`NativeClass`] and `StaticResolver::register`.
pub trait PluginFactory: Plugin + Sized + 'static {
    fn create(ctx: PluginContext) -> Result<Self, PluginError>;
}

/// [`PluginClass`] for a compiled-in [`PluginFactory`] type.
pub struct NativeClass<P> {
    type_name: &'static str,
    _plugin: PhantomData<fn() -> P>,
}

impl<P: PluginFactory> NativeClass<P> {
    pub fn new() -> Self {
        let full = std::any::type_name::<P>();
        let type_name = full.rsplit("::").next().unwrap_or(full);
        Self {
            type_name,
            _plugin: PhantomData,
        }
    }
}

impl<P: PluginFactory> Default for NativeClass<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PluginFactory> PluginClass for NativeClass<P> {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(P::create(ctx)?))
    }
}

type Constructor = dyn Fn(PluginContext) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync;

/// [`PluginClass`] built from a closure.
pub struct FnPluginClass {
    type_name: String,
    construct: Box<Constructor>,
}

impl FnPluginClass {
    pub fn new<F>(type_name: impl Into<String>, construct: F) -> Self
    where
        F: Fn(PluginContext) -> Result<Box<dyn Plugin>, PluginError> + Send + Sync + 'static,
    {
        Self {
            type_name: type_name.into(),
            construct: Box::new(construct),
        }
    }
}

impl PluginClass for FnPluginClass {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn instantiate(&self, ctx: PluginContext) -> Result<Box<dyn Plugin>, PluginError> {
        (self.construct)(ctx)
    }
}

impl fmt::Debug for FnPluginClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPluginClass")
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProjectConfig;
    use crate::project::Project;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Quiet;

    impl Plugin for Quiet {}

    impl PluginFactory for Quiet {
        fn create(_ctx: PluginContext) -> Result<Self, PluginError> {
            Ok(Quiet)
        }
    }

    fn context(config: ProjectConfig, name: &str) -> PluginContext {
        let project: Arc<dyn ProjectContext> = Arc::new(Project::new("/board", config));
        PluginContext {
            settings: PluginSettings::new(project.clone(), name),
            project,
        }
    }

    #[test]
    fn test_hook_display() {
        assert_eq!(PluginHook::OnBoardUpdate.to_string(), "onBoardUpdate");
        assert_eq!(PluginHook::GetCardActions.to_string(), "getCardActions");
        assert_eq!(PluginHook::all().len(), 8);
    }

    #[test]
    fn test_default_hooks_are_noops() {
        let plugin = Quiet;
        assert!(plugin.destroy().is_ok());
        assert!(plugin.settings_schema().unwrap().is_none());
        assert!(plugin.card_properties(&json!({})).unwrap().is_empty());
        assert!(plugin.card_actions(&json!({})).unwrap().is_empty());
        assert!(plugin.board_actions().unwrap().is_empty());
    }

    #[test]
    fn test_native_class_type_name() {
        let class = NativeClass::<Quiet>::new();
        assert_eq!(class.type_name(), "Quiet");
        assert!(class.instantiate(context(ProjectConfig::default(), "quiet")).is_ok());
    }

    #[test]
    fn test_action_fields_and_run() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let action = PluginAction::titled("Open", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .field("icon", "link")
        .field("action", "ignored");

        assert_eq!(action.fields.get("title"), Some(&json!("Open")));
        assert_eq!(action.fields.get("icon"), Some(&json!("link")));
        assert!(!action.fields.contains_key("action"));

        action.run().unwrap();
        action.run().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_settings_follow_project_config() {
        let ctx = context(
            ProjectConfig::default().with_plugin_settings("epics", json!({"limit": 3})),
            "epics",
        );
        assert_eq!(ctx.settings.name(), "epics");
        assert_eq!(ctx.settings.get(), json!({"limit": 3}));

        let ctx = context(ProjectConfig::default(), "other");
        assert_eq!(ctx.settings.get(), json!({}));
    }
}
