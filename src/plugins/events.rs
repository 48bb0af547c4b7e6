use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub(super) const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Notifications raised when the plugin set changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "name")]
pub enum PluginEvent {
    #[serde(rename = "plugin-installed")]
    Installed(String),
    #[serde(rename = "plugin-uninstalled")]
    Uninstalled(String),
    /// Raised after every reload cycle, successful or not.
    #[serde(rename = "plugins-reloaded")]
    Reloaded,
}

impl PluginEvent {
    pub fn name(&self) -> &'static str {
        match self {
            PluginEvent::Installed(_) => "plugin-installed",
            PluginEvent::Uninstalled(_) => "plugin-uninstalled",
            PluginEvent::Reloaded => "plugins-reloaded",
        }
    }
}

impl std::fmt::Display for PluginEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginEvent::Installed(name) | PluginEvent::Uninstalled(name) => {
                write!(f, "{}({})", self.name(), name)
            }
            PluginEvent::Reloaded => write!(f, "{}", self.name()),
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct EventBus {
    sender: broadcast::Sender<PluginEvent>,
}

impl EventBus {
    pub(super) fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub(super) fn subscribe(&self) -> broadcast::Receiver<PluginEvent> {
        self.sender.subscribe()
    }

    /// Having no subscribers is not an error.
    pub(super) fn emit(&self, event: PluginEvent) {
        tracing::debug!(event = %event, "Plugin event");
        let _ = self.sender.send(event);
    }
}
