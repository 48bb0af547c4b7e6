//! Capability dispatch: fans host events out to every loaded plugin.
//!
//! Plugins are visited in registration order. A plugin that returns an
//! error or panics is logged with its identity and the hook name, then
//! skipped; the remaining plugins still run and the host never sees the
//! failure.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::guard::{call_guarded, log_plugin_error, teardown};
use super::manager::PluginManager;
use super::manifest::PluginInfo;
use super::store::PluginDescriptor;
use super::traits::{Plugin, PluginAction, PluginHook};
use super::{PluginError, Result};
use crate::observability::HookSpan;

/// Points back at the plugin action a UI item was built from.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActionRef {
    pub plugin: String,
    pub index: usize,
}

/// A card action annotated with the plugin that offered it.
///
/// Serializes as the action's own fields plus `action: {plugin, index}`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CardAction {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub action: ActionRef,
}

/// A board action annotated with the plugin that offered it.
///
/// Serializes as the action's own fields plus top-level `plugin` and
/// `index`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BoardAction {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub plugin: String,
    pub index: usize,
}

impl BoardAction {
    pub fn action_ref(&self) -> ActionRef {
        ActionRef {
            plugin: self.plugin.clone(),
            index: self.index,
        }
    }
}

impl PluginManager {
    async fn dispatch<T, F>(&self, hook: PluginHook, mut call: F) -> Vec<(String, T)>
    where
        F: FnMut(&dyn Plugin) -> Result<T>,
    {
        let store = self.inner.store.read().await;
        let mut hook_span = HookSpan::new(hook);
        let span = hook_span.span().clone();
        let mut results = Vec::with_capacity(store.len());

        {
            let _entered = span.enter();
            for descriptor in store.iter() {
                match call_guarded(|| call(descriptor.instance())) {
                    Ok(value) => results.push((descriptor.identity().to_string(), value)),
                    Err(e) => {
                        hook_span.record_failure();
                        log_plugin_error(hook, descriptor.identity(), &e);
                    }
                }
            }
        }

        hook_span.finish(store.len());
        results
    }

    /// Notifies plugins that the board changed. Returns `lists` unchanged;
    /// an empty list set is not dispatched.
    pub async fn on_board_update(&self, lists: Vec<Value>) -> Vec<Value> {
        if lists.is_empty() {
            return lists;
        }
        self.dispatch(PluginHook::OnBoardUpdate, |plugin| {
            plugin.on_board_update(&lists)
        })
        .await;
        lists
    }

    pub async fn on_before_board_update(&self) {
        self.dispatch(PluginHook::OnBeforeBoardUpdate, |plugin| {
            plugin.on_before_board_update()
        })
        .await;
    }

    pub async fn on_task_update(&self, task: &Value) {
        self.dispatch(PluginHook::OnTaskUpdate, |plugin| plugin.on_task_update(task))
            .await;
    }

    /// Merges every plugin's card properties into one map. Keys from later
    /// plugins override earlier ones.
    pub async fn get_card_properties(&self, props: &Value) -> Map<String, Value> {
        let mut merged = Map::new();
        for (_, properties) in self
            .dispatch(PluginHook::GetCardProperties, |plugin| {
                plugin.card_properties(props)
            })
            .await
        {
            merged.extend(properties);
        }
        merged
    }

    /// Collects card actions from every plugin. Each carries the offering
    /// plugin's identity and its index within that plugin's list.
    pub async fn get_card_actions(&self, task: &Value) -> Vec<CardAction> {
        let mut actions = Vec::new();
        for (identity, offered) in self
            .dispatch(PluginHook::GetCardActions, |plugin| plugin.card_actions(task))
            .await
        {
            actions.extend(offered.into_iter().enumerate().map(|(index, action)| {
                CardAction {
                    fields: action.fields,
                    action: ActionRef {
                        plugin: identity.clone(),
                        index,
                    },
                }
            }));
        }
        actions
    }

    pub async fn get_board_actions(&self) -> Vec<BoardAction> {
        let mut actions = Vec::new();
        for (identity, offered) in self
            .dispatch(PluginHook::GetBoardActions, |plugin| plugin.board_actions())
            .await
        {
            actions.extend(
                offered
                    .into_iter()
                    .enumerate()
                    .map(|(index, action)| BoardAction {
                        fields: action.fields,
                        plugin: identity.clone(),
                        index,
                    }),
            );
        }
        actions
    }

    /// Re-asks the plugin for its card actions on `task` and runs the one at
    /// `action.index`. Returns whether the action ran successfully.
    pub async fn perform_card_action(&self, action: &ActionRef, task: &Value) -> bool {
        self.perform(action, PluginHook::GetCardActions, |plugin| {
            plugin.card_actions(task)
        })
        .await
    }

    pub async fn perform_board_action(&self, action: &ActionRef) -> bool {
        self.perform(action, PluginHook::GetBoardActions, |plugin| {
            plugin.board_actions()
        })
        .await
    }

    async fn perform<F>(&self, action: &ActionRef, hook: PluginHook, offered: F) -> bool
    where
        F: FnOnce(&dyn Plugin) -> Result<Vec<PluginAction>>,
    {
        let selected = {
            let store = self.inner.store.read().await;
            let Some(descriptor) = store.get(&action.plugin) else {
                tracing::warn!(plugin = %action.plugin, hook = %hook, "No plugin for action");
                return false;
            };
            call_guarded(|| {
                offered(descriptor.instance())?
                    .into_iter()
                    .nth(action.index)
                    .ok_or_else(|| {
                        PluginError::hook(format!("no action at index {}", action.index))
                    })
            })
        };

        // The store lock is released so the callback may call back into
        // the manager.
        match selected.and_then(|selected| call_guarded(|| selected.run())) {
            Ok(()) => true,
            Err(e) => {
                log_plugin_error(hook, &action.plugin, &e);
                false
            }
        }
    }

    /// Metadata of every loaded plugin, with `schema` taken from the
    /// plugin's settings schema and stamped with an `id` and `title`.
    pub async fn get_plugins(&self) -> Vec<PluginInfo> {
        let store = self.inner.store.read().await;
        store.iter().map(describe).collect()
    }

    /// Stops dev mode, then calls `destroy` once on every plugin and empties
    /// the store. Returns how many plugins were destroyed.
    pub async fn destroy_plugins(&self) -> usize {
        self.stop_dev_mode();
        let drained = self.inner.store.write().await.drain();
        for descriptor in &drained {
            teardown(descriptor);
        }
        if !drained.is_empty() {
            tracing::debug!(count = drained.len(), "Destroyed plugins");
        }
        drained.len()
    }
}

fn describe(descriptor: &PluginDescriptor) -> PluginInfo {
    let mut info = descriptor.info().clone();
    match call_guarded(|| descriptor.instance().settings_schema()) {
        Ok(Some(mut schema)) => {
            if let Value::Object(fields) = &mut schema {
                fields.insert("id".into(), Value::String(info.name.clone()));
                fields.insert(
                    "title".into(),
                    Value::String(format!("{} settings", info.name)),
                );
            }
            info.schema = Some(schema);
        }
        Ok(None) => {}
        Err(e) => log_plugin_error(PluginHook::GetSettingsSchema, descriptor.identity(), &e),
    }
    info
}
