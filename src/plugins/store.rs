//! In-memory descriptor store, ordered by registration.

use std::sync::Arc;

use super::PluginError;
use super::manifest::PluginInfo;
use super::traits::{Plugin, PluginClass};

/// A registered plugin: live instance, its class, and its metadata.
pub struct PluginDescriptor {
    pub(crate) identity: String,
    pub(crate) instance: Box<dyn Plugin>,
    pub(crate) class: Arc<dyn PluginClass>,
    pub(crate) info: PluginInfo,
}

impl PluginDescriptor {
    pub(crate) fn new(
        class: Arc<dyn PluginClass>,
        instance: Box<dyn Plugin>,
        info: PluginInfo,
    ) -> Self {
        Self {
            identity: class.type_name().to_string(),
            instance,
            class,
            info,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn instance(&self) -> &dyn Plugin {
        self.instance.as_ref()
    }

    pub fn class(&self) -> &Arc<dyn PluginClass> {
        &self.class
    }

    pub fn info(&self) -> &PluginInfo {
        &self.info
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }
}

impl std::fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("identity", &self.identity)
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

/// Outcome of a successful registration.
#[derive(Debug)]
pub(crate) enum Registered {
    New,
    /// Same identity from the same path; the previous descriptor is returned
    /// so its instance can be torn down.
    Replaced(PluginDescriptor),
}

#[derive(Debug, Default)]
pub struct DescriptorStore {
    entries: Vec<PluginDescriptor>,
}

impl DescriptorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a descriptor. An identity already held by a plugin from a
    /// different path is rejected and the candidate handed back.
    pub(crate) fn register(
        &mut self,
        descriptor: PluginDescriptor,
    ) -> Result<Registered, (PluginError, PluginDescriptor)> {
        let Some(pos) = self.position(&descriptor.identity) else {
            self.entries.push(descriptor);
            return Ok(Registered::New);
        };

        if self.entries[pos].info.path != descriptor.info.path {
            let err = PluginError::DuplicateIdentity {
                identity: descriptor.identity.clone(),
                existing: self.entries[pos].info.path.clone(),
                rejected: descriptor.info.path.clone(),
            };
            return Err((err, descriptor));
        }

        let previous = std::mem::replace(&mut self.entries[pos], descriptor);
        Ok(Registered::Replaced(previous))
    }

    pub fn get(&self, identity: &str) -> Option<&PluginDescriptor> {
        self.entries.iter().find(|d| d.identity == identity)
    }

    /// Looks up a descriptor by its package name.
    pub fn find_by_name(&self, name: &str) -> Option<&PluginDescriptor> {
        self.entries.iter().find(|d| d.info.name == name)
    }

    pub fn remove(&mut self, identity: &str) -> Option<PluginDescriptor> {
        let pos = self.position(identity)?;
        Some(self.entries.remove(pos))
    }

    /// Empties the store, yielding descriptors in registration order.
    pub fn drain(&mut self) -> Vec<PluginDescriptor> {
        std::mem::take(&mut self.entries)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginDescriptor> {
        self.entries.iter()
    }

    pub fn identities(&self) -> Vec<&str> {
        self.entries.iter().map(|d| d.identity.as_str()).collect()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.position(identity).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, identity: &str) -> Option<usize> {
        self.entries.iter().position(|d| d.identity == identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::traits::FnPluginClass;
    use std::path::Path;

    struct Noop;

    impl Plugin for Noop {}

    fn descriptor(type_name: &str, path: &str) -> PluginDescriptor {
        let class: Arc<dyn PluginClass> =
            Arc::new(FnPluginClass::new(type_name, |_| Ok(Box::new(Noop))));
        let mut info = PluginInfo::fallback(Path::new(path));
        info.name = format!("{}-pkg", type_name.to_lowercase());
        PluginDescriptor::new(class, Box::new(Noop), info)
    }

    #[test]
    fn test_register_preserves_order() {
        let mut store = DescriptorStore::new();
        store.register(descriptor("B", "/p/b")).unwrap();
        store.register(descriptor("A", "/p/a")).unwrap();
        store.register(descriptor("C", "/p/c")).unwrap();

        assert_eq!(store.identities(), vec!["B", "A", "C"]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn test_duplicate_identity_from_other_path_rejected() {
        let mut store = DescriptorStore::new();
        store.register(descriptor("Epic", "/p/one")).unwrap();

        let result = store.register(descriptor("Epic", "/p/two"));
        match result {
            Err((PluginError::DuplicateIdentity { identity, existing, rejected }, returned)) => {
                assert_eq!(identity, "Epic");
                assert_eq!(existing, Path::new("/p/one"));
                assert_eq!(rejected, Path::new("/p/two"));
                assert_eq!(returned.info().path, Path::new("/p/two"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("Epic").unwrap().info().path, Path::new("/p/one"));
    }

    #[test]
    fn test_same_path_replaces() {
        let mut store = DescriptorStore::new();
        store.register(descriptor("Epic", "/p/one")).unwrap();
        store.register(descriptor("Other", "/p/other")).unwrap();

        let outcome = store.register(descriptor("Epic", "/p/one")).unwrap();
        assert!(matches!(outcome, Registered::Replaced(ref d) if d.identity() == "Epic"));
        assert_eq!(store.identities(), vec!["Epic", "Other"]);
    }

    #[test]
    fn test_find_remove_drain() {
        let mut store = DescriptorStore::new();
        store.register(descriptor("A", "/p/a")).unwrap();
        store.register(descriptor("B", "/p/b")).unwrap();

        assert_eq!(store.find_by_name("b-pkg").unwrap().identity(), "B");
        assert!(store.find_by_name("missing").is_none());

        let removed = store.remove("A").unwrap();
        assert_eq!(removed.identity(), "A");
        assert!(!store.contains("A"));
        assert!(store.remove("A").is_none());

        let drained = store.drain();
        assert_eq!(drained.len(), 1);
        assert!(store.is_empty());
    }
}
