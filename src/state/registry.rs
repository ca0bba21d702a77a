//! Named collection of array hosts.
//!
//! The `ArrayRegistry` maps array names to their [`ArrayHost`]. Hosts are
//! shared as `Arc`s so replication links and the HTTP layer can hold them
//! independently of the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use reparray_core::{ArrayObserver, NameGenerator, PayloadDecoder};
use tracing::debug;

use super::host::{ArrayHost, HostParams, HostSettings};
use super::observer::RegistryObserver;
use crate::error::RegistryError;
use crate::metrics;

/// Word tables and seed shared by every hosted array's name generator.
#[derive(Debug, Clone, Default)]
pub struct NameTables {
    /// Empty tables select the built-in words.
    pub adjectives: Vec<String>,
    pub names: Vec<String>,
    /// Base seed. Each array derives its own from this and its creation order.
    pub seed: Option<u64>,
}

impl NameTables {
    fn generator(&self, ordinal: u64) -> NameGenerator {
        let seed = self.seed.map(|s| s.wrapping_add(ordinal));
        if self.adjectives.is_empty() || self.names.is_empty() {
            NameGenerator::new(seed)
        } else {
            NameGenerator::with_tables(self.adjectives.clone(), self.names.clone(), seed)
        }
    }
}

/// Registry of hosted arrays.
pub struct ArrayRegistry {
    arrays: DashMap<String, Arc<ArrayHost>>,
    tables: NameTables,
    decoder: Arc<dyn PayloadDecoder>,
    array_observers: Vec<Arc<dyn ArrayObserver>>,
    registry_observers: Vec<Arc<dyn RegistryObserver>>,
    created: AtomicU64,
}

impl ArrayRegistry {
    pub fn new(tables: NameTables, decoder: Arc<dyn PayloadDecoder>) -> Self {
        Self {
            arrays: DashMap::new(),
            tables,
            decoder,
            array_observers: Vec::new(),
            registry_observers: Vec::new(),
            created: AtomicU64::new(0),
        }
    }

    /// Attach an observer to every array created from now on.
    pub fn with_array_observer(mut self, observer: Arc<dyn ArrayObserver>) -> Self {
        self.array_observers.push(observer);
        self
    }

    pub fn with_registry_observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
        self.registry_observers.push(observer);
        self
    }

    /// Create and host a new array.
    pub fn add_array(
        &self,
        name: &str,
        settings: HostSettings,
    ) -> Result<Arc<ArrayHost>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let host = match self.arrays.entry(name.to_string()) {
            MapEntry::Occupied(_) => return Err(RegistryError::AlreadyExists(name.to_string())),
            MapEntry::Vacant(slot) => {
                let ordinal = self.created.fetch_add(1, Ordering::Relaxed);
                let host = Arc::new(ArrayHost::new(HostParams {
                    name: name.to_string(),
                    settings,
                    names: self.tables.generator(ordinal),
                    decoder: Arc::clone(&self.decoder),
                }));
                for observer in &self.array_observers {
                    host.add_observer(Arc::clone(observer));
                }
                slot.insert(Arc::clone(&host));
                host
            }
        };

        metrics::set_hosted_arrays(self.arrays.len());
        metrics::set_entries(name, 0);
        for observer in &self.registry_observers {
            observer.on_array_added(name);
        }
        Ok(host)
    }

    /// Stop hosting an array. Outstanding handles see it as deleted.
    pub fn delete_array(&self, name: &str) -> Result<Arc<ArrayHost>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        let (_, host) = self
            .arrays
            .remove(name)
            .ok_or_else(|| RegistryError::NoSuchArray(name.to_string()))?;
        host.mark_deleted();

        metrics::set_hosted_arrays(self.arrays.len());
        metrics::remove_array_metrics(name);
        debug!(array = %name, entries = host.len(), "Array dropped from registry");
        for observer in &self.registry_observers {
            observer.on_array_deleted(name);
        }
        Ok(host)
    }

    pub fn get_array(&self, name: &str) -> Result<Arc<ArrayHost>, RegistryError> {
        if name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        self.arrays
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::NoSuchArray(name.to_string()))
    }

    /// Every hosted array, ordered by name.
    pub fn arrays(&self) -> Vec<Arc<ArrayHost>> {
        let mut arrays: Vec<Arc<ArrayHost>> =
            self.arrays.iter().map(|e| Arc::clone(e.value())).collect();
        arrays.sort_by(|a, b| a.name().cmp(b.name()));
        arrays
    }

    /// Names of every hosted array, sorted.
    pub fn array_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.arrays.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reparray_core::{JsonPayloads, Payload, TypeTag};

    fn registry() -> ArrayRegistry {
        ArrayRegistry::new(
            NameTables {
                seed: Some(1),
                ..NameTables::default()
            },
            Arc::new(JsonPayloads),
        )
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl RegistryObserver for Recording {
        fn on_array_added(&self, name: &str) {
            self.0.lock().push(format!("+{name}"));
        }

        fn on_array_deleted(&self, name: &str) {
            self.0.lock().push(format!("-{name}"));
        }
    }

    #[test]
    fn add_get_delete_roundtrip() {
        let registry = registry();
        let host = registry.add_array("inventory", HostSettings::default()).unwrap();
        assert_eq!(host.name(), "inventory");
        assert!(Arc::ptr_eq(&host, &registry.get_array("inventory").unwrap()));

        let removed = registry.delete_array("inventory").unwrap();
        assert!(removed.is_deleted());
        assert!(registry.is_empty());
        assert_eq!(
            registry.get_array("inventory").unwrap_err(),
            RegistryError::NoSuchArray("inventory".into())
        );
    }

    #[test]
    fn empty_and_duplicate_names_rejected() {
        let registry = registry();
        assert_eq!(
            registry.add_array("", HostSettings::default()).unwrap_err(),
            RegistryError::EmptyName
        );
        registry.add_array("a", HostSettings::default()).unwrap();
        assert_eq!(
            registry.add_array("a", HostSettings::default()).unwrap_err(),
            RegistryError::AlreadyExists("a".into())
        );
        assert_eq!(
            registry.delete_array("missing").unwrap_err(),
            RegistryError::NoSuchArray("missing".into())
        );
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn names_are_listed_sorted() {
        let registry = registry();
        for name in ["quests", "inventory", "loot"] {
            registry.add_array(name, HostSettings::default()).unwrap();
        }
        assert_eq!(registry.array_names(), vec!["inventory", "loot", "quests"]);
        let hosts: Vec<String> = registry
            .arrays()
            .iter()
            .map(|h| h.name().to_string())
            .collect();
        assert_eq!(hosts, registry.array_names());
    }

    #[test]
    fn registry_observers_see_add_and_delete() {
        let recording = Arc::new(Recording::default());
        let registry = registry().with_registry_observer(recording.clone());
        registry.add_array("a", HostSettings::default()).unwrap();
        registry.delete_array("a").unwrap();
        assert_eq!(*recording.0.lock(), vec!["+a", "-a"]);
    }

    #[test]
    fn deleted_host_handle_rejects_mutation() {
        let registry = registry();
        let host = registry.add_array("a", HostSettings::default()).unwrap();
        registry.delete_array("a").unwrap();
        let err = host
            .add_object(Payload::from("{}"), TypeTag::new("Json"), 1)
            .unwrap_err();
        assert_eq!(err.error_code(), "array_deleted");
    }

    #[test]
    fn custom_tables_feed_generated_identifiers() {
        let registry = ArrayRegistry::new(
            NameTables {
                adjectives: vec!["Red".into()],
                names: vec!["Fox".into()],
                seed: Some(3),
            },
            Arc::new(JsonPayloads),
        );
        let host = registry.add_array("a", HostSettings::default()).unwrap();
        let entry = host
            .add_object(Payload::from("{}"), TypeTag::new("Json"), 1)
            .unwrap()
            .remove(0);
        assert_eq!(entry.identifier(), "RedRedFox");
    }
}
