//! Authority-side holder for one named array.
//!
//! The `ArrayHost` owns the [`IndexedArray`], its statistics and its name
//! generator behind a single lock: writers are serialized and readers get
//! value copies, so no half-applied operation is ever visible. Observers are
//! notified after the lock is released.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use reparray_core::{
    AddedEntry, ArrayError, ArrayEvent, ArrayObserver, DeltaBatch, DuplicateIdentifierPolicy,
    Entry, EntryGuid, IndexedArray, NameGenerator, Payload, PayloadDecoder, PropertyStatistics,
    StatisticsAggregator, TypeTag,
};
use tracing::{debug, error, info, warn};

use crate::config::ArrayConfig;
use crate::config::defaults::default_sortable_types;
use crate::error::{HostError, HostResult};
use crate::metrics;
use crate::telemetry::{OperationTimer, spans};

/// Per-array behavior settings.
#[derive(Debug, Clone)]
pub struct HostSettings {
    /// Property types accepted by [`ArrayHost::sort_by_property_name`].
    pub sortable_types: Vec<String>,
    pub duplicate_identifiers: DuplicateIdentifierPolicy,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            sortable_types: default_sortable_types(),
            duplicate_identifiers: DuplicateIdentifierPolicy::default(),
        }
    }
}

impl From<&ArrayConfig> for HostSettings {
    fn from(config: &ArrayConfig) -> Self {
        Self {
            sortable_types: config.sortable_types.clone(),
            duplicate_identifiers: config.duplicate_identifiers,
        }
    }
}

/// Everything needed to build an [`ArrayHost`].
pub struct HostParams {
    pub name: String,
    pub settings: HostSettings,
    pub names: NameGenerator,
    pub decoder: Arc<dyn PayloadDecoder>,
}

/// State guarded by the host lock.
struct HostState {
    array: IndexedArray,
    stats: StatisticsAggregator,
    names: NameGenerator,
}

impl HostState {
    /// Add `count` copies of `payload` under fresh GUIDs and unique names.
    ///
    /// All or nothing: a failure part way rolls back the entries added so far.
    fn add_copies(
        &mut self,
        payload: &Payload,
        type_tag: &TypeTag,
        count: usize,
        decoder: &dyn PayloadDecoder,
    ) -> Result<Vec<Entry>, ArrayError> {
        let HostState {
            array,
            stats,
            names,
        } = self;

        let mut added: Vec<AddedEntry> = Vec::with_capacity(count);
        for _ in 0..count {
            let identifier = names.unique(|name| array.contains_identifier(name));
            match array.add_entry(payload.clone(), type_tag.clone(), EntryGuid::new(), &identifier)
            {
                Ok(entry) => added.push(entry),
                Err(e) => {
                    for entry in &added {
                        if let Err(rollback) = array.remove_entry(&entry.guid) {
                            error!(
                                guid = %entry.guid,
                                error = %rollback,
                                "Failed to roll back partially added entry"
                            );
                        }
                    }
                    return Err(e);
                }
            }
        }

        let mut entries = Vec::with_capacity(added.len());
        for entry in &added {
            let entry = array.get_entry_by_guid(&entry.guid)?;
            stats.on_entry_added(&entry, decoder);
            entries.push(entry);
        }
        Ok(entries)
    }

    fn remove(&mut self, guid: &EntryGuid, decoder: &dyn PayloadDecoder) -> Result<Entry, ArrayError> {
        let removed = self.array.remove_entry(guid)?;
        self.stats.on_entry_removed(&removed, decoder);
        Ok(removed)
    }

    fn update(
        &mut self,
        guid: &EntryGuid,
        payload: Payload,
        type_tag: TypeTag,
        decoder: &dyn PayloadDecoder,
    ) -> Result<Entry, ArrayError> {
        let previous = self.array.update_entry(guid, payload, type_tag)?;
        let current = self.array.get_entry_by_guid(guid)?;
        // Same rule as replicas: an unchanged payload is not re-folded.
        if previous.payload() != current.payload()
            || previous.type_tag() != current.type_tag()
        {
            self.stats.on_entry_removed(&previous, decoder);
            self.stats.on_entry_added(&current, decoder);
        }
        Ok(current)
    }
}

/// The authority for one named array.
pub struct ArrayHost {
    name: String,
    state: RwLock<HostState>,
    decoder: Arc<dyn PayloadDecoder>,
    sortable_types: Vec<String>,
    observers: RwLock<Vec<Arc<dyn ArrayObserver>>>,
    deleted: AtomicBool,
}

impl ArrayHost {
    pub fn new(params: HostParams) -> Self {
        let HostParams {
            name,
            settings,
            names,
            decoder,
        } = params;
        Self {
            name,
            state: RwLock::new(HostState {
                array: IndexedArray::with_policy(settings.duplicate_identifiers),
                stats: StatisticsAggregator::new(),
                names,
            }),
            decoder,
            sortable_types: settings.sortable_types,
            observers: RwLock::new(Vec::new()),
            deleted: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn decoder(&self) -> Arc<dyn PayloadDecoder> {
        Arc::clone(&self.decoder)
    }

    /// Register an observer for authority-side events.
    pub fn add_observer(&self, observer: Arc<dyn ArrayObserver>) {
        self.observers.write().push(observer);
    }

    /// Mark the host as removed from its registry. Later mutations fail.
    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    // ========================================================================
    // Mutation
    // ========================================================================

    /// Add `count` entries carrying `payload`, each with a fresh GUID and a
    /// generated identifier. Succeeds only if every entry was added.
    pub fn add_object(
        &self,
        payload: Payload,
        type_tag: TypeTag,
        count: usize,
    ) -> HostResult<Vec<Entry>> {
        let _timer = OperationTimer::new("add");
        self.ensure_live()?;
        if count == 0 {
            return self.fail(HostError::ZeroCount);
        }

        let (result, len) = {
            let mut state = self.state.write();
            let result = state.add_copies(&payload, &type_tag, count, &*self.decoder);
            (result, state.array.len())
        };
        let entries = self.record(result)?;

        metrics::record_added(&self.name, entries.len());
        metrics::set_entries(&self.name, len);
        debug!(array = %self.name, count = entries.len(), len, "Objects added");
        self.notify(entries.iter().cloned().map(ArrayEvent::EntryAdded));
        Ok(entries)
    }

    /// Add one entry per non-empty line of `text`. Returns how many were added.
    pub fn preload_lines(&self, text: &str, type_tag: &TypeTag) -> HostResult<usize> {
        let _span = spans::array(&self.name).entered();
        let mut added = 0;
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            self.add_object(Payload::from(line), type_tag.clone(), 1)?;
            added += 1;
        }
        info!(array = %self.name, added, "Preloaded entries");
        Ok(added)
    }

    pub fn remove_entry(&self, guid: &EntryGuid) -> HostResult<Entry> {
        let _timer = OperationTimer::new("remove");
        self.ensure_live()?;
        let (result, len) = {
            let mut state = self.state.write();
            let result = state.remove(guid, &*self.decoder);
            (result, state.array.len())
        };
        let removed = self.record(result)?;

        metrics::record_removed(&self.name);
        metrics::set_entries(&self.name, len);
        self.notify([ArrayEvent::EntryRemoved(removed.clone())]);
        Ok(removed)
    }

    /// Replace an entry's payload. Returns the updated copy.
    pub fn update_entry(
        &self,
        guid: &EntryGuid,
        payload: Payload,
        type_tag: TypeTag,
    ) -> HostResult<Entry> {
        let _timer = OperationTimer::new("update");
        self.ensure_live()?;
        let result = self
            .state
            .write()
            .update(guid, payload, type_tag, &*self.decoder);
        let current = self.record(result)?;
        self.notify([ArrayEvent::EntryChanged(current.clone())]);
        Ok(current)
    }

    /// Empty the array and drop its statistics.
    pub fn clear(&self) -> HostResult<usize> {
        let _timer = OperationTimer::new("clear");
        self.ensure_live()?;
        let cleared = {
            let mut state = self.state.write();
            let cleared = state.array.len();
            state.array.clear();
            state.stats.clear();
            cleared
        };
        metrics::set_entries(&self.name, 0);
        info!(array = %self.name, cleared, "Array emptied");
        self.notify([ArrayEvent::FullArrayEmptied]);
        Ok(cleared)
    }

    /// Restore insertion order. The next batch is a full snapshot.
    pub fn sort_by_index(&self) -> HostResult<()> {
        let _timer = OperationTimer::new("sort_by_index");
        self.ensure_live()?;
        self.state.write().array.sort_by_index();
        debug!(array = %self.name, "Sorted by insertion order");
        self.notify([ArrayEvent::FullArraySorted]);
        Ok(())
    }

    /// Sort by the textual value of `property_name`, restricted to the
    /// configured sortable types. Returns how many entries moved.
    pub fn sort_by_property_name(&self, property_name: &str) -> HostResult<usize> {
        let _timer = OperationTimer::new("sort_by_property");
        let _span = spans::array(&self.name).entered();
        self.ensure_live()?;
        let result = self.state.write().array.sort_by_property_name(
            property_name,
            &self.sortable_types,
            &*self.decoder,
        );
        let moved = self.record(result)?;
        if moved > 0 {
            debug!(array = %self.name, property = property_name, moved, "Sorted by property");
            self.notify([ArrayEvent::FullArraySorted]);
        }
        Ok(moved)
    }

    /// Drain pending changes for the replication link.
    pub fn take_delta(&self) -> Option<DeltaBatch> {
        self.state.write().array.take_delta()
    }

    // ========================================================================
    // Queries (value copies)
    // ========================================================================

    pub fn get_by_guid(&self, guid: &EntryGuid) -> HostResult<Entry> {
        let result = self.state.read().array.get_entry_by_guid(guid);
        self.record(result)
    }

    pub fn get_by_identifier(&self, identifier: &str) -> HostResult<Entry> {
        let result = self.state.read().array.get_entry_by_identifier(identifier);
        self.record(result)
    }

    /// A uniformly chosen entry, drawn from the host's name generator.
    pub fn random_entry(&self) -> Option<Entry> {
        let mut state = self.state.write();
        let HostState { array, names, .. } = &mut *state;
        let position = names.pick(array.len())?;
        array.iter().nth(position).cloned()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.state.read().array.entries()
    }

    pub fn len(&self) -> usize {
        self.state.read().array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().array.is_empty()
    }

    pub fn array_key(&self) -> u64 {
        self.state.read().array.array_key()
    }

    pub fn statistics(&self) -> Vec<PropertyStatistics> {
        self.state.read().stats.records().to_vec()
    }

    pub fn statistic(&self, property_name: &str) -> Option<PropertyStatistics> {
        self.state.read().stats.get(property_name).cloned()
    }

    /// One line per tracked property.
    pub fn dump_statistics(&self) -> String {
        self.state.read().stats.dump()
    }

    pub fn check_consistency(&self) -> HostResult<()> {
        let result = self.state.read().array.check_consistency();
        self.record(result)
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn ensure_live(&self) -> HostResult<()> {
        if self.is_deleted() {
            return self.fail(HostError::Deleted(self.name.clone()));
        }
        Ok(())
    }

    /// Convert a core result, counting and logging failures.
    fn record<T>(&self, result: Result<T, ArrayError>) -> HostResult<T> {
        result.or_else(|e| self.fail(e.into()))
    }

    fn fail<T>(&self, err: HostError) -> HostResult<T> {
        metrics::record_error(&self.name, err.error_code());
        match &err {
            HostError::Array(ArrayError::IndexInconsistency { .. }) => {
                warn!(array = %self.name, error = %err, "Array operation aborted");
            }
            _ => debug!(array = %self.name, error = %err, "Array operation failed"),
        }
        Err(err)
    }

    fn notify(&self, events: impl IntoIterator<Item = ArrayEvent>) {
        let observers = self.observers.read().clone();
        if observers.is_empty() {
            return;
        }
        for event in events {
            for observer in &observers {
                observer.on_event(&self.name, &event);
            }
        }
    }
}

impl std::fmt::Debug for ArrayHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArrayHost")
            .field("name", &self.name)
            .field("len", &self.len())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use reparray_core::{DeltaKind, JsonPayloads};

    fn host(seed: u64) -> ArrayHost {
        ArrayHost::new(HostParams {
            name: "inventory".to_string(),
            settings: HostSettings::default(),
            names: NameGenerator::new(Some(seed)),
            decoder: Arc::new(JsonPayloads),
        })
    }

    fn json(text: &str) -> Payload {
        Payload::from(text)
    }

    fn tag() -> TypeTag {
        TypeTag::new("Json")
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    impl ArrayObserver for Recording {
        fn on_event(&self, array: &str, event: &ArrayEvent) {
            self.0.lock().push(format!("{array}:{}", event.kind()));
        }
    }

    // ========================================================================
    // add_object
    // ========================================================================

    #[test]
    fn add_object_creates_unique_identifiers() {
        let host = host(1);
        let entries = host.add_object(json(r#"{"hp": 3}"#), tag(), 3).unwrap();
        assert_eq!(entries.len(), 3);
        let mut ids: Vec<&str> = entries.iter().map(|e| e.identifier()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 3);
        assert_eq!(host.len(), 3);
        host.check_consistency().unwrap();
    }

    #[test]
    fn add_object_rejects_zero_count_and_empty_payload() {
        let host = host(1);
        assert_eq!(
            host.add_object(json("{}"), tag(), 0).unwrap_err(),
            HostError::ZeroCount
        );
        let err = host.add_object(Payload::default(), tag(), 2).unwrap_err();
        assert_eq!(err.error_code(), "invalid_argument");
        assert!(host.is_empty());
    }

    #[test]
    fn statistics_follow_adds_and_removes() {
        let host = host(2);
        let mut guids = Vec::new();
        for value in [10, 20, 5] {
            let entry = &host
                .add_object(json(&format!(r#"{{"value": {value}}}"#)), tag(), 1)
                .unwrap()[0];
            guids.push(entry.guid());
        }
        let stat = host.statistic("value").unwrap();
        assert_eq!(stat.count(), 3);
        assert_eq!(stat.sum(), 35.0);
        assert_eq!(stat.min(), 5.0);
        assert_eq!(stat.max(), 20.0);

        host.remove_entry(&guids[2]).unwrap();
        let stat = host.statistic("VALUE").unwrap();
        assert_eq!(stat.count(), 2);
        assert_eq!(stat.mean(), 15.0);
        assert_eq!(stat.min(), 10.0);
        assert_eq!(stat.max(), 20.0);
        assert_eq!(host.dump_statistics().lines().count(), 1);
    }

    #[test]
    fn update_refolds_statistics() {
        let host = host(3);
        let guid = host.add_object(json(r#"{"value": 4}"#), tag(), 1).unwrap()[0].guid();
        let updated = host.update_entry(&guid, json(r#"{"value": 6}"#), tag()).unwrap();
        assert_eq!(updated.payload(), &json(r#"{"value": 6}"#));
        let stat = host.statistic("value").unwrap();
        assert_eq!(stat.count(), 1);
        assert_eq!(stat.sum(), 6.0);
    }

    #[test]
    fn update_with_same_payload_keeps_statistics() {
        let host = host(3);
        let low = host.add_object(json(r#"{"value": 1}"#), tag(), 1).unwrap()[0].guid();
        host.add_object(json(r#"{"value": 5}"#), tag(), 1).unwrap();

        host.update_entry(&low, json(r#"{"value": 1}"#), tag()).unwrap();
        let stat = host.statistic("value").unwrap();
        assert_eq!(stat.count(), 2);
        assert_eq!(stat.min(), 1.0);
        assert_eq!(stat.first_value(), 1.0);
        assert_eq!(stat.last_value(), 5.0);
    }

    #[test]
    fn failed_add_object_leaves_nothing_behind() {
        let host = host(5);
        let key = host.array_key();
        assert!(host.add_object(Payload::default(), tag(), 3).is_err());
        assert_eq!(host.array_key(), key);
        assert!(host.take_delta().is_none());
        assert!(host.statistics().is_empty());
        host.check_consistency().unwrap();
    }

    #[test]
    fn clear_drops_entries_and_statistics() {
        let host = host(4);
        host.add_object(json(r#"{"value": 1}"#), tag(), 4).unwrap();
        host.take_delta();
        assert_eq!(host.clear().unwrap(), 4);
        assert!(host.is_empty());
        assert!(host.statistics().is_empty());
        let batch = host.take_delta().unwrap();
        assert!(matches!(batch.kind, DeltaKind::Full { ref items } if items.is_empty()));
    }

    // ========================================================================
    // Sorting and events
    // ========================================================================

    #[test]
    fn sorts_emit_full_array_event_and_full_batch() {
        let host = host(5);
        let recording = Arc::new(Recording::default());
        host.add_observer(recording.clone());

        for name in ["c", "a", "b"] {
            host.add_object(json(&format!(r#"{{"name": "{name}"}}"#)), tag(), 1)
                .unwrap();
        }
        host.take_delta();

        assert_eq!(host.sort_by_property_name("name").unwrap(), 3);
        let names: Vec<String> = host
            .entries()
            .iter()
            .map(|e| String::from_utf8_lossy(e.payload().as_bytes()).into_owned())
            .collect();
        assert!(names[0].contains("\"a\""));
        assert!(host.take_delta().unwrap().is_full());

        host.sort_by_index().unwrap();
        assert!(host.take_delta().unwrap().is_full());

        let events = recording.0.lock().clone();
        assert_eq!(
            events,
            vec![
                "inventory:added",
                "inventory:added",
                "inventory:added",
                "inventory:sorted",
                "inventory:sorted",
            ]
        );
    }

    #[test]
    fn sort_without_movement_emits_nothing() {
        let host = host(6);
        let recording = Arc::new(Recording::default());
        host.add_object(json(r#"{"name": "a"}"#), tag(), 1).unwrap();
        host.add_observer(recording.clone());
        assert_eq!(host.sort_by_property_name("name").unwrap(), 0);
        assert!(recording.0.lock().is_empty());
    }

    #[test]
    fn removal_and_clear_events_are_delivered() {
        let host = host(7);
        let recording = Arc::new(Recording::default());
        let guid = host.add_object(json("{}"), tag(), 1).unwrap()[0].guid();
        host.add_observer(recording.clone());
        host.remove_entry(&guid).unwrap();
        host.clear().unwrap();
        assert_eq!(
            *recording.0.lock(),
            vec!["inventory:removed", "inventory:emptied"]
        );
    }

    // ========================================================================
    // Queries
    // ========================================================================

    #[test]
    fn lookups_return_copies_and_report_misses() {
        let host = host(8);
        let entry = host.add_object(json("{}"), tag(), 1).unwrap().remove(0);
        assert_eq!(host.get_by_guid(&entry.guid()).unwrap(), entry);
        assert_eq!(host.get_by_identifier(entry.identifier()).unwrap(), entry);
        assert_eq!(
            host.get_by_identifier("nobody").unwrap_err().error_code(),
            "not_found"
        );
    }

    #[test]
    fn random_entry_is_seeded() {
        let a = host(9);
        let b = host(9);
        assert!(a.random_entry().is_none());
        a.add_object(json("{}"), tag(), 5).unwrap();
        b.add_object(json("{}"), tag(), 5).unwrap();
        let pick_a = a.random_entry().map(|e| e.identifier().to_string());
        let pick_b = b.random_entry().map(|e| e.identifier().to_string());
        assert!(pick_a.is_some());
        assert_eq!(pick_a, pick_b);
    }

    #[test]
    fn preload_adds_one_entry_per_line() {
        let host = host(10);
        let added = host
            .preload_lines("{\"hp\": 1}\n\n  {\"hp\": 2}  \n", &tag())
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(host.statistic("hp").unwrap().sum(), 3.0);
    }

    #[test]
    fn deleted_host_rejects_mutation() {
        let host = host(11);
        host.mark_deleted();
        assert_eq!(
            host.add_object(json("{}"), tag(), 1).unwrap_err(),
            HostError::Deleted("inventory".into())
        );
        assert!(host.clear().is_err());
    }
}
