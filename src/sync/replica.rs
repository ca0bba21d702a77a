//! Replica-side converging copy of a hosted array.
//!
//! A `ReplicaMirror` never mutates on its own. It applies the batches its
//! authority produced, keeps statistics from the phase callbacks, and
//! re-broadcasts the resulting events to local subscribers.

use std::sync::Arc;

use reparray_core::{
    ApplyReport, ArrayEvent, DeltaBatch, Entry, EntryGuid, IndexedArray, PayloadDecoder,
    PropertyStatistics, ReplicaEvent, ReplicaNotifier, StatisticsAggregator,
};
use tokio::sync::broadcast;
use tracing::{debug, trace};

use crate::metrics;

/// Folds phase callbacks into statistics and outgoing events.
struct MirrorNotifier<'a> {
    stats: &'a mut StatisticsAggregator,
    decoder: &'a dyn PayloadDecoder,
    events: &'a broadcast::Sender<ArrayEvent>,
}

impl MirrorNotifier<'_> {
    fn emit(&self, event: ArrayEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }
}

impl ReplicaNotifier for MirrorNotifier<'_> {
    fn on_phase(&mut self, event: ReplicaEvent<'_>) {
        trace!(phase = event.phase().as_str(), "Replica phase");
        match event {
            ReplicaEvent::PreRemove(entry) => {
                self.stats.on_entry_removed(entry, self.decoder);
                self.emit(ArrayEvent::EntryRemoved(entry.clone()));
            }
            ReplicaEvent::PostAdd(entry) => {
                self.stats.on_entry_added(entry, self.decoder);
                self.emit(ArrayEvent::EntryAdded(entry.clone()));
            }
            ReplicaEvent::PostChange { entry, previous } => {
                // Entries moved by a swap-remove arrive unchanged.
                if previous.payload() != entry.payload()
                    || previous.type_tag() != entry.type_tag()
                {
                    self.stats.on_entry_removed(previous, self.decoder);
                    self.stats.on_entry_added(entry, self.decoder);
                }
                self.emit(ArrayEvent::EntryChanged(entry.clone()));
            }
            ReplicaEvent::PostReceive { .. } => {}
        }
    }
}

/// A replica of one hosted array.
pub struct ReplicaMirror {
    array_name: String,
    array: IndexedArray,
    stats: StatisticsAggregator,
    decoder: Arc<dyn PayloadDecoder>,
    events: broadcast::Sender<ArrayEvent>,
}

impl ReplicaMirror {
    /// `event_capacity` bounds how far a slow subscriber may lag.
    pub fn new(
        array_name: impl Into<String>,
        decoder: Arc<dyn PayloadDecoder>,
        event_capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            array_name: array_name.into(),
            array: IndexedArray::new(),
            stats: StatisticsAggregator::new(),
            decoder,
            events,
        }
    }

    pub fn array_name(&self) -> &str {
        &self.array_name
    }

    /// Receive events produced while applying batches.
    pub fn subscribe(&self) -> broadcast::Receiver<ArrayEvent> {
        self.events.subscribe()
    }

    /// Apply one batch from the authority.
    pub fn apply(&mut self, batch: DeltaBatch) -> ApplyReport {
        let previous_len = self.array.len();
        let full = batch.is_full();
        let mut notifier = MirrorNotifier {
            stats: &mut self.stats,
            decoder: &*self.decoder,
            events: &self.events,
        };
        let report = self.array.apply_delta(batch, &mut notifier);

        metrics::record_batch_applied(&self.array_name, full, report.stale);
        if !report.stale {
            let len = self.array.len();
            let _ = self.events.send(ArrayEvent::BatchReceived { previous_len, len });
            debug!(
                array = %self.array_name,
                removed = report.removed,
                added = report.added,
                changed = report.changed,
                full = report.full,
                len,
                "Applied delta batch"
            );
        }
        report
    }

    pub fn len(&self) -> usize {
        self.array.len()
    }

    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    pub fn array_key(&self) -> u64 {
        self.array.array_key()
    }

    pub fn entries(&self) -> Vec<Entry> {
        self.array.entries()
    }

    pub fn get_by_guid(&self, guid: &EntryGuid) -> Option<Entry> {
        self.array.get_entry_by_guid(guid).ok()
    }

    pub fn get_by_identifier(&self, identifier: &str) -> Option<Entry> {
        self.array.get_entry_by_identifier(identifier).ok()
    }

    pub fn statistic(&self, property_name: &str) -> Option<PropertyStatistics> {
        self.stats.get(property_name).cloned()
    }

    pub fn statistics(&self) -> &[PropertyStatistics] {
        self.stats.records()
    }

    pub fn is_consistent(&self) -> bool {
        self.array.check_consistency().is_ok()
    }
}
