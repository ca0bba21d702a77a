//! Observers for array and registry changes.
//!
//! [`ArrayObserver`] comes from the core crate and covers per-array events.
//! [`RegistryObserver`] covers arrays being added to or deleted from the
//! registry.

use reparray_core::{ArrayEvent, ArrayObserver};
use tracing::{debug, info};

/// Trait for observing the set of hosted arrays.
///
/// Methods are called by [`ArrayRegistry`](super::ArrayRegistry) after the
/// registry has been updated.
pub trait RegistryObserver: Send + Sync {
    /// Called when an array is created.
    fn on_array_added(&self, name: &str);

    /// Called when an array is deleted.
    fn on_array_deleted(&self, name: &str);
}

/// Observer that writes every event to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingObserver;

impl ArrayObserver for LoggingObserver {
    fn on_event(&self, array: &str, event: &ArrayEvent) {
        match event {
            ArrayEvent::EntryAdded(entry)
            | ArrayEvent::EntryChanged(entry)
            | ArrayEvent::EntryRemoved(entry) => {
                debug!(
                    array = %array,
                    kind = event.kind(),
                    guid = %entry.guid(),
                    identifier = %entry.identifier(),
                    position = entry.position(),
                    "Entry event"
                );
            }
            ArrayEvent::FullArraySorted | ArrayEvent::FullArrayEmptied => {
                info!(array = %array, kind = event.kind(), "Full array event");
            }
            ArrayEvent::BatchReceived { previous_len, len } => {
                debug!(array = %array, previous_len, len, "Batch received");
            }
        }
    }
}

impl RegistryObserver for LoggingObserver {
    fn on_array_added(&self, name: &str) {
        info!(array = %name, "Array added");
    }

    fn on_array_deleted(&self, name: &str) {
        info!(array = %name, "Array deleted");
    }
}
