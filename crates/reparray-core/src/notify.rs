//! Change notification for authorities and replicas.
//!
//! Replicas catch up through a fixed sequence of [`Phase`]s per received
//! delta batch:
//!
//! ```text
//! PreRemove ──► Apply ──► PostAdd ──► PostChange ──► PostReceive
//!  per removed   sequence   per added   per changed    once per batch
//!  entry         edit only  entry       entry          (previous size)
//! ```
//!
//! Authorities emit [`ArrayEvent`]s synchronously once an operation has
//! completed instead.
//!
//! Callbacks are synchronous and must not mutate the array they are
//! observing. This is not guarded against.

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryGuid};

/// One step of replica-side delta application. Phases are totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    PreRemove,
    Apply,
    PostAdd,
    PostChange,
    PostReceive,
}

impl Phase {
    /// Every phase, in the order they run.
    pub const ALL: [Phase; 5] = [
        Phase::PreRemove,
        Phase::Apply,
        Phase::PostAdd,
        Phase::PostChange,
        Phase::PostReceive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreRemove => "pre_remove",
            Self::Apply => "apply",
            Self::PostAdd => "post_add",
            Self::PostChange => "post_change",
            Self::PostReceive => "post_receive",
        }
    }
}

/// A callback delivered to a [`ReplicaNotifier`].
#[derive(Debug, Clone, Copy)]
pub enum ReplicaEvent<'a> {
    /// The entry is about to be removed. Its index keys are already gone.
    PreRemove(&'a Entry),
    /// A new entry now sits at its position with repaired indices.
    PostAdd(&'a Entry),
    /// An existing entry was replaced in place.
    PostChange { entry: &'a Entry, previous: &'a Entry },
    /// The whole batch has been applied.
    PostReceive { previous_len: usize },
}

impl ReplicaEvent<'_> {
    pub fn phase(&self) -> Phase {
        match self {
            Self::PreRemove(_) => Phase::PreRemove,
            Self::PostAdd(_) => Phase::PostAdd,
            Self::PostChange { .. } => Phase::PostChange,
            Self::PostReceive { .. } => Phase::PostReceive,
        }
    }
}

/// Receives the phase callbacks while a replica applies a delta batch.
pub trait ReplicaNotifier {
    fn on_phase(&mut self, event: ReplicaEvent<'_>);
}

/// Notifier that ignores every phase.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ReplicaNotifier for NoopNotifier {
    fn on_phase(&mut self, _event: ReplicaEvent<'_>) {}
}

impl<F> ReplicaNotifier for F
where
    F: FnMut(ReplicaEvent<'_>),
{
    fn on_phase(&mut self, event: ReplicaEvent<'_>) {
        self(event)
    }
}

/// Events emitted outward by an authority, and re-emitted by replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayEvent {
    EntryAdded(Entry),
    EntryChanged(Entry),
    EntryRemoved(Entry),
    /// Order changed through sorting; the whole array must be re-read.
    FullArraySorted,
    /// The array was emptied. No per-entry removals accompany this.
    FullArrayEmptied,
    /// A replica finished applying a batch.
    BatchReceived { previous_len: usize, len: usize },
}

impl ArrayEvent {
    pub fn guid(&self) -> Option<EntryGuid> {
        match self {
            Self::EntryAdded(e) | Self::EntryChanged(e) | Self::EntryRemoved(e) => Some(e.guid()),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntryAdded(_) => "added",
            Self::EntryChanged(_) => "changed",
            Self::EntryRemoved(_) => "removed",
            Self::FullArraySorted => "sorted",
            Self::FullArrayEmptied => "emptied",
            Self::BatchReceived { .. } => "batch_received",
        }
    }
}

/// Trait for observing array changes.
///
/// Called after the operation that produced the event has completed, so
/// the array is consistent when the observer runs.
pub trait ArrayObserver: Send + Sync {
    fn on_event(&self, array: &str, event: &ArrayEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{Payload, TypeTag};

    #[test]
    fn phases_are_totally_ordered() {
        let mut sorted = Phase::ALL;
        sorted.sort();
        assert_eq!(sorted, Phase::ALL);
        assert!(Phase::PreRemove < Phase::PostReceive);
    }

    #[test]
    fn events_report_their_phase() {
        let entry = Entry::new(Payload::from("x"), TypeTag::new("T"), EntryGuid::new(), "a");
        assert_eq!(ReplicaEvent::PreRemove(&entry).phase(), Phase::PreRemove);
        assert_eq!(ReplicaEvent::PostAdd(&entry).phase(), Phase::PostAdd);
        assert_eq!(
            ReplicaEvent::PostChange {
                entry: &entry,
                previous: &entry
            }
            .phase(),
            Phase::PostChange
        );
        assert_eq!(
            ReplicaEvent::PostReceive { previous_len: 0 }.phase(),
            Phase::PostReceive
        );
    }

    #[test]
    fn closures_are_notifiers() {
        let mut seen = Vec::new();
        let mut notifier = |event: ReplicaEvent<'_>| seen.push(event.phase());
        notifier.on_phase(ReplicaEvent::PostReceive { previous_len: 3 });
        assert_eq!(seen, vec![Phase::PostReceive]);
    }

    #[test]
    fn array_event_exposes_guid() {
        let guid = EntryGuid::new();
        let entry = Entry::new(Payload::from("x"), TypeTag::new("T"), guid, "a");
        assert_eq!(ArrayEvent::EntryAdded(entry).guid(), Some(guid));
        assert_eq!(ArrayEvent::FullArrayEmptied.guid(), None);
        assert_eq!(ArrayEvent::FullArraySorted.kind(), "sorted");
    }
}
