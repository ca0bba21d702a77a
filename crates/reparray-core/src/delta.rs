//! Delta batches: what an authority hands to the transport.
//!
//! A batch is either incremental (removed GUIDs plus copies of added or
//! changed entries) or a full snapshot. Reordering an array cannot be
//! expressed as a position delta, so sorts and clears produce a full batch.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::entry::{Entry, EntryGuid};

/// A set of structural changes ready for external transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaBatch {
    /// Authority replication key at the time the batch was taken.
    pub array_key: u64,
    pub kind: DeltaKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DeltaKind {
    Incremental {
        removed: Vec<EntryGuid>,
        upserted: Vec<Entry>,
    },
    /// Every live entry, in authority order.
    Full { items: Vec<Entry> },
}

impl DeltaBatch {
    pub fn is_full(&self) -> bool {
        matches!(self.kind, DeltaKind::Full { .. })
    }

    /// Number of entries or GUIDs carried.
    pub fn len(&self) -> usize {
        match &self.kind {
            DeltaKind::Incremental { removed, upserted } => removed.len() + upserted.len(),
            DeltaKind::Full { items } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match &self.kind {
            DeltaKind::Incremental { removed, upserted } => removed.is_empty() && upserted.is_empty(),
            // An empty snapshot still means "clear everything".
            DeltaKind::Full { .. } => false,
        }
    }
}

/// Result of applying a batch on a replica.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub removed: usize,
    pub added: usize,
    pub changed: usize,
    pub full: bool,
    /// The batch was older than what the replica already holds.
    pub stale: bool,
}

/// Dirty-state accumulated by an authority between flushes.
#[derive(Debug, Clone, Default)]
pub(crate) struct PendingDelta {
    upserted: Vec<EntryGuid>,
    upserted_set: HashSet<EntryGuid>,
    removed: Vec<EntryGuid>,
    full: bool,
}

impl PendingDelta {
    pub(crate) fn mark_upsert(&mut self, guid: EntryGuid) {
        if self.upserted_set.insert(guid) {
            self.upserted.push(guid);
        }
    }

    pub(crate) fn mark_removed(&mut self, guid: EntryGuid) {
        if self.upserted_set.remove(&guid) {
            self.upserted.retain(|g| *g != guid);
        }
        self.removed.push(guid);
    }

    pub(crate) fn mark_full(&mut self) {
        self.full = true;
    }

    pub(crate) fn is_full(&self) -> bool {
        self.full
    }

    pub(crate) fn is_empty(&self) -> bool {
        !self.full && self.upserted.is_empty() && self.removed.is_empty()
    }

    /// Drain into `(removed, upserted)` GUID lists.
    pub(crate) fn take(&mut self) -> (Vec<EntryGuid>, Vec<EntryGuid>) {
        let pending = std::mem::take(self);
        (pending.removed, pending.upserted)
    }
}
