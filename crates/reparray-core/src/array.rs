//! The indexed delta array.
//!
//! One owning sequence of [`Entry`] values plus two lookup maps
//! (GUID -> position, identifier -> position). Every public operation
//! updates all three together; nothing outside this module can touch one
//! without the others.
//!
//! After every completed operation, for each live entry `e` at position `p`:
//! `guid_index[e.guid] == p`, `identifier_index[e.identifier] == p` and
//! `items[p].position == p`.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::delta::{ApplyReport, DeltaBatch, DeltaKind, PendingDelta};
use crate::entry::{Entry, EntryGuid, Payload, TypeTag};
use crate::error::ArrayError;
use crate::notify::{Phase, ReplicaEvent, ReplicaNotifier};
use crate::payload::{PayloadDecoder, PropertyText};

/// What to do when an added identifier is already in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateIdentifierPolicy {
    /// Refuse the add.
    #[default]
    Reject,
    /// Repoint the identifier at the new entry. The older entry can then no
    /// longer be found by identifier.
    Overwrite,
}

/// Identity of a freshly added entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddedEntry {
    pub guid: EntryGuid,
    pub identifier: String,
    pub position: usize,
}

/// Ordered entries with GUID and identifier lookup.
#[derive(Debug, Clone, Default)]
pub struct IndexedArray {
    items: Vec<Entry>,
    guid_index: HashMap<EntryGuid, usize>,
    identifier_index: HashMap<String, usize>,
    next_insertion: u64,
    array_key: u64,
    pending: PendingDelta,
    policy: DuplicateIdentifierPolicy,
}

impl IndexedArray {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DuplicateIdentifierPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    pub fn policy(&self) -> DuplicateIdentifierPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Replication key, bumped on every structural change.
    pub fn array_key(&self) -> u64 {
        self.array_key
    }

    pub fn contains_guid(&self, guid: &EntryGuid) -> bool {
        self.guid_index.contains_key(guid)
    }

    pub fn contains_identifier(&self, identifier: &str) -> bool {
        self.identifier_index.contains_key(identifier)
    }

    /// Read-only iteration in current order.
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.items.iter()
    }

    /// Value copies of every entry in current order.
    pub fn entries(&self) -> Vec<Entry> {
        self.items.clone()
    }

    pub fn for_each(&self, mut f: impl FnMut(&Entry)) {
        for entry in &self.items {
            f(entry);
        }
    }

    // ========================================================================
    // Authoritative mutation
    // ========================================================================

    /// Append a new entry at the tail.
    ///
    /// An empty `identifier` defaults to the GUID string. Callers that want
    /// readable names generate them beforehand.
    pub fn add_entry(
        &mut self,
        payload: Payload,
        type_tag: TypeTag,
        guid: EntryGuid,
        identifier: &str,
    ) -> Result<AddedEntry, ArrayError> {
        if payload.is_empty() {
            return Err(ArrayError::InvalidArgument("payload is empty"));
        }
        if !type_tag.is_valid() {
            return Err(ArrayError::InvalidArgument("type tag is empty"));
        }
        if !guid.is_valid() {
            return Err(ArrayError::InvalidArgument("guid is nil"));
        }
        if self.guid_index.contains_key(&guid) {
            return Err(ArrayError::DuplicateGuid(guid.to_string()));
        }

        let mut entry = Entry::new(payload, type_tag, guid, identifier);
        if self.identifier_index.contains_key(&entry.identifier) {
            match self.policy {
                DuplicateIdentifierPolicy::Reject => {
                    return Err(ArrayError::DuplicateIdentifier(entry.identifier));
                }
                DuplicateIdentifierPolicy::Overwrite => {
                    warn!(identifier = %entry.identifier, "Identifier already in use, overwriting index entry");
                }
            }
        }

        self.items
            .try_reserve(1)
            .map_err(|_| ArrayError::CapacityExhausted)?;

        let position = self.items.len();
        entry.position = position;
        entry.insertion_order = self.next_insertion;
        entry.mark_dirty();
        self.next_insertion += 1;

        let added = AddedEntry {
            guid,
            identifier: entry.identifier.clone(),
            position,
        };
        self.guid_index.insert(guid, position);
        self.identifier_index.insert(added.identifier.clone(), position);
        self.items.push(entry);

        self.pending.mark_upsert(guid);
        self.array_key += 1;

        debug!(
            guid = %guid,
            identifier = %added.identifier,
            position,
            "Entry added"
        );
        Ok(added)
    }

    /// Remove an entry by swapping the last entry into its slot.
    ///
    /// Returns the removed entry. Insertion order is not preserved; use
    /// [`sort_by_index`](Self::sort_by_index) to restore it.
    pub fn remove_entry(&mut self, guid: &EntryGuid) -> Result<Entry, ArrayError> {
        if !guid.is_valid() {
            return Err(ArrayError::InvalidArgument("guid is nil"));
        }
        let position = self.locate(guid)?;

        if self.identifier_index.get(&self.items[position].identifier) == Some(&position) {
            self.identifier_index.remove(&self.items[position].identifier);
        }

        let mut removed = self.items.swap_remove(position);
        if let Some(moved) = self.items.get_mut(position) {
            moved.position = position;
            moved.mark_dirty();
            self.guid_index.insert(moved.guid, position);
            self.identifier_index.insert(moved.identifier.clone(), position);
            self.pending.mark_upsert(moved.guid);
            debug!(
                removed = %guid,
                moved = %moved.guid,
                position,
                "Entry swapped into removed slot"
            );
        }
        self.guid_index.remove(guid);
        removed.mark_dirty();

        self.pending.mark_removed(*guid);
        self.array_key += 1;

        debug!(guid = %guid, position, len = self.items.len(), "Entry removed");
        Ok(removed)
    }

    /// Replace an entry's payload in place. Returns the previous copy.
    pub fn update_entry(
        &mut self,
        guid: &EntryGuid,
        payload: Payload,
        type_tag: TypeTag,
    ) -> Result<Entry, ArrayError> {
        if payload.is_empty() {
            return Err(ArrayError::InvalidArgument("payload is empty"));
        }
        if !type_tag.is_valid() {
            return Err(ArrayError::InvalidArgument("type tag is empty"));
        }
        if !guid.is_valid() {
            return Err(ArrayError::InvalidArgument("guid is nil"));
        }
        let position = self.locate(guid)?;

        let entry = &mut self.items[position];
        let previous = entry.clone();
        entry.payload = payload;
        entry.type_tag = type_tag;
        entry.mark_dirty();

        self.pending.mark_upsert(*guid);
        self.array_key += 1;
        debug!(guid = %guid, position, "Entry updated in place");
        Ok(previous)
    }

    /// Empty the sequence and both indices.
    pub fn clear(&mut self) {
        let len = self.items.len();
        self.items.clear();
        self.guid_index.clear();
        self.identifier_index.clear();
        // Drop queued per-entry deltas; a full snapshot replaces them.
        self.pending = PendingDelta::default();
        self.pending.mark_full();
        self.array_key += 1;
        debug!(cleared = len, "Array cleared");
    }

    // ========================================================================
    // Lookup
    // ========================================================================

    /// Copy of the entry with `guid`.
    pub fn get_entry_by_guid(&self, guid: &EntryGuid) -> Result<Entry, ArrayError> {
        if !guid.is_valid() {
            return Err(ArrayError::InvalidArgument("guid is nil"));
        }
        let position = self.locate(guid)?;
        Ok(self.items[position].clone())
    }

    /// Copy of the entry with `identifier`.
    pub fn get_entry_by_identifier(&self, identifier: &str) -> Result<Entry, ArrayError> {
        if identifier.is_empty() {
            return Err(ArrayError::InvalidArgument("identifier is empty"));
        }
        let Some(&position) = self.identifier_index.get(identifier) else {
            debug!(identifier, "Identifier not in index");
            return Err(ArrayError::NotFound(identifier.to_string()));
        };
        match self.items.get(position) {
            Some(entry) if entry.identifier == identifier => Ok(entry.clone()),
            _ => Err(self.inconsistency(identifier, position)),
        }
    }

    /// Copy of a uniformly chosen entry.
    pub fn random_entry<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Entry> {
        if self.items.is_empty() {
            return None;
        }
        let position = rng.gen_range(0..self.items.len());
        self.items.get(position).cloned()
    }

    /// Position of `guid`, validated against the sequence.
    fn locate(&self, guid: &EntryGuid) -> Result<usize, ArrayError> {
        let Some(&position) = self.guid_index.get(guid) else {
            debug!(guid = %guid, "Guid not in index");
            return Err(ArrayError::NotFound(guid.to_string()));
        };
        match self.items.get(position) {
            Some(entry) if entry.guid == *guid => Ok(position),
            _ => Err(self.inconsistency(&guid.to_string(), position)),
        }
    }

    fn inconsistency(&self, key: &str, position: usize) -> ArrayError {
        error!(
            key,
            position,
            len = self.items.len(),
            "Index points at a stale or foreign position"
        );
        ArrayError::IndexInconsistency {
            key: key.to_string(),
            position,
            len: self.items.len(),
        }
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Restore insertion order and rebuild both indices.
    pub fn sort_by_index(&mut self) {
        self.items.sort_by_key(|e| e.insertion_order);
        self.rebuild_indices();
        self.pending.mark_full();
        self.array_key += 1;
    }

    /// Order entries by the textual export of `property_name`.
    ///
    /// Comparison is lexical on the exported text, also for numeric
    /// properties. Only entries that decode, carry the property, and whose
    /// property type is in `allowed_types` take part; entries of different
    /// property types are never compared. Each group of same-typed entries
    /// is sorted within the slots it already occupies, and every other entry
    /// stays where it is. Indices are rebuilt afterwards.
    ///
    /// Returns how many entries changed position.
    pub fn sort_by_property_name(
        &mut self,
        property_name: &str,
        allowed_types: &[String],
        decoder: &dyn PayloadDecoder,
    ) -> Result<usize, ArrayError> {
        if property_name.is_empty() {
            return Err(ArrayError::InvalidArgument("property name is empty"));
        }

        let keys: Vec<Option<PropertyText>> = self
            .items
            .iter()
            .map(|entry| {
                let value = decoder
                    .decode(&entry.payload, &entry.type_tag)
                    .map_err(|e| debug!(guid = %entry.guid, error = %e, "Sort skipped undecodable entry"))
                    .ok()?;
                let text = value.export_property(property_name)?;
                allowed_types
                    .iter()
                    .any(|t| *t == text.type_name)
                    .then_some(text)
            })
            .collect();

        // Slots per property type, ascending.
        let mut groups: HashMap<&str, Vec<usize>> = HashMap::new();
        for (slot, key) in keys.iter().enumerate() {
            if let Some(key) = key {
                groups.entry(key.type_name.as_str()).or_default().push(slot);
            }
        }

        let mut order: Vec<usize> = (0..self.items.len()).collect();
        for slots in groups.values() {
            let mut members = slots.clone();
            members.sort_by(|&a, &b| match (&keys[a], &keys[b]) {
                (Some(ka), Some(kb)) => ka.text.cmp(&kb.text),
                _ => Ordering::Equal,
            });
            for (&slot, &source) in slots.iter().zip(&members) {
                order[slot] = source;
            }
        }

        let moved = order.iter().enumerate().filter(|(dst, src)| dst != *src).count();
        if moved == 0 {
            return Ok(0);
        }

        let mut slots: Vec<Option<Entry>> = std::mem::take(&mut self.items)
            .into_iter()
            .map(Some)
            .collect();
        self.items = order
            .iter()
            .filter_map(|&source| slots[source].take())
            .collect();

        self.rebuild_indices();
        self.pending.mark_full();
        self.array_key += 1;
        debug!(property = property_name, moved, "Array sorted by property");
        Ok(moved)
    }

    /// Recompute both indices and every cached position from the sequence.
    pub fn rebuild_indices(&mut self) {
        self.guid_index.clear();
        self.identifier_index.clear();
        for (position, entry) in self.items.iter_mut().enumerate() {
            entry.position = position;
            self.guid_index.insert(entry.guid, position);
            self.identifier_index.insert(entry.identifier.clone(), position);
        }
    }

    /// Verify that the indices and cached positions agree with the sequence.
    pub fn check_consistency(&self) -> Result<(), ArrayError> {
        let len = self.items.len();
        for (position, entry) in self.items.iter().enumerate() {
            let guid_ok = self.guid_index.get(&entry.guid) == Some(&position);
            let identifier_ok = self.identifier_index.get(&entry.identifier) == Some(&position);
            if !guid_ok || !identifier_ok || entry.position != position {
                return Err(ArrayError::IndexInconsistency {
                    key: entry.guid.to_string(),
                    position,
                    len,
                });
            }
        }
        if self.guid_index.len() != len || self.identifier_index.len() != len {
            return Err(ArrayError::IndexInconsistency {
                key: "<dangling index entry>".to_string(),
                position: self.guid_index.len().max(self.identifier_index.len()),
                len,
            });
        }
        Ok(())
    }

    // ========================================================================
    // Replication
    // ========================================================================

    /// Whether changes are waiting to be taken by the transport.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Whether the next batch will be a full snapshot.
    pub fn needs_full_resend(&self) -> bool {
        self.pending.is_full()
    }

    /// Force the next batch to be a full snapshot.
    pub fn mark_full_resend(&mut self) {
        self.pending.mark_full();
        self.array_key += 1;
    }

    /// Drain accumulated changes into a batch, if there are any.
    pub fn take_delta(&mut self) -> Option<DeltaBatch> {
        if self.pending.is_empty() {
            return None;
        }
        let kind = if self.pending.is_full() {
            self.pending = PendingDelta::default();
            DeltaKind::Full {
                items: self.items.clone(),
            }
        } else {
            let (removed, upserted) = self.pending.take();
            let upserted = upserted
                .iter()
                .filter_map(|guid| self.guid_index.get(guid))
                .filter_map(|&p| self.items.get(p).cloned())
                .collect();
            DeltaKind::Incremental { removed, upserted }
        };
        Some(DeltaBatch {
            array_key: self.array_key,
            kind,
        })
    }

    /// Apply a batch received from the authority, running every replica phase.
    pub fn apply_delta(
        &mut self,
        batch: DeltaBatch,
        notifier: &mut dyn ReplicaNotifier,
    ) -> ApplyReport {
        if batch.array_key <= self.array_key {
            warn!(
                batch_key = batch.array_key,
                local_key = self.array_key,
                "Ignoring stale delta batch"
            );
            return ApplyReport {
                stale: true,
                ..ApplyReport::default()
            };
        }
        self.array_key = batch.array_key;
        match batch.kind {
            DeltaKind::Incremental { removed, upserted } => {
                self.apply_incremental(&removed, upserted, notifier)
            }
            DeltaKind::Full { items } => self.apply_full(items, notifier),
        }
    }

    /// Removed entries leave their slots empty. Upserted entries land at the
    /// position the authority reported; untouched entries keep their own.
    /// Anything that cannot take its slot fills the remaining holes in order,
    /// so a replica that drifted still ends up with a dense sequence.
    fn apply_incremental(
        &mut self,
        removed: &[EntryGuid],
        upserted: Vec<Entry>,
        notifier: &mut dyn ReplicaNotifier,
    ) -> ApplyReport {
        let previous_len = self.items.len();
        let mut doomed: Vec<usize> = Vec::new();
        let mut added: Vec<usize> = Vec::new();
        let mut changed: Vec<(usize, Entry)> = Vec::new();
        let mut upserted = Some(upserted);

        for phase in Phase::ALL {
            match phase {
                Phase::PreRemove => {
                    for guid in removed {
                        let Some(&p) = self.guid_index.get(guid) else {
                            continue;
                        };
                        let Some(entry) = self.items.get(p).filter(|e| e.guid == *guid) else {
                            error!(guid = %guid, position = p, "Stale index while pre-removing");
                            continue;
                        };
                        self.guid_index.remove(guid);
                        if self.identifier_index.get(&entry.identifier) == Some(&p) {
                            self.identifier_index.remove(&entry.identifier);
                        }
                        notifier.on_phase(ReplicaEvent::PreRemove(entry));
                        doomed.push(p);
                    }
                }
                Phase::Apply => {
                    let mut old: Vec<Option<Entry>> = std::mem::take(&mut self.items)
                        .into_iter()
                        .map(Some)
                        .collect();
                    for &p in &doomed {
                        old[p] = None;
                    }

                    // Last copy of a GUID wins.
                    let mut incoming: Vec<Entry> = Vec::new();
                    let mut seen: HashMap<EntryGuid, usize> = HashMap::new();
                    for entry in upserted.take().unwrap_or_default() {
                        match seen.get(&entry.guid) {
                            Some(&i) => incoming[i] = entry,
                            None => {
                                seen.insert(entry.guid, incoming.len());
                                incoming.push(entry);
                            }
                        }
                    }

                    let mut previous: HashMap<EntryGuid, Entry> = HashMap::new();
                    for entry in &incoming {
                        let Some(&p) = self.guid_index.get(&entry.guid) else {
                            continue;
                        };
                        if old[p].as_ref().is_some_and(|e| e.guid == entry.guid) {
                            if let Some(prev) = old[p].take() {
                                previous.insert(entry.guid, prev);
                            }
                        }
                    }

                    let len = old.iter().flatten().count() + incoming.len();
                    let mut slots: Vec<Option<Entry>> = vec![None; len];
                    let mut overflow: Vec<Entry> = Vec::new();
                    let survivors = old.into_iter().enumerate().filter_map(|(p, e)| e.map(|e| (p, e)));
                    let arrivals = incoming.into_iter().map(|e| (e.position, e));
                    for (p, entry) in arrivals.chain(survivors) {
                        match slots.get_mut(p) {
                            Some(slot) if slot.is_none() => *slot = Some(entry),
                            _ => overflow.push(entry),
                        }
                    }
                    let mut overflow = overflow.into_iter();
                    self.items = slots
                        .into_iter()
                        .filter_map(|slot| slot.or_else(|| overflow.next()))
                        .collect();

                    self.guid_index.clear();
                    self.identifier_index.clear();
                    for p in 0..self.items.len() {
                        let guid = self.items[p].guid;
                        if !seen.contains_key(&guid) {
                            self.repair_at(p);
                        } else if let Some(prev) = previous.remove(&guid) {
                            changed.push((p, prev));
                        } else {
                            added.push(p);
                        }
                    }
                }
                Phase::PostAdd => {
                    for &p in &added {
                        self.repair_at(p);
                        notifier.on_phase(ReplicaEvent::PostAdd(&self.items[p]));
                    }
                }
                Phase::PostChange => {
                    for (p, previous) in &changed {
                        self.repair_at(*p);
                        notifier.on_phase(ReplicaEvent::PostChange {
                            entry: &self.items[*p],
                            previous,
                        });
                    }
                }
                Phase::PostReceive => {
                    notifier.on_phase(ReplicaEvent::PostReceive { previous_len });
                }
            }
        }

        ApplyReport {
            removed: doomed.len(),
            added: added.len(),
            changed: changed.len(),
            full: false,
            stale: false,
        }
    }

    fn apply_full(&mut self, incoming: Vec<Entry>, notifier: &mut dyn ReplicaNotifier) -> ApplyReport {
        let previous_len = self.items.len();
        let keep: HashSet<EntryGuid> = incoming.iter().map(|e| e.guid).collect();
        let mut incoming = Some(incoming);
        let mut removed = 0;
        let mut added: Vec<usize> = Vec::new();
        let mut changed: Vec<(usize, Entry)> = Vec::new();

        for phase in Phase::ALL {
            match phase {
                Phase::PreRemove => {
                    for (p, entry) in self.items.iter().enumerate() {
                        if keep.contains(&entry.guid) {
                            continue;
                        }
                        if self.guid_index.get(&entry.guid) == Some(&p) {
                            self.guid_index.remove(&entry.guid);
                        }
                        if self.identifier_index.get(&entry.identifier) == Some(&p) {
                            self.identifier_index.remove(&entry.identifier);
                        }
                        notifier.on_phase(ReplicaEvent::PreRemove(entry));
                        removed += 1;
                    }
                }
                Phase::Apply => {
                    let mut old: Vec<Option<Entry>> = std::mem::take(&mut self.items)
                        .into_iter()
                        .map(Some)
                        .collect();
                    let local: HashMap<EntryGuid, usize> = old
                        .iter()
                        .enumerate()
                        .filter_map(|(p, e)| e.as_ref().map(|e| (e.guid, p)))
                        .collect();

                    let mut retained: Vec<usize> = Vec::new();
                    for (p, mut entry) in incoming.take().unwrap_or_default().into_iter().enumerate() {
                        entry.position = p;
                        let previous = local.get(&entry.guid).and_then(|&src| old[src].take());
                        match previous {
                            Some(previous) => {
                                if previous.payload != entry.payload
                                    || previous.type_tag != entry.type_tag
                                    || previous.replication_key != entry.replication_key
                                {
                                    changed.push((p, previous));
                                } else {
                                    retained.push(p);
                                }
                            }
                            None => added.push(p),
                        }
                        self.items.push(entry);
                    }

                    self.guid_index.clear();
                    self.identifier_index.clear();
                    for p in retained {
                        self.repair_at(p);
                    }
                }
                Phase::PostAdd => {
                    for &p in &added {
                        self.repair_at(p);
                        notifier.on_phase(ReplicaEvent::PostAdd(&self.items[p]));
                    }
                }
                Phase::PostChange => {
                    for (p, previous) in &changed {
                        self.repair_at(*p);
                        notifier.on_phase(ReplicaEvent::PostChange {
                            entry: &self.items[*p],
                            previous,
                        });
                    }
                }
                Phase::PostReceive => {
                    notifier.on_phase(ReplicaEvent::PostReceive { previous_len });
                }
            }
        }

        ApplyReport {
            removed,
            added: added.len(),
            changed: changed.len(),
            full: true,
            stale: false,
        }
    }

    /// Point both indices at `p` for the entry there.
    fn repair_at(&mut self, p: usize) {
        let Some(entry) = self.items.get_mut(p) else {
            return;
        };
        entry.position = p;
        self.guid_index.insert(entry.guid, p);
        self.identifier_index.insert(entry.identifier.clone(), p);
    }
}
