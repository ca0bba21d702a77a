//! Indexed delta arrays for authority/replica replication.
//!
//! An authority owns an [`IndexedArray`] and mutates it. Each mutation keeps
//! the backing sequence and both lookup maps in lockstep and records what a
//! replica needs to catch up. The transport drains those records as
//! [`DeltaBatch`]es; replicas feed them to [`IndexedArray::apply_delta`],
//! which runs the [`Phase`] sequence and reports through a
//! [`ReplicaNotifier`].
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐          ┌──────────────────────────────┐
//! │ Authority                    │          │ Replica                      │
//! │  IndexedArray                │          │  IndexedArray                │
//! │   items ◄─► guid_index       │ take_    │   apply_delta                │
//! │         ◄─► identifier_index │ delta()  │    PreRemove ─► Apply ─►     │
//! │   pending (dirty tracking) ──┼─────────►│    PostAdd ─► PostChange ─►  │
//! │                              │ Delta-   │    PostReceive               │
//! │  StatisticsAggregator        │ Batch    │  StatisticsAggregator        │
//! └──────────────────────────────┘          └──────────────────────────────┘
//! ```
//!
//! Payloads are opaque bytes. Anything that needs to look inside them
//! (statistics, property sorts) goes through a [`PayloadDecoder`] that yields
//! a [`Reflect`] view.

pub mod array;
pub mod delta;
pub mod entry;
pub mod error;
pub mod names;
pub mod notify;
pub mod payload;
pub mod stats;

pub use array::{AddedEntry, DuplicateIdentifierPolicy, IndexedArray};
pub use delta::{ApplyReport, DeltaBatch, DeltaKind};
pub use entry::{Entry, EntryGuid, Payload, TypeTag};
pub use error::{ArrayError, DecodeError, EncodeError};
pub use names::NameGenerator;
pub use notify::{
    ArrayEvent, ArrayObserver, NoopNotifier, Phase, ReplicaEvent, ReplicaNotifier,
};
pub use payload::{
    JsonPayloads, NumericProperty, PayloadDecoder, PropertyText, Reflect, TypedPayloads,
};
pub use stats::{PropertyStatistics, StatisticsAggregator};
