//! Authority-to-replica delta forwarding.
//!
//! A `ReplicationLink` periodically drains a host's pending changes and
//! pushes the resulting batch into one bounded channel per replica. A full
//! channel applies backpressure to the link rather than dropping batches,
//! since replicas cannot recover from a gap short of a full snapshot.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use reparray_core::DeltaBatch;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{Instrument, debug, info, warn};

use super::replica::ReplicaMirror;
use crate::metrics;
use crate::state::ArrayHost;
use crate::telemetry::spans;

/// Forwards delta batches from one host to its replicas.
pub struct ReplicationLink {
    host: Arc<ArrayHost>,
    flush_interval: Duration,
    peers: Vec<mpsc::Sender<Arc<DeltaBatch>>>,
}

impl ReplicationLink {
    pub fn new(host: Arc<ArrayHost>, flush_interval: Duration) -> Self {
        Self {
            host,
            flush_interval,
            peers: Vec::new(),
        }
    }

    /// Attach a replica. The receiver gets every batch from now on.
    ///
    /// Replicas attached after the first flush should be seeded with a full
    /// snapshot through [`ArrayHost`]'s entries, or the host forced to resend.
    pub fn attach(&mut self, capacity: usize) -> mpsc::Receiver<Arc<DeltaBatch>> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.peers.push(tx);
        rx
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Drain pending changes and forward them. Returns whether a batch went out.
    pub async fn flush(&mut self) -> bool {
        let Some(batch) = self.host.take_delta() else {
            return false;
        };
        let batch = Arc::new(batch);

        let mut open = Vec::with_capacity(self.peers.len());
        for peer in self.peers.drain(..) {
            match peer.send(Arc::clone(&batch)).await {
                Ok(()) => open.push(peer),
                Err(_) => warn!(array = %self.host.name(), "Replica channel closed, detaching"),
            }
        }
        self.peers = open;

        metrics::record_batch_sent(self.host.name(), batch.is_full());
        debug!(
            array = %self.host.name(),
            array_key = batch.array_key,
            size = batch.len(),
            full = batch.is_full(),
            replicas = self.peers.len(),
            "Forwarded delta batch"
        );
        true
    }

    /// Run the flush loop until the host is deleted or every replica is gone.
    pub fn spawn(mut self) -> JoinHandle<()> {
        let span = spans::link(self.host.name(), self.peers.len());
        tokio::spawn(
            async move {
                let mut interval = tokio::time::interval(self.flush_interval);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    interval.tick().await;
                    if self.host.is_deleted() {
                        info!("Array deleted, stopping replication link");
                        break;
                    }
                    self.flush().await;
                    if self.peers.is_empty() {
                        info!("No replicas left, stopping replication link");
                        break;
                    }
                }
            }
            .instrument(span),
        )
    }
}

/// Apply batches from `rx` to `mirror` until the link goes away.
pub fn spawn_replica(
    mirror: Arc<RwLock<ReplicaMirror>>,
    mut rx: mpsc::Receiver<Arc<DeltaBatch>>,
    index: usize,
) -> JoinHandle<()> {
    let span = spans::replica(mirror.read().array_name(), index);
    tokio::spawn(
        async move {
            while let Some(batch) = rx.recv().await {
                let report = mirror.write().apply(Arc::unwrap_or_clone(batch));
                if report.stale {
                    warn!("Replica received a stale batch");
                }
            }
            debug!("Replica channel closed");
        }
        .instrument(span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{HostParams, HostSettings};
    use reparray_core::{JsonPayloads, NameGenerator, Payload, TypeTag};

    fn host() -> Arc<ArrayHost> {
        Arc::new(ArrayHost::new(HostParams {
            name: "inventory".to_string(),
            settings: HostSettings::default(),
            names: NameGenerator::new(Some(1)),
            decoder: Arc::new(JsonPayloads),
        }))
    }

    fn mirror() -> Arc<RwLock<ReplicaMirror>> {
        Arc::new(RwLock::new(ReplicaMirror::new(
            "inventory",
            Arc::new(JsonPayloads),
            16,
        )))
    }

    fn add(host: &ArrayHost, value: i64) {
        host.add_object(
            Payload::from(format!(r#"{{"value": {value}}}"#).as_str()),
            TypeTag::new("Json"),
            1,
        )
        .unwrap();
    }

    #[tokio::test]
    async fn flush_without_changes_sends_nothing() {
        let mut link = ReplicationLink::new(host(), Duration::from_millis(10));
        let mut rx = link.attach(4);
        assert!(!link.flush().await);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn flush_delivers_the_same_batch_to_every_replica() {
        let host = host();
        let mut link = ReplicationLink::new(Arc::clone(&host), Duration::from_millis(10));
        let mut first = link.attach(4);
        let mut second = link.attach(4);

        add(&host, 1);
        assert!(link.flush().await);
        let a = first.recv().await.unwrap();
        let b = second.recv().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.len(), 1);
    }

    #[tokio::test]
    async fn closed_replicas_are_detached() {
        let host = host();
        let mut link = ReplicationLink::new(Arc::clone(&host), Duration::from_millis(10));
        let rx = link.attach(4);
        let _kept = link.attach(4);
        drop(rx);

        add(&host, 1);
        link.flush().await;
        assert_eq!(link.peer_count(), 1);
    }

    #[tokio::test]
    async fn replicas_converge_through_running_link() {
        let host = host();
        let mut link = ReplicationLink::new(Arc::clone(&host), Duration::from_millis(5));
        let replica = mirror();
        let applier = spawn_replica(Arc::clone(&replica), link.attach(8), 0);
        let runner = link.spawn();

        for value in [10, 20, 5] {
            add(&host, value);
        }
        let first = host.entries()[0].guid();
        host.remove_entry(&first).unwrap();
        host.sort_by_property_name("value").unwrap();

        let converged = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if replica.read().entries() == host.entries() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(converged.is_ok());
        assert!(replica.read().is_consistent());
        assert_eq!(
            replica.read().statistic("value").unwrap().sum(),
            host.statistic("value").unwrap().sum()
        );

        host.mark_deleted();
        tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .unwrap()
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), applier)
            .await
            .unwrap()
            .unwrap();
    }
}
