use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{watch, Notify, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shunt_common::{AccessMode, MetadataConfig};

use crate::cluster::ClusterMetadata;
use crate::types::{ClusterSnapshot, ManagedInstance, ReplicaSetSnapshot, ReplicaSetStatus};

/// Shared, periodically refreshed view of the cluster.
///
/// The cache owns the current [`ClusterSnapshot`] behind a shared-reader /
/// exclusive-writer lock; publication replaces the whole `Arc`, so a reader
/// either sees the old complete snapshot or the new complete snapshot.
/// Subscribers learn about new generations through a watch channel, and the
/// refresher can be woken before its next scheduled tick with
/// [`refresh_now`](Self::refresh_now).
pub struct MetadataCache {
    config: MetadataConfig,
    snapshot: RwLock<Arc<ClusterSnapshot>>,
    generation_tx: watch::Sender<u64>,
    wakeup: Notify,
}

impl MetadataCache {
    pub fn new(config: MetadataConfig) -> Arc<Self> {
        let (generation_tx, _) = watch::channel(0);
        Arc::new(Self {
            config,
            snapshot: RwLock::new(Arc::new(ClusterSnapshot::empty())),
            generation_tx,
            wakeup: Notify::new(),
        })
    }

    /// The current snapshot. Holders keep a consistent view even after a
    /// newer generation is published.
    pub async fn snapshot(&self) -> Arc<ClusterSnapshot> {
        Arc::clone(&*self.snapshot.read().await)
    }

    /// Members of `replicaset` whose computed mode matches `mode`, in
    /// declared order. Empty when the set is unknown or `Unavailable`.
    pub async fn members(&self, replicaset: &str, mode: AccessMode) -> Vec<ManagedInstance> {
        let snapshot = self.snapshot().await;
        let Some(set) = snapshot.replicasets.get(replicaset) else {
            return Vec::new();
        };
        if set.status == ReplicaSetStatus::Unavailable {
            return Vec::new();
        }
        set.members
            .iter()
            .filter(|member| member.matches_mode(mode))
            .cloned()
            .collect()
    }

    /// Generation of the most recently published snapshot.
    pub fn generation(&self) -> u64 {
        *self.generation_tx.borrow()
    }

    /// Subscribes to snapshot publications. The watched value is the
    /// generation number.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation_tx.subscribe()
    }

    /// Wakes the refresher before its next scheduled tick.
    pub fn refresh_now(&self) {
        self.wakeup.notify_one();
    }

    /// Runs one refresh cycle against `resolver` and publishes the result.
    ///
    /// Any failure leaves the previous snapshot (or, for a single replica
    /// set, its previous sub-snapshot) in effect; the cache never goes
    /// backwards and never exposes a partially refreshed view.
    pub async fn refresh(&self, resolver: &mut ClusterMetadata, cluster_name: &str) {
        if !resolver.connect(&self.config.bootstrap_servers).await {
            warn!("unable to connect to any metadata server; keeping previous snapshot");
            return;
        }

        let fetched = match resolver
            .fetch_instances_from_metadata_server(cluster_name)
            .await
        {
            Ok(instances) => instances,
            Err(err) => {
                warn!("{}; keeping previous snapshot", err);
                return;
            }
        };

        let previous = self.snapshot().await;
        let mut replicasets = BTreeMap::new();
        for (name, mut members) in fetched {
            match resolver.update_replicaset_status(&name, &mut members).await {
                Ok(status) => {
                    replicasets.insert(
                        name.clone(),
                        ReplicaSetSnapshot {
                            name,
                            members,
                            status,
                        },
                    );
                }
                Err(err) => {
                    warn!("{}; retaining previous state for this replicaset", err);
                    if let Some(prev) = previous.replicasets.get(&name) {
                        replicasets.insert(name, prev.clone());
                    }
                }
            }
        }

        let generation = previous.generation + 1;
        let snapshot = Arc::new(ClusterSnapshot {
            replicasets,
            generation,
            acquired_at: Instant::now(),
        });
        *self.snapshot.write().await = snapshot;
        let _ = self.generation_tx.send(generation);
        debug!(generation, "published metadata snapshot");
    }

    /// Spawns the background refresher task.
    ///
    /// The task refreshes immediately, then once per `ttl` until the
    /// shutdown signal flips. [`refresh_now`](Self::refresh_now) shortens
    /// the current sleep.
    pub fn spawn(
        self: &Arc<Self>,
        mut resolver: ClusterMetadata,
        cluster_name: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                cache.refresh(&mut resolver, &cluster_name).await;
                tokio::select! {
                    _ = tokio::time::sleep(cache.config.ttl) => {}
                    _ = cache.wakeup.notified() => {
                        debug!("metadata cache woken before ttl expiry");
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("metadata cache refresher stopping");
                            return;
                        }
                    }
                }
            }
        })
    }
}
