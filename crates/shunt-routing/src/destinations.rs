use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shunt_common::{AccessMode, Destination};
use shunt_metadata::cache::MetadataCache;

use crate::quarantine::Quarantine;

/// Round-robin selector over a fixed destination list.
///
/// Each call to [`candidates`](Self::candidates) advances the shared cursor
/// and returns the full rotation starting there, so successive connections
/// spread across the list while every dispatch still sees each destination
/// at most once.
pub struct StaticDestinations {
    destinations: Vec<Destination>,
    cursor: AtomicUsize,
}

impl StaticDestinations {
    pub fn new(destinations: Vec<Destination>) -> Self {
        Self {
            destinations,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Ordered candidates for one dispatch, quarantined destinations
    /// skipped. An empty result means the list is exhausted.
    pub fn candidates(&self, quarantine: &Quarantine) -> Vec<Destination> {
        if self.destinations.is_empty() {
            return Vec::new();
        }
        let len = self.destinations.len();
        let start = self.cursor.fetch_add(1, Ordering::Relaxed) % len;
        (0..len)
            .map(|offset| &self.destinations[(start + offset) % len])
            .filter(|dest| !quarantine.is_quarantined(dest))
            .cloned()
            .collect()
    }
}

/// Selector backed by the metadata cache, filtered by role.
///
/// Candidates come from whichever snapshot is published at dispatch time, in
/// the snapshot's declared order. A replica set the cache reports as
/// unavailable yields no candidates at all.
pub struct CacheDestinations {
    cache: Arc<MetadataCache>,
    replicaset: String,
    mode: AccessMode,
}

impl CacheDestinations {
    pub fn new(cache: Arc<MetadataCache>, replicaset: impl Into<String>, mode: AccessMode) -> Self {
        Self {
            cache,
            replicaset: replicaset.into(),
            mode,
        }
    }

    pub async fn candidates(&self, quarantine: &Quarantine) -> Vec<Destination> {
        self.cache
            .members(&self.replicaset, self.mode)
            .await
            .iter()
            .map(|member| member.destination())
            .filter(|dest| !quarantine.is_quarantined(dest))
            .collect()
    }
}

/// A routing endpoint's backend source.
pub enum DestinationSource {
    Static(StaticDestinations),
    Cache(CacheDestinations),
}

impl DestinationSource {
    /// Ordered candidate list for one incoming connection.
    pub async fn candidates(&self, quarantine: &Quarantine) -> Vec<Destination> {
        match self {
            Self::Static(source) => source.candidates(quarantine),
            Self::Cache(source) => source.candidates(quarantine).await,
        }
    }
}
