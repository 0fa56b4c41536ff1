use std::collections::HashMap;

use folio_model::CachePartition;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

/// Owner of the cached queries the dispatcher invalidates.
///
/// Implementations must not block: they run on the dispatcher's loop.
pub trait CacheInvalidator: Send + Sync + 'static {
    fn invalidate(&self, partition: CachePartition);
}

impl<F> CacheInvalidator for F
where
    F: Fn(CachePartition) + Send + Sync + 'static,
{
    fn invalidate(&self, partition: CachePartition) {
        self(partition)
    }
}

impl CacheInvalidator for mpsc::UnboundedSender<CachePartition> {
    fn invalidate(&self, partition: CachePartition) {
        if self.send(partition).is_err() {
            log::debug!("Invalidation receiver dropped, skipping {}", partition);
        }
    }
}

/// Logs invalidations and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogInvalidator;

impl CacheInvalidator for LogInvalidator {
    fn invalidate(&self, partition: CachePartition) {
        log::info!("Cache partition {} invalidated", partition);
    }
}

/// Per-partition generation counters.
///
/// Views remember the generation they fetched at and refetch once
/// [`PartitionGenerations::generation`] moves past it.
#[derive(Debug)]
pub struct PartitionGenerations {
    generations: RwLock<HashMap<CachePartition, u64>>,
    changed: watch::Sender<u64>,
}

impl Default for PartitionGenerations {
    fn default() -> Self {
        Self::new()
    }
}

impl PartitionGenerations {
    pub fn new() -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            generations: RwLock::new(HashMap::new()),
            changed,
        }
    }

    pub fn generation(&self, partition: CachePartition) -> u64 {
        self.generations
            .read()
            .get(&partition)
            .copied()
            .unwrap_or_default()
    }

    pub fn is_stale(&self, partition: CachePartition, seen: u64) -> bool {
        self.generation(partition) > seen
    }

    /// Ticks once per invalidation of any partition.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changed.subscribe()
    }
}

impl CacheInvalidator for PartitionGenerations {
    fn invalidate(&self, partition: CachePartition) {
        *self.generations.write().entry(partition).or_default() += 1;
        self.changed.send_modify(|total| *total += 1);
    }
}
