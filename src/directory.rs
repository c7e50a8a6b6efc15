// Provider directory: loaded once per session, then served from memory

use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::CoordinatorError;
use crate::service::DirectoryService;
use crate::time_slot::{Provider, ProviderId};

#[derive(Debug, Default)]
pub struct DirectoryStats {
    pub hit_count: AtomicUsize,
    pub miss_count: AtomicUsize,
    pub failure_count: AtomicUsize,
    pub invalidation_count: AtomicUsize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectoryStatsReport {
    pub hit_count: usize,
    pub miss_count: usize,
    pub failure_count: usize,
    pub invalidation_count: usize,
}

pub struct ProviderDirectory<S: DirectoryService> {
    service: Arc<S>,
    providers: RwLock<Option<Arc<Vec<Provider>>>>,
    stats: DirectoryStats,
}

impl<S: DirectoryService> ProviderDirectory<S> {
    pub fn new(service: Arc<S>) -> Self {
        Self {
            service,
            providers: RwLock::new(None),
            stats: DirectoryStats::default(),
        }
    }

    /// Returns the provider list, hitting the backing service only when
    /// nothing has been loaded yet (or after [`invalidate`](Self::invalidate)).
    /// A failed load leaves the directory empty so the next call retries.
    pub async fn load(&self) -> Result<Arc<Vec<Provider>>, CoordinatorError> {
        if let Some(providers) = self.cached() {
            self.stats.hit_count.fetch_add(1, Ordering::SeqCst);
            debug!(count = providers.len(), "Provider directory served from cache");
            return Ok(providers);
        }

        self.stats.miss_count.fetch_add(1, Ordering::SeqCst);

        let providers = match self.service.list_providers().await {
            Ok(providers) => Arc::new(providers),
            Err(e) => {
                self.stats.failure_count.fetch_add(1, Ordering::SeqCst);
                warn!(error = %e, "Provider directory load failed");
                return Err(CoordinatorError::DirectoryUnavailable(e.to_string()));
            }
        };

        info!(count = providers.len(), "Provider directory loaded");

        // Two loads racing on an empty cache: the first to land is kept
        let mut slot = self.providers.write();
        let stored = slot.get_or_insert_with(|| Arc::clone(&providers));
        Ok(Arc::clone(stored))
    }

    pub fn cached(&self) -> Option<Arc<Vec<Provider>>> {
        self.providers.read().clone()
    }

    pub fn find(&self, id: &ProviderId) -> Option<Provider> {
        self.providers
            .read()
            .as_ref()
            .and_then(|providers| providers.iter().find(|p| &p.id == id).cloned())
    }

    pub fn invalidate(&self) {
        if self.providers.write().take().is_some() {
            self.stats.invalidation_count.fetch_add(1, Ordering::SeqCst);
            debug!("Provider directory invalidated");
        }
    }

    pub fn stats(&self) -> DirectoryStatsReport {
        DirectoryStatsReport {
            hit_count: self.stats.hit_count.load(Ordering::SeqCst),
            miss_count: self.stats.miss_count.load(Ordering::SeqCst),
            failure_count: self.stats.failure_count.load(Ordering::SeqCst),
            invalidation_count: self.stats.invalidation_count.load(Ordering::SeqCst),
        }
    }
}
