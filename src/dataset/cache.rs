use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError},
    time::{Duration, Instant},
};

use tracing::debug;

use crate::{area::Vintage, error::Result};
use super::{dataset::Dataset, source::CacheKey};

/// A cached dataset and when it was loaded.
#[derive(Debug, Clone)]
struct Entry {
    dataset: Arc<Dataset>,
    loaded_at: Instant,
}

/// Per-key slot. Its mutex is held for the whole fetch, so concurrent requests for the
/// same key queue behind the first one instead of fetching again.
#[derive(Debug, Default)]
struct Slot {
    entry: Mutex<Option<Entry>>,
}

/// Summary of one cached dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryInfo {
    pub key: CacheKey,
    pub name: String,
    pub vintage: Vintage,
    pub rows: usize,
    pub age: Duration,
}

/// In-process dataset cache with at most one fetch in flight per key.
#[derive(Debug, Default)]
pub struct DatasetCache {
    slots: Mutex<HashMap<CacheKey, Arc<Slot>>>,
    ttl: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DatasetCache {
    /// `ttl` of `None` keeps entries for the life of the process.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self { slots: Mutex::new(HashMap::new()), ttl }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        lock(&self.slots).entry(key.clone()).or_default().clone()
    }

    fn is_fresh(&self, entry: &Entry) -> bool {
        self.ttl.is_none_or(|ttl| entry.loaded_at.elapsed() < ttl)
    }

    /// Return the cached dataset for `key`, or run `load` and cache its result.
    /// A failed load leaves nothing behind.
    pub fn get_or_load<F>(&self, key: &CacheKey, load: F) -> Result<Arc<Dataset>>
    where
        F: FnOnce() -> Result<Dataset>,
    {
        let slot = self.slot(key);
        let mut entry = lock(&slot.entry);

        if let Some(cached) = entry.as_ref() {
            if self.is_fresh(cached) {
                debug!(key = %key, dataset = cached.dataset.name(), "dataset cache hit");
                return Ok(cached.dataset.clone());
            }
            debug!(key = %key, dataset = cached.dataset.name(), "dataset cache entry expired");
        }

        // Stale entries are dropped before fetching so a failure cannot resurrect them.
        *entry = None;
        debug!(key = %key, "dataset cache miss");

        let dataset = Arc::new(load()?);
        *entry = Some(Entry { dataset: dataset.clone(), loaded_at: Instant::now() });
        Ok(dataset)
    }

    /// Cached dataset for `key`, if present and fresh.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<Dataset>> {
        let slot = lock(&self.slots).get(key).cloned()?;
        let entry = lock(&slot.entry);
        entry.as_ref()
            .filter(|cached| self.is_fresh(cached))
            .map(|cached| cached.dataset.clone())
    }

    /// Every populated entry, ordered by key.
    pub fn entries(&self) -> Vec<CacheEntryInfo> {
        let slots: Vec<(CacheKey, Arc<Slot>)> = lock(&self.slots).iter()
            .map(|(key, slot)| (key.clone(), slot.clone()))
            .collect();

        let mut out: Vec<CacheEntryInfo> = slots.into_iter()
            .filter_map(|(key, slot)| {
                let entry = lock(&slot.entry);
                entry.as_ref().map(|cached| CacheEntryInfo {
                    key,
                    name: cached.dataset.name().to_string(),
                    vintage: cached.dataset.vintage().clone(),
                    rows: cached.dataset.len(),
                    age: cached.loaded_at.elapsed(),
                })
            })
            .collect();
        out.sort_by(|a, b| a.key.cmp(&b.key));
        out
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry loaded for `vintage`. Returns how many were removed.
    pub fn invalidate_vintage(&self, vintage: &Vintage) -> usize {
        self.retain(|dataset| dataset.vintage() != vintage)
    }

    /// Drop everything.
    pub fn clear(&self) {
        lock(&self.slots).clear();
    }

    fn retain(&self, keep: impl Fn(&Dataset) -> bool) -> usize {
        let slots: Vec<Arc<Slot>> = lock(&self.slots).values().cloned().collect();
        let mut removed = 0;
        for slot in slots {
            let mut entry = lock(&slot.entry);
            if entry.as_ref().is_some_and(|cached| !keep(&cached.dataset)) {
                *entry = None;
                removed += 1;
            }
        }
        self.prune();
        removed
    }

    /// Forget empty slots nobody else holds. Slot handles are only cloned under the map
    /// lock, so a count of one means no load is waiting on or filling the slot.
    fn prune(&self) {
        lock(&self.slots).retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.entry.try_lock() {
                Ok(entry) => entry.is_some(),
                Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner().is_some(),
                Err(TryLockError::WouldBlock) => true,
            }
        });
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        lock(&self.slots).len()
    }
}
