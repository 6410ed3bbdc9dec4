//! Process-wide, TTL-bounded memo of repository archives keyed by commit.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::CacheConfig;
use crate::forge::{CommitId, ForgeApi, ForgeError};

static GLOBAL_SNAPSHOTS: OnceLock<SnapshotCache> = OnceLock::new();

/// Return the shared snapshot cache, sizing it from `config` on first use.
///
/// Later calls ignore `config`; the instance lives until the process exits.
pub fn global_snapshot_cache(config: &CacheConfig) -> &'static SnapshotCache {
    GLOBAL_SNAPSHOTS.get_or_init(|| SnapshotCache::new(config.ttl, config.capacity))
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub owner: String,
    pub repo: String,
    pub commit: CommitId,
}

impl SnapshotKey {
    #[must_use]
    pub fn new(owner: &str, repo: &str, commit: &CommitId) -> Self {
        Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            commit: commit.clone(),
        }
    }
}

struct Slot {
    bytes: Arc<[u8]>,
    inserted: Instant,
}

/// Memoizes archive bytes per `(owner, repo, commit)`.
///
/// Reads share a lock; fetches run without holding it, so two callers filling the
/// same key both fetch and the later insert wins. Values are content-addressed, so
/// either copy is correct.
pub struct SnapshotCache {
    ttl: Duration,
    capacity: usize,
    slots: RwLock<HashMap<SnapshotKey, Slot>>,
}

impl SnapshotCache {
    #[must_use]
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            slots: RwLock::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, slot: &Slot, now: Instant) -> bool {
        now.saturating_duration_since(slot.inserted) < self.ttl
    }

    /// Cached bytes for `key`, if present and not expired.
    pub fn get(&self, key: &SnapshotKey) -> Option<Arc<[u8]>> {
        let now = Instant::now();
        {
            let slots = self.slots.read().unwrap_or_else(PoisonError::into_inner);
            match slots.get(key) {
                Some(slot) if self.is_fresh(slot, now) => return Some(Arc::clone(&slot.bytes)),
                Some(_) => {}
                None => return None,
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.get(key).is_some_and(|slot| !self.is_fresh(slot, now)) {
            debug!(owner = %key.owner, repo = %key.repo, commit = %key.commit, "snapshot expired");
            slots.remove(key);
        }
        None
    }

    /// Store `bytes` under `key`, evicting expired entries and then the oldest ones
    /// until the cache fits its capacity.
    pub fn insert(&self, key: SnapshotKey, bytes: Arc<[u8]>) {
        let now = Instant::now();
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        slots.retain(|_, slot| self.is_fresh(slot, now));
        slots.remove(&key);
        while slots.len() >= self.capacity {
            let Some(oldest) = slots
                .iter()
                .min_by_key(|(_, slot)| slot.inserted)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!(owner = %oldest.owner, repo = %oldest.repo, commit = %oldest.commit, "evicting snapshot");
            slots.remove(&oldest);
        }
        slots.insert(
            key,
            Slot {
                bytes,
                inserted: now,
            },
        );
    }

    /// Cached bytes for `key`, or the result of `fetch` (which is then cached).
    ///
    /// # Errors
    ///
    /// Propagates the fetch error; nothing is cached in that case.
    pub fn get_or_fetch<E>(
        &self,
        key: &SnapshotKey,
        fetch: impl FnOnce() -> Result<Vec<u8>, E>,
    ) -> Result<Arc<[u8]>, E> {
        if let Some(bytes) = self.get(key) {
            debug!(owner = %key.owner, repo = %key.repo, commit = %key.commit, "snapshot cache hit");
            return Ok(bytes);
        }
        debug!(owner = %key.owner, repo = %key.repo, commit = %key.commit, "snapshot cache miss");
        let bytes: Arc<[u8]> = Arc::from(fetch()?);
        self.insert(key.clone(), Arc::clone(&bytes));
        Ok(bytes)
    }

    /// Archive bytes for `commit`, fetched from `forge` on a miss.
    ///
    /// # Errors
    ///
    /// Returns the forge error when the download fails.
    pub fn fetch_archive(
        &self,
        forge: &dyn ForgeApi,
        owner: &str,
        repo: &str,
        commit: &CommitId,
    ) -> Result<Arc<[u8]>, ForgeError> {
        let key = SnapshotKey::new(owner, repo, commit);
        self.get_or_fetch(&key, || forge.download_archive(owner, repo, commit))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
