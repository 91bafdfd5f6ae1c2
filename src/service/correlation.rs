//! Ephemeral correlation id → script storage with fetch-once semantics.
//!
//! Records live only in memory and are lost on restart. Without a TTL a
//! record that the provider never fetches stays forever; with one, `take`
//! ignores stale records and the sweeper drops them.

use std::collections::hash_map::{Entry, RandomState};
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;

use crate::shared::entities::CorrelationId;

const SHARD_COUNT: usize = 16;

#[derive(Debug)]
struct CorrelationRecord {
    content: Vec<u8>,
    created_at: Instant,
}

type Shard = Mutex<HashMap<CorrelationId, CorrelationRecord>>;

struct StoreInner {
    shards: Vec<Shard>,
    hasher: RandomState,
    ttl: Option<Duration>,
}

/// Cheap to clone; every clone shares the same records.
#[derive(Clone)]
pub struct CorrelationStore {
    inner: Arc<StoreInner>,
}

impl CorrelationStore {
    pub fn new(ttl: Option<Duration>) -> Self {
        let shards = (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect();
        Self {
            inner: Arc::new(StoreInner {
                shards,
                hasher: RandomState::new(),
                ttl,
            }),
        }
    }

    /// Keeps records until fetched, however long that takes.
    pub fn without_expiry() -> Self {
        Self::new(None)
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.inner.ttl
    }

    /// Stores `content` under a fresh id that no live record uses.
    pub fn put(&self, content: Vec<u8>) -> CorrelationId {
        let created_at = Instant::now();
        loop {
            let id = CorrelationId::generate();
            let mut shard = self.lock_shard(&id);
            match shard.entry(id) {
                Entry::Vacant(slot) => {
                    let id = slot.key().clone();
                    slot.insert(CorrelationRecord {
                        content,
                        created_at,
                    });
                    return id;
                }
                Entry::Occupied(slot) => {
                    log::warn!("[correlation] id collision on {}, drawing again", slot.key());
                }
            }
        }
    }

    /// Registers content under a caller-chosen id; `false` if the id is live.
    #[cfg(test)]
    pub(crate) fn put_with_id(&self, id: CorrelationId, content: Vec<u8>) -> bool {
        match self.lock_shard(&id).entry(id) {
            Entry::Vacant(slot) => {
                slot.insert(CorrelationRecord {
                    content,
                    created_at: Instant::now(),
                });
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    /// Removes the record and hands back its content. Removal and read happen
    /// under one lock, so of two racing callers exactly one gets `Some`.
    pub fn take(&self, id: &CorrelationId) -> Option<Vec<u8>> {
        let record = self.lock_shard(id).remove(id)?;
        if self.is_expired(&record, Instant::now()) {
            log::debug!("[correlation] id={} expired before fetch", id);
            return None;
        }
        Some(record.content)
    }

    /// Drops every record older than the TTL; returns how many went.
    pub fn sweep_expired(&self) -> usize {
        if self.inner.ttl.is_none() {
            return 0;
        }
        let now = Instant::now();
        let mut removed = 0;
        for shard in &self.inner.shards {
            let mut map = shard.lock().unwrap_or_else(PoisonError::into_inner);
            let before = map.len();
            map.retain(|_, record| !self.is_expired(record, now));
            removed += before - map.len();
        }
        removed
    }

    /// Number of live records. Diagnostics only.
    pub fn len(&self) -> usize {
        self.inner
            .shards
            .iter()
            .map(|shard| shard.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs `sweep_expired` every `interval` until the handle is aborted.
    /// Returns `None` when the store has no TTL.
    pub fn spawn_sweeper(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.inner.ttl?;
        let store = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep_expired();
                if removed > 0 {
                    log::info!("[correlation] swept {} unfetched record(s)", removed);
                }
            }
        }))
    }

    fn is_expired(&self, record: &CorrelationRecord, now: Instant) -> bool {
        match self.inner.ttl {
            Some(ttl) => now.saturating_duration_since(record.created_at) >= ttl,
            None => false,
        }
    }

    fn lock_shard(
        &self,
        id: &CorrelationId,
    ) -> MutexGuard<'_, HashMap<CorrelationId, CorrelationRecord>> {
        let index = (self.inner.hasher.hash_one(id) as usize) % SHARD_COUNT;
        self.inner.shards[index]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::without_expiry()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Barrier;
    use std::thread;

    use super::*;

    #[test]
    fn take_returns_content_once() {
        let store = CorrelationStore::without_expiry();
        let id = store.put(b"<Response/>".to_vec());
        assert_eq!(store.len(), 1);
        assert_eq!(store.take(&id), Some(b"<Response/>".to_vec()));
        assert_eq!(store.take(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn unknown_id_is_not_found() {
        let store = CorrelationStore::without_expiry();
        let id = CorrelationId::parse("AbC123XyZ9").expect("id");
        assert_eq!(store.take(&id), None);
    }

    #[test]
    fn puts_return_distinct_ids() {
        let store = CorrelationStore::without_expiry();
        let ids: HashSet<CorrelationId> = (0..10_000).map(|_| store.put(Vec::new())).collect();
        assert_eq!(ids.len(), 10_000);
        assert_eq!(store.len(), 10_000);
    }

    #[test]
    fn racing_takes_deliver_exactly_once() {
        for _ in 0..200 {
            let store = CorrelationStore::without_expiry();
            let id = store.put(b"script".to_vec());
            let barrier = Arc::new(Barrier::new(2));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let store = store.clone();
                    let id = id.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        store.take(&id)
                    })
                })
                .collect();
            let results: Vec<Option<Vec<u8>>> = handles
                .into_iter()
                .map(|h| h.join().expect("join"))
                .collect();
            let hits: Vec<_> = results.iter().flatten().collect();
            assert_eq!(hits.len(), 1);
            assert_eq!(hits[0], &b"script".to_vec());
        }
    }

    #[test]
    fn concurrent_puts_and_takes_on_distinct_ids() {
        let store = CorrelationStore::without_expiry();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let store = store.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let content = format!("{n}-{i}").into_bytes();
                        let id = store.put(content.clone());
                        assert_eq!(store.take(&id), Some(content));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("join");
        }
        assert!(store.is_empty());
    }

    #[test]
    fn expired_record_is_not_returned() {
        let store = CorrelationStore::new(Some(Duration::ZERO));
        let id = store.put(b"late".to_vec());
        assert_eq!(store.take(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn record_within_ttl_is_returned_once() {
        let store = CorrelationStore::new(Some(Duration::from_secs(60)));
        let id = store.put(b"fresh".to_vec());
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.take(&id), Some(b"fresh".to_vec()));
        assert_eq!(store.take(&id), None);
    }

    #[test]
    fn sweep_removes_only_stale_records() {
        let store = CorrelationStore::new(Some(Duration::from_millis(30)));
        store.put(b"old".to_vec());
        thread::sleep(Duration::from_millis(60));
        let fresh = store.put(b"new".to_vec());
        assert_eq!(store.sweep_expired(), 1);
        assert_eq!(store.take(&fresh), Some(b"new".to_vec()));
    }

    #[test]
    fn sweep_without_ttl_keeps_everything() {
        let store = CorrelationStore::without_expiry();
        store.put(b"kept".to_vec());
        assert_eq!(store.sweep_expired(), 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn sweeper_task_drains_stale_records() {
        let store = CorrelationStore::new(Some(Duration::from_millis(10)));
        store.put(b"a".to_vec());
        store.put(b"b".to_vec());
        let handle = store
            .spawn_sweeper(Duration::from_millis(10))
            .expect("sweeper");
        tokio::time::sleep(Duration::from_millis(150)).await;
        handle.abort();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn no_sweeper_without_ttl() {
        let store = CorrelationStore::without_expiry();
        assert!(store.spawn_sweeper(Duration::from_millis(10)).is_none());
    }
}
