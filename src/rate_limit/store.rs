use super::{RateLimitKey, RateLimitState, Transition, Verdict};
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Shared holder of [`RateLimitState`], keyed by [`RateLimitKey`].
///
/// Implementations MUST apply `transition` as a single atomic read-modify-write:
/// read the prior state, call [`Transition::apply`], write the result with
/// [`Transition::ttl`], with no other writer for the same key in between.
/// In memory that is a lock; in a remote key-value store it is a server-side
/// script or a compare-and-swap loop. A separate read followed by a separate
/// write loses updates under contention and is not a valid implementation.
#[async_trait]
pub trait CounterStore: Send + Sync + std::fmt::Debug {
    /// Apply one admission attempt and return its verdict.
    ///
    /// Errors only when the store cannot be reached; the caller picks the
    /// fallback policy.
    async fn transact(
        &self,
        key: &RateLimitKey,
        transition: Transition,
    ) -> Result<Verdict, StoreError>;
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: RateLimitState,
    expires_at_millis: u64,
}

#[derive(Debug, Default)]
struct Entries {
    by_key: HashMap<String, Entry>,
    // (expires_at_millis, storage key), soonest first
    by_expiry: BTreeSet<(u64, String)>,
}

impl Entries {
    fn insert(&mut self, key: String, entry: Entry) {
        if let Some(old) = self.by_key.get(&key) {
            self.by_expiry.remove(&(old.expires_at_millis, key.clone()));
        }
        self.by_expiry.insert((entry.expires_at_millis, key.clone()));
        self.by_key.insert(key, entry);
    }

    fn pop_soonest(&mut self) -> Option<String> {
        let (_, key) = self.by_expiry.pop_first()?;
        self.by_key.remove(&key);
        Some(key)
    }

    /// Drop entries whose TTL has passed at `now_millis`, soonest first.
    fn sweep(&mut self, now_millis: u64) -> usize {
        let mut removed = 0;
        while self.by_expiry.first().is_some_and(|(expires, _)| *expires <= now_millis) {
            self.pop_soonest();
            removed += 1;
        }
        removed
    }
}

/// In-memory counter store with TTL expiry.
///
/// Used directly for single-instance deployments and tests, and as the
/// per-process fallback while the shared store is down. Every transaction
/// first drops the entries that have expired, walking an expiry-ordered index
/// so only dead keys are visited. With a capacity set, inserting a new key
/// into a full store then evicts the entry closest to expiry.
#[derive(Default, Clone, Debug)]
pub struct InMemoryCounterStore {
    data: Arc<Mutex<Entries>>,
    capacity: Option<usize>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the number of live keys.
    pub fn bounded(capacity: usize) -> Self {
        Self { data: Arc::default(), capacity: Some(capacity.max(1)) }
    }

    /// Number of keys currently held, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.data.lock().expect("counter store poisoned").by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose TTL has passed at `now_millis`. Returns how many were removed.
    pub fn purge_expired(&self, now_millis: u64) -> usize {
        self.data.lock().expect("counter store poisoned").sweep(now_millis)
    }

    /// Current state for a key, ignoring expiry. Test and debugging aid.
    pub fn peek(&self, key: &RateLimitKey) -> Option<RateLimitState> {
        let entries = self.data.lock().expect("counter store poisoned");
        entries.by_key.get(&key.storage_key()).map(|entry| entry.state)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn transact(
        &self,
        key: &RateLimitKey,
        transition: Transition,
    ) -> Result<Verdict, StoreError> {
        let now = transition.now_millis;
        let storage_key = key.storage_key();
        let mut entries = self.data.lock().expect("counter store poisoned");

        entries.sweep(now);
        let prior = entries.by_key.get(&storage_key).map(|entry| entry.state);
        if prior.is_none() {
            if let Some(capacity) = self.capacity {
                while entries.by_key.len() >= capacity && entries.pop_soonest().is_some() {}
            }
        }

        let (state, verdict) = transition.apply(prior);
        let ttl = u64::try_from(transition.ttl().as_millis()).unwrap_or(u64::MAX);
        let expires_at_millis = now.saturating_add(ttl);
        entries.insert(storage_key, Entry { state, expires_at_millis });
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::{Algorithm, RateLimitRule};

    fn fixed(limit: u32) -> RateLimitRule {
        RateLimitRule::new(Algorithm::FixedWindow, limit, limit, 1).unwrap()
    }

    #[tokio::test]
    async fn expired_state_is_recreated() {
        let store = InMemoryCounterStore::new();
        let key = RateLimitKey::ip("10.0.0.1");
        let rule = fixed(1);
        assert!(store.transact(&key, Transition::new(rule, 0)).await.unwrap().is_admitted());
        assert!(!store.transact(&key, Transition::new(rule, 10)).await.unwrap().is_admitted());
        assert!(store.transact(&key, Transition::new(rule, 1_000)).await.unwrap().is_admitted());
    }

    #[tokio::test]
    async fn bounded_store_evicts_soonest_expiry() {
        let store = InMemoryCounterStore::bounded(2);
        let rule = fixed(5);
        store.transact(&RateLimitKey::ip("a"), Transition::new(rule, 0)).await.unwrap();
        store.transact(&RateLimitKey::ip("b"), Transition::new(rule, 500)).await.unwrap();
        store.transact(&RateLimitKey::ip("c"), Transition::new(rule, 600)).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.peek(&RateLimitKey::ip("a")).is_none());
        assert!(store.peek(&RateLimitKey::ip("b")).is_some());
        assert!(store.peek(&RateLimitKey::ip("c")).is_some());
    }

    #[tokio::test]
    async fn purge_removes_only_expired() {
        let store = InMemoryCounterStore::new();
        let rule = fixed(5);
        store.transact(&RateLimitKey::ip("a"), Transition::new(rule, 0)).await.unwrap();
        store.transact(&RateLimitKey::ip("b"), Transition::new(rule, 900)).await.unwrap();
        assert_eq!(store.purge_expired(1_000), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn idle_keys_are_swept_by_later_traffic() {
        let store = InMemoryCounterStore::new();
        let rule = fixed(10);
        for n in 0..1000 {
            let key = RateLimitKey::ip(format!("10.0.{}.{}", n / 256, n % 256));
            store.transact(&key, Transition::new(rule, 0)).await.unwrap();
        }
        assert_eq!(store.len(), 1000);

        let late = 3_600_000;
        for _ in 0..100 {
            let key = RateLimitKey::ip("192.168.0.1");
            store.transact(&key, Transition::new(rule, late)).await.unwrap();
        }
        assert_eq!(store.len(), 1);
        assert!(store.peek(&RateLimitKey::ip("10.0.0.0")).is_none());
    }

    #[tokio::test]
    async fn sweep_keeps_entries_refreshed_after_first_write() {
        let store = InMemoryCounterStore::new();
        let rule = fixed(10);
        let key = RateLimitKey::ip("a");
        store.transact(&key, Transition::new(rule, 0)).await.unwrap();
        store.transact(&key, Transition::new(rule, 900)).await.unwrap();
        store.transact(&RateLimitKey::ip("b"), Transition::new(rule, 1_500)).await.unwrap();

        // the rewrite at 900 moved the expiry of "a" to 1900
        assert_eq!(store.len(), 2);
        assert_eq!(store.purge_expired(1_900), 1);
        assert!(store.peek(&key).is_none());
    }

    #[tokio::test]
    async fn full_store_under_key_churn_stays_at_capacity() {
        let store = InMemoryCounterStore::bounded(64);
        let rule = fixed(5);
        for n in 0..10_000u64 {
            let key = RateLimitKey::ip(format!("churn-{n}"));
            store.transact(&key, Transition::new(rule, n / 100)).await.unwrap();
        }
        assert_eq!(store.len(), 64);
        assert!(store.peek(&RateLimitKey::ip("churn-9999")).is_some());
        assert!(store.peek(&RateLimitKey::ip("churn-0")).is_none());
    }
}
