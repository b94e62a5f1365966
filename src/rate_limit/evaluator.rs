use super::{CounterStore, RateLimitKey, RateLimitRule, Transition, Verdict};
use crate::clock::{Clock, SystemClock};
use crate::error::StoreError;
use std::sync::Arc;

/// Decides admit/reject for one `(rule, key)` pair against a [`CounterStore`].
///
/// Clones share the same store and clock.
#[derive(Clone, Debug)]
pub struct RateLimitEvaluator {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimitEvaluator {
    /// Evaluate against `store` using wall-clock time.
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store, clock: Arc::new(SystemClock) }
    }

    /// Override the clock (useful for deterministic tests).
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub(crate) fn with_shared_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one admission attempt for `key` under `rule`.
    ///
    /// # Errors
    /// Returns [`StoreError`] when the store is unreachable. No fallback is
    /// applied here.
    pub async fn admit(
        &self,
        rule: &RateLimitRule,
        key: &RateLimitKey,
    ) -> Result<Verdict, StoreError> {
        let transition = Transition::new(*rule, self.clock.now_millis());
        self.store.transact(key, transition).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::rate_limit::{Algorithm, InMemoryCounterStore};
    use std::time::Duration;

    #[tokio::test]
    async fn token_bucket_saturates_then_admits_after_one_refill_interval() {
        let clock = ManualClock::starting_at(10_000);
        let evaluator = RateLimitEvaluator::new(Arc::new(InMemoryCounterStore::new()))
            .with_clock(clock.clone());
        let rule = RateLimitRule::new(Algorithm::TokenBucket, 5, 5, 1).unwrap();
        let key = RateLimitKey::ip("198.51.100.7");

        for _ in 0..5 {
            assert!(evaluator.admit(&rule, &key).await.unwrap().is_admitted());
        }
        assert!(!evaluator.admit(&rule, &key).await.unwrap().is_admitted());

        clock.advance(Duration::from_millis(200));
        assert!(evaluator.admit(&rule, &key).await.unwrap().is_admitted());
        assert!(!evaluator.admit(&rule, &key).await.unwrap().is_admitted());

        clock.advance(Duration::from_secs(1));
        let admitted = {
            let mut n = 0;
            while evaluator.admit(&rule, &key).await.unwrap().is_admitted() {
                n += 1;
            }
            n
        };
        assert_eq!(admitted, 5, "a full second refills the whole burst");
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let clock = ManualClock::starting_at(0);
        let evaluator = RateLimitEvaluator::new(Arc::new(InMemoryCounterStore::new()))
            .with_clock(clock);
        let rule = RateLimitRule::new(Algorithm::FixedWindow, 1, 1, 1).unwrap();

        assert!(evaluator.admit(&rule, &RateLimitKey::ip("a")).await.unwrap().is_admitted());
        assert!(evaluator.admit(&rule, &RateLimitKey::ip("b")).await.unwrap().is_admitted());
        assert!(!evaluator.admit(&rule, &RateLimitKey::ip("a")).await.unwrap().is_admitted());
    }
}
