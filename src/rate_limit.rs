//! Rate limiting primitives.
//!
//! This module provides the building blocks for per-dimension admission:
//! - [`RateLimitRule`]: validated, immutable configuration for one dimension.
//! - [`RateLimitKey`]: `(dimension, identity)` namespace for counter state.
//! - [`Transition`]: the pure read-modify-write step for each [`Algorithm`].
//! - [`CounterStore`]: the shared state holder that applies a transition atomically.
//! - [`RateLimitEvaluator`]: `admit(rule, key)` against a store and a clock.
//!
//! # Architecture
//!
//! - **Logic**: `state` holds the math for token bucket, leaky bucket, fixed
//!   window and approximated sliding window. It never touches I/O.
//! - **Storage**: `store` implementations run one transition per call as a
//!   single atomic step (a lock in memory, a script in a remote store), so
//!   concurrent requests for the same key never lose updates.
//! - **Evaluation**: `evaluator` stamps the transition with the current time
//!   and hands it to the store.

use std::time::Duration;

pub mod evaluator;
pub mod key;
pub mod rule;
pub mod state;
pub mod store;

pub use evaluator::RateLimitEvaluator;
pub use key::{RateLimitKey, GLOBAL_IDENTITY};
pub use rule::{Algorithm, Dimension, RateLimitRule};
pub use state::{RateLimitState, Transition};
pub use store::{CounterStore, InMemoryCounterStore};

/// The verdict of one rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The request may proceed.
    Admitted {
        /// Permits left after this one. Useful for `X-RateLimit-Remaining` headers.
        remaining: u64,
    },
    /// The request is over the limit.
    Rejected {
        /// How long the caller should wait before retrying.
        /// Useful for `Retry-After` headers.
        retry_after: Duration,
    },
}

impl Verdict {
    /// Helper to check if admitted.
    pub fn is_admitted(&self) -> bool {
        matches!(self, Verdict::Admitted { .. })
    }

    /// Retry hint for a rejection.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Verdict::Rejected { retry_after } => Some(*retry_after),
            Verdict::Admitted { .. } => None,
        }
    }
}
