#![forbid(unsafe_code)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # Turnstile
//!
//! Request admission and authorization for HTTP services: rate limits are
//! checked first, then a single authorization strategy decides.
//!
//! ## Features
//!
//! - **Rate limiting** per dimension (global, client IP, user, endpoint) with
//!   token bucket, leaky bucket, fixed window and sliding window algorithms
//! - **Atomic counters** through a pluggable [`CounterStore`] that runs each
//!   check as one read-modify-write transaction
//! - **Fail-closed by default** when the counter store is down, with opt-in
//!   fail-open fallback counters per dimension
//! - **Deny-by-default authorization** via a priority-ordered strategy registry,
//!   including a resource-ownership check
//! - **Hot reload** of rate limit rules, and a tower layer for service stacks
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use turnstile::prelude::*;
//!
//! #[tokio::main]
//! async fn main() {
//!     let bucket = RateLimitRule::new(Algorithm::TokenBucket, 5, 5, 1).unwrap();
//!     let rules = RuleSet::new().with_rule(Dimension::Ip, bucket);
//!     let admission = AdmissionController::new(rules, Arc::new(InMemoryCounterStore::new()));
//!     let health = PathMatcher::Exact("/health".into());
//!     let registry = StrategyRegistry::builder()
//!         .register(Strategy::new("health", 0, health, StrategyKind::Public))
//!         .build()
//!         .unwrap();
//!     let pipeline = Pipeline::new(
//!         admission,
//!         DecisionEngine::new(registry),
//!         Arc::new(StaticTokenResolver::new()),
//!     );
//!
//!     let outcome = pipeline.handle(&RequestDescriptor::new("/health", "203.0.113.9")).await;
//!     assert!(outcome.is_proceed());
//!
//!     let outcome = pipeline.handle(&RequestDescriptor::new("/admin", "203.0.113.9")).await;
//!     assert!(matches!(outcome, Outcome::RejectedByAuthorization { .. }));
//! }
//! ```

pub mod adaptive;
pub mod admission;
pub mod authz;
pub mod clock;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod principal;
pub mod rate_limit;
pub mod request;
pub mod telemetry;

// Re-exports
pub use adaptive::DynamicConfig;
pub use admission::{Admission, AdmissionController, FailurePolicy, RuleSet};
pub use authz::{AuthorizationContext, Decision, DecisionEngine, Strategy, StrategyRegistry};
pub use clock::{Clock, ManualClock, MonotonicClock, SystemClock};
pub use config::TurnstileConfig;
pub use error::{ConfigError, GateError, PathFormatError, ResolveError, StoreError};
pub use pipeline::{GatekeeperLayer, GatekeeperService, Outcome, Pipeline, Stage};
pub use principal::{Principal, PrincipalResolver, PrincipalSlot};
pub use rate_limit::{
    Algorithm, CounterStore, Dimension, InMemoryCounterStore, RateLimitEvaluator, RateLimitRule,
    Verdict,
};
pub use request::RequestDescriptor;
