//! Convenient re-exports for common Turnstile types.
pub use crate::{
    admission::{Admission, AdmissionController, FailurePolicy, RuleSet},
    authz::{
        ClaimRequirement, Decision, DecisionEngine, OwnershipRule, PathMatcher, Strategy,
        StrategyKind, StrategyRegistry,
    },
    config::TurnstileConfig,
    error::{ConfigError, GateError},
    pipeline::{GatekeeperLayer, Outcome, Pipeline},
    principal::{Principal, PrincipalResolver, PrincipalSlot, StaticTokenResolver},
    rate_limit::{Algorithm, CounterStore, Dimension, InMemoryCounterStore, RateLimitRule},
    request::RequestDescriptor,
    telemetry::{LogSink, MemorySink, NullSink},
};
