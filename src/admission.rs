//! Admission control: per-dimension rate limits composed with AND semantics.
//!
//! Dimensions are checked in [`Dimension::ORDER`] and evaluation stops at the
//! first rejection. The USER dimension only applies when a principal can be
//! resolved; anonymous requests and bad tokens skip it instead of being
//! rejected by it. The principal is resolved only once evaluation reaches the
//! USER dimension, so requests rejected by GLOBAL or IP never cost a resolver
//! call.
//!
//! When the shared counter store is unreachable, each dimension follows its
//! [`FailurePolicy`]: fail-closed rejects, fail-open meters the request against
//! a bounded per-process [`InMemoryCounterStore`] until the store is back.

use crate::adaptive::DynamicConfig;
use crate::clock::{Clock, MonotonicClock, SystemClock};
use crate::principal::PrincipalSlot;
use crate::rate_limit::{
    CounterStore, Dimension, InMemoryCounterStore, RateLimitEvaluator, RateLimitKey,
    RateLimitRule, Verdict,
};
use crate::request::RequestDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Default number of keys the fail-open fallback store may hold.
pub const DEFAULT_FALLBACK_CAPACITY: usize = 10_000;

/// What a dimension does when its counter store call fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Reject the request.
    #[default]
    FailClosed,
    /// Meter against the in-process fallback counters (approximate, not shared).
    FailOpen,
}

/// Rule plus outage policy for one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DimensionRule {
    pub rule: RateLimitRule,
    pub on_store_unavailable: FailurePolicy,
}

impl Default for DimensionRule {
    fn default() -> Self {
        Self { rule: RateLimitRule::disabled(), on_store_unavailable: FailurePolicy::FailClosed }
    }
}

/// Complete admission configuration. Replaced as a whole on reload.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    global: DimensionRule,
    ip: DimensionRule,
    user: DimensionRule,
    endpoint: DimensionRule,
    endpoint_overrides: HashMap<String, RateLimitRule>,
    exempt_ips: HashSet<String>,
}

impl RuleSet {
    /// All dimensions disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the rule for `dimension` with the fail-closed default.
    pub fn with_rule(self, dimension: Dimension, rule: RateLimitRule) -> Self {
        self.with_dimension(dimension, rule, FailurePolicy::FailClosed)
    }

    /// Set the rule and outage policy for `dimension`.
    pub fn with_dimension(
        mut self,
        dimension: Dimension,
        rule: RateLimitRule,
        on_store_unavailable: FailurePolicy,
    ) -> Self {
        *self.slot_mut(dimension) = DimensionRule { rule, on_store_unavailable };
        self
    }

    /// Give one route template its own ENDPOINT rule.
    pub fn with_endpoint_override(mut self, route: impl Into<String>, rule: RateLimitRule) -> Self {
        self.endpoint_overrides.insert(route.into(), rule);
        self
    }

    /// Exempt a client IP from admission entirely.
    pub fn with_exempt_ip(mut self, ip: impl Into<String>) -> Self {
        self.exempt_ips.insert(ip.into());
        self
    }

    pub fn dimension(&self, dimension: Dimension) -> &DimensionRule {
        match dimension {
            Dimension::Global => &self.global,
            Dimension::Ip => &self.ip,
            Dimension::User => &self.user,
            Dimension::Endpoint => &self.endpoint,
        }
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut DimensionRule {
        match dimension {
            Dimension::Global => &mut self.global,
            Dimension::Ip => &mut self.ip,
            Dimension::User => &mut self.user,
            Dimension::Endpoint => &mut self.endpoint,
        }
    }

    /// Rule in force for `dimension` on this request.
    pub fn rule_for(&self, dimension: Dimension, request: &RequestDescriptor) -> RateLimitRule {
        let configured = self.dimension(dimension).rule;
        if dimension == Dimension::Endpoint {
            if let Some(rule) = self.endpoint_overrides.get(request.endpoint()) {
                return *rule;
            }
        }
        configured
    }

    pub fn is_exempt(&self, client_ip: &str) -> bool {
        self.exempt_ips.contains(client_ip)
    }

    /// Whether the USER dimension is metered at all.
    pub fn meters_users(&self) -> bool {
        self.user.rule.enabled()
    }
}

/// Result of admission control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Every applicable dimension admitted the request.
    Admitted {
        /// Smallest number of permits left across the dimensions that were
        /// checked; `None` when no dimension applied.
        remaining: Option<u64>,
    },
    /// The first dimension that rejected.
    Rejected {
        /// Dimension that rejected.
        dimension: Dimension,
        /// Retry hint; `None` when rejected because the store was down.
        retry_after: Option<Duration>,
    },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

/// Composes the [`RateLimitEvaluator`] across all enabled dimensions.
///
/// Clones share rules, store and fallback counters.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    rules: DynamicConfig<RuleSet>,
    evaluator: RateLimitEvaluator,
    fallback: RateLimitEvaluator,
}

impl AdmissionController {
    /// Controller over `store` with wall-clock time.
    ///
    /// The fallback counters never leave the process, so they run on a
    /// [`MonotonicClock`] and are immune to wall-clock steps.
    pub fn new(rules: RuleSet, store: Arc<dyn CounterStore>) -> Self {
        Self {
            rules: DynamicConfig::new(rules),
            evaluator: RateLimitEvaluator::new(store).with_shared_clock(Arc::new(SystemClock)),
            fallback: Self::fallback_evaluator(
                DEFAULT_FALLBACK_CAPACITY,
                Arc::new(MonotonicClock::default()),
            ),
        }
    }

    /// Override the clock for both the shared store and the fallback counters.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        self.evaluator = self.evaluator.with_shared_clock(clock.clone());
        self.fallback = self.fallback.with_shared_clock(clock);
        self
    }

    /// Bound the fail-open fallback store to `capacity` keys.
    pub fn with_fallback_capacity(mut self, capacity: usize) -> Self {
        self.fallback = Self::fallback_evaluator(capacity, self.fallback.clock().clone());
        self
    }

    fn fallback_evaluator(capacity: usize, clock: Arc<dyn Clock>) -> RateLimitEvaluator {
        RateLimitEvaluator::new(Arc::new(InMemoryCounterStore::bounded(capacity)))
            .with_shared_clock(clock)
    }

    /// Atomically replace the rule set. In-flight requests keep the set they started with.
    pub fn reload(&self, rules: RuleSet) {
        self.rules.set(rules);
    }

    /// Snapshot of the rules in force.
    pub fn rules(&self) -> Arc<RuleSet> {
        self.rules.get()
    }

    /// Decide whether `request` may proceed.
    ///
    /// `principal` is resolved only if the USER dimension is reached; when it
    /// holds no token or resolution fails, the USER dimension is skipped. The
    /// outcome stays cached in the slot for authorization.
    pub async fn evaluate(
        &self,
        request: &RequestDescriptor,
        principal: &PrincipalSlot,
    ) -> Admission {
        let rules = self.rules.get();
        if rules.is_exempt(&request.client_ip) {
            trace!(target: "turnstile::admission", ip = %request.client_ip, "exempt ip");
            return Admission::Admitted { remaining: None };
        }

        let mut remaining: Option<u64> = None;
        for dimension in Dimension::ORDER {
            let rule = rules.rule_for(dimension, request);
            if !rule.enabled() {
                continue;
            }
            let key = match dimension {
                Dimension::Global => RateLimitKey::global(),
                Dimension::Ip => RateLimitKey::ip(request.client_ip.as_str()),
                Dimension::User => match principal.resolve().await {
                    Ok(principal) => RateLimitKey::user(principal.id),
                    Err(err) => {
                        trace!(
                            target: "turnstile::admission",
                            error = %err,
                            "no principal; user dimension skipped"
                        );
                        continue;
                    }
                },
                Dimension::Endpoint => RateLimitKey::endpoint(request.endpoint()),
            };

            let policy = rules.dimension(dimension).on_store_unavailable;
            let verdict = match self.evaluator.admit(&rule, &key).await {
                Ok(verdict) => verdict,
                Err(err) => match policy {
                    FailurePolicy::FailClosed => {
                        warn!(
                            target: "turnstile::admission",
                            %dimension, %key, error = %err,
                            "counter store unavailable; failing closed"
                        );
                        return Admission::Rejected { dimension, retry_after: None };
                    }
                    FailurePolicy::FailOpen => {
                        warn!(
                            target: "turnstile::admission",
                            %dimension, %key, error = %err,
                            "counter store unavailable; using local fallback counters"
                        );
                        match self.fallback.admit(&rule, &key).await {
                            Ok(verdict) => verdict,
                            Err(err) => {
                                warn!(
                                    target: "turnstile::admission",
                                    %dimension, error = %err,
                                    "fallback counters failed; rejecting"
                                );
                                return Admission::Rejected { dimension, retry_after: None };
                            }
                        }
                    }
                },
            };

            match verdict {
                Verdict::Admitted { remaining: left } => {
                    remaining = Some(remaining.map_or(left, |so_far| so_far.min(left)));
                }
                Verdict::Rejected { retry_after } => {
                    debug!(
                        target: "turnstile::admission",
                        %dimension, %key, ?retry_after,
                        "rate limited"
                    );
                    return Admission::Rejected { dimension, retry_after: Some(retry_after) };
                }
            }
        }

        Admission::Admitted { remaining }
    }
}
