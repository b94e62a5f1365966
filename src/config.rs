//! Declarative configuration for the whole gate.
//!
//! A [`TurnstileConfig`] is deserialized from JSON, validated in full, and only
//! then turned into a [`RuleSet`], a [`StrategyRegistry`] or a ready
//! [`Pipeline`]. Nothing is built from a config that fails validation.
//!
//! ```rust
//! use turnstile::config::TurnstileConfig;
//!
//! let config = TurnstileConfig::from_json_str(r#"{
//!     "rate_limit": {
//!         "ip": { "algorithm": "token_bucket", "requests_per_second": 5, "burst_capacity": 10 }
//!     },
//!     "authorization": {
//!         "strategies": [
//!             { "name": "health", "path": { "exact": "/health" }, "grant": { "kind": "public" } }
//!         ]
//!     }
//! }"#).unwrap();
//! let rules = config.rule_set().unwrap();
//! assert!(rules.dimension(turnstile::rate_limit::Dimension::Ip).rule.enabled());
//! ```

use crate::admission::{AdmissionController, FailurePolicy, RuleSet, DEFAULT_FALLBACK_CAPACITY};
use crate::authz::{
    ClaimRequirement, DecisionEngine, OwnershipRule, PathMatcher, Strategy, StrategyKind,
    StrategyRegistry,
};
use crate::error::ConfigError;
use crate::pipeline::Pipeline;
use crate::principal::PrincipalResolver;
use crate::rate_limit::{Algorithm, CounterStore, Dimension, RateLimitRule};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::error;

/// Top-level configuration document.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Admission settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Authorization settings.
    #[serde(default)]
    pub authorization: AuthorizationConfig,
}

/// Per-dimension rules plus admission-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default)]
    pub global: DimensionConfig,
    #[serde(default)]
    pub ip: DimensionConfig,
    #[serde(default)]
    pub user: DimensionConfig,
    #[serde(default)]
    pub endpoint: DimensionConfig,
    /// Route template -> rule replacing the ENDPOINT rule for that route.
    #[serde(default)]
    pub endpoint_overrides: BTreeMap<String, RuleConfig>,
    /// Client IPs that bypass admission.
    #[serde(default)]
    pub exempt_ips: Vec<String>,
    /// Key bound for the fail-open fallback counters.
    #[serde(default = "default_fallback_capacity")]
    pub fallback_capacity: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            global: DimensionConfig::default(),
            ip: DimensionConfig::default(),
            user: DimensionConfig::default(),
            endpoint: DimensionConfig::default(),
            endpoint_overrides: BTreeMap::new(),
            exempt_ips: Vec::new(),
            fallback_capacity: DEFAULT_FALLBACK_CAPACITY,
        }
    }
}

fn default_fallback_capacity() -> usize {
    DEFAULT_FALLBACK_CAPACITY
}

/// Rule fields as written in the document.
///
/// A block that is present is enabled unless it says otherwise;
/// `burst_capacity` defaults to `requests_per_second` and
/// `time_window_seconds` to 1.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_algorithm")]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub requests_per_second: u32,
    #[serde(default)]
    pub burst_capacity: Option<u32>,
    #[serde(default = "default_window")]
    pub time_window_seconds: u32,
}

impl Default for RuleConfig {
    /// A disabled rule; used for dimensions absent from the document.
    fn default() -> Self {
        Self {
            enabled: false,
            algorithm: default_algorithm(),
            requests_per_second: 0,
            burst_capacity: None,
            time_window_seconds: default_window(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_algorithm() -> Algorithm {
    Algorithm::TokenBucket
}

fn default_window() -> u32 {
    1
}

impl RuleConfig {
    /// Validate and convert. `label` names the rule in errors.
    pub fn to_rule(&self, label: &str) -> Result<RateLimitRule, ConfigError> {
        RateLimitRule::from_parts(
            label,
            self.enabled,
            self.algorithm,
            self.requests_per_second,
            self.burst_capacity.unwrap_or(self.requests_per_second),
            self.time_window_seconds,
        )
    }
}

/// One dimension: its rule plus what to do when the counter store is down.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DimensionConfig {
    #[serde(flatten)]
    pub rule: RuleConfig,
    #[serde(default)]
    pub on_store_unavailable: FailurePolicy,
}

/// Registered strategies, in any order; priority decides evaluation order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    #[serde(default)]
    pub strategies: Vec<StrategyConfig>,
}

/// One authorization strategy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Unique name, reported in decisions.
    pub name: String,
    /// Lower runs first.
    #[serde(default)]
    pub priority: i32,
    /// Which paths the strategy handles.
    pub path: MatcherConfig,
    /// How it decides.
    pub grant: GrantConfig,
}

/// Path matcher as written in the document, e.g. `{ "prefix": "/public/" }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherConfig {
    Exact(String),
    Prefix(String),
    /// Regular expression; compiled at validation time.
    Pattern(String),
}

/// Claim name/value pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimConfig {
    pub claim: String,
    pub value: String,
}

/// Decision rule, e.g. `{ "kind": "resource_ownership", "segment_index": 3 }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GrantConfig {
    Public,
    Authenticated,
    RequireClaim {
        claim: String,
        value: String,
    },
    ResourceOwnership {
        /// Zero-based index into the non-empty path segments.
        segment_index: usize,
        #[serde(default)]
        privileged: Option<ClaimConfig>,
    },
    DenyAll,
}

impl TurnstileConfig {
    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|err| {
            error!(target: "turnstile::config", error = %err, "failed to parse configuration");
            ConfigError::Parse(err)
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every rule and strategy without building anything long-lived.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let result = self.rule_set().and_then(|_| self.strategy_registry()).map(|_| ());
        if let Err(err) = &result {
            error!(target: "turnstile::config", error = %err, "invalid configuration");
        }
        result
    }

    /// Admission rules described by this config.
    pub fn rule_set(&self) -> Result<RuleSet, ConfigError> {
        let rl = &self.rate_limit;
        if rl.fallback_capacity == 0 {
            return Err(ConfigError::NonPositive {
                dimension: "rate_limit".into(),
                field: "fallback_capacity",
            });
        }

        let mut rules = RuleSet::new();
        for (dimension, config) in [
            (Dimension::Global, &rl.global),
            (Dimension::Ip, &rl.ip),
            (Dimension::User, &rl.user),
            (Dimension::Endpoint, &rl.endpoint),
        ] {
            let rule = config.rule.to_rule(dimension.as_str())?;
            rules = rules.with_dimension(dimension, rule, config.on_store_unavailable);
        }

        for (route, config) in &rl.endpoint_overrides {
            let rule = config.to_rule(&format!("endpoint_overrides[{route}]"))?;
            rules = rules.with_endpoint_override(route.clone(), rule);
        }

        for ip in &rl.exempt_ips {
            if ip.trim().is_empty() {
                return Err(ConfigError::EmptyExemptIp);
            }
            rules = rules.with_exempt_ip(ip.trim());
        }
        Ok(rules)
    }

    /// Strategies described by this config, sorted and frozen.
    pub fn strategy_registry(&self) -> Result<StrategyRegistry, ConfigError> {
        let mut builder = StrategyRegistry::builder();
        let mut names = HashSet::new();
        for config in &self.authorization.strategies {
            if !names.insert(config.name.as_str()) {
                return Err(ConfigError::DuplicateStrategy(config.name.clone()));
            }
            builder = builder.register(config.to_strategy()?);
        }
        builder.build()
    }

    /// Admission controller over `store`, honoring `fallback_capacity`.
    pub fn admission_controller(
        &self,
        store: Arc<dyn CounterStore>,
    ) -> Result<AdmissionController, ConfigError> {
        Ok(AdmissionController::new(self.rule_set()?, store)
            .with_fallback_capacity(self.rate_limit.fallback_capacity))
    }

    /// Fully wired pipeline with the no-op telemetry sink.
    pub fn build_pipeline(
        &self,
        store: Arc<dyn CounterStore>,
        resolver: Arc<dyn PrincipalResolver>,
    ) -> Result<Pipeline, ConfigError> {
        let admission = self.admission_controller(store)?;
        let engine = DecisionEngine::new(self.strategy_registry()?);
        Ok(Pipeline::new(admission, engine, resolver))
    }
}

impl StrategyConfig {
    /// Validate and convert into a runtime [`Strategy`].
    pub fn to_strategy(&self) -> Result<Strategy, ConfigError> {
        if self.name.trim().is_empty() {
            return Err(self.invalid("name must not be empty"));
        }
        let matcher = match &self.path {
            MatcherConfig::Exact(path) => PathMatcher::Exact(path.clone()),
            MatcherConfig::Prefix(prefix) => PathMatcher::Prefix(prefix.clone()),
            MatcherConfig::Pattern(pattern) => PathMatcher::pattern(pattern).map_err(|source| {
                ConfigError::InvalidPattern { strategy: self.name.clone(), source }
            })?,
        };
        let kind = match &self.grant {
            GrantConfig::Public => StrategyKind::Public,
            GrantConfig::Authenticated => StrategyKind::Authenticated,
            GrantConfig::DenyAll => StrategyKind::DenyAll,
            GrantConfig::RequireClaim { claim, value } => {
                StrategyKind::RequireClaim(self.claim(claim, value)?)
            }
            GrantConfig::ResourceOwnership { segment_index, privileged } => {
                let mut rule = OwnershipRule::new(*segment_index);
                if let Some(privileged) = privileged {
                    rule = rule.with_privileged(self.claim(&privileged.claim, &privileged.value)?);
                }
                StrategyKind::ResourceOwnership(rule)
            }
        };
        Ok(Strategy::new(self.name.clone(), self.priority, matcher, kind))
    }

    fn claim(&self, claim: &str, value: &str) -> Result<ClaimRequirement, ConfigError> {
        if claim.is_empty() || value.is_empty() {
            return Err(self.invalid("claim and value must not be empty"));
        }
        Ok(ClaimRequirement::new(claim, value))
    }

    fn invalid(&self, reason: &str) -> ConfigError {
        ConfigError::InvalidStrategy { strategy: self.name.clone(), reason: reason.to_string() }
    }
}
