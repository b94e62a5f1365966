use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Rate limiting algorithm applied to one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Continuous refill at `requests_per_second`, up to `burst_capacity` tokens.
    TokenBucket,
    /// Queue of depth `burst_capacity` draining at `requests_per_second`.
    LeakyBucket,
    /// Two adjacent fixed windows blended by elapsed fraction.
    SlidingWindow,
    /// Counter reset at every `time_window_seconds` boundary.
    FixedWindow,
}

/// Axis along which traffic is metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    /// One counter for all traffic.
    Global,
    /// Per client IP.
    Ip,
    /// Per resolved principal.
    User,
    /// Per matched route template.
    Endpoint,
}

impl Dimension {
    /// Evaluation order used by admission. Cheapest, widest checks first.
    pub const ORDER: [Dimension; 4] =
        [Dimension::Global, Dimension::Ip, Dimension::User, Dimension::Endpoint];

    /// Stable lowercase name, used in store keys and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Dimension::Global => "global",
            Dimension::Ip => "ip",
            Dimension::User => "user",
            Dimension::Endpoint => "endpoint",
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated, immutable rule for one dimension.
///
/// An enabled rule always satisfies `requests_per_second > 0`,
/// `time_window_seconds > 0` and `burst_capacity >= requests_per_second`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitRule {
    enabled: bool,
    algorithm: Algorithm,
    requests_per_second: u32,
    burst_capacity: u32,
    time_window_seconds: u32,
}

impl RateLimitRule {
    /// Create an enabled rule, validating the numbers.
    ///
    /// # Examples
    /// ```
    /// use turnstile::rate_limit::{Algorithm, RateLimitRule};
    /// let rule = RateLimitRule::new(Algorithm::TokenBucket, 5, 10, 1).unwrap();
    /// assert_eq!(rule.window_limit(), 5);
    /// assert!(RateLimitRule::new(Algorithm::TokenBucket, 5, 4, 1).is_err());
    /// ```
    pub fn new(
        algorithm: Algorithm,
        requests_per_second: u32,
        burst_capacity: u32,
        time_window_seconds: u32,
    ) -> Result<Self, ConfigError> {
        let rule = Self {
            enabled: true,
            algorithm,
            requests_per_second,
            burst_capacity,
            time_window_seconds,
        };
        rule.validate("rule")?;
        Ok(rule)
    }

    /// A rule that never participates in admission.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            algorithm: Algorithm::TokenBucket,
            requests_per_second: 0,
            burst_capacity: 0,
            time_window_seconds: 0,
        }
    }

    pub(crate) fn from_parts(
        label: &str,
        enabled: bool,
        algorithm: Algorithm,
        requests_per_second: u32,
        burst_capacity: u32,
        time_window_seconds: u32,
    ) -> Result<Self, ConfigError> {
        let rule =
            Self { enabled, algorithm, requests_per_second, burst_capacity, time_window_seconds };
        rule.validate(label)?;
        Ok(rule)
    }

    /// Check the load-time invariants. Disabled rules are not checked.
    pub fn validate(&self, label: &str) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        if self.requests_per_second == 0 {
            return Err(ConfigError::NonPositive {
                dimension: label.to_string(),
                field: "requests_per_second",
            });
        }
        if self.time_window_seconds == 0 {
            return Err(ConfigError::NonPositive {
                dimension: label.to_string(),
                field: "time_window_seconds",
            });
        }
        if self.burst_capacity < self.requests_per_second {
            return Err(ConfigError::BurstBelowRate {
                dimension: label.to_string(),
                burst: self.burst_capacity,
                rate: self.requests_per_second,
            });
        }
        Ok(())
    }

    /// Whether this rule participates in admission.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Algorithm used for this rule.
    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sustained rate.
    pub fn requests_per_second(&self) -> u32 {
        self.requests_per_second
    }

    /// Bucket capacity (token bucket) or queue depth (leaky bucket).
    pub fn burst_capacity(&self) -> u32 {
        self.burst_capacity
    }

    /// Window length for the window algorithms.
    pub fn time_window_seconds(&self) -> u32 {
        self.time_window_seconds
    }

    /// Requests allowed per window: `requests_per_second * time_window_seconds`.
    pub fn window_limit(&self) -> u64 {
        u64::from(self.requests_per_second) * u64::from(self.time_window_seconds)
    }

    pub(crate) fn window_millis(&self) -> u64 {
        u64::from(self.time_window_seconds) * 1_000
    }

    /// How long idle state for this rule must be kept before it is
    /// indistinguishable from fresh state.
    pub fn state_ttl(&self) -> Duration {
        match self.algorithm {
            Algorithm::TokenBucket | Algorithm::LeakyBucket => {
                let rate = u64::from(self.requests_per_second.max(1));
                let secs = ((u64::from(self.burst_capacity) + rate - 1) / rate).max(1);
                Duration::from_secs(secs)
            }
            Algorithm::FixedWindow => Duration::from_secs(u64::from(self.time_window_seconds)),
            Algorithm::SlidingWindow => {
                Duration::from_secs(2 * u64::from(self.time_window_seconds))
            }
        }
    }
}
