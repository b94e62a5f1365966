//! Error types for admission and authorization.
//!
//! [`ConfigError`] is raised while building the pipeline and is fatal.
//! [`GateError`] is what the tower service returns for rejected requests.
//! Everything else is produced while evaluating one request and is converted
//! into a reject/deny decision by the component that produced it.

use crate::rate_limit::Dimension;
use std::time::Duration;

/// Invalid configuration. Fatal at startup, never raised at request time.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// `burst_capacity` is smaller than `requests_per_second`.
    #[error("{dimension}: burst_capacity ({burst}) must be >= requests_per_second ({rate})")]
    BurstBelowRate {
        /// Dimension (or override) the rule belongs to.
        dimension: String,
        /// Configured burst capacity.
        burst: u32,
        /// Configured rate.
        rate: u32,
    },
    /// A numeric field that must be positive was zero.
    #[error("{dimension}: {field} must be > 0")]
    NonPositive {
        /// Dimension (or override) the rule belongs to.
        dimension: String,
        /// Name of the offending field.
        field: &'static str,
    },
    /// A path pattern failed to compile.
    #[error("strategy '{strategy}': invalid path pattern: {source}")]
    InvalidPattern {
        /// Strategy name.
        strategy: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },
    /// Two strategies registered under the same name.
    #[error("strategy '{0}' registered twice")]
    DuplicateStrategy(String),
    /// A strategy setting is out of range.
    #[error("strategy '{strategy}': {reason}")]
    InvalidStrategy {
        /// Strategy name.
        strategy: String,
        /// What is wrong with it.
        reason: String,
    },
    /// An exempt IP entry is empty.
    #[error("exempt_ips contains an empty entry")]
    EmptyExemptIp,
    /// The configuration document could not be parsed.
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The shared counter store could not complete a transaction.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StoreError {
    /// Store is unreachable or timed out.
    #[error("counter store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// True for outages that the admission failure policy should handle.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A bearer token could not be turned into a principal.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ResolveError {
    /// No usable `Authorization: Bearer` header on the request.
    #[error("missing bearer token")]
    MissingToken,
    /// The token was rejected by the resolver.
    #[error("invalid token: {0}")]
    InvalidToken(String),
    /// The token is past its expiry.
    #[error("token expired")]
    Expired,
    /// The resolver backend failed or was unreachable.
    #[error("resolver backend error: {0}")]
    Backend(String),
}

/// The request path does not have the shape a strategy expects.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PathFormatError {
    /// Not enough `/`-delimited segments.
    #[error("path has {found} segments, need at least {needed}")]
    TooFewSegments {
        /// Segments required to reach the configured index.
        needed: usize,
        /// Segments actually present.
        found: usize,
    },
    /// The resource id segment is not numeric.
    #[error("resource id '{0}' is not numeric")]
    NonNumericId(String),
}

/// Failure while a strategy evaluates a request. Always becomes a deny.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StrategyError {
    /// Path did not match the strategy's expected layout.
    #[error("path format: {0}")]
    PathFormat(#[from] PathFormatError),
    /// Principal could not be resolved.
    #[error("principal resolution: {0}")]
    Principal(#[from] ResolveError),
}

/// Error surfaced by [`GatekeeperService`](crate::pipeline::GatekeeperService).
///
/// The two rejection variants are definite answers for the transport layer;
/// only `Inner` carries a fault from the wrapped service.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum GateError<E> {
    /// A rate limit dimension rejected the request.
    #[error("rate limited on {dimension} dimension")]
    RateLimited {
        /// Dimension that rejected.
        dimension: Dimension,
        /// Retry hint for a `Retry-After` header.
        retry_after: Option<Duration>,
    },
    /// Authorization denied the request.
    #[error("forbidden: {reason}")]
    Forbidden {
        /// Audit reason from the deciding strategy.
        reason: String,
    },
    /// The wrapped service failed.
    #[error("{0}")]
    Inner(E),
}

impl<E> GateError<E> {
    /// Check if this error is a rate limit rejection.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Check if this error is an authorization denial.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }

    /// Get the inner error if this is an Inner variant.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(e) => Some(e),
            _ => None,
        }
    }
}
