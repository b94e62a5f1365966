use super::Dimension;
use std::fmt;

/// Identity used for the single GLOBAL counter.
pub const GLOBAL_IDENTITY: &str = "*";

/// `(dimension, identity)` pair naming one counter.
///
/// The dimension is part of the store key, so an IP that happens to look like
/// a route (or a user id that looks like an IP) never shares state.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    dimension: Dimension,
    identity: String,
}

impl RateLimitKey {
    /// The one GLOBAL key.
    pub fn global() -> Self {
        Self { dimension: Dimension::Global, identity: GLOBAL_IDENTITY.to_string() }
    }

    /// Key for a client IP.
    pub fn ip(ip: impl Into<String>) -> Self {
        Self { dimension: Dimension::Ip, identity: ip.into() }
    }

    /// Key for a resolved principal id.
    pub fn user(principal_id: i64) -> Self {
        Self { dimension: Dimension::User, identity: principal_id.to_string() }
    }

    /// Key for a matched route template.
    pub fn endpoint(route: impl Into<String>) -> Self {
        Self { dimension: Dimension::Endpoint, identity: route.into() }
    }

    pub fn dimension(&self) -> Dimension {
        self.dimension
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Flat key for key-value stores: `turnstile:<dimension>:<identity>`.
    pub fn storage_key(&self) -> String {
        format!("turnstile:{}:{}", self.dimension, self.identity)
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dimension, self.identity)
    }
}
