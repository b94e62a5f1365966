//! Principal resolution from bearer tokens.
//!
//! Token validation (signature, expiry) belongs to the [`PrincipalResolver`]
//! implementation. This module only fixes the async contract and caches the
//! outcome for the lifetime of one request.

use crate::error::ResolveError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Authenticated identity behind a request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Principal {
    /// Numeric user id, compared against resource ids by ownership checks.
    pub id: i64,
    /// Claims from the token (roles, scopes, ...).
    pub claims: HashMap<String, String>,
}

impl Principal {
    pub fn new(id: i64) -> Self {
        Self { id, claims: HashMap::new() }
    }

    /// Add a claim.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn claim(&self, name: &str) -> Option<&str> {
        self.claims.get(name).map(String::as_str)
    }

    /// True when `name` holds `value`, either exactly or as one entry of a
    /// comma-separated list (`roles=user,admin`).
    pub fn has_claim_value(&self, name: &str, value: &str) -> bool {
        self.claim(name).is_some_and(|held| held.split(',').any(|v| v.trim() == value))
    }
}

/// Turns a bearer token into a [`Principal`].
#[async_trait]
pub trait PrincipalResolver: Send + Sync + std::fmt::Debug {
    /// Resolve `token`. Any failure is reported, never panicked.
    async fn resolve(&self, token: &str) -> Result<Principal, ResolveError>;
}

/// Per-request principal cache.
///
/// The resolver is called at most once per request, and only if a token is
/// present. Both success and failure are remembered.
#[derive(Debug)]
pub struct PrincipalSlot {
    token: Option<String>,
    resolver: Arc<dyn PrincipalResolver>,
    cell: OnceCell<Result<Principal, ResolveError>>,
}

impl PrincipalSlot {
    pub fn new(token: Option<String>, resolver: Arc<dyn PrincipalResolver>) -> Self {
        Self { token, resolver, cell: OnceCell::new() }
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Resolve (or return the cached outcome).
    ///
    /// Without a token this is `Err(MissingToken)` and the resolver is not called.
    pub async fn resolve(&self) -> Result<&Principal, ResolveError> {
        let Some(token) = self.token.as_deref() else {
            return Err(ResolveError::MissingToken);
        };
        let resolver = &self.resolver;
        let outcome = self.cell.get_or_init(|| async move { resolver.resolve(token).await }).await;
        outcome.as_ref().map_err(Clone::clone)
    }

    /// The principal, if resolution already happened and succeeded.
    pub fn resolved(&self) -> Option<&Principal> {
        self.cell.get().and_then(|outcome| outcome.as_ref().ok())
    }
}

/// Resolver backed by a fixed token table.
///
/// Meant for tests and local development; unknown tokens are rejected.
/// Counts calls so tests can assert that resolution was skipped.
#[derive(Debug, Default)]
pub struct StaticTokenResolver {
    tokens: HashMap<String, Principal>,
    expired: Vec<String>,
    calls: AtomicUsize,
}

impl StaticTokenResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `token` to `principal`.
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    /// Mark `token` as expired.
    pub fn with_expired(mut self, token: impl Into<String>) -> Self {
        self.expired.push(token.into());
        self
    }

    /// Number of `resolve` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PrincipalResolver for StaticTokenResolver {
    async fn resolve(&self, token: &str) -> Result<Principal, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.expired.iter().any(|t| t == token) {
            return Err(ResolveError::Expired);
        }
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| ResolveError::InvalidToken("unknown token".into()))
    }
}
