//! Inbound request descriptor handed over by the transport layer.

use std::collections::HashMap;

/// Header carrying the bearer token.
pub const AUTHORIZATION: &str = "authorization";

const BEARER_SCHEME: &str = "bearer";

/// Pre-parsed request: everything admission and authorization look at.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Request path, without query string.
    pub path: String,
    /// Client address as seen by the transport (after proxy resolution).
    pub client_ip: String,
    /// Request headers. Names are matched case-insensitively.
    pub headers: HashMap<String, String>,
    /// Route template matched by the router (e.g. `/api/v1/users/{id}`).
    /// The ENDPOINT dimension falls back to `path` when absent.
    pub route: Option<String>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>, client_ip: impl Into<String>) -> Self {
        Self { path: path.into(), client_ip: client_ip.into(), ..Self::default() }
    }

    /// Add a header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Set the matched route template.
    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Token from an `Authorization: Bearer <token>` header.
    ///
    /// Any other shape (other scheme, empty token, embedded whitespace) counts
    /// as no token at all.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header(AUTHORIZATION)?.trim();
        let (scheme, token) = value.split_once(' ')?;
        if !scheme.eq_ignore_ascii_case(BEARER_SCHEME) {
            return None;
        }
        let token = token.trim();
        if token.is_empty() || token.contains(char::is_whitespace) {
            return None;
        }
        Some(token)
    }

    /// Identity for the ENDPOINT dimension.
    pub fn endpoint(&self) -> &str {
        self.route.as_deref().unwrap_or(&self.path)
    }
}
