use crate::principal::PrincipalSlot;
use crate::request::RequestDescriptor;
use std::collections::HashMap;
use std::sync::Arc;

/// Read-only view of one request for authorization strategies.
///
/// Built once per request. The only interior state is the principal cache,
/// which resolves at most once.
#[derive(Debug, Clone)]
pub struct AuthorizationContext {
    path: String,
    headers: HashMap<String, String>,
    segments: Vec<String>,
    principal: Arc<PrincipalSlot>,
}

impl AuthorizationContext {
    /// Snapshot `request`, sharing the request's principal cache.
    pub fn new(request: &RequestDescriptor, principal: Arc<PrincipalSlot>) -> Self {
        Self {
            path: request.path.clone(),
            headers: request.headers.clone(),
            segments: split_segments(&request.path),
            principal,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Non-empty `/`-delimited path segments; `/api/v1/users/42` gives
    /// `["api", "v1", "users", "42"]`.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Lazily resolved caller.
    pub fn principal(&self) -> &PrincipalSlot {
        &self.principal
    }
}

fn split_segments(path: &str) -> Vec<String> {
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}
