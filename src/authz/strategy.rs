use super::{AuthorizationContext, Decision};
use crate::error::{PathFormatError, ResolveError, StrategyError};
use crate::principal::Principal;
use regex::Regex;

/// Which paths a strategy handles.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    /// Path equals the string.
    Exact(String),
    /// Path starts with the string.
    Prefix(String),
    /// Path matches the regex. Anchor it yourself (`^...$`) for full matches.
    Pattern(Regex),
}

impl PathMatcher {
    /// Compile a regex matcher.
    pub fn pattern(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(PathMatcher::Pattern)
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Exact(exact) => path == exact,
            PathMatcher::Prefix(prefix) => path.starts_with(prefix.as_str()),
            PathMatcher::Pattern(regex) => regex.is_match(path),
        }
    }
}

/// A claim name/value pair the principal must hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRequirement {
    pub claim: String,
    pub value: String,
}

impl ClaimRequirement {
    pub fn new(claim: impl Into<String>, value: impl Into<String>) -> Self {
        Self { claim: claim.into(), value: value.into() }
    }

    pub fn is_met_by(&self, principal: &Principal) -> bool {
        principal.has_claim_value(&self.claim, &self.value)
    }
}

/// "Users may only touch their own records" check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnershipRule {
    /// Zero-based index into the non-empty path segments holding the resource id.
    pub segment_index: usize,
    /// Principals holding this claim bypass the ownership comparison.
    pub privileged: Option<ClaimRequirement>,
}

impl OwnershipRule {
    pub fn new(segment_index: usize) -> Self {
        Self { segment_index, privileged: None }
    }

    pub fn with_privileged(mut self, requirement: ClaimRequirement) -> Self {
        self.privileged = Some(requirement);
        self
    }

    fn resource_id(&self, segments: &[String]) -> Result<i64, PathFormatError> {
        let segment = segments.get(self.segment_index).ok_or(PathFormatError::TooFewSegments {
            needed: self.segment_index + 1,
            found: segments.len(),
        })?;
        // Digits only: `+42` and `-1` must not alias `42` and `1`.
        let non_numeric = || PathFormatError::NonNumericId(segment.clone());
        if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
            return Err(non_numeric());
        }
        segment.parse::<i64>().map_err(|_| non_numeric())
    }
}

/// How a strategy decides. A closed set, so selection stays total.
#[derive(Debug, Clone)]
pub enum StrategyKind {
    /// Always grant.
    Public,
    /// Grant iff the bearer token resolves to a principal.
    Authenticated,
    /// Grant iff the principal holds the claim.
    RequireClaim(ClaimRequirement),
    /// Grant iff the path's resource id equals the principal id (or the principal is privileged).
    ResourceOwnership(OwnershipRule),
    /// Always deny.
    DenyAll,
}

/// A registered authorization strategy.
///
/// Lower `priority` values are tried first. Give cheap exact matchers low
/// values and regex/token-parsing strategies high ones.
#[derive(Debug, Clone)]
pub struct Strategy {
    name: String,
    priority: i32,
    matcher: PathMatcher,
    kind: StrategyKind,
}

impl Strategy {
    pub fn new(
        name: impl Into<String>,
        priority: i32,
        matcher: PathMatcher,
        kind: StrategyKind,
    ) -> Self {
        Self { name: name.into(), priority, matcher, kind }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn kind(&self) -> &StrategyKind {
        &self.kind
    }

    /// Whether this strategy handles `path`.
    pub fn supports(&self, path: &str) -> bool {
        self.matcher.matches(path)
    }

    /// Decide for `ctx`.
    ///
    /// Errors describe why no decision could be reached; the engine turns them
    /// into denials.
    pub async fn evaluate(&self, ctx: &AuthorizationContext) -> Result<Decision, StrategyError> {
        match &self.kind {
            StrategyKind::Public => Ok(Decision::grant()),
            StrategyKind::DenyAll => Ok(Decision::deny("denied by policy")),
            StrategyKind::Authenticated => {
                let principal = ctx.principal().resolve().await?;
                Ok(Decision::grant_because(format!("authenticated as {}", principal.id)))
            }
            StrategyKind::RequireClaim(requirement) => {
                let principal = ctx.principal().resolve().await?;
                if requirement.is_met_by(principal) {
                    Ok(Decision::grant())
                } else {
                    Ok(Decision::deny(format!(
                        "principal {} lacks {}={}",
                        principal.id, requirement.claim, requirement.value
                    )))
                }
            }
            StrategyKind::ResourceOwnership(rule) => evaluate_ownership(rule, ctx).await,
        }
    }
}

async fn evaluate_ownership(
    rule: &OwnershipRule,
    ctx: &AuthorizationContext,
) -> Result<Decision, StrategyError> {
    let resource_id = rule.resource_id(ctx.segments())?;

    // No token means no resolver call at all.
    if !ctx.principal().has_token() {
        return Err(ResolveError::MissingToken.into());
    }
    let principal = ctx.principal().resolve().await?;

    if let Some(privileged) = &rule.privileged {
        if privileged.is_met_by(principal) {
            return Ok(Decision::grant_because(format!(
                "privileged {}={}",
                privileged.claim, privileged.value
            )));
        }
    }

    if principal.id == resource_id {
        Ok(Decision::grant())
    } else {
        Ok(Decision::deny(format!(
            "principal {} does not own resource {}",
            principal.id, resource_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::{PrincipalSlot, StaticTokenResolver};
    use crate::request::RequestDescriptor;
    use std::sync::Arc;

    fn ctx(
        path: &str,
        token: Option<&str>,
        resolver: Arc<StaticTokenResolver>,
    ) -> AuthorizationContext {
        let mut request = RequestDescriptor::new(path, "10.0.0.1");
        if let Some(token) = token {
            request = request.with_header("Authorization", format!("Bearer {token}"));
        }
        let slot = PrincipalSlot::new(request.bearer_token().map(str::to_string), resolver);
        AuthorizationContext::new(&request, Arc::new(slot))
    }

    fn owner_strategy() -> Strategy {
        Strategy::new(
            "user-ownership",
            100,
            PathMatcher::pattern(r"^/api/v1/users/[^/]+$").unwrap(),
            StrategyKind::ResourceOwnership(
                OwnershipRule::new(3).with_privileged(ClaimRequirement::new("role", "admin")),
            ),
        )
    }

    #[test]
    fn matchers() {
        assert!(PathMatcher::Exact("/health".into()).matches("/health"));
        assert!(!PathMatcher::Exact("/health".into()).matches("/health/db"));
        assert!(PathMatcher::Prefix("/public/".into()).matches("/public/logo.png"));
        let pattern = PathMatcher::pattern(r"^/api/v1/users/\d+$").unwrap();
        assert!(pattern.matches("/api/v1/users/42"));
        assert!(!pattern.matches("/api/v1/users/42/orders"));
    }

    #[tokio::test]
    async fn ownership_compares_ids() {
        let resolver = Arc::new(
            StaticTokenResolver::new()
                .with_token("t42", Principal::new(42))
                .with_token("t43", Principal::new(43)),
        );
        let strategy = owner_strategy();
        let granted =
            strategy.evaluate(&ctx("/api/v1/users/42", Some("t42"), resolver.clone())).await;
        assert!(granted.unwrap().granted);
        let denied = strategy.evaluate(&ctx("/api/v1/users/42", Some("t43"), resolver)).await;
        assert!(!denied.unwrap().granted);
    }

    #[tokio::test]
    async fn privileged_principal_bypasses_ownership() {
        let root = Principal::new(1).with_claim("role", "admin");
        let resolver = Arc::new(StaticTokenResolver::new().with_token("root", root));
        let decision = owner_strategy()
            .evaluate(&ctx("/api/v1/users/42", Some("root"), resolver))
            .await
            .unwrap();
        assert!(decision.granted);
        assert_eq!(decision.reason.as_deref(), Some("privileged role=admin"));
    }

    #[tokio::test]
    async fn ownership_path_errors() {
        let resolver = Arc::new(StaticTokenResolver::new().with_token("t", Principal::new(1)));
        let strategy = owner_strategy();

        let err = strategy.evaluate(&ctx("/api/v1/users/abc", Some("t"), resolver.clone())).await;
        assert_eq!(
            err.unwrap_err(),
            StrategyError::PathFormat(PathFormatError::NonNumericId("abc".into()))
        );

        for id in ["+42", "-1", "4_2", " 42"] {
            let path = format!("/api/v1/users/{id}");
            let err = strategy.evaluate(&ctx(&path, Some("t"), resolver.clone())).await;
            assert_eq!(
                err.unwrap_err(),
                StrategyError::PathFormat(PathFormatError::NonNumericId(id.into()))
            );
        }

        let short = Strategy::new(
            "short",
            0,
            PathMatcher::Prefix("/".into()),
            StrategyKind::ResourceOwnership(OwnershipRule::new(3)),
        );
        let err = short.evaluate(&ctx("/api/v1", Some("t"), resolver.clone())).await;
        assert_eq!(
            err.unwrap_err(),
            StrategyError::PathFormat(PathFormatError::TooFewSegments { needed: 4, found: 2 })
        );
        assert_eq!(resolver.calls(), 0, "path errors stop before resolution");
    }

    #[tokio::test]
    async fn require_claim_checks_principal() {
        let resolver = Arc::new(
            StaticTokenResolver::new()
                .with_token("ops", Principal::new(5).with_claim("scope", "read,write"))
                .with_token("ro", Principal::new(6).with_claim("scope", "read")),
        );
        let strategy = Strategy::new(
            "writers",
            10,
            PathMatcher::Prefix("/api/v1/admin".into()),
            StrategyKind::RequireClaim(ClaimRequirement::new("scope", "write")),
        );
        let ok = strategy.evaluate(&ctx("/api/v1/admin", Some("ops"), resolver.clone())).await;
        assert!(ok.unwrap().granted);
        let no = strategy.evaluate(&ctx("/api/v1/admin", Some("ro"), resolver)).await;
        assert!(!no.unwrap().granted);
    }
}
