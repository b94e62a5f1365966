use super::{AuthorizationContext, Decision, Strategy};
use crate::error::{ConfigError, StrategyError};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Reason attached to the built-in deny when no strategy supports a path.
pub const NO_STRATEGY_MATCHED: &str = "no strategy matched";

/// Collects strategies before freezing them into a [`StrategyRegistry`].
#[derive(Debug, Default)]
pub struct StrategyRegistryBuilder {
    strategies: Vec<Strategy>,
}

impl StrategyRegistryBuilder {
    /// Register a strategy. Registration order breaks priority ties.
    pub fn register(mut self, strategy: Strategy) -> Self {
        self.strategies.push(strategy);
        self
    }

    /// Sort by ascending priority (stable) and freeze.
    ///
    /// # Errors
    /// [`ConfigError::DuplicateStrategy`] if two strategies share a name.
    pub fn build(mut self) -> Result<StrategyRegistry, ConfigError> {
        {
            let mut seen = HashSet::new();
            for strategy in &self.strategies {
                if !seen.insert(strategy.name()) {
                    return Err(ConfigError::DuplicateStrategy(strategy.name().to_string()));
                }
            }
        }
        self.strategies.sort_by_key(Strategy::priority);
        Ok(StrategyRegistry { strategies: self.strategies })
    }
}

/// Immutable, priority-ordered strategy list.
///
/// There is no way to add or remove strategies after `build`, so request-time
/// reads need no locking.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::default()
    }

    /// First strategy, in priority order, that supports `path`.
    pub fn select(&self, path: &str) -> Option<&Strategy> {
        self.strategies.iter().find(|strategy| strategy.supports(path))
    }

    /// Strategy names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.strategies.iter().map(Strategy::name).collect()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

/// Selects and runs the single applicable strategy.
///
/// Deny by default: no matching strategy is a denial, and so is every error a
/// strategy reports. Nothing here returns `Err`.
#[derive(Debug, Clone)]
pub struct DecisionEngine {
    registry: Arc<StrategyRegistry>,
}

impl DecisionEngine {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Decide whether the caller in `ctx` may access `ctx.path()`.
    pub async fn authorize(&self, ctx: &AuthorizationContext) -> Decision {
        let path = ctx.path();
        let Some(strategy) = self.registry.select(path) else {
            debug!(target: "turnstile::authz", path, "no strategy matched; denying");
            return Decision::deny(NO_STRATEGY_MATCHED);
        };

        let decision = match strategy.evaluate(ctx).await {
            Ok(decision) => decision,
            Err(StrategyError::PathFormat(err)) => {
                debug!(
                    target: "turnstile::authz",
                    strategy = strategy.name(), path, error = %err,
                    "path format error; denying"
                );
                Decision::deny(err.to_string())
            }
            Err(StrategyError::Principal(err)) => {
                debug!(
                    target: "turnstile::authz",
                    strategy = strategy.name(), path, error = %err,
                    "principal resolution failed; denying"
                );
                Decision::deny(err.to_string())
            }
        };
        decision.decided_by(strategy.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::{PathMatcher, StrategyKind};
    use crate::principal::{PrincipalSlot, StaticTokenResolver};
    use crate::request::RequestDescriptor;

    fn ctx(path: &str) -> AuthorizationContext {
        let slot = PrincipalSlot::new(None, Arc::new(StaticTokenResolver::new()));
        AuthorizationContext::new(&RequestDescriptor::new(path, "10.0.0.1"), Arc::new(slot))
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let prefix = |p: &str| PathMatcher::Prefix(p.into());
        let registry = StrategyRegistry::builder()
            .register(Strategy::new("regex", 100, prefix("/"), StrategyKind::DenyAll))
            .register(Strategy::new("first", 10, prefix("/a"), StrategyKind::Public))
            .register(Strategy::new("second", 10, prefix("/a"), StrategyKind::DenyAll))
            .build()
            .unwrap();
        assert_eq!(registry.names(), ["first", "second", "regex"]);
        assert_eq!(registry.select("/a/b").map(Strategy::name), Some("first"));
        assert_eq!(registry.select("/z").map(Strategy::name), Some("regex"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = StrategyRegistry::builder()
            .register(Strategy::new("x", 1, PathMatcher::Exact("/".into()), StrategyKind::Public))
            .register(Strategy::new("x", 2, PathMatcher::Exact("/b".into()), StrategyKind::Public))
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStrategy(name) if name == "x"));
    }

    #[tokio::test]
    async fn unmatched_path_is_denied() {
        let health = Strategy::new(
            "health",
            0,
            PathMatcher::Exact("/health".into()),
            StrategyKind::Public,
        );
        let engine =
            DecisionEngine::new(StrategyRegistry::builder().register(health).build().unwrap());
        let decision = engine.authorize(&ctx("/admin")).await;
        assert!(!decision.granted);
        assert_eq!(decision.reason.as_deref(), Some(NO_STRATEGY_MATCHED));
        assert_eq!(decision.strategy, None);

        let decision = engine.authorize(&ctx("/health")).await;
        assert!(decision.granted);
        assert_eq!(decision.strategy.as_deref(), Some("health"));
    }

    #[tokio::test]
    async fn strategy_errors_become_denials() {
        let authn = Strategy::new(
            "authn",
            0,
            PathMatcher::Prefix("/".into()),
            StrategyKind::Authenticated,
        );
        let engine =
            DecisionEngine::new(StrategyRegistry::builder().register(authn).build().unwrap());
        let decision = engine.authorize(&ctx("/me")).await;
        assert!(!decision.granted);
        assert_eq!(decision.reason.as_deref(), Some("missing bearer token"));
        assert_eq!(decision.strategy.as_deref(), Some("authn"));
    }
}
