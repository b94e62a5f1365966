//! Path-based authorization.
//!
//! - [`Strategy`]: one record of `{matcher, priority, kind}`; the kinds form a
//!   closed set, see [`StrategyKind`].
//! - [`StrategyRegistry`]: immutable, sorted by ascending priority (stable, so
//!   equal priorities keep registration order).
//! - [`DecisionEngine`]: picks the first supporting strategy and runs it.
//!   No match, or any evaluation error, is a deny.

pub mod context;
pub mod decision;
pub mod registry;
pub mod strategy;

pub use context::AuthorizationContext;
pub use decision::Decision;
pub use registry::{DecisionEngine, StrategyRegistry, StrategyRegistryBuilder};
pub use strategy::{ClaimRequirement, OwnershipRule, PathMatcher, Strategy, StrategyKind};
