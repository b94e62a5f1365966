//! Compile-time prelude coverage test.
use std::sync::Arc;
use tower::service_fn;
use tower_layer::Layer;
use tower_service::Service;
use turnstile::prelude::*;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let rule = RateLimitRule::new(Algorithm::LeakyBucket, 10, 20, 1).expect("valid rule");
    let admission = AdmissionController::new(
        RuleSet::new().with_dimension(Dimension::Global, rule, FailurePolicy::FailOpen),
        Arc::new(InMemoryCounterStore::new()),
    );
    let registry = StrategyRegistry::builder()
        .register(Strategy::new("all", 0, PathMatcher::Prefix("/".into()), StrategyKind::Public))
        .build()
        .expect("valid registry");
    let resolver = Arc::new(StaticTokenResolver::new());
    let pipeline = Pipeline::new(admission, DecisionEngine::new(registry), resolver)
        .with_sink(MemorySink::new());

    let mut svc = GatekeeperLayer::new(pipeline)
        .layer(service_fn(|_req: RequestDescriptor| async { Ok::<_, std::io::Error>(()) }));
    svc.call(RequestDescriptor::new("/", "::1")).await.expect("service call failed");
}
