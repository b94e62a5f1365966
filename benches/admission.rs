use criterion::{black_box, criterion_group, criterion_main, Criterion};
use futures::future::Ready;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tower::{Service, ServiceBuilder};
use turnstile::prelude::*;

// Echo service placed behind the gatekeeper layer.
#[derive(Clone)]
struct EchoService;

impl Service<RequestDescriptor> for EchoService {
    type Response = RequestDescriptor;
    type Error = std::io::Error;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: RequestDescriptor) -> Self::Future {
        futures::future::ready(Ok(req))
    }
}

// Limits high enough that the bench measures the admitted path.
fn rules() -> RuleSet {
    RuleSet::new()
        .with_rule(
            Dimension::Global,
            RateLimitRule::new(Algorithm::TokenBucket, 1_000_000, 1_000_000, 1).unwrap(),
        )
        .with_rule(
            Dimension::Ip,
            RateLimitRule::new(Algorithm::SlidingWindow, 100_000, 100_000, 1).unwrap(),
        )
        .with_rule(
            Dimension::Endpoint,
            RateLimitRule::new(Algorithm::FixedWindow, 1_000_000, 1_000_000, 1).unwrap(),
        )
}

fn next_ip(counter: &AtomicU64) -> String {
    let n = counter.fetch_add(1, Ordering::Relaxed) % 1024;
    format!("10.0.{}.{}", n / 256, n % 256)
}

fn admission_three_dimensions(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let controller = AdmissionController::new(rules(), Arc::new(InMemoryCounterStore::new()));
    let resolver: Arc<dyn PrincipalResolver> = Arc::new(StaticTokenResolver::new());
    let counter = AtomicU64::new(0);

    c.bench_function("admission_three_dimensions", |b| {
        b.to_async(&rt).iter(|| async {
            let request = RequestDescriptor::new("/api/v1/orders", next_ip(&counter));
            let principal = PrincipalSlot::new(None, resolver.clone());
            black_box(controller.evaluate(black_box(&request), &principal).await)
        });
    });
}

fn gatekeeper_layer_granted(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let registry = StrategyRegistry::builder()
        .register(Strategy::new(
            "health",
            0,
            PathMatcher::Exact("/health".into()),
            StrategyKind::Public,
        ))
        .register(Strategy::new(
            "orders",
            10,
            PathMatcher::pattern(r"^/api/v1/orders(/\d+)?$").unwrap(),
            StrategyKind::Public,
        ))
        .build()
        .unwrap();
    let pipeline = Pipeline::new(
        AdmissionController::new(rules(), Arc::new(InMemoryCounterStore::new())),
        DecisionEngine::new(registry),
        Arc::new(StaticTokenResolver::new()),
    );
    let svc = ServiceBuilder::new().layer(GatekeeperLayer::new(pipeline)).service(EchoService);
    let counter = AtomicU64::new(0);

    c.bench_function("gatekeeper_layer_granted", |b| {
        b.to_async(&rt).iter(|| async {
            let mut local_svc = svc.clone();
            let request = RequestDescriptor::new("/api/v1/orders/7", next_ip(&counter));
            let _ = black_box(local_svc.call(black_box(request)).await);
        });
    });
}

criterion_group!(benches, admission_three_dimensions, gatekeeper_layer_granted);
criterion_main!(benches);
