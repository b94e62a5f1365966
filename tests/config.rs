use std::sync::Arc;
use turnstile::prelude::*;

const CONFIG: &str = r#"{
    "rate_limit": {
        "ip": { "algorithm": "fixed_window", "requests_per_second": 3, "time_window_seconds": 1,
                "on_store_unavailable": "fail_open" },
        "user": { "algorithm": "token_bucket", "requests_per_second": 1, "burst_capacity": 2 },
        "endpoint_overrides": {
            "/login": { "algorithm": "fixed_window", "requests_per_second": 1 }
        },
        "exempt_ips": ["10.255.0.1"],
        "fallback_capacity": 128
    },
    "authorization": {
        "strategies": [
            { "name": "user-ownership", "priority": 100,
              "path": { "pattern": "^/api/v1/users/[^/]+$" },
              "grant": { "kind": "resource_ownership", "segment_index": 3 } },
            { "name": "login", "priority": 0, "path": { "exact": "/login" },
              "grant": { "kind": "public" } },
            { "name": "admin", "priority": 10, "path": { "prefix": "/admin" },
              "grant": { "kind": "require_claim", "claim": "role", "value": "admin" } }
        ]
    }
}"#;

fn pipeline() -> Pipeline {
    let config = TurnstileConfig::from_json_str(CONFIG).expect("valid config");
    let resolver = StaticTokenResolver::new()
        .with_token("alice", Principal::new(42))
        .with_token("root", Principal::new(1).with_claim("role", "admin"));
    config
        .build_pipeline(Arc::new(InMemoryCounterStore::new()), Arc::new(resolver))
        .expect("buildable")
}

fn get(path: &str, ip: &str, token: Option<&str>) -> RequestDescriptor {
    let request = RequestDescriptor::new(path, ip);
    match token {
        Some(token) => request.with_header("authorization", format!("Bearer {token}")),
        None => request,
    }
}

#[tokio::test]
async fn configured_pipeline_enforces_rules_and_strategies() {
    let pipeline = pipeline();

    assert_eq!(pipeline.engine().registry().names(), ["login", "admin", "user-ownership"]);
    let owner = get("/api/v1/users/42", "10.0.0.1", Some("alice"));
    assert!(pipeline.handle(&owner).await.is_proceed());
    assert!(!pipeline.handle(&get("/admin/users", "10.0.0.2", Some("alice"))).await.is_proceed());
    assert!(pipeline.handle(&get("/admin/users", "10.0.0.3", Some("root"))).await.is_proceed());
}

#[tokio::test]
async fn user_dimension_meters_across_ips() {
    let pipeline = pipeline();

    let mut outcomes = Vec::new();
    for ip in ["10.0.1.1", "10.0.1.2", "10.0.1.3"] {
        outcomes.push(pipeline.handle(&get("/api/v1/users/42", ip, Some("alice"))).await);
    }
    assert!(outcomes[0].is_proceed());
    assert!(outcomes[1].is_proceed());
    assert!(matches!(outcomes[2], Outcome::RejectedByRateLimit { dimension: Dimension::User, .. }));
}

#[tokio::test]
async fn exempt_ips_skip_admission_but_not_authorization() {
    let pipeline = pipeline();
    for _ in 0..10 {
        let outcome = pipeline.handle(&get("/login", "10.255.0.1", None)).await;
        assert!(outcome.is_proceed());
    }
    let outcome = pipeline.handle(&get("/admin", "10.255.0.1", None)).await;
    assert!(matches!(outcome, Outcome::RejectedByAuthorization { .. }));
}

#[test]
fn build_rejects_what_validate_rejects() {
    let err = TurnstileConfig::from_json_str(
        r#"{ "rate_limit": {
            "global": { "algorithm": "leaky_bucket", "requests_per_second": 0 } } }"#,
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "global: requests_per_second must be > 0");
}
