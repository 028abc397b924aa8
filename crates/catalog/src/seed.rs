//! Встроенный каталог для первого запуска.

use crate::types::{ArtifactNode, DomainNode, GraphSnapshotPayload, ModuleNode, CURRENT_SNAPSHOT_VERSION};
use serde_json::{json, Value};

fn dependency(module_id: &str, kind: &str) -> Value {
    json!({ "moduleId": module_id, "type": kind })
}

fn module(
    id: &str,
    name: &str,
    team: &str,
    domains: &[&str],
    dependencies: Vec<Value>,
    produces: &[&str],
    coverage: f64,
) -> ModuleNode {
    ModuleNode::new(id, name)
        .with_field("team", team)
        .with_field("domains", domains.to_vec())
        .with_field("dependencies", dependencies)
        .with_field("produces", produces.to_vec())
        .with_field("metrics", json!({ "testCoverage": coverage, "openIncidents": 0 }))
}

fn artifact(id: &str, name: &str, format: &str, producer: &str, consumers: &[&str]) -> ArtifactNode {
    ArtifactNode::new(id, name)
        .with_field("dataFormat", format)
        .with_field("producerId", producer)
        .with_field("consumerIds", consumers.to_vec())
}

/// Начальный набор доменов, модулей и артефактов
pub fn initial_snapshot() -> GraphSnapshotPayload {
    let domains = vec![
        DomainNode::new("platform", "Platform")
            .with_description("Shared infrastructure services")
            .with_children(vec![
                DomainNode::new("identity", "Identity & Access"),
                DomainNode::new("observability", "Observability"),
            ]),
        DomainNode::new("commerce", "Commerce")
            .with_description("Customer-facing purchase flow")
            .with_children(vec![
                DomainNode::new("product-catalog", "Product Catalog"),
                DomainNode::new("orders", "Orders"),
                DomainNode::new("payments", "Payments"),
            ]),
        DomainNode::new("data", "Data").with_children(vec![DomainNode::new(
            "analytics",
            "Analytics",
        )]),
    ];

    let auth = module(
        "auth-service",
        "Auth Service",
        "platform-core",
        &["identity"],
        vec![],
        &["audit-log"],
        87.0,
    )
    .with_field(
        "requirements",
        json!({ "availability": "99.95%", "latencyMs": 50, "throughputRps": 2000 }),
    );

    let modules = vec![
        auth,
        module(
            "telemetry-gateway",
            "Telemetry Gateway",
            "platform-core",
            &["observability"],
            vec![],
            &["metrics-stream"],
            72.5,
        ),
        module(
            "catalog-api",
            "Catalog API",
            "storefront",
            &["product-catalog"],
            vec![dependency("auth-service", "sync")],
            &["product-feed"],
            78.0,
        ),
        module(
            "order-service",
            "Order Service",
            "checkout",
            &["orders"],
            vec![
                dependency("auth-service", "sync"),
                dependency("catalog-api", "sync"),
                dependency("payment-gateway", "async"),
            ],
            &["order-events"],
            81.0,
        ),
        module(
            "payment-gateway",
            "Payment Gateway",
            "checkout",
            &["payments"],
            vec![dependency("auth-service", "sync")],
            &[],
            90.5,
        ),
        module(
            "reporting-pipeline",
            "Reporting Pipeline",
            "insights",
            &["analytics"],
            vec![],
            &[],
            64.0,
        ),
    ];

    let artifacts = vec![
        artifact(
            "audit-log",
            "Audit Log",
            "jsonl",
            "auth-service",
            &["reporting-pipeline"],
        ),
        artifact(
            "metrics-stream",
            "Metrics Stream",
            "protobuf",
            "telemetry-gateway",
            &["reporting-pipeline"],
        ),
        artifact(
            "product-feed",
            "Product Feed",
            "csv",
            "catalog-api",
            &["order-service"],
        ),
        artifact(
            "order-events",
            "Order Events",
            "avro",
            "order-service",
            &["reporting-pipeline", "payment-gateway"],
        ),
    ];

    GraphSnapshotPayload {
        version: Some(CURRENT_SNAPSHOT_VERSION),
        ..GraphSnapshotPayload::new(domains, modules, artifacts)
    }
}
