use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use handoff_bus::EventBus;
use handoff_core::{
    HandoffConfig, Orchestrator, SessionStore, StaticCustomerDirectory, TenantConfig,
    TenantRegistry, TicketFactory,
};
use handoff_provider::StubAnswerEngine;
use handoff_server::{create_router, state::AppState};
use handoff_tickets::{SqliteTicketRepository, TicketStore};
use tower::ServiceExt;

fn app() -> axum::Router {
    let mut config = HandoffConfig::default();
    config
        .tenants
        .push(TenantConfig::new("heine", "service@heine.de"));

    let bus = Arc::new(EventBus::new(64));
    let repo = Arc::new(SqliteTicketRepository::open_in_memory().unwrap());
    let store = Arc::new(TicketStore::new(repo).with_bus(bus.publisher()));
    let orchestrator = Orchestrator::new(
        Arc::new(TenantRegistry::from_config(&config).unwrap()),
        Arc::new(SessionStore::new()),
        Arc::new(StubAnswerEngine::new().with_confidence(0.9)),
        TicketFactory::new(store).with_bus(bus.publisher()),
        Arc::new(StaticCustomerDirectory::from_config(&config)),
        bus.publisher(),
    );
    create_router(AppState::new(Arc::new(orchestrator), bus))
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn chat_escalation_reaches_ticket_queue() {
    let app = app();

    let (status, reply) = send(
        &app,
        json_request(
            "POST",
            "/api/chat",
            serde_json::json!({
                "tenant": "heine",
                "message": "Ich möchte mit einem Mitarbeiter sprechen",
                "customer_id": "555"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["escalation_reason"], "manual_intervention");
    let session_id = reply["session_id"].as_str().unwrap().to_string();

    let (status, queue) = send(&app, get("/api/tickets?tenant=heine&status=pending")).await;
    assert_eq!(status, StatusCode::OK);
    let queue = queue.as_array().unwrap();
    assert_eq!(queue.len(), 1);
    assert_eq!(queue[0]["session_id"], session_id.as_str());
    assert_eq!(queue[0]["customer_id"], "555");
    assert_eq!(queue[0]["department"], "kundenservice");

    let (status, history) = send(&app, get(&format!("/api/sessions/heine/{session_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history.as_array().unwrap().len(), 2);

    let (status, metrics) = send(&app, get("/api/metrics/heine?period=all")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["total"], 1);
    assert_eq!(metrics["by_priority"]["high"], 1);
}

#[tokio::test]
async fn invalid_transition_leaves_ticket_untouched() {
    let app = app();
    send(
        &app,
        json_request(
            "POST",
            "/api/chat",
            serde_json::json!({ "tenant": "heine", "message": "Beschwerde" }),
        ),
    )
    .await;
    let (_, tickets) = send(&app, get("/api/tickets?tenant=heine")).await;
    let id = tickets[0]["ticket_id"].as_str().unwrap().to_string();

    let (status, body) = send(
        &app,
        json_request("POST", &format!("/api/tickets/{id}/start"), serde_json::json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("pending"));

    let (_, ticket) = send(&app, get(&format!("/api/tickets/{id}"))).await;
    assert_eq!(ticket["status"], "pending");
}

#[tokio::test]
async fn health_reports_ok() {
    let (status, body) = send(&app(), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer_engine"], "ok");
}
