use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use handoff_core::{ChatError, SessionError};
use handoff_schema::InboundMessage;

use super::error_response;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", post(chat))
}

pub async fn chat(State(state): State<AppState>, Json(inbound): Json<InboundMessage>) -> Response {
    if inbound.message.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "message must not be empty", None);
    }
    match state.orchestrator.handle_inbound(inbound).await {
        Ok(reply) => Json(reply).into_response(),
        Err(e) => chat_error_response(e),
    }
}

fn chat_error_response(error: ChatError) -> Response {
    match error {
        ChatError::UnknownTenant(tenant) => {
            error_response(StatusCode::NOT_FOUND, format!("unknown tenant: {tenant}"), None)
        }
        ChatError::Session(SessionError::TenantMismatch { .. }) => error_response(
            StatusCode::CONFLICT,
            "session belongs to another tenant",
            None,
        ),
        ChatError::Session(SessionError::NotFound(_)) => {
            error_response(StatusCode::NOT_FOUND, "session not found", None)
        }
        ChatError::EscalationNotRecorded {
            support_contact, ..
        } => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            format!(
                "Wir konnten Ihre Anfrage gerade nicht an einen Mitarbeiter weiterleiten. \
                 Bitte kontaktieren Sie uns direkt unter {support_contact}."
            ),
            Some(serde_json::json!({ "support_contact": support_contact })),
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;
    use axum::{body::Body, http::Request};
    use handoff_provider::StubAnswerEngine;
    use handoff_schema::EscalationTicket;
    use handoff_tickets::TicketRepository;
    use tower::ServiceExt;

    use super::router;
    use crate::state::test_support::{setup_state, state_with};

    struct ReadOnlyRepository;

    #[async_trait::async_trait]
    impl TicketRepository for ReadOnlyRepository {
        async fn save(&self, _ticket: &EscalationTicket) -> anyhow::Result<()> {
            Err(anyhow!("read-only file system"))
        }
        async fn get(&self, _ticket_id: &str) -> anyhow::Result<Option<EscalationTicket>> {
            Ok(None)
        }
        async fn list(&self, _tenant: Option<&str>) -> anyhow::Result<Vec<EscalationTicket>> {
            Ok(Vec::new())
        }
        async fn delete(&self, _ticket_id: &str) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    fn post_json(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn chat_returns_reply() {
        let (state, _tmp) = setup_state(0.9);
        let response = router()
            .with_state(state)
            .oneshot(post_json(serde_json::json!({
                "tenant": "heine",
                "message": "Hallo, wie geht es Ihnen?"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["escalated"], false);
        assert!(body["session_id"].as_str().is_some_and(|s| !s.is_empty()));
        assert!(body.get("escalation_reason").is_none());
    }

    #[tokio::test]
    async fn complaint_reply_is_escalated() {
        let (state, _tmp) = setup_state(0.8);
        let response = router()
            .with_state(state)
            .oneshot(post_json(serde_json::json!({
                "tenant": "heine",
                "message": "Ich bin sehr unzufrieden mit dem Service!"
            })))
            .await
            .unwrap();

        let body = json_body(response).await;
        assert_eq!(body["escalated"], true);
        assert_eq!(body["escalation_reason"], "complaint");
        assert_eq!(body["confidence"], 0.0);
    }

    #[tokio::test]
    async fn unknown_tenant_is_not_found() {
        let (state, _tmp) = setup_state(0.9);
        let response = router()
            .with_state(state)
            .oneshot(post_json(serde_json::json!({
                "tenant": "acme",
                "message": "Hallo"
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn blank_message_is_bad_request() {
        let (state, _tmp) = setup_state(0.9);
        let response = router()
            .with_state(state)
            .oneshot(post_json(serde_json::json!({
                "tenant": "heine",
                "message": "   "
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unrecorded_escalation_points_to_support_contact() {
        let state = state_with(
            Arc::new(StubAnswerEngine::new().with_confidence(0.9)),
            Arc::new(ReadOnlyRepository),
        );
        let response = router()
            .with_state(state)
            .oneshot(post_json(serde_json::json!({
                "tenant": "heine",
                "message": "Ich habe eine Beschwerde"
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
        let body = json_body(response).await;
        assert_eq!(body["support_contact"], "service@heine.de");
        let text = body["error"].as_str().unwrap();
        assert!(text.contains("service@heine.de"));
        assert!(!text.contains("read-only"));
    }

    #[tokio::test]
    async fn foreign_session_is_conflict() {
        let (state, _tmp) = setup_state(0.9);
        let app = router().with_state(state);
        let first = app
            .clone()
            .oneshot(post_json(serde_json::json!({
                "tenant": "heine",
                "message": "Hallo"
            })))
            .await
            .unwrap();
        let session_id = json_body(first).await["session_id"].clone();

        let response = app
            .oneshot(post_json(serde_json::json!({
                "tenant": "subbrand1",
                "message": "Hallo",
                "session_id": session_id
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
    }
}
