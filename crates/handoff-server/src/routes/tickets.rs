use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use handoff_schema::{EscalationTicket, TicketStatus};
use handoff_tickets::TicketError;
use serde::Deserialize;

use super::error_response;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub tenant: Option<String>,
    pub status: Option<TicketStatus>,
}

#[derive(Debug, Deserialize)]
pub struct TenantParam {
    pub tenant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignBody {
    pub agent_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResolveBody {
    #[serde(default)]
    pub notes: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_tickets))
        .route("/{id}", get(get_ticket))
        .route("/{id}/assign", post(assign_ticket))
        .route("/{id}/start", post(start_ticket))
        .route("/{id}/resolve", post(resolve_ticket))
        .route("/{id}/close", post(close_ticket))
}

/// `status=pending` yields the work queue order (priority, then age).
pub async fn list_tickets(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Json<Vec<EscalationTicket>> {
    let store = state.orchestrator.tickets();
    let tenant = params.tenant.as_deref();
    let tickets = match params.status {
        Some(TicketStatus::Pending) => store.list_pending(tenant).await,
        Some(status) => store
            .list_all(tenant)
            .await
            .into_iter()
            .filter(|t| t.status == status)
            .collect(),
        None => store.list_all(tenant).await,
    };
    Json(tickets)
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Query(params): Query<TenantParam>,
) -> Result<Json<EscalationTicket>, StatusCode> {
    let store = state.orchestrator.tickets();
    let ticket = match params.tenant.as_deref() {
        Some(tenant) => store.get_for_tenant(tenant, &ticket_id).await,
        None => store.get(&ticket_id).await,
    };
    ticket.map(Json).ok_or(StatusCode::NOT_FOUND)
}

pub async fn assign_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(body): Json<AssignBody>,
) -> Response {
    if body.agent_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "agent_id must not be empty", None);
    }
    transition_response(
        state
            .orchestrator
            .tickets()
            .assign(&ticket_id, body.agent_id.trim())
            .await,
    )
}

pub async fn start_ticket(State(state): State<AppState>, Path(ticket_id): Path<String>) -> Response {
    transition_response(state.orchestrator.tickets().start(&ticket_id).await)
}

pub async fn resolve_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<String>,
    Json(body): Json<ResolveBody>,
) -> Response {
    transition_response(
        state
            .orchestrator
            .tickets()
            .resolve(&ticket_id, body.notes.as_deref())
            .await,
    )
}

pub async fn close_ticket(State(state): State<AppState>, Path(ticket_id): Path<String>) -> Response {
    transition_response(state.orchestrator.tickets().close(&ticket_id).await)
}

fn transition_response(result: Result<EscalationTicket, TicketError>) -> Response {
    match result {
        Ok(ticket) => Json(ticket).into_response(),
        Err(e) => {
            let status = ticket_error_status(&e);
            if status.is_server_error() {
                tracing::error!("Ticket update failed: {e}");
                error_response(status, "ticket could not be updated", None)
            } else {
                error_response(status, e.to_string(), None)
            }
        }
    }
}

fn ticket_error_status(error: &TicketError) -> StatusCode {
    match error {
        TicketError::NotFound(_) => StatusCode::NOT_FOUND,
        TicketError::InvalidTransition { .. } | TicketError::ImmutableField { .. } => {
            StatusCode::CONFLICT
        }
        TicketError::Persistence { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use handoff_schema::InboundMessage;
    use tower::ServiceExt;

    use super::router;
    use crate::state::test_support::setup_state;
    use crate::state::AppState;

    async fn escalate(state: &AppState, message: &str, customer_id: Option<&str>) -> String {
        let reply = state
            .orchestrator
            .handle_inbound(InboundMessage {
                tenant: "heine".into(),
                message: message.into(),
                session_id: None,
                customer_id: customer_id.map(str::to_string),
            })
            .await
            .unwrap();
        assert!(reply.escalated);
        state
            .orchestrator
            .tickets()
            .list_all(Some("heine"))
            .await
            .into_iter()
            .find(|t| t.session_id == reply.session_id)
            .unwrap()
            .ticket_id
    }

    fn post(uri: String, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
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
    async fn pending_queue_puts_vip_first() {
        let (state, _tmp) = setup_state(0.3);
        escalate(&state, "Welche Farben gibt es?", None).await;
        escalate(&state, "Welche Größen gibt es?", Some("1234567")).await;

        let response = router()
            .with_state(state)
            .oneshot(
                Request::builder()
                    .uri("/?tenant=heine&status=pending")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let body = json_body(response).await;
        let items = body.as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["priority"], "high");
        assert_eq!(items[1]["priority"], "low");
    }

    #[tokio::test]
    async fn full_lifecycle_over_http() {
        let (state, _tmp) = setup_state(0.9);
        let id = escalate(&state, "Ich habe eine Beschwerde", None).await;
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(post(format!("/{id}/assign"), r#"{"agent_id":"agent-7"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        assert_eq!(json_body(response).await["assigned_to"], "agent-7");

        let response = app
            .clone()
            .oneshot(post(format!("/{id}/start"), ""))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "in_progress");

        let response = app
            .clone()
            .oneshot(post(format!("/{id}/resolve"), r#"{"notes":"Gutschrift erteilt"}"#))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["status"], "resolved");
        assert!(body["resolved_at"].is_string());

        let response = app
            .oneshot(post(format!("/{id}/close"), ""))
            .await
            .unwrap();
        assert_eq!(json_body(response).await["status"], "closed");
    }

    #[tokio::test]
    async fn close_before_resolve_is_conflict() {
        let (state, _tmp) = setup_state(0.9);
        let id = escalate(&state, "Ich habe eine Beschwerde", None).await;
        let app = router().with_state(state.clone());

        let response = app
            .oneshot(post(format!("/{id}/close"), ""))
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::CONFLICT);
        let ticket = state.orchestrator.tickets().get(&id).await.unwrap();
        assert_eq!(ticket.status, handoff_schema::TicketStatus::Pending);
    }

    #[tokio::test]
    async fn missing_ticket_is_not_found() {
        let (state, _tmp) = setup_state(0.9);
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);

        let response = app.oneshot(post("/nope/start".into(), "")).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ticket_lookup_respects_tenant() {
        let (state, _tmp) = setup_state(0.9);
        let id = escalate(&state, "Ich habe eine Beschwerde", None).await;
        let app = router().with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/{id}?tenant=subbrand1"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
