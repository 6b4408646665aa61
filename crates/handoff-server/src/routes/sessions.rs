use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use handoff_schema::ChatMessage;

use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{tenant}/{session_id}",
        get(get_session_messages).delete(end_session),
    )
}

async fn get_session_messages(
    State(state): State<AppState>,
    Path((tenant, session_id)): Path<(String, String)>,
) -> Result<Json<Vec<ChatMessage>>, StatusCode> {
    state
        .orchestrator
        .sessions()
        .history(&tenant, &session_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn end_session(
    State(state): State<AppState>,
    Path((tenant, session_id)): Path<(String, String)>,
) -> StatusCode {
    if state.orchestrator.sessions().remove(&tenant, &session_id).await {
        tracing::info!(%tenant, %session_id, "session ended via api");
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use handoff_schema::InboundMessage;
    use tower::ServiceExt;

    use super::router;
    use crate::state::test_support::setup_state;

    async fn seed_session(state: &crate::state::AppState) -> String {
        state
            .orchestrator
            .handle_inbound(InboundMessage {
                tenant: "heine".into(),
                message: "Wann kommt mein Paket?".into(),
                session_id: None,
                customer_id: None,
            })
            .await
            .unwrap()
            .session_id
    }

    #[tokio::test]
    async fn history_is_tenant_scoped() {
        let (state, _tmp) = setup_state(0.9);
        let session_id = seed_session(&state).await;
        let app = router().with_state(state);

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri(format!("/heine/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let messages: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], "user");

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/subbrand1/{session_id}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_ends_session() {
        let (state, _tmp) = setup_state(0.9);
        let session_id = seed_session(&state).await;
        let app = router().with_state(state.clone());

        let delete = || {
            Request::builder()
                .method("DELETE")
                .uri(format!("/heine/{session_id}"))
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NO_CONTENT);
        assert!(state.orchestrator.sessions().is_empty().await);

        let response = app.oneshot(delete()).await.unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }
}
