use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub answer_engine: &'static str,
    pub tenants: Vec<String>,
    pub active_sessions: usize,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(health))
}

/// Reports `degraded` when the answer engine is unreachable.
pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let engine_ok = match state.orchestrator.engine().health().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Answer engine health check failed: {e:#}");
            false
        }
    };
    let tenants = state
        .orchestrator
        .tenants()
        .tenant_ids()
        .into_iter()
        .map(str::to_string)
        .collect();

    Json(HealthReport {
        status: if engine_ok { "healthy" } else { "degraded" },
        answer_engine: if engine_ok { "ok" } else { "unavailable" },
        tenants,
        active_sessions: state.orchestrator.sessions().len().await,
    })
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use super::router;
    use crate::state::test_support::setup_state;

    #[tokio::test]
    async fn health_lists_tenants() {
        let (state, _tmp) = setup_state(0.9);
        let response = router()
            .with_state(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), axum::http::StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["tenants"], serde_json::json!(["heine", "subbrand1"]));
        assert_eq!(body["active_sessions"], 0);
    }
}
