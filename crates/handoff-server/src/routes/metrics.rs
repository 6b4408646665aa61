use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use handoff_core::{compute, EscalationMetrics, MetricsPeriod};
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct MetricsParams {
    #[serde(default)]
    pub period: MetricsPeriod,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/{tenant}", get(tenant_metrics))
}

pub async fn tenant_metrics(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(params): Query<MetricsParams>,
) -> Result<Json<EscalationMetrics>, StatusCode> {
    if state.orchestrator.tenants().lookup(&tenant).is_none() {
        return Err(StatusCode::NOT_FOUND);
    }
    let metrics = compute(state.orchestrator.tickets(), &tenant, params.period).await;
    Ok(Json(metrics))
}
