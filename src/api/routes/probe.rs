//! Probe type discovery and one-shot test endpoints.

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{success, OutcomeResponse};
use crate::api::ApiState;
use crate::model::TestTargetRequest;

fn display_label(kind: &str) -> &str {
    match kind {
        "http" => "HTTP",
        "tcp" => "TCP",
        "postgresql" => "PostgreSQL",
        "redis" => "Redis",
        "kafka" => "Kafka",
        "cpu" => "CPU",
        other => other,
    }
}

/// GET /api/v1/probe/types — registered probe type tags.
pub async fn list_types(State(state): State<ApiState>) -> Json<serde_json::Value> {
    let types: Vec<_> = state
        .registry
        .kinds()
        .into_iter()
        .map(|kind| json!({ "value": kind, "label": display_label(kind) }))
        .collect();
    success(types)
}

/// GET /api/v1/probe/schema/:kind — UI form schema for a probe type.
pub async fn get_schema(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let schema = state
        .registry
        .schema(&kind)
        .ok_or_else(|| ApiError::not_found(format!("unsupported probe type: {kind}")))?;
    Ok(success(schema))
}

/// POST /api/v1/probe/test — one-shot synchronous probe, no persistence.
pub async fn test_probe(
    State(state): State<ApiState>,
    Json(req): Json<TestTargetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let outcome = state.targets.test(req).await?;
    Ok(success(OutcomeResponse::from(outcome)))
}
