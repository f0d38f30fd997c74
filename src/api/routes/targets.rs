//! Target CRUD, results and stats endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::types::{success, success_list};
use crate::api::ApiState;
use crate::model::{CreateTargetRequest, TargetStatus, UpdateTargetRequest};
use crate::storage::{ResultQuery, TargetQuery};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub status: Option<String>,
    pub enabled: Option<bool>,
}

/// GET /api/v1/targets
pub async fn list(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = TargetQuery {
        kind: params.kind,
        status: params.status.as_deref().map(TargetStatus::parse),
        enabled: params.enabled,
        page: params.page,
        size: params.size,
    };

    let (targets, total) = state.store.list_targets(&query).await?;
    Ok(success_list(
        targets,
        total,
        params.page.max(1),
        if params.size == 0 { 20 } else { params.size },
    ))
}

/// POST /api/v1/targets
pub async fn create(
    State(state): State<ApiState>,
    Json(req): Json<CreateTargetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = state.targets.create(req).await?;
    Ok(success(target))
}

/// GET /api/v1/targets/:id
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = state.store.get_target(id).await?;
    Ok(success(target))
}

/// PUT /api/v1/targets/:id
pub async fn update(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(patch): Json<UpdateTargetRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let target = state.targets.update(id, patch).await?;
    Ok(success(target))
}

/// DELETE /api/v1/targets/:id
pub async fn delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.targets.delete(id).await?;
    Ok(success(json!(null)))
}

#[derive(Debug, Deserialize)]
pub struct ResultParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    pub success: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/v1/targets/:id/results
pub async fn results(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(params): Query<ResultParams>,
) -> ApiResult<Json<serde_json::Value>> {
    // 404 for unknown targets rather than an empty page.
    state.store.get_target(id).await?;

    let query = ResultQuery {
        target_id: id,
        success: params.success,
        start: params.start,
        end: params.end,
        page: params.page,
        size: params.size,
    };

    let (records, total) = state.store.list_results(&query).await?;
    Ok(success_list(
        records,
        total,
        params.page.max(1),
        if params.size == 0 { 20 } else { params.size },
    ))
}

/// GET /api/v1/targets/:id/stats
pub async fn stats(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let (success_rate, avg_latency) = state.targets.stats(id).await?;
    Ok(success(json!({
        "success_rate_24h": success_rate,
        "avg_latency_ms_24h": avg_latency,
    })))
}
