//! Alert record listing and silencing endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{success, success_list};
use crate::api::ApiState;
use crate::model::AlertStatus;
use crate::storage::AlertQuery;

/// Silence applied when the caller does not pick a duration.
const DEFAULT_SILENCE_MINUTES: u32 = 30;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: u32,
    pub target_id: Option<i64>,
    pub status: Option<String>,
}

/// GET /api/v1/alerts
pub async fn list(
    State(state): State<ApiState>,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<serde_json::Value>> {
    let query = AlertQuery {
        target_id: params.target_id,
        status: params.status.as_deref().map(AlertStatus::parse),
        start: None,
        end: None,
        page: params.page,
        size: params.size,
    };

    let (records, total) = state.store.list_alerts(&query).await?;
    Ok(success_list(
        records,
        total,
        params.page.max(1),
        if params.size == 0 { 20 } else { params.size },
    ))
}

/// GET /api/v1/alerts/:id
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = state.store.get_alert(id).await?;
    Ok(success(record))
}

#[derive(Debug, Default, Deserialize)]
pub struct SilenceRequest {
    pub duration_minutes: Option<u32>,
}

/// PUT /api/v1/alerts/:id/silence — mute the *target* behind the record.
pub async fn silence(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(req): Json<SilenceRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let record = state.store.get_alert(id).await?;

    let minutes = req.duration_minutes.unwrap_or(DEFAULT_SILENCE_MINUTES);
    if minutes == 0 {
        return Err(ApiError::bad_request(
            "duration_minutes must be greater than zero",
        ));
    }

    let silenced_until = state
        .silences
        .silence(record.target_id, chrono::Duration::minutes(minutes as i64));

    Ok(success(json!({
        "target_id": record.target_id,
        "silenced_until": silenced_until,
    })))
}
