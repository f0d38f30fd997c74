//! Notify channel CRUD and dry-run endpoints.
//!
//! Template parsing happens here, at create/update time; delivery never
//! sees an invalid template.

use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::success;
use crate::api::ApiState;
use crate::model::{AlertStatus, CreateChannelRequest, NotifyChannel, UpdateChannelRequest};
use crate::notify::{validate_template, AlertMessage};

fn check_channel(kind: &str, webhook_url: &str, template: &str) -> ApiResult<()> {
    if kind != "webhook" {
        return Err(ApiError::bad_request(format!(
            "unsupported channel type: {kind}"
        )));
    }
    if webhook_url.trim().is_empty() {
        return Err(ApiError::bad_request("webhook_url must not be empty"));
    }
    validate_template(template)?;
    Ok(())
}

/// GET /api/v1/notifiers
pub async fn list(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let channels = state.store.list_channels().await?;
    Ok(success(channels))
}

/// POST /api/v1/notifiers
pub async fn create(
    State(state): State<ApiState>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    check_channel(&req.kind, &req.webhook_url, &req.message_template)?;

    let now = Utc::now();
    let mut channel = NotifyChannel {
        id: 0,
        name: req.name,
        kind: req.kind,
        webhook_url: req.webhook_url,
        message_template: req.message_template,
        mention_all: req.mention_all,
        enabled: req.enabled,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    channel.id = state.store.create_channel(&channel).await?;
    Ok(success(channel))
}

/// GET /api/v1/notifiers/:id
pub async fn get_one(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    let channel = state.store.get_channel(id).await?;
    Ok(success(channel))
}

/// PUT /api/v1/notifiers/:id
pub async fn update(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(patch): Json<UpdateChannelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let mut channel = state.store.get_channel(id).await?;

    if let Some(name) = patch.name {
        channel.name = name;
    }
    if let Some(webhook_url) = patch.webhook_url {
        channel.webhook_url = webhook_url;
    }
    if let Some(template) = patch.message_template {
        channel.message_template = template;
    }
    if let Some(mention_all) = patch.mention_all {
        channel.mention_all = mention_all;
    }
    if let Some(enabled) = patch.enabled {
        channel.enabled = enabled;
    }
    if let Some(description) = patch.description {
        channel.description = description;
    }

    check_channel(&channel.kind, &channel.webhook_url, &channel.message_template)?;

    state.store.update_channel(&channel).await?;
    Ok(success(channel))
}

/// DELETE /api/v1/notifiers/:id
pub async fn delete(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.delete_channel(id).await?;
    Ok(success(json!(null)))
}

/// POST /api/v1/notifiers/test — deliver a sample alert through the given
/// channel settings without persisting anything.
pub async fn test(
    State(state): State<ApiState>,
    Json(req): Json<CreateChannelRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    check_channel(&req.kind, &req.webhook_url, &req.message_template)?;

    let now = Utc::now();
    let channel = NotifyChannel {
        id: 0,
        name: req.name,
        kind: req.kind,
        webhook_url: req.webhook_url,
        message_template: req.message_template,
        mention_all: req.mention_all,
        enabled: true,
        description: req.description,
        created_at: now,
        updated_at: now,
    };

    let sample = AlertMessage {
        target_id: 0,
        target_name: "sample-target".to_string(),
        target_kind: "http".to_string(),
        status: AlertStatus::Firing,
        message: "this is a test notification".to_string(),
        latency_ms: 42,
        fired_at: now,
        resolved_at: None,
    };

    state.notifier.deliver_once(&channel, &sample).await?;
    Ok(success(json!(null)))
}
