//! Aggregated health views.

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::json;

use crate::api::error::ApiResult;
use crate::api::types::success;
use crate::api::ApiState;
use crate::model::TargetStatus;
use crate::storage::{AlertQuery, TargetQuery};

/// GET /api/v1/dashboard/summary — target counts by status plus the most
/// recent alerts.
pub async fn summary(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let (targets, total) = state
        .store
        .list_targets(&TargetQuery {
            page: 1,
            size: 1000,
            ..Default::default()
        })
        .await?;

    let mut healthy = 0i64;
    let mut unhealthy = 0i64;
    let mut unknown = 0i64;
    let mut disabled = 0i64;
    for target in &targets {
        match target.status {
            TargetStatus::Healthy => healthy += 1,
            TargetStatus::Unhealthy => unhealthy += 1,
            TargetStatus::Disabled => disabled += 1,
            TargetStatus::Unknown => unknown += 1,
        }
    }

    let (recent_alerts, _) = state
        .store
        .list_alerts(&AlertQuery {
            page: 1,
            size: 10,
            ..Default::default()
        })
        .await?;

    Ok(success(json!({
        "total_targets": total,
        "healthy_count": healthy,
        "unhealthy_count": unhealthy,
        "unknown_count": unknown,
        "disabled_count": disabled,
        "recent_alerts": recent_alerts,
    })))
}

/// GET /api/v1/dashboard/metrics — per-target health with 24h stats, plus
/// the scheduler's stream drop counters.
pub async fn metrics(State(state): State<ApiState>) -> ApiResult<Json<serde_json::Value>> {
    let (targets, _) = state
        .store
        .list_targets(&TargetQuery {
            page: 1,
            size: 1000,
            ..Default::default()
        })
        .await?;

    let since = Utc::now() - chrono::Duration::hours(24);
    let mut entries = Vec::with_capacity(targets.len());

    for target in &targets {
        let success_rate = state
            .store
            .success_rate(target.id, since)
            .await
            .unwrap_or(100.0);
        let avg_latency = state
            .store
            .average_latency_ms(target.id, since)
            .await
            .unwrap_or(0.0);

        entries.push(json!({
            "id": target.id,
            "name": target.name,
            "type": target.kind,
            "status": target.status,
            "last_latency_ms": target.last_latency_ms,
            "last_check_at": target.last_check_at,
            "stats": {
                "success_rate_24h": success_rate,
                "avg_latency_ms_24h": avg_latency,
            },
        }));
    }

    Ok(success(json!({
        "targets": entries,
        "stream_drops": {
            "results": state.scheduler.dropped_results(),
            "edges": state.scheduler.dropped_edges(),
        },
    })))
}
