//! Response envelopes shared by every handler.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;

use crate::probe::ProbeOutcome;

/// `{code: 0, message: "success", data: ...}`
pub fn success<T: Serialize>(data: T) -> Json<serde_json::Value> {
    Json(json!({
        "code": 0,
        "message": "success",
        "data": data,
    }))
}

/// Paginated success envelope.
pub fn success_list<T: Serialize>(
    items: Vec<T>,
    total: i64,
    page: u32,
    size: u32,
) -> Json<serde_json::Value> {
    Json(json!({
        "code": 0,
        "message": "success",
        "data": {
            "items": items,
            "total": total,
            "page": page,
            "size": size,
        },
    }))
}

/// Probe outcome as returned by the test endpoints.
#[derive(Debug, Serialize)]
pub struct OutcomeResponse {
    pub success: bool,
    pub latency_ms: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl From<ProbeOutcome> for OutcomeResponse {
    fn from(outcome: ProbeOutcome) -> Self {
        Self {
            success: outcome.success,
            latency_ms: outcome.latency_ms(),
            message: outcome.message,
            metrics: outcome.metrics,
            warnings: outcome.warnings,
            checked_at: outcome.checked_at,
        }
    }
}
