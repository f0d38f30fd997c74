//! Persisted entities and the request/patch types that mutate them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health state of a probe target.
///
/// `Unknown` is the initial state before the first probe; `Disabled` is set
/// while the target is switched off and it never receives probe outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Unknown,
    Healthy,
    Unhealthy,
    Disabled,
}

impl TargetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetStatus::Unknown => "unknown",
            TargetStatus::Healthy => "healthy",
            TargetStatus::Unhealthy => "unhealthy",
            TargetStatus::Disabled => "disabled",
        }
    }

    pub fn parse(s: &str) -> TargetStatus {
        match s {
            "healthy" => TargetStatus::Healthy,
            "unhealthy" => TargetStatus::Unhealthy,
            "disabled" => TargetStatus::Disabled,
            _ => TargetStatus::Unknown,
        }
    }
}

/// Lifecycle state of an alert record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
    Firing,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Firing => "firing",
            AlertStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> AlertStatus {
        match s {
            "firing" => AlertStatus::Firing,
            _ => AlertStatus::Resolved,
        }
    }
}

/// A declared endpoint to be probed.
///
/// `config` is opaque to everything except the prober selected by `kind`.
/// The denormalized `status` / `last_*` fields are written only by the alert
/// coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeTarget {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: serde_json::Value,
    pub timeout_seconds: u32,
    pub interval_seconds: u32,
    pub enabled: bool,
    pub group: Option<String>,
    pub notify_channel_ids: Vec<i64>,
    pub status: TargetStatus,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_latency_ms: i64,
    pub last_message: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One persisted probe outcome. Append-only; cleaned up by retention GC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResultRecord {
    pub id: i64,
    pub target_id: i64,
    pub success: bool,
    pub latency_ms: i64,
    pub message: String,
    pub metrics: Option<serde_json::Value>,
    pub warnings: Option<serde_json::Value>,
    pub checked_at: DateTime<Utc>,
}

/// The persisted story of one firing → resolved lifecycle.
///
/// At most one record per target is ever in `Firing` state; repeated failures
/// refresh `message` / `latency_ms` on the open record while `fired_at` stays
/// frozen at the start of the incident.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecord {
    pub id: i64,
    pub target_id: i64,
    pub target_name: String,
    #[serde(rename = "target_type")]
    pub target_kind: String,
    pub status: AlertStatus,
    pub message: String,
    pub latency_ms: i64,
    pub fired_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub notified: bool,
}

/// A configured notification destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyChannel {
    pub id: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub webhook_url: String,
    pub message_template: String,
    pub mention_all: bool,
    pub enabled: bool,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An operator account for the HTTP API.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Request / patch types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTargetRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub config: serde_json::Value,
    pub timeout_seconds: Option<u32>,
    pub interval_seconds: Option<u32>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    pub group: Option<String>,
    #[serde(default)]
    pub notify_channel_ids: Vec<i64>,
}

/// Partial update; absent fields keep their stored values.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTargetRequest {
    pub name: Option<String>,
    pub config: Option<serde_json::Value>,
    pub timeout_seconds: Option<u32>,
    pub interval_seconds: Option<u32>,
    pub enabled: Option<bool>,
    pub group: Option<String>,
    pub notify_channel_ids: Option<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TestTargetRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub config: serde_json::Value,
    pub timeout_seconds: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(rename = "type", default = "default_channel_kind")]
    pub kind: String,
    pub webhook_url: String,
    #[serde(default)]
    pub message_template: String,
    #[serde(default = "default_true")]
    pub mention_all: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: Option<String>,
    pub webhook_url: Option<String>,
    pub message_template: Option<String>,
    pub mention_all: Option<bool>,
    pub enabled: Option<bool>,
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

fn default_channel_kind() -> String {
    "webhook".to_string()
}
