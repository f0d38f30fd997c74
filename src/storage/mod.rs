//! Storage trait and implementations
//!
//! Every persistence concern of the service goes through the [`Store`]
//! trait: targets, probe results, alert records, notify channels and users.
//! Two implementations exist — [`sqlite::SqliteStore`] for production and
//! [`memory::MemoryStore`] for tests.
//!
//! Implementations must be `Send + Sync`; they are shared across the
//! scheduler, the alert coordinator and the API handlers.

pub mod error;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    AlertRecord, AlertStatus, NotifyChannel, ProbeResultRecord, ProbeTarget, TargetStatus, User,
};

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Paged target listing filter.
#[derive(Debug, Clone, Default)]
pub struct TargetQuery {
    pub kind: Option<String>,
    pub status: Option<TargetStatus>,
    pub enabled: Option<bool>,
    pub page: u32,
    pub size: u32,
}

/// Paged probe-result listing filter for one target.
#[derive(Debug, Clone, Default)]
pub struct ResultQuery {
    pub target_id: i64,
    pub success: Option<bool>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: u32,
    pub size: u32,
}

/// Paged alert-record listing filter.
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub target_id: Option<i64>,
    pub status: Option<AlertStatus>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub page: u32,
    pub size: u32,
}

pub(crate) fn page_bounds(page: u32, size: u32) -> (u32, u32) {
    let size = if size == 0 { 20 } else { size.min(1000) };
    let page = page.max(1);
    (page, size)
}

/// Transactional store for all persisted entities.
#[async_trait]
pub trait Store: Send + Sync {
    // -- targets ------------------------------------------------------------

    /// Insert a target and return its assigned id.
    async fn create_target(&self, target: &ProbeTarget) -> StoreResult<i64>;

    /// Full-row update of an existing target.
    async fn update_target(&self, target: &ProbeTarget) -> StoreResult<()>;

    async fn delete_target(&self, id: i64) -> StoreResult<()>;

    async fn get_target(&self, id: i64) -> StoreResult<ProbeTarget>;

    async fn list_targets(&self, query: &TargetQuery) -> StoreResult<(Vec<ProbeTarget>, i64)>;

    async fn list_enabled_targets(&self) -> StoreResult<Vec<ProbeTarget>>;

    /// Update only the denormalized health fields. The alert coordinator is
    /// the sole caller.
    async fn update_target_health(
        &self,
        id: i64,
        status: TargetStatus,
        latency_ms: i64,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    // -- probe results ------------------------------------------------------

    async fn insert_result(&self, result: &ProbeResultRecord) -> StoreResult<i64>;

    async fn list_results(&self, query: &ResultQuery)
        -> StoreResult<(Vec<ProbeResultRecord>, i64)>;

    async fn delete_results_for_target(&self, target_id: i64) -> StoreResult<u64>;

    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    /// Success percentage over results since `since`; 100 when there are none.
    async fn success_rate(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64>;

    /// Mean latency of successful probes since `since`; 0 when there are none.
    async fn average_latency_ms(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64>;

    // -- alert records ------------------------------------------------------

    async fn insert_alert(&self, record: &AlertRecord) -> StoreResult<i64>;

    async fn update_alert(&self, record: &AlertRecord) -> StoreResult<()>;

    async fn get_alert(&self, id: i64) -> StoreResult<AlertRecord>;

    /// The open (firing) record for a target, if any. The single-open-alert
    /// invariant means there is never more than one.
    async fn get_open_alert(&self, target_id: i64) -> StoreResult<Option<AlertRecord>>;

    /// Update only the latest-cause fields of a record, leaving `status`,
    /// `fired_at` and `notified` untouched.
    async fn refresh_alert_cause(
        &self,
        id: i64,
        target_name: &str,
        target_kind: &str,
        message: &str,
        latency_ms: i64,
    ) -> StoreResult<()>;

    async fn has_open_alert(&self, target_id: i64) -> StoreResult<bool>;

    async fn resolve_alert(&self, id: i64, resolved_at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_alerts(&self, query: &AlertQuery) -> StoreResult<(Vec<AlertRecord>, i64)>;

    async fn delete_alerts_for_target(&self, target_id: i64) -> StoreResult<u64>;

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;

    // -- notify channels ----------------------------------------------------

    async fn create_channel(&self, channel: &NotifyChannel) -> StoreResult<i64>;

    async fn update_channel(&self, channel: &NotifyChannel) -> StoreResult<()>;

    async fn delete_channel(&self, id: i64) -> StoreResult<()>;

    async fn get_channel(&self, id: i64) -> StoreResult<NotifyChannel>;

    async fn list_channels(&self) -> StoreResult<Vec<NotifyChannel>>;

    async fn list_enabled_channels(&self) -> StoreResult<Vec<NotifyChannel>>;

    // -- users --------------------------------------------------------------

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>>;

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<i64>;

    // -- lifecycle ----------------------------------------------------------

    async fn close(&self) -> StoreResult<()>;
}
