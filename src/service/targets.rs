//! Target lifecycle
//!
//! The five operations the scheduler exposes to the outside world: create,
//! update, delete, one-shot test, and the startup load of enabled targets.
//! All validation happens here, before anything reaches the scheduler.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::model::{
    CreateTargetRequest, ProbeTarget, TargetStatus, TestTargetRequest, UpdateTargetRequest,
};
use crate::probe::{ProbeOutcome, ProbeRegistry, ProbeSpec};
use crate::scheduler::{spec_for, ScheduleError, Scheduler};
use crate::storage::{Store, StoreError};

const WAITING_MESSAGE: &str = "waiting for first probe";
const DISABLED_MESSAGE: &str = "monitoring disabled";

/// Extra head-room on top of the target timeout for one-shot tests.
const TEST_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("unsupported probe type: {0}")]
    UnknownKind(String),

    #[error("config validation failed: {0}")]
    InvalidConfig(String),

    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ScheduleError> for TargetError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::UnknownKind(kind) => TargetError::UnknownKind(kind),
            ScheduleError::InvalidConfig(msg) => TargetError::InvalidConfig(msg),
            ScheduleError::Store(e) => TargetError::Store(e),
            ScheduleError::Stopped => TargetError::Validation("scheduler is stopped".to_string()),
        }
    }
}

pub struct TargetService {
    store: Arc<dyn Store>,
    registry: Arc<ProbeRegistry>,
    scheduler: Arc<Scheduler>,
    default_interval: u32,
    default_timeout: u32,
}

impl TargetService {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<ProbeRegistry>,
        scheduler: Arc<Scheduler>,
        default_interval: u32,
        default_timeout: u32,
    ) -> Self {
        Self {
            store,
            registry,
            scheduler,
            default_interval: default_interval.max(1),
            default_timeout: default_timeout.max(1),
        }
    }

    fn check_cadence(interval: u32, timeout: u32) -> Result<(), TargetError> {
        if interval < 1 {
            return Err(TargetError::Validation(
                "interval must be at least 1 second".to_string(),
            ));
        }
        if timeout > interval {
            return Err(TargetError::Validation(format!(
                "timeout ({timeout}s) must not exceed interval ({interval}s)"
            )));
        }
        Ok(())
    }

    fn validate_config(&self, kind: &str, config: &serde_json::Value) -> Result<(), TargetError> {
        let prober = self
            .registry
            .get(kind)
            .ok_or_else(|| TargetError::UnknownKind(kind.to_string()))?;
        let spec = ProbeSpec::new(kind, config.clone(), Duration::from_secs(1));
        prober
            .validate(&spec)
            .map_err(|e| TargetError::InvalidConfig(e.to_string()))
    }

    /// Create a target; when enabled it is scheduled immediately.
    #[instrument(skip(self, req), fields(name = %req.name, kind = %req.kind))]
    pub async fn create(&self, req: CreateTargetRequest) -> Result<ProbeTarget, TargetError> {
        self.validate_config(&req.kind, &req.config)?;

        let interval = req.interval_seconds.unwrap_or(self.default_interval);
        let timeout = req.timeout_seconds.unwrap_or(self.default_timeout);
        Self::check_cadence(interval, timeout)?;

        let (status, message) = if req.enabled {
            (TargetStatus::Unknown, WAITING_MESSAGE)
        } else {
            (TargetStatus::Disabled, DISABLED_MESSAGE)
        };

        let now = Utc::now();
        let mut target = ProbeTarget {
            id: 0,
            name: req.name,
            kind: req.kind,
            config: req.config,
            timeout_seconds: timeout,
            interval_seconds: interval,
            enabled: req.enabled,
            group: req.group,
            notify_channel_ids: req.notify_channel_ids,
            status,
            last_check_at: None,
            last_latency_ms: 0,
            last_message: message.to_string(),
            created_at: now,
            updated_at: now,
        };

        target.id = self.store.create_target(&target).await?;

        if target.enabled {
            if let Err(e) = self.scheduler.add(&target).await {
                error!("failed to schedule new target: {e}");
            }
        }

        info!(target_id = target.id, "target created");
        Ok(target)
    }

    /// Apply a partial update, then refresh the scheduler's task.
    #[instrument(skip(self, patch), fields(target_id = id))]
    pub async fn update(
        &self,
        id: i64,
        patch: UpdateTargetRequest,
    ) -> Result<ProbeTarget, TargetError> {
        let mut target = self.store.get_target(id).await?;

        if let Some(name) = patch.name {
            target.name = name;
        }
        if let Some(config) = patch.config {
            self.validate_config(&target.kind, &config)?;
            target.config = config;
        }
        if let Some(timeout) = patch.timeout_seconds {
            target.timeout_seconds = timeout;
        }
        if let Some(interval) = patch.interval_seconds {
            target.interval_seconds = interval;
        }
        if let Some(group) = patch.group {
            target.group = Some(group);
        }
        if let Some(channel_ids) = patch.notify_channel_ids {
            target.notify_channel_ids = channel_ids;
        }
        Self::check_cadence(target.interval_seconds, target.timeout_seconds)?;

        if let Some(enabled) = patch.enabled {
            let was_enabled = target.enabled;
            target.enabled = enabled;

            if !enabled {
                target.status = TargetStatus::Disabled;
                target.last_message = DISABLED_MESSAGE.to_string();
            } else if !was_enabled {
                // Re-enabling starts from a clean slate.
                target.status = TargetStatus::Unknown;
                target.last_message = WAITING_MESSAGE.to_string();
                target.last_check_at = None;
                target.last_latency_ms = 0;
            }
        }

        self.store.update_target(&target).await?;

        if let Err(e) = self.scheduler.update(&target).await {
            error!("failed to reschedule target: {e}");
        }

        Ok(target)
    }

    /// Remove the scheduled task, dependent rows, and the target itself.
    #[instrument(skip(self), fields(target_id = id))]
    pub async fn delete(&self, id: i64) -> Result<(), TargetError> {
        // Surface not-found before touching anything.
        self.store.get_target(id).await?;

        self.scheduler.remove(id);

        let results = self.store.delete_results_for_target(id).await?;
        let alerts = self.store.delete_alerts_for_target(id).await?;
        self.store.delete_target(id).await?;

        info!(results, alerts, "target deleted with dependents");
        Ok(())
    }

    /// One-shot synchronous probe bypassing the scheduler and persistence.
    pub async fn test(&self, req: TestTargetRequest) -> Result<ProbeOutcome, TargetError> {
        let prober = self
            .registry
            .get(&req.kind)
            .ok_or_else(|| TargetError::UnknownKind(req.kind.clone()))?;

        let timeout = Duration::from_secs(req.timeout_seconds.unwrap_or(self.default_timeout).max(1) as u64);
        let spec = ProbeSpec::new(req.kind, req.config, timeout);
        prober
            .validate(&spec)
            .map_err(|e| TargetError::InvalidConfig(e.to_string()))?;

        let started = std::time::Instant::now();
        match tokio::time::timeout(timeout + TEST_GRACE, prober.probe(&spec)).await {
            Ok(outcome) => Ok(outcome),
            Err(_) => Ok(ProbeOutcome::failure(
                format!("probe timed out after {timeout:?}"),
                started.elapsed(),
            )),
        }
    }

    /// Startup hook: schedule every enabled target. Individual failures are
    /// logged, not fatal.
    pub async fn load_enabled(&self) -> Result<usize, TargetError> {
        let targets = self.store.list_enabled_targets().await?;
        let mut loaded = 0;

        for target in &targets {
            match self.scheduler.add(target).await {
                Ok(()) => loaded += 1,
                Err(e) => error!(target_id = target.id, "failed to load target: {e}"),
            }
        }

        info!(loaded, total = targets.len(), "enabled targets loaded");
        Ok(loaded)
    }

    /// 24h success rate and average latency for one target.
    pub async fn stats(&self, id: i64) -> Result<(f64, f64), TargetError> {
        self.store.get_target(id).await?;
        let since = Utc::now() - chrono::Duration::hours(24);
        let success_rate = self.store.success_rate(id, since).await?;
        let avg_latency = self.store.average_latency_ms(id, since).await?;
        Ok((success_rate, avg_latency))
    }

    /// The execution spec a scheduled target runs with; exposed for tests.
    pub fn spec_for_target(target: &ProbeTarget) -> ProbeSpec {
        spec_for(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn service() -> (Arc<MemoryStore>, Arc<Scheduler>, TargetService) {
        let store = Arc::new(MemoryStore::new());
        let registry = Arc::new(ProbeRegistry::with_builtins());
        let (scheduler, _result_rx, _edge_rx) =
            Scheduler::new(registry.clone(), store.clone(), 3);
        let scheduler = Arc::new(scheduler);
        let service = TargetService::new(store.clone(), registry, scheduler.clone(), 30, 5);
        (store, scheduler, service)
    }

    fn tcp_request(name: &str) -> CreateTargetRequest {
        CreateTargetRequest {
            name: name.to_string(),
            kind: "tcp".to_string(),
            config: json!({"host": "localhost", "port": 80}),
            timeout_seconds: None,
            interval_seconds: None,
            enabled: true,
            group: None,
            notify_channel_ids: vec![],
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_schedules() {
        let (_store, scheduler, service) = service();

        let target = service.create(tcp_request("web")).await.unwrap();
        assert_eq!(target.interval_seconds, 30);
        assert_eq!(target.timeout_seconds, 5);
        assert_eq!(target.status, TargetStatus::Unknown);
        assert_eq!(target.last_message, WAITING_MESSAGE);
        assert!(scheduler.has_task(target.id));

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn create_disabled_is_not_scheduled() {
        let (_store, scheduler, service) = service();

        let mut req = tcp_request("web");
        req.enabled = false;
        let target = service.create(req).await.unwrap();

        assert_eq!(target.status, TargetStatus::Disabled);
        assert!(!scheduler.has_task(target.id));
    }

    #[tokio::test]
    async fn create_rejects_unknown_kind_and_bad_config() {
        let (_store, _scheduler, service) = service();

        let mut req = tcp_request("web");
        req.kind = "carrier-pigeon".to_string();
        assert!(matches!(
            service.create(req).await,
            Err(TargetError::UnknownKind(_))
        ));

        let mut req = tcp_request("web");
        req.config = json!({"host": "x"});
        assert!(matches!(
            service.create(req).await,
            Err(TargetError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn create_rejects_timeout_longer_than_interval() {
        let (_store, _scheduler, service) = service();

        let mut req = tcp_request("web");
        req.timeout_seconds = Some(60);
        req.interval_seconds = Some(10);
        assert!(matches!(
            service.create(req).await,
            Err(TargetError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn disable_toggle_resets_status() {
        let (store, scheduler, service) = service();
        let target = service.create(tcp_request("web")).await.unwrap();

        let updated = service
            .update(
                target.id,
                UpdateTargetRequest {
                    enabled: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TargetStatus::Disabled);
        assert!(!scheduler.has_task(target.id));

        let updated = service
            .update(
                target.id,
                UpdateTargetRequest {
                    enabled: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TargetStatus::Unknown);
        assert_eq!(updated.last_message, WAITING_MESSAGE);
        assert!(updated.last_check_at.is_none());
        assert!(scheduler.has_task(target.id));

        let stored = store.get_target(target.id).await.unwrap();
        assert_eq!(stored.status, TargetStatus::Unknown);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn noop_update_round_trips() {
        let (_store, scheduler, service) = service();
        let created = service.create(tcp_request("web")).await.unwrap();

        let updated = service
            .update(created.id, UpdateTargetRequest::default())
            .await
            .unwrap();

        assert_eq!(updated.name, created.name);
        assert_eq!(updated.kind, created.kind);
        assert_eq!(updated.config, created.config);
        assert_eq!(updated.timeout_seconds, created.timeout_seconds);
        assert_eq!(updated.interval_seconds, created.interval_seconds);
        assert_eq!(updated.enabled, created.enabled);

        scheduler.stop().await;
    }

    #[tokio::test]
    async fn delete_removes_task_and_rows() {
        let (store, scheduler, service) = service();
        let target = service.create(tcp_request("web")).await.unwrap();

        service.delete(target.id).await.unwrap();
        assert!(!scheduler.has_task(target.id));
        assert!(store.get_target(target.id).await.is_err());
    }

    #[tokio::test]
    async fn delete_of_nonexistent_is_not_found() {
        let (_store, _scheduler, service) = service();
        assert!(matches!(
            service.delete(404).await,
            Err(TargetError::Store(StoreError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn load_enabled_schedules_only_enabled() {
        let (_store, scheduler, service) = service();

        let enabled = service.create(tcp_request("a")).await.unwrap();
        let mut req = tcp_request("b");
        req.enabled = false;
        let disabled = service.create(req).await.unwrap();

        // Simulate restart: empty scheduler, then reload.
        scheduler.remove(enabled.id);
        let loaded = service.load_enabled().await.unwrap();

        assert_eq!(loaded, 1);
        assert!(scheduler.has_task(enabled.id));
        assert!(!scheduler.has_task(disabled.id));

        scheduler.stop().await;
    }
}
