//! In-memory store
//!
//! Keeps everything in process memory behind an `RwLock`. No persistence;
//! intended for tests and for running without a database file.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use super::error::{StoreError, StoreResult};
use super::{page_bounds, AlertQuery, ResultQuery, Store, TargetQuery};
use crate::model::{
    AlertRecord, AlertStatus, NotifyChannel, ProbeResultRecord, ProbeTarget, TargetStatus, User,
};

#[derive(Default)]
struct Inner {
    targets: Vec<ProbeTarget>,
    results: Vec<ProbeResultRecord>,
    alerts: Vec<AlertRecord>,
    channels: Vec<NotifyChannel>,
    users: Vec<User>,
    next_id: i64,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn paginate<T: Clone>(items: Vec<T>, page: u32, size: u32) -> (Vec<T>, i64) {
    let total = items.len() as i64;
    let (page, size) = page_bounds(page, size);
    let start = ((page - 1) * size) as usize;
    let paged = items
        .into_iter()
        .skip(start)
        .take(size as usize)
        .collect();
    (paged, total)
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_target(&self, target: &ProbeTarget) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        let mut target = target.clone();
        target.id = id;
        inner.targets.push(target);
        Ok(id)
    }

    async fn update_target(&self, target: &ProbeTarget) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .targets
            .iter_mut()
            .find(|t| t.id == target.id)
            .ok_or_else(|| StoreError::NotFound("target".to_string()))?;
        let mut updated = target.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }

    async fn delete_target(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let before = inner.targets.len();
        inner.targets.retain(|t| t.id != id);
        if inner.targets.len() == before {
            return Err(StoreError::NotFound("target".to_string()));
        }
        Ok(())
    }

    async fn get_target(&self, id: i64) -> StoreResult<ProbeTarget> {
        self.inner
            .read()
            .targets
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("target".to_string()))
    }

    async fn list_targets(&self, query: &TargetQuery) -> StoreResult<(Vec<ProbeTarget>, i64)> {
        let inner = self.inner.read();
        let filtered: Vec<_> = inner
            .targets
            .iter()
            .filter(|t| query.kind.as_ref().is_none_or(|k| &t.kind == k))
            .filter(|t| query.status.is_none_or(|s| t.status == s))
            .filter(|t| query.enabled.is_none_or(|e| t.enabled == e))
            .cloned()
            .collect();
        Ok(paginate(filtered, query.page, query.size))
    }

    async fn list_enabled_targets(&self) -> StoreResult<Vec<ProbeTarget>> {
        Ok(self
            .inner
            .read()
            .targets
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect())
    }

    async fn update_target_health(
        &self,
        id: i64,
        status: TargetStatus,
        latency_ms: i64,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(target) = inner.targets.iter_mut().find(|t| t.id == id) {
            target.status = status;
            target.last_latency_ms = latency_ms;
            target.last_message = message.to_string();
            target.last_check_at = Some(checked_at);
            target.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn insert_result(&self, result: &ProbeResultRecord) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        let mut result = result.clone();
        result.id = id;
        inner.results.push(result);
        Ok(id)
    }

    async fn list_results(
        &self,
        query: &ResultQuery,
    ) -> StoreResult<(Vec<ProbeResultRecord>, i64)> {
        let inner = self.inner.read();
        let mut filtered: Vec<_> = inner
            .results
            .iter()
            .filter(|r| r.target_id == query.target_id)
            .filter(|r| query.success.is_none_or(|s| r.success == s))
            .filter(|r| query.start.is_none_or(|start| r.checked_at >= start))
            .filter(|r| query.end.is_none_or(|end| r.checked_at <= end))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.checked_at.cmp(&a.checked_at));
        Ok(paginate(filtered, query.page, query.size))
    }

    async fn delete_results_for_target(&self, target_id: i64) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.results.len();
        inner.results.retain(|r| r.target_id != target_id);
        Ok((before - inner.results.len()) as u64)
    }

    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.results.len();
        inner.results.retain(|r| r.checked_at >= cutoff);
        Ok((before - inner.results.len()) as u64)
    }

    async fn success_rate(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64> {
        let inner = self.inner.read();
        let relevant: Vec<_> = inner
            .results
            .iter()
            .filter(|r| r.target_id == target_id && r.checked_at >= since)
            .collect();
        if relevant.is_empty() {
            return Ok(100.0);
        }
        let successes = relevant.iter().filter(|r| r.success).count();
        Ok(successes as f64 / relevant.len() as f64 * 100.0)
    }

    async fn average_latency_ms(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64> {
        let inner = self.inner.read();
        let latencies: Vec<i64> = inner
            .results
            .iter()
            .filter(|r| r.target_id == target_id && r.checked_at >= since && r.success)
            .map(|r| r.latency_ms)
            .collect();
        if latencies.is_empty() {
            return Ok(0.0);
        }
        Ok(latencies.iter().sum::<i64>() as f64 / latencies.len() as f64)
    }

    async fn insert_alert(&self, record: &AlertRecord) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        let mut record = record.clone();
        record.id = id;
        inner.alerts.push(record);
        Ok(id)
    }

    async fn update_alert(&self, record: &AlertRecord) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .alerts
            .iter_mut()
            .find(|a| a.id == record.id)
            .ok_or_else(|| StoreError::NotFound("alert record".to_string()))?;
        *slot = record.clone();
        Ok(())
    }

    async fn get_alert(&self, id: i64) -> StoreResult<AlertRecord> {
        self.inner
            .read()
            .alerts
            .iter()
            .find(|a| a.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("alert record".to_string()))
    }

    async fn get_open_alert(&self, target_id: i64) -> StoreResult<Option<AlertRecord>> {
        Ok(self
            .inner
            .read()
            .alerts
            .iter()
            .filter(|a| a.target_id == target_id && a.status == AlertStatus::Firing)
            .max_by_key(|a| a.fired_at)
            .cloned())
    }

    async fn refresh_alert_cause(
        &self,
        id: i64,
        target_name: &str,
        target_kind: &str,
        message: &str,
        latency_ms: i64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(alert) = inner.alerts.iter_mut().find(|a| a.id == id) {
            alert.target_name = target_name.to_string();
            alert.target_kind = target_kind.to_string();
            alert.message = message.to_string();
            alert.latency_ms = latency_ms;
        }
        Ok(())
    }

    async fn has_open_alert(&self, target_id: i64) -> StoreResult<bool> {
        Ok(self
            .inner
            .read()
            .alerts
            .iter()
            .any(|a| a.target_id == target_id && a.status == AlertStatus::Firing))
    }

    async fn resolve_alert(&self, id: i64, resolved_at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.write();
        if let Some(alert) = inner.alerts.iter_mut().find(|a| a.id == id) {
            alert.status = AlertStatus::Resolved;
            alert.resolved_at = Some(resolved_at);
        }
        Ok(())
    }

    async fn list_alerts(&self, query: &AlertQuery) -> StoreResult<(Vec<AlertRecord>, i64)> {
        let inner = self.inner.read();
        let mut filtered: Vec<_> = inner
            .alerts
            .iter()
            .filter(|a| query.target_id.is_none_or(|id| a.target_id == id))
            .filter(|a| query.status.is_none_or(|s| a.status == s))
            .filter(|a| query.start.is_none_or(|start| a.fired_at >= start))
            .filter(|a| query.end.is_none_or(|end| a.fired_at <= end))
            .cloned()
            .collect();
        filtered.sort_by(|a, b| b.fired_at.cmp(&a.fired_at));
        Ok(paginate(filtered, query.page, query.size))
    }

    async fn delete_alerts_for_target(&self, target_id: i64) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.alerts.len();
        inner.alerts.retain(|a| a.target_id != target_id);
        Ok((before - inner.alerts.len()) as u64)
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let mut inner = self.inner.write();
        let before = inner.alerts.len();
        inner.alerts.retain(|a| a.fired_at >= cutoff);
        Ok((before - inner.alerts.len()) as u64)
    }

    async fn create_channel(&self, channel: &NotifyChannel) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        let id = inner.next_id();
        let mut channel = channel.clone();
        channel.id = id;
        inner.channels.push(channel);
        Ok(id)
    }

    async fn update_channel(&self, channel: &NotifyChannel) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let slot = inner
            .channels
            .iter_mut()
            .find(|c| c.id == channel.id)
            .ok_or_else(|| StoreError::NotFound("notify channel".to_string()))?;
        let mut updated = channel.clone();
        updated.updated_at = Utc::now();
        *slot = updated;
        Ok(())
    }

    async fn delete_channel(&self, id: i64) -> StoreResult<()> {
        let mut inner = self.inner.write();
        let before = inner.channels.len();
        inner.channels.retain(|c| c.id != id);
        if inner.channels.len() == before {
            return Err(StoreError::NotFound("notify channel".to_string()));
        }
        Ok(())
    }

    async fn get_channel(&self, id: i64) -> StoreResult<NotifyChannel> {
        self.inner
            .read()
            .channels
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound("notify channel".to_string()))
    }

    async fn list_channels(&self) -> StoreResult<Vec<NotifyChannel>> {
        Ok(self.inner.read().channels.clone())
    }

    async fn list_enabled_channels(&self) -> StoreResult<Vec<NotifyChannel>> {
        Ok(self
            .inner
            .read()
            .channels
            .iter()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(self
            .inner
            .read()
            .users
            .iter()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<i64> {
        let mut inner = self.inner.write();
        if inner.users.iter().any(|u| u.username == username) {
            return Err(StoreError::Query(format!(
                "user {username} already exists"
            )));
        }
        let id = inner.next_id();
        inner.users.push(User {
            id,
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn close(&self) -> StoreResult<()> {
        Ok(())
    }
}
