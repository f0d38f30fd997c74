//! SQLite store
//!
//! Embedded backend suitable for single-process deployments. WAL journaling
//! keeps reads cheap while the scheduler writes results, and a busy timeout
//! absorbs lock contention between the coordinator and the API.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::error::{StoreError, StoreResult};
use super::{page_bounds, AlertQuery, ResultQuery, Store, TargetQuery};
use crate::model::{
    AlertRecord, AlertStatus, NotifyChannel, ProbeResultRecord, ProbeTarget, TargetStatus, User,
};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

fn millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_else(Utc::now)
}

fn row_to_target(row: &SqliteRow) -> StoreResult<ProbeTarget> {
    let config: String = row.get("config");
    let channel_ids: String = row.get("notify_channel_ids");
    let status: String = row.get("status");

    Ok(ProbeTarget {
        id: row.get("id"),
        name: row.get("name"),
        kind: row.get("kind"),
        config: serde_json::from_str(&config)?,
        timeout_seconds: row.get::<i64, _>("timeout_seconds") as u32,
        interval_seconds: row.get::<i64, _>("interval_seconds") as u32,
        enabled: row.get::<i64, _>("enabled") != 0,
        group: row.get("target_group"),
        notify_channel_ids: serde_json::from_str(&channel_ids).unwrap_or_default(),
        status: TargetStatus::parse(&status),
        last_check_at: row.get::<Option<i64>, _>("last_check_at").map(from_millis),
        last_latency_ms: row.get("last_latency_ms"),
        last_message: row.get("last_message"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    })
}

fn row_to_result(row: &SqliteRow) -> ProbeResultRecord {
    let metrics: Option<String> = row.get("metrics");
    let warnings: Option<String> = row.get("warnings");

    ProbeResultRecord {
        id: row.get("id"),
        target_id: row.get("target_id"),
        success: row.get::<i64, _>("success") != 0,
        latency_ms: row.get("latency_ms"),
        message: row.get("message"),
        metrics: metrics.and_then(|s| serde_json::from_str(&s).ok()),
        warnings: warnings.and_then(|s| serde_json::from_str(&s).ok()),
        checked_at: from_millis(row.get("checked_at")),
    }
}

fn row_to_alert(row: &SqliteRow) -> AlertRecord {
    let status: String = row.get("status");

    AlertRecord {
        id: row.get("id"),
        target_id: row.get("target_id"),
        target_name: row.get("target_name"),
        target_kind: row.get("target_kind"),
        status: AlertStatus::parse(&status),
        message: row.get("message"),
        latency_ms: row.get("latency_ms"),
        fired_at: from_millis(row.get("fired_at")),
        resolved_at: row.get::<Option<i64>, _>("resolved_at").map(from_millis),
        notified: row.get::<i64, _>("notified") != 0,
    }
}

fn row_to_channel(row: &SqliteRow) -> NotifyChannel {
    NotifyChannel {
        id: row.get("id"),
        name: row.get("name"),
        kind: row.get("kind"),
        webhook_url: row.get("webhook_url"),
        message_template: row.get("message_template"),
        mention_all: row.get::<i64, _>("mention_all") != 0,
        enabled: row.get::<i64, _>("enabled") != 0,
        description: row.get("description"),
        created_at: from_millis(row.get("created_at")),
        updated_at: from_millis(row.get("updated_at")),
    }
}

impl SqliteStore {
    /// Open (creating if needed) a SQLite database and run migrations.
    #[instrument(skip_all)]
    pub async fn open(path: impl AsRef<Path>, max_connections: u32) -> StoreResult<Self> {
        let path = path.as_ref();
        info!("opening SQLite store at {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        debug!("migrations complete");

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn create_target(&self, target: &ProbeTarget) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO probe_targets (\
                name, kind, config, timeout_seconds, interval_seconds, enabled, \
                target_group, notify_channel_ids, status, last_check_at, \
                last_latency_ms, last_message, created_at, updated_at\
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&target.name)
        .bind(&target.kind)
        .bind(serde_json::to_string(&target.config)?)
        .bind(target.timeout_seconds as i64)
        .bind(target.interval_seconds as i64)
        .bind(target.enabled as i64)
        .bind(&target.group)
        .bind(serde_json::to_string(&target.notify_channel_ids)?)
        .bind(target.status.as_str())
        .bind(target.last_check_at.as_ref().map(millis))
        .bind(target.last_latency_ms)
        .bind(&target.last_message)
        .bind(millis(&target.created_at))
        .bind(millis(&target.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_target(&self, target: &ProbeTarget) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE probe_targets SET \
                name = ?, kind = ?, config = ?, timeout_seconds = ?, \
                interval_seconds = ?, enabled = ?, target_group = ?, \
                notify_channel_ids = ?, status = ?, last_check_at = ?, \
                last_latency_ms = ?, last_message = ?, updated_at = ? \
            WHERE id = ?",
        )
        .bind(&target.name)
        .bind(&target.kind)
        .bind(serde_json::to_string(&target.config)?)
        .bind(target.timeout_seconds as i64)
        .bind(target.interval_seconds as i64)
        .bind(target.enabled as i64)
        .bind(&target.group)
        .bind(serde_json::to_string(&target.notify_channel_ids)?)
        .bind(target.status.as_str())
        .bind(target.last_check_at.as_ref().map(millis))
        .bind(target.last_latency_ms)
        .bind(&target.last_message)
        .bind(millis(&Utc::now()))
        .bind(target.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("target".to_string()));
        }
        Ok(())
    }

    async fn delete_target(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM probe_targets WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("target".to_string()));
        }
        Ok(())
    }

    async fn get_target(&self, id: i64) -> StoreResult<ProbeTarget> {
        let row = sqlx::query("SELECT * FROM probe_targets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("target".to_string()))?;

        row_to_target(&row)
    }

    async fn list_targets(&self, query: &TargetQuery) -> StoreResult<(Vec<ProbeTarget>, i64)> {
        let (page, size) = page_bounds(query.page, query.size);

        let mut filter = String::from(" WHERE 1 = 1");
        if query.kind.is_some() {
            filter.push_str(" AND kind = ?");
        }
        if query.status.is_some() {
            filter.push_str(" AND status = ?");
        }
        if query.enabled.is_some() {
            filter.push_str(" AND enabled = ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM probe_targets{filter}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(kind) = &query.kind {
            count_query = count_query.bind(kind);
        }
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(enabled) = query.enabled {
            count_query = count_query.bind(enabled as i64);
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT * FROM probe_targets{filter} ORDER BY id ASC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&sql);
        if let Some(kind) = &query.kind {
            list_query = list_query.bind(kind);
        }
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.as_str());
        }
        if let Some(enabled) = query.enabled {
            list_query = list_query.bind(enabled as i64);
        }
        let rows = list_query
            .bind(size as i64)
            .bind(((page - 1) * size) as i64)
            .fetch_all(&self.pool)
            .await?;

        let targets = rows
            .iter()
            .map(row_to_target)
            .collect::<StoreResult<Vec<_>>>()?;

        Ok((targets, total))
    }

    async fn list_enabled_targets(&self) -> StoreResult<Vec<ProbeTarget>> {
        let rows = sqlx::query("SELECT * FROM probe_targets WHERE enabled = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_target).collect()
    }

    async fn update_target_health(
        &self,
        id: i64,
        status: TargetStatus,
        latency_ms: i64,
        message: &str,
        checked_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE probe_targets SET \
                status = ?, last_latency_ms = ?, last_message = ?, \
                last_check_at = ?, updated_at = ? \
            WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(latency_ms)
        .bind(message)
        .bind(millis(&checked_at))
        .bind(millis(&Utc::now()))
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn insert_result(&self, result: &ProbeResultRecord) -> StoreResult<i64> {
        let inserted = sqlx::query(
            "INSERT INTO probe_results \
                (target_id, success, latency_ms, message, metrics, warnings, checked_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(result.target_id)
        .bind(result.success as i64)
        .bind(result.latency_ms)
        .bind(&result.message)
        .bind(
            result
                .metrics
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(
            result
                .warnings
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?,
        )
        .bind(millis(&result.checked_at))
        .execute(&self.pool)
        .await?;

        Ok(inserted.last_insert_rowid())
    }

    async fn list_results(
        &self,
        query: &ResultQuery,
    ) -> StoreResult<(Vec<ProbeResultRecord>, i64)> {
        let (page, size) = page_bounds(query.page, query.size);

        let mut filter = String::from(" WHERE target_id = ?");
        if query.success.is_some() {
            filter.push_str(" AND success = ?");
        }
        if query.start.is_some() {
            filter.push_str(" AND checked_at >= ?");
        }
        if query.end.is_some() {
            filter.push_str(" AND checked_at <= ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM probe_results{filter}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql).bind(query.target_id);
        if let Some(success) = query.success {
            count_query = count_query.bind(success as i64);
        }
        if let Some(start) = &query.start {
            count_query = count_query.bind(millis(start));
        }
        if let Some(end) = &query.end {
            count_query = count_query.bind(millis(end));
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT * FROM probe_results{filter} ORDER BY checked_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&sql).bind(query.target_id);
        if let Some(success) = query.success {
            list_query = list_query.bind(success as i64);
        }
        if let Some(start) = &query.start {
            list_query = list_query.bind(millis(start));
        }
        if let Some(end) = &query.end {
            list_query = list_query.bind(millis(end));
        }
        let rows = list_query
            .bind(size as i64)
            .bind(((page - 1) * size) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.iter().map(row_to_result).collect(), total))
    }

    async fn delete_results_for_target(&self, target_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM probe_results WHERE target_id = ?")
            .bind(target_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_results_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM probe_results WHERE checked_at < ?")
            .bind(millis(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn success_rate(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64> {
        let (total, successes): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(success), 0) \
            FROM probe_results WHERE target_id = ? AND checked_at >= ?",
        )
        .bind(target_id)
        .bind(millis(&since))
        .fetch_one(&self.pool)
        .await?;

        if total == 0 {
            return Ok(100.0);
        }
        Ok(successes as f64 / total as f64 * 100.0)
    }

    async fn average_latency_ms(&self, target_id: i64, since: DateTime<Utc>) -> StoreResult<f64> {
        let (avg,): (f64,) = sqlx::query_as(
            "SELECT COALESCE(AVG(latency_ms), 0.0) \
            FROM probe_results WHERE target_id = ? AND checked_at >= ? AND success = 1",
        )
        .bind(target_id)
        .bind(millis(&since))
        .fetch_one(&self.pool)
        .await?;

        Ok(avg)
    }

    async fn insert_alert(&self, record: &AlertRecord) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO alert_records \
                (target_id, target_name, target_kind, status, message, latency_ms, \
                 fired_at, resolved_at, notified) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.target_id)
        .bind(&record.target_name)
        .bind(&record.target_kind)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.latency_ms)
        .bind(millis(&record.fired_at))
        .bind(record.resolved_at.as_ref().map(millis))
        .bind(record.notified as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_alert(&self, record: &AlertRecord) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE alert_records SET \
                target_name = ?, target_kind = ?, status = ?, message = ?, \
                latency_ms = ?, fired_at = ?, resolved_at = ?, notified = ? \
            WHERE id = ?",
        )
        .bind(&record.target_name)
        .bind(&record.target_kind)
        .bind(record.status.as_str())
        .bind(&record.message)
        .bind(record.latency_ms)
        .bind(millis(&record.fired_at))
        .bind(record.resolved_at.as_ref().map(millis))
        .bind(record.notified as i64)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("alert record".to_string()));
        }
        Ok(())
    }

    async fn get_alert(&self, id: i64) -> StoreResult<AlertRecord> {
        let row = sqlx::query("SELECT * FROM alert_records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("alert record".to_string()))?;

        Ok(row_to_alert(&row))
    }

    async fn get_open_alert(&self, target_id: i64) -> StoreResult<Option<AlertRecord>> {
        let row = sqlx::query(
            "SELECT * FROM alert_records \
            WHERE target_id = ? AND status = 'firing' \
            ORDER BY fired_at DESC LIMIT 1",
        )
        .bind(target_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| row_to_alert(&r)))
    }

    async fn refresh_alert_cause(
        &self,
        id: i64,
        target_name: &str,
        target_kind: &str,
        message: &str,
        latency_ms: i64,
    ) -> StoreResult<()> {
        sqlx::query(
            "UPDATE alert_records SET \
                target_name = ?, target_kind = ?, message = ?, latency_ms = ? \
            WHERE id = ?",
        )
        .bind(target_name)
        .bind(target_kind)
        .bind(message)
        .bind(latency_ms)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn has_open_alert(&self, target_id: i64) -> StoreResult<bool> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM alert_records WHERE target_id = ? AND status = 'firing'",
        )
        .bind(target_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn resolve_alert(&self, id: i64, resolved_at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE alert_records SET status = 'resolved', resolved_at = ? WHERE id = ?")
            .bind(millis(&resolved_at))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_alerts(&self, query: &AlertQuery) -> StoreResult<(Vec<AlertRecord>, i64)> {
        let (page, size) = page_bounds(query.page, query.size);

        let mut filter = String::from(" WHERE 1 = 1");
        if query.target_id.is_some() {
            filter.push_str(" AND target_id = ?");
        }
        if query.status.is_some() {
            filter.push_str(" AND status = ?");
        }
        if query.start.is_some() {
            filter.push_str(" AND fired_at >= ?");
        }
        if query.end.is_some() {
            filter.push_str(" AND fired_at <= ?");
        }

        let count_sql = format!("SELECT COUNT(*) FROM alert_records{filter}");
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(target_id) = query.target_id {
            count_query = count_query.bind(target_id);
        }
        if let Some(status) = &query.status {
            count_query = count_query.bind(status.as_str());
        }
        if let Some(start) = &query.start {
            count_query = count_query.bind(millis(start));
        }
        if let Some(end) = &query.end {
            count_query = count_query.bind(millis(end));
        }
        let (total,) = count_query.fetch_one(&self.pool).await?;

        let sql = format!(
            "SELECT * FROM alert_records{filter} ORDER BY fired_at DESC LIMIT ? OFFSET ?"
        );
        let mut list_query = sqlx::query(&sql);
        if let Some(target_id) = query.target_id {
            list_query = list_query.bind(target_id);
        }
        if let Some(status) = &query.status {
            list_query = list_query.bind(status.as_str());
        }
        if let Some(start) = &query.start {
            list_query = list_query.bind(millis(start));
        }
        if let Some(end) = &query.end {
            list_query = list_query.bind(millis(end));
        }
        let rows = list_query
            .bind(size as i64)
            .bind(((page - 1) * size) as i64)
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.iter().map(row_to_alert).collect(), total))
    }

    async fn delete_alerts_for_target(&self, target_id: i64) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM alert_records WHERE target_id = ?")
            .bind(target_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_alerts_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM alert_records WHERE fired_at < ?")
            .bind(millis(&cutoff))
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn create_channel(&self, channel: &NotifyChannel) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO notify_channels \
                (name, kind, webhook_url, message_template, mention_all, enabled, \
                 description, created_at, updated_at) \
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&channel.name)
        .bind(&channel.kind)
        .bind(&channel.webhook_url)
        .bind(&channel.message_template)
        .bind(channel.mention_all as i64)
        .bind(channel.enabled as i64)
        .bind(&channel.description)
        .bind(millis(&channel.created_at))
        .bind(millis(&channel.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update_channel(&self, channel: &NotifyChannel) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE notify_channels SET \
                name = ?, kind = ?, webhook_url = ?, message_template = ?, \
                mention_all = ?, enabled = ?, description = ?, updated_at = ? \
            WHERE id = ?",
        )
        .bind(&channel.name)
        .bind(&channel.kind)
        .bind(&channel.webhook_url)
        .bind(&channel.message_template)
        .bind(channel.mention_all as i64)
        .bind(channel.enabled as i64)
        .bind(&channel.description)
        .bind(millis(&Utc::now()))
        .bind(channel.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("notify channel".to_string()));
        }
        Ok(())
    }

    async fn delete_channel(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM notify_channels WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound("notify channel".to_string()));
        }
        Ok(())
    }

    async fn get_channel(&self, id: i64) -> StoreResult<NotifyChannel> {
        let row = sqlx::query("SELECT * FROM notify_channels WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound("notify channel".to_string()))?;

        Ok(row_to_channel(&row))
    }

    async fn list_channels(&self) -> StoreResult<Vec<NotifyChannel>> {
        let rows = sqlx::query("SELECT * FROM notify_channels ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn list_enabled_channels(&self) -> StoreResult<Vec<NotifyChannel>> {
        let rows = sqlx::query("SELECT * FROM notify_channels WHERE enabled = 1 ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(row_to_channel).collect())
    }

    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| User {
            id: r.get("id"),
            username: r.get("username"),
            password_hash: r.get("password_hash"),
            created_at: from_millis(r.get("created_at")),
        }))
    }

    async fn create_user(&self, username: &str, password_hash: &str) -> StoreResult<i64> {
        let result = sqlx::query(
            "INSERT INTO users (username, password_hash, created_at) VALUES (?, ?, ?)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(millis(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn close(&self) -> StoreResult<()> {
        info!("closing SQLite store");
        self.pool.close().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("test.db"), 2)
            .await
            .unwrap();
        (dir, store)
    }

    fn target(name: &str) -> ProbeTarget {
        let now = Utc::now();
        ProbeTarget {
            id: 0,
            name: name.to_string(),
            kind: "tcp".to_string(),
            config: serde_json::json!({"host": "localhost", "port": 80}),
            timeout_seconds: 5,
            interval_seconds: 30,
            enabled: true,
            group: None,
            notify_channel_ids: vec![],
            status: TargetStatus::Unknown,
            last_check_at: None,
            last_latency_ms: 0,
            last_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn target_create_read_round_trip() {
        let (_dir, store) = open_store().await;

        let id = store.create_target(&target("web")).await.unwrap();
        let loaded = store.get_target(id).await.unwrap();

        assert_eq!(loaded.name, "web");
        assert_eq!(loaded.kind, "tcp");
        assert_eq!(loaded.timeout_seconds, 5);
        assert_eq!(loaded.status, TargetStatus::Unknown);
    }

    #[tokio::test]
    async fn delete_missing_target_is_not_found() {
        let (_dir, store) = open_store().await;
        assert!(matches!(
            store.delete_target(42).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn open_alert_lookup_honours_status() {
        let (_dir, store) = open_store().await;
        let now = Utc::now();

        let record = AlertRecord {
            id: 0,
            target_id: 7,
            target_name: "web".to_string(),
            target_kind: "tcp".to_string(),
            status: AlertStatus::Firing,
            message: "connect failed".to_string(),
            latency_ms: 120,
            fired_at: now,
            resolved_at: None,
            notified: false,
        };

        let id = store.insert_alert(&record).await.unwrap();
        assert!(store.has_open_alert(7).await.unwrap());

        store.resolve_alert(id, now).await.unwrap();
        assert!(!store.has_open_alert(7).await.unwrap());
        assert!(store.get_open_alert(7).await.unwrap().is_none());

        let resolved = store.get_alert(id).await.unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert!(resolved.resolved_at.is_some());
    }

    #[tokio::test]
    async fn retention_delete_only_removes_old_rows() {
        let (_dir, store) = open_store().await;
        let now = Utc::now();

        for age_days in [1, 40] {
            let record = ProbeResultRecord {
                id: 0,
                target_id: 1,
                success: true,
                latency_ms: 10,
                message: "ok".to_string(),
                metrics: None,
                warnings: None,
                checked_at: now - Duration::days(age_days),
            };
            store.insert_result(&record).await.unwrap();
        }

        let deleted = store
            .delete_results_before(now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let (remaining, total) = store
            .list_results(&ResultQuery {
                target_id: 1,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn success_rate_defaults_to_hundred_without_data() {
        let (_dir, store) = open_store().await;
        let rate = store
            .success_rate(99, Utc::now() - Duration::hours(24))
            .await
            .unwrap();
        assert_eq!(rate, 100.0);
    }
}
