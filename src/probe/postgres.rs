//! PostgreSQL probe
//!
//! Opens a single connection, pings with `SELECT 1`, then collects
//! connection-count, size and version metrics on a best-effort basis.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgSslMode};
use sqlx::{ConnectOptions, Connection, Row};

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct PostgresProber;

#[async_trait]
impl Prober for PostgresProber {
    fn kind(&self) -> &'static str {
        "postgresql"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        for field in ["host", "username", "password", "database"] {
            if !spec.has_config(field) {
                return Err(ProbeConfigError::missing(field));
            }
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let ssl_mode = match spec.str_config("ssl_mode", "disable").as_str() {
            "require" => PgSslMode::Require,
            "verify-ca" => PgSslMode::VerifyCa,
            "verify-full" => PgSslMode::VerifyFull,
            _ => PgSslMode::Disable,
        };

        let options = PgConnectOptions::new()
            .host(&spec.str_config("host", "localhost"))
            .port(spec.int_config("port", 5432) as u16)
            .username(&spec.str_config("username", ""))
            .password(&spec.str_config("password", ""))
            .database(&spec.str_config("database", "postgres"))
            .ssl_mode(ssl_mode);

        let mut conn = match tokio::time::timeout(spec.timeout, options.connect()).await {
            Ok(Ok(conn)) => conn,
            Ok(Err(e)) => {
                return ProbeOutcome::failure(format!("connect failed: {e}"), start.elapsed());
            }
            Err(_) => {
                return ProbeOutcome::failure(
                    format!("connect timed out after {:?}", spec.timeout),
                    start.elapsed(),
                );
            }
        };

        if let Err(e) = sqlx::query("SELECT 1").execute(&mut conn).await {
            return ProbeOutcome::failure(format!("ping failed: {e}"), start.elapsed());
        }

        let mut metrics = serde_json::Map::new();
        let mut warnings = Vec::new();

        // Connection pressure. Failures here degrade to missing metrics, not
        // a failed probe.
        let row = sqlx::query(
            "SELECT \
                (SELECT count(*) FROM pg_stat_activity WHERE state = 'active') AS active, \
                (SELECT setting::bigint FROM pg_settings WHERE name = 'max_connections') AS max",
        )
        .fetch_one(&mut conn)
        .await;

        if let Ok(row) = row {
            let active: i64 = row.get("active");
            let max: i64 = row.get("max");
            metrics.insert("active_connections".into(), Value::from(active));
            metrics.insert("max_connections".into(), Value::from(max));
            if max > 0 {
                metrics.insert(
                    "connection_usage_percent".into(),
                    Value::from(active as f64 / max as f64 * 100.0),
                );
            }

            let threshold = spec.int_config("max_connections_threshold", 100);
            if active > threshold {
                warnings.push(format!(
                    "{active} active connections exceed threshold {threshold}"
                ));
            }
        }

        if let Ok(row) = sqlx::query("SELECT pg_size_pretty(pg_database_size(current_database()))")
            .fetch_one(&mut conn)
            .await
        {
            let size: String = row.get(0);
            metrics.insert("database_size".into(), Value::from(size));
        }

        if let Ok(row) = sqlx::query("SELECT version()").fetch_one(&mut conn).await {
            let version: String = row.get(0);
            metrics.insert("version".into(), Value::from(version));
        }

        let _ = conn.close().await;

        let latency = start.elapsed();
        let message = if warnings.is_empty() {
            "PostgreSQL is up".to_string()
        } else {
            format!("PostgreSQL is up with warnings: {}", warnings.join("; "))
        };

        let mut outcome = ProbeOutcome::success(message, latency);
        outcome.metrics = Some(metrics);
        outcome.warnings = warnings;
        outcome
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([
            ("host", FieldSchema::string("Host", true).placeholder("localhost")),
            ("port", FieldSchema::number("Port", true, 5432)),
            ("username", FieldSchema::string("Username", true)),
            ("password", FieldSchema::password("Password", true)),
            ("database", FieldSchema::string("Database", true)),
            (
                "ssl_mode",
                FieldSchema::string("SSL mode", false)
                    .hint("disable, require, verify-ca or verify-full"),
            ),
            (
                "max_connections_threshold",
                FieldSchema::number("Active connection warning threshold", false, 100),
            ),
        ])
    }
}
