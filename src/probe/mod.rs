//! Probe contract and registry
//!
//! A probe is the pluggable act of checking one target. Implementations
//! expose three operations: a type tag, config validation, and the probe
//! itself. Probe failures are *data*, not errors: a prober returns
//! `ProbeOutcome { success: false, .. }` for an unreachable or unhealthy
//! endpoint and reserves `Err` for nothing — the scheduler folds any
//! unexpected error into an unsuccessful outcome anyway.
//!
//! The registry is built once at startup; registration is never concurrent
//! with lookup.

pub mod cpu;
pub mod http;
pub mod kafka;
pub mod postgres;
pub mod redis;
pub mod tcp;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// The outcome of one probe execution.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    #[serde(skip)]
    pub latency: Duration,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<serde_json::Map<String, Value>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub checked_at: DateTime<Utc>,
}

impl ProbeOutcome {
    pub fn failure(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: false,
            latency,
            message: message.into(),
            metrics: None,
            warnings: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn success(message: impl Into<String>, latency: Duration) -> Self {
        Self {
            success: true,
            latency,
            message: message.into(),
            metrics: None,
            warnings: Vec::new(),
            checked_at: Utc::now(),
        }
    }

    pub fn latency_ms(&self) -> i64 {
        self.latency.as_millis() as i64
    }
}

/// What a prober needs to know about its target: the opaque config map plus
/// the execution deadline. Built by the scheduler from a `ProbeTarget` row.
#[derive(Debug, Clone)]
pub struct ProbeSpec {
    pub name: String,
    pub kind: String,
    pub config: serde_json::Map<String, Value>,
    pub timeout: Duration,
}

impl ProbeSpec {
    pub fn new(kind: impl Into<String>, config: Value, timeout: Duration) -> Self {
        let config = match config {
            Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        Self {
            name: String::new(),
            kind: kind.into(),
            config,
            timeout,
        }
    }

    pub fn str_config(&self, key: &str, default: &str) -> String {
        match self.config.get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => default.to_string(),
        }
    }

    pub fn int_config(&self, key: &str, default: i64) -> i64 {
        match self.config.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(default),
            _ => default,
        }
    }

    pub fn float_config(&self, key: &str, default: f64) -> f64 {
        match self.config.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            _ => default,
        }
    }

    pub fn bool_config(&self, key: &str, default: bool) -> bool {
        match self.config.get(key) {
            Some(Value::Bool(b)) => *b,
            _ => default,
        }
    }

    /// Comma-separated list config ("a:1,b:2" → ["a:1", "b:2"]).
    pub fn list_config(&self, key: &str) -> Vec<String> {
        self.str_config(key, "")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn has_config(&self, key: &str) -> bool {
        self.config.contains_key(key)
    }
}

/// Config validation failure, surfaced to the API as a 400-class error.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ProbeConfigError(pub String);

impl ProbeConfigError {
    pub fn missing(field: &str) -> Self {
        Self(format!("missing required field: {field}"))
    }
}

/// UI form field description for a probe config key.
#[derive(Debug, Clone, Serialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: &'static str,
    pub label: &'static str,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
}

impl FieldSchema {
    pub fn string(label: &'static str, required: bool) -> Self {
        Self {
            field_type: "string",
            label,
            required,
            placeholder: None,
            hint: None,
            default_value: None,
        }
    }

    pub fn number(label: &'static str, required: bool, default: i64) -> Self {
        Self {
            field_type: "number",
            label,
            required,
            placeholder: None,
            hint: None,
            default_value: Some(Value::from(default)),
        }
    }

    pub fn password(label: &'static str, required: bool) -> Self {
        Self {
            field_type: "password",
            label,
            required,
            placeholder: None,
            hint: None,
            default_value: None,
        }
    }

    pub fn boolean(label: &'static str, default: bool) -> Self {
        Self {
            field_type: "boolean",
            label,
            required: false,
            placeholder: None,
            hint: None,
            default_value: Some(Value::from(default)),
        }
    }

    pub fn placeholder(mut self, text: &'static str) -> Self {
        self.placeholder = Some(text);
        self
    }

    pub fn hint(mut self, text: &'static str) -> Self {
        self.hint = Some(text);
        self
    }
}

/// A pluggable probe implementation.
///
/// `probe` must respect `spec.timeout`: it never outlives the deadline by
/// more than a small grace, surfaces cancellation as an unsuccessful outcome
/// with a message, and never panics out of the call.
#[async_trait]
pub trait Prober: Send + Sync {
    /// The type tag targets use to select this prober.
    fn kind(&self) -> &'static str;

    /// Validate a target config before it is accepted.
    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError>;

    /// Execute one check against the target.
    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome;

    /// Form schema for the UI; empty by default.
    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::new()
    }
}

/// Process-wide mapping from type tag to prober.
pub struct ProbeRegistry {
    probers: HashMap<&'static str, Arc<dyn Prober>>,
}

impl ProbeRegistry {
    pub fn empty() -> Self {
        Self {
            probers: HashMap::new(),
        }
    }

    /// Registry with every built-in prober.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(http::HttpProber::new()));
        registry.register(Arc::new(tcp::TcpProber));
        registry.register(Arc::new(postgres::PostgresProber));
        registry.register(Arc::new(redis::RedisProber));
        registry.register(Arc::new(kafka::KafkaProber));
        registry.register(Arc::new(cpu::CpuProber));
        registry
    }

    pub fn register(&mut self, prober: Arc<dyn Prober>) {
        self.probers.insert(prober.kind(), prober);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn Prober>> {
        self.probers.get(kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.probers.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }

    pub fn schema(&self, kind: &str) -> Option<HashMap<&'static str, FieldSchema>> {
        self.probers.get(kind).map(|p| p.config_schema())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builtin_registry_knows_all_kinds() {
        let registry = ProbeRegistry::with_builtins();
        assert_eq!(
            registry.kinds(),
            vec!["cpu", "http", "kafka", "postgresql", "redis", "tcp"]
        );
        assert!(registry.get("http").is_some());
        assert!(registry.get("snmp").is_none());
    }

    #[test]
    fn spec_config_accessors_coerce_and_default() {
        let spec = ProbeSpec::new(
            "http",
            json!({
                "url": "http://example.com",
                "port": 8080,
                "ratio": 0.5,
                "insecure": true,
                "addrs": "a:1, b:2 ,,c:3"
            }),
            Duration::from_secs(5),
        );

        assert_eq!(spec.str_config("url", ""), "http://example.com");
        assert_eq!(spec.str_config("missing", "dflt"), "dflt");
        assert_eq!(spec.int_config("port", 80), 8080);
        assert_eq!(spec.int_config("missing", 80), 80);
        assert!((spec.float_config("ratio", 0.0) - 0.5).abs() < f64::EPSILON);
        assert!(spec.bool_config("insecure", false));
        assert_eq!(spec.list_config("addrs"), vec!["a:1", "b:2", "c:3"]);
    }

    #[test]
    fn non_object_config_becomes_empty_map() {
        let spec = ProbeSpec::new("tcp", json!("not a map"), Duration::from_secs(1));
        assert!(!spec.has_config("host"));
    }
}
