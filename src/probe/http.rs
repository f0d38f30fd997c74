//! HTTP(S) endpoint probe
//!
//! Checks status code and optionally a body substring. The client is built
//! per execution because TLS verification is a per-target setting.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct HttpProber;

impl HttpProber {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    fn kind(&self) -> &'static str {
        "http"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        if !spec.has_config("url") {
            return Err(ProbeConfigError::missing("url"));
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let url = spec.str_config("url", "");
        if url.is_empty() {
            return ProbeOutcome::failure("url must not be empty", start.elapsed());
        }

        let insecure = spec.bool_config("insecure_skip_verify", false);

        let client = match reqwest::Client::builder()
            .timeout(spec.timeout)
            .danger_accept_invalid_certs(insecure)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                return ProbeOutcome::failure(
                    format!("failed to build HTTP client: {e}"),
                    start.elapsed(),
                );
            }
        };

        let method = match spec.str_config("method", "GET").to_uppercase().as_str() {
            "POST" => reqwest::Method::POST,
            "HEAD" => reqwest::Method::HEAD,
            _ => reqwest::Method::GET,
        };

        trace!("probing {url} with {method}");

        let mut request = client.request(method.clone(), &url);

        // Headers come in as "Key: Value" lines.
        for line in spec.str_config("headers", "").lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                request = request.header(key.trim(), value.trim());
            }
        }

        if method == reqwest::Method::POST {
            let body = spec.str_config("body", "");
            if !body.is_empty() {
                request = request.body(body);
            }
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                return ProbeOutcome::failure(format!("request failed: {e}"), start.elapsed());
            }
        };

        let latency = start.elapsed();
        let status = response.status();

        let mut metrics = serde_json::Map::new();
        metrics.insert("status_code".into(), Value::from(status.as_u16()));
        metrics.insert(
            "proto".into(),
            Value::from(format!("{:?}", response.version())),
        );
        if let Some(len) = response.content_length() {
            metrics.insert("content_length".into(), Value::from(len));
        }

        let body = if method == reqwest::Method::HEAD {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };

        let expected_status = spec.int_config("expected_status", 200) as u16;
        if status.as_u16() != expected_status {
            let mut outcome = ProbeOutcome::failure(
                format!(
                    "status code {} did not match expected {expected_status}",
                    status.as_u16()
                ),
                latency,
            );
            outcome.metrics = Some(metrics);
            return outcome;
        }

        let expected_body = spec.str_config("expected_body", "");
        if !expected_body.is_empty() && !body.contains(&expected_body) {
            let mut outcome = ProbeOutcome::failure(
                format!("response body does not contain expected text: {expected_body}"),
                latency,
            );
            outcome.metrics = Some(metrics);
            return outcome;
        }

        let mut outcome = ProbeOutcome::success(
            format!(
                "HTTP {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            ),
            latency,
        );
        outcome.metrics = Some(metrics);
        outcome
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([
            (
                "url",
                FieldSchema::string("URL", true).placeholder("http://example.com/api/health"),
            ),
            (
                "method",
                FieldSchema::string("Request method", false).hint("GET, POST or HEAD"),
            ),
            (
                "headers",
                FieldSchema::string("Request headers", false).hint("one per line, Key: Value"),
            ),
            ("body", FieldSchema::string("Request body", false)),
            (
                "expected_status",
                FieldSchema::number("Expected status code", false, 200),
            ),
            (
                "expected_body",
                FieldSchema::string("Expected body substring", false).placeholder("ok"),
            ),
            (
                "insecure_skip_verify",
                FieldSchema::boolean("Skip TLS verification", false),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    fn spec(config: Value) -> ProbeSpec {
        ProbeSpec::new("http", config, Duration::from_secs(2))
    }

    #[test]
    fn validate_requires_url() {
        let prober = HttpProber::new();
        assert!(prober.validate(&spec(json!({}))).is_err());
        assert!(prober.validate(&spec(json!({"url": "http://x"}))).is_ok());
    }

    #[tokio::test]
    async fn empty_url_fails_without_network() {
        let prober = HttpProber::new();
        let outcome = prober.probe(&spec(json!({"url": ""}))).await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_failed_outcome() {
        let prober = HttpProber::new();
        let outcome = prober
            .probe(&spec(json!({"url": "http://127.0.0.1:1/none"})))
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("request failed"));
    }
}
