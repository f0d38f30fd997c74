//! Plain TCP connect probe.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpStream;

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct TcpProber;

#[async_trait]
impl Prober for TcpProber {
    fn kind(&self) -> &'static str {
        "tcp"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        if !spec.has_config("host") {
            return Err(ProbeConfigError::missing("host"));
        }
        if !spec.has_config("port") {
            return Err(ProbeConfigError::missing("port"));
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let host = spec.str_config("host", "localhost");
        let port = spec.int_config("port", 80);
        let addr = format!("{host}:{port}");

        let connect = tokio::time::timeout(spec.timeout, TcpStream::connect(&addr)).await;
        let latency = start.elapsed();

        let stream = match connect {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return ProbeOutcome::failure(format!("connect failed: {e}"), latency);
            }
            Err(_) => {
                return ProbeOutcome::failure(
                    format!("connect timed out after {:?}", spec.timeout),
                    latency,
                );
            }
        };

        let mut metrics = serde_json::Map::new();
        if let Ok(peer) = stream.peer_addr() {
            metrics.insert("remote_addr".into(), Value::from(peer.to_string()));
        }
        if let Ok(local) = stream.local_addr() {
            metrics.insert("local_addr".into(), Value::from(local.to_string()));
        }

        let mut outcome = ProbeOutcome::success(format!("TCP connect succeeded: {addr}"), latency);
        outcome.metrics = Some(metrics);
        outcome
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([
            ("host", FieldSchema::string("Host", true).placeholder("localhost")),
            ("port", FieldSchema::number("Port", true, 80)),
        ])
    }
}
