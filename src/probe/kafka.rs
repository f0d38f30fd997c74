//! Kafka bootstrap-broker probe
//!
//! Checks TCP reachability of the configured bootstrap servers. The cluster
//! counts as up when at least one broker accepts a connection; unreachable
//! brokers in a reachable cluster are reported as warnings.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use tokio::net::TcpStream;

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct KafkaProber;

#[async_trait]
impl Prober for KafkaProber {
    fn kind(&self) -> &'static str {
        "kafka"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        if spec.list_config("bootstrap_servers").is_empty() {
            return Err(ProbeConfigError::missing("bootstrap_servers"));
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let brokers = spec.list_config("bootstrap_servers");
        if brokers.is_empty() {
            return ProbeOutcome::failure("bootstrap_servers must not be empty", start.elapsed());
        }

        // Each broker gets a share of the deadline so a dead first broker
        // cannot eat the whole budget.
        let per_broker = spec.timeout / brokers.len() as u32;

        let mut reachable = 0usize;
        let mut warnings = Vec::new();
        let mut broker_states = serde_json::Map::new();

        for broker in &brokers {
            let connected = matches!(
                tokio::time::timeout(per_broker, TcpStream::connect(broker)).await,
                Ok(Ok(_))
            );
            broker_states.insert(broker.clone(), Value::from(connected));
            if connected {
                reachable += 1;
            } else {
                warnings.push(format!("broker {broker} unreachable"));
            }
        }

        let latency = start.elapsed();

        let mut metrics = serde_json::Map::new();
        metrics.insert("brokers_total".into(), Value::from(brokers.len()));
        metrics.insert("brokers_reachable".into(), Value::from(reachable));
        metrics.insert("brokers".into(), Value::Object(broker_states));

        if reachable == 0 {
            let mut outcome = ProbeOutcome::failure("no bootstrap broker reachable", latency);
            outcome.metrics = Some(metrics);
            return outcome;
        }

        let message = if warnings.is_empty() {
            format!("Kafka reachable ({reachable}/{} brokers)", brokers.len())
        } else {
            format!(
                "Kafka reachable with warnings ({reachable}/{} brokers)",
                brokers.len()
            )
        };

        let mut outcome = ProbeOutcome::success(message, latency);
        outcome.metrics = Some(metrics);
        outcome.warnings = warnings;
        outcome
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([(
            "bootstrap_servers",
            FieldSchema::string("Bootstrap servers", true)
                .placeholder("broker1:9092,broker2:9092")
                .hint("comma separated host:port list"),
        )])
    }
}
