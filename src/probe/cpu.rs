//! Host CPU utilisation probe
//!
//! Samples global CPU usage via sysinfo and fails the probe when usage
//! crosses the configured threshold.

use std::collections::HashMap;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::Value;
use sysinfo::System;

use super::{FieldSchema, ProbeConfigError, ProbeOutcome, ProbeSpec, Prober};

pub struct CpuProber;

#[async_trait]
impl Prober for CpuProber {
    fn kind(&self) -> &'static str {
        "cpu"
    }

    fn validate(&self, spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        let threshold = spec.float_config("threshold", -1.0);
        if !(0.0..=100.0).contains(&threshold) {
            return Err(ProbeConfigError(
                "threshold must be between 0 and 100".to_string(),
            ));
        }
        Ok(())
    }

    async fn probe(&self, spec: &ProbeSpec) -> ProbeOutcome {
        let start = Instant::now();

        let threshold = spec.float_config("threshold", 80.0);
        if !(0.0..=100.0).contains(&threshold) {
            return ProbeOutcome::failure("threshold must be between 0 and 100", start.elapsed());
        }

        // sysinfo needs two refreshes with a minimum gap to compute usage.
        let mut system = System::new();
        system.refresh_cpu_usage();
        tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
        system.refresh_cpu_usage();

        let usage = system.global_cpu_usage() as f64;
        let cores = system.cpus().len();

        let mut metrics = serde_json::Map::new();
        metrics.insert("cpu_percent".into(), Value::from(usage));
        metrics.insert("cpu_cores".into(), Value::from(cores));
        metrics.insert("threshold".into(), Value::from(threshold));

        let latency = start.elapsed();

        if usage > threshold {
            let mut outcome = ProbeOutcome::failure(
                format!("CPU usage {usage:.1}% exceeds threshold {threshold:.1}%"),
                latency,
            );
            outcome.metrics = Some(metrics);
            return outcome;
        }

        let mut outcome = ProbeOutcome::success(
            format!("CPU usage {usage:.1}% (threshold {threshold:.1}%)"),
            latency,
        );
        outcome.metrics = Some(metrics);
        outcome
    }

    fn config_schema(&self) -> HashMap<&'static str, FieldSchema> {
        HashMap::from([(
            "threshold",
            FieldSchema::number("Alert threshold (%)", true, 80)
                .hint("probe fails when CPU usage exceeds this percentage"),
        )])
    }
}
