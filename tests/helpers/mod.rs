//! Shared fixtures for the integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pulsewatch::coordinator::AlertCoordinator;
use pulsewatch::model::{ProbeTarget, TargetStatus};
use pulsewatch::notify::Notifier;
use pulsewatch::probe::{ProbeConfigError, ProbeOutcome, ProbeRegistry, ProbeSpec, Prober};
use pulsewatch::scheduler::Scheduler;
use pulsewatch::silence::SilenceTable;
use pulsewatch::storage::{MemoryStore, Store};

/// Outcome script shared between a test and its scripted prober. Each probe
/// pops the next outcome; an empty script means success.
#[derive(Clone, Default)]
pub struct ProbeScript {
    queue: Arc<Mutex<VecDeque<bool>>>,
    counter: Arc<AtomicU64>,
}

impl ProbeScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcomes: &[bool]) {
        self.queue.lock().extend(outcomes.iter().copied());
    }
}

/// A prober that replays its script, with a distinct message per execution
/// so record refreshes are observable.
pub struct ScriptedProber {
    script: ProbeScript,
}

impl ScriptedProber {
    pub fn new(script: ProbeScript) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Prober for ScriptedProber {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    fn validate(&self, _spec: &ProbeSpec) -> Result<(), ProbeConfigError> {
        Ok(())
    }

    async fn probe(&self, _spec: &ProbeSpec) -> ProbeOutcome {
        let success = self.script.queue.lock().pop_front().unwrap_or(true);
        let n = self.script.counter.fetch_add(1, Ordering::Relaxed) + 1;
        if success {
            ProbeOutcome::success(format!("probe ok #{n}"), Duration::from_millis(5))
        } else {
            ProbeOutcome::failure(format!("probe failed #{n}"), Duration::from_millis(5))
        }
    }
}

/// A scheduler + coordinator wired over a shared in-memory store.
pub struct Pipeline {
    pub store: Arc<MemoryStore>,
    pub scheduler: Arc<Scheduler>,
    pub silences: Arc<SilenceTable>,
    pub script: ProbeScript,
}

pub fn spawn_pipeline(threshold: u32) -> Pipeline {
    spawn_pipeline_on(Arc::new(MemoryStore::new()), threshold, false)
}

pub fn spawn_pipeline_on(
    store: Arc<MemoryStore>,
    threshold: u32,
    notify_on_resolve: bool,
) -> Pipeline {
    let script = ProbeScript::new();

    let mut registry = ProbeRegistry::empty();
    registry.register(Arc::new(ScriptedProber::new(script.clone())));
    let registry = Arc::new(registry);

    let (scheduler, result_rx, edge_rx) = Scheduler::new(registry, store.clone(), threshold);
    let scheduler = Arc::new(scheduler);

    let silences = Arc::new(SilenceTable::new());
    let notifier = Arc::new(Notifier::new(store.clone() as Arc<dyn Store>));
    let coordinator = AlertCoordinator::new(
        store.clone(),
        notifier,
        silences.clone(),
        notify_on_resolve,
    );
    // The consumer tasks keep running detached for the test's lifetime.
    let _ = coordinator.spawn(result_rx, edge_rx);

    Pipeline {
        store,
        scheduler,
        silences,
        script,
    }
}

pub fn make_target(name: &str, channel_ids: Vec<i64>) -> ProbeTarget {
    let now = Utc::now();
    ProbeTarget {
        id: 0,
        name: name.to_string(),
        kind: "scripted".to_string(),
        config: serde_json::json!({}),
        timeout_seconds: 5,
        // Long interval: tests drive probes explicitly via probe_now.
        interval_seconds: 3600,
        enabled: true,
        group: None,
        notify_channel_ids: channel_ids,
        status: TargetStatus::Unknown,
        last_check_at: None,
        last_latency_ms: 0,
        last_message: String::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Persist a scripted target and register it with the pipeline's scheduler.
pub async fn add_scripted_target(pipeline: &Pipeline, channel_ids: Vec<i64>) -> i64 {
    let mut target = make_target("scripted-target", channel_ids);
    target.id = pipeline.store.create_target(&target).await.unwrap();
    pipeline.scheduler.add(&target).await.unwrap();
    target.id
}

/// Run the next `outcomes` through the target's probe task, in order.
pub async fn drive(pipeline: &Pipeline, target_id: i64, outcomes: &[bool]) {
    pipeline.script.push(outcomes);
    for _ in outcomes {
        pipeline
            .scheduler
            .probe_now(target_id)
            .await
            .expect("target should be scheduled");
    }
    settle().await;
}

/// Give the coordinator's consumers time to drain the streams.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(120)).await;
}

/// Number of currently firing alert records for a target.
pub async fn firing_count(store: &MemoryStore, target_id: i64) -> usize {
    let (alerts, _) = store
        .list_alerts(&pulsewatch::storage::AlertQuery {
            target_id: Some(target_id),
            status: Some(pulsewatch::model::AlertStatus::Firing),
            ..Default::default()
        })
        .await
        .unwrap();
    alerts.len()
}
