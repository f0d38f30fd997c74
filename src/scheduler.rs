//! Probe scheduler
//!
//! Maintains one periodic runner task per enabled target. Every tick the
//! runner executes the probe under the target's deadline, feeds the outcome
//! through the per-target failure/recovery state machine, then publishes the
//! outcome (and the edge, if one was produced) on bounded streams.
//!
//! Backpressure policy: the streams are bounded and overflow *drops* with a
//! warning — producers never block, so a sluggish consumer can cost
//! persistence or a notification but never scheduler liveness. A dropped
//! firing edge is recoverable: the state machine has already advanced, and
//! the coordinator-side dedup means the record is simply created on the next
//! probe that re-reports the same level.
//!
//! Per-target execution is serial: the runner awaits each probe before the
//! next tick fires, and missed ticks are skipped rather than caught up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::model::{AlertStatus, ProbeTarget, TargetStatus};
use crate::probe::{ProbeOutcome, ProbeRegistry, ProbeSpec, Prober};
use crate::storage::Store;

/// Result stream capacity. Persistence is best-effort; overflow drops.
pub const RESULT_STREAM_CAPACITY: usize = 1000;

/// Edge stream capacity. Sized well above any expected concurrent edge
/// burst; a drop here can cost one notification.
pub const EDGE_STREAM_CAPACITY: usize = 100;

/// How long a probe may run past its own deadline before the scheduler
/// forcibly times the execution out.
const PROBE_GRACE: Duration = Duration::from_secs(1);

/// Cap on waiting for in-flight probes during shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("unsupported probe type: {0}")]
    UnknownKind(String),

    #[error("config validation failed: {0}")]
    InvalidConfig(String),

    #[error("scheduler is stopped")]
    Stopped,

    #[error("store error: {0}")]
    Store(#[from] crate::storage::StoreError),
}

/// A probe outcome paired with its target, published on the result stream.
#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub target: Arc<ProbeTarget>,
    pub outcome: ProbeOutcome,
}

/// A state-machine transition, published on the edge stream.
#[derive(Debug, Clone)]
pub struct EdgeEvent {
    pub target: Arc<ProbeTarget>,
    pub outcome: ProbeOutcome,
    pub status: AlertStatus,
    pub fail_count: u32,
}

/// Consecutive-failure counter for one target.
///
/// Emits *edges*, not levels: a firing edge exactly when the threshold-th
/// consecutive failure lands, a resolved edge on the first success after the
/// threshold was reached. Level deduplication is the coordinator's job.
#[derive(Debug, Default)]
pub struct ProbeState {
    pub fail_count: u32,
}

impl ProbeState {
    pub fn new(fail_count: u32) -> Self {
        Self { fail_count }
    }

    /// Advance the counter with one outcome. Returns the edge this outcome
    /// produced, if any, with the fail count at the transition.
    pub fn apply(&mut self, success: bool, threshold: u32) -> Option<(AlertStatus, u32)> {
        if !success {
            self.fail_count += 1;
            if self.fail_count == threshold {
                return Some((AlertStatus::Firing, self.fail_count));
            }
            return None;
        }

        if self.fail_count >= threshold {
            let at_transition = self.fail_count;
            self.fail_count = 0;
            return Some((AlertStatus::Resolved, at_transition));
        }

        self.fail_count = 0;
        None
    }
}

enum TaskCommand {
    /// Execute immediately, bypassing the interval timer. Used by tests and
    /// manual refresh.
    ProbeNow {
        respond_to: oneshot::Sender<ProbeOutcome>,
    },
    Shutdown,
}

struct TaskSlot {
    target: Arc<ProbeTarget>,
    state: Arc<Mutex<ProbeState>>,
    cmd_tx: mpsc::Sender<TaskCommand>,
    handle: JoinHandle<()>,
}

#[derive(Default)]
struct StreamCounters {
    dropped_results: AtomicU64,
    dropped_edges: AtomicU64,
}

/// Build the execution spec the prober sees for a target row.
pub fn spec_for(target: &ProbeTarget) -> ProbeSpec {
    let mut spec = ProbeSpec::new(
        target.kind.clone(),
        target.config.clone(),
        Duration::from_secs(target.timeout_seconds.max(1) as u64),
    );
    spec.name = target.name.clone();
    spec
}

pub struct Scheduler {
    registry: Arc<ProbeRegistry>,
    store: Arc<dyn Store>,
    tasks: DashMap<i64, TaskSlot>,
    // Dropped on stop() so the consumers observe channel close and drain.
    streams: Mutex<Option<(mpsc::Sender<ResultEvent>, mpsc::Sender<EdgeEvent>)>>,
    alert_threshold: u32,
    counters: Arc<StreamCounters>,
}

impl Scheduler {
    /// Create a scheduler plus the receiving ends of its two streams.
    pub fn new(
        registry: Arc<ProbeRegistry>,
        store: Arc<dyn Store>,
        alert_threshold: u32,
    ) -> (Self, mpsc::Receiver<ResultEvent>, mpsc::Receiver<EdgeEvent>) {
        let (result_tx, result_rx) = mpsc::channel(RESULT_STREAM_CAPACITY);
        let (edge_tx, edge_rx) = mpsc::channel(EDGE_STREAM_CAPACITY);

        let scheduler = Self {
            registry,
            store,
            tasks: DashMap::new(),
            streams: Mutex::new(Some((result_tx, edge_tx))),
            alert_threshold: alert_threshold.max(1),
            counters: Arc::new(StreamCounters::default()),
        };

        (scheduler, result_rx, edge_rx)
    }

    pub fn alert_threshold(&self) -> u32 {
        self.alert_threshold
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn has_task(&self, target_id: i64) -> bool {
        self.tasks.contains_key(&target_id)
    }

    /// Current fail count for a target's slot, if scheduled.
    pub fn fail_count(&self, target_id: i64) -> Option<u32> {
        self.tasks
            .get(&target_id)
            .map(|slot| slot.state.lock().fail_count)
    }

    pub fn dropped_results(&self) -> u64 {
        self.counters.dropped_results.load(Ordering::Relaxed)
    }

    pub fn dropped_edges(&self) -> u64 {
        self.counters.dropped_edges.load(Ordering::Relaxed)
    }

    /// Register a periodic task for a target.
    ///
    /// Fails when the probe type is unknown or the config does not validate.
    /// Carryover rule: a target persisted as unhealthy, or with an open
    /// firing record, starts at `fail_count = threshold` so the first
    /// success after a restart still emits the resolved edge.
    #[instrument(skip(self, target), fields(target_id = target.id, kind = %target.kind))]
    pub async fn add(&self, target: &ProbeTarget) -> Result<(), ScheduleError> {
        let (result_tx, edge_tx) = self
            .streams
            .lock()
            .as_ref()
            .cloned()
            .ok_or(ScheduleError::Stopped)?;

        let prober = self
            .registry
            .get(&target.kind)
            .ok_or_else(|| ScheduleError::UnknownKind(target.kind.clone()))?;

        let spec = spec_for(target);
        prober
            .validate(&spec)
            .map_err(|e| ScheduleError::InvalidConfig(e.to_string()))?;

        let mut initial_fail_count = 0;
        if target.status == TargetStatus::Unhealthy || self.store.has_open_alert(target.id).await? {
            initial_fail_count = self.alert_threshold;
            info!(
                fail_count = initial_fail_count,
                "seeding fail count for target with an unresolved alert"
            );
        }

        // Replace any existing slot so each target id owns exactly one task.
        self.remove(target.id);

        let target = Arc::new(target.clone());
        let state = Arc::new(Mutex::new(ProbeState::new(initial_fail_count)));
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let runner = TaskRunner {
            target: target.clone(),
            prober,
            spec,
            state: state.clone(),
            threshold: self.alert_threshold,
            result_tx,
            edge_tx,
            cmd_rx,
            counters: self.counters.clone(),
        };

        let handle = tokio::spawn(runner.run());

        info!(
            interval = target.interval_seconds,
            timeout = target.timeout_seconds,
            "probe task registered"
        );

        self.tasks.insert(
            target.id,
            TaskSlot {
                target,
                state,
                cmd_tx,
                handle,
            },
        );

        Ok(())
    }

    /// Unregister a target's task. An in-flight probe finishes but its
    /// outcome is discarded; the runner exits afterwards.
    pub fn remove(&self, target_id: i64) -> bool {
        if let Some((_, slot)) = self.tasks.remove(&target_id) {
            let _ = slot.cmd_tx.try_send(TaskCommand::Shutdown);
            info!(target_id, "probe task removed");
            return true;
        }
        false
    }

    /// Remove then re-add (when enabled) with the new target snapshot.
    pub async fn update(&self, target: &ProbeTarget) -> Result<(), ScheduleError> {
        self.remove(target.id);
        if target.enabled {
            return self.add(target).await;
        }
        Ok(())
    }

    /// Run a scheduled target's probe immediately, outside its interval.
    pub async fn probe_now(&self, target_id: i64) -> Option<ProbeOutcome> {
        let cmd_tx = self.tasks.get(&target_id)?.cmd_tx.clone();
        let (tx, rx) = oneshot::channel();
        cmd_tx
            .send(TaskCommand::ProbeNow { respond_to: tx })
            .await
            .ok()?;
        rx.await.ok()
    }

    /// Snapshot of scheduled targets, for diagnostics.
    pub fn scheduled_targets(&self) -> Vec<Arc<ProbeTarget>> {
        self.tasks.iter().map(|slot| slot.target.clone()).collect()
    }

    /// Stop all runners, waiting up to 10s for in-flight probes.
    pub async fn stop(&self) {
        info!(tasks = self.tasks.len(), "stopping scheduler");

        let mut handles = Vec::new();
        let ids: Vec<i64> = self.tasks.iter().map(|slot| *slot.key()).collect();
        for id in ids {
            if let Some((_, slot)) = self.tasks.remove(&id) {
                let _ = slot.cmd_tx.try_send(TaskCommand::Shutdown);
                handles.push(slot.handle);
            }
        }

        let deadline = Instant::now() + SHUTDOWN_GRACE;
        for handle in handles {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if tokio::time::timeout(remaining, handle).await.is_err() {
                warn!("probe task did not stop within the shutdown grace period");
            }
        }

        // All runners are gone; dropping our senders closes the streams so
        // the consumers can drain and exit.
        *self.streams.lock() = None;

        info!("scheduler stopped");
    }
}

/// The per-target loop. Owns the receiver side of the slot's command channel;
/// when the slot is dropped the channel closes and the loop exits.
struct TaskRunner {
    target: Arc<ProbeTarget>,
    prober: Arc<dyn Prober>,
    spec: ProbeSpec,
    state: Arc<Mutex<ProbeState>>,
    threshold: u32,
    result_tx: mpsc::Sender<ResultEvent>,
    edge_tx: mpsc::Sender<EdgeEvent>,
    cmd_rx: mpsc::Receiver<TaskCommand>,
    counters: Arc<StreamCounters>,
}

impl TaskRunner {
    #[instrument(skip(self), fields(target = %self.target.name, target_id = self.target.id))]
    async fn run(mut self) {
        debug!("probe task starting");

        let period = Duration::from_secs(self.target.interval_seconds.max(1) as u64);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let outcome = self.execute().await;

                    // A removal that raced the probe means this outcome is
                    // no longer wanted.
                    match self.cmd_rx.try_recv() {
                        Ok(TaskCommand::Shutdown) | Err(TryRecvError::Disconnected) => break,
                        Ok(TaskCommand::ProbeNow { respond_to }) => {
                            self.publish(outcome.clone());
                            let _ = respond_to.send(outcome);
                            continue;
                        }
                        Err(TryRecvError::Empty) => {}
                    }

                    self.publish(outcome);
                }

                cmd = self.cmd_rx.recv() => match cmd {
                    Some(TaskCommand::ProbeNow { respond_to }) => {
                        let outcome = self.execute().await;
                        self.publish(outcome.clone());
                        let _ = respond_to.send(outcome);
                    }
                    Some(TaskCommand::Shutdown) | None => break,
                },
            }
        }

        debug!("probe task stopped");
    }

    /// Run the probe bounded by the target deadline plus a small grace.
    async fn execute(&self) -> ProbeOutcome {
        let started = std::time::Instant::now();
        match tokio::time::timeout(self.spec.timeout + PROBE_GRACE, self.prober.probe(&self.spec))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => ProbeOutcome::failure(
                format!("probe timed out after {:?}", self.spec.timeout),
                started.elapsed(),
            ),
        }
    }

    /// Advance the state machine under the slot lock, then push to the
    /// streams without ever blocking.
    fn publish(&self, outcome: ProbeOutcome) {
        let edge = self
            .state
            .lock()
            .apply(outcome.success, self.threshold);

        match self.result_tx.try_send(ResultEvent {
            target: self.target.clone(),
            outcome: outcome.clone(),
        }) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.counters.dropped_results.fetch_add(1, Ordering::Relaxed);
                warn!("result stream full, dropping outcome");
            }
            Err(TrySendError::Closed(_)) => {}
        }

        if let Some((status, fail_count)) = edge {
            match self.edge_tx.try_send(EdgeEvent {
                target: self.target.clone(),
                outcome,
                status,
                fail_count,
            }) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.counters.dropped_edges.fetch_add(1, Ordering::Relaxed);
                    warn!("edge stream full, dropping {status:?} edge");
                }
                Err(TrySendError::Closed(_)) => {}
            }
        }
    }
}
