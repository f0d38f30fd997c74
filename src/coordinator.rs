//! Alert coordinator
//!
//! Two long-running consumers over the scheduler's streams:
//!
//! - the *result* consumer persists every outcome and keeps the target's
//!   denormalized health fields in step (level processing);
//! - the *edge* consumer drives alert records: it deduplicates repeated
//!   firing edges into the single open record per target, freezes the
//!   original `fired_at`, dispatches notifications unless the target is
//!   silenced, and closes the record on the resolved edge (transition
//!   processing).
//!
//! The coordinator is the only writer of alert records and of target health.
//! Storage failures are logged and swallowed; the next probe overwrites.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::model::{AlertRecord, AlertStatus, TargetStatus};
use crate::notify::{AlertMessage, Notifier};
use crate::scheduler::{EdgeEvent, ResultEvent};
use crate::silence::SilenceTable;
use crate::storage::Store;

pub struct AlertCoordinator {
    store: Arc<dyn Store>,
    notifier: Arc<Notifier>,
    silences: Arc<SilenceTable>,
    /// When set, resolved edges also dispatch a recovery notification.
    /// Off by default: resolution updates the record silently.
    notify_on_resolve: bool,
    /// Targets whose firing-edge notification was suppressed (silence) or
    /// failed. The state machine emits edges only at the transition tick, so
    /// these deliveries are retried from subsequent failing outcomes on the
    /// result stream; the open record must not stay silent until resolution.
    pending_notify: DashMap<i64, ()>,
}

/// Join handle for the two consumer tasks. They exit when the scheduler
/// drops its stream senders and the channels drain.
pub struct CoordinatorHandle {
    result_task: JoinHandle<()>,
    edge_task: JoinHandle<()>,
}

impl CoordinatorHandle {
    pub async fn join(self) {
        let _ = self.result_task.await;
        let _ = self.edge_task.await;
    }
}

impl AlertCoordinator {
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Arc<Notifier>,
        silences: Arc<SilenceTable>,
        notify_on_resolve: bool,
    ) -> Self {
        Self {
            store,
            notifier,
            silences,
            notify_on_resolve,
            pending_notify: DashMap::new(),
        }
    }

    /// Spawn both consumers.
    pub fn spawn(
        self,
        mut result_rx: mpsc::Receiver<ResultEvent>,
        mut edge_rx: mpsc::Receiver<EdgeEvent>,
    ) -> CoordinatorHandle {
        let coordinator = Arc::new(self);

        let results = coordinator.clone();
        let result_task = tokio::spawn(async move {
            debug!("result consumer starting");
            while let Some(event) = result_rx.recv().await {
                results.handle_result(event).await;
            }
            debug!("result stream closed, consumer exiting");
        });

        let edges = coordinator;
        let edge_task = tokio::spawn(async move {
            debug!("edge consumer starting");
            while let Some(event) = edge_rx.recv().await {
                edges.handle_edge(event).await;
            }
            debug!("edge stream closed, consumer exiting");
        });

        CoordinatorHandle {
            result_task,
            edge_task,
        }
    }

    /// Level processing: persist the outcome, then reflect it in the
    /// target's health fields.
    #[instrument(skip(self, event), fields(target_id = event.target.id))]
    pub(crate) async fn handle_result(&self, event: ResultEvent) {
        let outcome = &event.outcome;

        let record = crate::model::ProbeResultRecord {
            id: 0,
            target_id: event.target.id,
            success: outcome.success,
            latency_ms: outcome.latency_ms(),
            message: outcome.message.clone(),
            metrics: outcome
                .metrics
                .as_ref()
                .map(|m| serde_json::Value::Object(m.clone())),
            warnings: if outcome.warnings.is_empty() {
                None
            } else {
                serde_json::to_value(&outcome.warnings).ok()
            },
            checked_at: outcome.checked_at,
        };

        if let Err(e) = self.store.insert_result(&record).await {
            error!("failed to persist probe result: {e}");
        }

        let status = if outcome.success {
            TargetStatus::Healthy
        } else {
            TargetStatus::Unhealthy
        };

        if let Err(e) = self
            .store
            .update_target_health(
                event.target.id,
                status,
                outcome.latency_ms(),
                &outcome.message,
                outcome.checked_at,
            )
            .await
        {
            error!("failed to update target health: {e}");
        }

        if !outcome.success {
            self.refresh_open_alert(&event).await;
        }
    }

    /// Repeated failures after the firing edge arrive only on the result
    /// stream. Keep the open record's latest cause current, and complete a
    /// delivery that the edge tick could not make (silenced or failed).
    async fn refresh_open_alert(&self, event: &ResultEvent) {
        let target = &event.target;
        let outcome = &event.outcome;

        let Ok(Some(mut record)) = self.store.get_open_alert(target.id).await else {
            return;
        };

        // Narrow update: status, fired_at and notified stay untouched so a
        // concurrent edge-side write cannot be clobbered.
        if let Err(e) = self
            .store
            .refresh_alert_cause(
                record.id,
                &target.name,
                &target.kind,
                &outcome.message,
                outcome.latency_ms(),
            )
            .await
        {
            error!("failed to refresh open alert record: {e}");
        }

        let awaiting = self.pending_notify.contains_key(&target.id);
        if awaiting && !self.silences.is_silenced(target.id) {
            let alert = AlertMessage {
                target_id: target.id,
                target_name: target.name.clone(),
                target_kind: target.kind.clone(),
                status: AlertStatus::Firing,
                message: outcome.message.clone(),
                latency_ms: outcome.latency_ms(),
                fired_at: outcome.checked_at,
                resolved_at: None,
            };
            match self.notifier.dispatch(&target.notify_channel_ids, &alert).await {
                Ok(()) => {
                    record.notified = true;
                    record.message = outcome.message.clone();
                    record.latency_ms = outcome.latency_ms();
                    self.pending_notify.remove(&target.id);
                    info!(target = %target.name, "deferred alert notification sent");
                    if let Err(e) = self.store.update_alert(&record).await {
                        error!("failed to mark alert as notified: {e}");
                    }
                }
                Err(e) => warn!("deferred alert notification failed: {e}"),
            }
        }
    }

    /// Transition processing: maintain the single open record per target and
    /// hand firing edges to the notifier unless the target is silenced.
    #[instrument(skip(self, event), fields(target_id = event.target.id, status = ?event.status))]
    pub(crate) async fn handle_edge(&self, event: EdgeEvent) {
        match event.status {
            AlertStatus::Firing => self.handle_firing(event).await,
            AlertStatus::Resolved => self.handle_resolved(event).await,
        }
    }

    async fn handle_firing(&self, event: EdgeEvent) {
        let target = &event.target;
        let outcome = &event.outcome;
        let fired_at = outcome.checked_at;

        let open = match self.store.get_open_alert(target.id).await {
            Ok(open) => open,
            Err(e) => {
                error!("failed to look up open alert: {e}");
                None
            }
        };

        let is_new = open.is_none();
        let mut record = match open {
            Some(mut existing) => {
                // Refresh the latest cause; fired_at stays at the start of
                // the incident.
                existing.target_name = target.name.clone();
                existing.target_kind = target.kind.clone();
                existing.message = outcome.message.clone();
                existing.latency_ms = outcome.latency_ms();
                existing
            }
            None => {
                let mut fresh = AlertRecord {
                    id: 0,
                    target_id: target.id,
                    target_name: target.name.clone(),
                    target_kind: target.kind.clone(),
                    status: AlertStatus::Firing,
                    message: outcome.message.clone(),
                    latency_ms: outcome.latency_ms(),
                    fired_at,
                    resolved_at: None,
                    notified: false,
                };
                match self.store.insert_alert(&fresh).await {
                    Ok(id) => fresh.id = id,
                    Err(e) => error!("failed to create alert record: {e}"),
                }
                fresh
            }
        };

        if self.silences.is_silenced(target.id) {
            debug!("target silenced, suppressing notification");
            self.pending_notify.insert(target.id, ());
        } else {
            let alert = AlertMessage {
                target_id: target.id,
                target_name: target.name.clone(),
                target_kind: target.kind.clone(),
                status: AlertStatus::Firing,
                message: outcome.message.clone(),
                latency_ms: outcome.latency_ms(),
                // Notifications show when *this* failure happened, not the
                // frozen incident start.
                fired_at,
                resolved_at: None,
            };

            match self.notifier.dispatch(&target.notify_channel_ids, &alert).await {
                Ok(()) => {
                    // Monotone: once any delivery for this open record has
                    // succeeded it stays true.
                    record.notified = true;
                    self.pending_notify.remove(&target.id);
                    info!(target = %target.name, "alert notification sent");
                }
                Err(e) => {
                    warn!("alert notification failed: {e}");
                    self.pending_notify.insert(target.id, ());
                }
            }
        }

        if record.id != 0 {
            let must_update = !is_new || record.notified;
            if must_update {
                if let Err(e) = self.store.update_alert(&record).await {
                    error!("failed to update alert record: {e}");
                }
            }
        }

        if let Err(e) = self
            .store
            .update_target_health(
                target.id,
                TargetStatus::Unhealthy,
                outcome.latency_ms(),
                &outcome.message,
                outcome.checked_at,
            )
            .await
        {
            error!("failed to update target health: {e}");
        }
    }

    async fn handle_resolved(&self, event: EdgeEvent) {
        let target = &event.target;
        let outcome = &event.outcome;
        let resolved_at = Utc::now();

        self.pending_notify.remove(&target.id);

        match self.store.get_open_alert(target.id).await {
            Ok(Some(record)) => {
                if let Err(e) = self.store.resolve_alert(record.id, resolved_at).await {
                    error!("failed to resolve alert record: {e}");
                } else {
                    info!(target = %target.name, "alert resolved");
                }

                if self.notify_on_resolve && !self.silences.is_silenced(target.id) {
                    let alert = AlertMessage {
                        target_id: target.id,
                        target_name: target.name.clone(),
                        target_kind: target.kind.clone(),
                        status: AlertStatus::Resolved,
                        message: outcome.message.clone(),
                        latency_ms: outcome.latency_ms(),
                        fired_at: record.fired_at,
                        resolved_at: Some(resolved_at),
                    };
                    if let Err(e) = self.notifier.dispatch(&target.notify_channel_ids, &alert).await
                    {
                        warn!("recovery notification failed: {e}");
                    }
                }
            }
            Ok(None) => debug!("resolved edge without an open record, nothing to close"),
            Err(e) => error!("failed to look up open alert: {e}"),
        }

        if let Err(e) = self
            .store
            .update_target_health(
                target.id,
                TargetStatus::Healthy,
                outcome.latency_ms(),
                &outcome.message,
                outcome.checked_at,
            )
            .await
        {
            error!("failed to update target health: {e}");
        }
    }
}
