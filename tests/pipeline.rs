//! Scheduler → coordinator pipeline scenarios.
//!
//! Probes are driven explicitly through the scheduler's probe-now path with
//! a scripted prober, so each scenario controls the exact outcome sequence.

mod helpers;

use helpers::*;
use pulsewatch::model::{AlertStatus, TargetStatus};
use pulsewatch::storage::{AlertQuery, ResultQuery, Store};

const F: bool = false;
const S: bool = true;

#[tokio::test]
async fn ignition_creates_one_record_and_freezes_fired_at() {
    let pipeline = spawn_pipeline(3);
    let id = add_scripted_target(&pipeline, vec![]).await;

    // Two failures: below threshold, nothing recorded.
    drive(&pipeline, id, &[F, F]).await;
    assert_eq!(firing_count(&pipeline.store, id).await, 0);

    // Third failure crosses the threshold.
    drive(&pipeline, id, &[F]).await;
    let open = pipeline.store.get_open_alert(id).await.unwrap().unwrap();
    assert_eq!(open.status, AlertStatus::Firing);
    assert_eq!(open.message, "probe failed #3");
    let original_fired_at = open.fired_at;

    // Further failures refresh the cause but never open a second record.
    drive(&pipeline, id, &[F, F]).await;
    let (alerts, total) = pipeline
        .store
        .list_alerts(&AlertQuery {
            target_id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(alerts[0].message, "probe failed #5");
    assert_eq!(alerts[0].fired_at, original_fired_at);

    pipeline.scheduler.stop().await;
}

#[tokio::test]
async fn recovery_resolves_the_open_record() {
    let pipeline = spawn_pipeline(3);
    let id = add_scripted_target(&pipeline, vec![]).await;

    drive(&pipeline, id, &[F, F, F, F, F]).await;
    assert_eq!(firing_count(&pipeline.store, id).await, 1);

    drive(&pipeline, id, &[S, S]).await;

    assert_eq!(firing_count(&pipeline.store, id).await, 0);
    let (alerts, total) = pipeline
        .store
        .list_alerts(&AlertQuery {
            target_id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 1, "recovery must not open a new record");
    assert_eq!(alerts[0].status, AlertStatus::Resolved);
    assert!(alerts[0].resolved_at.is_some());

    assert_eq!(pipeline.scheduler.fail_count(id), Some(0));

    pipeline.scheduler.stop().await;
}

#[tokio::test]
async fn below_threshold_flapping_stays_silent() {
    let pipeline = spawn_pipeline(3);
    let id = add_scripted_target(&pipeline, vec![]).await;

    drive(&pipeline, id, &[F, F, S, F, F, S]).await;

    let (_, total) = pipeline
        .store
        .list_alerts(&AlertQuery {
            target_id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 0, "no record below the threshold");

    pipeline.scheduler.stop().await;
}

#[tokio::test]
async fn every_outcome_is_persisted_and_health_tracks_the_level() {
    let pipeline = spawn_pipeline(3);
    let id = add_scripted_target(&pipeline, vec![]).await;

    drive(&pipeline, id, &[F]).await;
    let target = pipeline.store.get_target(id).await.unwrap();
    assert_eq!(target.status, TargetStatus::Unhealthy);
    assert_eq!(target.last_message, "probe failed #1");
    assert!(target.last_check_at.is_some());

    drive(&pipeline, id, &[S]).await;
    let target = pipeline.store.get_target(id).await.unwrap();
    assert_eq!(target.status, TargetStatus::Healthy);
    assert_eq!(target.last_message, "probe ok #2");

    let (results, total) = pipeline
        .store
        .list_results(&ResultQuery {
            target_id: id,
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 2);
    // Newest first.
    assert!(results[0].success);
    assert!(!results[1].success);

    pipeline.scheduler.stop().await;
}

#[tokio::test]
async fn repeated_incidents_never_overlap_open_records() {
    let pipeline = spawn_pipeline(3);
    let id = add_scripted_target(&pipeline, vec![]).await;

    for _ in 0..3 {
        drive(&pipeline, id, &[F, F, F]).await;
        assert_eq!(firing_count(&pipeline.store, id).await, 1);

        drive(&pipeline, id, &[S]).await;
        assert_eq!(firing_count(&pipeline.store, id).await, 0);
    }

    let (_, total) = pipeline
        .store
        .list_alerts(&AlertQuery {
            target_id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(total, 3, "one resolved record per incident");

    pipeline.scheduler.stop().await;
}

#[tokio::test]
async fn restart_carryover_resolves_on_first_success() {
    let store = std::sync::Arc::new(pulsewatch::storage::MemoryStore::new());

    // First process: drive a target into a firing alert, then "crash".
    let first = spawn_pipeline_on(store.clone(), 3, false);
    let id = add_scripted_target(&first, vec![]).await;
    drive(&first, id, &[F, F, F]).await;
    assert_eq!(firing_count(&store, id).await, 1);
    first.scheduler.stop().await;

    // Second process over the same store: reload the target.
    let second = spawn_pipeline_on(store.clone(), 3, false);
    let target = store.get_target(id).await.unwrap();
    second.scheduler.add(&target).await.unwrap();
    assert_eq!(
        second.scheduler.fail_count(id),
        Some(3),
        "open alert must seed the fail count at the threshold"
    );

    // First successful probe after the restart closes the record.
    drive(&second, id, &[S]).await;
    assert_eq!(firing_count(&store, id).await, 0);
    let (alerts, _) = store
        .list_alerts(&AlertQuery {
            target_id: Some(id),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(alerts[0].status, AlertStatus::Resolved);

    second.scheduler.stop().await;
}

#[tokio::test]
async fn silence_affects_only_its_own_target() {
    let pipeline = spawn_pipeline(3);
    let silenced = add_scripted_target(&pipeline, vec![]).await;
    let other = add_scripted_target(&pipeline, vec![]).await;

    pipeline
        .silences
        .silence(silenced, chrono::Duration::minutes(10));
    assert!(pipeline.silences.is_silenced(silenced));
    assert!(!pipeline.silences.is_silenced(other));

    // Both targets still fire records; silencing is a delivery filter only.
    drive(&pipeline, silenced, &[F, F, F]).await;
    drive(&pipeline, other, &[F, F, F]).await;
    assert_eq!(firing_count(&pipeline.store, silenced).await, 1);
    assert_eq!(firing_count(&pipeline.store, other).await, 1);

    pipeline.scheduler.stop().await;
}
