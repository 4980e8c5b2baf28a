//! Contract Test: Scheduling and Shutdown Determinism
//!
//! Constraints verified:
//! - Every record is reconciled on the first tick
//! - Records are reconciled again once their interval elapses, not before
//! - Shutdown stops new cycles and lets in-flight applies finish
//! - A cycle still detecting when shutdown lands never reaches the provider
//! - Intervals past the supported range are rejected up front
//! - The loop returns after shutdown

mod common;

use common::*;
use dnsync_core::config::MAX_INTERVAL_SECS;
use dnsync_core::{CycleOutcome, Reconciler, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test(start_paused = true)]
async fn records_run_on_first_tick_and_then_per_interval() {
    let record = home_record();
    let detector = ScriptedDetector::new(v4("203.0.113.5"));
    let provider = Arc::new(MockProvider::new());

    let (reconciler, _rx) = Reconciler::new(
        vec![provider_task(record.clone(), detector.clone(), provider.clone())],
        &engine_config(),
        Arc::new(SystemClock),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        reconciler
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(detector.call_count(), 1, "First tick reconciles immediately");
    assert_eq!(provider.apply_count(), 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(detector.call_count(), 1, "Nothing is due before the interval");

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(detector.call_count(), 2);
    assert_eq!(provider.apply_count(), 1, "Converged record is not re-applied");

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn per_record_intervals_are_honoured() {
    let fast = home_record();
    let slow = office_record();
    let fast_detector = ScriptedDetector::new(v4("203.0.113.5"));
    let slow_detector = ScriptedDetector::new(v4("203.0.113.5"));
    let provider = Arc::new(MockProvider::new());

    let (reconciler, _rx) = Reconciler::new(
        vec![
            provider_task(fast, fast_detector.clone(), provider.clone())
                .with_interval(Duration::from_secs(60)),
            provider_task(slow, slow_detector.clone(), provider.clone()),
        ],
        &engine_config(),
        Arc::new(SystemClock),
    )
    .unwrap();
    assert_eq!(reconciler.tick(), Duration::from_secs(60));

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        reconciler
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::time::sleep(Duration::from_secs(610)).await;
    assert_eq!(fast_detector.call_count(), 11);
    assert_eq!(slow_detector.call_count(), 2);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

#[tokio::test(start_paused = true)]
async fn shutdown_waits_for_in_flight_apply() {
    let record = home_record();
    let detector = ScriptedDetector::new(v4("203.0.113.5"));
    let provider = Arc::new(MockProvider::new().with_delay(Duration::from_secs(5)));

    let (reconciler, mut rx) = Reconciler::new(
        vec![provider_task(record.clone(), detector.clone(), provider.clone())],
        &engine_config(),
        Arc::new(SystemClock),
    )
    .unwrap();
    let observer = reconciler.clone();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        reconciler
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    // Apply is now sleeping inside the provider
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(provider.apply_count(), 1);
    assert_eq!(provider.published(&record), None);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    // The loop only returned after the apply completed
    assert_eq!(provider.published(&record), Some(v4("203.0.113.5")));
    let state = observer.state(&record).await.unwrap();
    assert_eq!(state.last_known_ip, Some(v4("203.0.113.5")));
    assert_eq!(drain(&mut rx).len(), 1);

    // No cycles start after shutdown
    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(detector.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_during_detection_cancels_before_apply() {
    let record = home_record();
    let detector = ScriptedDetector::slow(v4("203.0.113.5"), Duration::from_secs(5));
    let provider = Arc::new(MockProvider::new());

    let (reconciler, mut rx) = Reconciler::new(
        vec![provider_task(record.clone(), detector.clone(), provider.clone())],
        &engine_config(),
        Arc::new(SystemClock),
    )
    .unwrap();
    let observer = reconciler.clone();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        reconciler
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    // Detection is now sleeping inside the detector
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(detector.call_count(), 1);

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(provider.apply_count(), 0, "Stopping cycles never reach apply");
    assert_eq!(provider.published(&record), None);
    assert!(drain(&mut rx).is_empty());

    let state = observer.state(&record).await.unwrap();
    assert_eq!(state.last_known_ip, None);
    assert_eq!(state.consecutive_failures(), 0, "Cancellation is not a failure");

    // Cycles requested after shutdown do not start at all
    assert_eq!(observer.reconcile(&record).await, Some(CycleOutcome::Cancelled));
    assert_eq!(detector.call_count(), 1);
}

#[tokio::test]
async fn interval_beyond_maximum_is_rejected() {
    let provider = Arc::new(MockProvider::new());
    let result = Reconciler::new(
        vec![
            provider_task(home_record(), ScriptedDetector::new(v4("203.0.113.5")), provider)
                .with_interval(Duration::from_secs(u64::MAX)),
        ],
        &engine_config(),
        Arc::new(SystemClock),
    );
    let err = result.err().expect("an unbounded interval must be rejected");
    assert!(err.is_config());
}

#[tokio::test(start_paused = true)]
async fn longest_interval_runs_once_and_shuts_down() {
    let record = home_record();
    let detector = ScriptedDetector::new(v4("203.0.113.5"));
    let provider = Arc::new(MockProvider::new());

    let (reconciler, _rx) = Reconciler::new(
        vec![
            provider_task(record.clone(), detector.clone(), provider.clone())
                .with_interval(Duration::from_secs(MAX_INTERVAL_SECS)),
        ],
        &engine_config(),
        Arc::new(SystemClock),
    )
    .unwrap();

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        reconciler
            .run_with_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    tokio::time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(detector.call_count(), 1);
    assert_eq!(provider.published(&record), Some(v4("203.0.113.5")));

    shutdown_tx.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
