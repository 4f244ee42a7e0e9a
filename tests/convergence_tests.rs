//! Application convergence against scripted remote statuses.

mod common;

use cm_stack_deployer::argocd::convergence::Phase;
use cm_stack_deployer::argocd::{ConvergenceError, ConvergenceWaiter};
use common::FakeCluster;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const APP: &str = "cm-stack-base";

fn waiter(cluster: &Arc<FakeCluster>) -> ConvergenceWaiter {
    ConvergenceWaiter::new(cluster.clone(), CancellationToken::new())
}

#[tokio::test]
async fn test_sync_then_health_poll_counts() {
    const OUT_OF_SYNC_POLLS: usize = 3;
    let cluster = Arc::new(FakeCluster::new());
    let mut statuses =
        vec![json!({"sync": {"status": "OutOfSync"}, "health": {"status": "Healthy"}}); OUT_OF_SYNC_POLLS];
    statuses.push(json!({"sync": {"status": "Synced"}, "health": {"status": "Healthy"}}));
    cluster.script_statuses(APP, statuses);

    waiter(&cluster)
        .wait_ready(APP, Duration::from_secs(60), Duration::ZERO)
        .await
        .unwrap();

    // N+1 sync polls, then a single health poll
    assert_eq!(
        cluster.get_count("Application", APP),
        OUT_OF_SYNC_POLLS + 1 + 1
    );
}

#[tokio::test]
async fn test_health_is_only_awaited_after_sync() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.script_statuses(
        APP,
        vec![
            json!({"sync": {"status": "Synced"}, "health": {"status": "Progressing"}}),
            json!({"sync": {"status": "Synced"}, "health": {"status": "Progressing"}}),
            json!({"sync": {"status": "Synced"}, "health": {"status": "Healthy"}}),
        ],
    );

    waiter(&cluster)
        .wait_ready(APP, Duration::from_secs(60), Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(cluster.get_count("Application", APP), 3);
}

#[tokio::test]
async fn test_sync_timeout_carries_resource_breakdown() {
    let cluster = Arc::new(FakeCluster::new());
    cluster.script_statuses(
        APP,
        vec![json!({
            "sync": {"status": "OutOfSync"},
            "health": {"status": "Missing"},
            "resources": [
                {"kind": "Deployment", "name": "api", "status": "OutOfSync",
                 "health": {"status": "Missing"}},
                {"kind": "Service", "name": "api", "status": "Synced",
                 "health": {"status": "Healthy"}}
            ]
        })],
    );

    // One second total leaves a zero budget for sync
    let err = waiter(&cluster)
        .wait_ready(APP, Duration::from_secs(1), Duration::ZERO)
        .await
        .unwrap_err();

    let (phase, report) = match err {
        ConvergenceError::Timeout { phase, report, .. } => (phase, report),
        other => panic!("expected timeout, got {other:?}"),
    };
    assert_eq!(phase, Phase::Sync);
    assert_eq!(report.sync, "OutOfSync");
    assert_eq!(report.health, "Missing");
    assert_eq!(report.resources.len(), 2);
    assert_eq!(report.resources[0].kind, "Deployment");
    assert_eq!(report.resources[0].health, "Missing");
    assert_eq!(report.resources[1].sync, "Synced");
}

#[tokio::test]
async fn test_absent_application_times_out_with_unknown_status() {
    let cluster = Arc::new(FakeCluster::new());
    let err = waiter(&cluster)
        .wait_for_sync(APP, Duration::from_millis(20), Duration::ZERO)
        .await
        .unwrap_err();
    let report = match err {
        ConvergenceError::Timeout { report, .. } => report,
        other => panic!("expected timeout, got {other:?}"),
    };
    assert_eq!(report.sync, "Unknown");
    assert!(report.resources.is_empty());
}

#[tokio::test]
async fn test_cancelled_wait() {
    let cluster = Arc::new(FakeCluster::new());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let waiter = ConvergenceWaiter::new(cluster.clone(), cancel);

    let err = waiter
        .wait_ready(APP, Duration::from_secs(60), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, ConvergenceError::Cancelled));
    assert_eq!(cluster.get_count("Application", APP), 0);
}
