// Copyright (c) 2025 - Cowboy AI, Inc.
//! Connectivity manager behaviour over the scripted transport

mod fixtures;

use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

use fixtures::{credentials, fast_config, management_ip};
use slice_orchestrator::connectivity::ScriptedTransport;
use slice_orchestrator::{CancelToken, ConnectivityManager, ConnectError, SliceError};

fn manager(transport: &Arc<ScriptedTransport>) -> ConnectivityManager {
    ConnectivityManager::new(transport.clone(), credentials(), fast_config().connect)
}

#[tokio::test]
async fn test_policy_max_failures_leave_node_without_session() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_first(management_ip(7), 3).await;
    let manager = manager(&transport);

    let outcomes = manager
        .connect_all(vec![("n7".to_string(), management_ip(7))], &CancelToken::new())
        .await?;

    assert_eq!(outcomes.len(), 1);
    let cause = assert_err!(outcomes[0].result.clone());
    assert!(cause.contains("3 attempts"), "{cause}");
    assert!(manager.session("n7").await.is_none());
    assert_eq!(transport.attempts(management_ip(7)).await, 3);
    Ok(())
}

#[tokio::test]
async fn test_nodes_connect_concurrently() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let nodes: Vec<_> = (1..=6)
        .map(|i| (format!("n{i}"), management_ip(i)))
        .collect();
    for (_, ip) in &nodes {
        transport.delay_opens(*ip, Duration::from_millis(100)).await;
    }
    let manager = manager(&transport);

    let started = Instant::now();
    let outcomes = manager.connect_all(nodes, &CancelToken::new()).await?;

    assert!(outcomes.iter().all(|o| o.result.is_ok()));
    assert_eq!(manager.open_sessions().await, 6);
    assert!(started.elapsed() < Duration::from_millis(500));
    Ok(())
}

#[tokio::test]
async fn test_slow_attempts_time_out_per_attempt() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .delay_opens(management_ip(9), Duration::from_secs(5))
        .await;
    let mut policy = fast_config().connect;
    policy.max_attempts = 2;
    policy.attempt_timeout_ms = 20;
    let manager = ConnectivityManager::new(transport.clone(), credentials(), policy);

    let outcomes = manager
        .connect_all(vec![("n9".to_string(), management_ip(9))], &CancelToken::new())
        .await?;

    let cause = assert_err!(outcomes[0].result.clone());
    assert!(cause.contains("timed out"), "{cause}");
    assert_eq!(transport.attempts(management_ip(9)).await, 2);
    Ok(())
}

#[tokio::test]
async fn test_cancel_closes_sessions_already_open() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    transport
        .delay_opens(management_ip(2), Duration::from_secs(5))
        .await;
    let manager = manager(&transport);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = manager
        .connect_all(
            vec![
                ("n1".to_string(), management_ip(1)),
                ("n2".to_string(), management_ip(2)),
            ],
            &cancel,
        )
        .await;

    assert!(matches!(result, Err(SliceError::Cancelled { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(manager.open_sessions().await, 0);
    assert_eq!(transport.closed().await, vec![management_ip(1)]);
    Ok(())
}

#[tokio::test]
async fn test_scoped_session_is_closed_after_success() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(&transport);

    let output = manager
        .with_session("n1", management_ip(1), &CancelToken::new(), |session| async move {
            Ok::<_, SliceError>(session.execute("hostname").await?)
        })
        .await?;

    assert_eq!(output.stdout, "hostname");
    assert_eq!(transport.closed().await, vec![management_ip(1)]);
    assert_eq!(manager.open_sessions().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_scoped_session_reports_connect_failure() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.fail_first(management_ip(3), 10).await;
    let manager = manager(&transport);

    let result: Result<(), SliceError> = manager
        .with_session("n3", management_ip(3), &CancelToken::new(), |_| async { Ok(()) })
        .await;

    assert!(matches!(result, Err(SliceError::Connect(_))));
    assert!(transport.closed().await.is_empty());
}

#[tokio::test]
async fn test_abandoned_scoped_operation_still_closes_session() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(&transport);
    let cancel = CancelToken::new();

    let abandoned = tokio::time::timeout(
        Duration::from_millis(50),
        manager.with_session("n1", management_ip(1), &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, SliceError>(())
        }),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(transport.closed().await, vec![management_ip(1)]);
    assert_eq!(transport.attempts(management_ip(1)).await, 1);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_scoped_operation_closes_session() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(&transport);
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let result = manager
        .with_session("n1", management_ip(1), &cancel, |_| async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, SliceError>(())
        })
        .await;

    assert!(matches!(result, Err(SliceError::Cancelled { snapshot: None })));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.closed().await, vec![management_ip(1)]);
    Ok(())
}

#[tokio::test]
async fn test_scoped_session_is_not_opened_once_cancelled() {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(&transport);
    let cancel = CancelToken::new();
    cancel.cancel();

    let result: Result<(), SliceError> = manager
        .with_session("n1", management_ip(1), &cancel, |_| async { Ok(()) })
        .await;

    assert!(matches!(result, Err(SliceError::Cancelled { .. })));
    assert_eq!(transport.attempts(management_ip(1)).await, 0);
    assert!(transport.closed().await.is_empty());
}

#[tokio::test]
async fn test_release_and_close_all() -> Result<()> {
    let transport = Arc::new(ScriptedTransport::new());
    let manager = manager(&transport);
    let cancel = CancelToken::new();
    manager
        .connect_all(
            vec![
                ("n1".to_string(), management_ip(1)),
                ("n2".to_string(), management_ip(2)),
                ("n3".to_string(), management_ip(3)),
            ],
            &cancel,
        )
        .await?;

    assert!(manager.release("n2").await);
    assert!(!manager.release("n2").await);
    assert_ok!(manager.probe("n1").await);
    assert_err!(manager.probe("n2").await);

    manager.close_all().await;
    let mut closed = transport.closed().await;
    closed.sort();
    assert_eq!(closed, vec![management_ip(1), management_ip(2), management_ip(3)]);
    assert_eq!(manager.open_sessions().await, 0);
    Ok(())
}

#[test]
fn test_connect_errors_surface_as_connect() {
    let err: SliceError = ConnectError::Refused(management_ip(1)).into();
    assert!(matches!(err, SliceError::Connect(_)));
    assert!(err.is_retryable());
}
