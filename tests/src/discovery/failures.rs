#![cfg(test)]
use std::sync::Arc;
use std::time::Duration;

use scanbox_common::error::{InvalidTargetError, ScanEngineError};
use scanbox_common::network::host::DiscoveryItem;
use scanbox_common::progress::Progress;
use scanbox_core::discovery::{BranchFailure, BranchKind};
use scanbox_core::{DiscoveryPipeline, PipelineError};
use tokio_util::sync::CancellationToken;

use crate::mock::{MockEngine, Operation};

async fn run(
    engine: Arc<MockEngine>,
    targets: &[&str],
) -> Result<Vec<DiscoveryItem>, PipelineError> {
    DiscoveryPipeline::new(engine)
        .run(targets, Progress::noop(), CancellationToken::new())
        .await
}

fn failed_branches(err: &PipelineError) -> Vec<BranchKind> {
    match err {
        PipelineError::Branches { failures, .. } => {
            let mut kinds: Vec<BranchKind> = failures.iter().map(BranchFailure::branch).collect();
            kinds.sort_by_key(|kind| kind.to_string());
            kinds
        }
        other => panic!("expected branch failures, got {other}"),
    }
}

#[tokio::test]
async fn invalid_target_makes_no_engine_calls() {
    let engine = Arc::new(MockEngine::new());

    let err = run(engine.clone(), &["10.0.0.1", "example.com", "10.0.0.0/40"])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::InvalidTarget(InvalidTargetError::Cidr { .. })
    ));
    assert!(err.partial().is_empty());
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn empty_target_is_rejected_before_scanning() {
    let engine = Arc::new(MockEngine::new());

    let err = run(engine.clone(), &["10.0.0.1", "  "]).await.unwrap_err();

    assert!(matches!(
        err,
        PipelineError::InvalidTarget(InvalidTargetError::Empty { position: 1 })
    ));
    assert!(engine.calls().is_empty());
}

#[tokio::test]
async fn domain_failure_keeps_network_results() {
    let engine = Arc::new(
        MockEngine::new()
            .with_open_ports("10.0.0.1", &[22])
            .failing(Operation::EnumerateSubdomains),
    );

    let err = run(engine, &["10.0.0.1", "example.com"]).await.unwrap_err();

    assert_eq!(failed_branches(&err), vec![BranchKind::Domain]);
    let partial = err.into_partial();
    assert_eq!(partial.len(), 1);
    assert_eq!(partial[0].ips, vec!["10.0.0.1"]);
    assert_eq!(partial[0].ports, vec![22]);
}

#[tokio::test]
async fn network_failure_keeps_domain_results() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("dev.example.com", &[])
            .failing(Operation::DiscoverHosts),
    );

    let err = run(engine, &["10.0.0.0/24", "example.com"]).await.unwrap_err();

    assert_eq!(failed_branches(&err), vec![BranchKind::Network]);
    assert_eq!(err.partial().len(), 1);
    assert_eq!(err.partial()[0].domain, "dev.example.com");
}

#[tokio::test]
async fn every_failed_branch_is_reported() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("www.example.com", &["192.0.2.80"])
            .failing(Operation::ScanPorts),
    );

    let err = run(engine, &["10.0.0.1", "example.com"]).await.unwrap_err();

    assert_eq!(failed_branches(&err), vec![BranchKind::Domain, BranchKind::Network]);
    assert!(err.partial().is_empty());

    let message = err.to_string();
    assert!(message.starts_with("2 discovery branch(es) failed"), "{message}");
    assert!(message.contains("network branch failed"), "{message}");
    assert!(message.contains("domain branch failed"), "{message}");
}

#[tokio::test]
async fn panicking_branch_keeps_other_results() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("dev.example.com", &[])
            .panicking(Operation::ScanPorts),
    );

    let err = run(engine, &["10.0.0.1", "example.com"]).await.unwrap_err();

    match &err {
        PipelineError::Branches { failures, partial } => {
            assert_eq!(failures.len(), 1);
            match &failures[0] {
                BranchFailure::Panicked { branch, message } => {
                    assert_eq!(*branch, BranchKind::Network);
                    assert!(message.contains("panic"), "{message}");
                }
                other => panic!("expected a panicked branch, got {other}"),
            }
            assert_eq!(partial.len(), 1);
            assert_eq!(partial[0].domain, "dev.example.com");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failure_source_is_preserved() {
    let engine = Arc::new(MockEngine::new().failing(Operation::DiscoverHosts));

    let err = run(engine, &["10.0.0.1"]).await.unwrap_err();

    match err {
        PipelineError::Branches { failures, .. } => {
            assert!(matches!(
                &failures[0],
                BranchFailure::Scan {
                    branch: BranchKind::Network,
                    source: ScanEngineError::Parse(_),
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancelled_run_reports_cancelled_branches() {
    let engine = Arc::new(MockEngine::new());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = DiscoveryPipeline::new(engine)
        .run(&["10.0.0.1", "example.com"], Progress::noop(), cancel)
        .await
        .unwrap_err();

    match err {
        PipelineError::Branches { failures, partial } => {
            assert_eq!(failures.len(), 2);
            assert!(failures.iter().all(|f| matches!(
                f,
                BranchFailure::Scan {
                    source: ScanEngineError::Cancelled,
                    ..
                }
            )));
            assert!(partial.is_empty());
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_interrupts_running_scans() {
    let engine = Arc::new(MockEngine::new().with_delay(Duration::from_secs(3600)));
    let cancel = CancellationToken::new();

    let canceller = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        })
    };

    let start = tokio::time::Instant::now();
    let err = DiscoveryPipeline::new(engine)
        .run(&["10.0.0.1"], Progress::noop(), cancel)
        .await
        .unwrap_err();
    canceller.await.unwrap();

    assert_eq!(failed_branches(&err), vec![BranchKind::Network]);
    assert!(start.elapsed() < Duration::from_secs(3600));
}
