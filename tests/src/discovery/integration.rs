#![cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scanbox_common::network::host::DiscoveryItem;
use scanbox_common::progress::Progress;
use scanbox_core::{DiscoveryPipeline, PipelineOptions};
use tokio_util::sync::CancellationToken;

use crate::mock::{Call, MockEngine, Operation};

fn item(domain: &str, ips: &[&str], ports: &[u16]) -> DiscoveryItem {
    DiscoveryItem {
        domain: domain.to_string(),
        ips: ips.iter().map(|ip| ip.to_string()).collect(),
        ports: ports.to_vec(),
    }
}

async fn run(engine: Arc<MockEngine>, targets: &[&str]) -> Vec<DiscoveryItem> {
    run_with(engine, PipelineOptions::default(), targets).await
}

async fn run_with(
    engine: Arc<MockEngine>,
    options: PipelineOptions,
    targets: &[&str],
) -> Vec<DiscoveryItem> {
    DiscoveryPipeline::with_options(engine, options)
        .run(targets, Progress::noop(), CancellationToken::new())
        .await
        .expect("discovery should succeed")
}

fn sorted(mut items: Vec<DiscoveryItem>) -> Vec<DiscoveryItem> {
    items.sort_by(|a, b| (&a.domain, &a.ips).cmp(&(&b.domain, &b.ips)));
    items
}

#[tokio::test]
async fn single_ip_with_two_open_ports() {
    let engine = Arc::new(
        MockEngine::new()
            .with_open_ports("192.0.2.10", &[22, 443])
            .with_reverse("192.0.2.10", &["web.example.com."]),
    );

    let items = run(engine.clone(), &["192.0.2.10"]).await;

    assert_eq!(items, vec![item("web.example.com", &["192.0.2.10"], &[22, 443])]);
    assert_eq!(engine.count(Operation::ScanPorts), 1);
}

#[tokio::test]
async fn cidr_reports_only_live_hosts() {
    let engine = Arc::new(
        MockEngine::new()
            .with_live_hosts(&["10.0.0.1", "10.0.0.7"])
            .with_open_ports("10.0.0.7", &[80]),
    );

    let items = run(engine.clone(), &["10.0.0.0/29"]).await;

    assert_eq!(
        items,
        vec![item("", &["10.0.0.1"], &[]), item("", &["10.0.0.7"], &[80])]
    );
    assert_eq!(
        engine.calls()[..2],
        [
            Call::DiscoverHosts(vec!["10.0.0.0/29".to_string()]),
            Call::ScanPorts(vec!["10.0.0.1".to_string(), "10.0.0.7".to_string()]),
        ]
    );
}

#[tokio::test]
async fn ips_and_cidrs_share_one_discovery_call() {
    let engine = Arc::new(MockEngine::new().with_live_hosts(&[]));

    run(engine.clone(), &["10.1.0.0/24", "10.0.0.5"]).await;

    assert_eq!(
        engine.calls(),
        vec![Call::DiscoverHosts(vec![
            "10.0.0.5".to_string(),
            "10.1.0.0/24".to_string()
        ])]
    );
}

#[tokio::test]
async fn no_live_hosts_skips_port_scan() {
    let engine = Arc::new(MockEngine::new().with_live_hosts(&[]));

    let items = run(engine.clone(), &["10.0.0.0/24"]).await;

    assert!(items.is_empty());
    assert_eq!(engine.count(Operation::ScanPorts), 0);
}

#[tokio::test]
async fn reverse_dns_failure_leaves_domain_empty() {
    let engine = Arc::new(
        MockEngine::new()
            .with_live_hosts(&["10.0.0.1", "10.0.0.2"])
            .with_reverse("10.0.0.2", &["printer.lan"])
            .with_open_ports("10.0.0.1", &[8080]),
    );

    let items = run(engine, &["10.0.0.0/30"]).await;

    assert_eq!(
        items,
        vec![
            item("", &["10.0.0.1"], &[8080]),
            item("printer.lan", &["10.0.0.2"], &[]),
        ]
    );
}

#[tokio::test]
async fn subdomains_sharing_an_ip_are_scanned_once() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("www.example.com", &["192.0.2.1"])
            .with_subdomain("mail.example.com", &["192.0.2.1", "192.0.2.2"])
            .with_open_ports("192.0.2.1", &[80, 443])
            .with_open_ports("192.0.2.2", &[25, 443]),
    );

    let items = run(engine.clone(), &["example.com"]).await;

    assert_eq!(
        engine.calls(),
        vec![
            Call::EnumerateSubdomains(vec!["example.com".to_string()]),
            Call::ScanPorts(vec!["192.0.2.1".to_string(), "192.0.2.2".to_string()]),
        ]
    );
    assert_eq!(
        items,
        vec![
            item("www.example.com", &["192.0.2.1"], &[80, 443]),
            item("mail.example.com", &["192.0.2.1", "192.0.2.2"], &[80, 443, 25, 443]),
        ]
    );
}

#[tokio::test]
async fn several_domains_share_one_enumeration() {
    let engine = Arc::new(MockEngine::new());

    let items = run(engine.clone(), &["example.com", "example.org"]).await;

    assert!(items.is_empty());
    assert_eq!(
        engine.calls(),
        vec![Call::EnumerateSubdomains(vec![
            "example.com".to_string(),
            "example.org".to_string()
        ])]
    );
}

#[tokio::test]
async fn subdomains_without_addresses_are_reported_without_scan() {
    let engine = Arc::new(MockEngine::new().with_subdomain("dev.example.com", &[]));

    let items = run(engine.clone(), &["example.com"]).await;

    assert_eq!(items, vec![item("dev.example.com", &[], &[])]);
    assert_eq!(engine.count(Operation::ScanPorts), 0);
}

#[tokio::test]
async fn mixed_targets_merge_both_branches() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("www.example.com", &["192.0.2.80"])
            .with_open_ports("192.0.2.80", &[80])
            .with_open_ports("10.0.0.1", &[22]),
    );

    let items = run(engine.clone(), &["example.com", "10.0.0.1"]).await;

    assert_eq!(
        sorted(items),
        vec![
            item("", &["10.0.0.1"], &[22]),
            item("www.example.com", &["192.0.2.80"], &[80]),
        ]
    );
    assert_eq!(engine.count(Operation::ScanPorts), 2);
}

#[tokio::test(start_paused = true)]
async fn branches_run_concurrently() {
    let engine = Arc::new(
        MockEngine::new()
            .with_delay(Duration::from_secs(10))
            .with_subdomain("www.example.com", &["192.0.2.80"]),
    );

    let start = tokio::time::Instant::now();
    run(engine, &["example.com", "10.0.0.1"]).await;

    // Each branch makes two sequential calls; run one after the other they would take 40s.
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_secs(20), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(40), "{elapsed:?}");
}

#[tokio::test]
async fn progress_reaches_every_long_call() {
    let engine = Arc::new(
        MockEngine::new()
            .with_progress_ticks(3)
            .with_subdomain("www.example.com", &["192.0.2.80"]),
    );
    let ticks = Arc::new(AtomicUsize::new(0));
    let counter = ticks.clone();
    let progress = Progress::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    DiscoveryPipeline::new(engine)
        .run(&["example.com", "10.0.0.1"], progress, CancellationToken::new())
        .await
        .unwrap();

    // discover + scan in one branch, enumerate + scan in the other.
    assert_eq!(ticks.load(Ordering::SeqCst), 4 * 3);
}

#[tokio::test]
async fn apex_domain_is_added_when_enabled() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("www.example.com", &["192.0.2.80"])
            .with_forward("example.com", &["192.0.2.1"])
            .with_open_ports("192.0.2.1", &[443]),
    );
    let options = PipelineOptions {
        resolve_apex: true,
        ..PipelineOptions::default()
    };

    let items = run_with(engine.clone(), options, &["example.com"]).await;

    assert_eq!(
        items,
        vec![
            item("www.example.com", &["192.0.2.80"], &[]),
            item("example.com", &["192.0.2.1"], &[443]),
        ]
    );
    assert!(engine.calls().contains(&Call::ScanPorts(vec![
        "192.0.2.1".to_string(),
        "192.0.2.80".to_string()
    ])));
}

#[tokio::test]
async fn apex_domain_is_not_resolved_by_default() {
    let engine = Arc::new(MockEngine::new().with_forward("example.com", &["192.0.2.1"]));

    let items = run(engine.clone(), &["example.com"]).await;

    assert!(items.is_empty());
    assert!(!engine
        .calls()
        .iter()
        .any(|call| matches!(call, Call::ForwardResolve(_))));
}

#[tokio::test]
async fn apex_already_enumerated_is_not_duplicated() {
    let engine = Arc::new(
        MockEngine::new()
            .with_subdomain("example.com", &["192.0.2.1"])
            .with_forward("example.com", &["192.0.2.1"]),
    );
    let options = PipelineOptions {
        resolve_apex: true,
        ..PipelineOptions::default()
    };

    let items = run_with(engine.clone(), options, &["example.com"]).await;

    assert_eq!(items, vec![item("example.com", &["192.0.2.1"], &[])]);
    assert!(!engine.calls().contains(&Call::ForwardResolve("example.com".to_string())));
}
