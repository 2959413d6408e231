use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use scanbox_common::error::{ResolutionError, ScanEngineError};
use scanbox_common::network::host::{PortMap, Subdomain};
use scanbox_common::progress::Progress;
use scanbox_common::scanning::ScanEngine;
use tokio_util::sync::CancellationToken;

/// One engine invocation, with the arguments it received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    DiscoverHosts(Vec<String>),
    ScanPorts(Vec<String>),
    EnumerateSubdomains(Vec<String>),
    ReverseResolve(String),
    ForwardResolve(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    DiscoverHosts,
    ScanPorts,
    EnumerateSubdomains,
}

/// A [`ScanEngine`] that answers from a script and records every call.
///
/// Unless told otherwise, every target counts as a live host, no port is
/// open, no subdomain exists and no lookup succeeds.
#[derive(Default)]
pub struct MockEngine {
    live_hosts: Option<Vec<String>>,
    open_ports: PortMap,
    subdomains: Vec<Subdomain>,
    reverse: HashMap<String, Vec<String>>,
    forward: HashMap<String, Vec<String>>,
    failing: HashSet<Operation>,
    panicking: HashSet<Operation>,
    delay: Duration,
    ticks: usize,
    calls: Mutex<Vec<Call>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_live_hosts(mut self, hosts: &[&str]) -> Self {
        self.live_hosts = Some(hosts.iter().map(|h| h.to_string()).collect());
        self
    }

    pub fn with_open_ports(mut self, host: &str, ports: &[u16]) -> Self {
        self.open_ports.insert(host.to_string(), ports.to_vec());
        self
    }

    pub fn with_subdomain(mut self, name: &str, ips: &[&str]) -> Self {
        self.subdomains
            .push(Subdomain::new(name).with_ips(ips.iter().map(|ip| ip.to_string())));
        self
    }

    pub fn with_reverse(mut self, ip: &str, names: &[&str]) -> Self {
        self.reverse
            .insert(ip.to_string(), names.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn with_forward(mut self, name: &str, ips: &[&str]) -> Self {
        self.forward
            .insert(name.to_string(), ips.iter().map(|ip| ip.to_string()).collect());
        self
    }

    pub fn failing(mut self, operation: Operation) -> Self {
        self.failing.insert(operation);
        self
    }

    /// `operation` panics instead of returning, like an engine bug would.
    pub fn panicking(mut self, operation: Operation) -> Self {
        self.panicking.insert(operation);
        self
    }

    /// Every long-running call takes `delay` and honours cancellation meanwhile.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every long-running call notifies progress `ticks` times.
    pub fn with_progress_ticks(mut self, ticks: usize) -> Self {
        self.ticks = ticks;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.calls()
            .iter()
            .filter(|call| {
                matches!(
                    (call, operation),
                    (Call::DiscoverHosts(_), Operation::DiscoverHosts)
                        | (Call::ScanPorts(_), Operation::ScanPorts)
                        | (Call::EnumerateSubdomains(_), Operation::EnumerateSubdomains)
                )
            })
            .count()
    }

    fn record(&self, call: Call) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    async fn long_call(
        &self,
        operation: Operation,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<(), ScanEngineError> {
        for _ in 0..self.ticks {
            progress.notify();
        }

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ScanEngineError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(ScanEngineError::Cancelled);
        }

        if self.panicking.contains(&operation) {
            panic!("scripted {operation:?} panic");
        }
        if self.failing.contains(&operation) {
            return Err(ScanEngineError::Parse(format!("scripted {operation:?} failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl ScanEngine for MockEngine {
    async fn discover_hosts(
        &self,
        targets: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ScanEngineError> {
        self.record(Call::DiscoverHosts(targets.to_vec()));
        self.long_call(Operation::DiscoverHosts, progress, cancel).await?;
        Ok(self.live_hosts.clone().unwrap_or_else(|| targets.to_vec()))
    }

    async fn scan_ports(
        &self,
        hosts: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PortMap, ScanEngineError> {
        self.record(Call::ScanPorts(hosts.to_vec()));
        self.long_call(Operation::ScanPorts, progress, cancel).await?;
        Ok(hosts
            .iter()
            .filter_map(|host| self.open_ports.get(host).map(|ports| (host.clone(), ports.clone())))
            .collect())
    }

    async fn enumerate_subdomains(
        &self,
        domains: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<Subdomain>, ScanEngineError> {
        self.record(Call::EnumerateSubdomains(domains.to_vec()));
        self.long_call(Operation::EnumerateSubdomains, progress, cancel).await?;
        Ok(self.subdomains.clone())
    }

    async fn reverse_resolve(
        &self,
        ip: &str,
        _: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError> {
        self.record(Call::ReverseResolve(ip.to_string()));
        self.reverse
            .get(ip)
            .cloned()
            .ok_or_else(|| ResolutionError::NoRecords(ip.to_string()))
    }

    async fn forward_resolve(
        &self,
        name: &str,
        _: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError> {
        self.record(Call::ForwardResolve(name.to_string()));
        self.forward
            .get(name)
            .cloned()
            .ok_or_else(|| ResolutionError::NoRecords(name.to_string()))
    }
}
