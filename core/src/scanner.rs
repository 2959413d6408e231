//! The concrete **scan engine** behind the [`ScanEngine`] abstraction.
//!
//! Host discovery, port scanning and subdomain brute-forcing are delegated to
//! the `nmap` binary, run as a child process per call. DNS lookups go through
//! the [`resolver`] instead, since a single stub query is far cheaper than
//! starting a scanner.
//!
//! **Architectural Note:**
//! The pipeline depends only on [`ScanEngine`]. Nothing outside this module
//! knows that nmap exists, so the engine can be swapped without touching the
//! orchestration logic.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use scanbox_common::config::EngineConfig;
use scanbox_common::error::{ResolutionError, ScanEngineError};
use scanbox_common::network::host::{PortMap, Subdomain};
use scanbox_common::progress::Progress;
use scanbox_common::scanning::ScanEngine;
use scanbox_protocols::nmap;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub mod keepalive;
mod process;
pub mod resolver;

use resolver::DnsResolver;

const PING_SWEEP_ARGS: &[&str] = &["-sn", "-oX", "-"];
const PORT_SCAN_ARGS: &[&str] = &["-Pn", "--open", "-T4", "-oX", "-"];
const DNS_BRUTE_ARGS: &[&str] = &["-sn", "-n", "--script", "dns-brute", "-oX", "-"];
const IPV6_FLAG: &str = "-6";

/// [`ScanEngine`] backed by the nmap command-line scanner.
#[derive(Debug, Clone)]
pub struct NmapEngine {
    nmap_path: String,
    keepalive: Duration,
    resolver: DnsResolver,
}

impl NmapEngine {
    pub fn new(cfg: &EngineConfig) -> Self {
        Self {
            nmap_path: cfg.nmap_path.clone(),
            keepalive: cfg.keepalive_interval,
            resolver: DnsResolver::new(cfg.dns_server, cfg.dns_timeout),
        }
    }

    async fn run(
        &self,
        args: &[&str],
        targets: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<String, ScanEngineError> {
        process::run_scan(&self.nmap_path, args, targets, self.keepalive, progress, cancel).await
    }

    /// nmap only takes IPv6 targets with `-6`, and never mixed with IPv4 ones,
    /// so each address family gets its own run.
    async fn run_per_family(
        &self,
        args: &[&str],
        targets: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ScanEngineError> {
        let (v4, v6) = split_families(targets);
        let mut outputs = Vec::new();

        if !v4.is_empty() {
            outputs.push(self.run(args, &v4, progress, cancel).await?);
        }
        if !v6.is_empty() {
            let mut v6_args: Vec<&str> = vec![IPV6_FLAG];
            v6_args.extend_from_slice(args);
            outputs.push(self.run(&v6_args, &v6, progress, cancel).await?);
        }

        Ok(outputs)
    }
}

#[async_trait]
impl ScanEngine for NmapEngine {
    async fn discover_hosts(
        &self,
        targets: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ScanEngineError> {
        let outputs = self.run_per_family(PING_SWEEP_ARGS, targets, progress, cancel).await?;

        let mut hosts: Vec<String> = Vec::new();
        for out in outputs {
            hosts.extend(nmap::parse_live_hosts(&out).map_err(parse_error)?);
        }
        info!("Host discovery found {} live host(s)", hosts.len());
        Ok(hosts)
    }

    async fn scan_ports(
        &self,
        hosts: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PortMap, ScanEngineError> {
        let outputs = self.run_per_family(PORT_SCAN_ARGS, hosts, progress, cancel).await?;

        let mut port_map = PortMap::new();
        for out in outputs {
            port_map.extend(nmap::parse_open_ports(&out).map_err(parse_error)?);
        }
        info!("Port scan found open ports on {} host(s)", port_map.len());
        Ok(port_map)
    }

    async fn enumerate_subdomains(
        &self,
        domains: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<Subdomain>, ScanEngineError> {
        if domains.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.run(DNS_BRUTE_ARGS, domains, progress, cancel).await?;
        let subdomains = nmap::parse_dns_brute(&out).map_err(parse_error)?;
        info!("Subdomain enumeration found {} name(s)", subdomains.len());
        Ok(subdomains)
    }

    async fn reverse_resolve(
        &self,
        ip: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError> {
        let addr: IpAddr = ip
            .parse()
            .map_err(|_| ResolutionError::Malformed(format!("'{ip}' is not an IP address")))?;
        self.resolver.reverse(addr, cancel).await
    }

    async fn forward_resolve(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError> {
        let addrs = self.resolver.forward(domain, cancel).await?;
        Ok(addrs.into_iter().map(|addr| addr.to_string()).collect())
    }
}

fn parse_error(e: anyhow::Error) -> ScanEngineError {
    ScanEngineError::Parse(format!("{e:#}"))
}

/// Splits targets into IPv4 and IPv6 ones. Anything containing `:` is IPv6.
fn split_families(targets: &[String]) -> (Vec<String>, Vec<String>) {
    targets.iter().cloned().partition(|t| !t.contains(':'))
}
