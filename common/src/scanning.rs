//! The boundary between the discovery pipeline and whatever actually touches
//! the network.
//!
//! High-level code depends on [`ScanEngine`] only. Every long-running call
//! takes a [`Progress`] handle, which the engine must notify periodically while
//! the call is pending, and a [`CancellationToken`], which aborts the call.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ResolutionError, ScanEngineError};
use crate::network::host::{PortMap, Subdomain};
use crate::progress::Progress;

#[async_trait]
pub trait ScanEngine: Send + Sync {
    /// Returns the addresses of every live host among `targets` (IPs or CIDR blocks).
    async fn discover_hosts(
        &self,
        targets: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ScanEngineError>;

    /// Scans hosts already known to be live. Hosts without open ports may be absent.
    async fn scan_ports(
        &self,
        hosts: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<PortMap, ScanEngineError>;

    /// Brute-forces subdomains of each domain.
    async fn enumerate_subdomains(
        &self,
        domains: &[String],
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> Result<Vec<Subdomain>, ScanEngineError>;

    /// Hostnames pointing back at `ip`.
    async fn reverse_resolve(
        &self,
        ip: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError>;

    /// Addresses `domain` resolves to.
    async fn forward_resolve(
        &self,
        domain: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError>;
}
