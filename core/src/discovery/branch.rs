//! The two branch shapes a discovery run fans out into.
//!
//! Each branch is a short sequential chain of engine calls over data it owns;
//! the only thing it shares is the [`ResultCollection`] it appends to.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use scanbox_common::error::ScanEngineError;
use scanbox_common::network::host::{DiscoveryItem, PortMap, Subdomain};
use scanbox_common::progress::Progress;
use scanbox_common::scanning::ScanEngine;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PipelineOptions;
use super::collection::ResultCollection;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BranchKind {
    /// IP addresses and CIDR blocks.
    Network,
    /// Domain names.
    Domain,
}

impl fmt::Display for BranchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BranchKind::Network => f.write_str("network"),
            BranchKind::Domain => f.write_str("domain"),
        }
    }
}

/// Everything a branch task needs, owned so the task can be spawned.
#[derive(Clone)]
pub(crate) struct BranchContext {
    pub engine: Arc<dyn ScanEngine>,
    pub progress: Progress,
    pub cancel: CancellationToken,
    pub results: Arc<ResultCollection>,
    pub options: PipelineOptions,
}

/// Discover live hosts, scan them, name them.
pub(crate) async fn network_branch(
    ctx: BranchContext,
    targets: Vec<String>,
) -> Result<(), ScanEngineError> {
    let hosts: Vec<String> = ctx
        .engine
        .discover_hosts(&targets, &ctx.progress, &ctx.cancel)
        .await?;

    if hosts.is_empty() {
        info!("No live hosts among {} target(s)", targets.len());
        return Ok(());
    }

    let port_map: PortMap = ctx
        .engine
        .scan_ports(&hosts, &ctx.progress, &ctx.cancel)
        .await?;

    let names: Vec<Option<String>> = stream::iter(hosts.clone())
        .map(|host| reverse_name(ctx.engine.clone(), host, ctx.cancel.clone()))
        .buffered(ctx.options.resolve_concurrency.max(1))
        .collect()
        .await;

    let items: Vec<DiscoveryItem> = hosts
        .iter()
        .zip(names)
        .map(|(host, name)| DiscoveryItem::for_host(host, name, port_map.get(host)))
        .collect();

    info!("Network branch produced {} item(s)", items.len());
    ctx.results.extend(items).await;
    Ok(())
}

/// A failed lookup only costs the host its name.
async fn reverse_name(
    engine: Arc<dyn ScanEngine>,
    host: String,
    cancel: CancellationToken,
) -> Option<String> {
    match engine.reverse_resolve(&host, &cancel).await {
        Ok(names) => names
            .into_iter()
            .map(|name| name.trim_end_matches('.').to_string())
            .find(|name| !name.is_empty()),
        Err(e) => {
            debug!("Failed to find hostname for {host}: {e}");
            None
        }
    }
}

/// Enumerate subdomains, scan their union once, report per subdomain.
pub(crate) async fn domain_branch(
    ctx: BranchContext,
    domains: Vec<String>,
) -> Result<(), ScanEngineError> {
    let mut subdomains: Vec<Subdomain> = ctx
        .engine
        .enumerate_subdomains(&domains, &ctx.progress, &ctx.cancel)
        .await?;

    if ctx.options.resolve_apex {
        add_apex_records(&ctx, &domains, &mut subdomains).await;
    }

    let unique_ips: Vec<String> = subdomains
        .iter()
        .flat_map(|sub| sub.ips.iter().cloned())
        .collect::<BTreeSet<String>>()
        .into_iter()
        .collect();

    let port_map: PortMap = if unique_ips.is_empty() {
        PortMap::new()
    } else {
        ctx.engine
            .scan_ports(&unique_ips, &ctx.progress, &ctx.cancel)
            .await?
    };

    let items: Vec<DiscoveryItem> = subdomains
        .into_iter()
        .map(|sub| DiscoveryItem::for_subdomain(sub, &port_map))
        .collect();

    info!("Domain branch produced {} item(s)", items.len());
    ctx.results.extend(items).await;
    Ok(())
}

/// Adds each submitted domain that enumeration did not list itself.
async fn add_apex_records(
    ctx: &BranchContext,
    domains: &[String],
    subdomains: &mut Vec<Subdomain>,
) {
    for domain in domains {
        let apex = normalize(domain);
        if subdomains.iter().any(|sub| normalize(&sub.domain) == apex) {
            continue;
        }

        match ctx.engine.forward_resolve(domain, &ctx.cancel).await {
            Ok(ips) if !ips.is_empty() => {
                subdomains.push(Subdomain::new(apex).with_ips(ips));
            }
            Ok(_) => debug!("{domain} resolved to no addresses"),
            Err(e) => debug!("Failed to resolve {domain}: {e}"),
        }
    }
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}
