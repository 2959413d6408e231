//! # Discovery Result Model
//!
//! The records exchanged between the scan engine and the pipeline, and the
//! [`DiscoveryItem`] the pipeline finally reports.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// Open ports per host address.
pub type PortMap = HashMap<String, Vec<u16>>;

/// A subdomain found by enumeration together with the addresses it resolved to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subdomain {
    pub domain: String,
    pub ips: BTreeSet<String>,
}

impl Subdomain {
    pub fn new(domain: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            ips: BTreeSet::new(),
        }
    }

    pub fn with_ips<I, S>(mut self, ips: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ips.extend(ips.into_iter().map(Into::into));
        self
    }
}

/// One unit of the final report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryItem {
    pub domain: String,
    pub ips: Vec<String>,
    pub ports: Vec<u16>,
}

impl DiscoveryItem {
    /// An item for a single live host, with no ports recorded as `[]`.
    pub fn for_host(host: &str, domain: Option<String>, ports: Option<&Vec<u16>>) -> Self {
        Self {
            domain: domain.unwrap_or_default(),
            ips: vec![host.to_string()],
            ports: ports.cloned().unwrap_or_default(),
        }
    }

    /// An item for a subdomain, concatenating the ports of each of its addresses.
    ///
    /// The same port found on two addresses is reported twice: each is a
    /// finding for a different address.
    pub fn for_subdomain(subdomain: Subdomain, port_map: &PortMap) -> Self {
        let ports: Vec<u16> = subdomain
            .ips
            .iter()
            .filter_map(|ip| port_map.get(ip))
            .flatten()
            .copied()
            .collect();

        Self {
            domain: subdomain.domain,
            ips: subdomain.ips.into_iter().collect(),
            ports,
        }
    }
}
