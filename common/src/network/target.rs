//! # Scan Target Model
//!
//! Classifies the raw strings a caller submits into typed assets.
//!
//! A raw target can be:
//! * A CIDR block (e.g., `192.168.1.0/24`, `2001:db8::/64`).
//! * A single IP address (e.g., `10.0.0.5`, `::1`).
//! * A domain name (e.g., `example.com`).
//!
//! Classification is strict: anything that is none of the above is rejected,
//! so a typo never silently turns into a DNS brute-force run.

use std::collections::BTreeMap;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use pnet::ipnetwork::IpNetwork;
use serde::Serialize;

use crate::error::InvalidTargetError;

const MAX_HOSTNAME_LEN: usize = 253;
const MAX_LABEL_LEN: usize = 63;

/// The classification bucket of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Domain,
    Ip,
    Cidr,
}

impl AssetKind {
    /// IP and CIDR targets both resolve to live hosts the same way.
    pub fn is_network(&self) -> bool {
        matches!(self, AssetKind::Ip | AssetKind::Cidr)
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AssetKind::Domain => "domain",
            AssetKind::Ip => "ip",
            AssetKind::Cidr => "cidr",
        };
        f.write_str(name)
    }
}

/// A single classified target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub kind: AssetKind,
    pub value: String,
}

impl FromStr for Asset {
    type Err = InvalidTargetError;

    /// Parses a raw target, most specific form first.
    ///
    /// Supported formats:
    /// * **CIDR**: "Network/Prefix", IPv4 or IPv6.
    /// * **IP**: a single IPv4/IPv6 address.
    /// * **Domain**: any syntactically valid hostname.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        classify_one(s, 0)
    }
}

/// Targets grouped by kind, each group in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetGroup {
    groups: BTreeMap<AssetKind, Vec<String>>,
}

impl AssetGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, asset: Asset) {
        self.groups.entry(asset.kind).or_default().push(asset.value);
    }

    pub fn get(&self, kind: AssetKind) -> &[String] {
        self.groups.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn domains(&self) -> &[String] {
        self.get(AssetKind::Domain)
    }

    /// Union of the IP and CIDR groups: IPs first, then CIDR blocks.
    pub fn network_targets(&self) -> Vec<String> {
        self.get(AssetKind::Ip)
            .iter()
            .chain(self.get(AssetKind::Cidr))
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AssetKind, &[String])> {
        self.groups.iter().map(|(kind, values)| (*kind, values.as_slice()))
    }

    /// Total number of classified targets.
    pub fn len(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<Asset> for AssetGroup {
    fn from_iter<I: IntoIterator<Item = Asset>>(iter: I) -> Self {
        let mut group = AssetGroup::new();
        for asset in iter {
            group.push(asset);
        }
        group
    }
}

/// Classifies every raw target, failing on the first malformed one.
pub fn classify<S: AsRef<str>>(raw: &[S]) -> Result<AssetGroup, InvalidTargetError> {
    raw.iter()
        .enumerate()
        .map(|(position, s)| classify_one(s.as_ref(), position))
        .collect()
}

fn classify_one(raw: &str, position: usize) -> Result<Asset, InvalidTargetError> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(InvalidTargetError::Empty { position });
    }

    if let Some(asset) = parse_cidr(value)? {
        return Ok(asset);
    }

    if let Some(asset) = parse_ip(value) {
        return Ok(asset);
    }

    if is_valid_hostname(value) {
        return Ok(Asset {
            kind: AssetKind::Domain,
            value: value.to_string(),
        });
    }

    Err(InvalidTargetError::Hostname {
        value: value.to_string(),
    })
}

/// A `/` can never appear in a hostname, so once present the value must be CIDR.
fn parse_cidr(s: &str) -> Result<Option<Asset>, InvalidTargetError> {
    if !s.contains('/') {
        return Ok(None);
    }

    s.parse::<IpNetwork>()
        .map(|_| {
            Some(Asset {
                kind: AssetKind::Cidr,
                value: s.to_string(),
            })
        })
        .map_err(|e| InvalidTargetError::Cidr {
            value: s.to_string(),
            reason: e.to_string(),
        })
}

fn parse_ip(s: &str) -> Option<Asset> {
    s.parse::<IpAddr>().ok().map(|_| Asset {
        kind: AssetKind::Ip,
        value: s.to_string(),
    })
}

fn is_valid_hostname(s: &str) -> bool {
    let name = s.strip_suffix('.').unwrap_or(s);
    if name.is_empty() || name.len() > MAX_HOSTNAME_LEN {
        return false;
    }

    // All-numeric dotted names are malformed addresses, not hostnames.
    if name.split('.').all(|label| label.chars().all(|c| c.is_ascii_digit())) {
        return false;
    }

    name.split('.').all(is_valid_label)
}

fn is_valid_label(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_LABEL_LEN
        && !label.starts_with('-')
        && !label.ends_with('-')
        && label
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
