//! Parser for nmap's XML report (`-oX -`).
//!
//! All three scans the engine runs (ping sweep, port scan, `dns-brute`) write
//! the same document shape, so one event walk feeds every public function.

use std::collections::HashMap;

use anyhow::Context;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use scanbox_common::network::host::{PortMap, Subdomain};
use tracing::debug;

const DNS_BRUTE_ID: &str = "dns-brute";
const DNS_BRUTE_HEADER: &str = "DNS Brute-force hostnames:";

/// What one `<host>` element says about a single machine.
#[derive(Debug, Default)]
struct HostRecord {
    addr: Option<String>,
    up: bool,
    open_ports: Vec<u16>,
}

#[derive(Debug, Default)]
struct ScanReport {
    hosts: Vec<HostRecord>,
    /// `output` attribute of every `dns-brute` script element, host or prerule.
    dns_brute: Vec<String>,
}

/// Addresses of every host reported up, in output order, without duplicates.
pub fn parse_live_hosts(xml: &str) -> anyhow::Result<Vec<String>> {
    let report = parse_report(xml)?;
    let mut hosts: Vec<String> = Vec::new();

    for host in report.hosts {
        let Some(addr) = host.addr else {
            continue;
        };
        if host.up && !hosts.contains(&addr) {
            hosts.push(addr);
        }
    }

    Ok(hosts)
}

/// Open TCP ports per host. Hosts without any open port are left out.
pub fn parse_open_ports(xml: &str) -> anyhow::Result<PortMap> {
    let mut port_map = PortMap::new();

    for host in parse_report(xml)?.hosts {
        let Some(addr) = host.addr else {
            continue;
        };
        if !host.open_ports.is_empty() {
            port_map.entry(addr).or_default().extend(host.open_ports);
        }
    }

    Ok(port_map)
}

/// Subdomains listed by every `dns-brute` result in the report.
///
/// Records for the same name are merged; the result keeps first-seen order.
pub fn parse_dns_brute(xml: &str) -> anyhow::Result<Vec<Subdomain>> {
    let mut subdomains: Vec<Subdomain> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for output in parse_report(xml)?.dns_brute {
        for (name, addr) in output.lines().filter_map(parse_brute_line) {
            let slot = *index.entry(name.to_string()).or_insert_with(|| {
                subdomains.push(Subdomain::new(name));
                subdomains.len() - 1
            });
            if !addr.is_empty() {
                subdomains[slot].ips.insert(addr.to_string());
            }
        }
    }

    Ok(subdomains)
}

/// `www.example.com - 93.184.216.34` → `("www.example.com", "93.184.216.34")`
fn parse_brute_line(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(DNS_BRUTE_HEADER) || line.starts_with('*') {
        return None;
    }

    match line.split_once(" - ") {
        Some((name, addr)) => Some((name.trim(), addr.trim())),
        None => {
            debug!("Skipping unrecognised dns-brute line: {line}");
            None
        }
    }
}

fn parse_report(xml: &str) -> anyhow::Result<ScanReport> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut report = ScanReport::default();
    let mut host: Option<HostRecord> = None;
    let mut port: Option<u16> = None;

    loop {
        let event = reader
            .read_event()
            .with_context(|| format!("malformed nmap XML near byte {}", reader.buffer_position()))?;
        let empty = matches!(event, Event::Empty(_));

        match event {
            Event::Start(e) | Event::Empty(e) => match e.name().as_ref() {
                b"host" => {
                    let record = HostRecord::default();
                    if empty {
                        report.hosts.push(record);
                    } else {
                        host = Some(record);
                    }
                }
                b"status" => {
                    if let Some(host) = host.as_mut() {
                        host.up = attribute(&e, b"state")?.as_deref() == Some("up");
                    }
                }
                // Hardware addresses follow the IP one and are not scan targets.
                b"address" => {
                    if let Some(host) = host.as_mut().filter(|h| h.addr.is_none()) {
                        let kind = attribute(&e, b"addrtype")?;
                        if matches!(kind.as_deref(), Some("ipv4" | "ipv6")) {
                            host.addr = attribute(&e, b"addr")?;
                        }
                    }
                }
                b"port" if !empty => {
                    let id = attribute(&e, b"portid")?.context("port element without portid")?;
                    let number: u16 = id
                        .parse()
                        .with_context(|| format!("invalid port number '{id}'"))?;
                    port = Some(number);
                }
                b"state" => {
                    if let (Some(host), Some(number)) = (host.as_mut(), port) {
                        if attribute(&e, b"state")?.as_deref() == Some("open") {
                            host.open_ports.push(number);
                        }
                    }
                }
                b"script" => {
                    if attribute(&e, b"id")?.as_deref() == Some(DNS_BRUTE_ID) {
                        report.dns_brute.extend(attribute(&e, b"output")?);
                    }
                }
                _ => {}
            },
            Event::End(e) => match e.name().as_ref() {
                b"host" => report.hosts.extend(host.take()),
                b"port" => port = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(report)
}

/// Unescaped value of attribute `key`, if the element carries it.
fn attribute(element: &BytesStart<'_>, key: &[u8]) -> anyhow::Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr?;
        if attr.key.as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}
