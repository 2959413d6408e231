//! DNS stub-query encoding and answer decoding.
//!
//! Only what a single question/answer exchange with a recursive resolver
//! needs: PTR lookups for reverse resolution and A/AAAA lookups for forward
//! resolution.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use anyhow::{Context, bail};
use pnet::packet::dns::{
    DnsClass, DnsPacket, DnsQuery, DnsResponse, DnsType, DnsTypes, MutableDnsPacket, Opcode,
    Retcode,
};

pub const DNS_HDR_LEN: usize = 12;
const MAX_POINTER_JUMPS: usize = 16;

/// Builds a PTR query for `ip_addr`.
pub fn create_ptr_packet(ip_addr: &IpAddr, id: u16) -> anyhow::Result<Vec<u8>> {
    let ptr_name: String = reverse_address_to_ptr(ip_addr);
    create_query_packet(&ptr_name, DnsTypes::PTR, id)
}

/// Builds an A query for `name`.
pub fn create_a_packet(name: &str, id: u16) -> anyhow::Result<Vec<u8>> {
    create_query_packet(name, DnsTypes::A, id)
}

/// Builds an AAAA query for `name`.
pub fn create_aaaa_packet(name: &str, id: u16) -> anyhow::Result<Vec<u8>> {
    create_query_packet(name, DnsTypes::AAAA, id)
}

fn create_query_packet(name: &str, qtype: DnsType, id: u16) -> anyhow::Result<Vec<u8>> {
    let query: DnsQuery = create_query(name, qtype)?;
    let q_fixed_len: usize = 4;
    let qlen: usize = query.qname.len() + q_fixed_len;
    let total: usize = DNS_HDR_LEN + qlen;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    let mut cursor: usize = DNS_HDR_LEN;

    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();

    buffer[cursor..cursor + 2].copy_from_slice(&query.qtype.0.to_be_bytes());
    cursor += 2;

    buffer[cursor..cursor + 2].copy_from_slice(&query.qclass.0.to_be_bytes());

    Ok(buffer)
}

fn create_query(name: &str, qtype: DnsType) -> anyhow::Result<DnsQuery> {
    let qname: Vec<u8> = encode_dns_name(name)?;
    Ok(DnsQuery {
        qname,
        qtype,
        qclass: DnsClass(1),
        payload: Vec::new(),
    })
}

/// Returns the transaction id and every PTR target in the answer section.
///
/// A negative answer (e.g. NXDOMAIN) yields an empty list.
pub fn get_hostnames(payload: &[u8]) -> anyhow::Result<(u16, Vec<String>)> {
    let dns = DnsPacket::new(payload).context("Failed to parse DNS packet")?;
    let transaction_id = dns.get_id();
    if !matches!(dns.get_rcode(), Retcode::NoError) {
        return Ok((transaction_id, Vec::new()));
    }

    let hostnames: Vec<String> = dns
        .get_responses()
        .iter()
        .filter_map(|response| match response.rtype {
            DnsTypes::PTR => response_from_ptr(payload, response),
            _ => None,
        })
        .collect();

    Ok((transaction_id, hostnames))
}

/// Returns the transaction id and every A/AAAA address in the answer section.
pub fn get_addresses(payload: &[u8]) -> anyhow::Result<(u16, Vec<IpAddr>)> {
    let dns = DnsPacket::new(payload).context("Failed to parse DNS packet")?;
    let transaction_id = dns.get_id();
    if !matches!(dns.get_rcode(), Retcode::NoError) {
        return Ok((transaction_id, Vec::new()));
    }

    let addresses: Vec<IpAddr> = dns
        .get_responses()
        .iter()
        .filter_map(|response| match response.rtype {
            DnsTypes::A => <[u8; 4]>::try_from(response.data.as_slice())
                .ok()
                .map(|octets| IpAddr::V4(Ipv4Addr::from(octets))),
            DnsTypes::AAAA => <[u8; 16]>::try_from(response.data.as_slice())
                .ok()
                .map(|octets| IpAddr::V6(Ipv6Addr::from(octets))),
            _ => None,
        })
        .collect();

    Ok((transaction_id, addresses))
}

fn response_from_ptr(message: &[u8], response: &DnsResponse) -> Option<String> {
    decode_dns_name(message, &response.data)
}

/// Builds the `in-addr.arpa` / `ip6.arpa` name for a reverse lookup.
pub fn reverse_address_to_ptr(ip_addr: &IpAddr) -> String {
    match ip_addr {
        IpAddr::V4(ipv4) => {
            let [a, b, c, d] = ipv4.octets();
            format!("{d}.{c}.{b}.{a}.in-addr.arpa")
        }
        IpAddr::V6(ipv6) => {
            let mut name = String::with_capacity(72);
            for byte in ipv6.octets().iter().rev() {
                name.push_str(&format!("{:x}.{:x}.", byte & 0x0f, byte >> 4));
            }
            name.push_str("ip6.arpa");
            name
        }
    }
}

fn encode_dns_name(name: &str) -> anyhow::Result<Vec<u8>> {
    let mut encoded: Vec<u8> = Vec::new();
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        if label.len() > 63 {
            bail!("label '{label}' exceeds 63 bytes");
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    Ok(encoded)
}

/// Decodes a name from record data, following compression pointers into `message`.
fn decode_dns_name(message: &[u8], data: &[u8]) -> Option<String> {
    let mut parts: Vec<String> = Vec::new();
    let mut buf: &[u8] = data;
    let mut cursor: usize = 0;
    let mut jumps: usize = 0;

    loop {
        let len: usize = *buf.get(cursor)? as usize;
        if len == 0 {
            break;
        }

        if len & 0xC0 == 0xC0 {
            let low: usize = *buf.get(cursor + 1)? as usize;
            let offset: usize = ((len & 0x3F) << 8) | low;
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return None;
            }
            buf = message;
            cursor = offset;
            continue;
        }

        cursor += 1;
        let label_bytes: &[u8] = buf.get(cursor..cursor + len)?;
        let label: &str = std::str::from_utf8(label_bytes).ok()?;
        parts.push(label.to_string());
        cursor += len;
    }

    Some(parts.join("."))
}
