use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use scanbox_common::error::ResolutionError;
use scanbox_protocols::dns;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

const MAX_DNS_MESSAGE: usize = 4096;

/// Sends single stub queries to one recursive nameserver.
#[derive(Debug, Clone)]
pub struct DnsResolver {
    server: SocketAddr,
    timeout: Duration,
}

impl DnsResolver {
    pub fn new(server: SocketAddr, timeout: Duration) -> Self {
        Self { server, timeout }
    }

    /// PTR lookup. Names are returned without the trailing dot.
    pub async fn reverse(
        &self,
        ip: IpAddr,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, ResolutionError> {
        let subject = ip.to_string();
        let id: u16 = self.next_trans_id();
        let query = dns::create_ptr_packet(&ip, id).map_err(malformed)?;
        let reply = self.exchange(&query, &subject, cancel).await?;

        let (reply_id, hostnames) = dns::get_hostnames(&reply).map_err(malformed)?;
        check_id(id, reply_id)?;

        let hostnames: Vec<String> = hostnames
            .into_iter()
            .map(|name| name.trim_end_matches('.').to_string())
            .filter(|name| !name.is_empty())
            .collect();

        if hostnames.is_empty() {
            return Err(ResolutionError::NoRecords(subject));
        }
        Ok(hostnames)
    }

    /// A and AAAA lookup. Fails only when neither query produced an address.
    pub async fn forward(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, ResolutionError> {
        let v4 = self.query_addresses(name, dns::create_a_packet, cancel).await;
        let v6 = self.query_addresses(name, dns::create_aaaa_packet, cancel).await;

        let mut addresses: Vec<IpAddr> = Vec::new();
        let mut first_error: Option<ResolutionError> = None;

        for result in [v4, v6] {
            match result {
                Ok(found) => {
                    for addr in found {
                        if !addresses.contains(&addr) {
                            addresses.push(addr);
                        }
                    }
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if !addresses.is_empty() {
            return Ok(addresses);
        }
        Err(first_error.unwrap_or_else(|| ResolutionError::NoRecords(name.to_string())))
    }

    async fn query_addresses(
        &self,
        name: &str,
        build: fn(&str, u16) -> anyhow::Result<Vec<u8>>,
        cancel: &CancellationToken,
    ) -> Result<Vec<IpAddr>, ResolutionError> {
        let id: u16 = self.next_trans_id();
        let query = build(name, id).map_err(malformed)?;
        let reply = self.exchange(&query, name, cancel).await?;

        let (reply_id, addresses) = dns::get_addresses(&reply).map_err(malformed)?;
        check_id(id, reply_id)?;
        Ok(addresses)
    }

    async fn exchange(
        &self,
        query: &[u8],
        subject: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ResolutionError> {
        let local: SocketAddr = match self.server {
            SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(local).await?;
        socket.connect(self.server).await?;
        socket.send(query).await?;

        let mut buf = vec![0u8; MAX_DNS_MESSAGE];
        let len = tokio::select! {
            _ = cancel.cancelled() => return Err(ResolutionError::Cancelled),
            res = tokio::time::timeout(self.timeout, socket.recv(&mut buf)) => {
                res.map_err(|_| ResolutionError::Timeout(subject.to_string()))??
            }
        };

        buf.truncate(len);
        Ok(buf)
    }

    fn next_trans_id(&self) -> u16 {
        rand::random::<u16>()
    }
}

fn check_id(sent: u16, received: u16) -> Result<(), ResolutionError> {
    if sent != received {
        return Err(ResolutionError::Malformed(format!(
            "transaction id mismatch: sent {sent}, got {received}"
        )));
    }
    Ok(())
}

fn malformed(e: anyhow::Error) -> ResolutionError {
    ResolutionError::Malformed(format!("{e:#}"))
}
