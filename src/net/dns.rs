//! Minimal A-record resolver over UDP
//!
//! Plugged into reqwest when an account names a custom DNS server.

use super::NetError;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::debug;

const DNS_PORT: u16 = 53;
const QUERY_TIMEOUT: Duration = Duration::from_secs(5);
const TYPE_A: u16 = 1;
const CLASS_IN: u16 = 1;

/// Sends one A query per lookup to a fixed server
#[derive(Debug, Clone)]
pub struct UdpResolver {
    server: SocketAddr,
}

impl UdpResolver {
    pub fn new(server: IpAddr) -> Self {
        Self::with_addr(SocketAddr::new(server, DNS_PORT))
    }

    pub(crate) fn with_addr(server: SocketAddr) -> Self {
        Self { server }
    }

    pub async fn lookup(&self, host: &str) -> Result<Vec<Ipv4Addr>, NetError> {
        let fail = |reason: String| NetError::DnsQueryFailed {
            host: host.to_string(),
            reason,
        };

        let id: u16 = rand::random();
        let query = build_query(id, host);

        let bind: SocketAddr = if self.server.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind)
            .await
            .map_err(|e| fail(format!("bind failed: {}", e)))?;
        socket
            .send_to(&query, self.server)
            .await
            .map_err(|e| fail(format!("send failed: {}", e)))?;

        let mut response = [0u8; 512];
        let (len, _) = timeout(QUERY_TIMEOUT, socket.recv_from(&mut response))
            .await
            .map_err(|_| fail("timed out".to_string()))?
            .map_err(|e| fail(format!("recv failed: {}", e)))?;

        parse_response(id, &response[..len]).map_err(fail)
    }
}

impl Resolve for UdpResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let resolver = self.clone();
        Box::pin(async move {
            let ips = resolver.lookup(name.as_str()).await?;
            debug!("{} resolved to {:?} via {}", name.as_str(), ips, resolver.server);
            let addrs: Addrs = Box::new(
                ips.into_iter()
                    .map(|ip| SocketAddr::new(IpAddr::V4(ip), 0)),
            );
            Ok(addrs)
        })
    }
}

/// Build a DNS A record query packet
fn build_query(id: u16, hostname: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(512);

    // Header: id, recursion desired, one question
    packet.extend_from_slice(&id.to_be_bytes());
    packet.extend_from_slice(&[0x01, 0x00]);
    packet.extend_from_slice(&[0x00, 0x01]);
    packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);

    for label in hostname.split('.').filter(|label| !label.is_empty()) {
        packet.push(label.len() as u8);
        packet.extend_from_slice(label.as_bytes());
    }
    packet.push(0x00);

    packet.extend_from_slice(&TYPE_A.to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet
}

fn read_u16(packet: &[u8], pos: usize) -> Result<u16, String> {
    packet
        .get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "response truncated".to_string())
}

/// Position just past an encoded name (labels or a compression pointer)
fn skip_name(packet: &[u8], mut pos: usize) -> Result<usize, String> {
    loop {
        let len = *packet
            .get(pos)
            .ok_or_else(|| "name truncated".to_string())?;
        if len & 0xC0 == 0xC0 {
            return Ok(pos + 2);
        }
        if len == 0 {
            return Ok(pos + 1);
        }
        pos += 1 + len as usize;
    }
}

/// Every A record in the answer section
fn parse_response(id: u16, packet: &[u8]) -> Result<Vec<Ipv4Addr>, String> {
    if packet.len() < 12 {
        return Err("response too short".to_string());
    }
    if read_u16(packet, 0)? != id {
        return Err("transaction id mismatch".to_string());
    }

    let rcode = packet[3] & 0x0F;
    if rcode != 0 {
        return Err(format!("DNS error code: {}", rcode));
    }

    let qdcount = read_u16(packet, 4)?;
    let ancount = read_u16(packet, 6)?;

    let mut pos = 12;
    for _ in 0..qdcount {
        pos = skip_name(packet, pos)? + 4;
    }

    let mut addresses = Vec::new();
    for _ in 0..ancount {
        pos = skip_name(packet, pos)?;
        let rtype = read_u16(packet, pos)?;
        let rdlength = read_u16(packet, pos + 8)? as usize;
        pos += 10;

        let rdata = packet
            .get(pos..pos + rdlength)
            .ok_or_else(|| "answer section truncated".to_string())?;
        if rtype == TYPE_A && rdlength == 4 {
            addresses.push(Ipv4Addr::new(rdata[0], rdata[1], rdata[2], rdata[3]));
        }
        pos += rdlength;
    }

    if addresses.is_empty() {
        return Err("no A records in response".to_string());
    }
    Ok(addresses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(query: &[u8], records: &[(u16, &[u8])]) -> Vec<u8> {
        let mut packet = Vec::new();
        packet.extend_from_slice(&query[..2]);
        packet.extend_from_slice(&[0x81, 0x80, 0x00, 0x01]);
        packet.extend_from_slice(&(records.len() as u16).to_be_bytes());
        packet.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);
        packet.extend_from_slice(&query[12..]);
        for (rtype, rdata) in records {
            packet.extend_from_slice(&[0xC0, 0x0C]);
            packet.extend_from_slice(&rtype.to_be_bytes());
            packet.extend_from_slice(&CLASS_IN.to_be_bytes());
            packet.extend_from_slice(&60u32.to_be_bytes());
            packet.extend_from_slice(&(rdata.len() as u16).to_be_bytes());
            packet.extend_from_slice(rdata);
        }
        packet
    }

    #[test]
    fn test_build_query() {
        let query = build_query(0xBEEF, "example.com");

        assert_eq!(&query[..2], &[0xBE, 0xEF]);
        assert_eq!(query[2], 0x01);
        assert_eq!(query[5], 0x01);
        assert_eq!(query[12], 7);
        assert_eq!(query[20], 3);
        assert_eq!(&query[query.len() - 4..], &[0x00, 0x01, 0x00, 0x01]);
    }

    #[test]
    fn test_trailing_dot_is_ignored() {
        assert_eq!(build_query(1, "example.com."), build_query(1, "example.com"));
    }

    #[test]
    fn test_parse_skips_cname() {
        let query = build_query(7, "portal.example");
        let cname = [0x03, b'w', b'w', b'w', 0xC0, 0x0C];
        let packet = answer(&query, &[(5, &cname), (TYPE_A, &[10, 9, 8, 7])]);

        assert_eq!(
            parse_response(7, &packet).unwrap(),
            vec![Ipv4Addr::new(10, 9, 8, 7)]
        );
    }

    #[test]
    fn test_parse_rejects_bad_packets() {
        let query = build_query(7, "portal.example");

        assert!(parse_response(7, &query[..8]).is_err());
        let packet = answer(&query, &[(TYPE_A, &[10, 9, 8, 7])]);
        assert_eq!(
            parse_response(8, &packet).unwrap_err(),
            "transaction id mismatch"
        );
        assert!(parse_response(7, &packet[..packet.len() - 2]).is_err());
        let empty = answer(&query, &[]);
        assert_eq!(
            parse_response(7, &empty).unwrap_err(),
            "no A records in response"
        );
    }

    #[tokio::test]
    async fn test_lookup_against_local_server() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let reply = answer(&buf[..len], &[(TYPE_A, &[172, 16, 0, 1])]);
            server.send_to(&reply, peer).await.unwrap();
        });

        let resolver = UdpResolver::with_addr(addr);
        let ips = resolver.lookup("enet.10000.gd.cn").await.unwrap();
        assert_eq!(ips, vec![Ipv4Addr::new(172, 16, 0, 1)]);
    }
}
