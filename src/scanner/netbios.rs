//! NetBIOS provider. Sends a node status (NBSTAT) query to UDP 137 of every host in the
//! range and reads the workstation name, workgroup and adapter MAC from the reply.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use tracing::{debug, info};

use crate::discovery::DiscoveryProvider;
use crate::host::{DiscoveryMethod, HostStatus, Observation};

static TRANSACTION_ID: AtomicU16 = AtomicU16::new(1);

const NETBIOS_PORT: u16 = 137;
const BATCH_SIZE: usize = 50;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);
const BATCH_PAUSE: Duration = Duration::from_millis(100);

const QUERY_TYPE_NBSTAT: u16 = 0x0021;
const QUERY_CLASS_IN: u16 = 0x0001;

/// Header (12) + encoded name (34) + type (2) + class (2)
const ANSWER_TTL_OFFSET: usize = 50;
const NAME_ENTRY_LEN: usize = 18;
const GROUP_NAME_FLAG: u16 = 0x8000;
const WORKSTATION_SUFFIX: u8 = 0x00;

/// First-level encoding of the wildcard name `*`, padded with NULs to 16 bytes.
fn encode_wildcard_name() -> Vec<u8> {
    let mut raw = [0u8; 16];
    raw[0] = b'*';
    let mut encoded = Vec::with_capacity(34);
    encoded.push(32);
    for byte in raw {
        encoded.push(b'A' + (byte >> 4));
        encoded.push(b'A' + (byte & 0x0F));
    }
    encoded.push(0);
    encoded
}

fn build_nbstat_request(transaction_id: u16) -> Vec<u8> {
    let mut packet = Vec::with_capacity(50);
    packet.extend(transaction_id.to_be_bytes());
    packet.extend(0u16.to_be_bytes()); // flags
    packet.extend(1u16.to_be_bytes()); // questions
    packet.extend([0u8; 6]); // answer, authority, additional
    packet.extend(encode_wildcard_name());
    packet.extend(QUERY_TYPE_NBSTAT.to_be_bytes());
    packet.extend(QUERY_CLASS_IN.to_be_bytes());
    packet
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct NodeStatus {
    name: String,
    workgroup: Option<String>,
    mac: Option<String>,
}

fn parse_nbstat_response(data: &[u8]) -> Option<NodeStatus> {
    let rdlength_at = ANSWER_TTL_OFFSET + 4;
    let rdlength = u16::from_be_bytes([*data.get(rdlength_at)?, *data.get(rdlength_at + 1)?]) as usize;
    let rdata = data.get(rdlength_at + 2..rdlength_at + 2 + rdlength)?;
    let (&count, entries) = rdata.split_first()?;

    let table_len = count as usize * NAME_ENTRY_LEN;
    let table = entries.get(..table_len)?;

    let mut name = None;
    let mut workgroup = None;
    for entry in table.chunks_exact(NAME_ENTRY_LEN) {
        let label = String::from_utf8_lossy(&entry[..15]).trim_end().to_string();
        let suffix = entry[15];
        let flags = u16::from_be_bytes([entry[16], entry[17]]);
        if suffix != WORKSTATION_SUFFIX || label.is_empty() {
            continue;
        }
        let slot = if flags & GROUP_NAME_FLAG != 0 {
            &mut workgroup
        } else {
            &mut name
        };
        if slot.is_none() {
            *slot = Some(label);
        }
    }

    // Unit ID follows the name table; Samba reports all zeroes
    let mac = entries
        .get(table_len..table_len + 6)
        .filter(|bytes| bytes.iter().any(|b| *b != 0))
        .map(|bytes| {
            bytes
                .iter()
                .map(|b| format!("{:02X}", b))
                .collect::<Vec<_>>()
                .join(":")
        });

    Some(NodeStatus {
        name: name?,
        workgroup,
        mac,
    })
}

fn query_host(ip: Ipv4Addr, timeout: Duration) -> Option<NodeStatus> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.set_read_timeout(Some(timeout)).ok()?;
    let target = SocketAddr::new(IpAddr::V4(ip), NETBIOS_PORT);
    let request = build_nbstat_request(TRANSACTION_ID.fetch_add(1, Ordering::Relaxed));
    socket.send_to(&request, target).ok()?;

    let mut buf = [0u8; 1024];
    let (len, src) = socket.recv_from(&mut buf).ok()?;
    if src.ip() != IpAddr::V4(ip) {
        return None;
    }
    parse_nbstat_response(&buf[..len])
}

fn to_observation(ip: Ipv4Addr, status: NodeStatus) -> Observation {
    let mut host = Observation::new(ip, DiscoveryMethod::NetBios)
        .with_hostname(status.name)
        .with_device_type("netbios")
        .with_status(HostStatus::Online);
    host.mac_address = status.mac;
    host.notes = status.workgroup.map(|w| format!("Workgroup: {}", w));
    host
}

pub struct NetBiosProvider {
    timeout: Duration,
}

impl NetBiosProvider {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for NetBiosProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DiscoveryProvider for NetBiosProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::NetBios
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let targets: Vec<Ipv4Addr> = if range.prefix() >= 31 {
            range.iter().collect()
        } else {
            range
                .iter()
                .filter(|ip| *ip != range.network() && *ip != range.broadcast())
                .collect()
        };

        let mut hosts = Vec::new();
        for (i, batch) in targets.chunks(BATCH_SIZE).enumerate() {
            if i > 0 {
                tokio::time::sleep(BATCH_PAUSE).await;
            }
            let handles: Vec<_> = batch
                .iter()
                .map(|&ip| {
                    let timeout = self.timeout;
                    (ip, tokio::task::spawn_blocking(move || query_host(ip, timeout)))
                })
                .collect();

            for (ip, handle) in handles {
                match handle.await {
                    Ok(Some(status)) => hosts.push(to_observation(ip, status)),
                    Ok(None) => {}
                    Err(e) => debug!(ip = %ip, error = %e, "NetBIOS query task failed"),
                }
            }
        }

        info!(hosts_found = hosts.len(), scanned = targets.len(), "NetBIOS discovery completed");
        hosts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name_entry(name: &str, suffix: u8, flags: u16) -> Vec<u8> {
        let mut entry = format!("{:<15}", name).into_bytes();
        entry.push(suffix);
        entry.extend(flags.to_be_bytes());
        entry
    }

    fn response(entries: &[Vec<u8>], mac: [u8; 6]) -> Vec<u8> {
        let mut rdata = vec![entries.len() as u8];
        for entry in entries {
            rdata.extend(entry);
        }
        rdata.extend(mac);
        rdata.extend([0u8; 40]); // statistics

        let mut packet = vec![0x12, 0x34, 0x84, 0x00, 0, 0, 0, 1, 0, 0, 0, 0];
        packet.extend(encode_wildcard_name());
        packet.extend(QUERY_TYPE_NBSTAT.to_be_bytes());
        packet.extend(QUERY_CLASS_IN.to_be_bytes());
        packet.extend([0u8; 4]); // ttl
        packet.extend((rdata.len() as u16).to_be_bytes());
        packet.extend(rdata);
        packet
    }

    #[test]
    fn test_build_nbstat_request() {
        let request = build_nbstat_request(0x1234);
        assert_eq!(&request[..2], &[0x12, 0x34]);
        assert_eq!(&request[4..6], &[0x00, 0x01]);
        assert_eq!(request[12], 0x20);
        assert_eq!(&request[13..15], b"CK");
        assert_eq!(&request[15..17], b"AA");
        assert_eq!(&request[request.len() - 4..], &[0x00, 0x21, 0x00, 0x01]);
        assert_eq!(request.len(), 50);
    }

    #[test]
    fn test_parse_nbstat_response() {
        let data = response(
            &[
                name_entry("OFFICE-PC", 0x00, 0x0400),
                name_entry("WORKGROUP", 0x00, 0x8400),
                name_entry("OFFICE-PC", 0x20, 0x0400),
            ],
            [0x00, 0x1A, 0x2B, 0x3C, 0x4D, 0x5E],
        );
        let status = parse_nbstat_response(&data).unwrap();
        assert_eq!(status.name, "OFFICE-PC");
        assert_eq!(status.workgroup.as_deref(), Some("WORKGROUP"));
        assert_eq!(status.mac.as_deref(), Some("00:1A:2B:3C:4D:5E"));
    }

    #[test]
    fn test_parse_nbstat_zero_mac_and_group_only() {
        let data = response(&[name_entry("NAS", 0x00, 0x0400)], [0; 6]);
        assert_eq!(parse_nbstat_response(&data).unwrap().mac, None);

        let data = response(&[name_entry("WORKGROUP", 0x00, 0x8400)], [1; 6]);
        assert!(parse_nbstat_response(&data).is_none());
    }

    #[test]
    fn test_parse_nbstat_truncated() {
        let data = response(&[name_entry("NAS", 0x00, 0x0400)], [1; 6]);
        assert!(parse_nbstat_response(&data[..60]).is_none());
        assert!(parse_nbstat_response(&[]).is_none());
    }

    #[test]
    fn test_to_observation() {
        let host = to_observation(
            Ipv4Addr::new(192, 168, 1, 20),
            NodeStatus {
                name: "OFFICE-PC".to_string(),
                workgroup: Some("WORKGROUP".to_string()),
                mac: None,
            },
        );
        assert_eq!(host.hostname.as_deref(), Some("OFFICE-PC"));
        assert_eq!(host.device_type.as_deref(), Some("netbios"));
        assert_eq!(host.notes.as_deref(), Some("Workgroup: WORKGROUP"));
        assert_eq!(host.status, HostStatus::Online);
    }
}
