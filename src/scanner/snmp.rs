//! SNMP provider. Walks the ARP table (ipNetToMediaPhysAddress) of the likely
//! infrastructure devices of a network with SNMPv2c GETNEXT requests on UDP 161.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryProvider;
use crate::host::{DiscoveryMethod, Observation};

static REQUEST_ID: AtomicU32 = AtomicU32::new(1);

const SNMP_PORT: u16 = 161;

/// ipNetToMediaPhysAddress; rows are indexed by ifIndex then the four IP octets
const OID_IP_NET_TO_MEDIA_PHYS: &[u32] = &[1, 3, 6, 1, 2, 1, 4, 22, 1, 2];

/// Host offsets from the network address where routers and switches usually live
const INFRASTRUCTURE_OFFSETS: &[u32] = &[1, 2, 254];

/// Upper bound on GETNEXT round trips per device
const MAX_WALK_STEPS: usize = 4096;

const TAG_INTEGER: u8 = 0x02;
const TAG_OCTET_STRING: u8 = 0x04;
const TAG_NULL: u8 = 0x05;
const TAG_OID: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x30;
const TAG_GET_NEXT_REQUEST: u8 = 0xA1;
const TAG_RESPONSE: u8 = 0xA2;
const TAG_END_OF_MIB_VIEW: u8 = 0x82;

fn encode_length(len: usize) -> Vec<u8> {
    if len < 0x80 {
        vec![len as u8]
    } else if len <= 0xFF {
        vec![0x81, len as u8]
    } else {
        vec![0x82, (len >> 8) as u8, len as u8]
    }
}

fn tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = vec![tag];
    out.extend(encode_length(content.len()));
    out.extend_from_slice(content);
    out
}

fn encode_oid(oid: &[u32]) -> Vec<u8> {
    let mut encoded = Vec::new();
    if oid.len() < 2 {
        return encoded;
    }
    encoded.push((oid[0] * 40 + oid[1]) as u8);
    for &arc in &oid[2..] {
        // base-128, high bit set on all but the last byte
        let mut chunk = vec![(arc & 0x7F) as u8];
        let mut rest = arc >> 7;
        while rest > 0 {
            chunk.push(((rest & 0x7F) as u8) | 0x80);
            rest >>= 7;
        }
        chunk.reverse();
        encoded.extend(chunk);
    }
    encoded
}

fn decode_oid(data: &[u8]) -> Vec<u32> {
    let Some((&first, rest)) = data.split_first() else {
        return Vec::new();
    };
    let mut oid = vec![(first / 40) as u32, (first % 40) as u32];
    let mut value = 0u32;
    for &b in rest {
        value = (value << 7) | (b & 0x7F) as u32;
        if b & 0x80 == 0 {
            oid.push(value);
            value = 0;
        }
    }
    oid
}

/// SNMPv2c GetNextRequest for a single OID.
fn build_get_next_request(community: &str, request_id: u32, oid: &[u32]) -> Vec<u8> {
    let mut varbind = tlv(TAG_OID, &encode_oid(oid));
    varbind.extend([TAG_NULL, 0x00]);
    let varbind_list = tlv(TAG_SEQUENCE, &tlv(TAG_SEQUENCE, &varbind));

    let mut pdu = tlv(TAG_INTEGER, &request_id.to_be_bytes());
    pdu.extend(tlv(TAG_INTEGER, &[0])); // error-status
    pdu.extend(tlv(TAG_INTEGER, &[0])); // error-index
    pdu.extend(varbind_list);

    let mut message = tlv(TAG_INTEGER, &[1]); // version 2c
    message.extend(tlv(TAG_OCTET_STRING, community.as_bytes()));
    message.extend(tlv(TAG_GET_NEXT_REQUEST, &pdu));
    tlv(TAG_SEQUENCE, &message)
}

/// Read one TLV at `pos`: (tag, content, position after it).
fn read_tlv(data: &[u8], pos: usize) -> Option<(u8, &[u8], usize)> {
    let tag = *data.get(pos)?;
    let first = *data.get(pos + 1)?;
    let (len, header) = if first < 0x80 {
        (first as usize, 2)
    } else {
        let count = (first & 0x7F) as usize;
        if count == 0 || count > 4 {
            return None;
        }
        let bytes = data.get(pos + 2..pos + 2 + count)?;
        let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
        (len, 2 + count)
    };
    let start = pos + header;
    let content = data.get(start..start + len)?;
    Some((tag, content, start + len))
}

#[derive(Debug, Clone, PartialEq)]
struct Varbind {
    oid: Vec<u32>,
    tag: u8,
    value: Vec<u8>,
}

/// First varbind of a GetResponse, or `None` if the message is not one.
fn parse_response(data: &[u8]) -> Option<Varbind> {
    let (tag, message, _) = read_tlv(data, 0)?;
    if tag != TAG_SEQUENCE {
        return None;
    }
    let (_, _, pos) = read_tlv(message, 0)?; // version
    let (_, _, pos) = read_tlv(message, pos)?; // community
    let (tag, pdu, _) = read_tlv(message, pos)?;
    if tag != TAG_RESPONSE {
        return None;
    }

    let (_, _, pos) = read_tlv(pdu, 0)?; // request-id
    let (_, error_status, pos) = read_tlv(pdu, pos)?;
    if error_status.iter().any(|b| *b != 0) {
        return None;
    }
    let (_, _, pos) = read_tlv(pdu, pos)?; // error-index
    let (_, varbinds, _) = read_tlv(pdu, pos)?;
    let (_, varbind, _) = read_tlv(varbinds, 0)?;

    let (tag, oid, pos) = read_tlv(varbind, 0)?;
    if tag != TAG_OID {
        return None;
    }
    let (tag, value, _) = read_tlv(varbind, pos)?;
    Some(Varbind {
        oid: decode_oid(oid),
        tag,
        value: value.to_vec(),
    })
}

/// Table row to (IP, MAC). The row index ends with the four IP octets.
fn arp_row(varbind: &Varbind) -> Option<(Ipv4Addr, String)> {
    if varbind.tag != TAG_OCTET_STRING || varbind.value.len() != 6 {
        return None;
    }
    let index = varbind.oid.get(OID_IP_NET_TO_MEDIA_PHYS.len()..)?;
    if index.len() < 5 {
        return None;
    }
    let octets: Vec<u8> = index[index.len() - 4..]
        .iter()
        .map(|arc| u8::try_from(*arc).ok())
        .collect::<Option<_>>()?;
    let ip = Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]);
    let mac = varbind
        .value
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(":");
    Some((ip, mac))
}

/// Devices to walk: .1, .2 and .254 of the range, or of its /24 when the range is smaller.
fn infrastructure_targets(range: &Ipv4Network) -> Vec<Ipv4Addr> {
    let network = if range.prefix() > 24 {
        Ipv4Network::new(range.network(), 24)
            .and_then(|n| Ipv4Network::new(n.network(), 24))
            .unwrap_or(*range)
    } else {
        *range
    };

    let base = u32::from(network.network());
    let mut targets = Vec::new();
    for offset in INFRASTRUCTURE_OFFSETS {
        let ip = Ipv4Addr::from(base.wrapping_add(*offset));
        if network.contains(ip) && ip != network.broadcast() && !targets.contains(&ip) {
            targets.push(ip);
        }
    }
    targets
}

/// Walk a device's ARP table. Stops at the end of the table, on timeout or on error.
fn walk_arp_table(device: Ipv4Addr, community: &str, timeout: Duration) -> Vec<(Ipv4Addr, String)> {
    let socket = match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => socket,
        Err(e) => {
            warn!(error = %e, "Failed to bind SNMP socket");
            return Vec::new();
        }
    };
    if socket.set_read_timeout(Some(timeout)).is_err() {
        return Vec::new();
    }

    let target = SocketAddr::new(IpAddr::V4(device), SNMP_PORT);
    let deadline = Instant::now() + timeout * 6;
    let mut oid = OID_IP_NET_TO_MEDIA_PHYS.to_vec();
    let mut rows = Vec::new();
    let mut buf = [0u8; 2048];

    for _ in 0..MAX_WALK_STEPS {
        if Instant::now() > deadline {
            debug!(device = %device, "SNMP walk deadline reached");
            break;
        }
        let request_id = REQUEST_ID.fetch_add(1, Ordering::Relaxed);
        let request = build_get_next_request(community, request_id, &oid);
        if socket.send_to(&request, target).is_err() {
            break;
        }

        let varbind = match socket.recv_from(&mut buf) {
            Ok((len, src)) if src.ip() == IpAddr::V4(device) => parse_response(&buf[..len]),
            _ => None,
        };
        let Some(varbind) = varbind else {
            break;
        };
        if varbind.tag == TAG_END_OF_MIB_VIEW
            || !varbind.oid.starts_with(OID_IP_NET_TO_MEDIA_PHYS)
            || varbind.oid <= oid
        {
            break;
        }

        match arp_row(&varbind) {
            Some(row) => rows.push(row),
            None => debug!(device = %device, oid = ?varbind.oid, "Skipping malformed SNMP ARP row"),
        }
        oid = varbind.oid;
    }
    rows
}

pub struct SnmpProvider {
    community: String,
    timeout: Duration,
}

impl SnmpProvider {
    pub fn new(community: impl Into<String>, timeout: Duration) -> Self {
        Self {
            community: community.into(),
            timeout,
        }
    }
}

#[async_trait]
impl DiscoveryProvider for SnmpProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Snmp
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let mut handles = Vec::new();
        for device in infrastructure_targets(range) {
            let community = self.community.clone();
            let timeout = self.timeout;
            handles.push((
                device,
                tokio::task::spawn_blocking(move || walk_arp_table(device, &community, timeout)),
            ));
        }

        let mut hosts: Vec<Observation> = Vec::new();
        for (device, handle) in handles {
            let rows = match handle.await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(device = %device, error = %e, "SNMP walk task failed");
                    continue;
                }
            };
            debug!(device = %device, rows = rows.len(), "SNMP ARP table read");
            for (ip, mac) in rows {
                if !range.contains(ip) || hosts.iter().any(|h| h.ip_address == ip) {
                    continue;
                }
                hosts.push(
                    Observation::new(ip, DiscoveryMethod::Snmp)
                        .with_mac(mac)
                        .with_device_type("snmp_arp")
                        .with_notes(format!("ARP table of {}", device)),
                );
            }
        }

        info!(hosts_found = hosts.len(), "SNMP discovery completed");
        hosts
    }
}
