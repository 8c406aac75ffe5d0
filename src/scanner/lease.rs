//! Router lease and ARP records to observations, shared by the RouterOS API and REST
//! providers.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;
use tracing::debug;

use crate::host::{DiscoveryMethod, HostStatus, Observation};
use crate::inference::{self, LeaseRecord};

/// One RouterOS item as attribute name to value, e.g. `mac-address` to `AA:BB:...`.
pub type Record = HashMap<String, String>;

/// Inferences at or below this confidence are not mentioned in `os_info`.
const CONFIDENCE_NOTE_THRESHOLD: u8 = 50;

fn field<'a>(record: &'a Record, key: &str) -> &'a str {
    record.get(key).map(|v| v.trim()).unwrap_or("")
}

fn flag(record: &Record, key: &str) -> bool {
    matches!(field(record, key), "true" | "yes")
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

pub fn lease_status(status: &str) -> HostStatus {
    match status.to_lowercase().as_str() {
        "bound" | "active" => HostStatus::Online,
        "offered" | "waiting" => HostStatus::Unknown,
        _ => HostStatus::Offline,
    }
}

pub fn arp_status(record: &Record) -> HostStatus {
    if flag(record, "invalid") {
        HostStatus::Offline
    } else if flag(record, "dynamic") || flag(record, "published") {
        HostStatus::Online
    } else {
        HostStatus::Unknown
    }
}

/// Build an observation from a DHCP lease. `None` when the lease lacks an address or MAC,
/// the address does not parse, or it lies outside `range`.
pub fn lease_observation(
    lease: &Record,
    method: DiscoveryMethod,
    range: &Ipv4Network,
) -> Option<Observation> {
    let address = field(lease, "address");
    let mac = field(lease, "mac-address");
    if address.is_empty() || mac.is_empty() {
        return None;
    }

    let active_address = field(lease, "active-address");
    let active_mac = field(lease, "active-mac-address");
    let address = if active_address.is_empty() { address } else { active_address };
    let mac = if active_mac.is_empty() { mac } else { active_mac };

    let ip: Ipv4Addr = match address.parse() {
        Ok(ip) => ip,
        Err(_) => {
            debug!(address, "Skipping lease with unparsable address");
            return None;
        }
    };
    if !range.contains(ip) {
        return None;
    }

    let hostname = field(lease, "host-name");
    let client_id = field(lease, "client-id");
    let comment = field(lease, "comment");
    let class_id = field(lease, "class-id");
    let status = match field(lease, "status") {
        "" => "active",
        s => s,
    };

    let metadata = [
        ("Client-ID", client_id),
        ("Comment", comment),
        ("Class-ID", class_id),
    ]
    .iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}: {}", k, v))
    .collect::<Vec<_>>()
    .join("; ");
    let inferred = inference::analyze(&LeaseRecord::new(mac, hostname, metadata));

    let mut details: Vec<String> = [
        ("Client-ID", client_id),
        ("Expires", field(lease, "expires-after")),
        ("Last seen", field(lease, "last-seen")),
        ("DHCP Server", field(lease, "server")),
    ]
    .iter()
    .filter(|(_, v)| !v.is_empty())
    .map(|(k, v)| format!("{}: {}", k, v))
    .collect();
    if let Some(os) = &inferred.os {
        details.push(format!("Inferred OS: {}", os));
    }
    if inferred.confidence > CONFIDENCE_NOTE_THRESHOLD {
        details.push(format!("Confidence: {}%", inferred.confidence));
    }

    let mut host = Observation::new(ip, method)
        .with_mac(mac)
        .with_device_type(format!(
            "dhcp_lease_{}_{}",
            status.to_lowercase(),
            inferred.device_type
        ))
        .with_status(lease_status(status));
    host.hostname = non_empty(hostname);
    host.vendor = inferred.vendor.clone();
    host.os_info = non_empty(&details.join("; "));
    host.notes = non_empty(comment);
    host.inferred_os = inferred.os;
    host.inferred_device_type = Some(inferred.device_type);
    if inferred.confidence > 0 {
        host = host.with_confidence(inferred.confidence);
    }
    Some(host)
}

/// Build an observation from a router ARP entry.
pub fn arp_observation(
    entry: &Record,
    method: DiscoveryMethod,
    range: &Ipv4Network,
) -> Option<Observation> {
    let address = field(entry, "address");
    let mac = field(entry, "mac-address");
    if address.is_empty() || mac.is_empty() {
        return None;
    }
    let ip: Ipv4Addr = match address.parse() {
        Ok(ip) => ip,
        Err(_) => {
            debug!(address, "Skipping ARP entry with unparsable address");
            return None;
        }
    };
    if !range.contains(ip) {
        return None;
    }

    let interface = field(entry, "interface");
    let comment = field(entry, "comment");
    let mut details: Vec<String> = [
        ("dhcp", "DHCP"),
        ("dynamic", "Dynamic"),
        ("published", "Published"),
        ("invalid", "Invalid"),
    ]
    .iter()
    .filter(|(key, _)| flag(entry, key))
    .map(|(_, label)| label.to_string())
    .collect();
    if !interface.is_empty() {
        details.push(format!("Interface: {}", interface));
    }
    if !comment.is_empty() {
        details.push(format!("Comment: {}", comment));
    }

    let device_type = if interface.is_empty() {
        "arp_entry".to_string()
    } else {
        format!("arp_entry_{}", interface)
    };

    let mut host = Observation::new(ip, method)
        .with_mac(mac)
        .with_device_type(device_type)
        .with_status(arp_status(entry));
    host.vendor = inference::get_mac_vendor(mac).map(str::to_string);
    host.os_info = non_empty(&details.join("; "));
    Some(host)
}

/// Leases first, then ARP entries for addresses no lease covered.
pub fn router_observations(
    leases: &[Record],
    arp: &[Record],
    method: DiscoveryMethod,
    range: &Ipv4Network,
) -> Vec<Observation> {
    let mut hosts: Vec<Observation> = leases
        .iter()
        .filter_map(|lease| lease_observation(lease, method, range))
        .collect();

    let mut seen: HashSet<Ipv4Addr> = hosts.iter().map(|h| h.ip_address).collect();
    for entry in arp {
        if let Some(host) = arp_observation(entry, method, range)
            && seen.insert(host.ip_address)
        {
            hosts.push(host);
        }
    }
    hosts
}

/// Add one `dhcp_server` host per DHCP server whose address is in range and not
/// already observed.
pub fn add_dhcp_servers(
    hosts: &mut Vec<Observation>,
    servers: &[Record],
    method: DiscoveryMethod,
    range: &Ipv4Network,
) {
    for server in servers {
        let address = field(server, "address");
        if address.is_empty() {
            continue;
        }
        let ip: Ipv4Addr = match address.parse() {
            Ok(ip) => ip,
            Err(_) => {
                debug!(address, "Skipping DHCP server with unparsable address");
                continue;
            }
        };
        if !range.contains(ip) || hosts.iter().any(|h| h.ip_address == ip) {
            continue;
        }

        let interface = field(server, "interface");
        let or_no = |key: &str| match field(server, key) {
            "" => "no",
            value => value,
        };
        let mut host = Observation::new(ip, method)
            .with_hostname(format!("DHCP-Server-{}", interface))
            .with_device_type("dhcp_server");
        host.os_info = Some(format!(
            "Interface: {}; Authoritative: {}; Disabled: {}",
            interface,
            or_no("authoritative"),
            or_no("disabled")
        ));
        hosts.push(host);
    }
}
