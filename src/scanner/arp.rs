//! Passive ARP provider: reads the operating system's neighbour cache instead of probing.

use std::net::Ipv4Addr;

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use crate::discovery::DiscoveryProvider;
use crate::host::{DiscoveryMethod, HostStatus, Observation};
use crate::inference::get_mac_vendor;

const PROC_NET_ARP: &str = "/proc/net/arp";
const INCOMPLETE_MAC: &str = "00:00:00:00:00:00";

lazy_static! {
    static ref ARP_A_LINE: Regex = Regex::new(r".*\((\d+\.\d+\.\d+\.\d+)\).*at ([0-9a-fA-F:]+)")
        .expect("arp -a pattern is valid");
}

/// Neighbour cache entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Neighbour {
    ip: Ipv4Addr,
    mac: String,
}

/// Parse the Linux `/proc/net/arp` table. The first line is a header.
fn parse_proc_net_arp(content: &str) -> Vec<Neighbour> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let columns: Vec<&str> = line.split_whitespace().collect();
            let ip = columns.first()?.parse().ok()?;
            let mac = columns.get(3)?;
            if *mac == INCOMPLETE_MAC {
                return None;
            }
            Some(Neighbour {
                ip,
                mac: mac.to_uppercase(),
            })
        })
        .collect()
}

/// Parse BSD-style `arp -a` output, e.g. `? (192.168.1.1) at aa:bb:cc:dd:ee:ff on en0`.
/// `(incomplete)` entries never match.
fn parse_arp_a(output: &str) -> Vec<Neighbour> {
    output
        .lines()
        .filter_map(|line| {
            let caps = ARP_A_LINE.captures(line)?;
            let ip = caps.get(1)?.as_str().parse().ok()?;
            let mac = caps.get(2)?.as_str();
            if mac.split(':').count() != 6 {
                return None;
            }
            // macOS drops leading zeros ("0:1a:...")
            let mac = mac
                .split(':')
                .map(|octet| format!("{:0>2}", octet.to_uppercase()))
                .collect::<Vec<_>>()
                .join(":");
            Some(Neighbour { ip, mac })
        })
        .collect()
}

fn to_observation(neighbour: Neighbour) -> Observation {
    let mut host = Observation::new(neighbour.ip, DiscoveryMethod::Arp)
        .with_device_type("arp_entry")
        .with_status(HostStatus::Online);
    host.vendor = get_mac_vendor(&neighbour.mac).map(str::to_string);
    host.mac_address = Some(neighbour.mac);
    host
}

async fn read_neighbours() -> Vec<Neighbour> {
    if cfg!(target_os = "linux") {
        match tokio::fs::read_to_string(PROC_NET_ARP).await {
            Ok(content) => return parse_proc_net_arp(&content),
            Err(e) => debug!(error = %e, "Cannot read {}, falling back to arp -a", PROC_NET_ARP),
        }
    }

    match tokio::process::Command::new("arp").arg("-a").output().await {
        Ok(output) if output.status.success() => {
            parse_arp_a(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(output) => {
            warn!(status = %output.status, "arp -a exited with failure");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "Failed to run arp -a");
            Vec::new()
        }
    }
}

pub struct ArpProvider;

#[async_trait]
impl DiscoveryProvider for ArpProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Arp
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let hosts: Vec<Observation> = read_neighbours()
            .await
            .into_iter()
            .filter(|n| range.contains(n.ip))
            .map(to_observation)
            .collect();
        info!(hosts_found = hosts.len(), network = %range, "ARP table discovery completed");
        hosts
    }
}
