//! mDNS provider. Browses a fixed set of service types for a bounded window and turns
//! resolved services inside the range into observations.

use std::net::IpAddr;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use mdns_sd::{ServiceDaemon, ServiceEvent};
use tokio::task;
use tracing::{debug, error, info};

use crate::discovery::DiscoveryProvider;
use crate::host::{DiscoveryMethod, HostStatus, Observation};

/// Browsed service types and the device type each one implies.
const SERVICE_TYPES: &[(&str, &str)] = &[
    ("_http._tcp.local.", "web_server"),
    ("_https._tcp.local.", "secure_web_server"),
    ("_ssh._tcp.local.", "ssh_server"),
    ("_smb._tcp.local.", "smb_server"),
    ("_workstation._tcp.local.", "workstation"),
    ("_device-info._tcp.local.", "device_info"),
    ("_airplay._tcp.local.", "airplay_device"),
    ("_raop._tcp.local.", "airtunes_device"),
];

const DEFAULT_DEVICE_TYPE: &str = "mdns_service";

fn device_type_for(service_type: &str) -> &'static str {
    SERVICE_TYPES
        .iter()
        .find(|(ty, _)| *ty == service_type)
        .map_or(DEFAULT_DEVICE_TYPE, |(_, device)| device)
}

/// A resolved service reduced to what an observation needs.
#[derive(Debug, Clone, PartialEq)]
struct ResolvedService {
    service_type: String,
    instance: String,
    addresses: Vec<IpAddr>,
    manufacturer: Option<String>,
    model: Option<String>,
    os: Option<String>,
}

/// Instance label of a full service name, e.g. `Living Room` from
/// `Living Room._airplay._tcp.local.`.
fn instance_name(fullname: &str, service_type: &str) -> String {
    fullname
        .strip_suffix(service_type)
        .map(|s| s.trim_end_matches('.'))
        .unwrap_or_else(|| fullname.split('.').next().unwrap_or(fullname))
        .to_string()
}

fn to_observation(service: &ResolvedService, range: &Ipv4Network) -> Option<Observation> {
    let ip = service.addresses.iter().find_map(|addr| match addr {
        IpAddr::V4(v4) if range.contains(*v4) => Some(*v4),
        _ => None,
    })?;

    let mut host = Observation::new(ip, DiscoveryMethod::Mdns)
        .with_device_type(device_type_for(&service.service_type))
        .with_status(HostStatus::Online);
    host.hostname = (!service.instance.is_empty()).then(|| service.instance.clone());
    host.vendor = service.manufacturer.clone().or_else(|| service.model.clone());
    host.os_info = service.os.clone();
    Some(host)
}

/// Collect resolved services of one type until the deadline passes.
fn browse_type(daemon: &ServiceDaemon, service_type: &str, deadline: Instant) -> Vec<ResolvedService> {
    let receiver = match daemon.browse(service_type) {
        Ok(receiver) => receiver,
        Err(e) => {
            debug!(service_type, error = %e, "mDNS browse failed");
            return Vec::new();
        }
    };

    let mut found = Vec::new();
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        match receiver.recv_timeout(remaining) {
            Ok(ServiceEvent::ServiceResolved(info)) => {
                let fullname = info.get_fullname().to_string();
                let text = |key: &str| {
                    info.get_property_val_str(key)
                        .map(str::to_string)
                        .filter(|v| !v.is_empty())
                };
                found.push(ResolvedService {
                    service_type: service_type.to_string(),
                    instance: instance_name(&fullname, service_type),
                    addresses: info.get_addresses().iter().map(|a| a.to_ip_addr()).collect(),
                    manufacturer: text("manufacturer"),
                    model: text("model"),
                    os: text("os"),
                });
            }
            Ok(ServiceEvent::SearchStopped(_)) => break,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    let _ = daemon.stop_browse(service_type);
    found
}

pub struct MdnsProvider {
    browse_window: Duration,
}

impl MdnsProvider {
    pub fn new(browse_window: Duration) -> Self {
        Self { browse_window }
    }
}

#[async_trait]
impl DiscoveryProvider for MdnsProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::Mdns
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let daemon = match ServiceDaemon::new() {
            Ok(daemon) => daemon,
            Err(e) => {
                error!(error = %e, "mDNS discovery failed to start daemon");
                return Vec::new();
            }
        };

        let deadline = Instant::now() + self.browse_window;
        let handles: Vec<_> = SERVICE_TYPES
            .iter()
            .map(|&(service_type, _)| {
                let daemon = daemon.clone();
                task::spawn_blocking(move || browse_type(&daemon, service_type, deadline))
            })
            .collect();

        let mut hosts = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(services) => hosts.extend(services.iter().filter_map(|s| to_observation(s, range))),
                Err(e) => debug!(error = %e, "mDNS browse task failed"),
            }
        }

        if let Err(e) = daemon.shutdown() {
            debug!(error = %e, "mDNS daemon shutdown failed");
        }

        info!(hosts_found = hosts.len(), "mDNS discovery completed");
        hosts
    }
}
