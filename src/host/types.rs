use std::net::Ipv4Addr;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Mechanism that produced an observation.
/// Declaration order is the trust order used by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMethod {
    #[serde(rename = "routeros_api")]
    RouterOsApi,
    #[serde(rename = "routeros_rest")]
    RouterOsRest,
    Snmp,
    #[serde(rename = "netbios")]
    NetBios,
    Mdns,
    Arp,
}

impl DiscoveryMethod {
    pub const ALL: [DiscoveryMethod; 6] = [
        DiscoveryMethod::RouterOsApi,
        DiscoveryMethod::RouterOsRest,
        DiscoveryMethod::Snmp,
        DiscoveryMethod::NetBios,
        DiscoveryMethod::Mdns,
        DiscoveryMethod::Arp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DiscoveryMethod::RouterOsApi => "routeros_api",
            DiscoveryMethod::RouterOsRest => "routeros_rest",
            DiscoveryMethod::Snmp => "snmp",
            DiscoveryMethod::NetBios => "netbios",
            DiscoveryMethod::Mdns => "mdns",
            DiscoveryMethod::Arp => "arp",
        }
    }

    /// Management-plane sources that count towards early termination.
    pub fn is_high_priority(&self) -> bool {
        matches!(
            self,
            DiscoveryMethod::RouterOsApi | DiscoveryMethod::RouterOsRest
        )
    }
}

impl std::fmt::Display for DiscoveryMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DiscoveryMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DiscoveryMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| format!("unknown discovery method '{}'", s))
    }
}

/// Liveness as reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostStatus {
    Online,
    Offline,
    #[default]
    Unknown,
}

impl HostStatus {
    /// online > unknown > offline
    pub fn rank(&self) -> u8 {
        match self {
            HostStatus::Online => 3,
            HostStatus::Unknown => 2,
            HostStatus::Offline => 1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostStatus::Online => "online",
            HostStatus::Offline => "offline",
            HostStatus::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for HostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for HostStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(HostStatus::Online),
            "offline" => Ok(HostStatus::Offline),
            "unknown" => Ok(HostStatus::Unknown),
            other => Err(format!("unknown host status '{}'", other)),
        }
    }
}

/// One sighting of a host by one provider. A merged canonical record has the same shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub ip_address: Ipv4Addr,
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    pub os_info: Option<String>,
    pub discovery_method: DiscoveryMethod,
    pub status: HostStatus,
    pub last_seen: Option<DateTime<Utc>>,
    pub wol_enabled: bool,
    pub notes: Option<String>,
    pub inferred_os: Option<String>,
    pub inferred_device_type: Option<String>,
    pub inference_confidence: Option<u8>,
}

impl Observation {
    pub fn new(ip_address: Ipv4Addr, discovery_method: DiscoveryMethod) -> Self {
        Self {
            ip_address,
            mac_address: None,
            hostname: None,
            vendor: None,
            device_type: None,
            os_info: None,
            discovery_method,
            status: HostStatus::Unknown,
            last_seen: None,
            wol_enabled: true,
            notes: None,
            inferred_os: None,
            inferred_device_type: None,
            inference_confidence: None,
        }
    }

    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac_address = Some(mac.into());
        self
    }

    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = Some(hostname.into());
        self
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.device_type = Some(device_type.into());
        self
    }

    pub fn with_os_info(mut self, os_info: impl Into<String>) -> Self {
        self.os_info = Some(os_info.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_status(mut self, status: HostStatus) -> Self {
        self.status = status;
        self
    }

    /// Confidence is clamped to 0..=100.
    pub fn with_confidence(mut self, confidence: u8) -> Self {
        self.inference_confidence = Some(confidence.min(100));
        self
    }
}

/// Operator edit of a stored host. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostUpdate {
    pub mac_address: Option<String>,
    pub hostname: Option<String>,
    pub vendor: Option<String>,
    pub device_type: Option<String>,
    pub os_info: Option<String>,
    pub status: Option<HostStatus>,
    pub wol_enabled: Option<bool>,
    pub notes: Option<String>,
}

impl HostUpdate {
    pub fn is_empty(&self) -> bool {
        *self == HostUpdate::default()
    }

    pub fn apply(self, host: &mut Observation) {
        fn set<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }
        set(&mut host.mac_address, self.mac_address);
        set(&mut host.hostname, self.hostname);
        set(&mut host.vendor, self.vendor);
        set(&mut host.device_type, self.device_type);
        set(&mut host.os_info, self.os_info);
        set(&mut host.notes, self.notes);
        if let Some(status) = self.status {
            host.status = status;
        }
        if let Some(wol_enabled) = self.wol_enabled {
            host.wol_enabled = wol_enabled;
        }
    }
}

/// Present and non-empty.
pub(crate) fn has_value(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.is_empty())
}
