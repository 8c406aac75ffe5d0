//! Data quality scoring. Ranks observations by how much the producing mechanism is
//! trusted and how complete the record is.

use super::types::{DiscoveryMethod, Observation, has_value};

const IP_ADDRESS_BONUS: u32 = 10;
const MAC_ADDRESS_BONUS: u32 = 20;
const HOSTNAME_BONUS: u32 = 15;
const VENDOR_BONUS: u32 = 10;
const DEVICE_TYPE_BONUS: u32 = 8;
const OS_INFO_BONUS: u32 = 12;
const NOTES_BONUS: u32 = 5;

const RICH_OS_INFO_LEN: usize = 20;
const RICH_OS_INFO_BONUS: u32 = 5;
const COMPOUND_DEVICE_TYPE_BONUS: u32 = 3;

/// Per-field completeness bonuses, by field name.
pub const FIELD_BONUSES: [(&str, u32); 7] = [
    ("ip_address", IP_ADDRESS_BONUS),
    ("mac_address", MAC_ADDRESS_BONUS),
    ("hostname", HOSTNAME_BONUS),
    ("vendor", VENDOR_BONUS),
    ("device_type", DEVICE_TYPE_BONUS),
    ("os_info", OS_INFO_BONUS),
    ("notes", NOTES_BONUS),
];

/// Separator for compound device type names such as `dhcp_lease_bound_computer`.
pub const DEVICE_TYPE_SEPARATOR: char = '_';

/// Base trust of a discovery mechanism. The only place this ordering is defined.
pub fn method_score(method: DiscoveryMethod) -> u32 {
    match method {
        DiscoveryMethod::RouterOsApi => 100,
        DiscoveryMethod::RouterOsRest => 95,
        DiscoveryMethod::Snmp => 80,
        DiscoveryMethod::NetBios => 70,
        DiscoveryMethod::Mdns => 60,
        DiscoveryMethod::Arp => 50,
    }
}

/// Quality score of one observation: method trust plus field completeness bonuses.
pub fn score(host: &Observation) -> u32 {
    // ip_address is a typed field and always present
    let mut score = method_score(host.discovery_method) + IP_ADDRESS_BONUS;

    let fields = [
        (&host.mac_address, MAC_ADDRESS_BONUS),
        (&host.hostname, HOSTNAME_BONUS),
        (&host.vendor, VENDOR_BONUS),
        (&host.device_type, DEVICE_TYPE_BONUS),
        (&host.os_info, OS_INFO_BONUS),
        (&host.notes, NOTES_BONUS),
    ];
    score += fields
        .iter()
        .filter(|(value, _)| has_value(value))
        .map(|(_, bonus)| bonus)
        .sum::<u32>();

    if host
        .os_info
        .as_deref()
        .is_some_and(|os| os.chars().count() > RICH_OS_INFO_LEN)
    {
        score += RICH_OS_INFO_BONUS;
    }

    if host
        .device_type
        .as_deref()
        .is_some_and(|t| t.contains(DEVICE_TYPE_SEPARATOR))
    {
        score += COMPOUND_DEVICE_TYPE_BONUS;
    }

    score
}
