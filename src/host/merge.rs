//! Quality-aware host merging. Reduces observations of the same IP into one canonical
//! record with per-field precedence rules rather than picking a single best record.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use tracing::{debug, info};

use super::quality::{DEVICE_TYPE_SEPARATOR, method_score, score};
use super::types::{Observation, has_value};

/// Device type prefixes that win ties on segment count, most specific first.
const PREFERRED_DEVICE_TYPE_PREFIXES: &[&str] = &["dhcp_lease", "arp_entry", "snmp", "netbios"];

/// Merge observations into exactly one record per IP, in first-seen IP order.
pub fn merge_hosts(hosts: Vec<Observation>) -> Vec<Observation> {
    let mut order: Vec<Ipv4Addr> = Vec::new();
    let mut groups: HashMap<Ipv4Addr, Vec<Observation>> = HashMap::new();

    for host in hosts {
        let ip = host.ip_address;
        groups
            .entry(ip)
            .or_insert_with(|| {
                order.push(ip);
                Vec::new()
            })
            .push(host);
    }

    order
        .into_iter()
        .filter_map(|ip| groups.remove(&ip))
        .filter_map(merge_group)
        .collect()
}

/// Merge a group of observations that share an IP. `None` only for an empty group.
pub fn merge_group(mut hosts: Vec<Observation>) -> Option<Observation> {
    if hosts.len() <= 1 {
        return hosts.pop();
    }

    let sources = hosts.len();
    let mut scored: Vec<(u32, Observation)> = hosts.into_iter().map(|h| (score(&h), h)).collect();
    // stable: equal scores keep discovery order
    scored.sort_by(|a, b| b.0.cmp(&a.0));

    let mut scored = scored.into_iter();
    let (best_score, mut merged) = scored.next()?;
    debug!(
        ip = %merged.ip_address,
        count = sources,
        best_method = %merged.discovery_method,
        best_score,
        "Merging hosts"
    );

    for (_, candidate) in scored {
        merge_into(&mut merged, &candidate);
    }

    info!(
        ip = %merged.ip_address,
        final_method = %merged.discovery_method,
        final_score = score(&merged),
        sources,
        "Host merged"
    );

    Some(merged)
}

/// Fold one candidate into the canonical record, field by field.
pub fn merge_into(merged: &mut Observation, candidate: &Observation) {
    adopt_if_empty(&mut merged.mac_address, &candidate.mac_address);
    adopt_if_empty(&mut merged.vendor, &candidate.vendor);
    adopt_if_empty(&mut merged.notes, &candidate.notes);

    adopt_if_longer(&mut merged.hostname, &candidate.hostname);
    adopt_if_longer(&mut merged.os_info, &candidate.os_info);

    if has_value(&candidate.device_type)
        && (!has_value(&merged.device_type)
            || is_more_specific_device_type(
                candidate.device_type.as_deref().unwrap_or_default(),
                merged.device_type.as_deref().unwrap_or_default(),
            ))
    {
        merged.device_type = candidate.device_type.clone();
    }

    // Provenance follows the most trusted contributor, independent of which fields it supplied.
    if method_score(candidate.discovery_method) > method_score(merged.discovery_method) {
        merged.discovery_method = candidate.discovery_method;
    }

    if candidate.status.rank() > merged.status.rank() {
        merged.status = candidate.status;
    }

    if let Some(seen) = candidate.last_seen
        && merged.last_seen.is_none_or(|current| seen > current)
    {
        merged.last_seen = Some(seen);
    }

    adopt_if_empty(&mut merged.inferred_os, &candidate.inferred_os);
    adopt_if_empty(
        &mut merged.inferred_device_type,
        &candidate.inferred_device_type,
    );
    if merged.inference_confidence.is_none() {
        merged.inference_confidence = candidate.inference_confidence;
    }
}

fn adopt_if_empty(current: &mut Option<String>, candidate: &Option<String>) {
    if !has_value(current) && has_value(candidate) {
        *current = candidate.clone();
    }
}

/// Longer is treated as more detailed.
fn adopt_if_longer(current: &mut Option<String>, candidate: &Option<String>) {
    if !has_value(candidate) {
        return;
    }
    let current_len = current.as_deref().map_or(0, |c| c.chars().count());
    let candidate_len = candidate.as_deref().map_or(0, |c| c.chars().count());
    if !has_value(current) || candidate_len > current_len {
        *current = candidate.clone();
    }
}

/// More `_` segments is more specific; equal counts fall back to the preferred prefix ranking.
pub fn is_more_specific_device_type(candidate: &str, current: &str) -> bool {
    if candidate.is_empty() {
        return false;
    }
    if current.is_empty() {
        return true;
    }

    let candidate_segments = candidate.split(DEVICE_TYPE_SEPARATOR).count();
    let current_segments = current.split(DEVICE_TYPE_SEPARATOR).count();
    if candidate_segments != current_segments {
        return candidate_segments > current_segments;
    }

    prefix_rank(candidate) < prefix_rank(current)
}

fn prefix_rank(device_type: &str) -> usize {
    PREFERRED_DEVICE_TYPE_PREFIXES
        .iter()
        .position(|prefix| device_type.starts_with(prefix))
        .unwrap_or(PREFERRED_DEVICE_TYPE_PREFIXES.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::types::{DiscoveryMethod, HostStatus};
    use chrono::{TimeZone, Utc};

    fn obs(ip: [u8; 4], method: DiscoveryMethod) -> Observation {
        Observation::new(Ipv4Addr::from(ip), method)
    }

    #[test]
    fn test_merge_empty() {
        assert!(merge_hosts(Vec::new()).is_empty());
    }

    #[test]
    fn test_one_record_per_ip_in_first_seen_order() {
        let hosts = vec![
            obs([10, 0, 0, 2], DiscoveryMethod::Arp),
            obs([10, 0, 0, 1], DiscoveryMethod::Mdns),
            obs([10, 0, 0, 2], DiscoveryMethod::Snmp),
            obs([10, 0, 0, 3], DiscoveryMethod::NetBios),
            obs([10, 0, 0, 1], DiscoveryMethod::Arp),
        ];
        let merged = merge_hosts(hosts);
        let ips: Vec<Ipv4Addr> = merged.iter().map(|h| h.ip_address).collect();
        assert_eq!(
            ips,
            vec![
                Ipv4Addr::new(10, 0, 0, 2),
                Ipv4Addr::new(10, 0, 0, 1),
                Ipv4Addr::new(10, 0, 0, 3)
            ]
        );
    }

    #[test]
    fn test_single_observation_passes_through_unchanged() {
        let host = obs([10, 0, 0, 9], DiscoveryMethod::Mdns)
            .with_hostname("printer")
            .with_status(HostStatus::Offline);
        assert_eq!(merge_hosts(vec![host.clone()]), vec![host]);
    }

    #[test]
    fn test_mac_from_weaker_source_is_adopted() {
        let router = obs([10, 0, 0, 5], DiscoveryMethod::RouterOsApi);
        let arp = obs([10, 0, 0, 5], DiscoveryMethod::Arp).with_mac("AA:BB:CC:DD:EE:FF");
        let merged = merge_hosts(vec![router, arp]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(merged[0].discovery_method, DiscoveryMethod::RouterOsApi);
    }

    #[test]
    fn test_method_drifts_to_most_trusted_even_without_fields() {
        // ARP record outscores a bare REST record on completeness, but provenance still drifts.
        let arp = obs([10, 0, 0, 6], DiscoveryMethod::Arp)
            .with_mac("00:11:22:33:44:55")
            .with_hostname("workstation-01")
            .with_vendor("Dell")
            .with_os_info("Windows 10/11/Server 2016+");
        let rest = obs([10, 0, 0, 6], DiscoveryMethod::RouterOsRest);
        assert!(score(&arp) > score(&rest));

        let merged = merge_hosts(vec![arp.clone(), rest]);
        assert_eq!(merged[0].discovery_method, DiscoveryMethod::RouterOsRest);
        assert_eq!(merged[0].hostname, arp.hostname);
    }

    #[test]
    fn test_online_wins_in_either_order() {
        let online = obs([10, 0, 0, 7], DiscoveryMethod::Arp).with_status(HostStatus::Online);
        let offline = obs([10, 0, 0, 7], DiscoveryMethod::RouterOsApi)
            .with_status(HostStatus::Offline);

        let a = merge_hosts(vec![online.clone(), offline.clone()]);
        let b = merge_hosts(vec![offline, online]);
        assert_eq!(a[0].status, HostStatus::Online);
        assert_eq!(b[0].status, HostStatus::Online);
    }

    #[test]
    fn test_unknown_beats_offline() {
        let unknown = obs([10, 0, 0, 8], DiscoveryMethod::Arp);
        let offline = obs([10, 0, 0, 8], DiscoveryMethod::Snmp).with_status(HostStatus::Offline);
        let merged = merge_hosts(vec![offline, unknown]);
        assert_eq!(merged[0].status, HostStatus::Unknown);
    }

    #[test]
    fn test_more_segments_wins_regardless_of_score() {
        let rich = obs([10, 0, 0, 5], DiscoveryMethod::RouterOsApi)
            .with_mac("00:11:22:33:44:55")
            .with_hostname("long-hostname-here")
            .with_device_type("arp_entry");
        let weak = obs([10, 0, 0, 5], DiscoveryMethod::Arp)
            .with_device_type("dhcp_lease_active_mobile_device");
        assert!(score(&rich) > score(&weak));

        let merged = merge_hosts(vec![rich.clone(), weak.clone()]);
        assert_eq!(
            merged[0].device_type.as_deref(),
            Some("dhcp_lease_active_mobile_device")
        );

        let merged = merge_hosts(vec![weak, rich]);
        assert_eq!(
            merged[0].device_type.as_deref(),
            Some("dhcp_lease_active_mobile_device")
        );
    }

    #[test]
    fn test_device_type_specificity_rules() {
        assert!(is_more_specific_device_type("a_b_c", "a_b"));
        assert!(!is_more_specific_device_type("a_b", "a_b_c"));
        // equal segments: preferred prefix ranking
        assert!(is_more_specific_device_type("dhcp_lease", "arp_entry"));
        assert!(!is_more_specific_device_type("arp_entry", "dhcp_lease"));
        assert!(is_more_specific_device_type("snmp_arp", "web_server"));
        assert!(!is_more_specific_device_type("web_server", "ssh_server"));
        assert!(!is_more_specific_device_type("", "netbios"));
        assert!(is_more_specific_device_type("netbios", ""));
    }

    #[test]
    fn test_longer_hostname_wins_even_if_garbage() {
        let good = obs([10, 0, 0, 4], DiscoveryMethod::RouterOsApi).with_hostname("nas");
        let noisy = obs([10, 0, 0, 4], DiscoveryMethod::Arp).with_hostname("xxxxxxxxxxxxxxx");
        let merged = merge_hosts(vec![good, noisy]);
        assert_eq!(merged[0].hostname.as_deref(), Some("xxxxxxxxxxxxxxx"));
    }

    #[test]
    fn test_vendor_and_notes_only_fill_gaps() {
        let best = obs([10, 0, 0, 3], DiscoveryMethod::RouterOsApi)
            .with_vendor("Apple")
            .with_notes("kitchen");
        let other = obs([10, 0, 0, 3], DiscoveryMethod::Mdns)
            .with_vendor("Apple Inc. long name")
            .with_notes("other notes");
        let merged = merge_hosts(vec![best, other]);
        assert_eq!(merged[0].vendor.as_deref(), Some("Apple"));
        assert_eq!(merged[0].notes.as_deref(), Some("kitchen"));
    }

    #[test]
    fn test_last_seen_takes_newest() {
        let older = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();

        let mut a = obs([10, 0, 0, 2], DiscoveryMethod::RouterOsApi);
        a.last_seen = Some(older);
        let mut b = obs([10, 0, 0, 2], DiscoveryMethod::Arp);
        b.last_seen = Some(newer);
        let c = obs([10, 0, 0, 2], DiscoveryMethod::Mdns);

        let merged = merge_hosts(vec![a, b, c]);
        assert_eq!(merged[0].last_seen, Some(newer));
    }

    #[test]
    fn test_inferred_fields_fill_only_when_absent() {
        let mut first = obs([10, 0, 0, 11], DiscoveryMethod::RouterOsApi);
        first.inferred_os = Some("Windows".to_string());
        let mut second = obs([10, 0, 0, 11], DiscoveryMethod::RouterOsRest)
            .with_confidence(40);
        second.inferred_os = Some("Linux".to_string());
        second.inferred_device_type = Some("computer".to_string());

        let merged = merge_hosts(vec![first, second]);
        assert_eq!(merged[0].inferred_os.as_deref(), Some("Windows"));
        assert_eq!(merged[0].inferred_device_type.as_deref(), Some("computer"));
        assert_eq!(merged[0].inference_confidence, Some(40));
    }

    #[test]
    fn test_merge_is_idempotent() {
        let hosts = vec![
            obs([10, 0, 0, 1], DiscoveryMethod::RouterOsApi).with_hostname("gw"),
            obs([10, 0, 0, 1], DiscoveryMethod::Arp).with_mac("00:00:5E:00:53:01"),
            obs([10, 0, 0, 2], DiscoveryMethod::Mdns).with_device_type("web_server"),
            obs([10, 0, 0, 2], DiscoveryMethod::NetBios).with_status(HostStatus::Online),
        ];
        let once = merge_hosts(hosts);
        let twice = merge_hosts(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_wol_enabled_comes_from_best_record() {
        let mut best = obs([10, 0, 0, 12], DiscoveryMethod::RouterOsApi);
        best.wol_enabled = false;
        let other = obs([10, 0, 0, 12], DiscoveryMethod::Arp);
        let merged = merge_hosts(vec![other, best]);
        assert!(!merged[0].wol_enabled);
    }
}
