//! Heuristic enrichment of DHCP lease records.
//!
//! [`analyze`] is pure: the same lease always yields the same [`Inference`].

mod detection;
mod patterns;
pub mod vendor;

use lazy_static::lazy_static;
use regex::Regex;

use detection::{detect_device_type, detect_os_from_class_id, detect_os_from_client_id};
use patterns::{
    STRONG_COMPUTER_KEYWORDS, STRONG_MOBILE_KEYWORDS, STRONG_NETWORK_KEYWORDS, contains_any,
};
pub use vendor::get_mac_vendor;

const HOSTNAME_POINTS: u32 = 10;
const CLIENT_ID_POINTS: u32 = 20;
const COMMENT_POINTS: u32 = 15;
const CLASS_ID_POINTS: u32 = 25;
const OS_RESOLVED_POINTS: u32 = 30;
const VENDOR_RESOLVED_POINTS: u32 = 20;
const STRONG_KEYWORD_POINTS: u32 = 15;
const MAX_CONFIDENCE: u32 = 100;

lazy_static! {
    static ref CLIENT_ID_FIELD: Regex =
        Regex::new(r"(?i)Client-ID:\s*([^;]+)").expect("valid client-id regex");
    static ref COMMENT_FIELD: Regex =
        Regex::new(r"(?i)Comment:\s*([^;]+)").expect("valid comment regex");
    static ref CLASS_ID_FIELD: Regex =
        Regex::new(r"(?i)Class-ID:\s*([^;]+)").expect("valid class-id regex");
}

/// DHCP-lease-shaped input to the classifier.
///
/// `metadata` is a `Key: value; Key: value` blob carrying `Client-ID`,
/// `Comment` and `Class-ID` when the lease source knows them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeaseRecord {
    pub mac_address: String,
    pub hostname: String,
    pub metadata: String,
}

impl LeaseRecord {
    pub fn new(
        mac_address: impl Into<String>,
        hostname: impl Into<String>,
        metadata: impl Into<String>,
    ) -> Self {
        Self {
            mac_address: mac_address.into(),
            hostname: hostname.into(),
            metadata: metadata.into(),
        }
    }
}

/// Classifier output. `confidence` is always within `0..=100`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inference {
    pub os: Option<String>,
    pub device_type: String,
    pub vendor: Option<String>,
    pub confidence: u8,
}

fn extract_field(re: &Regex, metadata: &str) -> String {
    re.captures(metadata)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Classify a lease: OS, device type, vendor and a completeness score.
pub fn analyze(lease: &LeaseRecord) -> Inference {
    let client_id = extract_field(&CLIENT_ID_FIELD, &lease.metadata);
    let comment = extract_field(&COMMENT_FIELD, &lease.metadata);
    let class_id = extract_field(&CLASS_ID_FIELD, &lease.metadata);

    let vendor = get_mac_vendor(&lease.mac_address);
    let os = detect_os_from_class_id(&class_id)
        .or_else(|| detect_os_from_client_id(&client_id, vendor));
    let device_type = detect_device_type(&lease.hostname, &client_id, &comment, &class_id, os);

    let confidence = confidence(
        &lease.hostname,
        &client_id,
        &comment,
        &class_id,
        os.is_some(),
        vendor.is_some(),
    );

    Inference {
        os: os.map(str::to_string),
        device_type: device_type.to_string(),
        vendor: vendor.map(str::to_string),
        confidence,
    }
}

fn confidence(
    hostname: &str,
    client_id: &str,
    comment: &str,
    class_id: &str,
    os_resolved: bool,
    vendor_resolved: bool,
) -> u8 {
    let signals = [
        (!hostname.is_empty(), HOSTNAME_POINTS),
        (!client_id.is_empty(), CLIENT_ID_POINTS),
        (!comment.is_empty(), COMMENT_POINTS),
        (!class_id.is_empty(), CLASS_ID_POINTS),
        (os_resolved, OS_RESOLVED_POINTS),
        (vendor_resolved, VENDOR_RESOLVED_POINTS),
    ];
    let mut total: u32 = signals
        .iter()
        .filter(|(present, _)| *present)
        .map(|(_, points)| points)
        .sum();

    let hostname = hostname.to_lowercase();
    total += [
        STRONG_NETWORK_KEYWORDS,
        STRONG_MOBILE_KEYWORDS,
        STRONG_COMPUTER_KEYWORDS,
    ]
    .iter()
    .filter(|keywords| contains_any(&hostname, keywords))
    .count() as u32
        * STRONG_KEYWORD_POINTS;

    // bounded by MAX_CONFIDENCE, fits in u8
    total.min(MAX_CONFIDENCE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_fields_case_insensitive() {
        let meta = "client-id: 1:aa:bb:cc:dd:ee:ff; COMMENT: office printer; Class-ID: MSFT 5.0";
        assert_eq!(extract_field(&CLIENT_ID_FIELD, meta), "1:aa:bb:cc:dd:ee:ff");
        assert_eq!(extract_field(&COMMENT_FIELD, meta), "office printer");
        assert_eq!(extract_field(&CLASS_ID_FIELD, meta), "MSFT 5.0");
        assert_eq!(extract_field(&CLASS_ID_FIELD, "Expires: 10m"), "");
    }

    #[test]
    fn test_analyze_windows_lease() {
        let lease = LeaseRecord::new(
            "70:85:C2:11:22:33",
            "DESKTOP-ABC",
            "Client-ID: 1:70:85:c2:11:22:33; Class-ID: MSFT 5.0",
        );
        let inference = analyze(&lease);
        assert_eq!(inference.os.as_deref(), Some("Windows 2000"));
        assert_eq!(inference.vendor.as_deref(), Some("Dell"));
        assert_eq!(inference.device_type, "computer");
        // 10 + 20 + 25 + 30 + 20 + 15 (desktop)
        assert_eq!(inference.confidence, 100);
    }

    #[test]
    fn test_analyze_raw_mac_client_id_apple() {
        let lease = LeaseRecord::new(
            "d8:5e:d3:01:02:03",
            "studio",
            "Client-ID: 1:d8:5e:d3:01:02:3",
        );
        let inference = analyze(&lease);
        assert_eq!(inference.os.as_deref(), Some("macOS"));
        assert_eq!(inference.device_type, "computer");
        assert_eq!(inference.confidence, 10 + 20 + 30 + 20);
    }

    #[test]
    fn test_analyze_bare_lease() {
        let inference = analyze(&LeaseRecord::default());
        assert_eq!(inference.os, None);
        assert_eq!(inference.vendor, None);
        assert_eq!(inference.device_type, "dhcp_client");
        assert_eq!(inference.confidence, 0);
    }

    #[test]
    fn test_analyze_is_deterministic_and_bounded() {
        let leases = [
            LeaseRecord::new("80:ca:4b:00:00:01", "android-router-laptop", "Client-ID: android-dhcp-13; Comment: tv; Class-ID: android-dhcp-13"),
            LeaseRecord::new("00:0c:42:00:00:01", "gateway", "Class-ID: MikroTik"),
            LeaseRecord::new("garbage", "", "no structure at all"),
        ];
        for lease in &leases {
            let first = analyze(lease);
            assert_eq!(first, analyze(lease));
            assert!(first.confidence <= 100);
        }
    }

    #[test]
    fn test_strong_keywords_add_per_group() {
        assert_eq!(confidence("router", "", "", "", false, false), 25);
        assert_eq!(confidence("iphone-laptop", "", "", "", false, false), 40);
        assert_eq!(confidence("kitchen", "", "", "", false, false), 10);
    }
}
