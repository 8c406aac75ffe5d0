//! OS and device type detection from DHCP lease signals.

use lazy_static::lazy_static;
use regex::Regex;

use super::patterns::{
    COMPUTER_HOSTNAME_PREFIXES, DEVICE_CATEGORIES, DEVICE_COMPUTER, DEVICE_DHCP_CLIENT,
    DEVICE_MEDIA, DEVICE_MOBILE, DEVICE_PRINTER, LINUX_CLIENT_IDS, MEDIA_COMMENT_KEYWORDS,
    MOBILE_HOSTNAME_PREFIXES, MOBILE_VENDOR_KEYWORDS, PC_VENDOR_KEYWORDS,
    PRINTER_COMMENT_KEYWORDS, contains_any,
};

lazy_static! {
    /// Hardware-type-1 client id, e.g. `1:aa:bb:cc:dd:ee:f`
    static ref RAW_MAC_CLIENT_ID: Regex =
        Regex::new(r"^1:([0-9a-f]{2}:){5}[0-9a-f]{1,2}$").expect("valid client id regex");
    static ref MSFT_CLIENT_ID: Regex =
        Regex::new(r"^msft \d+\.\d+").expect("valid msft regex");
}

/// OS family and version from the DHCP vendor class identifier (option 60).
pub(crate) fn detect_os_from_class_id(class_id: &str) -> Option<&'static str> {
    if class_id.is_empty() {
        return None;
    }
    let class_id = class_id.to_lowercase();

    if class_id.contains("msft") {
        let os = [
            ("5.0", "Windows 2000"),
            ("6.0", "Windows Vista/Server 2008"),
            ("6.1", "Windows 7/Server 2008 R2"),
            ("6.2", "Windows 8/Server 2012"),
            ("6.3", "Windows 8.1/Server 2012 R2"),
            ("10.0", "Windows 10/11/Server 2016+"),
        ]
        .into_iter()
        .find(|(version, _)| class_id.contains(version))
        .map_or("Windows (Unknown Version)", |(_, os)| os);
        return Some(os);
    }

    if class_id.contains("android") {
        let os = [
            ("dhcp-13", "Android 13+"),
            ("dhcp-12", "Android 12"),
            ("dhcp-11", "Android 11"),
            ("dhcp-10", "Android 10"),
        ]
        .into_iter()
        .find(|(marker, _)| class_id.contains(marker))
        .map_or("Android (Unknown Version)", |(_, os)| os);
        return Some(os);
    }

    if class_id.contains("iphone") || class_id.contains("ipad") {
        return Some("iOS");
    }
    if ["linux", "ubuntu", "debian"]
        .iter()
        .any(|k| class_id.contains(k))
    {
        return Some("Linux");
    }
    if class_id.contains("routeros") || class_id.contains("mikrotik") {
        return Some("RouterOS");
    }
    if class_id.contains("udhcp") {
        return Some("Linux (udhcp client)");
    }
    if class_id.contains("lguap") {
        return Some("LG U+ AP (Custom)");
    }
    None
}

/// OS family from the DHCP client identifier (option 61).
///
/// A raw-MAC client id is sent by most stacks, so the vendor decides what it means.
pub(crate) fn detect_os_from_client_id(client_id: &str, vendor: Option<&str>) -> Option<&'static str> {
    if client_id.is_empty() {
        return None;
    }

    if RAW_MAC_CLIENT_ID.is_match(client_id) {
        let vendor = vendor.map(str::to_lowercase).unwrap_or_default();
        if vendor.contains("apple") {
            return Some("macOS");
        }
        if contains_any(&vendor, PC_VENDOR_KEYWORDS) {
            return Some("Windows");
        }
        if contains_any(&vendor, MOBILE_VENDOR_KEYWORDS) {
            return Some("Android");
        }
        return Some("Windows");
    }

    let client_id = client_id.to_lowercase();
    if MSFT_CLIENT_ID.is_match(&client_id) {
        return Some("Windows");
    }
    if client_id.contains("android") || client_id.contains("dhcp-1") {
        return Some("Android");
    }
    if client_id.contains("iphone") || client_id.contains("ipad") {
        return Some("iOS");
    }
    if contains_any(&client_id, LINUX_CLIENT_IDS) {
        return Some("Linux");
    }
    None
}

/// Device category from lease text signals, first match wins.
pub(crate) fn detect_device_type(
    hostname: &str,
    client_id: &str,
    comment: &str,
    class_id: &str,
    os: Option<&str>,
) -> &'static str {
    let hostname = hostname.to_lowercase();
    let client_id = client_id.to_lowercase();
    let comment = comment.to_lowercase();
    let class_id = class_id.to_lowercase();
    let sources = [hostname.as_str(), comment.as_str(), class_id.as_str()];

    for (category, keywords) in DEVICE_CATEGORIES {
        if sources.iter().any(|s| contains_any(s, keywords)) {
            return category;
        }
    }

    if client_id.contains("android") || client_id.contains("iphone") || client_id.contains("ipad")
    {
        return DEVICE_MOBILE;
    }
    if contains_any(&comment, PRINTER_COMMENT_KEYWORDS) {
        return DEVICE_PRINTER;
    }
    if contains_any(&comment, MEDIA_COMMENT_KEYWORDS) {
        return DEVICE_MEDIA;
    }
    if class_id.contains("msft") {
        return DEVICE_COMPUTER;
    }

    if let Some(os) = os.map(str::to_lowercase) {
        if os.contains("windows") || os.contains("linux") || os.contains("macos") {
            return DEVICE_COMPUTER;
        }
        if os.contains("android") || os.contains("ios") {
            return DEVICE_MOBILE;
        }
    }

    if COMPUTER_HOSTNAME_PREFIXES.iter().any(|p| hostname.starts_with(p)) {
        return DEVICE_COMPUTER;
    }
    if MOBILE_HOSTNAME_PREFIXES.iter().any(|p| hostname.starts_with(p)) {
        return DEVICE_MOBILE;
    }

    DEVICE_DHCP_CLIENT
}
