//! Keyword tables for lease classification. Category order is priority order.

pub(crate) const DEVICE_NETWORK: &str = "network_device";
pub(crate) const DEVICE_MOBILE: &str = "mobile_device";
pub(crate) const DEVICE_COMPUTER: &str = "computer";
pub(crate) const DEVICE_SERVER: &str = "server";
pub(crate) const DEVICE_IOT: &str = "iot_device";
pub(crate) const DEVICE_GAMING: &str = "gaming_device";
pub(crate) const DEVICE_PRINTER: &str = "printer";
pub(crate) const DEVICE_MEDIA: &str = "media_device";
pub(crate) const DEVICE_DHCP_CLIENT: &str = "dhcp_client";

pub(crate) const NETWORK_KEYWORDS: &[&str] = &[
    "router",
    "gateway",
    "switch",
    "ap-",
    "access-point",
    "rt-",
    "ac3200",
];
pub(crate) const MOBILE_KEYWORDS: &[&str] =
    &["iphone", "ipad", "android", "mobile", "phone", "tablet"];
pub(crate) const COMPUTER_KEYWORDS: &[&str] =
    &["pc", "laptop", "desktop", "computer", "workstation"];
pub(crate) const SERVER_KEYWORDS: &[&str] = &["server", "srv", "nas", "backup"];
pub(crate) const IOT_KEYWORDS: &[&str] = &["iot", "smart", "sensor", "camera", "doorbell"];
pub(crate) const GAMING_KEYWORDS: &[&str] = &["ps4", "ps5", "xbox", "nintendo", "gaming"];

pub(crate) const DEVICE_CATEGORIES: &[(&str, &[&str])] = &[
    (DEVICE_NETWORK, NETWORK_KEYWORDS),
    (DEVICE_MOBILE, MOBILE_KEYWORDS),
    (DEVICE_COMPUTER, COMPUTER_KEYWORDS),
    (DEVICE_SERVER, SERVER_KEYWORDS),
    (DEVICE_IOT, IOT_KEYWORDS),
    (DEVICE_GAMING, GAMING_KEYWORDS),
];

pub(crate) const PRINTER_COMMENT_KEYWORDS: &[&str] = &["printer", "print"];
pub(crate) const MEDIA_COMMENT_KEYWORDS: &[&str] = &["tv", "television", "smart-tv"];

// Hostname keywords that earn a confidence bonus
pub(crate) const STRONG_NETWORK_KEYWORDS: &[&str] = &["router", "gateway", "switch", "ap-"];
pub(crate) const STRONG_MOBILE_KEYWORDS: &[&str] = &["iphone", "ipad", "android"];
pub(crate) const STRONG_COMPUTER_KEYWORDS: &[&str] = &["pc", "laptop", "desktop"];

/// Hostname prefixes consulted when nothing else classified the device.
pub(crate) const COMPUTER_HOSTNAME_PREFIXES: &[&str] = &["win-", "desktop-", "laptop-"];
pub(crate) const MOBILE_HOSTNAME_PREFIXES: &[&str] = &["android-", "iphone-", "ipad-"];

pub(crate) const LINUX_CLIENT_IDS: &[&str] = &["dhcpcd", "udhcp", "isc-dhclient"];

/// Vendors whose raw-MAC client ids indicate a Windows PC.
pub(crate) const PC_VENDOR_KEYWORDS: &[&str] = &["intel", "dell", "hp"];
/// Vendors whose raw-MAC client ids indicate an Android handset.
pub(crate) const MOBILE_VENDOR_KEYWORDS: &[&str] = &["xiaomi"];

pub(crate) fn contains_any(haystack: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| haystack.contains(k))
}
