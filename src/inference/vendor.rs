//! Static OUI to vendor table.

const OUI_VENDORS: &[(&str, &str)] = &[
    ("000000", "Xerox"),
    ("00000C", "Cisco"),
    ("00014F", "Dell"),
    ("000163", "Apple"),
    ("0003FF", "Microsoft"),
    ("000420", "Intel"),
    ("00059A", "HP"),
    ("000A95", "Netgear"),
    ("000C29", "VMware"),
    ("000C42", "MikroTik"),
    ("00155D", "Microsoft Hyper-V"),
    ("00163E", "Xen"),
    ("001A2B", "TP-Link"),
    ("001B44", "Cisco Systems"),
    ("001C14", "VMware"),
    ("001C42", "Parallels"),
    ("005056", "VMware"),
    ("080027", "Oracle VirtualBox"),
    ("0A0027", "Oracle VirtualBox"),
    ("1488A9", "ASUSTeK Computer"),
    ("14DDA9", "ASUSTek"),
    ("1AC3AF", "Apple"),
    ("4C5E0C", "MikroTik"),
    ("525400", "QEMU"),
    ("7085C2", "Dell"),
    ("80CA4B", "Xiaomi"),
    ("A8A159", "LG Electronics"),
    ("D850E6", "TP-Link"),
    ("D85ED3", "Apple"),
];

/// Normalized OUI (six upper-case hex digits) of a MAC in `:`/`-` separated or bare form.
pub fn oui(mac: &str) -> Option<String> {
    let mac = mac.trim().to_uppercase();
    let octets: Vec<&str> = if mac.contains([':', '-']) {
        mac.split([':', '-']).take(3).collect()
    } else if mac.len() >= 6 && mac.is_ascii() {
        vec![&mac[0..2], &mac[2..4], &mac[4..6]]
    } else {
        return None;
    };

    if octets.len() != 3
        || octets
            .iter()
            .any(|o| o.len() != 2 || !o.chars().all(|c| c.is_ascii_hexdigit()))
    {
        return None;
    }
    Some(octets.concat())
}

/// Vendor for a MAC address, if its OUI is known.
pub fn get_mac_vendor(mac: &str) -> Option<&'static str> {
    let oui = oui(mac)?;
    OUI_VENDORS
        .iter()
        .find(|(prefix, _)| *prefix == oui)
        .map(|(_, vendor)| *vendor)
}
