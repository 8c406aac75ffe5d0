//! Discovery providers.

pub mod arp;
mod lease;
pub mod mdns;
pub mod netbios;
pub mod routeros_api;
pub mod routeros_rest;
pub mod snmp;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::Settings;
use crate::discovery::DiscoveryProvider;

pub use arp::ArpProvider;
pub use mdns::MdnsProvider;
pub use netbios::NetBiosProvider;
pub use routeros_api::RouterOsApiProvider;
pub use routeros_rest::RouterOsRestProvider;
pub use snmp::SnmpProvider;

/// Every provider, configured from settings. The orchestrator sorts them by trust.
pub fn default_providers(settings: &Settings) -> Vec<Arc<dyn DiscoveryProvider>> {
    let credentials = settings.routeros_credentials();
    if credentials.is_none() {
        info!("RouterOS credentials not configured, router providers will be skipped");
    }

    vec![
        Arc::new(RouterOsApiProvider::new(
            credentials.clone(),
            settings.routeros_port,
        )),
        Arc::new(RouterOsRestProvider::new(
            credentials,
            settings.routeros_rest_port,
        )),
        Arc::new(SnmpProvider::new(
            settings.snmp_community.clone(),
            Duration::from_secs(settings.snmp_timeout),
        )),
        Arc::new(NetBiosProvider::new()),
        Arc::new(MdnsProvider::new(Duration::from_secs(settings.mdns_browse_secs))),
        Arc::new(ArpProvider),
    ]
}
