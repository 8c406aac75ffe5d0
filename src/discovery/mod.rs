//! Discovery orchestration: the provider contract, the cycle runner and its lifecycle.

mod service;

use std::net::IpAddr;

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use pnet::datalink;

use crate::error::DiscoveryError;
use crate::host::{DiscoveryMethod, Observation};

pub use service::{CycleState, DiscoveryService, DiscoveryStatus, MethodInfo, ServiceState};

/// One discovery mechanism.
///
/// `discover` never fails: errors are logged inside the provider and yield a partial
/// or empty list. Providers bound their own running time.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync {
    fn method(&self) -> DiscoveryMethod;

    fn name(&self) -> &'static str {
        self.method().as_str()
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation>;
}

/// First up, non-loopback IPv4 subnet of this machine, normalized to its network address.
pub fn local_subnet() -> Result<Ipv4Network, DiscoveryError> {
    datalink::interfaces()
        .into_iter()
        .filter(|iface| iface.is_up() && !iface.is_loopback())
        .flat_map(|iface| iface.ips.into_iter())
        .find_map(|ip| match ip.ip() {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() && ip.prefix() < 32 => {
                Ipv4Network::new(v4, ip.prefix())
                    .and_then(|net| Ipv4Network::new(net.network(), ip.prefix()))
                    .ok()
            }
            _ => None,
        })
        .ok_or(DiscoveryError::NoLocalSubnet)
}
