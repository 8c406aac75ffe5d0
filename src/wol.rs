//! Wake-on-LAN: magic packet construction and delivery.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

use crate::db::HostStore;
use crate::error::WolError;

pub const MAGIC_PACKET_LEN: usize = 102;

/// Parse `aa:bb:cc:dd:ee:ff`, `aa-bb-cc-dd-ee-ff` or `aabbccddeeff`.
pub fn parse_mac(mac: &str) -> Result<[u8; 6], WolError> {
    let invalid = || WolError::InvalidMac(mac.to_string());
    let trimmed = mac.trim();

    let digits: String = if trimmed.len() == 17 {
        let separator = trimmed.as_bytes()[2];
        if separator != b':' && separator != b'-' {
            return Err(invalid());
        }
        let groups: Vec<&str> = trimmed.split(separator as char).collect();
        if groups.len() != 6 || groups.iter().any(|g| g.len() != 2) {
            return Err(invalid());
        }
        groups.concat()
    } else {
        trimmed.to_string()
    };

    if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let mut bytes = [0u8; 6];
    for (i, byte) in bytes.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
    }
    Ok(bytes)
}

/// Six `0xFF` bytes followed by the MAC repeated 16 times.
pub fn magic_packet(mac: &str) -> Result<[u8; MAGIC_PACKET_LEN], WolError> {
    let mac = parse_mac(mac)?;
    let mut packet = [0xFFu8; MAGIC_PACKET_LEN];
    for chunk in packet[6..].chunks_exact_mut(6) {
        chunk.copy_from_slice(&mac);
    }
    Ok(packet)
}

#[derive(Debug, Clone, Deserialize)]
pub struct WolRequest {
    pub ip_address: Option<Ipv4Addr>,
    pub mac_address: Option<String>,
    pub broadcast_address: Option<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WolResponse {
    pub success: bool,
    pub message: String,
    pub ip_address: Option<Ipv4Addr>,
    pub mac_address: Option<String>,
}

pub struct WolService {
    store: Arc<dyn HostStore>,
    broadcast: Ipv4Addr,
    port: u16,
}

impl WolService {
    pub fn new(store: Arc<dyn HostStore>, broadcast: Ipv4Addr, port: u16) -> Self {
        Self {
            store,
            broadcast,
            port,
        }
    }

    /// Wake a host. Without a MAC the stored record for `ip` supplies one.
    /// Failures are reported in the response rather than as an error.
    pub async fn wake(
        &self,
        ip: Option<Ipv4Addr>,
        mac: Option<String>,
        broadcast: Option<Ipv4Addr>,
    ) -> WolResponse {
        let mac = mac.filter(|m| !m.trim().is_empty());
        let result = match self.resolve_mac(ip, mac.clone()).await {
            Ok(mac) => self
                .send(&mac, broadcast.unwrap_or(self.broadcast))
                .await
                .map(|()| mac),
            Err(e) => Err(e),
        };

        match result {
            Ok(mac) => {
                info!(ip = ?ip, mac = %mac, "Wake-on-LAN packet sent");
                WolResponse {
                    success: true,
                    message: "Wake-on-LAN packet sent successfully".to_string(),
                    ip_address: ip,
                    mac_address: Some(mac),
                }
            }
            Err(e) => {
                match &e {
                    WolError::Io(_) | WolError::Store(_) => error!(ip = ?ip, error = %e, "Wake-on-LAN failed"),
                    _ => warn!(ip = ?ip, error = %e, "Wake-on-LAN rejected"),
                }
                WolResponse {
                    success: false,
                    message: e.to_string(),
                    ip_address: ip,
                    mac_address: mac,
                }
            }
        }
    }

    async fn resolve_mac(&self, ip: Option<Ipv4Addr>, mac: Option<String>) -> Result<String, WolError> {
        if let Some(mac) = mac {
            return Ok(mac);
        }
        let Some(ip) = ip else {
            return Err(WolError::NoTarget);
        };
        self.store
            .get(ip)
            .await?
            .and_then(|host| host.mac_address)
            .filter(|m| !m.is_empty())
            .ok_or(WolError::MacUnknown(ip))
    }

    async fn send(&self, mac: &str, broadcast: Ipv4Addr) -> Result<(), WolError> {
        let packet = magic_packet(mac)?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket
            .send_to(&packet, SocketAddrV4::new(broadcast, self.port))
            .await?;
        Ok(())
    }
}
