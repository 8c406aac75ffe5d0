use std::net::Ipv4Addr;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("stored host {ip} is malformed: {reason}")]
    Malformed { ip: String, reason: String },
    #[error("database task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("invalid network range '{0}'")]
    InvalidRange(String),
    #[error("a discovery cycle is already in progress")]
    CycleInProgress,
    #[error("no local IPv4 subnet found")]
    NoLocalSubnet,
    #[error("discovery service is already running")]
    AlreadyRunning,
    #[error("discovery service is stopping")]
    Stopping,
}

#[derive(Debug, Error)]
pub enum WolError {
    #[error("invalid MAC address '{0}'")]
    InvalidMac(String),
    #[error("no MAC address known for {0}")]
    MacUnknown(Ipv4Addr),
    #[error("either a MAC or an IP address is required")]
    NoTarget,
    #[error("store lookup failed: {0}")]
    Store(#[from] StoreError),
    #[error("failed to send magic packet: {0}")]
    Io(#[from] std::io::Error),
}

/// RouterOS binary API failures.
#[derive(Debug, Error)]
pub enum RouterOsError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out waiting for router")]
    Timeout,
    #[error("router returned !trap: {0}")]
    Trap(String),
    #[error("login rejected")]
    LoginFailed,
    #[error("malformed reply: {0}")]
    Protocol(String),
}

impl From<tokio::time::error::Elapsed> for RouterOsError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        RouterOsError::Timeout
    }
}
