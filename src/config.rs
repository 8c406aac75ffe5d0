//! Process settings from CLI flags and environment variables.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ipnetwork::Ipv4Network;

use crate::error::DiscoveryError;

#[derive(Debug, Clone, Parser)]
#[command(name = "host_inventory", version, about = "LAN host inventory and Wake-on-LAN service")]
pub struct Settings {
    /// Address the HTTP API binds to
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub bind: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// SQLite database file (`sqlite://` prefix accepted)
    #[arg(long, env = "DATABASE_URL", default_value = "hosts.db")]
    pub database_url: String,

    /// Seconds between discovery cycles
    #[arg(long, env = "DISCOVERY_INTERVAL", default_value_t = 300)]
    pub discovery_interval: u64,

    /// CIDR to scan; the first local IPv4 subnet when unset
    #[arg(long, env = "NETWORK_RANGE")]
    pub network_range: Option<String>,

    #[arg(
        long,
        env = "DISCOVERY_EARLY_TERMINATION",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub early_termination: bool,

    #[arg(long, env = "DISCOVERY_MIN_HOSTS_THRESHOLD", default_value_t = 5)]
    pub min_hosts_threshold: usize,

    /// Seconds to wait after a failed cycle
    #[arg(long, env = "DISCOVERY_ERROR_BACKOFF", default_value_t = 60)]
    pub error_backoff: u64,

    #[arg(long, env = "ROUTEROS_HOST")]
    pub routeros_host: Option<String>,

    #[arg(long, env = "ROUTEROS_USERNAME")]
    pub routeros_username: Option<String>,

    #[arg(long, env = "ROUTEROS_PASSWORD", hide_env_values = true)]
    pub routeros_password: Option<String>,

    #[arg(long, env = "ROUTEROS_PORT", default_value_t = 8728)]
    pub routeros_port: u16,

    #[arg(long, env = "ROUTEROS_REST_PORT", default_value_t = 80)]
    pub routeros_rest_port: u16,

    #[arg(long, env = "SNMP_COMMUNITY", default_value = "public")]
    pub snmp_community: String,

    /// SNMP request timeout in seconds
    #[arg(long, env = "SNMP_TIMEOUT", default_value_t = 5)]
    pub snmp_timeout: u64,

    #[arg(long, env = "MDNS_BROWSE_SECS", default_value_t = 10)]
    pub mdns_browse_secs: u64,

    #[arg(long, env = "WOL_BROADCAST_ADDRESS", default_value = "192.168.1.255")]
    pub wol_broadcast_address: Ipv4Addr,

    #[arg(long, env = "WOL_PORT", default_value_t = 9)]
    pub wol_port: u16,

    /// Hosts not seen for this long are purged after each cycle
    #[arg(long, env = "HOST_TTL_HOURS", default_value_t = 24)]
    pub host_ttl_hours: u64,

    /// Do not start the background discovery loop at startup
    #[arg(long)]
    pub no_autostart: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

impl Settings {
    pub fn database_path(&self) -> PathBuf {
        let path = self
            .database_url
            .strip_prefix("sqlite://")
            .unwrap_or(&self.database_url);
        PathBuf::from(path)
    }

    pub fn host_ttl(&self) -> Duration {
        Duration::from_secs(self.host_ttl_hours * 3600)
    }

    /// Credentials for the router management plane, when all three are set.
    pub fn routeros_credentials(&self) -> Option<RouterOsCredentials> {
        match (
            self.routeros_host.as_deref(),
            self.routeros_username.as_deref(),
            self.routeros_password.as_deref(),
        ) {
            (Some(host), Some(username), Some(password)) if !host.is_empty() => {
                Some(RouterOsCredentials {
                    host: host.to_string(),
                    username: username.to_string(),
                    password: password.to_string(),
                })
            }
            _ => None,
        }
    }

    pub fn discovery_config(&self) -> Result<DiscoveryConfig, DiscoveryError> {
        let network_range = self
            .network_range
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(parse_range)
            .transpose()?;

        Ok(DiscoveryConfig {
            network_range,
            interval: Duration::from_secs(self.discovery_interval),
            early_termination: self.early_termination,
            min_hosts_threshold: self.min_hosts_threshold,
            error_backoff: Duration::from_secs(self.error_backoff),
            host_ttl: self.host_ttl(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterOsCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Discovery cycle policy.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryConfig {
    pub network_range: Option<Ipv4Network>,
    pub interval: Duration,
    pub early_termination: bool,
    pub min_hosts_threshold: usize,
    pub error_backoff: Duration,
    pub host_ttl: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            network_range: None,
            interval: Duration::from_secs(300),
            early_termination: true,
            min_hosts_threshold: 5,
            error_backoff: Duration::from_secs(60),
            host_ttl: Duration::from_secs(24 * 3600),
        }
    }
}

/// Parse a CIDR such as `192.168.1.0/24`. A bare address is a /32.
pub fn parse_range(range: &str) -> Result<Ipv4Network, DiscoveryError> {
    let range = range.trim();
    let parsed = if range.contains('/') {
        range.parse::<Ipv4Network>().ok()
    } else {
        range
            .parse::<Ipv4Addr>()
            .ok()
            .and_then(|ip| Ipv4Network::new(ip, 32).ok())
    };
    parsed.ok_or_else(|| DiscoveryError::InvalidRange(range.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(args: &[&str]) -> Settings {
        let mut argv = vec!["host_inventory"];
        argv.extend_from_slice(args);
        Settings::try_parse_from(argv).expect("valid args")
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s.port, 8000);
        assert_eq!(s.routeros_port, 8728);
        assert_eq!(s.wol_port, 9);
        assert!(s.early_termination);
        assert!(!s.no_autostart);
    }

    #[test]
    fn test_discovery_config_from_settings() {
        let s = settings(&[
            "--network-range",
            "10.0.0.0/24",
            "--early-termination",
            "false",
            "--min-hosts-threshold",
            "3",
        ]);
        let cfg = s.discovery_config().expect("valid range");
        assert_eq!(cfg.network_range, Some("10.0.0.0/24".parse().unwrap()));
        assert!(!cfg.early_termination);
        assert_eq!(cfg.min_hosts_threshold, 3);
    }

    #[test]
    fn test_invalid_range_rejected() {
        let s = settings(&["--network-range", "10.0.0.0/99"]);
        assert!(matches!(
            s.discovery_config(),
            Err(DiscoveryError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_parse_range_bare_ip() {
        let net = parse_range("192.168.1.7").unwrap();
        assert_eq!(net.prefix(), 32);
        assert_eq!(net.ip(), Ipv4Addr::new(192, 168, 1, 7));
    }

    #[test]
    fn test_database_path_strips_scheme() {
        let s = settings(&["--database-url", "sqlite:///tmp/hosts.db"]);
        assert_eq!(s.database_path(), PathBuf::from("/tmp/hosts.db"));
    }

    #[test]
    fn test_routeros_credentials_need_all_fields() {
        let s = settings(&["--routeros-host", "192.168.88.1", "--routeros-username", "admin"]);
        assert_eq!(s.routeros_credentials(), None);
        let s = settings(&[
            "--routeros-host",
            "192.168.88.1",
            "--routeros-username",
            "admin",
            "--routeros-password",
            "secret",
        ]);
        assert_eq!(s.routeros_credentials().map(|c| c.host), Some("192.168.88.1".to_string()));
    }
}
