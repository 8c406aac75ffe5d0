//! RouterOS REST provider (`/rest/...` over HTTP with basic auth).

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use super::lease::{Record, router_observations};
use crate::config::RouterOsCredentials;
use crate::discovery::DiscoveryProvider;
use crate::host::{DiscoveryMethod, Observation};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const LEASE_PATH: &str = "/rest/ip/dhcp-server/lease";
const ARP_PATH: &str = "/rest/ip/arp";

/// REST values are mostly strings; flatten the rest so records match the binary API.
fn to_record(item: HashMap<String, Value>) -> Record {
    item.into_iter()
        .filter_map(|(key, value)| {
            let value = match value {
                Value::String(s) => s,
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                Value::Null | Value::Array(_) | Value::Object(_) => return None,
            };
            Some((key, value))
        })
        .collect()
}

pub struct RouterOsRestProvider {
    credentials: Option<RouterOsCredentials>,
    port: u16,
    client: reqwest::Client,
}

impl RouterOsRestProvider {
    pub fn new(credentials: Option<RouterOsCredentials>, port: u16) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self {
            credentials,
            port,
            client,
        }
    }

    fn url(&self, host: &str, path: &str) -> String {
        if self.port == 80 {
            format!("http://{}{}", host, path)
        } else {
            format!("http://{}:{}{}", host, self.port, path)
        }
    }

    /// GET a RouterOS collection. Errors and non-200 replies yield an empty list.
    async fn fetch(&self, credentials: &RouterOsCredentials, path: &str) -> Vec<Record> {
        let url = self.url(&credentials.host, path);
        let response = match self
            .client
            .get(&url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                error!(url = %url, error = %e, "RouterOS REST request failed");
                return Vec::new();
            }
        };

        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "RouterOS REST request rejected");
            return Vec::new();
        }

        match response.json::<Vec<HashMap<String, Value>>>().await {
            Ok(items) => items.into_iter().map(to_record).collect(),
            Err(e) => {
                warn!(url = %url, error = %e, "Unreadable RouterOS REST response");
                Vec::new()
            }
        }
    }
}

#[async_trait]
impl DiscoveryProvider for RouterOsRestProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::RouterOsRest
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let Some(credentials) = &self.credentials else {
            debug!("RouterOS REST discovery skipped, credentials not configured");
            return Vec::new();
        };

        info!(host = %credentials.host, network = %range, "Starting RouterOS REST discovery");
        let leases = self.fetch(credentials, LEASE_PATH).await;
        let arp = self.fetch(credentials, ARP_PATH).await;
        let hosts = router_observations(&leases, &arp, DiscoveryMethod::RouterOsRest, range);
        info!(hosts_found = hosts.len(), "RouterOS REST discovery completed");
        hosts
    }
}
