//! RouterOS API provider. Speaks the binary API (TCP 8728): sentences of
//! length-prefixed words, terminated by an empty word.

use std::time::Duration;

use async_trait::async_trait;
use ipnetwork::Ipv4Network;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::lease::{Record, add_dhcp_servers, router_observations};
use crate::config::RouterOsCredentials;
use crate::discovery::DiscoveryProvider;
use crate::error::RouterOsError;
use crate::host::{DiscoveryMethod, Observation};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest word accepted from the router.
const MAX_WORD_LEN: usize = 1 << 20;

/// Encode a word length using the RouterOS variable-length scheme.
fn encode_length(len: usize) -> Vec<u8> {
    let len = len as u32;
    if len < 0x80 {
        vec![len as u8]
    } else if len < 0x4000 {
        let v = len | 0x8000;
        vec![(v >> 8) as u8, v as u8]
    } else if len < 0x20_0000 {
        let v = len | 0xC0_0000;
        vec![(v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else if len < 0x1000_0000 {
        let v = len | 0xE000_0000;
        v.to_be_bytes().to_vec()
    } else {
        let mut out = vec![0xF0];
        out.extend_from_slice(&len.to_be_bytes());
        out
    }
}

fn encode_sentence(words: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    for word in words {
        out.extend(encode_length(word.len()));
        out.extend_from_slice(word.as_bytes());
    }
    // Empty word ends the sentence
    out.push(0);
    out
}

async fn read_length<R: AsyncRead + Unpin>(reader: &mut R) -> Result<usize, RouterOsError> {
    let first = reader.read_u8().await?;
    let (extra, initial) = match first {
        b if b & 0x80 == 0x00 => (0, b as u32),
        b if b & 0xC0 == 0x80 => (1, (b & 0x3F) as u32),
        b if b & 0xE0 == 0xC0 => (2, (b & 0x1F) as u32),
        b if b & 0xF0 == 0xE0 => (3, (b & 0x0F) as u32),
        0xF0 => (4, 0),
        b => {
            return Err(RouterOsError::Protocol(format!(
                "unexpected control byte {:#04x}",
                b
            )));
        }
    };

    let mut len = initial;
    for _ in 0..extra {
        len = (len << 8) | reader.read_u8().await? as u32;
    }
    Ok(len as usize)
}

async fn read_sentence<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Vec<String>, RouterOsError> {
    let mut words = Vec::new();
    loop {
        let len = read_length(reader).await?;
        if len == 0 {
            return Ok(words);
        }
        if len > MAX_WORD_LEN {
            return Err(RouterOsError::Protocol(format!("word of {} bytes", len)));
        }
        let mut buf = vec![0u8; len];
        reader.read_exact(&mut buf).await?;
        words.push(String::from_utf8_lossy(&buf).into_owned());
    }
}

/// `=key=value` attribute words into a record. Other words are ignored.
fn parse_attributes(words: &[String]) -> Record {
    words
        .iter()
        .filter_map(|word| {
            let rest = word.strip_prefix('=')?;
            let (key, value) = rest.split_once('=')?;
            Some((key.to_string(), value.to_string()))
        })
        .collect()
}

/// Reply to one command.
#[derive(Debug, Default, PartialEq)]
struct Reply {
    items: Vec<Record>,
    done: Record,
}

async fn read_reply<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Reply, RouterOsError> {
    let mut reply = Reply::default();
    loop {
        let sentence = read_sentence(reader).await?;
        let Some(kind) = sentence.first() else {
            continue;
        };
        let attributes = parse_attributes(&sentence[1..]);
        match kind.as_str() {
            "!re" => reply.items.push(attributes),
            "!done" => {
                reply.done = attributes;
                return Ok(reply);
            }
            "!trap" | "!fatal" => {
                let message = attributes
                    .get("message")
                    .cloned()
                    .unwrap_or_else(|| kind.clone());
                // A trap is followed by !done; drain it so the connection stays usable
                if kind == "!trap" {
                    let _ = read_sentence(reader).await;
                }
                return Err(RouterOsError::Trap(message));
            }
            other => debug!(reply = other, "Ignoring unexpected RouterOS reply"),
        }
    }
}

/// Minimal RouterOS API session.
pub struct RouterOsClient {
    stream: TcpStream,
    timeout: Duration,
}

impl RouterOsClient {
    pub async fn connect(host: &str, port: u16, timeout_after: Duration) -> Result<Self, RouterOsError> {
        let stream = timeout(timeout_after, TcpStream::connect((host, port))).await??;
        Ok(Self {
            stream,
            timeout: timeout_after,
        })
    }

    pub async fn login(&mut self, username: &str, password: &str) -> Result<(), RouterOsError> {
        let reply = self
            .call(&[
                "/login".to_string(),
                format!("=name={}", username),
                format!("=password={}", password),
            ])
            .await
            .map_err(|e| match e {
                RouterOsError::Trap(_) => RouterOsError::LoginFailed,
                other => other,
            })?;

        // Pre-6.43 routers answer with an MD5 challenge instead of logging in
        if reply.done.contains_key("ret") {
            warn!("Router requires legacy challenge login, which is not supported");
            return Err(RouterOsError::LoginFailed);
        }
        Ok(())
    }

    /// Run a print-style command and return its items.
    pub async fn command(&mut self, command: &str) -> Result<Vec<Record>, RouterOsError> {
        Ok(self.call(&[command.to_string()]).await?.items)
    }

    async fn call(&mut self, words: &[String]) -> Result<Reply, RouterOsError> {
        let request = encode_sentence(words);
        timeout(self.timeout, self.stream.write_all(&request)).await??;
        timeout(self.timeout, read_reply(&mut self.stream)).await?
    }
}

/// Router management plane over the binary API.
pub struct RouterOsApiProvider {
    credentials: Option<RouterOsCredentials>,
    port: u16,
    timeout: Duration,
}

impl RouterOsApiProvider {
    pub fn new(credentials: Option<RouterOsCredentials>, port: u16) -> Self {
        Self {
            credentials,
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    async fn fetch(
        &self,
        credentials: &RouterOsCredentials,
        range: &Ipv4Network,
    ) -> Result<Vec<Observation>, RouterOsError> {
        let mut client =
            RouterOsClient::connect(&credentials.host, self.port, self.timeout).await?;
        client
            .login(&credentials.username, &credentials.password)
            .await?;
        debug!(host = %credentials.host, "Connected to RouterOS API");

        let leases = client.command("/ip/dhcp-server/lease/print").await?;
        info!(total_leases = leases.len(), "Retrieved DHCP leases");

        let arp = match client.command("/ip/arp/print").await {
            Ok(arp) => arp,
            Err(e) => {
                warn!(error = %e, "Failed to read router ARP table");
                Vec::new()
            }
        };

        let mut hosts = router_observations(&leases, &arp, DiscoveryMethod::RouterOsApi, range);
        match client.command("/ip/dhcp-server/print").await {
            Ok(servers) => add_dhcp_servers(&mut hosts, &servers, DiscoveryMethod::RouterOsApi, range),
            Err(e) => debug!(error = %e, "Failed to read DHCP server list"),
        }
        Ok(hosts)
    }
}

#[async_trait]
impl DiscoveryProvider for RouterOsApiProvider {
    fn method(&self) -> DiscoveryMethod {
        DiscoveryMethod::RouterOsApi
    }

    async fn discover(&self, range: &Ipv4Network) -> Vec<Observation> {
        let Some(credentials) = &self.credentials else {
            debug!("RouterOS API discovery skipped, credentials not configured");
            return Vec::new();
        };

        info!(host = %credentials.host, port = self.port, network = %range, "Starting RouterOS API discovery");
        match self.fetch(credentials, range).await {
            Ok(hosts) => {
                info!(hosts_found = hosts.len(), "RouterOS API discovery completed");
                hosts
            }
            Err(e) => {
                error!(error = %e, "RouterOS API discovery failed");
                Vec::new()
            }
        }
    }
}
