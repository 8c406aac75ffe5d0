//! Host storage. One row per IP; writes reconcile with the stored row using the same
//! merge policy as a discovery batch.

use std::net::Ipv4Addr;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use tokio::task;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::host::merge::merge_group;
use crate::host::{DiscoveryMethod, HostStatus, HostUpdate, Observation};

/// Storage collaborator for canonical host records.
#[async_trait]
pub trait HostStore: Send + Sync {
    async fn get(&self, ip: Ipv4Addr) -> Result<Option<Observation>, StoreError>;

    /// Reconcile `host` with the stored record for its IP and persist the result atomically.
    async fn upsert_merge(&self, host: Observation) -> Result<Observation, StoreError>;

    /// Apply an operator edit. Returns the updated record, or `None` when the IP is unknown.
    async fn update(&self, ip: Ipv4Addr, changes: HostUpdate) -> Result<Option<Observation>, StoreError>;

    async fn all(&self) -> Result<Vec<Observation>, StoreError>;

    /// Returns whether a row was removed.
    async fn delete(&self, ip: Ipv4Addr) -> Result<bool, StoreError>;

    /// Drop hosts not seen within `ttl`. Returns the number removed.
    async fn purge_expired(&self, ttl: Duration) -> Result<usize, StoreError>;

    async fn count(&self) -> Result<usize, StoreError>;
}

const CREATE_HOSTS_TABLE: &str = "CREATE TABLE IF NOT EXISTS hosts (
    ip_address TEXT PRIMARY KEY,
    mac_address TEXT,
    hostname TEXT,
    vendor TEXT,
    device_type TEXT,
    os_info TEXT,
    discovery_method TEXT NOT NULL,
    status TEXT NOT NULL,
    last_seen INTEGER,
    wol_enabled INTEGER NOT NULL DEFAULT 1,
    notes TEXT,
    inferred_os TEXT,
    inferred_device_type TEXT,
    inference_confidence INTEGER,
    updated_at INTEGER DEFAULT (strftime('%s', 'now'))
)";

const HOST_COLUMNS: &str = "ip_address, mac_address, hostname, vendor, device_type, os_info, \
    discovery_method, status, last_seen, wol_enabled, notes, inferred_os, \
    inferred_device_type, inference_confidence";

/// Untyped row as read from SQLite, validated by [`RawHost::into_observation`].
struct RawHost {
    ip_address: String,
    mac_address: Option<String>,
    hostname: Option<String>,
    vendor: Option<String>,
    device_type: Option<String>,
    os_info: Option<String>,
    discovery_method: String,
    status: String,
    last_seen: Option<i64>,
    wol_enabled: bool,
    notes: Option<String>,
    inferred_os: Option<String>,
    inferred_device_type: Option<String>,
    inference_confidence: Option<i64>,
}

impl RawHost {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            ip_address: row.get(0)?,
            mac_address: row.get(1)?,
            hostname: row.get(2)?,
            vendor: row.get(3)?,
            device_type: row.get(4)?,
            os_info: row.get(5)?,
            discovery_method: row.get(6)?,
            status: row.get(7)?,
            last_seen: row.get(8)?,
            wol_enabled: row.get(9)?,
            notes: row.get(10)?,
            inferred_os: row.get(11)?,
            inferred_device_type: row.get(12)?,
            inference_confidence: row.get(13)?,
        })
    }

    fn into_observation(self) -> Result<Observation, StoreError> {
        let malformed = |reason: String| StoreError::Malformed {
            ip: self.ip_address.clone(),
            reason,
        };

        let ip_address =
            Ipv4Addr::from_str(&self.ip_address).map_err(|e| malformed(e.to_string()))?;
        let discovery_method = DiscoveryMethod::from_str(&self.discovery_method).map_err(malformed)?;
        let status = HostStatus::from_str(&self.status).map_err(malformed)?;
        let last_seen = match self.last_seen {
            Some(secs) => Some(
                Utc.timestamp_opt(secs, 0)
                    .single()
                    .ok_or_else(|| malformed(format!("bad timestamp {}", secs)))?,
            ),
            None => None,
        };
        let inference_confidence = match self.inference_confidence {
            Some(c) if (0..=100).contains(&c) => Some(c as u8),
            Some(c) => return Err(malformed(format!("confidence {} out of range", c))),
            None => None,
        };

        Ok(Observation {
            ip_address,
            mac_address: self.mac_address,
            hostname: self.hostname,
            vendor: self.vendor,
            device_type: self.device_type,
            os_info: self.os_info,
            discovery_method,
            status,
            last_seen,
            wol_enabled: self.wol_enabled,
            notes: self.notes,
            inferred_os: self.inferred_os,
            inferred_device_type: self.inferred_device_type,
            inference_confidence,
        })
    }
}

fn timestamp(value: Option<DateTime<Utc>>) -> Option<i64> {
    value.map(|t| t.timestamp())
}

fn open_connection(path: &Path) -> Result<Connection, StoreError> {
    let conn = Connection::open(path)?;
    // Pragmas may fail under contention; the store still works without them
    let _ = conn.execute_batch("PRAGMA busy_timeout = 30000;");
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL;");
    let _ = conn.execute_batch("PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn select_host(conn: &Connection, ip: Ipv4Addr) -> Result<Option<RawHost>, StoreError> {
    let sql = format!("SELECT {} FROM hosts WHERE ip_address = ?1", HOST_COLUMNS);
    let raw = conn
        .query_row(&sql, [ip.to_string()], RawHost::from_row)
        .optional()?;
    Ok(raw)
}

fn write_host(conn: &Connection, host: &Observation) -> Result<(), StoreError> {
    conn.execute(
        "INSERT INTO hosts (ip_address, mac_address, hostname, vendor, device_type, os_info,
                discovery_method, status, last_seen, wol_enabled, notes, inferred_os,
                inferred_device_type, inference_confidence, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, strftime('%s', 'now'))
         ON CONFLICT(ip_address) DO UPDATE SET
                mac_address = ?2, hostname = ?3, vendor = ?4, device_type = ?5, os_info = ?6,
                discovery_method = ?7, status = ?8, last_seen = ?9, wol_enabled = ?10,
                notes = ?11, inferred_os = ?12, inferred_device_type = ?13,
                inference_confidence = ?14, updated_at = strftime('%s', 'now')",
        params![
            host.ip_address.to_string(),
            host.mac_address,
            host.hostname,
            host.vendor,
            host.device_type,
            host.os_info,
            host.discovery_method.as_str(),
            host.status.as_str(),
            timestamp(host.last_seen),
            host.wol_enabled,
            host.notes,
            host.inferred_os,
            host.inferred_device_type,
            host.inference_confidence,
        ],
    )?;
    Ok(())
}

/// SQLite-backed [`HostStore`]. Blocking calls run on the blocking pool.
#[derive(Clone)]
pub struct SqliteHostStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteHostStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = open_connection(path)?;
        info!(path = %path.display(), "Opened host database");
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(CREATE_HOSTS_TABLE, [])?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_hosts_last_seen ON hosts (last_seen)",
            [],
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let mut guard = lock(&conn);
            f(&mut guard)
        })
        .await?
    }
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    // A panic mid-statement leaves SQLite consistent, so a poisoned lock is still usable
    conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl HostStore for SqliteHostStore {
    async fn get(&self, ip: Ipv4Addr) -> Result<Option<Observation>, StoreError> {
        self.with_conn(move |conn| {
            select_host(conn, ip)?
                .map(RawHost::into_observation)
                .transpose()
        })
        .await
    }

    async fn upsert_merge(&self, host: Observation) -> Result<Observation, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let ip = host.ip_address;

            let stored = match select_host(&tx, ip)?.map(RawHost::into_observation) {
                Some(Ok(stored)) => Some(stored),
                Some(Err(e)) => {
                    warn!(ip = %ip, error = %e, "Replacing malformed stored host");
                    None
                }
                None => None,
            };

            let merged = match stored {
                Some(stored) => {
                    // WOL registration is operator-owned and survives rediscovery
                    let wol_enabled = stored.wol_enabled;
                    let mut merged = merge_group(vec![stored, host.clone()]).unwrap_or(host);
                    merged.wol_enabled = wol_enabled;
                    merged
                }
                None => host,
            };

            write_host(&tx, &merged)?;
            tx.commit()?;
            debug!(ip = %ip, method = %merged.discovery_method, "Host stored");
            Ok(merged)
        })
        .await
    }

    async fn update(&self, ip: Ipv4Addr, changes: HostUpdate) -> Result<Option<Observation>, StoreError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let Some(raw) = select_host(&tx, ip)? else {
                return Ok(None);
            };
            let mut host = raw.into_observation()?;
            changes.apply(&mut host);
            write_host(&tx, &host)?;
            tx.commit()?;
            debug!(ip = %ip, "Host updated");
            Ok(Some(host))
        })
        .await
    }

    async fn all(&self) -> Result<Vec<Observation>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM hosts ORDER BY ip_address", HOST_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], RawHost::from_row)?;

            let mut hosts = Vec::new();
            for row in rows {
                match row.map_err(StoreError::from).and_then(RawHost::into_observation) {
                    Ok(host) => hosts.push(host),
                    Err(e) => debug!(error = %e, "Skipping unreadable host row"),
                }
            }
            Ok(hosts)
        })
        .await
    }

    async fn delete(&self, ip: Ipv4Addr) -> Result<bool, StoreError> {
        self.with_conn(move |conn| {
            let removed = conn.execute("DELETE FROM hosts WHERE ip_address = ?1", [ip.to_string()])?;
            Ok(removed > 0)
        })
        .await
    }

    async fn purge_expired(&self, ttl: Duration) -> Result<usize, StoreError> {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let cutoff = Utc::now().timestamp().saturating_sub(ttl_secs);
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM hosts WHERE COALESCE(last_seen, updated_at) < ?1",
                [cutoff],
            )?;
            if removed > 0 {
                info!(removed, "Purged expired hosts");
            }
            Ok(removed)
        })
        .await
    }

    async fn count(&self) -> Result<usize, StoreError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM hosts", [], |row| row.get(0))?;
            Ok(count as usize)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn ip(last: u8) -> Ipv4Addr {
        Ipv4Addr::new(192, 168, 1, last)
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        let host = Observation::new(ip(10), DiscoveryMethod::Arp)
            .with_mac("AA:BB:CC:DD:EE:FF")
            .with_status(HostStatus::Online)
            .with_confidence(70);

        store.upsert_merge(host.clone()).await.unwrap();
        let stored = store.get(ip(10)).await.unwrap().unwrap();
        assert_eq!(stored, host);
        assert!(store.get(ip(11)).await.unwrap().is_none());
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_upsert_merges_with_stored_record() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        store
            .upsert_merge(
                Observation::new(ip(5), DiscoveryMethod::Arp)
                    .with_mac("AA:BB:CC:DD:EE:FF")
                    .with_status(HostStatus::Online),
            )
            .await
            .unwrap();

        let merged = store
            .upsert_merge(
                Observation::new(ip(5), DiscoveryMethod::RouterOsApi)
                    .with_hostname("desktop")
                    .with_status(HostStatus::Offline),
            )
            .await
            .unwrap();

        assert_eq!(merged.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:FF"));
        assert_eq!(merged.hostname.as_deref(), Some("desktop"));
        assert_eq!(merged.discovery_method, DiscoveryMethod::RouterOsApi);
        assert_eq!(merged.status, HostStatus::Online);
        assert_eq!(store.get(ip(5)).await.unwrap(), Some(merged));
    }

    #[tokio::test]
    async fn test_malformed_row_is_replaced() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        {
            let conn = lock(&store.conn);
            conn.execute(
                "INSERT INTO hosts (ip_address, discovery_method, status) VALUES (?1, 'carrier_pigeon', 'online')",
                [ip(7).to_string()],
            )
            .unwrap();
        }
        assert!(matches!(
            store.get(ip(7)).await,
            Err(StoreError::Malformed { .. })
        ));
        assert!(store.all().await.unwrap().is_empty());

        let host = Observation::new(ip(7), DiscoveryMethod::Mdns).with_hostname("printer");
        let stored = store.upsert_merge(host.clone()).await.unwrap();
        assert_eq!(stored, host);
    }

    #[tokio::test]
    async fn test_delete_and_all() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        for last in [3, 1, 2] {
            store
                .upsert_merge(Observation::new(ip(last), DiscoveryMethod::Arp))
                .await
                .unwrap();
        }
        assert_eq!(store.all().await.unwrap().len(), 3);
        assert!(store.delete(ip(2)).await.unwrap());
        assert!(!store.delete(ip(2)).await.unwrap());
        assert_eq!(store.all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        let mut stale = Observation::new(ip(20), DiscoveryMethod::Arp);
        stale.last_seen = Some(Utc::now() - ChronoDuration::hours(48));
        let mut fresh = Observation::new(ip(21), DiscoveryMethod::Arp);
        fresh.last_seen = Some(Utc::now());
        store.upsert_merge(stale).await.unwrap();
        store.upsert_merge(fresh).await.unwrap();

        let removed = store
            .purge_expired(Duration::from_secs(24 * 3600))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(ip(20)).await.unwrap().is_none());
        assert!(store.get(ip(21)).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_update_applies_changes() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        store
            .upsert_merge(Observation::new(ip(30), DiscoveryMethod::Arp).with_hostname("tv"))
            .await
            .unwrap();

        let changes = HostUpdate {
            wol_enabled: Some(false),
            notes: Some("living room".to_string()),
            ..HostUpdate::default()
        };
        let updated = store.update(ip(30), changes.clone()).await.unwrap().unwrap();
        assert!(!updated.wol_enabled);
        assert_eq!(updated.notes.as_deref(), Some("living room"));
        assert_eq!(updated.hostname.as_deref(), Some("tv"));
        assert_eq!(store.get(ip(30)).await.unwrap(), Some(updated));

        assert!(store.update(ip(31), changes).await.unwrap().is_none());
        assert!(store.get(ip(31)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_wol_registration_survives_rediscovery() {
        let store = SqliteHostStore::open_in_memory().unwrap();
        store
            .upsert_merge(Observation::new(ip(40), DiscoveryMethod::Arp))
            .await
            .unwrap();
        let changes = HostUpdate {
            wol_enabled: Some(false),
            ..HostUpdate::default()
        };
        store.update(ip(40), changes).await.unwrap();

        let rediscovered = Observation::new(ip(40), DiscoveryMethod::RouterOsApi)
            .with_mac("AA:BB:CC:DD:EE:01")
            .with_hostname("desktop");
        let merged = store.upsert_merge(rediscovered).await.unwrap();
        assert_eq!(merged.discovery_method, DiscoveryMethod::RouterOsApi);
        assert!(!merged.wol_enabled);
    }

    #[tokio::test]
    async fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.db");
        {
            let store = SqliteHostStore::open(&path).unwrap();
            store
                .upsert_merge(Observation::new(ip(9), DiscoveryMethod::NetBios).with_hostname("nas"))
                .await
                .unwrap();
        }
        let reopened = SqliteHostStore::open(&path).unwrap();
        let host = reopened.get(ip(9)).await.unwrap().unwrap();
        assert_eq!(host.hostname.as_deref(), Some("nas"));
    }
}
