//! Discovery cycle orchestration and the background loop.
//!
//! Providers run one at a time in trust order. A cycle can end early once the router
//! management plane has reported enough hosts; whatever was collected is merged and
//! upserted one record at a time. Only one cycle runs at a time, whether it was
//! started by the loop or by a manual request.

use std::cmp::Reverse;
use std::net::Ipv4Addr;
use std::pin::pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;
use serde::Serialize;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::{debug, error, info, warn};

use super::{DiscoveryProvider, local_subnet};
use crate::config::DiscoveryConfig;
use crate::db::HostStore;
use crate::error::DiscoveryError;
use crate::host::merge::merge_hosts;
use crate::host::quality::{method_score, score};
use crate::host::{DiscoveryMethod, Observation};

/// State of the most recent discovery cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "message", rename_all = "lowercase")]
pub enum CycleState {
    Idle,
    Running,
    Error(String),
}

/// Background loop lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    Idle,
    Running,
    Stopping,
}

/// Discovery status for API responses
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryStatus {
    pub cycle: CycleState,
    pub service: ServiceState,
    pub last_run: Option<DateTime<Utc>>,
    pub interval_secs: u64,
    pub last_host_count: usize,
    pub network_range: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MethodInfo {
    pub name: &'static str,
    pub method: DiscoveryMethod,
    pub quality_score: u32,
    pub high_priority: bool,
}

#[derive(Debug)]
struct CycleStatus {
    state: CycleState,
    last_run: Option<DateTime<Utc>>,
    last_host_count: usize,
}

/// Per-cycle options.
#[derive(Debug, Clone, Copy)]
struct CycleOptions {
    range: Ipv4Network,
    early_termination: bool,
}

/// Finds the range to scan when none is configured.
pub type SubnetLookup = Box<dyn Fn() -> Result<Ipv4Network, DiscoveryError> + Send + Sync>;

pub struct DiscoveryService {
    providers: Vec<Arc<dyn DiscoveryProvider>>,
    subnet_lookup: SubnetLookup,
    store: Arc<dyn HostStore>,
    config: DiscoveryConfig,
    cycle: RwLock<CycleStatus>,
    cycle_guard: Mutex<()>,
    lifecycle: RwLock<ServiceState>,
    stop: Notify,
}

impl DiscoveryService {
    /// Providers are ordered by trust, most authoritative first, regardless of input order.
    pub fn new(
        mut providers: Vec<Arc<dyn DiscoveryProvider>>,
        store: Arc<dyn HostStore>,
        config: DiscoveryConfig,
    ) -> Self {
        providers.sort_by_key(|p| Reverse(method_score(p.method())));
        Self {
            providers,
            subnet_lookup: Box::new(local_subnet),
            store,
            config,
            cycle: RwLock::new(CycleStatus {
                state: CycleState::Idle,
                last_run: None,
                last_host_count: 0,
            }),
            cycle_guard: Mutex::new(()),
            lifecycle: RwLock::new(ServiceState::Idle),
            stop: Notify::new(),
        }
    }

    pub fn with_subnet_lookup(
        mut self,
        lookup: impl Fn() -> Result<Ipv4Network, DiscoveryError> + Send + Sync + 'static,
    ) -> Self {
        self.subnet_lookup = Box::new(lookup);
        self
    }

    pub fn store(&self) -> &Arc<dyn HostStore> {
        &self.store
    }

    /// Providers in the order a cycle runs them.
    pub fn methods(&self) -> Vec<MethodInfo> {
        self.providers
            .iter()
            .map(|p| MethodInfo {
                name: p.name(),
                method: p.method(),
                quality_score: method_score(p.method()),
                high_priority: p.method().is_high_priority(),
            })
            .collect()
    }

    pub async fn status(&self) -> DiscoveryStatus {
        let cycle = self.cycle.read().await;
        DiscoveryStatus {
            cycle: cycle.state.clone(),
            service: *self.lifecycle.read().await,
            last_run: cycle.last_run,
            interval_secs: self.config.interval.as_secs(),
            last_host_count: cycle.last_host_count,
            network_range: self.config.network_range.map(|r| r.to_string()),
        }
    }

    /// Start the periodic discovery loop on the current runtime.
    pub async fn start(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        {
            let mut lifecycle = self.lifecycle.write().await;
            match *lifecycle {
                ServiceState::Running => return Err(DiscoveryError::AlreadyRunning),
                ServiceState::Stopping => return Err(DiscoveryError::Stopping),
                ServiceState::Idle => *lifecycle = ServiceState::Running,
            }
        }

        info!(
            interval_secs = self.config.interval.as_secs(),
            providers = self.providers.len(),
            "Starting discovery service"
        );
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_loop().await });
        Ok(())
    }

    /// Ask the loop to exit. A cycle already in progress runs to completion.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if *lifecycle == ServiceState::Running {
            *lifecycle = ServiceState::Stopping;
            info!("Stopping discovery service");
            self.stop.notify_waiters();
        }
    }

    async fn run_loop(self: Arc<Self>) {
        loop {
            let mut stopped = pin!(self.stop.notified());
            stopped.as_mut().enable();
            if *self.lifecycle.read().await != ServiceState::Running {
                break;
            }

            let delay = match self.cycle_guard.try_lock() {
                Ok(_guard) => match self.run_cycle(self.config.early_termination).await {
                    Ok(_) => self.config.interval,
                    Err(e) => {
                        error!(error = %e, backoff_secs = self.config.error_backoff.as_secs(), "Discovery cycle failed");
                        self.config.error_backoff
                    }
                },
                Err(_) => {
                    debug!("Discovery cycle already running, skipping tick");
                    self.config.interval
                }
            };

            if *self.lifecycle.read().await != ServiceState::Running {
                break;
            }
            tokio::select! {
                _ = stopped => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        *self.lifecycle.write().await = ServiceState::Idle;
        info!("Discovery service stopped");
    }

    /// Run one cycle now and return the canonical records it produced.
    pub async fn run_discovery(&self) -> Result<Vec<Observation>, DiscoveryError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| DiscoveryError::CycleInProgress)?;
        self.run_cycle(self.config.early_termination).await
    }

    /// Run one cycle now with every provider, ignoring early termination.
    pub async fn force_discovery(&self) -> Result<Vec<Observation>, DiscoveryError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| DiscoveryError::CycleInProgress)?;
        self.run_cycle(false).await
    }

    /// Query one address with every provider and store the best record found.
    pub async fn discover_single_host(
        &self,
        ip: Ipv4Addr,
    ) -> Result<Option<Observation>, DiscoveryError> {
        let _guard = self
            .cycle_guard
            .try_lock()
            .map_err(|_| DiscoveryError::CycleInProgress)?;
        let range = Ipv4Network::new(ip, 32).map_err(|_| DiscoveryError::InvalidRange(ip.to_string()))?;

        info!(ip = %ip, "Discovering single host");
        let observations = self
            .collect(CycleOptions {
                range,
                early_termination: false,
            })
            .await;

        let now = Utc::now();
        let best = merge_hosts(observations)
            .into_iter()
            .filter(|host| host.ip_address == ip)
            .max_by_key(score);

        let Some(mut host) = best else {
            info!(ip = %ip, "Host not found by any provider");
            return Ok(None);
        };
        host.last_seen = Some(now);

        // The response reflects this discovery only, not the stored history
        if let Err(e) = self.store.upsert_merge(host.clone()).await {
            warn!(ip = %ip, error = %e, "Failed to store discovered host");
        }
        Ok(Some(host))
    }

    fn resolve_range(&self) -> Result<Ipv4Network, DiscoveryError> {
        match self.config.network_range {
            Some(range) => Ok(range),
            None => (self.subnet_lookup)(),
        }
    }

    /// One full cycle. Caller holds the cycle guard.
    async fn run_cycle(&self, early_termination: bool) -> Result<Vec<Observation>, DiscoveryError> {
        self.cycle.write().await.state = CycleState::Running;

        let range = match self.resolve_range() {
            Ok(range) => range,
            Err(e) => {
                self.cycle.write().await.state = CycleState::Error(e.to_string());
                return Err(e);
            }
        };

        info!(range = %range, early_termination, "Starting discovery cycle");
        let observations = self
            .collect(CycleOptions {
                range,
                early_termination,
            })
            .await;
        let raw_count = observations.len();

        let now = Utc::now();
        let mut hosts = merge_hosts(observations);
        for host in &mut hosts {
            host.last_seen = Some(now);
        }

        let mut stored = 0;
        for host in &hosts {
            match self.store.upsert_merge(host.clone()).await {
                Ok(_) => stored += 1,
                Err(e) => warn!(ip = %host.ip_address, error = %e, "Failed to store host"),
            }
        }

        if let Err(e) = self.store.purge_expired(self.config.host_ttl).await {
            warn!(error = %e, "Failed to purge expired hosts");
        }

        info!(
            observations = raw_count,
            hosts = hosts.len(),
            stored,
            "Discovery cycle completed"
        );

        let mut cycle = self.cycle.write().await;
        cycle.state = CycleState::Idle;
        cycle.last_run = Some(now);
        cycle.last_host_count = hosts.len();

        Ok(hosts)
    }

    /// Query providers in trust order and gather their observations.
    async fn collect(&self, options: CycleOptions) -> Vec<Observation> {
        let threshold = self.config.min_hosts_threshold;
        let mut observations: Vec<Observation> = Vec::new();
        let mut high_priority_count = 0;

        for provider in &self.providers {
            let found = run_provider(Arc::clone(provider), options.range).await;
            let before = observations.len();

            for mut observation in found {
                if !options.range.contains(observation.ip_address) {
                    debug!(
                        provider = provider.name(),
                        ip = %observation.ip_address,
                        "Skipping observation outside range"
                    );
                    continue;
                }
                observation.inference_confidence =
                    observation.inference_confidence.map(|c| c.min(100));
                observations.push(observation);
            }

            let contributed = observations.len() - before;
            if provider.method().is_high_priority() {
                high_priority_count += contributed;
            }
            debug!(
                provider = provider.name(),
                contributed,
                total = observations.len(),
                "Provider finished"
            );

            if options.early_termination
                && high_priority_count >= threshold
                && observations.len() >= threshold
            {
                info!(
                    high_priority_count,
                    total = observations.len(),
                    threshold,
                    "Early termination, skipping remaining providers"
                );
                break;
            }
        }

        observations
    }
}

/// Run one provider in its own task so a panic costs only its observations.
async fn run_provider(provider: Arc<dyn DiscoveryProvider>, range: Ipv4Network) -> Vec<Observation> {
    let name = provider.name();
    match tokio::spawn(async move { provider.discover(&range).await }).await {
        Ok(found) => found,
        Err(e) => {
            error!(provider = name, error = %e, "Provider failed");
            Vec::new()
        }
    }
}
