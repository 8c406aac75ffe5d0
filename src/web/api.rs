use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use actix_web::web::{Data, Json, Path, Query, ServiceConfig};
use actix_web::{HttpResponse, Responder, delete, get, post, put};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::AppState;
use crate::error::DiscoveryError;
use crate::host::quality::{self, FIELD_BONUSES};
use crate::host::{DiscoveryMethod, HostStatus, HostUpdate, Observation, has_value};
use crate::wol::WolRequest;

const DEFAULT_HOST_LIMIT: usize = 100;
const MAX_HOST_LIMIT: usize = 1000;

pub fn configure(cfg: &mut ServiceConfig) {
    cfg.service(health)
        .service(list_hosts)
        .service(wol_registered_hosts)
        .service(get_host)
        .service(update_host)
        .service(delete_host)
        .service(host_status)
        .service(register_wol)
        .service(unregister_wol)
        .service(discovery_status)
        .service(discovery_methods)
        .service(discovery_statistics)
        .service(start_discovery)
        .service(stop_discovery)
        .service(run_discovery)
        .service(discover_host)
        .service(wake)
        .service(wakeable_hosts)
        .service(wake_by_mac)
        .service(wake_by_ip)
        .service(host_quality_scores)
        .service(host_quality_score)
        .service(method_quality_scores);
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: impl Into<String>) -> HttpResponse {
    builder.json(json!({ "error": message.into() }))
}

fn parse_ip(raw: &str) -> Result<Ipv4Addr, HttpResponse> {
    raw.parse().map_err(|_| {
        error_response(
            HttpResponse::BadRequest(),
            format!("'{}' is not an IPv4 address", raw),
        )
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    database: &'static str,
    hosts: Option<usize>,
}

#[get("/health")]
pub async fn health(state: Data<AppState>) -> impl Responder {
    match state.discovery.store().count().await {
        Ok(hosts) => HttpResponse::Ok().json(HealthResponse {
            status: "healthy",
            database: "connected",
            hosts: Some(hosts),
        }),
        Err(e) => {
            error!(error = %e, "Health check failed");
            HttpResponse::ServiceUnavailable().json(HealthResponse {
                status: "unhealthy",
                database: "error",
                hosts: None,
            })
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HostQuery {
    status: Option<HostStatus>,
    wol_enabled: Option<bool>,
    limit: Option<usize>,
}

fn filter_hosts(hosts: Vec<Observation>, query: &HostQuery) -> Vec<Observation> {
    hosts
        .into_iter()
        .filter(|h| query.status.is_none_or(|s| h.status == s))
        .filter(|h| query.wol_enabled.is_none_or(|w| h.wol_enabled == w))
        .take(query.limit.unwrap_or(DEFAULT_HOST_LIMIT))
        .collect()
}

#[get("/api/v1/hosts")]
pub async fn list_hosts(state: Data<AppState>, query: Query<HostQuery>) -> impl Responder {
    if let Some(limit) = query.limit
        && !(1..=MAX_HOST_LIMIT).contains(&limit)
    {
        return error_response(
            HttpResponse::BadRequest(),
            format!("limit must be between 1 and {}", MAX_HOST_LIMIT),
        );
    }

    match state.discovery.store().all().await {
        Ok(hosts) => HttpResponse::Ok().json(filter_hosts(hosts, &query)),
        Err(e) => {
            error!(error = %e, "Failed to list hosts");
            error_response(HttpResponse::InternalServerError(), "Failed to retrieve hosts")
        }
    }
}

#[get("/api/v1/hosts/{ip}")]
pub async fn get_host(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    match state.discovery.store().get(ip).await {
        Ok(Some(host)) => HttpResponse::Ok().json(host),
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to read host");
            error_response(HttpResponse::InternalServerError(), "Failed to retrieve host")
        }
    }
}

#[delete("/api/v1/hosts/{ip}")]
pub async fn delete_host(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    match state.discovery.store().delete(ip).await {
        Ok(true) => {
            info!(ip = %ip, "Host deleted");
            HttpResponse::Ok().json(json!({ "message": "Host deleted", "ip_address": ip }))
        }
        Ok(false) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to delete host");
            error_response(HttpResponse::InternalServerError(), "Failed to delete host")
        }
    }
}

#[put("/api/v1/hosts/{ip}")]
pub async fn update_host(
    state: Data<AppState>,
    path: Path<String>,
    body: Json<HostUpdate>,
) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let changes = body.into_inner();
    if changes.is_empty() {
        return error_response(HttpResponse::BadRequest(), "No update data provided");
    }
    match state.discovery.store().update(ip, changes).await {
        Ok(Some(host)) => {
            info!(ip = %ip, "Host updated");
            HttpResponse::Ok().json(host)
        }
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to update host");
            error_response(HttpResponse::InternalServerError(), "Failed to update host")
        }
    }
}

#[get("/api/v1/hosts/wol-registered")]
pub async fn wol_registered_hosts(state: Data<AppState>) -> impl Responder {
    match state.discovery.store().all().await {
        Ok(hosts) => {
            let total_hosts = hosts.len();
            let registered: Vec<Observation> = hosts.into_iter().filter(|h| h.wol_enabled).collect();
            HttpResponse::Ok().json(json!({
                "count": registered.len(),
                "total_hosts": total_hosts,
                "hosts": registered,
            }))
        }
        Err(e) => {
            error!(error = %e, "Failed to list WOL registered hosts");
            error_response(
                HttpResponse::InternalServerError(),
                "Failed to retrieve WOL registered hosts",
            )
        }
    }
}

#[get("/api/v1/hosts/{ip}/status")]
pub async fn host_status(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    match state.discovery.store().get(ip).await {
        Ok(Some(host)) => HttpResponse::Ok().json(json!({
            "ip_address": host.ip_address,
            "status": host.status,
            "last_seen": host.last_seen,
            "wol_enabled": host.wol_enabled,
        })),
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to read host status");
            error_response(HttpResponse::InternalServerError(), "Failed to retrieve host status")
        }
    }
}

#[post("/api/v1/hosts/{ip}/register-wol")]
pub async fn register_wol(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let store = state.discovery.store();
    let host = match store.get(ip).await {
        Ok(Some(host)) => host,
        Ok(None) => return error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to read host");
            return error_response(HttpResponse::InternalServerError(), "Failed to register host for WOL");
        }
    };
    if !has_value(&host.mac_address) {
        return error_response(
            HttpResponse::BadRequest(),
            "Host must have a MAC address to register for WOL",
        );
    }

    let changes = HostUpdate {
        wol_enabled: Some(true),
        ..HostUpdate::default()
    };
    match store.update(ip, changes).await {
        Ok(Some(host)) => {
            info!(ip = %ip, mac = ?host.mac_address, "Host registered for WOL");
            HttpResponse::Ok().json(json!({
                "message": format!("Host {} registered for Wake-on-LAN", ip),
                "ip_address": ip,
                "mac_address": host.mac_address,
                "wol_enabled": true,
            }))
        }
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to register host for WOL");
            error_response(HttpResponse::InternalServerError(), "Failed to register host for WOL")
        }
    }
}

#[post("/api/v1/hosts/{ip}/unregister-wol")]
pub async fn unregister_wol(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    let changes = HostUpdate {
        wol_enabled: Some(false),
        ..HostUpdate::default()
    };
    match state.discovery.store().update(ip, changes).await {
        Ok(Some(_)) => {
            info!(ip = %ip, "Host unregistered from WOL");
            HttpResponse::Ok().json(json!({
                "message": format!("Host {} unregistered from Wake-on-LAN", ip),
                "ip_address": ip,
                "wol_enabled": false,
            }))
        }
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to unregister host from WOL");
            error_response(
                HttpResponse::InternalServerError(),
                "Failed to unregister host from WOL",
            )
        }
    }
}

#[get("/api/v1/discovery/status")]
pub async fn discovery_status(state: Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.discovery.status().await)
}

#[get("/api/v1/discovery/methods")]
pub async fn discovery_methods(state: Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(json!({ "methods": state.discovery.methods() }))
}

#[derive(Debug, Default, Serialize)]
struct DiscoveryStatistics {
    total_hosts: usize,
    by_discovery_method: BTreeMap<String, usize>,
    by_status: BTreeMap<String, usize>,
    by_device_type: BTreeMap<String, usize>,
}

fn statistics(hosts: &[Observation]) -> DiscoveryStatistics {
    let mut stats = DiscoveryStatistics {
        total_hosts: hosts.len(),
        ..DiscoveryStatistics::default()
    };
    for host in hosts {
        *stats
            .by_discovery_method
            .entry(host.discovery_method.to_string())
            .or_default() += 1;
        *stats.by_status.entry(host.status.to_string()).or_default() += 1;
        let device_type = host.device_type.as_deref().unwrap_or("unknown");
        *stats.by_device_type.entry(device_type.to_string()).or_default() += 1;
    }
    stats
}

#[get("/api/v1/discovery/statistics")]
pub async fn discovery_statistics(state: Data<AppState>) -> impl Responder {
    match state.discovery.store().all().await {
        Ok(hosts) => HttpResponse::Ok().json(statistics(&hosts)),
        Err(e) => {
            error!(error = %e, "Failed to compute discovery statistics");
            error_response(
                HttpResponse::InternalServerError(),
                "Failed to retrieve discovery statistics",
            )
        }
    }
}

#[post("/api/v1/discovery/start")]
pub async fn start_discovery(state: Data<AppState>) -> impl Responder {
    match state.discovery.start().await {
        Ok(()) => HttpResponse::Ok().json(json!({ "message": "Discovery service started" })),
        Err(e @ (DiscoveryError::AlreadyRunning | DiscoveryError::Stopping)) => {
            error_response(HttpResponse::Conflict(), e.to_string())
        }
        Err(e) => error_response(HttpResponse::InternalServerError(), e.to_string()),
    }
}

#[post("/api/v1/discovery/stop")]
pub async fn stop_discovery(state: Data<AppState>) -> impl Responder {
    state.discovery.stop().await;
    HttpResponse::Ok().json(json!({ "message": "Discovery service stopping" }))
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    force: bool,
}

#[post("/api/v1/discovery/run")]
pub async fn run_discovery(state: Data<AppState>, query: Query<RunQuery>) -> impl Responder {
    let result = if query.force {
        state.discovery.force_discovery().await
    } else {
        state.discovery.run_discovery().await
    };
    match result {
        Ok(hosts) => HttpResponse::Ok().json(hosts),
        Err(e @ DiscoveryError::CycleInProgress) => {
            error_response(HttpResponse::Conflict(), e.to_string())
        }
        Err(e) => {
            error!(error = %e, "Manual discovery failed");
            error_response(HttpResponse::InternalServerError(), e.to_string())
        }
    }
}

#[post("/api/v1/discovery/discover/{ip}")]
pub async fn discover_host(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    match state.discovery.discover_single_host(ip).await {
        Ok(Some(host)) => HttpResponse::Ok().json(host),
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found or not discoverable"),
        Err(e @ DiscoveryError::CycleInProgress) => {
            error_response(HttpResponse::Conflict(), e.to_string())
        }
        Err(e) => error_response(HttpResponse::InternalServerError(), e.to_string()),
    }
}

#[post("/api/v1/wol/wake")]
pub async fn wake(state: Data<AppState>, body: Json<WolRequest>) -> impl Responder {
    let request = body.into_inner();
    let response = state
        .wol
        .wake(request.ip_address, request.mac_address, request.broadcast_address)
        .await;
    HttpResponse::Ok().json(response)
}

#[get("/api/v1/wol/wakeable")]
pub async fn wakeable_hosts(state: Data<AppState>) -> impl Responder {
    match state.discovery.store().all().await {
        Ok(hosts) => {
            let wakeable: Vec<Observation> = hosts
                .into_iter()
                .filter(|h| h.wol_enabled && h.mac_address.as_deref().is_some_and(|m| !m.is_empty()))
                .collect();
            HttpResponse::Ok().json(wakeable)
        }
        Err(e) => {
            error!(error = %e, "Failed to list wakeable hosts");
            error_response(HttpResponse::InternalServerError(), "Failed to retrieve wakeable hosts")
        }
    }
}

#[post("/api/v1/wol/wake/mac/{mac}")]
pub async fn wake_by_mac(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let response = state.wol.wake(None, Some(path.into_inner()), None).await;
    HttpResponse::Ok().json(response)
}

#[post("/api/v1/wol/wake/{ip}")]
pub async fn wake_by_ip(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    HttpResponse::Ok().json(state.wol.wake(Some(ip), None, None).await)
}

fn quality_report(host: &Observation) -> serde_json::Value {
    json!({
        "ip_address": host.ip_address,
        "discovery_method": host.discovery_method,
        "method_quality_score": quality::method_score(host.discovery_method),
        "total_quality_score": quality::score(host),
        "hostname": host.hostname,
        "mac_address": host.mac_address,
        "vendor": host.vendor,
        "device_type": host.device_type,
        "os_info": host.os_info,
        "has_mac": has_value(&host.mac_address),
        "has_hostname": has_value(&host.hostname),
        "has_vendor": has_value(&host.vendor),
        "has_os_info": has_value(&host.os_info),
        "os_info_length": host.os_info.as_deref().map_or(0, |os| os.chars().count()),
    })
}

#[get("/api/v1/debug/hosts/quality-scores")]
pub async fn host_quality_scores(state: Data<AppState>) -> impl Responder {
    let mut hosts = match state.discovery.store().all().await {
        Ok(hosts) => hosts,
        Err(e) => {
            error!(error = %e, "Failed to score hosts");
            return error_response(
                HttpResponse::InternalServerError(),
                "Failed to get host quality scores",
            );
        }
    };
    hosts.sort_by_key(|h| std::cmp::Reverse(quality::score(h)));

    let average_score = if hosts.is_empty() {
        0.0
    } else {
        hosts.iter().map(|h| f64::from(quality::score(h))).sum::<f64>() / hosts.len() as f64
    };
    let reports: Vec<_> = hosts.iter().map(quality_report).collect();
    HttpResponse::Ok().json(json!({
        "total_hosts": reports.len(),
        "average_score": average_score,
        "hosts": reports,
    }))
}

#[get("/api/v1/debug/hosts/{ip}/quality-score")]
pub async fn host_quality_score(state: Data<AppState>, path: Path<String>) -> impl Responder {
    let ip = match parse_ip(&path) {
        Ok(ip) => ip,
        Err(response) => return response,
    };
    match state.discovery.store().get(ip).await {
        Ok(Some(host)) => HttpResponse::Ok().json(quality_report(&host)),
        Ok(None) => error_response(HttpResponse::NotFound(), "Host not found"),
        Err(e) => {
            error!(ip = %ip, error = %e, "Failed to score host");
            error_response(HttpResponse::InternalServerError(), "Failed to get host quality score")
        }
    }
}

#[get("/api/v1/debug/discovery-methods/quality-scores")]
pub async fn method_quality_scores() -> impl Responder {
    let methods: Vec<_> = DiscoveryMethod::ALL
        .into_iter()
        .map(|m| json!({ "method": m, "quality_score": quality::method_score(m) }))
        .collect();
    let field_scores: BTreeMap<&str, u32> = FIELD_BONUSES.into_iter().collect();
    HttpResponse::Ok().json(json!({
        "methods": methods,
        "field_scores": field_scores,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use actix_web::App;
    use actix_web::test as actix_test;

    use crate::config::DiscoveryConfig;
    use crate::db::{HostStore, SqliteHostStore};
    use crate::discovery::DiscoveryService;
    use crate::host::DiscoveryMethod;
    use crate::wol::WolService;

    async fn state_with(hosts: Vec<Observation>) -> Data<AppState> {
        let store: Arc<dyn HostStore> = Arc::new(SqliteHostStore::open_in_memory().unwrap());
        for host in hosts {
            store.upsert_merge(host).await.unwrap();
        }
        let discovery = Arc::new(DiscoveryService::new(
            Vec::new(),
            Arc::clone(&store),
            DiscoveryConfig::default(),
        ));
        let wol = Arc::new(WolService::new(store, Ipv4Addr::LOCALHOST, 9));
        Data::new(AppState { discovery, wol })
    }

    fn host(last: u8, status: HostStatus) -> Observation {
        Observation::new(Ipv4Addr::new(192, 168, 1, last), DiscoveryMethod::Arp).with_status(status)
    }

    #[test]
    fn test_filter_hosts() {
        let hosts = vec![
            host(1, HostStatus::Online),
            host(2, HostStatus::Offline),
            host(3, HostStatus::Online),
        ];
        let query = HostQuery {
            status: Some(HostStatus::Online),
            wol_enabled: Some(true),
            limit: Some(1),
        };
        let filtered = filter_hosts(hosts, &query);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].ip_address, Ipv4Addr::new(192, 168, 1, 1));
    }

    #[actix_web::test]
    async fn test_get_and_delete_host() {
        let state = state_with(vec![host(7, HostStatus::Online)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts/192.168.1.7").to_request();
        let found: Observation = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(found.status, HostStatus::Online);

        let req = actix_test::TestRequest::delete().uri("/api/v1/hosts/192.168.1.7").to_request();
        assert!(actix_test::call_service(&app, req).await.status().is_success());

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts/192.168.1.7").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts/not-an-ip").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_list_hosts_rejects_bad_limit() {
        let state = state_with(Vec::new()).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = actix_test::TestRequest::get().uri("/api/v1/hosts?limit=0").to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 400);
    }

    #[actix_web::test]
    async fn test_health_and_status() {
        let state = state_with(vec![host(1, HostStatus::Online)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["hosts"], 1);

        let req = actix_test::TestRequest::get().uri("/api/v1/discovery/status").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["service"], "idle");
        assert_eq!(body["cycle"]["state"], "idle");
    }

    #[actix_web::test]
    async fn test_wake_by_ip_without_mac_reports_failure() {
        let state = state_with(vec![host(9, HostStatus::Online)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = actix_test::TestRequest::post().uri("/api/v1/wol/wake/192.168.1.9").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["ip_address"], "192.168.1.9");
    }

    fn with_mac(last: u8) -> Observation {
        host(last, HostStatus::Online).with_mac(format!("AA:BB:CC:DD:EE:{:02X}", last))
    }

    #[test]
    fn test_statistics_counts() {
        let hosts = vec![
            host(1, HostStatus::Online).with_device_type("router"),
            host(2, HostStatus::Offline),
            Observation::new(Ipv4Addr::new(192, 168, 1, 3), DiscoveryMethod::Mdns)
                .with_status(HostStatus::Online),
        ];
        let stats = statistics(&hosts);
        assert_eq!(stats.total_hosts, 3);
        assert_eq!(stats.by_discovery_method["arp"], 2);
        assert_eq!(stats.by_discovery_method["mdns"], 1);
        assert_eq!(stats.by_status["online"], 2);
        assert_eq!(stats.by_device_type["unknown"], 2);
        assert_eq!(stats.by_device_type["router"], 1);
    }

    #[actix_web::test]
    async fn test_update_host_controls_wakeable() {
        let state = state_with(vec![with_mac(20)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::get().uri("/api/v1/wol/wakeable").to_request();
        let wakeable: Vec<Observation> = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(wakeable.len(), 1);

        let req = actix_test::TestRequest::put()
            .uri("/api/v1/hosts/192.168.1.20")
            .set_json(json!({ "wol_enabled": false, "notes": "garage" }))
            .to_request();
        let updated: Observation = actix_test::call_and_read_body_json(&app, req).await;
        assert!(!updated.wol_enabled);
        assert_eq!(updated.notes.as_deref(), Some("garage"));
        assert_eq!(updated.mac_address.as_deref(), Some("AA:BB:CC:DD:EE:14"));

        let req = actix_test::TestRequest::get().uri("/api/v1/wol/wakeable").to_request();
        let wakeable: Vec<Observation> = actix_test::call_and_read_body_json(&app, req).await;
        assert!(wakeable.is_empty());

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts?wol_enabled=false").to_request();
        let listed: Vec<Observation> = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(listed.len(), 1);
        let req = actix_test::TestRequest::get().uri("/api/v1/hosts?wol_enabled=true").to_request();
        let listed: Vec<Observation> = actix_test::call_and_read_body_json(&app, req).await;
        assert!(listed.is_empty());
    }

    #[actix_web::test]
    async fn test_update_host_rejects_empty_and_unknown() {
        let state = state_with(vec![with_mac(20)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::put()
            .uri("/api/v1/hosts/192.168.1.20")
            .set_json(json!({}))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 400);

        let req = actix_test::TestRequest::put()
            .uri("/api/v1/hosts/192.168.1.99")
            .set_json(json!({ "notes": "nobody" }))
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_register_and_unregister_wol() {
        let state = state_with(vec![with_mac(21), host(22, HostStatus::Online)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::post()
            .uri("/api/v1/hosts/192.168.1.21/unregister-wol")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["wol_enabled"], false);

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts/wol-registered").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["total_hosts"], 2);
        assert_eq!(body["hosts"][0]["ip_address"], "192.168.1.22");

        let req = actix_test::TestRequest::post()
            .uri("/api/v1/hosts/192.168.1.22/register-wol")
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 400);

        let req = actix_test::TestRequest::post()
            .uri("/api/v1/hosts/192.168.1.21/register-wol")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["wol_enabled"], true);
        assert_eq!(body["mac_address"], "AA:BB:CC:DD:EE:15");

        let req = actix_test::TestRequest::get().uri("/api/v1/hosts/192.168.1.21/status").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["wol_enabled"], true);
        assert_eq!(body["status"], "online");

        let req = actix_test::TestRequest::post()
            .uri("/api/v1/hosts/192.168.1.99/register-wol")
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);
        let req = actix_test::TestRequest::post()
            .uri("/api/v1/hosts/192.168.1.99/unregister-wol")
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);
    }

    #[actix_web::test]
    async fn test_quality_score_endpoints() {
        let rich = Observation::new(Ipv4Addr::new(192, 168, 1, 31), DiscoveryMethod::RouterOsApi)
            .with_hostname("desktop");
        let state = state_with(vec![with_mac(30), rich]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;

        let req = actix_test::TestRequest::get()
            .uri("/api/v1/debug/hosts/192.168.1.30/quality-score")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["method_quality_score"], 50);
        assert_eq!(body["total_quality_score"], 80);
        assert_eq!(body["has_mac"], true);
        assert_eq!(body["has_hostname"], false);

        let req = actix_test::TestRequest::get()
            .uri("/api/v1/debug/hosts/192.168.1.99/quality-score")
            .to_request();
        assert_eq!(actix_test::call_service(&app, req).await.status(), 404);

        let req = actix_test::TestRequest::get().uri("/api/v1/debug/hosts/quality-scores").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_hosts"], 2);
        assert_eq!(body["hosts"][0]["ip_address"], "192.168.1.31");
        assert_eq!(body["hosts"][0]["total_quality_score"], 125);
        assert_eq!(body["average_score"], 102.5);

        let req = actix_test::TestRequest::get()
            .uri("/api/v1/debug/discovery-methods/quality-scores")
            .to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["methods"][0]["method"], "routeros_api");
        assert_eq!(body["methods"][0]["quality_score"], 100);
        assert_eq!(body["field_scores"]["mac_address"], 20);
    }

    #[actix_web::test]
    async fn test_discovery_statistics_route() {
        let state = state_with(vec![host(1, HostStatus::Online), host(2, HostStatus::Offline)]).await;
        let app = actix_test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = actix_test::TestRequest::get().uri("/api/v1/discovery/statistics").to_request();
        let body: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["total_hosts"], 2);
        assert_eq!(body["by_status"]["offline"], 1);
        assert_eq!(body["by_discovery_method"]["arp"], 2);
    }
}
