//! JSON HTTP API.

pub mod api;

use std::sync::Arc;

use actix_web::middleware::Logger;
use actix_web::web::Data;
use actix_web::{App, HttpServer};
use tokio::task::{self, JoinHandle};
use tracing::info;

use crate::discovery::DiscoveryService;
use crate::wol::WolService;

/// Shared handler state.
pub struct AppState {
    pub discovery: Arc<DiscoveryService>,
    pub wol: Arc<WolService>,
}

/// Run the HTTP server on its own actix system thread. It stops on SIGINT/SIGTERM.
pub fn start(bind: String, port: u16, state: AppState) -> JoinHandle<std::io::Result<()>> {
    let state = Data::new(state);
    task::spawn_blocking(move || {
        let sys = actix_rt::System::new();
        sys.block_on(async move {
            info!(bind = %bind, port, "Starting web server");
            HttpServer::new(move || {
                App::new()
                    .wrap(Logger::default())
                    .app_data(state.clone())
                    .configure(api::configure)
            })
            .bind((bind.as_str(), port))?
            .run()
            .await
        })
    })
}
