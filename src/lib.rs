pub mod address;
pub mod config;
pub mod endpoints;
pub mod log_store;
pub mod main_thread;
pub mod message;
pub mod router;
pub mod server;
pub mod transport;

use std::sync::Arc;

use config::Config;
use log_store::LogStore;
use main_thread::MainThread;
use router::Router;
use server::Server;
use transport::http::HttpTransport;
use transport::p2p::{P2pConfig, P2pTransport};

/// Wires the router, log store, and both transports together and runs them
/// to completion. Split out of `main` so integration tests can drive the
/// whole stack without a process boundary.
pub async fn server_main(config: Config) -> anyhow::Result<()> {
    let main_thread = Arc::new(MainThread::spawn());
    let mut router = Router::new("root", main_thread.clone());

    let log_store_path = log_store::session_db_path(&config.p2p.storage_path, chrono::Utc::now());
    let log_store = Arc::new(LogStore::open(&log_store_path)?);
    let registry = Arc::new(address::Registry::new());

    endpoints::register_demo_endpoints(&mut router, main_thread, log_store, registry);
    let router = Arc::new(router);

    let http_transport = Arc::new(HttpTransport::new(config.http.listen));
    let p2p_transport = Arc::new(P2pTransport::new(P2pConfig {
        storage_path: config.p2p.storage_path.clone(),
        force_new_identity: config.p2p.force_new_identity,
        preloaded_secret_key: None,
    }));

    let server = Server::new(router)
        .with_transport(http_transport)
        .with_transport(p2p_transport.clone());

    server.start().await?;
    if let Some(identity) = p2p_transport.node_identity() {
        log::info!("p2p node identity: {identity}");
    }

    tokio::signal::ctrl_c().await?;
    server.stop().await?;
    Ok(())
}
