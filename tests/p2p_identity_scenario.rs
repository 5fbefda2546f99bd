use std::sync::Arc;

use xplorer_server::main_thread::MainThread;
use xplorer_server::router::Router;
use xplorer_server::transport::p2p::{P2pConfig, P2pTransport};
use xplorer_server::transport::Transport;

fn config(storage_path: std::path::PathBuf) -> P2pConfig {
    P2pConfig {
        storage_path,
        force_new_identity: false,
        preloaded_secret_key: None,
    }
}

#[tokio::test]
async fn identity_survives_restart_and_resets_on_demand() {
    let dir = tempfile::tempdir().unwrap();
    let router = Arc::new(Router::new("root", Arc::new(MainThread::spawn())));

    let transport = P2pTransport::new(config(dir.path().to_path_buf()));
    transport.start(router.clone()).await.unwrap();
    let first_identity = transport.node_identity().unwrap();
    transport.stop().await.unwrap();

    let exported = transport.export_secret_key().unwrap().unwrap();

    transport.reset_identity().unwrap();
    transport.start(router.clone()).await.unwrap();
    let second_identity = transport.node_identity().unwrap();
    transport.stop().await.unwrap();
    assert_ne!(first_identity, second_identity);

    transport.import_secret_key(&exported).unwrap();
    transport.start(router.clone()).await.unwrap();
    let restored_identity = transport.node_identity().unwrap();
    transport.stop().await.unwrap();
    assert_eq!(first_identity, restored_identity);
}
