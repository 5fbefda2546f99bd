use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use xplorer_server::endpoints::register_demo_endpoints;
use xplorer_server::log_store::LogStore;
use xplorer_server::main_thread::MainThread;
use xplorer_server::message::Request;
use xplorer_server::router::{Parameter, Router};
use xplorer_server::server::Server;
use xplorer_server::transport::http::HttpTransport;

async fn start_demo_server() -> (Server, SocketAddr) {
    let main_thread = Arc::new(MainThread::spawn());
    let mut router = Router::new("root", main_thread.clone());
    let log_store = Arc::new(LogStore::open_in_memory().unwrap());
    let registry = Arc::new(xplorer_server::address::Registry::new());
    register_demo_endpoints(&mut router, main_thread, log_store, registry);
    let router = Arc::new(router);

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let transport = Arc::new(HttpTransport::new(addr));
    let server = Server::new(router).with_transport(transport.clone());
    server.start().await.unwrap();
    let bound_addr = transport.local_addr().await.unwrap();
    (server, bound_addr)
}

async fn get(addr: SocketAddr, path: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream
        .write_all(format!("GET {path} HTTP/1.1\r\nHost: localhost\r\n\r\n").as_bytes())
        .await
        .unwrap();
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();
    let mut parts = text.splitn(2, "\r\n\r\n");
    let head = parts.next().unwrap();
    let body = parts.next().unwrap_or("").to_string();
    let status_line = head.lines().next().unwrap();
    let code: u16 = status_line.split_whitespace().nth(1).unwrap().parse().unwrap();
    (code, body)
}

#[tokio::test]
async fn http_index_lists_demo_routers() {
    let (server, addr) = start_demo_server().await;

    let (code, body) = get(addr, "/").await;
    assert_eq!(code, 200);

    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert!(value["endpointCount"].as_u64().unwrap() >= 1);
    let paths: Vec<&str> = value["routers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["path"].as_str().unwrap())
        .collect();
    for expected in ["/files", "/hierarchy", "/userdefaults", "/permissions"] {
        assert!(paths.contains(&expected), "missing {expected} in {paths:?}");
    }

    server.stop().await.unwrap();
}

#[tokio::test]
async fn sub_router_not_found_reports_plain_error_body() {
    let (server, addr) = start_demo_server().await;

    let (code, body) = get(addr, "/files/does-not-exist").await;
    assert_eq!(code, 404);
    let value: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(value["error"], "Endpoint not found");

    server.stop().await.unwrap();
}

#[tokio::test]
async fn main_thread_handler_times_out_quickly() {
    let main_thread = Arc::new(MainThread::spawn());
    let mut router = Router::new("root", main_thread.clone());
    router.set_main_thread_timeout(Duration::from_millis(200));
    router.register(
        "/slow",
        "slow handler",
        vec![Parameter::new("n", "unused", false)],
        true,
        Arc::new(|_req| {
            std::thread::sleep(Duration::from_secs(31));
            xplorer_server::message::Response::ok_json(serde_json::json!({}))
        }),
    );

    let started = std::time::Instant::now();
    let response = router.handle(&Request::new("/slow")).await;
    assert!(started.elapsed() < Duration::from_secs(32));
    assert_eq!(response.status, xplorer_server::message::Status::InternalError);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert!(body["error"].as_str().unwrap().contains("timed out"));
}
