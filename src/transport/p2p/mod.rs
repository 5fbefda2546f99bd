//! P2P transport: a QUIC/ALPN endpoint (via `iroh`) that frames one
//! request/response per bidirectional stream, identified by a persistent
//! Ed25519 node identity rather than a host/port pair.

mod identity;
mod wire;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use data_encoding::HEXLOWER;
use iroh::endpoint::presets;
use iroh::protocol::{AcceptError, ProtocolHandler};
use iroh::{Endpoint, SecretKey};
use parking_lot::Mutex;

use crate::message::Response;
use crate::router::Router;
use crate::transport::Transport;

pub const ALPN: &[u8] = b"app-xplorer/1";

/// How long to wait for relay connectivity before serving on direct
/// addresses alone. A debug server must not hang startup on an
/// unreachable relay.
const RELAY_WAIT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct P2pConfig {
    pub storage_path: PathBuf,
    pub force_new_identity: bool,
    pub preloaded_secret_key: Option<[u8; 32]>,
}

struct RunningState {
    endpoint: Endpoint,
    protocol_router: iroh::protocol::Router,
}

pub struct P2pTransport {
    config: P2pConfig,
    state: Mutex<Option<RunningState>>,
}

impl P2pTransport {
    pub fn new(config: P2pConfig) -> Self {
        Self {
            config,
            state: Mutex::new(None),
        }
    }

    /// Hex-rendered node identity, the contract clients connect by. `None`
    /// while stopped.
    pub fn node_identity(&self) -> Option<String> {
        self.state
            .lock()
            .as_ref()
            .map(|s| HEXLOWER.encode(s.endpoint.id().as_bytes()))
    }

    pub fn export_secret_key(&self) -> anyhow::Result<Option<[u8; 32]>> {
        identity::export(&self.config.storage_path)
    }

    pub fn import_secret_key(&self, key_bytes: &[u8]) -> anyhow::Result<()> {
        anyhow::ensure!(self.state.lock().is_none(), "cannot import while running");
        identity::import(&self.config.storage_path, key_bytes)
    }

    pub fn reset_identity(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.state.lock().is_none(), "cannot reset while running");
        identity::reset(&self.config.storage_path)
    }
}

#[async_trait]
impl Transport for P2pTransport {
    async fn start(&self, router: Arc<Router>) -> anyhow::Result<()> {
        if self.state.lock().is_some() {
            return Ok(());
        }

        std::fs::create_dir_all(&self.config.storage_path)?;
        if self.config.force_new_identity {
            identity::reset(&self.config.storage_path)?;
        }

        let secret_key = match &self.config.preloaded_secret_key {
            Some(bytes) => SecretKey::from_bytes(bytes),
            None => identity::load_or_generate(&self.config.storage_path)?,
        };

        let endpoint = Endpoint::builder(presets::N0)
            .secret_key(secret_key)
            .alpns(vec![ALPN.to_vec()])
            .bind()
            .await?;

        if tokio::time::timeout(RELAY_WAIT_TIMEOUT, endpoint.online())
            .await
            .is_err()
        {
            log::warn!("p2p transport: no relay reachable after {RELAY_WAIT_TIMEOUT:?}, continuing on direct addresses only");
        }

        let handler = RequestHandler { router };
        let protocol_router = iroh::protocol::Router::builder(endpoint.clone())
            .accept(ALPN, handler)
            .spawn();

        log::info!("p2p transport online, node identity {}", HEXLOWER.encode(endpoint.id().as_bytes()));

        *self.state.lock() = Some(RunningState {
            endpoint,
            protocol_router,
        });
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        let state = self.state.lock().take();
        if let Some(state) = state {
            state.protocol_router.shutdown().await?;
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.state.lock().is_some()
    }
}

#[derive(Clone)]
struct RequestHandler {
    router: Arc<Router>,
}

impl std::fmt::Debug for RequestHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestHandler").finish_non_exhaustive()
    }
}

impl ProtocolHandler for RequestHandler {
    async fn accept(&self, connection: iroh::endpoint::Connection) -> Result<(), AcceptError> {
        loop {
            let (send, recv) = match connection.accept_bi().await {
                Ok(streams) => streams,
                Err(_) => {
                    log::debug!("p2p connection closed");
                    break;
                }
            };

            let router = self.router.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_stream(router, send, recv).await {
                    log::debug!("p2p stream aborted: {err:#}");
                }
            });
        }
        Ok(())
    }
}

async fn serve_stream(
    router: Arc<Router>,
    mut send: iroh::endpoint::SendStream,
    mut recv: iroh::endpoint::RecvStream,
) -> anyhow::Result<()> {
    serve_framed(&router, &mut recv, &mut send).await?;
    send.finish()?;
    Ok(())
}

/// Reads one framed request and writes one framed response. Transport-agnostic
/// over the stream halves so it can be exercised with in-memory duplex pipes
/// as well as real QUIC streams.
async fn serve_framed<R, W>(router: &Arc<Router>, recv: &mut R, send: &mut W) -> anyhow::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    let frame = wire::read_frame(recv).await?;

    let response = match serde_json::from_slice::<wire::WireRequest>(&frame)
        .map_err(anyhow::Error::from)
        .and_then(wire::WireRequest::into_request)
    {
        Ok(request) => router.handle(&request).await,
        Err(err) => Response::bad_request(err.to_string()),
    };

    let wire_response = wire::WireResponse::from(&response);
    let encoded = serde_json::to_vec(&wire_response)?;
    wire::write_frame(send, &encoded).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::main_thread::MainThread;
    use crate::message::{Response, Status};
    use crate::router::Router;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn demo_router() -> Arc<Router> {
        let main_thread = Arc::new(MainThread::spawn());
        let mut router = Router::new("root", main_thread.clone());
        router.register(
            "/info",
            "info",
            vec![],
            false,
            Arc::new(|_req| Response::ok_json(serde_json::json!({ "ok": true }))),
        );
        Arc::new(router)
    }

    #[tokio::test]
    async fn echoes_a_framed_request_over_a_duplex_stream() {
        let router = demo_router();
        let (mut client, server_stream) = tokio::io::duplex(4096);
        let (mut server_read, mut server_write) = tokio::io::split(server_stream);

        let serving = tokio::spawn(async move { serve_framed(&router, &mut server_read, &mut server_write).await });

        let body = br#"{"path":"/info"}"#;
        client.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        client.write_all(body).await.unwrap();

        let mut len_buf = [0u8; 4];
        client.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut frame = vec![0u8; len];
        client.read_exact(&mut frame).await.unwrap();

        serving.await.unwrap().unwrap();

        let wire: wire::WireResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(wire.status, Status::Ok.code());
        let decoded = wire.into_response();
        let body: serde_json::Value = serde_json::from_slice(&decoded.body).unwrap();
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn oversize_frame_is_rejected_without_blocking_later_streams() {
        let router = demo_router();
        let (mut client, server_stream) = tokio::io::duplex(4096);
        let (server_read, server_write) = tokio::io::split(server_stream);

        let oversize_len: u32 = 117 * 1024 * 1024;
        client.write_all(&oversize_len.to_be_bytes()).await.unwrap();
        drop(client);

        let (mut server_read, mut server_write) = (server_read, server_write);
        let result = serve_framed(&router, &mut server_read, &mut server_write).await;
        assert!(result.is_err());

        let (mut client2, server_stream2) = tokio::io::duplex(4096);
        let (mut server_read2, mut server_write2) = tokio::io::split(server_stream2);
        let serving =
            tokio::spawn(async move { serve_framed(&router, &mut server_read2, &mut server_write2).await });

        let body = br#"{"path":"/info"}"#;
        client2.write_all(&(body.len() as u32).to_be_bytes()).await.unwrap();
        client2.write_all(body).await.unwrap();

        let mut len_buf = [0u8; 4];
        client2.read_exact(&mut len_buf).await.unwrap();
        let len = u32::from_be_bytes(len_buf) as usize;
        let mut frame = vec![0u8; len];
        client2.read_exact(&mut frame).await.unwrap();
        serving.await.unwrap().unwrap();

        let wire: wire::WireResponse = serde_json::from_slice(&frame).unwrap();
        assert_eq!(wire.status, Status::Ok.code());
    }
}
