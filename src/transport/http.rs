//! Hand-rolled HTTP/1.1 transport: GET-only, one request per connection.
//! Parses the request line and headers directly off the socket rather than
//! pulling in a web framework, since the core only needs to turn bytes into
//! a `Request` and a `Response` back into bytes.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::message::{Request, Response};
use crate::router::Router;
use crate::transport::Transport;

pub struct HttpTransport {
    bind_addr: SocketAddr,
    local_addr: Mutex<Option<SocketAddr>>,
    running: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            local_addr: Mutex::new(None),
            running: Mutex::new(None),
        }
    }

    /// The address actually bound, which may differ from the constructor's
    /// `bind_addr` when that used an ephemeral port (`:0`). `None` until
    /// `start` has run.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock().await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start(&self, router: Arc<Router>) -> anyhow::Result<()> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Ok(());
        }

        let listener = TcpListener::bind(self.bind_addr).await?;
        let bound_addr = listener.local_addr()?;
        *self.local_addr.lock().await = Some(bound_addr);
        log::info!("http transport listening: addr={bound_addr}");

        let handle = tokio::spawn(async move {
            loop {
                let (socket, peer) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        log::warn!("http accept failed: {err:#}");
                        continue;
                    }
                };
                let router = router.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(socket, router).await {
                        log::debug!("http connection from {peer} ended: {err:#}");
                    }
                });
            }
        });

        *running = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.running.lock().await.take() {
            handle.abort();
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
            .try_lock()
            .map(|guard| guard.is_some())
            .unwrap_or(true)
    }
}

async fn serve_connection(socket: tokio::net::TcpStream, router: Arc<Router>) -> anyhow::Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;
    if request_line.is_empty() {
        return Ok(());
    }

    let mut metadata = HashMap::new();
    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 || line.trim().is_empty() {
            break;
        }
        if let Some((key, value)) = line.split_once(':') {
            metadata.insert(key.trim().to_string(), value.trim().to_string());
        }
    }

    let response = match parse_request_line(&request_line) {
        Ok((path, query_params)) => {
            let request = Request::new(path).with_query_params(query_params).with_metadata(metadata);
            router.handle(&request).await
        }
        Err(message) => Response::bad_request(message),
    };

    write_response(&mut write_half, &response).await?;
    Ok(())
}

/// Parses `GET /path?query HTTP/1.1` into `(path, query_params)`. Any other
/// method surfaces as a parse error, which the caller turns into BadRequest.
fn parse_request_line(line: &str) -> Result<(String, HashMap<String, String>), String> {
    let mut parts = line.trim_end().split(' ');
    let method = parts.next().ok_or("empty request line")?;
    let target = parts.next().ok_or("missing request target")?;

    if method != "GET" {
        return Err(format!("unsupported method {method}"));
    }

    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    if path.is_empty() || !path.starts_with('/') {
        return Err("path must be non-empty and begin with /".to_string());
    }

    let path = percent_decode_str(path)
        .decode_utf8()
        .map_err(|_| "path is not valid UTF-8".to_string())?
        .into_owned();

    let mut query_params = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = percent_decode_str(key).decode_utf8_lossy().into_owned();
            let value = percent_decode_str(value).decode_utf8_lossy().into_owned();
            query_params.insert(key, value);
        }
    }

    Ok((path, query_params))
}

async fn write_response<W: AsyncWriteExt + Unpin>(writer: &mut W, response: &Response) -> anyhow::Result<()> {
    let status_line = format!(
        "HTTP/1.1 {} {}\r\n",
        response.status.code(),
        response.status.reason()
    );
    let headers = format!(
        "Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.content_type,
        response.body.len()
    );
    writer.write_all(status_line.as_bytes()).await?;
    writer.write_all(headers.as_bytes()).await?;
    writer.write_all(&response.body).await?;
    writer.flush().await?;
    Ok(())
}
