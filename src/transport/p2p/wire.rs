//! Length-prefixed JSON framing for the P2P stream protocol: a 4-byte
//! big-endian length prefix followed by that many bytes of UTF-8 JSON.

use std::collections::HashMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::message::{Request, Response};
#[cfg(test)]
use crate::message::{ContentType, Status};

pub const MAX_FRAME_BYTES: u32 = 100 * 1024 * 1024;

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct WireRequest {
    pub path: String,
    #[serde(default)]
    pub query: HashMap<String, String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl WireRequest {
    pub fn into_request(self) -> anyhow::Result<Request> {
        if self.path.is_empty() {
            anyhow::bail!("missing path");
        }
        let body = self
            .body
            .map(|encoded| STANDARD.decode(encoded))
            .transpose()?;
        Ok(Request {
            path: self.path,
            query_params: self.query,
            body,
            metadata: self.metadata,
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WireResponse {
    pub status: u16,
    pub content_type: String,
    pub body: String,
}

impl From<&Response> for WireResponse {
    fn from(response: &Response) -> Self {
        Self {
            status: response.status.code(),
            content_type: response.content_type.to_string(),
            body: STANDARD.encode(&response.body),
        }
    }
}

#[cfg(test)]
impl WireResponse {
    pub fn into_response(self) -> Response {
        Response {
            status: Status::from_code(self.status as i64),
            content_type: ContentType::from_mime(&self.content_type),
            body: STANDARD.decode(&self.body).unwrap_or_default(),
        }
    }
}

/// Read one framed message: 4-byte big-endian length, then that many bytes.
/// Rejects `length == 0` or `length > MAX_FRAME_BYTES` without allocating.
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> anyhow::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf);
    if len == 0 || len > MAX_FRAME_BYTES {
        anyhow::bail!("invalid frame length {len}");
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf).await?;
    Ok(buf)
}

pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> anyhow::Result<()> {
    let len = u32::try_from(payload.len()).map_err(|_| anyhow::anyhow!("frame too large"))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    Ok(())
}
