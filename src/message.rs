//! Request/Response value types shared by every transport and handler.

use std::collections::HashMap;
use std::fmt;

/// An inbound request, already decoded from whichever transport received it.
///
/// Requests are immutable after construction: handlers only ever see `&Request`.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub path: String,
    pub query_params: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub metadata: HashMap<String, String>,
}

impl Request {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_query_params(mut self, params: HashMap<String, String>) -> Self {
        self.query_params = params;
        self
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns a copy of this request with `path` replaced; everything else
    /// (query params, body, metadata) is preserved unchanged.
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query_params: self.query_params.clone(),
            body: self.body.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    InternalError,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::InternalError => 500,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::InternalError => "Internal Server Error",
        }
    }

    /// Unknown numeric status values are treated as `InternalError`, per the
    /// wire contract.
    pub fn from_code(code: i64) -> Self {
        match code {
            200 => Status::Ok,
            400 => Status::BadRequest,
            404 => Status::NotFound,
            _ => Status::InternalError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    Json,
    Html,
    Text,
    Png,
    Jpeg,
    Binary,
}

impl ContentType {
    pub fn as_mime(self) -> &'static str {
        match self {
            ContentType::Json => "application/json",
            ContentType::Html => "text/html",
            ContentType::Text => "text/plain",
            ContentType::Png => "image/png",
            ContentType::Jpeg => "image/jpeg",
            ContentType::Binary => "application/octet-stream",
        }
    }

    /// Unknown MIME values are treated as `Binary`, per the wire contract in
    /// wire contract.
    pub fn from_mime(mime: &str) -> Self {
        match mime {
            "application/json" => ContentType::Json,
            "text/html" => ContentType::Html,
            "text/plain" => ContentType::Text,
            "image/png" => ContentType::Png,
            "image/jpeg" => ContentType::Jpeg,
            _ => ContentType::Binary,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_mime())
    }
}

/// A fully formed response. Immutable after construction.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: Status,
    pub content_type: ContentType,
    pub body: Vec<u8>,
}

impl Response {
    pub fn new(status: Status, content_type: ContentType, body: Vec<u8>) -> Self {
        Self {
            status,
            content_type,
            body,
        }
    }

    pub fn json(status: Status, body: serde_json::Value) -> Self {
        Self::new(status, ContentType::Json, body.to_string().into_bytes())
    }

    pub fn ok_json(body: serde_json::Value) -> Self {
        Self::json(Status::Ok, body)
    }

    pub fn error(status: Status, message: impl Into<String>) -> Self {
        Self::json(status, serde_json::json!({ "error": message.into() }))
    }

    pub fn not_found() -> Self {
        Self::error(Status::NotFound, "Endpoint not found")
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::error(Status::InternalError, message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(Status::BadRequest, message.into())
    }
}
