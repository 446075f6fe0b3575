//! HTTP transport types shared by methods and adapters.
//!
//! # Design
//! These types describe requests and responses as plain data. The engine
//! builds an `HttpRequest` descriptor, hands it to a `RequestAdapter`, and
//! gets an `HttpResponse` back; only the adapter ever touches the network.
//! All fields use owned types so descriptors can move into blocking threads
//! and be recorded by test adapters without lifetime concerns.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};
use crate::form::{self, FormData};
use crate::headers::{Headers, CONTENT_TYPE};

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let method = match s.to_ascii_uppercase().as_str() {
            "GET" => HttpMethod::Get,
            "POST" => HttpMethod::Post,
            "PUT" => HttpMethod::Put,
            "DELETE" => HttpMethod::Delete,
            "PATCH" => HttpMethod::Patch,
            "HEAD" => HttpMethod::Head,
            "OPTIONS" => HttpMethod::Options,
            _ => return None,
        };
        Some(method)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The payload of a request, before it is encoded for the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(Value),
    Text(String),
    Bytes(Vec<u8>),
    Form(FormData),
}

impl RequestBody {
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    pub fn is_multipart(&self) -> bool {
        matches!(self, RequestBody::Form(_))
    }

    /// The part of the body that participates in cache identity. Binary and
    /// multipart payloads are keyed on a SHA-256 digest of their bytes.
    pub fn cache_fragment(&self) -> Option<Value> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(v) => Some(v.clone()),
            RequestBody::Text(s) => Some(Value::String(s.clone())),
            RequestBody::Bytes(b) => Some(json!({ "sha256": digest(b) })),
            RequestBody::Form(form) => Some(json!({ "sha256": digest(&form.encode(CACHE_KEY_BOUNDARY)) })),
        }
    }
}

/// Fixed boundary for hashing forms; the wire boundary is random per send.
const CACHE_KEY_BOUNDARY: &str = "methodkit-cache-key";

fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// A request body encoded for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    /// Content-Type the transport must assign when the descriptor has none.
    pub content_type: Option<String>,
}

/// A normalized request descriptor, as seen by adapters.
///
/// `url` already carries the query string and `headers` are already
/// resolved, so adapters send exactly what they are given.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Headers,
    pub body: RequestBody,
}

impl HttpRequest {
    /// Encode the body and produce the final header list for the wire.
    ///
    /// A multipart body gets `multipart/form-data; boundary=...` unless the
    /// caller already declared a Content-Type.
    pub fn wire_parts(&self) -> Result<(Headers, Vec<u8>)> {
        let encoded = encode_body(&self.body)?;
        let mut headers = self.headers.clone();
        if let Some(ct) = encoded.content_type {
            if !headers.contains(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, ct);
            }
        }
        Ok((headers, encoded.bytes))
    }
}

pub fn encode_body(body: &RequestBody) -> Result<EncodedBody> {
    let encoded = match body {
        RequestBody::Empty => EncodedBody {
            bytes: Vec::new(),
            content_type: None,
        },
        RequestBody::Json(v) => EncodedBody {
            bytes: serde_json::to_vec(v).map_err(|e| Error::Serialization(e.to_string()))?,
            content_type: None,
        },
        RequestBody::Text(s) => EncodedBody {
            bytes: s.clone().into_bytes(),
            content_type: None,
        },
        RequestBody::Bytes(b) => EncodedBody {
            bytes: b.clone(),
            content_type: None,
        },
        RequestBody::Form(form) => {
            let boundary = form::boundary();
            EncodedBody {
                bytes: form.encode(&boundary),
                content_type: Some(format!("multipart/form-data; boundary={boundary}")),
            }
        }
    };
    Ok(encoded)
}

/// An HTTP response described as plain data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16, headers: Headers, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A JSON response with `content-type: application/json`.
    pub fn json_body(status: u16, value: &Value) -> Self {
        let mut headers = Headers::new();
        headers.insert(CONTENT_TYPE, "application/json");
        Self {
            status,
            headers,
            body: value.to_string().into_bytes(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// The body as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| Error::Deserialization(e.to_string()))
    }
}
