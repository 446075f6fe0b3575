//! Echo server backing the client's integration tests.
//!
//! Every endpoint answers with the `{code, msg, data}` envelope so tests can
//! see exactly what reached the wire.

use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{any, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::debug;

/// Response envelope shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub code: u16,
    pub msg: String,
    pub data: Value,
}

impl Envelope {
    pub fn ok(data: Value) -> Self {
        Self {
            code: 200,
            msg: String::new(),
            data,
        }
    }
}

pub fn app() -> Router {
    Router::new()
        .route("/unit-test", any(echo))
        .route("/unit-test-headers", any(echo_headers))
        .route("/unit-test-upload", post(upload))
        .route("/unit-test-status/{code}", any(status))
        .route("/unit-test-delay/{ms}", any(delayed))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Echo of the request: path, verb, query params and the decoded body.
fn describe(method: &Method, uri: &Uri, params: BTreeMap<String, String>, body: &[u8]) -> Value {
    let mut data = json!({
        "path": uri.path(),
        "method": method.as_str(),
        "params": params,
    });
    if !body.is_empty() {
        data["data"] = serde_json::from_slice(body)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(body).into_owned()));
    }
    data
}

async fn echo(
    method: Method,
    uri: Uri,
    Query(params): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Json<Envelope> {
    debug!(%method, path = uri.path(), "echo");
    Json(Envelope::ok(describe(&method, &uri, params, &body)))
}

async fn echo_headers(headers: HeaderMap) -> Json<Envelope> {
    let request_headers: BTreeMap<String, String> = headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect();
    Json(Envelope::ok(json!({ "requestHeaders": request_headers })))
}

async fn upload(headers: HeaderMap, body: Bytes) -> Json<Envelope> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    debug!(size = body.len(), ?content_type, "upload");
    Json(Envelope::ok(json!({
        "contentType": content_type,
        "size": body.len(),
    })))
}

async fn status(
    Path(code): Path<u16>,
    method: Method,
    uri: Uri,
    Query(params): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Response {
    let Ok(status) = StatusCode::from_u16(code) else {
        return (StatusCode::BAD_REQUEST, "invalid status").into_response();
    };
    let envelope = Envelope {
        code,
        msg: status.canonical_reason().unwrap_or_default().to_string(),
        data: describe(&method, &uri, params, &body),
    };
    (status, Json(envelope)).into_response()
}

async fn delayed(
    Path(ms): Path<u64>,
    method: Method,
    uri: Uri,
    Query(params): Query<BTreeMap<String, String>>,
    body: Bytes,
) -> Json<Envelope> {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    Json(Envelope::ok(describe(&method, &uri, params, &body)))
}
