//! Blocking transport over `ureq`, driven from the tokio blocking pool.
//!
//! Behaves like XHR: the request body is streamed through a counting reader
//! and the response body is read incrementally, so both upload and download
//! progress are reported. A request cannot be interrupted once it is on the
//! blocking pool; aborting only discards its result.

use std::io::{self, Cursor, Read};

use async_trait::async_trait;
use tracing::debug;
use ureq::http::Response;
use ureq::typestate::WithBody;
use ureq::{Agent, Body, RequestBuilder, SendBody};

use super::{Capabilities, Progress, ProgressHandlers, RequestAdapter};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

const READ_CHUNK: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct BlockingAdapter {
    agent: Agent,
}

impl Default for BlockingAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingAdapter {
    /// An agent that returns 4xx/5xx as responses instead of errors, leaving
    /// status interpretation to the response pipeline.
    pub fn new() -> Self {
        let agent = Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    pub fn with_agent(agent: Agent) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl RequestAdapter for BlockingAdapter {
    fn name(&self) -> &'static str {
        "blocking"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::ALL
    }

    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        debug!(method = %request.method, url = %request.url, "blocking dispatch");
        tokio::task::spawn_blocking(move || execute(&agent, request, &progress))
            .await
            .map_err(|e| Error::Transport(format!("blocking task failed: {e}")))?
    }
}

fn execute(agent: &Agent, request: HttpRequest, progress: &ProgressHandlers) -> Result<HttpResponse> {
    let (headers, body) = request.wire_parts()?;
    let url = request.url.as_str();

    let response = match request.method {
        HttpMethod::Get if body.is_empty() => with_headers(agent.get(url), &headers).call(),
        HttpMethod::Delete if body.is_empty() => with_headers(agent.delete(url), &headers).call(),
        HttpMethod::Head if body.is_empty() => with_headers(agent.head(url), &headers).call(),
        HttpMethod::Options if body.is_empty() => with_headers(agent.options(url), &headers).call(),
        HttpMethod::Get => send(with_headers(agent.get(url), &headers).force_send_body(), body, progress),
        HttpMethod::Delete => send(with_headers(agent.delete(url), &headers).force_send_body(), body, progress),
        HttpMethod::Head => send(with_headers(agent.head(url), &headers).force_send_body(), body, progress),
        HttpMethod::Options => send(with_headers(agent.options(url), &headers).force_send_body(), body, progress),
        HttpMethod::Post => send(with_headers(agent.post(url), &headers), body, progress),
        HttpMethod::Put => send(with_headers(agent.put(url), &headers), body, progress),
        HttpMethod::Patch => send(with_headers(agent.patch(url), &headers), body, progress),
    }
    .map_err(|e| Error::Transport(e.to_string()))?;

    read_response(response, progress)
}

fn with_headers<B>(mut builder: RequestBuilder<B>, headers: &Headers) -> RequestBuilder<B> {
    for (name, value) in headers.iter() {
        builder = builder.header(name, value);
    }
    builder
}

fn send(
    builder: RequestBuilder<WithBody>,
    body: Vec<u8>,
    progress: &ProgressHandlers,
) -> std::result::Result<Response<Body>, ureq::Error> {
    if body.is_empty() {
        return builder.send_empty();
    }
    if progress.upload.is_none() {
        return builder.send(&body[..]);
    }
    let mut reader = ProgressReader::new(body, progress.clone());
    builder.send(SendBody::from_reader(&mut reader))
}

fn read_response(mut response: Response<Body>, progress: &ProgressHandlers) -> Result<HttpResponse> {
    let status = response.status().as_u16();
    let headers: Headers = response
        .headers()
        .iter()
        .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
        .collect();
    let total = headers.get("content-length").and_then(|v| v.parse::<u64>().ok());

    let mut reader = response.body_mut().as_reader();
    let mut bytes = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader
            .read(&mut chunk)
            .map_err(|e| Error::Transport(e.to_string()))?;
        if n == 0 {
            break;
        }
        bytes.extend_from_slice(&chunk[..n]);
        progress.report_download(Progress {
            loaded: bytes.len() as u64,
            total,
        });
    }

    Ok(HttpResponse::new(status, headers, bytes))
}

/// Reads an in-memory body, reporting upload progress as ureq consumes it.
struct ProgressReader {
    inner: Cursor<Vec<u8>>,
    total: u64,
    progress: ProgressHandlers,
}

impl ProgressReader {
    fn new(body: Vec<u8>, progress: ProgressHandlers) -> Self {
        let total = body.len() as u64;
        Self {
            inner: Cursor::new(body),
            total,
            progress,
        }
    }
}

impl Read for ProgressReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.progress.report_upload(Progress {
                loaded: self.inner.position(),
                total: Some(self.total),
            });
        }
        Ok(n)
    }
}
