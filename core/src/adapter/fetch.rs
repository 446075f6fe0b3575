//! Async transport over `reqwest`.
//!
//! Behaves like the browser fetch API: the response body is read chunk by
//! chunk so download progress can be reported, but there is no hook into the
//! request body as it is written, so upload progress is not offered.

use async_trait::async_trait;
use tracing::debug;

use super::{Capabilities, Progress, ProgressHandlers, RequestAdapter};
use crate::error::{Error, Result};
use crate::headers::Headers;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

#[derive(Debug, Clone, Default)]
pub struct FetchAdapter {
    client: reqwest::Client,
}

impl FetchAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a preconfigured `reqwest::Client` (proxies, TLS roots, ...).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn to_reqwest(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
        HttpMethod::Options => reqwest::Method::OPTIONS,
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}

#[async_trait]
impl RequestAdapter for FetchAdapter {
    fn name(&self) -> &'static str {
        "fetch"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            upload_progress: false,
            download_progress: true,
        }
    }

    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse> {
        let (headers, body) = request.wire_parts()?;

        let mut builder = self.client.request(to_reqwest(request.method), &request.url);
        for (name, value) in headers.iter() {
            builder = builder.header(name, value);
        }
        if !body.is_empty() {
            builder = builder.body(body);
        }

        debug!(method = %request.method, url = %request.url, "fetch dispatch");
        let mut response = builder.send().await.map_err(transport)?;

        let status = response.status().as_u16();
        let response_headers: Headers = response
            .headers()
            .iter()
            .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let total = response.content_length();

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport)? {
            bytes.extend_from_slice(&chunk);
            progress.report_download(Progress {
                loaded: bytes.len() as u64,
                total,
            });
        }

        Ok(HttpResponse::new(status, response_headers, bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertises_download_progress_only() {
        let caps = FetchAdapter::new().capabilities();
        assert!(!caps.upload_progress);
        assert!(caps.download_progress);
    }

    #[test]
    fn maps_every_method() {
        assert_eq!(to_reqwest(HttpMethod::Patch), reqwest::Method::PATCH);
        assert_eq!(to_reqwest(HttpMethod::Options), reqwest::Method::OPTIONS);
    }
}
