//! In-process adapter backed by a route table.
//!
//! Answers requests without a network, records every descriptor it receives,
//! and can simulate latency. Unrouted requests get an echo envelope shaped
//! like the mock server's `/unit-test` endpoint.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use super::{Capabilities, Progress, ProgressHandlers, RequestAdapter};
use crate::error::{Error, Result};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};

type Handler = Arc<dyn Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync>;

#[derive(Clone)]
struct Route {
    method: Option<HttpMethod>,
    path: String,
    handler: Handler,
}

/// Route-table adapter. Clones share the recorded requests.
#[derive(Clone)]
pub struct MockAdapter {
    routes: Vec<Route>,
    delay: Option<Duration>,
    capabilities: Capabilities,
    received: Arc<Mutex<Vec<HttpRequest>>>,
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAdapter {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            delay: None,
            capabilities: Capabilities::ALL,
            received: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Answer `method path` with `handler`. `None` matches any verb.
    pub fn route<F>(mut self, method: Option<HttpMethod>, path: &str, handler: F) -> Self
    where
        F: Fn(&HttpRequest) -> Result<HttpResponse> + Send + Sync + 'static,
    {
        self.routes.push(Route {
            method,
            path: path.to_string(),
            handler: Arc::new(handler),
        });
        self
    }

    /// Answer `method path` with a fixed JSON body.
    pub fn json(self, method: HttpMethod, path: &str, status: u16, body: Value) -> Self {
        self.route(Some(method), path, move |_| Ok(HttpResponse::json_body(status, &body)))
    }

    /// Sleep for `delay` before answering each request.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Every descriptor received so far, in arrival order.
    pub fn received(&self) -> Vec<HttpRequest> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.received().pop()
    }

    fn find(&self, method: HttpMethod, path: &str) -> Option<Handler> {
        self.routes
            .iter()
            .find(|r| r.path == path && r.method.map_or(true, |m| m == method))
            .map(|r| Arc::clone(&r.handler))
    }
}

#[async_trait]
impl RequestAdapter for MockAdapter {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let (_, body) = request.wire_parts()?;
        let sent = body.len() as u64;
        progress.report_upload(Progress {
            loaded: sent,
            total: Some(sent),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let (path, params) = parse_url(&request.url)?;
        let response = match self.find(request.method, &path) {
            Some(handler) => handler(&request)?,
            None => HttpResponse::json_body(
                200,
                &json!({
                    "code": 200,
                    "msg": "",
                    "data": {
                        "path": path,
                        "method": request.method.as_str(),
                        "params": params,
                    }
                }),
            ),
        };

        let received = response.body.len() as u64;
        progress.report_download(Progress {
            loaded: received,
            total: Some(received),
        });
        Ok(response)
    }
}

/// Path and decoded query params of a descriptor url. Relative urls resolve
/// against a placeholder origin.
fn parse_url(raw: &str) -> Result<(String, BTreeMap<String, String>)> {
    let url = match Url::parse(raw) {
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Url::parse("http://localhost").and_then(|base| base.join(raw))
        }
        other => other,
    }
    .map_err(|e| Error::Transport(format!("invalid url {raw:?}: {e}")))?;
    let params = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    Ok((url.path().to_string(), params))
}
