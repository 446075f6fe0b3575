//! Method declaration and the send pipeline.
//!
//! # Design
//! A `Method` is a declarative description of one request, built with
//! consuming setters and then sent any number of times. Each send:
//!
//! 1. returns the cached value when the effective cache policy is enabled and
//!    a fresh entry exists;
//! 2. refuses progress handlers the adapter cannot honor;
//! 3. builds the descriptor (url + query, resolved headers, before-request
//!    hook) and dispatches it, bounded by the client timeout;
//! 4. decodes the response with `responseExpect`, then runs `transformData`
//!    once;
//! 5. stores the result when caching is enabled.
//!
//! Concurrent sends of the same method are independent; nothing coalesces
//! in-flight requests.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};
use url::Url;
use uuid::Uuid;

use crate::adapter::{self, Progress, ProgressHandlers};
use crate::cache::{self, CacheEntry, CacheFor};
use crate::client::Client;
use crate::error::{Error, Result};
use crate::expect::ResponseExpect;
use crate::form::FormData;
use crate::headers::{self, Headers};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// `transformData`: maps the decoded body, with access to the response
/// headers, to the value returned by `send`.
pub type TransformFn = Arc<dyn Fn(Value, Headers) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Aborts the in-flight send of a method and of all its clones.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl AbortHandle {
    fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Resolve the current send with `Error::Aborted`. Has no effect when
    /// nothing is in flight.
    pub fn abort(&self) {
        self.tx.send_replace(true);
    }

    async fn guard<T>(&self, fut: impl Future<Output = Result<T>>) -> Result<T> {
        self.tx.send_replace(false);
        let mut rx = self.tx.subscribe();
        let aborted = async move {
            let _ = rx.wait_for(|aborted| *aborted).await;
        };
        tokio::select! {
            res = fut => res,
            () = aborted => Err(Error::Aborted),
        }
    }
}

/// A declared request bound to a [`Client`].
#[derive(Clone)]
pub struct Method {
    id: Uuid,
    client: Client,
    method: HttpMethod,
    url: String,
    name: Option<String>,
    params: BTreeMap<String, String>,
    headers: Vec<(String, Option<String>)>,
    body: RequestBody,
    cache_for: Option<CacheFor>,
    expect: Option<ResponseExpect>,
    transform: Option<TransformFn>,
    progress: ProgressHandlers,
    abort: AbortHandle,
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("name", &self.name)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("cache_for", &self.cache_for)
            .field("expect", &self.expect)
            .field("transform", &self.transform.is_some())
            .field("progress", &self.progress)
            .finish()
    }
}

impl Method {
    pub(crate) fn new(client: Client, method: HttpMethod, url: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            client,
            method,
            url: url.to_string(),
            name: None,
            params: BTreeMap::new(),
            headers: Vec::new(),
            body: RequestBody::Empty,
            cache_for: None,
            expect: None,
            transform: None,
            progress: ProgressHandlers::default(),
            abort: AbortHandle::new(),
        }
    }

    // --- declaration ---

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn params<K, V, I>(mut self, params: I) -> Self
    where
        K: Into<String>,
        V: ToString,
        I: IntoIterator<Item = (K, V)>,
    {
        for (k, v) in params {
            self.params.insert(k.into(), v.to_string());
        }
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), Some(value.into())));
        self
    }

    /// Declare `name` without a value; it is sent as `"undefined"` and still
    /// counts as an explicit header (e.g. it suppresses the JSON
    /// Content-Type default).
    pub fn header_undefined(mut self, name: impl Into<String>) -> Self {
        self.headers.push((name.into(), None));
        self
    }

    pub fn headers<K, I>(mut self, headers: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Option<String>)>,
    {
        self.headers.extend(headers.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    pub fn json(self, value: Value) -> Self {
        self.body(RequestBody::Json(value))
    }

    /// Serialize `value` as the JSON body.
    pub fn json_from<T: Serialize>(self, value: &T) -> Result<Self> {
        let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(self.json(value))
    }

    pub fn text(self, text: impl Into<String>) -> Self {
        self.body(RequestBody::Text(text.into()))
    }

    pub fn bytes(self, bytes: impl Into<Vec<u8>>) -> Self {
        self.body(RequestBody::Bytes(bytes.into()))
    }

    pub fn form(self, form: FormData) -> Self {
        self.body(RequestBody::Form(form))
    }

    pub fn cache_for(&self) -> CacheFor {
        self.cache_for
            .unwrap_or_else(|| self.client.default_cache_for(self.method))
    }

    /// Override the client's cache policy for this method.
    pub fn with_cache_for(mut self, cache_for: CacheFor) -> Self {
        self.cache_for = Some(cache_for);
        self
    }

    pub fn expect(mut self, expect: ResponseExpect) -> Self {
        self.expect = Some(expect);
        self
    }

    /// Synchronous `transformData`.
    pub fn transform<F>(mut self, f: F) -> Self
    where
        F: Fn(Value, &Headers) -> Result<Value> + Send + Sync + 'static,
    {
        self.transform = Some(Arc::new(move |data, headers| {
            let out = f(data, &headers);
            Box::pin(async move { out })
        }));
        self
    }

    /// Asynchronous `transformData`.
    pub fn transform_async<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, Headers) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.transform = Some(Arc::new(move |data, headers| Box::pin(f(data, headers))));
        self
    }

    pub fn on_upload<F>(mut self, f: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress.upload = Some(Arc::new(f));
        self
    }

    pub fn on_download<F>(mut self, f: F) -> Self
    where
        F: Fn(Progress) + Send + Sync + 'static,
    {
        self.progress.download = Some(Arc::new(f));
        self
    }

    // --- inspection ---

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn http_method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn label(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn request_params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    pub fn request_body(&self) -> &RequestBody {
        &self.body
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Base url joined with the method url, without the query string.
    pub fn full_url(&self) -> String {
        if self.url.starts_with("http://") || self.url.starts_with("https://") {
            return self.url.clone();
        }
        let base = self.client.base_url();
        match (base.is_empty(), self.url.starts_with('/')) {
            (true, _) => self.url.clone(),
            (false, true) => format!("{base}{}", self.url),
            (false, false) => format!("{base}/{}", self.url),
        }
    }

    pub fn cache_key(&self) -> String {
        cache::cache_key(self.method, &self.full_url(), &self.params, &self.body)
    }

    /// The descriptor an adapter would receive for this method.
    pub fn build_request(&self) -> HttpRequest {
        let mut url = self.full_url();
        if !self.params.is_empty() {
            let query = self
                .params
                .iter()
                .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
                .collect::<Vec<_>>()
                .join("&");
            url = with_query(url, &query);
        }
        let mut request = HttpRequest {
            method: self.method,
            url,
            headers: headers::resolve(&self.headers, &self.body),
            body: self.body.clone(),
        };
        if let Some(hook) = &self.client.shared.before_request {
            hook(&mut request);
        }
        request
    }

    // --- sending ---

    pub async fn send(&self) -> Result<Value> {
        self.dispatch(false).await
    }

    /// Send without reading the cache. A successful result still refreshes
    /// the cached entry.
    pub async fn send_forced(&self) -> Result<Value> {
        self.dispatch(true).await
    }

    /// Send and deserialize the final value into `T`.
    pub async fn send_as<T: DeserializeOwned>(&self) -> Result<T> {
        let value = self.send().await?;
        serde_json::from_value(value).map_err(|e| Error::Deserialization(e.to_string()))
    }

    #[instrument(name = "send", skip_all, fields(id = %self.id, method = %self.method, url = %self.url))]
    async fn dispatch(&self, force: bool) -> Result<Value> {
        let shared = &self.client.shared;
        let policy = self.cache_for();
        let key = self.cache_key();

        if policy.is_enabled() && !force {
            if let Some(value) = shared.cache.get(&key) {
                debug!("cache hit");
                return Ok(value);
            }
            debug!("cache miss");
        }

        adapter::ensure_supported(shared.adapter.as_ref(), &self.progress)?;

        match self.abort.guard(self.exchange()).await {
            Ok((value, status)) => {
                if !(200..300).contains(&status) {
                    debug!(status, "not cached");
                } else if let Some(expires_at) = policy.deadline(Instant::now()) {
                    shared.cache.set(CacheEntry {
                        key,
                        value: value.clone(),
                        expires_at,
                    });
                }
                Ok(value)
            }
            Err(e) => {
                warn!(error = %e, "send failed");
                Err(e)
            }
        }
    }

    /// The final value together with the response status.
    async fn exchange(&self) -> Result<(Value, u16)> {
        let response = self.transport().await?;
        let status = response.status;
        let expect = self.expect.as_ref().unwrap_or(&self.client.shared.expect);
        let data = expect.decode(&response)?;
        let value = match &self.transform {
            Some(transform) => transform(data, response.headers).await?,
            None => data,
        };
        Ok((value, status))
    }

    async fn transport(&self) -> Result<HttpResponse> {
        let shared = &self.client.shared;
        let call = shared.adapter.request(self.build_request(), self.progress.clone());
        match shared.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| Error::Timeout(limit))?,
            None => call.await,
        }
    }
}

/// Append `query` to `url`, keeping any fragment last.
fn with_query(url: String, query: &str) -> String {
    if let Ok(mut parsed) = Url::parse(&url) {
        let joined = match parsed.query() {
            Some(existing) if !existing.is_empty() => format!("{existing}&{query}"),
            _ => query.to_string(),
        };
        parsed.set_query(Some(&joined));
        return parsed.into();
    }
    // Relative url: no base was configured.
    let (head, fragment) = match url.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (url.as_str(), None),
    };
    let sep = if head.contains('?') { '&' } else { '?' };
    match fragment {
        Some(fragment) => format!("{head}{sep}{query}#{fragment}"),
        None => format!("{head}{sep}{query}"),
    }
}
