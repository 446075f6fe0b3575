//! The client instance: shared options and the factory for methods.
//!
//! # Design
//! `Client` is a cheap handle (`Arc` inside) holding everything a method
//! needs at send time: base url, the composed adapter, the default response
//! expectation, per-verb default cache policies, the timeout, the
//! before-request hook, and the cache store. Methods keep a clone of the
//! handle, so options are fixed once the client is built.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tracing::debug;

use crate::adapter::{self, AdapterLayer, RequestAdapter, SharedAdapter};
use crate::cache::{CacheEntry, CacheFor, CacheStore, MemoryCache};
use crate::config::ClientConfig;
use crate::expect::ResponseExpect;
use crate::http::{HttpMethod, HttpRequest};
use crate::method::Method;

/// Default reuse window for GET responses.
pub const DEFAULT_GET_CACHE: Duration = Duration::from_secs(300);

pub type BeforeRequest = Arc<dyn Fn(&mut HttpRequest) + Send + Sync>;

pub(crate) struct Shared {
    pub(crate) base_url: String,
    pub(crate) adapter: SharedAdapter,
    pub(crate) expect: ResponseExpect,
    pub(crate) cache: Arc<dyn CacheStore>,
    pub(crate) default_cache_for: HashMap<HttpMethod, CacheFor>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) before_request: Option<BeforeRequest>,
}

/// Handle to a configured request engine.
#[derive(Clone)]
pub struct Client {
    pub(crate) shared: Arc<Shared>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.shared.base_url)
            .field("adapter", &self.shared.adapter.name())
            .field("timeout", &self.shared.timeout)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// A client over the fetch adapter with default options.
    #[cfg(feature = "fetch")]
    pub fn new(base_url: &str) -> Self {
        Self::builder(adapter::fetch::FetchAdapter::new())
            .base_url(base_url)
            .build()
    }

    pub fn builder(adapter: impl RequestAdapter + 'static) -> ClientBuilder {
        ClientBuilder::new(Arc::new(adapter))
    }

    pub fn base_url(&self) -> &str {
        &self.shared.base_url
    }

    pub fn adapter(&self) -> &SharedAdapter {
        &self.shared.adapter
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.shared.cache
    }

    pub fn request(&self, method: HttpMethod, url: &str) -> Method {
        Method::new(self.clone(), method, url)
    }

    pub fn get(&self, url: &str) -> Method {
        self.request(HttpMethod::Get, url)
    }

    pub fn post(&self, url: &str) -> Method {
        self.request(HttpMethod::Post, url)
    }

    pub fn put(&self, url: &str) -> Method {
        self.request(HttpMethod::Put, url)
    }

    pub fn delete(&self, url: &str) -> Method {
        self.request(HttpMethod::Delete, url)
    }

    pub fn patch(&self, url: &str) -> Method {
        self.request(HttpMethod::Patch, url)
    }

    pub fn head(&self, url: &str) -> Method {
        self.request(HttpMethod::Head, url)
    }

    pub fn options(&self, url: &str) -> Method {
        self.request(HttpMethod::Options, url)
    }

    /// The fresh cached value for `method`, if any.
    pub fn query_cache(&self, method: &Method) -> Option<Value> {
        self.shared.cache.get(&method.cache_key())
    }

    /// Store `value` as the cached response of `method`.
    ///
    /// Uses the method's cache policy; a method that does not cache keeps the
    /// value until it is invalidated.
    pub fn set_cache(&self, method: &Method, value: Value) {
        let expires_at = method.cache_for().deadline(Instant::now()).unwrap_or(None);
        self.shared.cache.set(CacheEntry {
            key: method.cache_key(),
            value,
            expires_at,
        });
    }

    pub fn invalidate(&self, method: &Method) {
        debug!(url = %method.url(), "cache invalidated");
        self.shared.cache.remove(&method.cache_key());
    }

    pub fn clear_cache(&self) {
        debug!("cache cleared");
        self.shared.cache.clear();
    }

    pub(crate) fn default_cache_for(&self, method: HttpMethod) -> CacheFor {
        self.shared
            .default_cache_for
            .get(&method)
            .copied()
            .unwrap_or_default()
    }
}

/// Builder for [`Client`].
pub struct ClientBuilder {
    base_url: String,
    adapter: SharedAdapter,
    layers: Vec<Arc<dyn AdapterLayer>>,
    expect: ResponseExpect,
    cache: Option<Arc<dyn CacheStore>>,
    default_cache_for: HashMap<HttpMethod, CacheFor>,
    timeout: Option<Duration>,
    before_request: Option<BeforeRequest>,
}

impl ClientBuilder {
    pub fn new(adapter: SharedAdapter) -> Self {
        let mut default_cache_for = HashMap::new();
        default_cache_for.insert(HttpMethod::Get, CacheFor::Ttl(DEFAULT_GET_CACHE));
        Self {
            base_url: String::new(),
            adapter,
            layers: Vec::new(),
            expect: ResponseExpect::default(),
            cache: None,
            default_cache_for,
            timeout: None,
            before_request: None,
        }
    }

    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Wrap the adapter. Layers added first sit closest to the transport.
    pub fn layer(mut self, layer: impl AdapterLayer + 'static) -> Self {
        self.layers.push(Arc::new(layer));
        self
    }

    /// Default response expectation for methods that do not set their own.
    pub fn expect(mut self, expect: ResponseExpect) -> Self {
        self.expect = expect;
        self
    }

    /// Use `cache` instead of a private in-memory store.
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Cache policy for `method` when a method sets none.
    pub fn default_cache_for(mut self, method: HttpMethod, cache_for: CacheFor) -> Self {
        self.default_cache_for.insert(method, cache_for);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run `hook` on every request descriptor right before it is dispatched.
    pub fn before_request<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut HttpRequest) + Send + Sync + 'static,
    {
        self.before_request = Some(Arc::new(hook));
        self
    }

    /// Apply the values present in `config`.
    pub fn config(mut self, config: &ClientConfig) -> Self {
        if let Some(base_url) = &config.base_url {
            self = self.base_url(base_url);
        }
        if let Some(ms) = config.timeout_ms {
            self.timeout = Some(Duration::from_millis(ms));
        }
        if let Some(ms) = config.get_cache_ms {
            self.default_cache_for.insert(HttpMethod::Get, CacheFor::millis(ms));
        }
        self
    }

    pub fn build(self) -> Client {
        let adapter = adapter::compose(self.adapter, &self.layers);
        Client {
            shared: Arc::new(Shared {
                base_url: self.base_url,
                adapter,
                expect: self.expect,
                cache: self.cache.unwrap_or_else(|| Arc::new(MemoryCache::new())),
                default_cache_for: self.default_cache_for,
                timeout: self.timeout,
                before_request: self.before_request,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::adapter::CountingLayer;
    use serde_json::json;

    fn client() -> Client {
        Client::builder(MockAdapter::new())
            .base_url("http://localhost:3000/")
            .build()
    }

    #[test]
    fn trailing_slash_is_stripped() {
        assert_eq!(client().base_url(), "http://localhost:3000");
    }

    #[test]
    fn factories_set_the_verb() {
        let c = client();
        assert_eq!(c.get("/a").http_method(), HttpMethod::Get);
        assert_eq!(c.post("/a").http_method(), HttpMethod::Post);
        assert_eq!(c.put("/a").http_method(), HttpMethod::Put);
        assert_eq!(c.delete("/a").http_method(), HttpMethod::Delete);
        assert_eq!(c.patch("/a").http_method(), HttpMethod::Patch);
        assert_eq!(c.head("/a").http_method(), HttpMethod::Head);
        assert_eq!(c.options("/a").http_method(), HttpMethod::Options);
    }

    #[test]
    fn get_is_cached_by_default_and_others_are_not() {
        let c = client();
        assert_eq!(c.get("/a").cache_for(), CacheFor::Ttl(DEFAULT_GET_CACHE));
        assert_eq!(c.post("/a").cache_for(), CacheFor::Disabled);

        let c = Client::builder(MockAdapter::new())
            .default_cache_for(HttpMethod::Get, CacheFor::Disabled)
            .default_cache_for(HttpMethod::Post, CacheFor::millis(10))
            .build();
        assert_eq!(c.get("/a").cache_for(), CacheFor::Disabled);
        assert_eq!(c.post("/a").cache_for(), CacheFor::millis(10));
    }

    #[test]
    fn config_overrides_defaults() {
        let config = ClientConfig {
            base_url: Some("http://api.test/".to_string()),
            timeout_ms: Some(1500),
            get_cache_ms: Some(0),
        };
        let c = Client::builder(MockAdapter::new()).config(&config).build();
        assert_eq!(c.base_url(), "http://api.test");
        assert_eq!(c.shared.timeout, Some(Duration::from_millis(1500)));
        assert!(!c.get("/a").cache_for().is_enabled());
    }

    #[tokio::test]
    async fn manual_cache_operations() {
        let counter = CountingLayer::new();
        let c = Client::builder(MockAdapter::new()).layer(counter.clone()).build();
        let method = c.get("/profile");

        c.set_cache(&method, json!({"name": "seeded"}));
        assert_eq!(c.query_cache(&method), Some(json!({"name": "seeded"})));
        assert_eq!(method.send().await.unwrap(), json!({"name": "seeded"}));
        assert_eq!(counter.count(), 0);

        c.invalidate(&method);
        assert_eq!(c.query_cache(&method), None);
        method.send().await.unwrap();
        assert_eq!(counter.count(), 1);

        c.clear_cache();
        assert!(c.cache().is_empty());
    }

    #[tokio::test]
    async fn clients_can_share_a_store() {
        let store: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());
        let a = Client::builder(MockAdapter::new()).cache(Arc::clone(&store)).build();
        let b = Client::builder(MockAdapter::new()).cache(Arc::clone(&store)).build();

        a.get("/shared").send().await.unwrap();
        assert!(b.query_cache(&b.get("/shared")).is_some());
    }

    #[tokio::test]
    async fn before_request_can_edit_the_descriptor() {
        let mock = MockAdapter::new();
        let c = Client::builder(mock.clone())
            .before_request(|req| req.headers.insert("Authorization", "Bearer t"))
            .build();
        c.post("/x").send().await.unwrap();
        let req = mock.last_request().unwrap();
        assert_eq!(req.headers.get("authorization"), Some("Bearer t"));
    }
}
