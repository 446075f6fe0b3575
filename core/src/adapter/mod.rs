//! The request adapter contract and adapter composition.
//!
//! # Design
//! An adapter is the only component that performs I/O. It receives a fully
//! resolved [`HttpRequest`] and returns the [`HttpResponse`] for any status
//! code; interpreting the status belongs to the response pipeline. Adapters
//! advertise [`Capabilities`] so the engine can refuse progress handlers a
//! transport cannot honor before anything is sent.
//!
//! Behavior is added to an adapter by wrapping it: an [`AdapterLayer`] takes
//! the shared inner adapter and returns a new one. Layers are applied once,
//! when a client is built.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::http::{HttpRequest, HttpResponse};

#[cfg(feature = "blocking")]
pub mod blocking;
#[cfg(feature = "fetch")]
pub mod fetch;
pub mod mock;

/// Bytes transferred so far, and the total when it is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub loaded: u64,
    pub total: Option<u64>,
}

pub type ProgressHandler = Arc<dyn Fn(Progress) + Send + Sync>;

/// Progress callbacks attached to a single request.
#[derive(Clone, Default)]
pub struct ProgressHandlers {
    pub upload: Option<ProgressHandler>,
    pub download: Option<ProgressHandler>,
}

impl ProgressHandlers {
    pub fn report_upload(&self, progress: Progress) {
        if let Some(cb) = &self.upload {
            cb(progress);
        }
    }

    pub fn report_download(&self, progress: Progress) {
        if let Some(cb) = &self.download {
            cb(progress);
        }
    }
}

impl fmt::Debug for ProgressHandlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressHandlers")
            .field("upload", &self.upload.is_some())
            .field("download", &self.download.is_some())
            .finish()
    }
}

/// Optional features a transport can support.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub upload_progress: bool,
    pub download_progress: bool,
}

impl Capabilities {
    pub const ALL: Capabilities = Capabilities {
        upload_progress: true,
        download_progress: true,
    };

    pub const NONE: Capabilities = Capabilities {
        upload_progress: false,
        download_progress: false,
    };

    /// Capabilities present in both sets.
    pub fn intersect(self, other: Capabilities) -> Capabilities {
        Capabilities {
            upload_progress: self.upload_progress && other.upload_progress,
            download_progress: self.download_progress && other.download_progress,
        }
    }
}

/// A pluggable transport.
#[async_trait]
pub trait RequestAdapter: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> Capabilities {
        Capabilities::NONE
    }

    /// Execute `request`, reporting progress through `progress`.
    ///
    /// Returns `Error::Transport` when no response could be obtained. Every
    /// response the server sends, whatever its status, is `Ok`.
    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse>;
}

pub type SharedAdapter = Arc<dyn RequestAdapter>;

/// Fail when `progress` asks for a capability `adapter` lacks.
pub fn ensure_supported(adapter: &dyn RequestAdapter, progress: &ProgressHandlers) -> Result<()> {
    let caps = adapter.capabilities();
    if progress.upload.is_some() && !caps.upload_progress {
        return Err(Error::UnsupportedCapability {
            adapter: adapter.name(),
            capability: "upload progress",
        });
    }
    if progress.download.is_some() && !caps.download_progress {
        return Err(Error::UnsupportedCapability {
            adapter: adapter.name(),
            capability: "download progress",
        });
    }
    Ok(())
}

/// Wraps an adapter into an augmented one.
pub trait AdapterLayer: Send + Sync {
    fn layer(&self, inner: SharedAdapter) -> SharedAdapter;
}

/// Turn a closure into an [`AdapterLayer`].
pub fn layer_fn<F>(f: F) -> LayerFn<F>
where
    F: Fn(SharedAdapter) -> SharedAdapter + Send + Sync,
{
    LayerFn { f }
}

/// A layer backed by a closure, see [`layer_fn`].
#[derive(Clone)]
pub struct LayerFn<F> {
    f: F,
}

impl<F> AdapterLayer for LayerFn<F>
where
    F: Fn(SharedAdapter) -> SharedAdapter + Send + Sync,
{
    fn layer(&self, inner: SharedAdapter) -> SharedAdapter {
        (self.f)(inner)
    }
}

/// Apply `layers` to `adapter`, first layer innermost.
pub fn compose(adapter: SharedAdapter, layers: &[Arc<dyn AdapterLayer>]) -> SharedAdapter {
    layers.iter().fold(adapter, |inner, layer| layer.layer(inner))
}

/// Counts how many requests reach the wrapped adapter.
#[derive(Debug, Clone, Default)]
pub struct CountingLayer {
    count: Arc<AtomicUsize>,
}

impl CountingLayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl AdapterLayer for CountingLayer {
    fn layer(&self, inner: SharedAdapter) -> SharedAdapter {
        Arc::new(Counted {
            inner,
            count: Arc::clone(&self.count),
        })
    }
}

struct Counted {
    inner: SharedAdapter,
    count: Arc<AtomicUsize>,
}

#[async_trait]
impl RequestAdapter for Counted {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.inner.request(request, progress).await
    }
}

/// Narrows the capabilities an adapter advertises.
///
/// Useful to make a capable transport behave like a restricted one, e.g. to
/// reject upload progress the way a fetch-based transport does.
#[derive(Debug, Clone, Copy)]
pub struct RestrictLayer {
    allowed: Capabilities,
}

impl RestrictLayer {
    pub fn new(allowed: Capabilities) -> Self {
        Self { allowed }
    }

    pub fn without_upload_progress() -> Self {
        Self::new(Capabilities {
            upload_progress: false,
            download_progress: true,
        })
    }
}

impl AdapterLayer for RestrictLayer {
    fn layer(&self, inner: SharedAdapter) -> SharedAdapter {
        Arc::new(Restricted {
            inner,
            allowed: self.allowed,
        })
    }
}

struct Restricted {
    inner: SharedAdapter,
    allowed: Capabilities,
}

#[async_trait]
impl RequestAdapter for Restricted {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities().intersect(self.allowed)
    }

    async fn request(&self, request: HttpRequest, progress: ProgressHandlers) -> Result<HttpResponse> {
        ensure_supported(self, &progress)?;
        self.inner.request(request, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::Headers;
    use crate::http::{HttpMethod, RequestBody};
    use mock::MockAdapter;

    fn get(url: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            url: url.to_string(),
            headers: Headers::new(),
            body: RequestBody::Empty,
        }
    }

    #[test]
    fn intersect_keeps_common_capabilities() {
        let caps = Capabilities::ALL.intersect(Capabilities {
            upload_progress: false,
            download_progress: true,
        });
        assert!(!caps.upload_progress);
        assert!(caps.download_progress);
    }

    #[test]
    fn ensure_supported_rejects_upload_on_plain_adapter() {
        let adapter = MockAdapter::new().with_capabilities(Capabilities::NONE);
        let handlers = ProgressHandlers {
            upload: Some(Arc::new(|_| {})),
            download: None,
        };
        let err = ensure_supported(&adapter, &handlers).unwrap_err();
        assert_eq!(
            err,
            Error::UnsupportedCapability {
                adapter: "mock",
                capability: "upload progress"
            }
        );
        assert!(ensure_supported(&adapter, &ProgressHandlers::default()).is_ok());
    }

    #[tokio::test]
    async fn counting_layer_counts_each_call() {
        let counter = CountingLayer::new();
        let adapter = compose(
            Arc::new(MockAdapter::new()),
            &[Arc::new(counter.clone()) as Arc<dyn AdapterLayer>],
        );
        adapter.request(get("/a"), ProgressHandlers::default()).await.unwrap();
        adapter.request(get("/b"), ProgressHandlers::default()).await.unwrap();
        assert_eq!(counter.count(), 2);
    }

    #[tokio::test]
    async fn restrict_layer_hides_upload_progress() {
        let adapter = compose(
            Arc::new(MockAdapter::new()),
            &[Arc::new(RestrictLayer::without_upload_progress()) as Arc<dyn AdapterLayer>],
        );
        assert!(!adapter.capabilities().upload_progress);
        let handlers = ProgressHandlers {
            upload: Some(Arc::new(|_| {})),
            download: None,
        };
        let err = adapter.request(get("/upload"), handlers).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedCapability { .. }));
    }

    #[tokio::test]
    async fn closures_become_layers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_in_layer = Arc::clone(&seen);
        let layer = layer_fn(move |inner: SharedAdapter| -> SharedAdapter {
            seen_in_layer.fetch_add(1, Ordering::SeqCst);
            inner
        });
        let adapter = compose(Arc::new(MockAdapter::new()), &[Arc::new(layer) as Arc<dyn AdapterLayer>]);
        assert_eq!(adapter.name(), "mock");
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
