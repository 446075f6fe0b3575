//! Request strategy engine: declarative HTTP methods with caching, response
//! shaping and pluggable transports.
//!
//! # Overview
//! A [`Client`] is configured once with an adapter, a base url and cache
//! defaults. It produces [`Method`] values that describe one request each.
//! Sending a method consults the response cache, dispatches through the
//! adapter, decodes the response per [`ResponseExpect`], runs the optional
//! transform and stores successes back in the cache.
//!
//! # Design
//! - Transports implement [`RequestAdapter`]; cross-cutting behavior wraps an
//!   adapter through [`adapter::AdapterLayer`] instead of patching it.
//! - The cache is an injected [`CacheStore`]; clients may share one.
//! - Framework state lives behind [`states::StatesHook`], one implementation
//!   per reactive convention.
//! - `serde_json::Value` is the data currency between stages.

pub mod adapter;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod expect;
pub mod form;
pub mod headers;
pub mod http;
pub mod method;
pub mod states;

pub use adapter::{Capabilities, Progress, ProgressHandlers, RequestAdapter, SharedAdapter};
pub use cache::{CacheEntry, CacheFor, CacheStore, MemoryCache};
pub use client::{Client, ClientBuilder};
pub use config::ClientConfig;
pub use error::{Error, Result};
pub use expect::ResponseExpect;
pub use form::FormData;
pub use headers::Headers;
pub use http::{HttpMethod, HttpRequest, HttpResponse, RequestBody};
pub use method::{AbortHandle, Method};
pub use states::{use_request, PairHook, RequestStatus, StatesHook, UseRequest, WatchHook};
