//! Binding a method's lifecycle to a UI framework's reactive state.
//!
//! # Design
//! Each framework binding implements [`StatesHook`], which names the shape
//! the framework uses for its primitives (`State`, `Computed`, `Watched`,
//! `StateExport`, `ComputedExport`) and the handful of operations the engine
//! needs on them. The binding is chosen at configuration time by picking the
//! hook type; nothing here inherits from anything.
//!
//! Two bindings ship with the crate:
//! - [`PairHook`]: the value + setter convention. Exports are
//!   `(snapshot, Setter)` pairs and every update triggers a re-render
//!   callback.
//! - [`WatchHook`]: the signal convention over `tokio::sync::watch`; exports
//!   are receivers that observe every update.
//!
//! [`use_request`] projects idle/pending/success/error onto either binding.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::method::Method;

/// Values that can live in framework state.
pub trait StateValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> StateValue for T {}

/// The contract a framework binding satisfies.
pub trait StatesHook: Send + Sync + 'static {
    /// Framework name, for diagnostics.
    const NAME: &'static str;

    /// A mutable reactive cell.
    type State<T: StateValue>: Clone + Send + Sync;
    /// A value derived from a state.
    type Computed<T: StateValue>: Clone + Send + Sync;
    /// What the framework hands to watchers of a state.
    type Watched<T: StateValue>;
    /// What a state looks like when handed to UI code.
    type StateExport<T: StateValue>;
    /// What a computed value looks like when handed to UI code.
    type ComputedExport<T: StateValue>;

    fn create<T: StateValue>(&self, initial: T) -> Self::State<T>;

    /// Current plain value of `state`.
    fn dehydrate<T: StateValue>(&self, state: &Self::State<T>) -> T;

    fn update<T: StateValue>(&self, state: &Self::State<T>, value: T);

    fn computed<T, U, F>(&self, source: &Self::State<T>, f: F) -> Self::Computed<U>
    where
        T: StateValue,
        U: StateValue,
        F: Fn(&T) -> U + Send + Sync + 'static;

    fn watch<T: StateValue>(&self, state: &Self::State<T>) -> Self::Watched<T>;

    fn export_state<T: StateValue>(&self, state: &Self::State<T>) -> Self::StateExport<T>;

    fn export_computed<T: StateValue>(&self, computed: &Self::Computed<T>) -> Self::ComputedExport<T>;
}

/// A lazily evaluated derived value, shared by both bindings.
#[derive(Clone)]
pub struct Derived<T> {
    read: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> Derived<T> {
    pub fn get(&self) -> T {
        (self.read)()
    }
}

impl<T> fmt::Debug for Derived<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Derived(..)")
    }
}

// ---------------------------------------------------------------------------
// Value + setter binding
// ---------------------------------------------------------------------------

type Rerender = Arc<dyn Fn() + Send + Sync>;

/// Reactive cell of [`PairHook`].
pub struct Cell<T> {
    value: Arc<RwLock<T>>,
    changes: Arc<watch::Sender<u64>>,
    rerender: Option<Rerender>,
}

impl<T> Clone for Cell<T> {
    fn clone(&self) -> Self {
        Self {
            value: Arc::clone(&self.value),
            changes: Arc::clone(&self.changes),
            rerender: self.rerender.clone(),
        }
    }
}

impl<T: Clone> Cell<T> {
    fn get(&self) -> T {
        self.value.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
        self.changes.send_modify(|version| *version += 1);
        if let Some(rerender) = &self.rerender {
            rerender();
        }
    }
}

/// Setter half of a [`PairHook`] export.
pub struct Setter<T> {
    cell: Cell<T>,
}

impl<T> Clone for Setter<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T: Clone> Setter<T> {
    pub fn set(&self, value: T) {
        self.cell.set(value);
    }

    /// Set from the previous value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.cell.get());
        self.cell.set(next);
    }
}

/// Value + setter binding. Every update calls the re-render callback.
#[derive(Clone, Default)]
pub struct PairHook {
    rerender: Option<Rerender>,
}

impl PairHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_rerender<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self {
            rerender: Some(Arc::new(f)),
        }
    }
}

impl StatesHook for PairHook {
    const NAME: &'static str = "Pair";

    type State<T: StateValue> = Cell<T>;
    type Computed<T: StateValue> = Derived<T>;
    /// Version counter bumped on every update.
    type Watched<T: StateValue> = watch::Receiver<u64>;
    type StateExport<T: StateValue> = (T, Setter<T>);
    type ComputedExport<T: StateValue> = T;

    fn create<T: StateValue>(&self, initial: T) -> Cell<T> {
        let (changes, _) = watch::channel(0);
        Cell {
            value: Arc::new(RwLock::new(initial)),
            changes: Arc::new(changes),
            rerender: self.rerender.clone(),
        }
    }

    fn dehydrate<T: StateValue>(&self, state: &Cell<T>) -> T {
        state.get()
    }

    fn update<T: StateValue>(&self, state: &Cell<T>, value: T) {
        state.set(value);
    }

    fn computed<T, U, F>(&self, source: &Cell<T>, f: F) -> Derived<U>
    where
        T: StateValue,
        U: StateValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = source.clone();
        Derived {
            read: Arc::new(move || f(&source.get())),
        }
    }

    fn watch<T: StateValue>(&self, state: &Cell<T>) -> watch::Receiver<u64> {
        state.changes.subscribe()
    }

    fn export_state<T: StateValue>(&self, state: &Cell<T>) -> (T, Setter<T>) {
        (state.get(), Setter { cell: state.clone() })
    }

    fn export_computed<T: StateValue>(&self, computed: &Derived<T>) -> T {
        computed.get()
    }
}

// ---------------------------------------------------------------------------
// Signal binding
// ---------------------------------------------------------------------------

/// Signal binding over `tokio::sync::watch`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchHook;

impl StatesHook for WatchHook {
    const NAME: &'static str = "Watch";

    type State<T: StateValue> = Arc<watch::Sender<T>>;
    type Computed<T: StateValue> = Derived<T>;
    type Watched<T: StateValue> = watch::Receiver<T>;
    type StateExport<T: StateValue> = watch::Receiver<T>;
    type ComputedExport<T: StateValue> = Derived<T>;

    fn create<T: StateValue>(&self, initial: T) -> Arc<watch::Sender<T>> {
        let (tx, _) = watch::channel(initial);
        Arc::new(tx)
    }

    fn dehydrate<T: StateValue>(&self, state: &Arc<watch::Sender<T>>) -> T {
        state.borrow().clone()
    }

    fn update<T: StateValue>(&self, state: &Arc<watch::Sender<T>>, value: T) {
        state.send_replace(value);
    }

    fn computed<T, U, F>(&self, source: &Arc<watch::Sender<T>>, f: F) -> Derived<U>
    where
        T: StateValue,
        U: StateValue,
        F: Fn(&T) -> U + Send + Sync + 'static,
    {
        let source = Arc::clone(source);
        Derived {
            read: Arc::new(move || f(&source.borrow())),
        }
    }

    fn watch<T: StateValue>(&self, state: &Arc<watch::Sender<T>>) -> watch::Receiver<T> {
        state.subscribe()
    }

    fn export_state<T: StateValue>(&self, state: &Arc<watch::Sender<T>>) -> watch::Receiver<T> {
        state.subscribe()
    }

    fn export_computed<T: StateValue>(&self, computed: &Derived<T>) -> Derived<T> {
        computed.clone()
    }
}

// ---------------------------------------------------------------------------
// Request lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    Pending,
    Success,
    Error,
}

/// A method bound to framework state.
pub struct UseRequest<H: StatesHook> {
    hook: H,
    method: Method,
    pub loading: H::State<bool>,
    pub data: H::State<Option<Value>>,
    pub error: H::State<Option<Error>>,
    pub status: H::State<RequestStatus>,
    /// True once the last send settled, successfully or not.
    pub is_done: H::Computed<bool>,
}

/// Everything a UI component reads, in the binding's export shapes.
pub struct RequestExports<H: StatesHook> {
    pub loading: H::StateExport<bool>,
    pub data: H::StateExport<Option<Value>>,
    pub error: H::StateExport<Option<Error>>,
    pub status: H::StateExport<RequestStatus>,
    pub is_done: H::ComputedExport<bool>,
}

/// Bind `method` to states created by `hook`. Nothing is sent until
/// [`UseRequest::send`] is called.
pub fn use_request<H: StatesHook>(hook: H, method: Method) -> UseRequest<H> {
    let loading = hook.create(false);
    let data = hook.create::<Option<Value>>(None);
    let error = hook.create::<Option<Error>>(None);
    let status = hook.create(RequestStatus::Idle);
    let is_done = hook.computed::<RequestStatus, bool, _>(&status, |s| {
        matches!(s, RequestStatus::Success | RequestStatus::Error)
    });
    UseRequest {
        hook,
        method,
        loading,
        data,
        error,
        status,
        is_done,
    }
}

impl<H: StatesHook> UseRequest<H> {
    pub fn initial_data(self, value: Value) -> Self {
        self.hook.update(&self.data, Some(value));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Send the method and mirror its lifecycle into the states.
    pub async fn send(&self) -> Result<Value> {
        self.hook.update(&self.status, RequestStatus::Pending);
        self.hook.update(&self.loading, true);
        self.hook.update(&self.error, None::<Error>);

        let result = self.method.send().await;
        match &result {
            Ok(value) => {
                self.hook.update(&self.data, Some(value.clone()));
                self.hook.update(&self.status, RequestStatus::Success);
            }
            Err(e) => {
                self.hook.update(&self.error, Some(e.clone()));
                self.hook.update(&self.status, RequestStatus::Error);
            }
        }
        self.hook.update(&self.loading, false);
        result
    }

    pub fn abort(&self) {
        self.method.abort();
    }

    /// Replace the data state without sending, e.g. for optimistic updates.
    pub fn update_data(&self, value: Value) {
        self.hook.update(&self.data, Some(value));
    }

    pub fn snapshot_status(&self) -> RequestStatus {
        self.hook.dehydrate::<RequestStatus>(&self.status)
    }

    pub fn exports(&self) -> RequestExports<H> {
        RequestExports {
            loading: self.hook.export_state::<bool>(&self.loading),
            data: self.hook.export_state::<Option<Value>>(&self.data),
            error: self.hook.export_state::<Option<Error>>(&self.error),
            status: self.hook.export_state::<RequestStatus>(&self.status),
            is_done: self.hook.export_computed::<bool>(&self.is_done),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::client::Client;
    use crate::http::HttpMethod;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn client(mock: MockAdapter) -> Client {
        Client::builder(mock).build()
    }

    #[test]
    fn pair_hook_exports_value_and_setter() {
        let renders = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&renders);
        let hook = PairHook::on_rerender(move || {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        let state = hook.create(1);
        let (value, setter) = hook.export_state(&state);
        assert_eq!(value, 1);

        setter.set(2);
        setter.update(|v| v * 10);
        assert_eq!(hook.dehydrate(&state), 20);
        assert_eq!(renders.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pair_hook_computed_follows_source() {
        let hook = PairHook::new();
        let state = hook.create(2);
        let doubled = hook.computed(&state, |v| v * 2);
        assert_eq!(hook.export_computed(&doubled), 4);
        hook.update(&state, 5);
        assert_eq!(doubled.get(), 10);
    }

    #[test]
    fn pair_hook_watch_sees_versions() {
        let hook = PairHook::new();
        let state = hook.create("a".to_string());
        let watched = hook.watch(&state);
        hook.update(&state, "b".to_string());
        hook.update(&state, "c".to_string());
        assert_eq!(*watched.borrow(), 2);
        assert!(watched.has_changed().unwrap());
    }

    #[test]
    fn watch_hook_exports_receivers() {
        let hook = WatchHook;
        let state = hook.create(0u32);
        let rx = hook.export_state(&state);
        let is_zero = hook.computed(&state, |v| *v == 0);
        hook.update(&state, 7);
        assert_eq!(*rx.borrow(), 7);
        assert!(!hook.export_computed(&is_zero).get());
        assert_eq!(hook.dehydrate(&state), 7);
    }

    #[test]
    fn hook_names() {
        assert_eq!(PairHook::NAME, "Pair");
        assert_eq!(WatchHook::NAME, "Watch");
    }

    #[tokio::test]
    async fn use_request_mirrors_success() {
        let mock = MockAdapter::new().json(HttpMethod::Get, "/user", 200, json!({"name": "ada"}));
        let req = use_request(PairHook::new(), client(mock).get("/user"));
        assert_eq!(req.snapshot_status(), RequestStatus::Idle);
        assert!(!req.is_done.get());

        let value = req.send().await.unwrap();
        assert_eq!(value, json!({"name": "ada"}));

        let exports = req.exports();
        assert_eq!(exports.status.0, RequestStatus::Success);
        assert_eq!(exports.data.0, Some(json!({"name": "ada"})));
        assert!(!exports.loading.0);
        assert!(exports.error.0.is_none());
        assert!(exports.is_done);
    }

    #[tokio::test]
    async fn use_request_mirrors_errors() {
        let mock = MockAdapter::new().json(HttpMethod::Get, "/user", 503, json!({}));
        let req = use_request(WatchHook, client(mock).get("/user"));
        let exports = req.exports();

        req.send().await.unwrap_err();
        assert_eq!(*exports.status.borrow(), RequestStatus::Error);
        assert!(matches!(
            exports.error.borrow().as_ref(),
            Some(Error::HttpStatus { status: 503, .. })
        ));
        assert!(exports.data.borrow().is_none());
        assert!(exports.is_done.get());
    }

    #[tokio::test(start_paused = true)]
    async fn use_request_is_pending_while_in_flight() {
        let mock = MockAdapter::new().delay(Duration::from_secs(1));
        let req = Arc::new(use_request(WatchHook, client(mock).post("/slow")));
        let mut status = req.exports().status;

        let task = {
            let req = Arc::clone(&req);
            tokio::spawn(async move { req.send().await })
        };
        status.wait_for(|s| *s == RequestStatus::Pending).await.unwrap();
        assert!(*req.exports().loading.borrow());

        task.await.unwrap().unwrap();
        assert_eq!(req.snapshot_status(), RequestStatus::Success);
        assert!(!*req.exports().loading.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn abort_lands_in_the_error_state() {
        let mock = MockAdapter::new().delay(Duration::from_secs(10));
        let req = Arc::new(use_request(WatchHook, client(mock).post("/slow")));
        let mut status = req.exports().status;

        let task = {
            let req = Arc::clone(&req);
            tokio::spawn(async move { req.send().await })
        };
        status.wait_for(|s| *s == RequestStatus::Pending).await.unwrap();
        req.abort();

        assert_eq!(task.await.unwrap().unwrap_err(), Error::Aborted);
        assert_eq!(req.snapshot_status(), RequestStatus::Error);
        assert_eq!(*req.exports().error.borrow(), Some(Error::Aborted));
    }

    #[tokio::test]
    async fn initial_and_manual_data() {
        let req = use_request(PairHook::new(), client(MockAdapter::new()).get("/x"))
            .initial_data(json!([]));
        assert_eq!(req.exports().data.0, Some(json!([])));
        req.update_data(json!([1]));
        assert_eq!(req.exports().data.0, Some(json!([1])));
    }
}
