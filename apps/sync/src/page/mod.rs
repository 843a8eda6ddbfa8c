//! The hosted page's own execution context.
//!
//! A [`Window`] carries the same-process message channel that page scripts
//! and the content bridge share, the document tree, and the optional
//! page-local data object. Dispatch is synchronous and in registration order,
//! like a DOM event loop turn.

pub mod client;

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, Weak};
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::messages::Message;

pub use client::PageClient;

/// Identity of a window, used for the same-window guard on incoming events.
pub type WindowId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

/// One `message` event as seen by window listeners.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowEvent {
    /// The window that posted the event.
    pub source: WindowId,
    pub data: Message,
}

type Listener = Arc<dyn Fn(&WindowEvent) + Send + Sync>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub tag: String,
    pub id: Option<String>,
}

/// The slice of the document tree that injection touches.
#[derive(Debug, Default)]
pub struct Document {
    children: Vec<Element>,
}

impl Document {
    pub fn append(&mut self, element: Element) {
        self.children.push(element);
    }

    pub fn remove_by_id(&mut self, id: &str) -> Option<Element> {
        let pos = self
            .children
            .iter()
            .position(|e| e.id.as_deref() == Some(id))?;
        Some(self.children.remove(pos))
    }

    pub fn count_tag(&self, tag: &str) -> usize {
        self.children.iter().filter(|e| e.tag == tag).count()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

#[derive(Default)]
struct WindowInner {
    id: WindowId,
    listeners: Mutex<BTreeMap<ListenerId, Listener>>,
    next_listener: AtomicU64,
    document: Mutex<Document>,
    page_data: Mutex<Option<Value>>,
    /// Set once the client API has been injected; holds its request timeout.
    client_timeout: OnceLock<Duration>,
    script_evaluations: AtomicUsize,
}

/// Non-owning window reference for callbacks registered on the window itself.
#[derive(Clone)]
pub struct WeakWindow {
    inner: Weak<WindowInner>,
}

impl WeakWindow {
    pub fn upgrade(&self) -> Option<Window> {
        self.inner.upgrade().map(|inner| Window { inner })
    }
}

/// Cheaply cloneable reference to one page window.
#[derive(Clone)]
pub struct Window {
    inner: Arc<WindowInner>,
}

impl std::fmt::Debug for Window {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Window")
            .field("id", &self.inner.id)
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl Default for Window {
    fn default() -> Self {
        Self::new()
    }
}

impl Window {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(WindowInner {
                id: Uuid::new_v4(),
                ..WindowInner::default()
            }),
        }
    }

    pub fn id(&self) -> WindowId {
        self.inner.id
    }

    pub fn downgrade(&self) -> WeakWindow {
        WeakWindow {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// `window.postMessage(data)` from a script running in this window.
    pub fn post_message(&self, data: Message) {
        self.dispatch(WindowEvent {
            source: self.id(),
            data,
        });
    }

    /// Delivers an event posted by another window (an iframe or opener).
    pub fn receive_from(&self, source: WindowId, data: Message) {
        self.dispatch(WindowEvent { source, data });
    }

    fn dispatch(&self, event: WindowEvent) {
        // Snapshot so listeners may add, remove or post while being called.
        let listeners: Vec<Listener> = lock(&self.inner.listeners).values().cloned().collect();
        debug!(
            "Dispatching {} to {} window listeners",
            event.data.tag(),
            listeners.len()
        );
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn add_listener<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&WindowEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.inner.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.listeners).insert(id, Arc::new(listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        lock(&self.inner.listeners).remove(&id).is_some()
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner.listeners).len()
    }

    pub fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> R {
        f(&mut lock(&self.inner.document))
    }

    /// Sets the page-local data object the host page exposes to the bridge.
    pub fn set_page_data(&self, data: Option<Value>) {
        *lock(&self.inner.page_data) = data;
    }

    pub fn page_data(&self) -> Option<Value> {
        lock(&self.inner.page_data).clone()
    }

    /// The client API injected into this window, if any.
    pub fn client(&self) -> Option<PageClient> {
        let timeout = *self.inner.client_timeout.get()?;
        Some(PageClient::new(self.clone(), timeout))
    }

    /// Evaluates a script in the page: a `<script>` element is appended,
    /// `run` executes, and the element is removed again before returning.
    pub fn evaluate_script<R>(&self, script_id: &str, run: impl FnOnce(&Window) -> R) -> R {
        self.with_document(|doc| {
            doc.append(Element {
                tag: "script".to_string(),
                id: Some(script_id.to_string()),
            })
        });
        self.inner.script_evaluations.fetch_add(1, Ordering::Relaxed);
        let result = run(self);
        if self.with_document(|doc| doc.remove_by_id(script_id)).is_none() {
            warn!("Script element {script_id} already gone after evaluation");
        }
        result
    }

    pub fn script_evaluations(&self) -> usize {
        self.inner.script_evaluations.load(Ordering::Relaxed)
    }

    /// Exposes the client API as a page global. Returns `false` when it
    /// was already installed.
    pub(crate) fn expose_client(&self, request_timeout: Duration) -> bool {
        self.inner.client_timeout.set(request_timeout).is_ok()
    }

    pub(crate) fn has_client(&self) -> bool {
        self.inner.client_timeout.get().is_some()
    }
}

/// Listener callbacks must not poison page state for later turns.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
