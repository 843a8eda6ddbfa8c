use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use super::{lock, ListenerId, Window};
use crate::messages::Message;
use crate::models::resume::ProfileDocument;

/// The API page scripts call. Hides the page → bridge → relay hops behind
/// plain async calls.
#[derive(Debug, Clone)]
pub struct PageClient {
    window: Window,
    timeout: Duration,
}

/// Removes a window listener when dropped, whether the owning call
/// resolved, timed out or was cancelled.
struct ListenerGuard<'a> {
    window: &'a Window,
    id: ListenerId,
}

impl Drop for ListenerGuard<'_> {
    fn drop(&mut self) {
        self.window.remove_listener(self.id);
    }
}

impl PageClient {
    pub(crate) fn new(window: Window, timeout: Duration) -> Self {
        Self { window, timeout }
    }

    /// Asks the extension for the stored document.
    ///
    /// Resolves with the first `EXTENSION_DATA_RESPONSE` seen after the
    /// request. If none arrives within the timeout the empty document is
    /// returned, the same as when the extension has nothing stored.
    pub async fn request_data(&self) -> ProfileDocument {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let id = self.window.add_listener(move |event| {
            if let Message::ExtensionDataResponse(data) = &event.data {
                if let Some(tx) = lock(&slot).take() {
                    let _ = tx.send(data.clone());
                }
            }
        });
        let _guard = ListenerGuard {
            window: &self.window,
            id,
        };

        self.window.post_message(Message::RequestExtensionData);

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(data)) => ProfileDocument::from_value_lossy(&data),
            Ok(Err(_)) => ProfileDocument::default(),
            Err(_) => {
                debug!("No extension data within {:?}", self.timeout);
                ProfileDocument::default()
            }
        }
    }

    /// Pushes the page's current document to the extension. Fire-and-forget.
    pub fn send_data(&self, doc: ProfileDocument) {
        self.window.post_message(Message::ResumeUpdatedFromPage(doc));
    }

    /// Calls `callback` for every document pushed from the extension.
    /// Each registration is independent; nothing is deduplicated.
    pub fn on_data_update<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(ProfileDocument) + Send + Sync + 'static,
    {
        self.window.add_listener(move |event| {
            if let Message::ResumeUpdatedFromExtension(doc) = &event.data {
                callback(doc.clone());
            }
        })
    }

    pub fn off_data_update(&self, id: ListenerId) -> bool {
        self.window.remove_listener(id)
    }
}
