//! Content bridge: one per attached page.
//!
//! Sits between the page's window channel and the background relay. It
//! never lets a relay failure reach page code. Syncs that cannot be
//! delivered are dropped and data requests are answered with `{}`.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::messages::{empty_data, Message, Reply};
use crate::page::{ListenerId, WeakWindow, Window, WindowEvent, WindowId};
use crate::relay::{Envelope, RelayHandle, TabId};

/// Element id of the one-shot client injection script.
const CLIENT_SCRIPT_ID: &str = "resume-sync-client";

pub struct ContentBridge {
    tab: TabId,
    window: Window,
    relay: RelayHandle,
    page_listener: ListenerId,
    pump: JoinHandle<()>,
}

impl ContentBridge {
    /// Attaches to `window` as tab `tab`: injects the page client, connects
    /// to the relay and starts relaying in both directions.
    pub async fn attach(tab: TabId, window: Window, relay: RelayHandle) -> Self {
        inject_client(&window, relay.timeout());

        let (port, inbox) = mpsc::unbounded_channel();
        if let Err(e) = relay.connect_tab(tab, port).await {
            warn!("Tab {tab}: could not connect to background relay: {e}");
        }

        let page_listener = {
            let own = window.downgrade();
            let own_id = window.id();
            let relay = relay.clone();
            let runtime = Handle::current();
            window.add_listener(move |event| {
                on_page_message(event, own_id, &own, &relay, &runtime)
            })
        };
        let pump = tokio::spawn(pump_extension_messages(tab, inbox, window.clone()));

        debug!("Tab {tab}: content bridge attached");
        Self {
            tab,
            window,
            relay,
            page_listener,
            pump,
        }
    }

    pub fn tab(&self) -> TabId {
        self.tab
    }

    /// Disconnects from the relay and stops relaying.
    pub async fn detach(self) {
        if let Err(e) = self.relay.disconnect_tab(self.tab).await {
            debug!("Tab {}: disconnect not delivered: {e}", self.tab);
        }
        // Drop removes the listener and stops the pump.
    }
}

impl Drop for ContentBridge {
    fn drop(&mut self) {
        self.window.remove_listener(self.page_listener);
        self.pump.abort();
    }
}

/// Injects the client API once per window. The script element does not
/// outlive its evaluation.
fn inject_client(window: &Window, request_timeout: Duration) -> bool {
    if window.has_client() {
        debug!("Page client already present, skipping injection");
        return false;
    }
    window.evaluate_script(CLIENT_SCRIPT_ID, |w| w.expose_client(request_timeout))
}

async fn pump_extension_messages(
    tab: TabId,
    mut inbox: mpsc::UnboundedReceiver<Envelope>,
    window: Window,
) {
    while let Some(envelope) = inbox.recv().await {
        on_extension_message(tab, &window, envelope);
    }
    debug!("Tab {tab}: relay closed the bridge channel");
}

fn on_extension_message(tab: TabId, window: &Window, envelope: Envelope) {
    let Envelope { message, reply } = envelope;
    let tag = message.tag();
    match message {
        Message::ResumeUpdated(doc) | Message::ResumeSynced(doc) => {
            window.post_message(Message::ResumeUpdatedFromExtension(doc));
        }
        Message::GetPageData => {
            let data = window.page_data().unwrap_or_else(empty_data);
            if let Some(tx) = reply {
                let _ = tx.send(Reply::data(data));
            }
        }
        Message::GetResumeData
        | Message::SaveResumeData(_)
        | Message::SyncFromWeb(_)
        | Message::ResumeUpdatedFromPage(_)
        | Message::RequestExtensionData
        | Message::ExtensionDataResponse(_)
        | Message::ResumeUpdatedFromExtension(_) => {
            debug!("Tab {tab}: ignoring {tag} from relay");
        }
    }
}

fn on_page_message(
    event: &WindowEvent,
    own_id: WindowId,
    own: &WeakWindow,
    relay: &RelayHandle,
    runtime: &Handle,
) {
    if event.source != own_id {
        debug!("Ignoring {} posted by a foreign window", event.data.tag());
        return;
    }

    match &event.data {
        Message::ResumeUpdatedFromPage(doc) => {
            let relay = relay.clone();
            let message = Message::SyncFromWeb(doc.clone());
            runtime.spawn(async move {
                match relay.request(message).await {
                    Ok(reply) => debug!("SYNC_FROM_WEB answered: {reply:?}"),
                    Err(e) => debug!("SYNC_FROM_WEB dropped: {e}"),
                }
            });
        }
        Message::RequestExtensionData => {
            let relay = relay.clone();
            let own = own.clone();
            runtime.spawn(async move {
                let data = match relay.request(Message::GetResumeData).await {
                    Ok(reply) => reply.into_data().unwrap_or_else(empty_data),
                    Err(e) => {
                        debug!("GET_RESUME_DATA failed, answering empty: {e}");
                        empty_data()
                    }
                };
                if let Some(window) = own.upgrade() {
                    window.post_message(Message::ExtensionDataResponse(data));
                }
            });
        }
        // Page-side traffic the bridge itself posted, or tags meant for others.
        Message::GetResumeData
        | Message::SaveResumeData(_)
        | Message::SyncFromWeb(_)
        | Message::ResumeUpdated(_)
        | Message::ResumeSynced(_)
        | Message::GetPageData
        | Message::ExtensionDataResponse(_)
        | Message::ResumeUpdatedFromExtension(_) => {}
    }
}
