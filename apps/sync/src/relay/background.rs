use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::multicast::{delivered_count, TabRegistry};
use super::{Command, Envelope, RelayHandle};
use crate::config::Config;
use crate::messages::{empty_data, Message, Reply};
use crate::models::resume::ProfileDocument;
use crate::store::{PersistentStore, StorageChange, StoreError, CURRENT_RESUME_KEY};

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct RelayOptions {
    /// Upper bound on every request/response exchange through a handle.
    pub request_timeout: Duration,
    /// Report failed writes as `{ success: false }` instead of `{ success: true }`.
    pub strict_storage_errors: bool,
}

impl Default for RelayOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(5000),
            strict_storage_errors: false,
        }
    }
}

impl From<&Config> for RelayOptions {
    fn from(config: &Config) -> Self {
        Self {
            request_timeout: config.request_timeout,
            strict_storage_errors: config.strict_storage_errors,
        }
    }
}

/// Seeds the store, then starts the relay task and its store observer.
pub async fn spawn(store: Arc<dyn PersistentStore>, options: RelayOptions) -> RelayHandle {
    let relay = BackgroundRelay {
        store: store.clone(),
        tabs: TabRegistry::new(),
        strict_storage_errors: options.strict_storage_errors,
    };
    relay.install().await;

    let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
    tokio::spawn(observe_store(store.subscribe(), tx.downgrade()));
    tokio::spawn(relay.run(rx));

    info!(
        "Background relay started (timeout {:?}, strict storage errors: {})",
        options.request_timeout, options.strict_storage_errors
    );
    RelayHandle::new(tx, options.request_timeout)
}

struct BackgroundRelay {
    store: Arc<dyn PersistentStore>,
    tabs: TabRegistry,
    strict_storage_errors: bool,
}

impl BackgroundRelay {
    /// Install-time seeding. Never overwrites an existing document.
    async fn install(&self) {
        match self.store.get(CURRENT_RESUME_KEY).await {
            Ok(Some(_)) => debug!("Profile document already present, skipping seed"),
            Ok(None) => match self.write_resume(&ProfileDocument::default()).await {
                Ok(()) => info!("Seeded empty profile document"),
                Err(e) => warn!("Failed to seed profile document: {e}"),
            },
            Err(e) => warn!("Failed to read profile document during install: {e}"),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        while let Some(command) = commands.recv().await {
            self.dispatch(command).await;
        }
        debug!("Background relay stopped: all handles dropped");
    }

    async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Deliver(envelope) => self.handle(envelope).await,
            Command::Connect { tab, port } => {
                self.tabs.connect(tab, port);
                debug!("Tab {tab} connected ({} open)", self.tabs.len());
            }
            Command::Disconnect { tab } => {
                if self.tabs.disconnect(tab) {
                    debug!("Tab {tab} disconnected ({} open)", self.tabs.len());
                }
            }
            Command::Broadcast { message, done } => {
                let outcomes = self.tabs.multicast(&message);
                let _ = done.send(outcomes);
            }
            Command::TabPort { tab, done } => {
                let _ = done.send(self.tabs.port(tab));
            }
            Command::StoreChanged(doc) => self.fan_out(Message::ResumeSynced(doc)),
        }
    }

    async fn handle(&mut self, envelope: Envelope) {
        let Envelope { message, reply } = envelope;
        let tag = message.tag();
        let respond = |r: Reply| {
            if let Some(tx) = reply {
                let _ = tx.send(r);
            }
        };

        match message {
            Message::GetResumeData => respond(self.read_resume().await),
            Message::SaveResumeData(doc) => {
                let committed = self.write_resume(&doc).await;
                respond(self.write_reply(tag, &committed));
                if committed.is_ok() {
                    self.fan_out(Message::ResumeUpdated(doc));
                }
            }
            Message::SyncFromWeb(doc) => {
                let committed = self.write_resume(&doc).await;
                respond(self.write_reply(tag, &committed));
            }
            Message::ResumeUpdated(_)
            | Message::ResumeSynced(_)
            | Message::GetPageData
            | Message::ResumeUpdatedFromPage(_)
            | Message::RequestExtensionData
            | Message::ExtensionDataResponse(_)
            | Message::ResumeUpdatedFromExtension(_) => {
                warn!("Ignoring {tag}: not addressed to the background relay");
            }
        }
    }

    /// Absence and read failures both answer `{ data: {} }`.
    async fn read_resume(&self) -> Reply {
        match self.store.get(CURRENT_RESUME_KEY).await {
            Ok(Some(value)) => Reply::data(value),
            Ok(None) => Reply::data(empty_data()),
            Err(e) => {
                warn!("Failed to read profile document: {e}");
                Reply::data(empty_data())
            }
        }
    }

    async fn write_resume(&self, doc: &ProfileDocument) -> Result<(), StoreError> {
        let value = serde_json::to_value(doc)?;
        self.store.set(CURRENT_RESUME_KEY, value).await
    }

    fn write_reply(&self, tag: &str, committed: &Result<(), StoreError>) -> Reply {
        match committed {
            Ok(()) => Reply::success(),
            Err(e) => {
                warn!("{tag}: failed to write profile document: {e}");
                if self.strict_storage_errors {
                    Reply::failed(e.to_string())
                } else {
                    Reply::success()
                }
            }
        }
    }

    fn fan_out(&mut self, message: Message) {
        let tag = message.tag();
        let outcomes = self.tabs.multicast(&message);
        debug!(
            "{tag} delivered to {} of {} tabs",
            delivered_count(&outcomes),
            outcomes.len()
        );
    }
}

/// Turns committed writes of the profile document key into `RESUME_SYNCED`
/// fan-outs. Runs until the store feed closes or the relay is gone.
async fn observe_store(
    mut changes: broadcast::Receiver<StorageChange>,
    commands: mpsc::WeakSender<Command>,
) {
    loop {
        let change = match changes.recv().await {
            Ok(change) => change,
            Err(RecvError::Lagged(skipped)) => {
                warn!("Store observer lagged, {skipped} changes skipped");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        if change.key != CURRENT_RESUME_KEY {
            continue;
        }
        let Some(value) = change.new_value else {
            continue;
        };

        let Some(commands) = commands.upgrade() else {
            break;
        };
        let doc = ProfileDocument::from_value_lossy(&value);
        if commands.send(Command::StoreChanged(doc)).await.is_err() {
            break;
        }
    }
    debug!("Store observer stopped");
}
