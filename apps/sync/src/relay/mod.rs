//! Background relay: the single owner of the profile document.
//!
//! Callers never touch the store. They hold a [`RelayHandle`] and queue
//! commands onto the relay's inbox, which a single task drains in order.

pub mod background;
pub mod multicast;

use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use crate::messages::{Message, Reply};
use crate::models::resume::ProfileDocument;

pub use background::{spawn, RelayOptions};
pub use multicast::{Delivery, DeliveryOutcome, TabId};

/// Channel into one page's content bridge.
pub type TabPort = mpsc::UnboundedSender<Envelope>;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Background relay is unreachable")]
    Unreachable,

    #[error("Background relay did not answer within {0:?}")]
    TimedOut(Duration),

    #[error("Message was not answered by its receiver")]
    NoReply,
}

/// A message in flight together with the slot its answer goes into.
#[derive(Debug)]
pub struct Envelope {
    pub message: Message,
    pub reply: Option<oneshot::Sender<Reply>>,
}

impl Envelope {
    pub fn notify(message: Message) -> Self {
        Self {
            message,
            reply: None,
        }
    }

    pub fn request(message: Message) -> (Self, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                message,
                reply: Some(tx),
            },
            rx,
        )
    }

    /// Answers the sender, if it asked for an answer and is still waiting.
    pub fn respond(self, reply: Reply) {
        if let Some(tx) = self.reply {
            let _ = tx.send(reply);
        }
    }
}

#[derive(Debug)]
pub(crate) enum Command {
    Deliver(Envelope),
    Connect {
        tab: TabId,
        port: TabPort,
    },
    Disconnect {
        tab: TabId,
    },
    Broadcast {
        message: Message,
        done: oneshot::Sender<Vec<DeliveryOutcome>>,
    },
    TabPort {
        tab: TabId,
        done: oneshot::Sender<Option<TabPort>>,
    },
    StoreChanged(ProfileDocument),
}

/// Cloneable client side of the relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    commands: mpsc::Sender<Command>,
    timeout: Duration,
}

impl RelayHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, timeout: Duration) -> Self {
        Self { commands, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends a request-style message and waits (bounded) for its reply.
    pub async fn request(&self, message: Message) -> Result<Reply, RelayError> {
        let (envelope, rx) = Envelope::request(message);
        self.bounded(async {
            self.send(Command::Deliver(envelope)).await?;
            rx.await.map_err(|_| RelayError::NoReply)
        })
        .await
    }

    /// Fire-and-forget delivery.
    pub async fn notify(&self, message: Message) -> Result<(), RelayError> {
        self.bounded(self.send(Command::Deliver(Envelope::notify(message))))
            .await
    }

    pub async fn connect_tab(&self, tab: TabId, port: TabPort) -> Result<(), RelayError> {
        self.bounded(self.send(Command::Connect { tab, port })).await
    }

    pub async fn disconnect_tab(&self, tab: TabId) -> Result<(), RelayError> {
        self.bounded(self.send(Command::Disconnect { tab })).await
    }

    /// Best-effort multicast to every connected tab.
    pub async fn broadcast(&self, message: Message) -> Result<Vec<DeliveryOutcome>, RelayError> {
        let (done, rx) = oneshot::channel();
        self.bounded(async {
            self.send(Command::Broadcast { message, done }).await?;
            rx.await.map_err(|_| RelayError::Unreachable)
        })
        .await
    }

    /// Asks one tab's bridge for its page-local data object.
    /// `Ok(None)` when no such tab is connected.
    pub async fn request_page_data(&self, tab: TabId) -> Result<Option<Value>, RelayError> {
        let (done, rx) = oneshot::channel();
        self.bounded(async {
            self.send(Command::TabPort { tab, done }).await?;
            let Some(port) = rx.await.map_err(|_| RelayError::Unreachable)? else {
                return Ok(None);
            };
            let (envelope, reply) = Envelope::request(Message::GetPageData);
            port.send(envelope).map_err(|_| RelayError::Unreachable)?;
            let reply = reply.await.map_err(|_| RelayError::NoReply)?;
            Ok(reply.into_data())
        })
        .await
    }

    async fn send(&self, command: Command) -> Result<(), RelayError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| RelayError::Unreachable)
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, RelayError>>,
    ) -> Result<T, RelayError> {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| RelayError::TimedOut(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_request_to_dropped_relay_is_unreachable() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let handle = RelayHandle::new(tx, Duration::from_millis(50));
        let err = handle.request(Message::GetResumeData).await.unwrap_err();
        assert!(matches!(err, RelayError::Unreachable));
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_to_stalled_relay_times_out() {
        // Receiver kept alive but never drained.
        let (tx, _rx) = mpsc::channel(1);
        let handle = RelayHandle::new(tx, Duration::from_secs(5));
        let err = handle.request(Message::GetResumeData).await.unwrap_err();
        assert!(matches!(err, RelayError::TimedOut(d) if d == Duration::from_secs(5)));
    }

    #[test]
    fn test_envelope_respond_without_slot_is_noop() {
        Envelope::notify(Message::GetResumeData).respond(Reply::success());
    }
}
