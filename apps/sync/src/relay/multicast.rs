use std::collections::BTreeMap;

use tracing::debug;

use super::{Envelope, TabPort};
use crate::messages::Message;

/// Identifies one open page (browser tab) connected to the relay.
pub type TabId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The tab's bridge is gone (page closed or navigated away).
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOutcome {
    pub tab: TabId,
    pub delivery: Delivery,
}

pub fn delivered_count(outcomes: &[DeliveryOutcome]) -> usize {
    outcomes
        .iter()
        .filter(|o| o.delivery == Delivery::Delivered)
        .count()
}

/// Connected tabs, keyed by id. Iteration order is ascending tab id.
#[derive(Debug, Default)]
pub struct TabRegistry {
    ports: BTreeMap<TabId, TabPort>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `tab`, replacing any previous port for the same id.
    pub fn connect(&mut self, tab: TabId, port: TabPort) {
        if self.ports.insert(tab, port).is_some() {
            debug!("Tab {tab} reconnected, previous port replaced");
        }
    }

    pub fn disconnect(&mut self, tab: TabId) -> bool {
        self.ports.remove(&tab).is_some()
    }

    pub fn port(&self, tab: TabId) -> Option<TabPort> {
        self.ports.get(&tab).cloned()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Delivers one copy of `message` to every tab. A failed delivery never
    /// stops the others; unreachable tabs are dropped from the registry
    /// after the pass.
    pub fn multicast(&mut self, message: &Message) -> Vec<DeliveryOutcome> {
        let outcomes: Vec<DeliveryOutcome> = self
            .ports
            .iter()
            .map(|(&tab, port)| {
                let delivery = match port.send(Envelope::notify(message.clone())) {
                    Ok(()) => Delivery::Delivered,
                    Err(_) => Delivery::Unreachable,
                };
                DeliveryOutcome { tab, delivery }
            })
            .collect();

        for outcome in &outcomes {
            if outcome.delivery == Delivery::Unreachable {
                self.ports.remove(&outcome.tab);
                debug!("Pruned unreachable tab {}", outcome.tab);
            }
        }

        outcomes
    }
}
