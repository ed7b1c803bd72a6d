//! Connectivity state machine
//!
//! Two states, driven entirely by signals pushed from the host platform; no
//! polling. Re-entrant transitions to the current state are suppressed so a
//! platform that re-fires its "online" event cannot trigger duplicate sync
//! passes.

use parking_lot::RwLock;

use crate::events::{EventBus, Subscription};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Online,
    Offline,
}

impl Connectivity {
    pub fn is_online(self) -> bool {
        matches!(self, Connectivity::Online)
    }
}

/// Tracks online/offline transitions and publishes real edges to subscribers.
pub struct ConnectivityMonitor {
    status: RwLock<Connectivity>,
    bus: EventBus<bool>,
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectivityMonitor {
    /// Starts `Offline`; the platform pushes the real state on startup.
    pub fn new() -> Self {
        Self {
            status: RwLock::new(Connectivity::Offline),
            bus: EventBus::new(),
        }
    }

    pub fn status(&self) -> Connectivity {
        *self.status.read()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Apply a platform connectivity signal. Returns true for a real edge;
    /// a transition into the current state is suppressed and not published.
    pub fn transition(&self, status: Connectivity) -> bool {
        {
            let mut current = self.status.write();
            if *current == status {
                return false;
            }
            *current = status;
        }

        match status {
            Connectivity::Online => tracing::info!("Connectivity: online"),
            Connectivity::Offline => tracing::info!("Connectivity: offline"),
        }
        self.bus.publish(&status.is_online());
        true
    }

    /// Subscribe to connectivity edges (`true` = became online).
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&bool) + Send + Sync + 'static,
    {
        self.bus.subscribe(callback)
    }
}
