//! Named event subscriptions for the consumer-facing hooks
//!
//! Listeners are registered per event kind and invoked synchronously, in
//! registration order, on the task that emits. Every event is also published
//! on a broadcast channel for consumers that prefer to await them.

use rupt_core::DeviceRecord;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::debug;

const BROADCAST_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Attach reported more devices than the effective limit
    LimitExceeded { attached_count: u32 },
    /// The service revoked this device. `device` is `None` when the attached
    /// list was never fetched.
    LogoutCurrentDevice { device: Option<DeviceRecord> },
    /// Another device of the account was detached from here
    LogoutOtherDevice { device: DeviceRecord },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    LimitExceeded,
    LogoutCurrentDevice,
    LogoutOtherDevice,
}

impl EventKind {
    pub const ALL: [EventKind; 3] = [
        EventKind::LimitExceeded,
        EventKind::LogoutCurrentDevice,
        EventKind::LogoutOtherDevice,
    ];
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::LimitExceeded { .. } => EventKind::LimitExceeded,
            SessionEvent::LogoutCurrentDevice { .. } => EventKind::LogoutCurrentDevice,
            SessionEvent::LogoutOtherDevice { .. } => EventKind::LogoutOtherDevice,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

struct Registration {
    id: ListenerId,
    kinds: Vec<EventKind>,
    listener: Listener,
}

pub struct EventBus {
    next_id: AtomicU64,
    registrations: RwLock<Vec<Registration>>,
    broadcaster: broadcast::Sender<SessionEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (broadcaster, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            next_id: AtomicU64::new(1),
            registrations: RwLock::new(Vec::new()),
            broadcaster,
        }
    }

    /// Register `listener` for the given kinds
    pub fn subscribe<F>(&self, kinds: &[EventKind], listener: F) -> ListenerId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        registrations.push(Registration {
            id,
            kinds: kinds.to_vec(),
            listener: Arc::new(listener),
        });
        id
    }

    /// Returns `false` if the listener was already gone
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut registrations = self
            .registrations
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .any(|r| r.kinds.contains(&kind))
    }

    /// Receiver for every event emitted from now on
    pub fn receiver(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    /// Deliver `event`; returns the number of listeners invoked
    pub fn emit(&self, event: SessionEvent) -> usize {
        let kind = event.kind();
        // Collected first so a listener may subscribe or unsubscribe re-entrantly
        let listeners: Vec<Listener> = self
            .registrations
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|r| r.kinds.contains(&kind))
            .map(|r| r.listener.clone())
            .collect();

        for listener in &listeners {
            listener(&event);
        }
        debug!(kind = ?kind, listeners = listeners.len(), "Event emitted");

        let _ = self.broadcaster.send(event);
        listeners.len()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self
            .registrations
            .read()
            .map(|r| r.len())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("listeners", &count)
            .finish_non_exhaustive()
    }
}
