use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::error::HomelinkError;

/// A named event channel.
///
/// The fixed channels cover the session lifecycle; `Op` channels fire once
/// per successful vendor operation, keyed by the operation name, for
/// observers that want push notification instead of awaiting the call.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Authenticated,
    AccessToken,
    RefreshToken,
    Error,
    Warning,
    Op(String),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Authenticated => write!(f, "authenticated"),
            Channel::AccessToken => write!(f, "access_token"),
            Channel::RefreshToken => write!(f, "refresh_token"),
            Channel::Error => write!(f, "error"),
            Channel::Warning => write!(f, "warning"),
            Channel::Op(op) => write!(f, "{op}"),
        }
    }
}

/// An emission on one channel, carrying that channel's payload.
#[derive(Debug, Clone)]
pub enum Event {
    Authenticated,
    AccessToken(String),
    RefreshToken(String),
    Error(HomelinkError),
    Warning(HomelinkError),
    OpSuccess {
        op: String,
        payload: serde_json::Value,
    },
}

impl Event {
    pub fn channel(&self) -> Channel {
        match self {
            Event::Authenticated => Channel::Authenticated,
            Event::AccessToken(_) => Channel::AccessToken,
            Event::RefreshToken(_) => Channel::RefreshToken,
            Event::Error(_) => Channel::Error,
            Event::Warning(_) => Channel::Warning,
            Event::OpSuccess { op, .. } => Channel::Op(op.clone()),
        }
    }
}

/// Handle returned by `subscribe`, used to remove the listener again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// Per-session publish/subscribe surface.
///
/// Listeners on one channel run synchronously in registration order, once
/// per emission. There is no ordering guarantee across distinct channels.
pub struct EventSignal {
    inner: Mutex<SignalInner>,
}

struct SignalInner {
    listeners: HashMap<Channel, Vec<(u64, Listener)>>,
    next_id: u64,
}

impl EventSignal {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(SignalInner {
                listeners: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    pub fn subscribe<F>(&self, channel: Channel, listener: F) -> SubscriptionId
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = inner.next_id;
        inner.next_id += 1;
        inner
            .listeners
            .entry(channel)
            .or_default()
            .push((id, Arc::new(listener)));
        SubscriptionId(id)
    }

    /// Remove a listener. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for listeners in inner.listeners.values_mut() {
            listeners.retain(|(lid, _)| *lid != id.0);
        }
    }

    pub fn emit(&self, event: &Event) {
        // Snapshot the listener list so a listener may subscribe/unsubscribe
        // without deadlocking on the signal lock.
        let snapshot: Vec<Listener> = {
            let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner
                .listeners
                .get(&event.channel())
                .map(|ls| ls.iter().map(|(_, l)| Arc::clone(l)).collect())
                .unwrap_or_default()
        };
        for listener in snapshot {
            listener(event);
        }
    }
}

impl Default for EventSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSignal").finish_non_exhaustive()
    }
}
