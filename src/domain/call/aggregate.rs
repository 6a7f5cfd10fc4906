//! Call aggregate root

use crate::domain::call::event::CallSnapshot;
use crate::domain::call::listener::{CallListener, ListenerId, StateChange};
use crate::domain::shared::sync::lock;
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A single call, outgoing or incoming.
///
/// Identity and direction are fixed at creation. The lifecycle is encoded by
/// three optional timestamps: a call has started connecting, has connected or
/// has ended exactly when the matching date is present. The setters never
/// validate ordering; the authority is trusted to drive transitions sensibly.
///
/// Every mutation of a timestamp or of the hold flag notifies the registered
/// [`CallListener`]s after the internal lock has been released, so listeners
/// may read the call (or lock other structures) freely.
pub struct Call {
    id: CallId,
    is_outgoing: bool,
    state: Mutex<CallState>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn CallListener>)>>,
}

#[derive(Debug, Default)]
struct CallState {
    handle: Option<String>,
    connecting_date: Option<DateTime<Utc>>,
    connect_date: Option<DateTime<Utc>>,
    end_date: Option<DateTime<Utc>>,
    is_on_hold: bool,
}

impl Call {
    /// Create a new call
    pub fn new(id: CallId, is_outgoing: bool) -> Self {
        Self {
            id,
            is_outgoing,
            state: Mutex::new(CallState::default()),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Create an incoming call
    pub fn incoming(id: CallId) -> Self {
        Self::new(id, false)
    }

    /// Create an outgoing call
    pub fn outgoing(id: CallId) -> Self {
        Self::new(id, true)
    }

    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn is_outgoing(&self) -> bool {
        self.is_outgoing
    }

    pub fn handle(&self) -> Option<String> {
        lock(&self.state).handle.clone()
    }

    /// Replace the display handle. Not a state change, so no listener fires.
    pub fn set_handle(&self, handle: Option<String>) {
        lock(&self.state).handle = handle;
    }

    pub fn connecting_date(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).connecting_date
    }

    pub fn connect_date(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).connect_date
    }

    pub fn end_date(&self) -> Option<DateTime<Utc>> {
        lock(&self.state).end_date
    }

    pub fn has_started_connecting(&self) -> bool {
        self.connecting_date().is_some()
    }

    pub fn has_connected(&self) -> bool {
        self.connect_date().is_some()
    }

    pub fn has_ended(&self) -> bool {
        self.end_date().is_some()
    }

    pub fn is_on_hold(&self) -> bool {
        lock(&self.state).is_on_hold
    }

    /// Time since the call connected, zero if it never did.
    pub fn duration(&self) -> Duration {
        connected_for(self.connect_date())
    }

    pub fn set_started_connecting(&self, value: bool) {
        lock(&self.state).connecting_date = stamp(value);
        self.notify(Some(StateChange::StartedConnecting));
    }

    pub fn set_connected(&self, value: bool) {
        lock(&self.state).connect_date = stamp(value);
        self.notify(Some(StateChange::Connected));
    }

    pub fn set_ended(&self, value: bool) {
        lock(&self.state).end_date = stamp(value);
        self.notify(Some(StateChange::Ended));
    }

    pub fn set_on_hold(&self, on_hold: bool) {
        lock(&self.state).is_on_hold = on_hold;
        self.notify(None);
    }

    /// Outgoing call accepted by the call service; begin connecting
    pub fn start_connecting(&self) {
        self.set_started_connecting(true);
    }

    /// Incoming call answered; begin connecting
    pub fn answer(&self) {
        self.set_started_connecting(true);
    }

    /// Media is flowing
    pub fn connect(&self) {
        self.set_connected(true);
    }

    pub fn end(&self) {
        self.set_ended(true);
    }

    /// Register a listener. It lives as long as the call or until removed.
    pub fn add_listener(&self, listener: Arc<dyn CallListener>) -> ListenerId {
        let id = ListenerId::next();
        lock(&self.listeners).push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(registered, _)| *registered != id);
        listeners.len() != before
    }

    /// Consistent copy of the call's state
    pub fn snapshot(&self) -> CallSnapshot {
        let state = lock(&self.state);
        CallSnapshot {
            call_id: self.id,
            handle: state.handle.clone(),
            is_outgoing: self.is_outgoing,
            is_on_hold: state.is_on_hold,
            connecting_date: state.connecting_date,
            connect_date: state.connect_date,
            end_date: state.end_date,
            duration: connected_for(state.connect_date),
        }
    }

    fn notify(&self, change: Option<StateChange>) {
        let listeners: Vec<Arc<dyn CallListener>> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in &listeners {
            listener.state_did_change(self);
            match change {
                Some(StateChange::StartedConnecting) => {
                    listener.has_started_connecting_did_change(self)
                }
                Some(StateChange::Connected) => listener.has_connected_did_change(self),
                Some(StateChange::Ended) => listener.has_ended_did_change(self),
                None => {}
            }
        }
    }
}

fn stamp(value: bool) -> Option<DateTime<Utc>> {
    value.then(Utc::now)
}

fn connected_for(connect_date: Option<DateTime<Utc>>) -> Duration {
    connect_date
        .and_then(|connected| (Utc::now() - connected).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

impl fmt::Debug for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("id", &self.id)
            .field("is_outgoing", &self.is_outgoing)
            .field("state", &*lock(&self.state))
            .field("listeners", &lock(&self.listeners).len())
            .finish()
    }
}
