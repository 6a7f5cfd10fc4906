//! Registry of live calls
//!
//! Owns every live [`Call`], answers lookups for the authority adapter and the
//! command bridge, and forwards app-initiated transitions to the authority as
//! transactions. Any change to the set, or to a member's state, is published
//! as a [`CallsChanged`] event, both on a broadcast channel and on the ordered
//! [`EventStream`] shared with the authority adapter.

use crate::application::event_stream::EventStream;
use crate::domain::call::{Call, CallListener, CallsChanged, ListenerId};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::sync::lock;
use crate::domain::shared::value_objects::{CallHandle, CallId};
use crate::domain::telephony::{CallController, Transaction, TransactionAction};
use crate::infrastructure::metrics;
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default capacity of the "calls changed" channel
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

struct Entry {
    call: Arc<Call>,
    listener: ListenerId,
}

struct Shared {
    entries: Mutex<Vec<Entry>>,
    events: broadcast::Sender<CallsChanged>,
    stream: Arc<EventStream>,
}

impl Shared {
    fn post_calls_changed(&self) {
        // Snapshot and publish under the list lock so the count and primary
        // agree and concurrent changes reach the stream in order
        let event = {
            let entries = lock(&self.entries);
            let primary = entries.first().map(|entry| entry.call.snapshot());
            let event = CallsChanged::new(primary, entries.len());
            self.stream.publish(event.clone());
            event
        };

        metrics::update_active_calls(event.call_count);

        if self.events.send(event).is_err() {
            debug!("No subscribers for calls changed event");
        }
    }
}

/// Rebroadcasts a member call's state changes.
///
/// Holds the registry weakly: the call owns this listener, the registry owns
/// the call, and the listener must not keep the registry alive.
struct RegistryListener {
    shared: Weak<Shared>,
}

impl CallListener for RegistryListener {
    fn state_did_change(&self, _call: &Call) {
        if let Some(shared) = self.shared.upgrade() {
            shared.post_calls_changed();
        }
    }
}

/// Live call set plus the app's channel to the authority
pub struct CallRegistry {
    shared: Arc<Shared>,
    controller: Arc<dyn CallController>,
}

impl CallRegistry {
    pub fn new(controller: Arc<dyn CallController>) -> Self {
        Self::with_capacity(controller, DEFAULT_EVENT_CAPACITY)
    }

    /// Create a registry whose broadcast channel buffers `capacity` events per
    /// subscriber. The ordered stream is unbounded.
    pub fn with_capacity(controller: Arc<dyn CallController>, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(Shared {
                entries: Mutex::new(Vec::new()),
                events,
                stream: Arc::new(EventStream::new()),
            }),
            controller,
        }
    }

    // Authority requests

    /// Ask the authority to start an outgoing call.
    ///
    /// No call is created here; the authority creates it later through the
    /// adapter's start action, once it has authorized the request.
    pub async fn request_start(&self, call_id: CallId, handle: CallHandle, is_video: bool) -> Result<()> {
        let transaction = Transaction::with_action(TransactionAction::StartCall {
            call_id,
            handle,
            is_video,
        });
        self.request_transaction(transaction).await
    }

    /// Ask the authority to end a call
    pub async fn request_end(&self, call: &Call) -> Result<()> {
        let transaction = Transaction::with_action(TransactionAction::EndCall {
            call_id: call.id(),
        });
        self.request_transaction(transaction).await
    }

    /// Ask the authority to hold or resume a call
    pub async fn request_set_held(&self, call: &Call, on_hold: bool) -> Result<()> {
        let transaction = Transaction::with_action(TransactionAction::SetHeldCall {
            call_id: call.id(),
            on_hold,
        });
        self.request_transaction(transaction).await
    }

    async fn request_transaction(&self, transaction: Transaction) -> Result<()> {
        let transaction_id = transaction.id();
        match self.controller.request_transaction(transaction).await {
            Ok(()) => {
                info!("Requested transaction {} successfully", transaction_id);
                metrics::record_transaction(true);
                Ok(())
            }
            Err(e) => {
                warn!("Error requesting transaction {}: {}", transaction_id, e);
                metrics::record_transaction(false);
                Err(e)
            }
        }
    }

    // Call management

    /// Add a call and start rebroadcasting its state changes
    pub fn add(&self, call: Arc<Call>) -> Result<()> {
        {
            let mut entries = lock(&self.shared.entries);
            if entries.iter().any(|entry| entry.call.id() == call.id()) {
                return Err(DomainError::DuplicateCall(call.id()));
            }

            let listener = call.add_listener(Arc::new(RegistryListener {
                shared: Arc::downgrade(&self.shared),
            }));
            entries.push(Entry { call, listener });
        }

        self.shared.post_calls_changed();
        Ok(())
    }

    /// Remove this exact call instance. Returns false if it was not registered.
    pub fn remove(&self, call: &Arc<Call>) -> bool {
        let removed = {
            let mut entries = lock(&self.shared.entries);
            entries
                .iter()
                .position(|entry| Arc::ptr_eq(&entry.call, call))
                .map(|index| entries.remove(index))
        };

        match removed {
            Some(entry) => {
                entry.call.remove_listener(entry.listener);
                self.shared.post_calls_changed();
                true
            }
            None => {
                debug!("Call {} not registered, nothing to remove", call.id());
                false
            }
        }
    }

    /// Remove every call, publishing a single event
    pub fn remove_all(&self) {
        let removed: Vec<Entry> = std::mem::take(&mut *lock(&self.shared.entries));
        for entry in &removed {
            entry.call.remove_listener(entry.listener);
        }

        self.shared.post_calls_changed();
    }

    /// Look up a live call. `None` is an expected answer, e.g. for a call
    /// the authority already ended.
    pub fn find(&self, call_id: CallId) -> Option<Arc<Call>> {
        lock(&self.shared.entries)
            .iter()
            .find(|entry| entry.call.id() == call_id)
            .map(|entry| Arc::clone(&entry.call))
    }

    /// The call summarized in broadcasts
    pub fn primary(&self) -> Option<Arc<Call>> {
        lock(&self.shared.entries)
            .first()
            .map(|entry| Arc::clone(&entry.call))
    }

    /// Snapshot of the live calls in insertion order
    pub fn calls(&self) -> Vec<Arc<Call>> {
        lock(&self.shared.entries)
            .iter()
            .map(|entry| Arc::clone(&entry.call))
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.shared.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.shared.entries).is_empty()
    }

    // Observers

    /// Subscribe to "calls changed" events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<CallsChanged> {
        self.shared.events.subscribe()
    }

    /// Ordered stream carrying call changes together with audio messages
    pub fn events(&self) -> &Arc<EventStream> {
        &self.shared.stream
    }
}
