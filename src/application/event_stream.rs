//! Ordered stream of every app-facing event
//!
//! Call changes and audio messages share one stream so subscribers see them
//! in the order they were emitted. Each subscriber gets an unbounded queue:
//! a slow subscriber never loses events.

use crate::domain::audio::AudioEvent;
use crate::domain::call::CallsChanged;
use crate::domain::shared::sync::lock;
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub enum BridgeEvent {
    CallsChanged(CallsChanged),
    Audio(AudioEvent),
}

impl From<CallsChanged> for BridgeEvent {
    fn from(event: CallsChanged) -> Self {
        BridgeEvent::CallsChanged(event)
    }
}

impl From<AudioEvent> for BridgeEvent {
    fn from(event: AudioEvent) -> Self {
        BridgeEvent::Audio(event)
    }
}

#[derive(Default)]
pub struct EventStream {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<BridgeEvent>>>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an event to every subscriber, dropping those that went away
    pub fn publish(&self, event: impl Into<BridgeEvent>) {
        let event = event.into();
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("No subscribers for {:?}", event);
        }
    }

    /// Subscribe to every later event. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<BridgeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.subscribers).push(tx);
        rx
    }

    /// Get number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = lock(&self.subscribers);
        subscribers.retain(|tx| !tx.is_closed());
        subscribers.len()
    }
}
