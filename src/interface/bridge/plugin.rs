//! App-facing command bridge
//!
//! Every command takes positional JSON arguments and returns a one-shot
//! result. `register` hands back a long-lived channel that receives every
//! later "call changed" and "audio system" event, in the order they happened
//! and without dropping any.

use super::command::{BridgeError, CommandArgs};
use super::payload::CallbackPayload;
use crate::application::{BridgeEvent, CallAuthorityAdapter, CallRegistry};
use crate::domain::shared::error::DomainError;
use crate::domain::shared::sync::lock;
use crate::domain::shared::value_objects::{CallHandle, CallId};
use crate::domain::telephony::CallUpdate;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub struct CallKitPlugin {
    adapter: Arc<CallAuthorityAdapter>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl CallKitPlugin {
    pub fn new(adapter: Arc<CallAuthorityAdapter>) -> Self {
        Self {
            adapter,
            forwarder: Mutex::new(None),
        }
    }

    fn registry(&self) -> &Arc<CallRegistry> {
        self.adapter.registry()
    }

    /// Start forwarding events to a new callback channel.
    ///
    /// Registering again replaces the previous channel. Must be called from
    /// within a tokio runtime.
    pub fn register(&self) -> mpsc::UnboundedReceiver<CallbackPayload> {
        let (tx, rx) = mpsc::unbounded_channel();
        let events = self.adapter.subscribe_events();

        let task = tokio::spawn(forward(events, tx));
        if let Some(previous) = lock(&self.forwarder).replace(task) {
            previous.abort();
        }

        info!(
            "Callback channel registered ({} event subscribers)",
            self.registry().events().subscriber_count()
        );
        rx
    }

    /// `[name, hasVideo, supportsGroup, supportsUngroup, supportsDTMF, supportsHold]`
    ///
    /// Returns the new call's identifier, or an error if the authority
    /// refused to show the call.
    pub async fn report_incoming_call(&self, args: &[Value]) -> Result<String, BridgeError> {
        let args = CommandArgs::new(args);
        let call_id = CallId::new();
        let update = CallUpdate {
            remote_handle: CallHandle::generic(args.string_or_default(0)),
            has_video: args.bool_or(1, false),
            supports_grouping: args.bool_or(2, false),
            supports_ungrouping: args.bool_or(3, false),
            supports_dtmf: args.bool_or(4, false),
            supports_holding: args.bool_or(5, false),
        };

        self.adapter.report_incoming_call(call_id, update).await?;
        Ok(call_id.to_string())
    }

    /// `[name, isVideo]`
    ///
    /// Returns the identifier the call will have once the authority starts it.
    pub async fn start_call(&self, args: &[Value]) -> Result<String, BridgeError> {
        let args = CommandArgs::new(args);
        let handle = CallHandle::generic(args.string_or_default(0));
        let is_video = args.required_bool(1, "isVideo")?;
        let call_id = CallId::new();

        self.registry()
            .request_start(call_id, handle, is_video)
            .await?;
        Ok(call_id.to_string())
    }

    /// `[uuid]`
    pub async fn end_call(&self, args: &[Value]) -> Result<(), BridgeError> {
        let call_id = CommandArgs::new(args).call_id(0)?;
        let call = self
            .registry()
            .find(call_id)
            .ok_or(DomainError::UnknownCall(call_id))?;

        self.registry().request_end(&call).await?;
        Ok(())
    }

    /// `[uuid]`
    ///
    /// The remote side picked up an outgoing call.
    pub fn call_connected(&self, args: &[Value]) -> Result<(), BridgeError> {
        let call_id = CommandArgs::new(args).call_id(0)?;
        let call = self
            .registry()
            .find(call_id)
            .ok_or(DomainError::UnknownCall(call_id))?;

        call.connect();
        Ok(())
    }

    /// Ringing is driven by the system call UI; nothing to stop here.
    pub fn finish_ring(&self, _args: &[Value]) -> Result<(), BridgeError> {
        debug!("finish_ring is a no-op");
        Ok(())
    }
}

impl Drop for CallKitPlugin {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.forwarder).take() {
            task.abort();
        }
    }
}

async fn forward(
    mut events: mpsc::UnboundedReceiver<BridgeEvent>,
    tx: mpsc::UnboundedSender<CallbackPayload>,
) {
    while let Some(event) = events.recv().await {
        if tx.send(CallbackPayload::from(&event)).is_err() {
            debug!("Callback receiver dropped");
            break;
        }
    }
}
