//! In-process call-management authority
//!
//! Stands in for the platform telephony framework: it authorizes requests,
//! keeps track of the calls shown in the (imaginary) system UI and delivers
//! actions to the provider delegate one at a time from a dedicated task, the
//! way the real system delivers them on its serial queue.

use crate::config::ProviderConfig;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::shared::sync::lock;
use crate::domain::shared::value_objects::{CallHandle, CallId};
use crate::domain::telephony::{
    Action, ActionKind, ActionOutcome, AnswerCallAction, CallAction, CallController,
    CallEndedReason, CallProvider, CallUpdate, EndCallAction, IncomingCallError, ProviderDelegate,
    SetHeldCallAction, StartCallAction, Transaction, TransactionAction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Outcome of one delivered action, as seen by the authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub call_id: CallId,
    /// `None` if the delegate dropped the action without resolving it
    pub outcome: Option<ActionOutcome>,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutgoingReportKind {
    StartedConnecting,
    Connected,
}

/// Progress the delegate reported for an outgoing call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingReport {
    pub call_id: CallId,
    pub kind: OutgoingReportKind,
    pub at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct AuthorityState {
    /// Calls shown in the system UI, as last described to it
    known_calls: HashMap<CallId, CallUpdate>,
    do_not_disturb: bool,
    audio_active: bool,
    action_log: Vec<ActionRecord>,
    outgoing_reports: Vec<OutgoingReport>,
}

enum Delivery {
    Action(CallAction, oneshot::Receiver<ActionOutcome>),
    Reset,
    AudioActivated,
    AudioDeactivated,
    Barrier(oneshot::Sender<()>),
}

pub struct SimulatedAuthority {
    config: ProviderConfig,
    delegate: RwLock<Option<Weak<dyn ProviderDelegate>>>,
    queue: mpsc::UnboundedSender<Delivery>,
    state: Mutex<AuthorityState>,
}

impl SimulatedAuthority {
    /// Create the authority and start its delivery task.
    ///
    /// Must be called from within a tokio runtime. The task stops once the
    /// authority is dropped.
    pub fn spawn(config: ProviderConfig) -> Arc<Self> {
        info!(
            "Provider \"{}\": video {}, {} call group(s) of up to {} call(s), ringtone {:?}, icon {:?}",
            config.localized_name,
            if config.supports_video { "enabled" } else { "disabled" },
            config.maximum_call_groups,
            config.maximum_calls_per_call_group,
            config.ringtone_sound,
            config.icon_template
        );

        let (queue, rx) = mpsc::unbounded_channel();
        let authority = Arc::new(Self {
            config,
            delegate: RwLock::new(None),
            queue,
            state: Mutex::new(AuthorityState::default()),
        });

        tokio::spawn(Self::run(Arc::downgrade(&authority), rx));
        authority
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    // System-side entry points

    /// The user answered an incoming call from the system UI
    pub fn answer(&self, call_id: CallId) -> Result<()> {
        self.ensure_known(call_id)?;
        let (action, rx) = AnswerCallAction::new(call_id);
        self.enqueue(Delivery::Action(CallAction::Answer(action), rx));
        Ok(())
    }

    /// The user hung up from the system UI
    pub fn hang_up(&self, call_id: CallId) -> Result<()> {
        self.submit(TransactionAction::EndCall { call_id })
    }

    /// The user held or resumed a call from the system UI
    pub fn set_held(&self, call_id: CallId, on_hold: bool) -> Result<()> {
        self.submit(TransactionAction::SetHeldCall { call_id, on_hold })
    }

    /// Drop every call and tell the delegate to start over
    pub fn reset(&self) {
        self.enqueue(Delivery::Reset);
    }

    pub fn activate_audio_session(&self) {
        self.enqueue(Delivery::AudioActivated);
    }

    pub fn deactivate_audio_session(&self) {
        self.enqueue(Delivery::AudioDeactivated);
    }

    pub fn set_do_not_disturb(&self, enabled: bool) {
        lock(&self.state).do_not_disturb = enabled;
    }

    /// Wait until everything queued so far has been delivered and resolved
    pub async fn settle(&self) {
        let (tx, rx) = oneshot::channel();
        self.enqueue(Delivery::Barrier(tx));
        let _ = rx.await;
    }

    // Inspection

    pub fn action_log(&self) -> Vec<ActionRecord> {
        lock(&self.state).action_log.clone()
    }

    pub fn outgoing_reports(&self) -> Vec<OutgoingReport> {
        lock(&self.state).outgoing_reports.clone()
    }

    /// Calls currently shown in the system UI
    pub fn known_calls(&self) -> Vec<CallId> {
        lock(&self.state).known_calls.keys().copied().collect()
    }

    /// How the system UI currently describes a call
    pub fn call_update(&self, call_id: CallId) -> Option<CallUpdate> {
        lock(&self.state).known_calls.get(&call_id).cloned()
    }

    pub fn is_audio_active(&self) -> bool {
        lock(&self.state).audio_active
    }

    // Internals

    fn ensure_known(&self, call_id: CallId) -> Result<CallUpdate> {
        lock(&self.state)
            .known_calls
            .get(&call_id)
            .cloned()
            .ok_or(DomainError::UnknownCall(call_id))
    }

    /// Whether the UI can show one more call described by `update`.
    ///
    /// Calls that support grouping share groups of up to
    /// `maximum_calls_per_call_group`; every other call takes a group alone.
    fn has_room_for(&self, known_calls: &HashMap<CallId, CallUpdate>, update: &CallUpdate) -> bool {
        let per_group = self.config.maximum_calls_per_call_group.max(1);
        let grouping = known_calls
            .values()
            .chain(std::iter::once(update))
            .filter(|call| call.supports_grouping)
            .count();
        let solo = known_calls.len() + 1 - grouping;

        solo + grouping.div_ceil(per_group) <= self.config.maximum_call_groups
    }

    /// What the system UI shows for an outgoing call it starts
    fn outgoing_update(handle: &CallHandle, is_video: bool) -> CallUpdate {
        CallUpdate {
            has_video: is_video,
            supports_holding: true,
            ..CallUpdate::new(handle.clone())
        }
    }

    fn validate(&self, action: &TransactionAction) -> Result<()> {
        match action {
            TransactionAction::StartCall {
                call_id,
                handle,
                is_video,
            } => {
                if *is_video && !self.config.supports_video {
                    return Err(DomainError::TransactionRejected(
                        "video calls are not supported".to_string(),
                    ));
                }
                let state = lock(&self.state);
                if state.known_calls.contains_key(call_id) {
                    return Err(DomainError::DuplicateCall(*call_id));
                }
                if !self.has_room_for(&state.known_calls, &Self::outgoing_update(handle, *is_video)) {
                    return Err(DomainError::TransactionRejected(format!(
                        "no room for another call group (maximum {})",
                        self.config.maximum_call_groups
                    )));
                }
                Ok(())
            }
            TransactionAction::EndCall { call_id } => self.ensure_known(*call_id).map(|_| ()),
            TransactionAction::SetHeldCall { call_id, .. } => {
                if !self.ensure_known(*call_id)?.supports_holding {
                    return Err(DomainError::TransactionRejected(format!(
                        "call {} does not support holding",
                        call_id
                    )));
                }
                Ok(())
            }
        }
    }

    fn submit(&self, action: TransactionAction) -> Result<()> {
        self.validate(&action)?;
        self.enqueue_action(action);
        Ok(())
    }

    fn enqueue_action(&self, action: TransactionAction) {
        let delivery = match action {
            TransactionAction::StartCall {
                call_id,
                handle,
                is_video,
            } => {
                let (action, rx) = StartCallAction::new(call_id, handle, is_video);
                Delivery::Action(CallAction::Start(action), rx)
            }
            TransactionAction::EndCall { call_id } => {
                let (action, rx) = EndCallAction::new(call_id);
                Delivery::Action(CallAction::End(action), rx)
            }
            TransactionAction::SetHeldCall { call_id, on_hold } => {
                let (action, rx) = SetHeldCallAction::new(call_id, on_hold);
                Delivery::Action(CallAction::SetHeld(action), rx)
            }
        };
        self.enqueue(delivery);
    }

    fn enqueue(&self, delivery: Delivery) {
        if self.queue.send(delivery).is_err() {
            warn!("Authority delivery task has stopped");
        }
    }

    fn delegate(&self) -> Option<Arc<dyn ProviderDelegate>> {
        self.delegate
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .and_then(Weak::upgrade)
    }

    async fn run(authority: Weak<Self>, mut rx: mpsc::UnboundedReceiver<Delivery>) {
        while let Some(delivery) = rx.recv().await {
            let Some(authority) = authority.upgrade() else {
                break;
            };
            authority.deliver(delivery).await;
        }
        debug!("Authority delivery task finished");
    }

    async fn deliver(&self, delivery: Delivery) {
        match delivery {
            Delivery::Action(action, rx) => self.deliver_action(action, rx).await,
            Delivery::Reset => {
                {
                    let mut state = lock(&self.state);
                    state.known_calls.clear();
                    state.audio_active = false;
                }
                if let Some(delegate) = self.delegate() {
                    delegate.provider_did_reset();
                }
            }
            Delivery::AudioActivated => self.set_audio_active(true),
            Delivery::AudioDeactivated => self.set_audio_active(false),
            Delivery::Barrier(tx) => {
                let _ = tx.send(());
            }
        }
    }

    async fn deliver_action(&self, action: CallAction, mut rx: oneshot::Receiver<ActionOutcome>) {
        let kind = action.kind();
        let call_id = action.call_id();
        let started = match &action {
            CallAction::Start(start) => Some(Self::outgoing_update(start.handle(), start.is_video())),
            _ => None,
        };

        let Some(delegate) = self.delegate() else {
            warn!("No provider delegate, failing {} for call {}", kind, call_id);
            action.fail(DomainError::Internal("no provider delegate".to_string()));
            self.record(kind, call_id, rx.try_recv().ok(), false);
            return;
        };

        let retained = action.clone();
        match action {
            CallAction::Start(action) => delegate.perform_start_call_action(action),
            CallAction::Answer(action) => delegate.perform_answer_call_action(action),
            CallAction::End(action) => delegate.perform_end_call_action(action),
            CallAction::SetHeld(action) => delegate.perform_set_held_call_action(action),
        }

        let (outcome, timed_out) =
            match tokio::time::timeout(self.config.action_timeout(), &mut rx).await {
                Ok(result) => (result.ok(), false),
                Err(_) => {
                    delegate.timed_out_performing_action(retained);
                    (rx.await.ok(), true)
                }
            };

        let fulfilled = outcome.as_ref().is_some_and(ActionOutcome::is_fulfilled);
        self.record(kind, call_id, outcome, timed_out);

        if fulfilled {
            self.apply(kind, call_id, started);
        }
    }

    fn record(
        &self,
        kind: ActionKind,
        call_id: CallId,
        outcome: Option<ActionOutcome>,
        timed_out: bool,
    ) {
        debug!("Action {} for call {} resolved: {:?}", kind, call_id, outcome);
        lock(&self.state).action_log.push(ActionRecord {
            kind,
            call_id,
            outcome,
            timed_out,
        });
    }

    /// Mirror a fulfilled action in the system UI state, activating or
    /// deactivating the audio session as the platform would
    fn apply(&self, kind: ActionKind, call_id: CallId, started: Option<CallUpdate>) {
        let audio = {
            let mut state = lock(&self.state);
            match kind {
                ActionKind::StartCall => {
                    if let Some(update) = started {
                        state.known_calls.insert(call_id, update);
                    }
                    (!state.audio_active).then_some(true)
                }
                ActionKind::AnswerCall => (!state.audio_active).then_some(true),
                ActionKind::EndCall => {
                    state.known_calls.remove(&call_id);
                    (state.known_calls.is_empty() && state.audio_active).then_some(false)
                }
                ActionKind::SetHeldCall => None,
            }
        };

        if let Some(active) = audio {
            self.set_audio_active(active);
        }
    }

    fn set_audio_active(&self, active: bool) {
        lock(&self.state).audio_active = active;
        if let Some(delegate) = self.delegate() {
            if active {
                delegate.did_activate_audio_session();
            } else {
                delegate.did_deactivate_audio_session();
            }
        }
    }
}

#[async_trait]
impl CallController for SimulatedAuthority {
    async fn request_transaction(&self, transaction: Transaction) -> Result<()> {
        if transaction.is_empty() {
            return Err(DomainError::TransactionRejected(
                "transaction has no actions".to_string(),
            ));
        }

        // All or nothing
        for action in transaction.actions() {
            self.validate(action)?;
        }

        info!(
            "Accepted transaction {} with {} action(s)",
            transaction.id(),
            transaction.actions().len()
        );
        for action in transaction.into_actions() {
            self.enqueue_action(action);
        }
        Ok(())
    }
}

#[async_trait]
impl CallProvider for SimulatedAuthority {
    fn set_delegate(&self, delegate: Weak<dyn ProviderDelegate>) {
        *self
            .delegate
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(delegate);
    }

    async fn report_new_incoming_call(
        &self,
        call_id: CallId,
        update: CallUpdate,
    ) -> std::result::Result<(), IncomingCallError> {
        let mut state = lock(&self.state);

        if state.do_not_disturb {
            return Err(IncomingCallError::FilteredByDoNotDisturb);
        }
        if self.config.is_blocked(update.remote_handle.value()) {
            return Err(IncomingCallError::FilteredByBlockList);
        }
        if state.known_calls.contains_key(&call_id) {
            return Err(IncomingCallError::CallIdAlreadyExists);
        }
        if update.has_video && !self.config.supports_video {
            return Err(IncomingCallError::Unentitled);
        }
        if !self.has_room_for(&state.known_calls, &update) {
            return Err(IncomingCallError::Unentitled);
        }

        info!(
            "Showing incoming call {} from {} (video: {}, group: {}, ungroup: {}, dtmf: {}, hold: {})",
            call_id,
            update.remote_handle,
            update.has_video,
            update.supports_grouping,
            update.supports_ungrouping,
            update.supports_dtmf,
            update.supports_holding
        );
        state.known_calls.insert(call_id, update);
        Ok(())
    }

    fn report_outgoing_call_started_connecting(&self, call_id: CallId, at: Option<DateTime<Utc>>) {
        lock(&self.state).outgoing_reports.push(OutgoingReport {
            call_id,
            kind: OutgoingReportKind::StartedConnecting,
            at,
        });
    }

    fn report_outgoing_call_connected(&self, call_id: CallId, at: Option<DateTime<Utc>>) {
        lock(&self.state).outgoing_reports.push(OutgoingReport {
            call_id,
            kind: OutgoingReportKind::Connected,
            at,
        });
    }

    fn report_call_ended(&self, call_id: CallId, at: Option<DateTime<Utc>>, reason: CallEndedReason) {
        let deactivate = {
            let mut state = lock(&self.state);
            if state.known_calls.remove(&call_id).is_none() {
                debug!("Ended call {} was not shown", call_id);
                return;
            }
            state.known_calls.is_empty() && state.audio_active
        };

        info!("Call {} ended at {:?}: {:?}", call_id, at, reason);
        if deactivate {
            self.enqueue(Delivery::AudioDeactivated);
        }
    }
}
