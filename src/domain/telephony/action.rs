//! Actions delivered by the call-management authority
//!
//! An action is a discrete requested transition on one call. The authority
//! hands it to the delegate, which must resolve it exactly once: fulfilled or
//! failed. Later resolutions are ignored.

use crate::domain::shared::error::DomainError;
use crate::domain::shared::sync::lock;
use crate::domain::shared::value_objects::{CallHandle, CallId};
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// Result of a resolved action
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Fulfilled,
    Failed(DomainError),
}

impl ActionOutcome {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, ActionOutcome::Fulfilled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionOutcome::Fulfilled => "fulfilled",
            ActionOutcome::Failed(_) => "failed",
        }
    }
}

/// Kind of action, used for logging and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    StartCall,
    AnswerCall,
    EndCall,
    SetHeldCall,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::StartCall => "start_call",
            ActionKind::AnswerCall => "answer_call",
            ActionKind::EndCall => "end_call",
            ActionKind::SetHeldCall => "set_held_call",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-shot completion slot shared by every clone of an action.
///
/// Clones exist because the authority keeps its own copy to re-deliver on
/// timeout; whichever copy resolves first wins.
#[derive(Clone)]
pub struct ActionResponder {
    slot: Arc<Mutex<Option<oneshot::Sender<ActionOutcome>>>>,
}

impl ActionResponder {
    pub fn channel() -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (tx, rx) = oneshot::channel();
        let responder = Self {
            slot: Arc::new(Mutex::new(Some(tx))),
        };
        (responder, rx)
    }

    /// Resolve the action. Returns false if it was already resolved.
    pub fn resolve(&self, outcome: ActionOutcome) -> bool {
        match lock(&self.slot).take() {
            Some(tx) => {
                // The authority may have stopped listening; the action is
                // still considered resolved.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_complete(&self) -> bool {
        lock(&self.slot).is_none()
    }
}

impl fmt::Debug for ActionResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionResponder")
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Behaviour shared by every action type
pub trait Action {
    fn kind(&self) -> ActionKind;

    fn call_id(&self) -> CallId;

    fn responder(&self) -> &ActionResponder;

    /// Signal that the action was performed
    fn fulfill(&self) -> bool {
        self.responder().resolve(ActionOutcome::Fulfilled)
    }

    /// Signal that the action could not be performed
    fn fail(&self, reason: DomainError) -> bool {
        self.responder().resolve(ActionOutcome::Failed(reason))
    }

    fn is_complete(&self) -> bool {
        self.responder().is_complete()
    }
}

/// Start an outgoing call
#[derive(Debug, Clone)]
pub struct StartCallAction {
    call_id: CallId,
    handle: CallHandle,
    is_video: bool,
    responder: ActionResponder,
}

impl StartCallAction {
    pub fn new(
        call_id: CallId,
        handle: CallHandle,
        is_video: bool,
    ) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (responder, rx) = ActionResponder::channel();
        (
            Self {
                call_id,
                handle,
                is_video,
                responder,
            },
            rx,
        )
    }

    pub fn handle(&self) -> &CallHandle {
        &self.handle
    }

    pub fn is_video(&self) -> bool {
        self.is_video
    }
}

impl Action for StartCallAction {
    fn kind(&self) -> ActionKind {
        ActionKind::StartCall
    }

    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn responder(&self) -> &ActionResponder {
        &self.responder
    }
}

/// Answer an incoming call
#[derive(Debug, Clone)]
pub struct AnswerCallAction {
    call_id: CallId,
    responder: ActionResponder,
}

impl AnswerCallAction {
    pub fn new(call_id: CallId) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (responder, rx) = ActionResponder::channel();
        (Self { call_id, responder }, rx)
    }
}

impl Action for AnswerCallAction {
    fn kind(&self) -> ActionKind {
        ActionKind::AnswerCall
    }

    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn responder(&self) -> &ActionResponder {
        &self.responder
    }
}

/// End a call, incoming or outgoing
#[derive(Debug, Clone)]
pub struct EndCallAction {
    call_id: CallId,
    responder: ActionResponder,
}

impl EndCallAction {
    pub fn new(call_id: CallId) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (responder, rx) = ActionResponder::channel();
        (Self { call_id, responder }, rx)
    }
}

impl Action for EndCallAction {
    fn kind(&self) -> ActionKind {
        ActionKind::EndCall
    }

    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn responder(&self) -> &ActionResponder {
        &self.responder
    }
}

/// Put a call on hold or resume it
#[derive(Debug, Clone)]
pub struct SetHeldCallAction {
    call_id: CallId,
    on_hold: bool,
    responder: ActionResponder,
}

impl SetHeldCallAction {
    pub fn new(call_id: CallId, on_hold: bool) -> (Self, oneshot::Receiver<ActionOutcome>) {
        let (responder, rx) = ActionResponder::channel();
        (
            Self {
                call_id,
                on_hold,
                responder,
            },
            rx,
        )
    }

    pub fn on_hold(&self) -> bool {
        self.on_hold
    }
}

impl Action for SetHeldCallAction {
    fn kind(&self) -> ActionKind {
        ActionKind::SetHeldCall
    }

    fn call_id(&self) -> CallId {
        self.call_id
    }

    fn responder(&self) -> &ActionResponder {
        &self.responder
    }
}

/// Any action, as passed to the timeout callback
#[derive(Debug, Clone)]
pub enum CallAction {
    Start(StartCallAction),
    Answer(AnswerCallAction),
    End(EndCallAction),
    SetHeld(SetHeldCallAction),
}

impl CallAction {
    fn inner(&self) -> &dyn Action {
        match self {
            CallAction::Start(action) => action,
            CallAction::Answer(action) => action,
            CallAction::End(action) => action,
            CallAction::SetHeld(action) => action,
        }
    }
}

impl Action for CallAction {
    fn kind(&self) -> ActionKind {
        self.inner().kind()
    }

    fn call_id(&self) -> CallId {
        self.inner().call_id()
    }

    fn responder(&self) -> &ActionResponder {
        self.inner().responder()
    }
}
