//! Ports to the call-management authority
//!
//! The authority owns the system call UI and authorizes every transition.
//! These traits are implemented in the infrastructure layer; the application
//! layer only talks to the authority through them.

use crate::domain::call::Call;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::CallId;
use crate::domain::telephony::action::{
    AnswerCallAction, CallAction, EndCallAction, SetHeldCallAction, StartCallAction,
};
use crate::domain::telephony::transaction::Transaction;
use crate::domain::telephony::update::{CallEndedReason, CallUpdate, IncomingCallError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Weak;

/// Requests transitions on behalf of the app.
///
/// Acceptance of a transaction only means the authority will deliver its
/// actions to the provider delegate later; the effect surfaces there.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallController: Send + Sync {
    async fn request_transaction(&self, transaction: Transaction) -> Result<()>;
}

/// The authority's provider handle, used by the delegate to report state.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallProvider: Send + Sync {
    /// Install the sole delegate. The provider does not keep it alive.
    fn set_delegate(&self, delegate: Weak<dyn ProviderDelegate>);

    /// Ask the system to surface an incoming call
    async fn report_new_incoming_call(
        &self,
        call_id: CallId,
        update: CallUpdate,
    ) -> std::result::Result<(), IncomingCallError>;

    fn report_outgoing_call_started_connecting(
        &self,
        call_id: CallId,
        at: Option<DateTime<Utc>>,
    );

    fn report_outgoing_call_connected(&self, call_id: CallId, at: Option<DateTime<Utc>>);

    /// Tell the system a call it shows has ended outside of an end action
    fn report_call_ended(&self, call_id: CallId, at: Option<DateTime<Utc>>, reason: CallEndedReason);
}

/// Callbacks the authority delivers, serialized on its own queue.
///
/// Every action passed in must be fulfilled or failed.
pub trait ProviderDelegate: Send + Sync {
    fn provider_did_reset(&self);

    fn perform_start_call_action(&self, action: StartCallAction);

    fn perform_answer_call_action(&self, action: AnswerCallAction);

    fn perform_end_call_action(&self, action: EndCallAction);

    fn perform_set_held_call_action(&self, action: SetHeldCallAction);

    fn timed_out_performing_action(&self, action: CallAction);

    fn did_activate_audio_session(&self);

    fn did_deactivate_audio_session(&self);
}

/// The network service that actually places calls
#[cfg_attr(test, mockall::automock)]
pub trait CallService: Send + Sync {
    fn start_call(&self, call: &Call) -> Result<()>;
}
