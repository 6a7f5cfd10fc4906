//! Telephony domain - the contract with the call-management authority

pub mod action;
pub mod port;
pub mod transaction;
pub mod update;

pub use action::{
    Action, ActionKind, ActionOutcome, ActionResponder, AnswerCallAction, CallAction,
    EndCallAction, SetHeldCallAction, StartCallAction,
};
pub use port::{CallController, CallProvider, CallService, ProviderDelegate};
pub use transaction::{Transaction, TransactionAction};
pub use update::{CallEndedReason, CallUpdate, IncomingCallError};
