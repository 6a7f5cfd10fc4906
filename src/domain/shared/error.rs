//! Domain errors

use crate::domain::shared::value_objects::CallId;
use crate::domain::telephony::IncomingCallError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// An action referenced a call that is not live
    #[error("Unknown call: {0}")]
    UnknownCall(CallId),

    /// The call identifier is already registered
    #[error("Call already exists: {0}")]
    DuplicateCall(CallId),

    /// The authority refused to surface an incoming call
    #[error("Incoming call denied: {0}")]
    AuthorityDenied(IncomingCallError),

    /// The call service could not start the call
    #[error("Call service failure: {0}")]
    ServiceFailure(String),

    /// The authority refused a transaction requested by the app
    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
