//! Incoming call reports

use crate::domain::shared::value_objects::CallHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Description of an incoming call shown by the system call UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallUpdate {
    pub remote_handle: CallHandle,
    pub has_video: bool,
    pub supports_grouping: bool,
    pub supports_ungrouping: bool,
    pub supports_dtmf: bool,
    pub supports_holding: bool,
}

impl CallUpdate {
    /// Audio-only update with every capability disabled
    pub fn new(remote_handle: CallHandle) -> Self {
        Self {
            remote_handle,
            has_video: false,
            supports_grouping: false,
            supports_ungrouping: false,
            supports_dtmf: false,
            supports_holding: false,
        }
    }
}

/// Why the authority refused to surface an incoming call
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncomingCallError {
    #[error("unknown reason")]
    Unknown,
    #[error("not entitled to report more calls")]
    Unentitled,
    #[error("a call with this identifier already exists")]
    CallIdAlreadyExists,
    #[error("filtered by do not disturb")]
    FilteredByDoNotDisturb,
    #[error("filtered by block list")]
    FilteredByBlockList,
}

/// Why a call the system UI shows ended without an end action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallEndedReason {
    /// The call could not be set up, e.g. the app refused to track it
    Failed,
    RemoteEnded,
    Unanswered,
    AnsweredElsewhere,
    DeclinedElsewhere,
}
