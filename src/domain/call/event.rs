//! Call events published to observers

use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Point-in-time copy of a call's state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallSnapshot {
    pub call_id: CallId,
    pub handle: Option<String>,
    pub is_outgoing: bool,
    pub is_on_hold: bool,
    pub connecting_date: Option<DateTime<Utc>>,
    pub connect_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl CallSnapshot {
    pub fn has_started_connecting(&self) -> bool {
        self.connecting_date.is_some()
    }

    pub fn has_connected(&self) -> bool {
        self.connect_date.is_some()
    }

    pub fn has_ended(&self) -> bool {
        self.end_date.is_some()
    }
}

/// "Calls changed" notification.
///
/// Only the primary (first) call is summarized, matching the
/// one-call-per-group provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallsChanged {
    pub primary: Option<CallSnapshot>,
    pub call_count: usize,
    pub occurred_at: DateTime<Utc>,
}

impl CallsChanged {
    pub fn new(primary: Option<CallSnapshot>, call_count: usize) -> Self {
        Self {
            primary,
            call_count,
            occurred_at: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.call_count == 0
    }
}
