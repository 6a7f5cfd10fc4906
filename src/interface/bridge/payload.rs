//! Callback payloads sent to the app

use crate::application::event_stream::BridgeEvent;
use crate::domain::audio::AudioEvent;
use crate::domain::call::{CallSnapshot, CallsChanged};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Date layout of every payload date, e.g. `2024-05-01T09:30:00+0000`
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

/// Message delivered on the channel returned by `register`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "callbackType", rename_all = "camelCase")]
pub enum CallbackPayload {
    CallChanged(CallChangedPayload),
    AudioSystem { message: String },
}

/// Primary call summary. All fields keep their defaults when no call is live.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallChangedPayload {
    pub handle: String,
    pub is_outgoing: bool,
    pub is_on_hold: bool,
    pub has_connected: bool,
    pub has_ended: bool,
    pub has_started_connecting: bool,
    pub end_date: String,
    pub connect_date: String,
    pub connecting_date: String,
    /// Seconds since connect
    pub duration: f64,
}

pub fn format_date(date: Option<DateTime<Utc>>) -> String {
    date.map(|date| date.format(DATE_FORMAT).to_string())
        .unwrap_or_default()
}

impl From<&CallSnapshot> for CallChangedPayload {
    fn from(call: &CallSnapshot) -> Self {
        Self {
            handle: call.handle.clone().unwrap_or_default(),
            is_outgoing: call.is_outgoing,
            is_on_hold: call.is_on_hold,
            has_connected: call.has_connected(),
            has_ended: call.has_ended(),
            has_started_connecting: call.has_started_connecting(),
            end_date: format_date(call.end_date),
            connect_date: format_date(call.connect_date),
            connecting_date: format_date(call.connecting_date),
            duration: call.duration.as_secs_f64(),
        }
    }
}

impl From<&CallsChanged> for CallbackPayload {
    fn from(event: &CallsChanged) -> Self {
        let payload = event
            .primary
            .as_ref()
            .map(CallChangedPayload::from)
            .unwrap_or_default();
        CallbackPayload::CallChanged(payload)
    }
}

impl From<AudioEvent> for CallbackPayload {
    fn from(event: AudioEvent) -> Self {
        CallbackPayload::AudioSystem {
            message: event.as_str().to_string(),
        }
    }
}

impl From<&BridgeEvent> for CallbackPayload {
    fn from(event: &BridgeEvent) -> Self {
        match event {
            BridgeEvent::CallsChanged(event) => CallbackPayload::from(event),
            BridgeEvent::Audio(event) => CallbackPayload::from(*event),
        }
    }
}
