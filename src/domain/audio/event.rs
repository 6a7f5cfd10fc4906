//! Audio lifecycle events

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instruction for the audio controller.
///
/// The controller has no acknowledgment channel; events are fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AudioEvent {
    /// Prepare the audio session without starting media
    ConfigureAudio,
    /// Start call audio, the session is active
    StartAudio,
    /// Stop call audio
    StopAudio,
}

impl AudioEvent {
    pub const CONFIGURE_AUDIO: &'static str = "configureAudio";
    pub const START_AUDIO: &'static str = "startAudio";
    pub const STOP_AUDIO: &'static str = "stopAudio";

    pub fn as_str(&self) -> &'static str {
        match self {
            AudioEvent::ConfigureAudio => Self::CONFIGURE_AUDIO,
            AudioEvent::StartAudio => Self::START_AUDIO,
            AudioEvent::StopAudio => Self::STOP_AUDIO,
        }
    }
}

impl fmt::Display for AudioEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
