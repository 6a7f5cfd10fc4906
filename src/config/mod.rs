//! Configuration management
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! environment variables such as `CALLBRIDGE__PROVIDER__SUPPORTS_VIDEO=false`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "CALLBRIDGE";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub events: EventsConfig,
    pub logging: LoggingConfig,
}

/// Capabilities announced to the call-management authority
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Name shown in the system call UI
    pub localized_name: String,
    pub supports_video: bool,
    /// Calls that may be merged into one group, for calls that support grouping
    pub maximum_calls_per_call_group: usize,
    /// Concurrent call groups the system UI may show
    pub maximum_call_groups: usize,
    /// Ringtone resource name, loaded by the platform
    pub ringtone_sound: Option<String>,
    /// Icon mask resource name, loaded by the platform
    pub icon_template: Option<String>,
    /// Handles whose incoming calls are refused
    pub blocked_handles: Vec<String>,
    /// How long the authority waits for an action to be resolved
    pub action_timeout_ms: u64,
}

impl ProviderConfig {
    pub fn action_timeout(&self) -> Duration {
        Duration::from_millis(self.action_timeout_ms)
    }

    pub fn is_blocked(&self, handle: &str) -> bool {
        self.blocked_handles.iter().any(|blocked| blocked == handle)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            localized_name: "CallBridge".to_string(),
            supports_video: true,
            maximum_calls_per_call_group: 1,
            maximum_call_groups: 2,
            ringtone_sound: Some("Ringtone.caf".to_string()),
            icon_template: Some("IconMask".to_string()),
            blocked_handles: Vec::new(),
            action_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Events buffered per subscriber before it starts lagging
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load defaults, then `path` if given, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ::config::ConfigError> {
        let mut builder =
            ::config::Config::builder().add_source(::config::Config::try_from(&Config::default())?);

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("provider.blocked_handles")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Render as TOML, e.g. to seed a config file
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
