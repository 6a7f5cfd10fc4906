//! Command bridge between the app's scripting layer and the call core

pub mod command;
pub mod payload;
pub mod plugin;

pub use command::{BridgeError, CommandArgs};
pub use payload::{CallChangedPayload, CallbackPayload, DATE_FORMAT};
pub use plugin::CallKitPlugin;
