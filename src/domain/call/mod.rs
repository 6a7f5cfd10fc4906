//! Call bounded context - the state of one call and how it is observed

pub mod aggregate;
pub mod event;
pub mod listener;

pub use aggregate::Call;
pub use event::{CallSnapshot, CallsChanged};
pub use listener::{CallListener, ListenerId};
