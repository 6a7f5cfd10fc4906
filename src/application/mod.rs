//! Application layer - Call registry and the authority adapter
//!
//! This layer orchestrates domain objects to fulfill use cases.
//! It's responsible for:
//! - Tracking live calls and publishing their changes
//! - Applying authority actions to calls
//! - Forwarding app requests to the authority

pub mod call_registry;
pub mod event_stream;
pub mod provider_delegate;

pub use call_registry::CallRegistry;
pub use event_stream::{BridgeEvent, EventStream};
pub use provider_delegate::CallAuthorityAdapter;
