//! Domain layer - Core call state and the authority contract
//!
//! This layer contains:
//! - The call entity and its listeners
//! - Audio controller messages
//! - Ports and action types for the call-management authority

pub mod audio;
pub mod call;
pub mod shared;
pub mod telephony;

// Re-export commonly used types
pub use shared::{DomainError, Result};
