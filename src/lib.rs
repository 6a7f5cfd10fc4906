//! CallBridge - Bridges an app's scripting layer to the platform call UI
//!
//! This is a Domain-Driven Design (DDD) implementation of a call lifecycle
//! core that mirrors every call to a call-management authority.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::error::DomainError;
pub use domain::shared::result::Result;
