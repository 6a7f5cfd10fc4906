//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - The call-management authority the bridge runs against
//! - The network call service
//! - Metrics recording

pub mod authority;
pub mod metrics;
pub mod service;
