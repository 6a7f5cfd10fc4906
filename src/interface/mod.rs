//! Interface layer - External interfaces
//!
//! This layer handles:
//! - Commands from the app's scripting layer
//! - Callback payload formatting

pub mod bridge;
