//! Call-management authority implementations

pub mod simulated;

pub use simulated::{ActionRecord, OutgoingReport, OutgoingReportKind, SimulatedAuthority};
