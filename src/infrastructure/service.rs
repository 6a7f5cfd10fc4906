//! Network call service
//!
//! Placing the actual call is the host application's concern. This service
//! accepts every call immediately unless switched into failure mode.

use crate::domain::call::Call;
use crate::domain::shared::error::DomainError;
use crate::domain::shared::result::Result;
use crate::domain::telephony::CallService;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Default)]
pub struct SimulatedCallService {
    failing: AtomicBool,
}

impl SimulatedCallService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `start_call` invocations fail
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl CallService for SimulatedCallService {
    fn start_call(&self, call: &Call) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            warn!("Network unavailable, cannot start call {}", call.id());
            return Err(DomainError::ServiceFailure(format!(
                "network unavailable for call {}",
                call.id()
            )));
        }

        info!("Starting call {} to {:?}", call.id(), call.handle());
        Ok(())
    }
}
