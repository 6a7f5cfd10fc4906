//! Call state listeners

use crate::domain::call::aggregate::Call;
use std::sync::atomic::{AtomicU64, Ordering};

/// Observer of a single call's state.
///
/// `state_did_change` fires for every timestamp or hold mutation; the
/// specific hooks fire in addition for their own timestamp. Hooks are
/// invoked synchronously on the thread that performed the mutation.
pub trait CallListener: Send + Sync {
    fn state_did_change(&self, _call: &Call) {}

    fn has_started_connecting_did_change(&self, _call: &Call) {}

    fn has_connected_did_change(&self, _call: &Call) {}

    fn has_ended_did_change(&self, _call: &Call) {}
}

/// Handle returned by [`Call::add_listener`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Which timestamp a mutation touched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StateChange {
    StartedConnecting,
    Connected,
    Ended,
}
