//! Transactions requested by the app

use crate::domain::shared::value_objects::{CallHandle, CallId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single requested transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionAction {
    StartCall {
        call_id: CallId,
        handle: CallHandle,
        is_video: bool,
    },
    EndCall {
        call_id: CallId,
    },
    SetHeldCall {
        call_id: CallId,
        on_hold: bool,
    },
}

impl TransactionAction {
    pub fn call_id(&self) -> CallId {
        match self {
            TransactionAction::StartCall { call_id, .. }
            | TransactionAction::EndCall { call_id }
            | TransactionAction::SetHeldCall { call_id, .. } => *call_id,
        }
    }
}

/// Group of actions submitted to the authority in one request.
///
/// The authority either accepts the whole transaction and later delivers each
/// action to the provider delegate, or rejects it outright.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: Uuid,
    actions: Vec<TransactionAction>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            actions: Vec::new(),
        }
    }

    pub fn with_action(action: TransactionAction) -> Self {
        let mut transaction = Self::new();
        transaction.add_action(action);
        transaction
    }

    pub fn add_action(&mut self, action: TransactionAction) {
        self.actions.push(action);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn actions(&self) -> &[TransactionAction] {
        &self.actions
    }

    pub fn into_actions(self) -> Vec<TransactionAction> {
        self.actions
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
