use serde::Serialize;

use crate::domain::{
    entities::transactions::TransactionEntity,
    value_objects::enums::transaction_statuses::TransactionStatus,
};

/// How a provider callback identifies the transaction it belongs to. M-Pesa
/// only echoes back its own CheckoutRequestID; PayPal and card webhooks carry
/// the reference we attached at initiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackReference {
    Reference(String),
    ProviderRef(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackOutcome {
    Success { provider_transaction_id: String },
    Failure { reason: String },
}

/// A provider callback reduced to the fields the reconciliation engine needs.
/// Only ever produced after the signature has been verified.
#[derive(Debug, Clone)]
pub struct NormalizedCallback {
    pub reference: CallbackReference,
    pub outcome: CallbackOutcome,
}

/// Acknowledgment returned by a provider's `initiate` call.
#[derive(Debug, Clone)]
pub struct ProviderAck {
    pub provider_ref: Option<String>,
}

/// Result of processing one callback. `replayed` is true when the transaction
/// was already terminal and the stored outcome is being returned as-is.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    pub reference: String,
    pub status: TransactionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    pub replayed: bool,
}

impl ReconcileResult {
    pub fn applied(transaction: &TransactionEntity) -> Self {
        Self::from_transaction(transaction, false)
    }

    pub fn replayed(transaction: &TransactionEntity) -> Self {
        Self::from_transaction(transaction, true)
    }

    fn from_transaction(transaction: &TransactionEntity, replayed: bool) -> Self {
        Self {
            reference: transaction.reference.clone(),
            status: transaction.status(),
            provider_transaction_id: transaction.provider_transaction_id.clone(),
            replayed,
        }
    }
}
