use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::transactions::TransactionEntity,
    value_objects::enums::{
        payment_methods::PaymentMethod, transaction_statuses::TransactionStatus,
    },
};

/// Request body for `POST /payments/initiate`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitiatePaymentModel {
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub phone_number: Option<String>,
}

/// Response for a successfully dispatched payment.
#[derive(Debug, Clone, Serialize)]
pub struct InitiatedPayment {
    pub reference: String,
    pub provider_correlation_id: Option<String>,
}

/// Customer-facing view of a transaction, served by the status query.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentStatusModel {
    pub reference: String,
    pub status: TransactionStatus,
    pub payment_method: PaymentMethod,
    pub amount: Decimal,
    pub transaction_date: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl TryFrom<TransactionEntity> for PaymentStatusModel {
    type Error = anyhow::Error;

    fn try_from(transaction: TransactionEntity) -> Result<Self, Self::Error> {
        let status = transaction.status();
        let payment_method = transaction.payment_method().ok_or_else(|| {
            anyhow::anyhow!(
                "transaction {} has unrecognized payment method {:?}",
                transaction.reference,
                transaction.payment_method
            )
        })?;
        Ok(Self {
            reference: transaction.reference,
            status,
            payment_method,
            amount: transaction.amount,
            transaction_date: transaction.created_at,
            provider_transaction_id: transaction.provider_transaction_id,
            failure_reason: transaction.failure_reason,
        })
    }
}
