use chrono::{DateTime, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::{
    domain::value_objects::enums::{
        payment_methods::PaymentMethod, transaction_statuses::TransactionStatus,
    },
    infrastructure::postgres::schema::transactions,
};

/// One payment attempt. `reference` is the sole idempotency key: it is unique,
/// generated at creation, and never changes afterwards.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = transactions)]
pub struct TransactionEntity {
    pub id: i64,
    pub reference: String,
    pub payment_method: String,
    pub amount: Decimal,
    pub status: String,
    pub customer_identity: String,
    pub provider_ref: Option<String>,
    pub provider_transaction_id: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = transactions)]
pub struct InsertTransactionEntity {
    pub reference: String,
    pub payment_method: String,
    pub amount: Decimal,
    pub status: String,
    pub customer_identity: String,
}

impl TransactionEntity {
    pub fn status(&self) -> TransactionStatus {
        TransactionStatus::from_str(&self.status).unwrap_or(TransactionStatus::Failed)
    }

    pub fn payment_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::from_str(&self.payment_method)
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}
