use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::domain::entities::{orders::OrderEntity, transactions::TransactionEntity};

/// Outcome of the completion test-and-set. Exactly one of any number of
/// racing callbacks observes `Completed` or `OutOfStock`; the rest observe
/// `AlreadyTerminal` with the stored transaction.
#[derive(Debug, Clone)]
pub enum CheckoutOutcome {
    Completed {
        transaction: TransactionEntity,
        order: OrderEntity,
    },
    /// Stock ran out between cart view and payment completion. The
    /// transaction has been routed to `failed` in the same atomic unit and
    /// no stock was decremented.
    OutOfStock {
        transaction: TransactionEntity,
        detail: String,
    },
    AlreadyTerminal {
        transaction: TransactionEntity,
    },
    NotFound,
}

/// The order/inventory mutator. `complete_checkout` is a single atomic unit:
/// the `processing -> completed` transition, the per-item stock validation
/// and decrement, the order snapshot insert, and the cart clear all commit
/// together or not at all.
#[automock]
#[async_trait]
pub trait CheckoutRepository {
    async fn complete_checkout(
        &self,
        reference: &str,
        provider_transaction_id: &str,
    ) -> Result<CheckoutOutcome>;
}
