use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::automock;

use crate::domain::entities::transactions::{InsertTransactionEntity, TransactionEntity};

/// Outcome of inserting a new transaction. The reference carries a uniqueness
/// constraint; a collision is reported so the caller can regenerate.
#[derive(Debug, Clone)]
pub enum CreateResult {
    Created(TransactionEntity),
    DuplicateReference,
}

/// Outcome of a conditional status transition. Every transition is a
/// test-and-set: it only applies while the transaction is non-terminal, so a
/// terminal state can never be overwritten.
#[derive(Debug, Clone)]
pub enum TransitionOutcome {
    Applied(TransactionEntity),
    AlreadyTerminal(TransactionEntity),
    NotFound,
}

#[automock]
#[async_trait]
pub trait TransactionRepository {
    async fn create(&self, entity: InsertTransactionEntity) -> Result<CreateResult>;

    async fn find_by_reference(&self, reference: &str) -> Result<Option<TransactionEntity>>;

    /// Lookup by the provider-issued correlation id recorded at dispatch time
    /// (e.g. the M-Pesa CheckoutRequestID).
    async fn find_by_provider_ref(&self, provider_ref: &str)
    -> Result<Option<TransactionEntity>>;

    /// Records the dispatch: moves a non-terminal transaction to `processing`
    /// and stores the provider correlation id. A callback can land before
    /// this runs, so it must not touch a transaction that is already
    /// terminal.
    async fn mark_processing<'a>(
        &self,
        reference: &'a str,
        provider_ref: Option<&'a str>,
    ) -> Result<TransitionOutcome>;

    async fn fail_transaction(&self, reference: &str, reason: &str)
    -> Result<TransitionOutcome>;

    /// Fails every non-terminal transaction created before `cutoff` and
    /// returns the affected rows. Used by the expiry reaper.
    async fn fail_stale(&self, cutoff: DateTime<Utc>, reason: &str)
    -> Result<Vec<TransactionEntity>>;
}
