use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::{
    insert_into,
    prelude::*,
    result::{DatabaseErrorKind, Error as DieselError},
    update,
};

use crate::{
    domain::{
        entities::transactions::{InsertTransactionEntity, TransactionEntity},
        repositories::transactions::{CreateResult, TransactionRepository, TransitionOutcome},
        value_objects::enums::transaction_statuses::TransactionStatus,
    },
    infrastructure::postgres::{postgres_connection::PgPoolSquad, schema::transactions},
};

pub struct TransactionPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl TransactionPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl TransactionRepository for TransactionPostgres {
    async fn create(&self, entity: InsertTransactionEntity) -> Result<CreateResult> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let inserted = insert_into(transactions::table)
            .values(&entity)
            .returning(TransactionEntity::as_returning())
            .get_result::<TransactionEntity>(&mut conn);

        match inserted {
            Ok(transaction) => Ok(CreateResult::Created(transaction)),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Ok(CreateResult::DuplicateReference)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<TransactionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = transactions::table
            .filter(transactions::reference.eq(reference))
            .select(TransactionEntity::as_select())
            .first::<TransactionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<TransactionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let result = transactions::table
            .filter(transactions::provider_ref.eq(provider_ref))
            .select(TransactionEntity::as_select())
            .first::<TransactionEntity>(&mut conn)
            .optional()?;

        Ok(result)
    }

    async fn mark_processing<'a>(
        &self,
        reference: &'a str,
        provider_ref: Option<&'a str>,
    ) -> Result<TransitionOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // A callback can complete or fail the transaction before the dispatch
        // bookkeeping runs; the conditional update must lose that race.
        let applied = update(transactions::table)
            .filter(transactions::reference.eq(reference))
            .filter(transactions::status.eq_any(vec![
                TransactionStatus::Pending.to_string(),
                TransactionStatus::Processing.to_string(),
            ]))
            .set((
                transactions::status.eq(TransactionStatus::Processing.to_string()),
                transactions::provider_ref.eq(provider_ref),
                transactions::updated_at.eq(Utc::now()),
            ))
            .returning(TransactionEntity::as_returning())
            .get_result::<TransactionEntity>(&mut conn)
            .optional()?;

        if let Some(transaction) = applied {
            return Ok(TransitionOutcome::Applied(transaction));
        }

        let existing = transactions::table
            .filter(transactions::reference.eq(reference))
            .select(TransactionEntity::as_select())
            .first::<TransactionEntity>(&mut conn)
            .optional()?;

        match existing {
            Some(transaction) => Ok(TransitionOutcome::AlreadyTerminal(transaction)),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    async fn fail_transaction(&self, reference: &str, reason: &str) -> Result<TransitionOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        // Conditional update is the test-and-set: it only matches while the
        // row is still non-terminal.
        let applied = update(transactions::table)
            .filter(transactions::reference.eq(reference))
            .filter(transactions::status.eq_any(vec![
                TransactionStatus::Pending.to_string(),
                TransactionStatus::Processing.to_string(),
            ]))
            .set((
                transactions::status.eq(TransactionStatus::Failed.to_string()),
                transactions::failure_reason.eq(reason),
                transactions::updated_at.eq(Utc::now()),
            ))
            .returning(TransactionEntity::as_returning())
            .get_result::<TransactionEntity>(&mut conn)
            .optional()?;

        if let Some(transaction) = applied {
            return Ok(TransitionOutcome::Applied(transaction));
        }

        let existing = transactions::table
            .filter(transactions::reference.eq(reference))
            .select(TransactionEntity::as_select())
            .first::<TransactionEntity>(&mut conn)
            .optional()?;

        match existing {
            Some(transaction) => Ok(TransitionOutcome::AlreadyTerminal(transaction)),
            None => Ok(TransitionOutcome::NotFound),
        }
    }

    async fn fail_stale(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<TransactionEntity>> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let expired = update(transactions::table)
            .filter(transactions::status.eq_any(vec![
                TransactionStatus::Pending.to_string(),
                TransactionStatus::Processing.to_string(),
            ]))
            .filter(transactions::created_at.lt(cutoff))
            .set((
                transactions::status.eq(TransactionStatus::Failed.to_string()),
                transactions::failure_reason.eq(reason),
                transactions::updated_at.eq(Utc::now()),
            ))
            .returning(TransactionEntity::as_returning())
            .get_results::<TransactionEntity>(&mut conn)?;

        Ok(expired)
    }
}
