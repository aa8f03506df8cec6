//! In-memory implementation of the transaction store and checkout mutator.
//!
//! Backed by a single `Mutex`, which gives the same guarantee the Postgres
//! implementation gets from row locks: the terminal-state transition and the
//! order/inventory mutation happen as one atomic unit. Used by the
//! reconciliation integration tests; also handy for local demos without a
//! database.

use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{
    entities::{
        carts::CartItemEntity,
        orders::{OrderEntity, OrderItemEntity},
        products::ProductEntity,
        transactions::{InsertTransactionEntity, TransactionEntity},
    },
    repositories::{
        checkout::{CheckoutOutcome, CheckoutRepository},
        transactions::{CreateResult, TransactionRepository, TransitionOutcome},
    },
    value_objects::enums::transaction_statuses::TransactionStatus,
};

#[derive(Default)]
struct StoreState {
    transactions: HashMap<String, TransactionEntity>,
    products: HashMap<i64, ProductEntity>,
    carts: HashMap<String, Vec<CartItemEntity>>,
    orders: Vec<OrderEntity>,
    order_items: Vec<OrderItemEntity>,
    next_transaction_id: i64,
    next_order_id: i64,
    next_order_item_id: i64,
    next_cart_item_id: i64,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn seed_product(&self, product: ProductEntity) {
        let mut state = self.lock();
        state.products.insert(product.id, product);
    }

    pub fn seed_cart_item(&self, customer_identity: &str, product_id: i64, quantity: i32) {
        let mut state = self.lock();
        state.next_cart_item_id += 1;
        let item = CartItemEntity {
            id: state.next_cart_item_id,
            customer_identity: customer_identity.to_string(),
            product_id,
            quantity,
        };
        state
            .carts
            .entry(customer_identity.to_string())
            .or_default()
            .push(item);
    }

    pub fn orders(&self) -> Vec<OrderEntity> {
        self.lock().orders.clone()
    }

    pub fn order_items(&self) -> Vec<OrderItemEntity> {
        self.lock().order_items.clone()
    }

    pub fn product_stock(&self, product_id: i64) -> Option<i32> {
        self.lock()
            .products
            .get(&product_id)
            .map(|product| product.stock_quantity)
    }

    pub fn cart_len(&self, customer_identity: &str) -> usize {
        self.lock()
            .carts
            .get(customer_identity)
            .map(|items| items.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl TransactionRepository for InMemoryStore {
    async fn create(&self, entity: InsertTransactionEntity) -> Result<CreateResult> {
        let mut state = self.lock();
        if state.transactions.contains_key(&entity.reference) {
            return Ok(CreateResult::DuplicateReference);
        }

        state.next_transaction_id += 1;
        let now = Utc::now();
        let transaction = TransactionEntity {
            id: state.next_transaction_id,
            reference: entity.reference.clone(),
            payment_method: entity.payment_method,
            amount: entity.amount,
            status: entity.status,
            customer_identity: entity.customer_identity,
            provider_ref: None,
            provider_transaction_id: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
        };
        state
            .transactions
            .insert(entity.reference, transaction.clone());
        Ok(CreateResult::Created(transaction))
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<TransactionEntity>> {
        Ok(self.lock().transactions.get(reference).cloned())
    }

    async fn find_by_provider_ref(
        &self,
        provider_ref: &str,
    ) -> Result<Option<TransactionEntity>> {
        Ok(self
            .lock()
            .transactions
            .values()
            .find(|transaction| transaction.provider_ref.as_deref() == Some(provider_ref))
            .cloned())
    }

    async fn mark_processing<'a>(
        &self,
        reference: &'a str,
        provider_ref: Option<&'a str>,
    ) -> Result<TransitionOutcome> {
        let mut state = self.lock();
        let Some(transaction) = state.transactions.get_mut(reference) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if transaction.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal(transaction.clone()));
        }
        transaction.status = TransactionStatus::Processing.to_string();
        transaction.provider_ref = provider_ref.map(|value| value.to_string());
        transaction.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(transaction.clone()))
    }

    async fn fail_transaction(&self, reference: &str, reason: &str) -> Result<TransitionOutcome> {
        let mut state = self.lock();
        let Some(transaction) = state.transactions.get_mut(reference) else {
            return Ok(TransitionOutcome::NotFound);
        };
        if transaction.is_terminal() {
            return Ok(TransitionOutcome::AlreadyTerminal(transaction.clone()));
        }
        transaction.status = TransactionStatus::Failed.to_string();
        transaction.failure_reason = Some(reason.to_string());
        transaction.updated_at = Utc::now();
        Ok(TransitionOutcome::Applied(transaction.clone()))
    }

    async fn fail_stale(
        &self,
        cutoff: DateTime<Utc>,
        reason: &str,
    ) -> Result<Vec<TransactionEntity>> {
        let mut state = self.lock();
        let mut expired = Vec::new();
        for transaction in state.transactions.values_mut() {
            if !transaction.is_terminal() && transaction.created_at < cutoff {
                transaction.status = TransactionStatus::Failed.to_string();
                transaction.failure_reason = Some(reason.to_string());
                transaction.updated_at = Utc::now();
                expired.push(transaction.clone());
            }
        }
        Ok(expired)
    }
}

#[async_trait]
impl CheckoutRepository for InMemoryStore {
    async fn complete_checkout(
        &self,
        reference: &str,
        provider_transaction_id: &str,
    ) -> Result<CheckoutOutcome> {
        // The whole completion runs under one guard, mirroring the single
        // database transaction of the Postgres implementation.
        let mut state = self.lock();

        let Some(transaction) = state.transactions.get(reference).cloned() else {
            return Ok(CheckoutOutcome::NotFound);
        };

        if transaction.is_terminal() {
            return Ok(CheckoutOutcome::AlreadyTerminal { transaction });
        }

        let cart = state
            .carts
            .get(&transaction.customer_identity)
            .cloned()
            .unwrap_or_default();

        for item in &cart {
            let Some(product) = state.products.get(&item.product_id) else {
                anyhow::bail!("cart references unknown product {}", item.product_id);
            };
            if item.quantity > product.stock_quantity {
                let detail = format!(
                    "insufficient stock for product '{}': requested {}, available {}",
                    product.name, item.quantity, product.stock_quantity
                );
                let failed = state
                    .transactions
                    .get_mut(reference)
                    .expect("transaction vanished under lock");
                failed.status = TransactionStatus::Failed.to_string();
                failed.failure_reason = Some(detail.clone());
                failed.updated_at = Utc::now();
                return Ok(CheckoutOutcome::OutOfStock {
                    transaction: failed.clone(),
                    detail,
                });
            }
        }

        state.next_order_id += 1;
        let order = OrderEntity {
            id: state.next_order_id,
            reference: transaction.reference.clone(),
            customer_identity: transaction.customer_identity.clone(),
            total_amount: transaction.amount,
            created_at: Utc::now(),
        };
        state.orders.push(order.clone());

        for item in &cart {
            let product = state
                .products
                .get_mut(&item.product_id)
                .expect("product vanished under lock");
            product.stock_quantity -= item.quantity;
            let unit_price = product.price;

            state.next_order_item_id += 1;
            let order_item = OrderItemEntity {
                id: state.next_order_item_id,
                order_id: order.id,
                product_id: item.product_id,
                quantity: item.quantity,
                unit_price,
            };
            state.order_items.push(order_item);
        }

        state.carts.remove(&transaction.customer_identity);

        let completed = state
            .transactions
            .get_mut(reference)
            .expect("transaction vanished under lock");
        completed.status = TransactionStatus::Completed.to_string();
        completed.provider_transaction_id = Some(provider_transaction_id.to_string());
        completed.updated_at = Utc::now();

        Ok(CheckoutOutcome::Completed {
            transaction: completed.clone(),
            order,
        })
    }
}
