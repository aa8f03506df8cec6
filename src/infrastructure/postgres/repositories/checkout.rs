use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use diesel::{delete, insert_into, prelude::*, update};

use crate::{
    domain::{
        entities::{
            carts::CartItemEntity,
            orders::{InsertOrderEntity, InsertOrderItemEntity, OrderEntity},
            products::ProductEntity,
            transactions::TransactionEntity,
        },
        repositories::checkout::{CheckoutOutcome, CheckoutRepository},
        value_objects::enums::transaction_statuses::TransactionStatus,
    },
    infrastructure::postgres::{
        postgres_connection::PgPoolSquad,
        schema::{cart_items, order_items, orders, products, transactions},
    },
};

pub struct CheckoutPostgres {
    db_pool: Arc<PgPoolSquad>,
}

impl CheckoutPostgres {
    pub fn new(db_pool: Arc<PgPoolSquad>) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl CheckoutRepository for CheckoutPostgres {
    async fn complete_checkout(
        &self,
        reference: &str,
        provider_transaction_id: &str,
    ) -> Result<CheckoutOutcome> {
        let mut conn = Arc::clone(&self.db_pool).get()?;

        let outcome = conn.transaction::<CheckoutOutcome, anyhow::Error, _>(|conn| {
            // Row lock on the transaction serializes racing callbacks for the
            // same reference; callbacks for other references run in parallel.
            let transaction = transactions::table
                .filter(transactions::reference.eq(reference))
                .for_update()
                .select(TransactionEntity::as_select())
                .first::<TransactionEntity>(conn)
                .optional()?;

            let Some(transaction) = transaction else {
                return Ok(CheckoutOutcome::NotFound);
            };

            if transaction.is_terminal() {
                return Ok(CheckoutOutcome::AlreadyTerminal { transaction });
            }

            let cart = cart_items::table
                .filter(cart_items::customer_identity.eq(&transaction.customer_identity))
                .select(CartItemEntity::as_select())
                .load::<CartItemEntity>(conn)?;

            // Validate every line under product row locks before touching any
            // stock counter, so a shortfall leaves all counters untouched.
            let mut lines: Vec<(CartItemEntity, ProductEntity)> = Vec::with_capacity(cart.len());
            for item in cart {
                let product = products::table
                    .find(item.product_id)
                    .for_update()
                    .select(ProductEntity::as_select())
                    .first::<ProductEntity>(conn)?;

                if item.quantity > product.stock_quantity {
                    let detail = format!(
                        "insufficient stock for product '{}': requested {}, available {}",
                        product.name, item.quantity, product.stock_quantity
                    );
                    let failed = update(transactions::table)
                        .filter(transactions::reference.eq(reference))
                        .set((
                            transactions::status.eq(TransactionStatus::Failed.to_string()),
                            transactions::failure_reason.eq(&detail),
                            transactions::updated_at.eq(Utc::now()),
                        ))
                        .returning(TransactionEntity::as_returning())
                        .get_result::<TransactionEntity>(conn)?;

                    return Ok(CheckoutOutcome::OutOfStock {
                        transaction: failed,
                        detail,
                    });
                }

                lines.push((item, product));
            }

            let order = insert_into(orders::table)
                .values(InsertOrderEntity {
                    reference: transaction.reference.clone(),
                    customer_identity: transaction.customer_identity.clone(),
                    total_amount: transaction.amount,
                })
                .returning(OrderEntity::as_returning())
                .get_result::<OrderEntity>(conn)?;

            for (item, product) in &lines {
                update(products::table.find(product.id))
                    .set(products::stock_quantity.eq(products::stock_quantity - item.quantity))
                    .execute(conn)?;

                insert_into(order_items::table)
                    .values(InsertOrderItemEntity {
                        order_id: order.id,
                        product_id: product.id,
                        quantity: item.quantity,
                        unit_price: product.price,
                    })
                    .execute(conn)?;
            }

            delete(
                cart_items::table
                    .filter(cart_items::customer_identity.eq(&transaction.customer_identity)),
            )
            .execute(conn)?;

            let completed = update(transactions::table)
                .filter(transactions::reference.eq(reference))
                .set((
                    transactions::status.eq(TransactionStatus::Completed.to_string()),
                    transactions::provider_transaction_id.eq(provider_transaction_id),
                    transactions::updated_at.eq(Utc::now()),
                ))
                .returning(TransactionEntity::as_returning())
                .get_result::<TransactionEntity>(conn)?;

            Ok(CheckoutOutcome::Completed {
                transaction: completed,
                order,
            })
        })?;

        Ok(outcome)
    }
}
