use diesel::prelude::*;

use crate::infrastructure::postgres::schema::cart_items;

/// Ephemeral cart line, one cart per customer identity. Cleared, not
/// archived, when a checkout completes.
#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = cart_items)]
pub struct CartItemEntity {
    pub id: i64,
    pub customer_identity: String,
    pub product_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = cart_items)]
pub struct InsertCartItemEntity {
    pub customer_identity: String,
    pub product_id: i64,
    pub quantity: i32,
}
