use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::infrastructure::postgres::schema::products;

#[derive(Debug, Clone, Identifiable, Selectable, Queryable)]
#[diesel(table_name = products)]
pub struct ProductEntity {
    pub id: i64,
    pub name: String,
    pub price: Decimal,
    pub stock_quantity: i32,
}
