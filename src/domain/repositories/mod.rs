pub mod checkout;
pub mod transactions;
