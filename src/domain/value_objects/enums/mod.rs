pub mod payment_methods;
pub mod transaction_statuses;
