pub mod card_client;
pub mod mpesa_client;
pub mod paypal_client;
pub mod signature;
