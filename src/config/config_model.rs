use rust_decimal::Decimal;

#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub server: Server,
    pub database: Database,
    pub auth: Auth,
    pub payment: Payment,
    pub providers: Providers,
}

#[derive(Debug, Clone)]
pub struct Server {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct Auth {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Payment {
    pub max_amount: Decimal,
    pub rate_limit_per_minute: u32,
    /// Minutes before a non-terminal transaction is failed by the reaper.
    /// Zero disables the reaper.
    pub pending_timeout_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct Providers {
    pub mpesa: Mpesa,
    pub paypal: Paypal,
    pub card: Card,
}

#[derive(Debug, Clone)]
pub struct Mpesa {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub base_url: String,
    pub callback_url: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Paypal {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub currency: String,
    pub webhook_secret: String,
}

#[derive(Debug, Clone)]
pub struct Card {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
    pub webhook_secret: String,
}
