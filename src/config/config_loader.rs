use anyhow::{Ok, Result};

use super::config_model::{
    Auth, Card, Database, DotEnvyConfig, Mpesa, Payment, Paypal, Providers, Server,
};

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let server = Server {
        port: std::env::var("SERVER_PORT")
            .expect("SERVER_PORT is invalid")
            .parse()?,
        body_limit: std::env::var("SERVER_BODY_LIMIT")
            .expect("SERVER_BODY_LIMIT is invalid")
            .parse()?,
        timeout: std::env::var("SERVER_TIMEOUT")
            .expect("SERVER_TIMEOUT is invalid")
            .parse()?,
    };

    let database = Database {
        url: std::env::var("DATABASE_URL").expect("DATABASE_URL is invalid"),
    };

    let auth = Auth {
        jwt_secret: std::env::var("AUTH_JWT_SECRET").expect("AUTH_JWT_SECRET is invalid"),
    };

    let payment = Payment {
        max_amount: std::env::var("PAYMENT_MAX_AMOUNT")
            .unwrap_or_else(|_| "150000".to_string())
            .parse()?,
        rate_limit_per_minute: std::env::var("PAYMENT_RATE_LIMIT_PER_MINUTE")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?,
        pending_timeout_minutes: std::env::var("PAYMENT_PENDING_TIMEOUT_MINUTES")
            .unwrap_or_else(|_| "15".to_string())
            .parse()?,
    };

    let mpesa = Mpesa {
        consumer_key: std::env::var("MPESA_CONSUMER_KEY").expect("MPESA_CONSUMER_KEY is invalid"),
        consumer_secret: std::env::var("MPESA_CONSUMER_SECRET")
            .expect("MPESA_CONSUMER_SECRET is invalid"),
        shortcode: std::env::var("MPESA_SHORTCODE").expect("MPESA_SHORTCODE is invalid"),
        passkey: std::env::var("MPESA_PASSKEY").expect("MPESA_PASSKEY is invalid"),
        base_url: std::env::var("MPESA_BASE_URL")
            .unwrap_or_else(|_| "https://sandbox.safaricom.co.ke".to_string()),
        callback_url: std::env::var("MPESA_CALLBACK_URL").expect("MPESA_CALLBACK_URL is invalid"),
        webhook_secret: std::env::var("MPESA_WEBHOOK_SECRET")
            .expect("MPESA_WEBHOOK_SECRET is invalid"),
    };

    let paypal = Paypal {
        client_id: std::env::var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID is invalid"),
        client_secret: std::env::var("PAYPAL_CLIENT_SECRET")
            .expect("PAYPAL_CLIENT_SECRET is invalid"),
        base_url: std::env::var("PAYPAL_BASE_URL")
            .unwrap_or_else(|_| "https://api-m.sandbox.paypal.com".to_string()),
        currency: std::env::var("PAYPAL_CURRENCY").unwrap_or_else(|_| "USD".to_string()),
        webhook_secret: std::env::var("PAYPAL_WEBHOOK_SECRET")
            .expect("PAYPAL_WEBHOOK_SECRET is invalid"),
    };

    let card = Card {
        secret_key: std::env::var("CARD_SECRET_KEY").expect("CARD_SECRET_KEY is invalid"),
        base_url: std::env::var("CARD_BASE_URL")
            .unwrap_or_else(|_| "https://api.stripe.com".to_string()),
        currency: std::env::var("CARD_CURRENCY").unwrap_or_else(|_| "usd".to_string()),
        webhook_secret: std::env::var("CARD_WEBHOOK_SECRET")
            .expect("CARD_WEBHOOK_SECRET is invalid"),
    };

    Ok(DotEnvyConfig {
        server,
        database,
        auth,
        payment,
        providers: Providers {
            mpesa,
            paypal,
            card,
        },
    })
}
