pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod usecases;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::{
    infrastructure::{
        axum_http::http_serve,
        payments::{
            card_client::{CardClient, CardConfig},
            mpesa_client::{MpesaClient, MpesaConfig},
            paypal_client::{PaypalClient, PaypalConfig},
        },
        postgres::{
            postgres_connection,
            repositories::{checkout::CheckoutPostgres, transactions::TransactionPostgres},
        },
    },
    usecases::payments::{
        CallbackSecrets, PaymentPolicy, PaymentUseCase, ProviderGateways,
    },
};

pub async fn run() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let dotenvy_env = config::config_loader::load()?;
    info!("ENV has been loaded");

    let postgres_pool = Arc::new(postgres_connection::establish_connection(
        &dotenvy_env.database.url,
    )?);
    info!("Postgres connection has been established");

    let providers = &dotenvy_env.providers;
    let gateways = ProviderGateways {
        mpesa: Arc::new(MpesaClient::new(MpesaConfig {
            consumer_key: providers.mpesa.consumer_key.clone(),
            consumer_secret: providers.mpesa.consumer_secret.clone(),
            shortcode: providers.mpesa.shortcode.clone(),
            passkey: providers.mpesa.passkey.clone(),
            base_url: providers.mpesa.base_url.clone(),
            callback_url: providers.mpesa.callback_url.clone(),
        })),
        paypal: Arc::new(PaypalClient::new(PaypalConfig {
            client_id: providers.paypal.client_id.clone(),
            client_secret: providers.paypal.client_secret.clone(),
            base_url: providers.paypal.base_url.clone(),
            currency: providers.paypal.currency.clone(),
        })),
        card: Arc::new(CardClient::new(CardConfig {
            secret_key: providers.card.secret_key.clone(),
            base_url: providers.card.base_url.clone(),
            currency: providers.card.currency.clone(),
        })),
    };

    let secrets = CallbackSecrets {
        mpesa: providers.mpesa.webhook_secret.clone(),
        paypal: providers.paypal.webhook_secret.clone(),
        card: providers.card.webhook_secret.clone(),
    };

    let policy = PaymentPolicy {
        max_amount: dotenvy_env.payment.max_amount,
        rate_limit_per_minute: dotenvy_env.payment.rate_limit_per_minute,
    };

    let payments_usecase = Arc::new(PaymentUseCase::new(
        Arc::new(TransactionPostgres::new(Arc::clone(&postgres_pool))),
        Arc::new(CheckoutPostgres::new(Arc::clone(&postgres_pool))),
        gateways,
        secrets,
        policy,
    ));

    let pending_timeout_minutes = dotenvy_env.payment.pending_timeout_minutes;
    if pending_timeout_minutes > 0 {
        let reaper_usecase = Arc::clone(&payments_usecase);
        tokio::spawn(async move {
            usecases::reaper::run_reaper_loop(
                reaper_usecase,
                chrono::Duration::minutes(pending_timeout_minutes),
            )
            .await;
        });
    }

    http_serve::start(Arc::new(dotenvy_env), payments_usecase).await?;

    Ok(())
}
