use anyhow::{Context, Result};
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Deserialize;
use tracing::error;

use crate::domain::value_objects::callbacks::{
    CallbackOutcome, CallbackReference, NormalizedCallback, ProviderAck,
};

#[derive(Debug, Clone)]
pub struct CardConfig {
    pub secret_key: String,
    pub base_url: String,
    pub currency: String,
}

/// Card charges via a Stripe-style payment-intents API.
pub struct CardClient {
    http: reqwest::Client,
    config: CardConfig,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CardEvent {
    #[serde(rename = "type")]
    type_: String,
    data: CardEventData,
}

#[derive(Debug, Deserialize)]
struct CardEventData {
    object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: String,
    metadata: Option<PaymentIntentMetadata>,
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentMetadata {
    reference: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

impl CardClient {
    pub fn new(config: CardConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Creates a payment intent for the amount, tagging it with our reference
    /// so the webhook can be correlated.
    pub async fn create_payment_intent(
        &self,
        amount: Decimal,
        reference: &str,
    ) -> Result<ProviderAck> {
        // The card API takes minor units.
        let amount_minor = (amount * Decimal::from(100))
            .trunc()
            .to_i64()
            .context("amount does not fit a payment intent payload")?;

        let body = [
            ("amount", amount_minor.to_string()),
            ("currency", self.config.currency.clone()),
            ("metadata[reference]", reference.to_string()),
        ];

        let resp = self
            .http
            .post(format!("{}/v1/payment_intents", self.config.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.config.secret_key),
            )
            .form(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, response_body = %body, "card: payment intent creation failed");
            anyhow::bail!("card payment intent creation failed with status {}", status);
        }

        let parsed: PaymentIntentResponse = resp.json().await?;
        Ok(ProviderAck {
            provider_ref: Some(parsed.id),
        })
    }

    pub fn parse_webhook(raw_body: &[u8]) -> Result<NormalizedCallback> {
        let event: CardEvent =
            serde_json::from_slice(raw_body).context("malformed card webhook body")?;
        let intent = event.data.object;

        let reference = intent
            .metadata
            .and_then(|metadata| metadata.reference)
            .context("card webhook missing metadata reference")?;

        let outcome = match event.type_.as_str() {
            "payment_intent.succeeded" => CallbackOutcome::Success {
                provider_transaction_id: intent.id,
            },
            "payment_intent.payment_failed" => CallbackOutcome::Failure {
                reason: intent
                    .last_payment_error
                    .and_then(|err| err.message)
                    .unwrap_or_else(|| "card payment failed".to_string()),
            },
            other => anyhow::bail!("unhandled card event type: {}", other),
        };

        Ok(NormalizedCallback {
            reference: CallbackReference::Reference(reference),
            outcome,
        })
    }
}
