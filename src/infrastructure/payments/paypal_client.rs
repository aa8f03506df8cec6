use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::domain::value_objects::callbacks::{
    CallbackOutcome, CallbackReference, NormalizedCallback, ProviderAck,
};

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub currency: String,
}

/// Minimal PayPal Orders v2 client built on reqwest.
pub struct PaypalClient {
    http: reqwest::Client,
    config: PaypalConfig,
}

#[derive(Debug, Deserialize)]
struct OauthResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct CreateOrderResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct WebhookEvent {
    event_type: String,
    resource: WebhookResource,
}

#[derive(Debug, Deserialize)]
struct WebhookResource {
    id: Option<String>,
    custom_id: Option<String>,
    status_details: Option<StatusDetails>,
}

#[derive(Debug, Deserialize)]
struct StatusDetails {
    reason: Option<String>,
}

impl PaypalClient {
    pub fn new(config: PaypalConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn access_token(&self) -> Result<String> {
        // https://developer.paypal.com/api/rest/authentication/
        let auth = BASE64.encode(format!(
            "{}:{}",
            self.config.client_id, self.config.client_secret
        ));

        let resp = self
            .http
            .post(format!("{}/v1/oauth2/token", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            error!(status = %status, "paypal: oauth token request failed");
            anyhow::bail!("PayPal token request failed with status {}", status);
        }

        let parsed: OauthResponse = resp.json().await?;
        Ok(parsed.access_token)
    }

    /// Creates a CAPTURE-intent order carrying our reference as `custom_id`,
    /// which every capture webhook echoes back.
    pub async fn create_order(&self, amount: Decimal, reference: &str) -> Result<ProviderAck> {
        let token = self.access_token().await?;

        let payload = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "custom_id": reference,
                "amount": {
                    "currency_code": self.config.currency,
                    "value": amount.to_string(),
                }
            }]
        });

        let resp = self
            .http
            .post(format!("{}/v2/checkout/orders", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, response_body = %body, "paypal: order creation failed");
            anyhow::bail!("PayPal order creation failed with status {}", status);
        }

        let parsed: CreateOrderResponse = resp.json().await?;
        Ok(ProviderAck {
            provider_ref: Some(parsed.id),
        })
    }

    /// Parses a capture webhook. Anything other than a capture completion or
    /// denial is not an outcome this service consumes.
    pub fn parse_webhook(raw_body: &[u8]) -> Result<NormalizedCallback> {
        let event: WebhookEvent =
            serde_json::from_slice(raw_body).context("malformed PayPal webhook body")?;

        let reference = event
            .resource
            .custom_id
            .context("capture webhook missing custom_id")?;

        let outcome = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => CallbackOutcome::Success {
                provider_transaction_id: event
                    .resource
                    .id
                    .context("capture webhook missing resource id")?,
            },
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => CallbackOutcome::Failure {
                reason: event
                    .resource
                    .status_details
                    .and_then(|details| details.reason)
                    .unwrap_or_else(|| "capture denied".to_string()),
            },
            other => anyhow::bail!("unhandled PayPal event type: {}", other),
        };

        Ok(NormalizedCallback {
            reference: CallbackReference::Reference(reference),
            outcome,
        })
    }
}
