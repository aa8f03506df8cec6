use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::Utc;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use crate::domain::value_objects::callbacks::{
    CallbackOutcome, CallbackReference, NormalizedCallback, ProviderAck,
};

/// Explicit Daraja configuration; one client per configured shortcode, no
/// process-wide SDK state.
#[derive(Debug, Clone)]
pub struct MpesaConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub shortcode: String,
    pub passkey: String,
    pub base_url: String,
    pub callback_url: String,
}

/// Minimal M-Pesa (Daraja) STK push client built on reqwest.
pub struct MpesaClient {
    http: reqwest::Client,
    config: MpesaConfig,
}

#[derive(Debug, Deserialize)]
struct OauthResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    #[serde(rename = "ResponseCode")]
    response_code: Option<String>,
    #[serde(rename = "ResponseDescription")]
    response_description: Option<String>,
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StkCallbackEnvelope {
    #[serde(rename = "Body")]
    body: StkCallbackBody,
}

#[derive(Debug, Deserialize)]
struct StkCallbackBody {
    #[serde(rename = "stkCallback")]
    stk_callback: StkCallback,
}

#[derive(Debug, Deserialize)]
struct StkCallback {
    #[serde(rename = "CheckoutRequestID")]
    checkout_request_id: String,
    #[serde(rename = "ResultCode")]
    result_code: i64,
    #[serde(rename = "ResultDesc")]
    result_desc: Option<String>,
    #[serde(rename = "CallbackMetadata")]
    callback_metadata: Option<CallbackMetadata>,
}

#[derive(Debug, Deserialize)]
struct CallbackMetadata {
    #[serde(rename = "Item")]
    item: Vec<MetadataItem>,
}

#[derive(Debug, Deserialize)]
struct MetadataItem {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Value")]
    value: Option<serde_json::Value>,
}

impl MpesaClient {
    pub fn new(config: MpesaConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn access_token(&self) -> Result<String> {
        // https://developer.safaricom.co.ke/APIs/Authorization
        let auth = BASE64.encode(format!(
            "{}:{}",
            self.config.consumer_key, self.config.consumer_secret
        ));

        let resp = self
            .http
            .get(format!(
                "{}/oauth/v1/generate?grant_type=client_credentials",
                self.config.base_url
            ))
            .header(reqwest::header::AUTHORIZATION, format!("Basic {}", auth))
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            error!(status = %status, "mpesa: oauth token request failed");
            anyhow::bail!("M-Pesa token request failed with status {}", status);
        }

        let parsed: OauthResponse = resp.json().await?;
        Ok(parsed.access_token)
    }

    fn password(&self, timestamp: &str) -> String {
        BASE64.encode(format!(
            "{}{}{}",
            self.config.shortcode, self.config.passkey, timestamp
        ))
    }

    /// Sends an STK push to the customer's phone and returns the
    /// CheckoutRequestID as the correlation id for the eventual callback.
    pub async fn stk_push(
        &self,
        amount: Decimal,
        reference: &str,
        phone_number: &str,
    ) -> Result<ProviderAck> {
        let token = self.access_token().await?;
        let timestamp = Utc::now().format("%Y%m%d%H%M%S").to_string();
        let whole_amount = amount
            .ceil()
            .to_i64()
            .context("amount does not fit an STK push payload")?;

        let payload = json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": self.password(&timestamp),
            "Timestamp": timestamp,
            "TransactionType": "CustomerPayBillOnline",
            "Amount": whole_amount,
            "PartyA": phone_number,
            "PartyB": self.config.shortcode,
            "PhoneNumber": phone_number,
            "CallBackURL": self.config.callback_url,
            "AccountReference": reference,
            "TransactionDesc": "Storefront checkout",
        });

        let resp = self
            .http
            .post(format!(
                "{}/mpesa/stkpush/v1/processrequest",
                self.config.base_url
            ))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(status = %status, response_body = %body, "mpesa: stk push request failed");
            anyhow::bail!("M-Pesa STK push failed with status {}", status);
        }

        let parsed: StkPushResponse = resp.json().await?;
        if parsed.response_code.as_deref() != Some("0") {
            let description = parsed
                .response_description
                .unwrap_or_else(|| "STK push rejected".to_string());
            error!(description = %description, "mpesa: stk push rejected");
            anyhow::bail!("M-Pesa STK push rejected: {}", description);
        }

        Ok(ProviderAck {
            provider_ref: parsed.checkout_request_id,
        })
    }

    /// Parses a Daraja `stkCallback` body. The callback only echoes the
    /// CheckoutRequestID, so the transaction is correlated by provider ref.
    pub fn parse_stk_callback(raw_body: &[u8]) -> Result<NormalizedCallback> {
        let envelope: StkCallbackEnvelope =
            serde_json::from_slice(raw_body).context("malformed stkCallback body")?;
        let callback = envelope.body.stk_callback;

        let outcome = if callback.result_code == 0 {
            let receipt = callback
                .callback_metadata
                .as_ref()
                .and_then(|metadata| {
                    metadata
                        .item
                        .iter()
                        .find(|item| item.name == "MpesaReceiptNumber")
                })
                .and_then(|item| item.value.as_ref())
                .and_then(|value| value.as_str().map(|s| s.to_string()))
                .unwrap_or_else(|| callback.checkout_request_id.clone());
            CallbackOutcome::Success {
                provider_transaction_id: receipt,
            }
        } else {
            CallbackOutcome::Failure {
                reason: callback
                    .result_desc
                    .unwrap_or_else(|| format!("result code {}", callback.result_code)),
            }
        };

        Ok(NormalizedCallback {
            reference: CallbackReference::ProviderRef(callback.checkout_request_id),
            outcome,
        })
    }
}

/// Accepts the two phone shapes customers type: `07XXXXXXXX` / `01XXXXXXXX`
/// and `+254XXXXXXXXX`.
pub fn is_valid_phone_number(phone: &str) -> bool {
    let digits = if let Some(rest) = phone.strip_prefix("+254") {
        rest
    } else if let Some(rest) = phone.strip_prefix('0') {
        rest
    } else {
        return false;
    };
    digits.len() == 9 && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Normalizes a validated phone number to the `254XXXXXXXXX` form Daraja
/// expects.
pub fn normalize_phone_number(phone: &str) -> String {
    if let Some(rest) = phone.strip_prefix("+254") {
        format!("254{}", rest)
    } else if let Some(rest) = phone.strip_prefix('0') {
        format!("254{}", rest)
    } else {
        phone.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert!(is_valid_phone_number("0712345678"));
        assert!(is_valid_phone_number("+254712345678"));
        assert!(!is_valid_phone_number("254712345678"));
        assert!(!is_valid_phone_number("071234567"));
        assert!(!is_valid_phone_number("07123456789"));
        assert!(!is_valid_phone_number("07123a5678"));
        assert!(!is_valid_phone_number(""));
    }

    #[test]
    fn test_phone_normalization() {
        assert_eq!(normalize_phone_number("0712345678"), "254712345678");
        assert_eq!(normalize_phone_number("+254712345678"), "254712345678");
    }

    #[test]
    fn test_parse_successful_stk_callback() {
        let body = br#"{
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 0,
                    "ResultDesc": "The service request is processed successfully.",
                    "CallbackMetadata": {
                        "Item": [
                            {"Name": "Amount", "Value": 500.00},
                            {"Name": "MpesaReceiptNumber", "Value": "NLJ7RT61SV"},
                            {"Name": "TransactionDate", "Value": 20191219102115},
                            {"Name": "PhoneNumber", "Value": 254712345678}
                        ]
                    }
                }
            }
        }"#;

        let callback = MpesaClient::parse_stk_callback(body).unwrap();
        assert_eq!(
            callback.reference,
            CallbackReference::ProviderRef("ws_CO_191220191020363925".to_string())
        );
        assert_eq!(
            callback.outcome,
            CallbackOutcome::Success {
                provider_transaction_id: "NLJ7RT61SV".to_string()
            }
        );
    }

    #[test]
    fn test_parse_failed_stk_callback() {
        let body = br#"{
            "Body": {
                "stkCallback": {
                    "MerchantRequestID": "29115-34620561-1",
                    "CheckoutRequestID": "ws_CO_191220191020363925",
                    "ResultCode": 1032,
                    "ResultDesc": "Request cancelled by user."
                }
            }
        }"#;

        let callback = MpesaClient::parse_stk_callback(body).unwrap();
        assert_eq!(
            callback.outcome,
            CallbackOutcome::Failure {
                reason: "Request cancelled by user.".to_string()
            }
        );
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(MpesaClient::parse_stk_callback(b"not json").is_err());
        assert!(MpesaClient::parse_stk_callback(br#"{"Body":{}}"#).is_err());
    }
}
