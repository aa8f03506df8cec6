use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Closed set of supported payment methods. Adding a method means touching
/// every exhaustive match on this enum, which is intentional.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Mpesa,
    Paypal,
    Card,
}

impl PaymentMethod {
    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "mpesa" => Some(PaymentMethod::Mpesa),
            "paypal" => Some(PaymentMethod::Paypal),
            "card" => Some(PaymentMethod::Card),
            _ => None,
        }
    }
}

impl Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let method = match self {
            PaymentMethod::Mpesa => "mpesa",
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Card => "card",
        };
        write!(f, "{}", method)
    }
}
