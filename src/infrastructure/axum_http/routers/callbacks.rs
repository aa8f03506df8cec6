use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    response::IntoResponse,
    routing::post,
};
use std::sync::Arc;

use crate::{
    domain::{
        repositories::{checkout::CheckoutRepository, transactions::TransactionRepository},
        value_objects::enums::payment_methods::PaymentMethod,
    },
    usecases::payments::{PaymentError, PaymentUseCase},
};

/// Hex-encoded HMAC-SHA256 of the raw request body, keyed with the
/// per-provider shared secret.
pub const CALLBACK_SIGNATURE_HEADER: &str = "x-callback-signature";

pub fn routes<T, C>(payments_usecase: Arc<PaymentUseCase<T, C>>) -> Router
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/:provider", post(handle_callback))
        .with_state(payments_usecase)
}

/// Unauthenticated by design: providers call this, not customers. Trust is
/// established solely by the signature over the raw body, which is why the
/// body is taken as `Bytes` and never re-serialized before verification.
pub async fn handle_callback<T, C>(
    State(payments_usecase): State<Arc<PaymentUseCase<T, C>>>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, PaymentError>
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    let provider = PaymentMethod::from_str(&provider).ok_or_else(|| {
        PaymentError::InvalidInput(format!("unknown payment provider: {}", provider))
    })?;

    let signature = headers
        .get(CALLBACK_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(PaymentError::UnauthorizedCallback)?;

    let result = payments_usecase
        .reconcile(provider, &body, signature)
        .await?;

    Ok(Json(result))
}
