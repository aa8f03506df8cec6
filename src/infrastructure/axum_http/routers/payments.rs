use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use std::sync::Arc;

use crate::{
    domain::{
        repositories::{checkout::CheckoutRepository, transactions::TransactionRepository},
        value_objects::payments::InitiatePaymentModel,
    },
    infrastructure::axum_http::auth::AuthCustomer,
    usecases::payments::{PaymentError, PaymentUseCase},
};

pub fn routes<T, C>(payments_usecase: Arc<PaymentUseCase<T, C>>) -> Router
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    Router::new()
        .route("/initiate", post(initiate))
        .route("/:reference/status", get(payment_status))
        .with_state(payments_usecase)
}

pub async fn initiate<T, C>(
    State(payments_usecase): State<Arc<PaymentUseCase<T, C>>>,
    auth: AuthCustomer,
    Json(initiate_payment_model): Json<InitiatePaymentModel>,
) -> Result<impl IntoResponse, PaymentError>
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    let initiated = payments_usecase
        .initiate_payment(&auth.customer_identity, initiate_payment_model)
        .await?;

    Ok((StatusCode::CREATED, Json(initiated)))
}

pub async fn payment_status<T, C>(
    State(payments_usecase): State<Arc<PaymentUseCase<T, C>>>,
    auth: AuthCustomer,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, PaymentError>
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    let status = payments_usecase
        .payment_status(&reference, &auth.customer_identity)
        .await?;

    Ok(Json(status))
}
