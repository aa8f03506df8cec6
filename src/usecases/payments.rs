use std::{sync::Arc, time::Duration};

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric, rngs::OsRng};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::{
    domain::{
        entities::transactions::{InsertTransactionEntity, TransactionEntity},
        repositories::{
            checkout::{CheckoutOutcome, CheckoutRepository},
            transactions::{CreateResult, TransactionRepository, TransitionOutcome},
        },
        value_objects::{
            callbacks::{
                CallbackOutcome, CallbackReference, NormalizedCallback, ProviderAck,
                ReconcileResult,
            },
            enums::{
                payment_methods::PaymentMethod, transaction_statuses::TransactionStatus,
            },
            payments::{InitiatePaymentModel, InitiatedPayment, PaymentStatusModel},
        },
    },
    infrastructure::payments::{
        card_client::CardClient,
        mpesa_client::{self, MpesaClient},
        paypal_client::PaypalClient,
        signature,
    },
    usecases::rate_limit::RateLimiter,
};

/// Boundary to one payment provider: an opaque network `initiate` plus a
/// provider-specific callback parser. Parsed output is never trusted before
/// the signature check has passed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    async fn initiate<'a>(
        &self,
        amount: Decimal,
        reference: &'a str,
        phone_number: Option<&'a str>,
    ) -> AnyResult<ProviderAck>;

    fn parse_callback(&self, raw_body: &[u8]) -> AnyResult<NormalizedCallback>;
}

#[async_trait]
impl ProviderGateway for MpesaClient {
    async fn initiate<'a>(
        &self,
        amount: Decimal,
        reference: &'a str,
        phone_number: Option<&'a str>,
    ) -> AnyResult<ProviderAck> {
        let phone_number =
            phone_number.ok_or_else(|| anyhow::anyhow!("M-Pesa requires a phone number"))?;
        self.stk_push(amount, reference, phone_number).await
    }

    fn parse_callback(&self, raw_body: &[u8]) -> AnyResult<NormalizedCallback> {
        MpesaClient::parse_stk_callback(raw_body)
    }
}

#[async_trait]
impl ProviderGateway for PaypalClient {
    async fn initiate<'a>(
        &self,
        amount: Decimal,
        reference: &'a str,
        _phone_number: Option<&'a str>,
    ) -> AnyResult<ProviderAck> {
        self.create_order(amount, reference).await
    }

    fn parse_callback(&self, raw_body: &[u8]) -> AnyResult<NormalizedCallback> {
        PaypalClient::parse_webhook(raw_body)
    }
}

#[async_trait]
impl ProviderGateway for CardClient {
    async fn initiate<'a>(
        &self,
        amount: Decimal,
        reference: &'a str,
        _phone_number: Option<&'a str>,
    ) -> AnyResult<ProviderAck> {
        self.create_payment_intent(amount, reference).await
    }

    fn parse_callback(&self, raw_body: &[u8]) -> AnyResult<NormalizedCallback> {
        CardClient::parse_webhook(raw_body)
    }
}

/// One gateway per supported method, selected by exhaustive match.
pub struct ProviderGateways {
    pub mpesa: Arc<dyn ProviderGateway>,
    pub paypal: Arc<dyn ProviderGateway>,
    pub card: Arc<dyn ProviderGateway>,
}

impl ProviderGateways {
    fn for_method(&self, method: PaymentMethod) -> &dyn ProviderGateway {
        match method {
            PaymentMethod::Mpesa => self.mpesa.as_ref(),
            PaymentMethod::Paypal => self.paypal.as_ref(),
            PaymentMethod::Card => self.card.as_ref(),
        }
    }
}

/// Per-provider shared secrets for callback signature verification.
#[derive(Debug, Clone)]
pub struct CallbackSecrets {
    pub mpesa: String,
    pub paypal: String,
    pub card: String,
}

impl CallbackSecrets {
    fn for_method(&self, method: PaymentMethod) -> &str {
        match method {
            PaymentMethod::Mpesa => &self.mpesa,
            PaymentMethod::Paypal => &self.paypal,
            PaymentMethod::Card => &self.card,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PaymentPolicy {
    pub max_amount: Decimal,
    pub rate_limit_per_minute: u32,
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("callback signature verification failed")]
    UnauthorizedCallback,
    #[error("transaction not found")]
    UnknownTransaction,
    #[error("insufficient stock: {0}")]
    InsufficientStock(String),
    #[error("payment provider error: {0}")]
    Provider(String),
    #[error("too many payment attempts, try again later")]
    RateLimited,
    #[error("not allowed to view this transaction")]
    Forbidden,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl PaymentError {
    pub fn status_code(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            PaymentError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            PaymentError::UnauthorizedCallback => StatusCode::UNAUTHORIZED,
            PaymentError::UnknownTransaction => StatusCode::NOT_FOUND,
            PaymentError::InsufficientStock(_) => StatusCode::CONFLICT,
            PaymentError::Provider(_) => StatusCode::BAD_GATEWAY,
            PaymentError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            PaymentError::Forbidden => StatusCode::FORBIDDEN,
            PaymentError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PaymentError::InvalidInput(_) => "invalid_input",
            PaymentError::UnauthorizedCallback => "unauthorized_callback",
            PaymentError::UnknownTransaction => "unknown_transaction",
            PaymentError::InsufficientStock(_) => "insufficient_stock",
            PaymentError::Provider(_) => "provider_error",
            PaymentError::RateLimited => "rate_limited",
            PaymentError::Forbidden => "forbidden",
            PaymentError::Internal(_) => "internal",
        }
    }
}

pub type UseCaseResult<T> = std::result::Result<T, PaymentError>;

const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// The reconciliation engine. Owns the transaction state machine: creation,
/// dispatch to a provider, and exactly-once absorption of asynchronous
/// callbacks into terminal state plus order/inventory side effects.
pub struct PaymentUseCase<T, C>
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    transaction_repo: Arc<T>,
    checkout_repo: Arc<C>,
    gateways: ProviderGateways,
    secrets: CallbackSecrets,
    policy: PaymentPolicy,
    rate_limiter: RateLimiter,
}

impl<T, C> PaymentUseCase<T, C>
where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    pub fn new(
        transaction_repo: Arc<T>,
        checkout_repo: Arc<C>,
        gateways: ProviderGateways,
        secrets: CallbackSecrets,
        policy: PaymentPolicy,
    ) -> Self {
        let rate_limiter =
            RateLimiter::new(policy.rate_limit_per_minute, Duration::from_secs(60));
        Self {
            transaction_repo,
            checkout_repo,
            gateways,
            secrets,
            policy,
            rate_limiter,
        }
    }

    /// Creates a `pending` transaction and dispatches it to the matching
    /// provider. Adapter failure routes the transaction to `failed`; success
    /// moves it to `processing` with the provider's correlation id recorded.
    pub async fn initiate_payment(
        &self,
        customer_identity: &str,
        model: InitiatePaymentModel,
    ) -> UseCaseResult<InitiatedPayment> {
        if !self.rate_limiter.check(customer_identity) {
            warn!(
                customer_identity,
                "payments: initiation rate limit exceeded"
            );
            return Err(PaymentError::RateLimited);
        }

        if model.amount <= Decimal::ZERO {
            return Err(PaymentError::InvalidInput(
                "amount must be greater than zero".to_string(),
            ));
        }
        if model.amount > self.policy.max_amount {
            return Err(PaymentError::InvalidInput(format!(
                "amount exceeds the maximum of {}",
                self.policy.max_amount
            )));
        }

        let phone_number = match model.payment_method {
            PaymentMethod::Mpesa => {
                let phone = model.phone_number.as_deref().ok_or_else(|| {
                    PaymentError::InvalidInput("phone number is required for mpesa".to_string())
                })?;
                if !mpesa_client::is_valid_phone_number(phone) {
                    return Err(PaymentError::InvalidInput(
                        "invalid phone number".to_string(),
                    ));
                }
                Some(mpesa_client::normalize_phone_number(phone))
            }
            PaymentMethod::Paypal | PaymentMethod::Card => None,
        };

        let transaction = self
            .create_with_fresh_reference(customer_identity, &model)
            .await?;
        info!(
            reference = %transaction.reference,
            payment_method = %model.payment_method,
            amount = %model.amount,
            "payments: transaction created"
        );

        self.dispatch(transaction, model.payment_method, phone_number.as_deref())
            .await
    }

    async fn create_with_fresh_reference(
        &self,
        customer_identity: &str,
        model: &InitiatePaymentModel,
    ) -> UseCaseResult<TransactionEntity> {
        // The reference space is large enough that collisions are negligible,
        // but the uniqueness constraint is authoritative: regenerate on
        // conflict rather than trusting the odds.
        for _ in 0..MAX_REFERENCE_ATTEMPTS {
            let entity = InsertTransactionEntity {
                reference: generate_reference(),
                payment_method: model.payment_method.to_string(),
                amount: model.amount,
                status: TransactionStatus::Pending.to_string(),
                customer_identity: customer_identity.to_string(),
            };
            match self.transaction_repo.create(entity).await? {
                CreateResult::Created(transaction) => return Ok(transaction),
                CreateResult::DuplicateReference => continue,
            }
        }
        Err(PaymentError::Internal(anyhow::anyhow!(
            "could not generate a unique payment reference"
        )))
    }

    async fn dispatch(
        &self,
        transaction: TransactionEntity,
        method: PaymentMethod,
        phone_number: Option<&str>,
    ) -> UseCaseResult<InitiatedPayment> {
        let gateway = self.gateways.for_method(method);
        let ack = match gateway
            .initiate(transaction.amount, &transaction.reference, phone_number)
            .await
        {
            Ok(ack) => ack,
            Err(err) => {
                error!(
                    reference = %transaction.reference,
                    payment_method = %method,
                    error = %err,
                    "payments: provider initiation failed"
                );
                self.transaction_repo
                    .fail_transaction(&transaction.reference, &err.to_string())
                    .await?;
                return Err(PaymentError::Provider(err.to_string()));
            }
        };

        let transaction = match self
            .transaction_repo
            .mark_processing(&transaction.reference, ack.provider_ref.as_deref())
            .await?
        {
            TransitionOutcome::Applied(transaction) => {
                info!(
                    reference = %transaction.reference,
                    provider_ref = ?ack.provider_ref,
                    "payments: transaction dispatched, awaiting callback"
                );
                transaction
            }
            TransitionOutcome::AlreadyTerminal(transaction) => {
                // The callback beat the dispatch bookkeeping; the stored
                // outcome stands.
                info!(
                    reference = %transaction.reference,
                    status = %transaction.status,
                    "payments: callback resolved transaction before dispatch recorded"
                );
                transaction
            }
            TransitionOutcome::NotFound => {
                return Err(PaymentError::Internal(anyhow::anyhow!(
                    "transaction vanished during dispatch"
                )));
            }
        };

        Ok(InitiatedPayment {
            reference: transaction.reference,
            provider_correlation_id: ack.provider_ref,
        })
    }

    /// Absorbs one provider callback. Duplicates and out-of-order deliveries
    /// are expected: the first callback to win the terminal transition is
    /// authoritative, everything later is answered with the stored outcome.
    pub async fn reconcile(
        &self,
        provider: PaymentMethod,
        raw_body: &[u8],
        signature_header: &str,
    ) -> UseCaseResult<ReconcileResult> {
        let secret = self.secrets.for_method(provider);
        if !signature::verify(secret.as_bytes(), raw_body, signature_header) {
            // Security event. No state change and no hint of whether the
            // referenced transaction exists.
            warn!(
                provider = %provider,
                "payments: callback signature verification failed"
            );
            return Err(PaymentError::UnauthorizedCallback);
        }

        let callback = self
            .gateways
            .for_method(provider)
            .parse_callback(raw_body)
            .map_err(|err| {
                warn!(provider = %provider, error = %err, "payments: unparseable callback");
                PaymentError::InvalidInput(format!("unparseable callback: {err}"))
            })?;

        let transaction = match &callback.reference {
            CallbackReference::Reference(reference) => {
                self.transaction_repo.find_by_reference(reference).await?
            }
            CallbackReference::ProviderRef(provider_ref) => {
                self.transaction_repo
                    .find_by_provider_ref(provider_ref)
                    .await?
            }
        };
        let Some(transaction) = transaction else {
            // Replays against purged rows and foreign callbacks are benign.
            info!(provider = %provider, "payments: callback for unknown transaction");
            return Err(PaymentError::UnknownTransaction);
        };

        if transaction.is_terminal() {
            info!(
                reference = %transaction.reference,
                status = %transaction.status,
                "payments: duplicate callback absorbed, returning stored outcome"
            );
            return Ok(ReconcileResult::replayed(&transaction));
        }

        match callback.outcome {
            CallbackOutcome::Success {
                provider_transaction_id,
            } => {
                self.apply_success(&transaction, &provider_transaction_id)
                    .await
            }
            CallbackOutcome::Failure { reason } => self.apply_failure(&transaction, &reason).await,
        }
    }

    async fn apply_success(
        &self,
        transaction: &TransactionEntity,
        provider_transaction_id: &str,
    ) -> UseCaseResult<ReconcileResult> {
        let outcome = self
            .checkout_repo
            .complete_checkout(&transaction.reference, provider_transaction_id)
            .await?;

        match outcome {
            CheckoutOutcome::Completed { transaction, order } => {
                info!(
                    reference = %transaction.reference,
                    order_id = order.id,
                    total_amount = %order.total_amount,
                    "payments: transaction completed, order materialized"
                );
                Ok(ReconcileResult::applied(&transaction))
            }
            CheckoutOutcome::OutOfStock {
                transaction,
                detail,
            } => {
                warn!(
                    reference = %transaction.reference,
                    detail = %detail,
                    "payments: completion failed on stock, transaction routed to failed"
                );
                Err(PaymentError::InsufficientStock(detail))
            }
            CheckoutOutcome::AlreadyTerminal { transaction } => {
                info!(
                    reference = %transaction.reference,
                    status = %transaction.status,
                    "payments: lost completion race, returning stored outcome"
                );
                Ok(ReconcileResult::replayed(&transaction))
            }
            CheckoutOutcome::NotFound => Err(PaymentError::UnknownTransaction),
        }
    }

    async fn apply_failure(
        &self,
        transaction: &TransactionEntity,
        reason: &str,
    ) -> UseCaseResult<ReconcileResult> {
        match self
            .transaction_repo
            .fail_transaction(&transaction.reference, reason)
            .await?
        {
            TransitionOutcome::Applied(transaction) => {
                info!(
                    reference = %transaction.reference,
                    reason = %reason,
                    "payments: transaction failed by provider callback"
                );
                Ok(ReconcileResult::applied(&transaction))
            }
            TransitionOutcome::AlreadyTerminal(transaction) => {
                Ok(ReconcileResult::replayed(&transaction))
            }
            TransitionOutcome::NotFound => Err(PaymentError::UnknownTransaction),
        }
    }

    /// Status query, restricted to the transaction's own customer.
    pub async fn payment_status(
        &self,
        reference: &str,
        caller_identity: &str,
    ) -> UseCaseResult<PaymentStatusModel> {
        let transaction = self
            .transaction_repo
            .find_by_reference(reference)
            .await?
            .ok_or(PaymentError::UnknownTransaction)?;

        if transaction.customer_identity != caller_identity {
            warn!(
                reference = %reference,
                caller_identity,
                "payments: status query by non-owner rejected"
            );
            return Err(PaymentError::Forbidden);
        }

        let status = PaymentStatusModel::try_from(transaction)?;
        Ok(status)
    }

    /// Fails transactions stuck in `pending`/`processing` longer than the
    /// configured payment window. Invoked by the background reaper.
    pub async fn expire_stale(&self, older_than: chrono::Duration) -> UseCaseResult<usize> {
        let cutoff = Utc::now() - older_than;
        let expired = self
            .transaction_repo
            .fail_stale(cutoff, "payment window expired")
            .await?;
        if !expired.is_empty() {
            info!(
                expired_count = expired.len(),
                "payments: expired stale transactions"
            );
        }
        Ok(expired.len())
    }
}

fn generate_reference() -> String {
    let token: String = OsRng
        .sample_iter(&Alphanumeric)
        .take(20)
        .map(char::from)
        .collect();
    format!("REF-{}", token.to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::{
        checkout::MockCheckoutRepository, transactions::MockTransactionRepository,
    };
    use mockall::predicate::eq;
    use rust_decimal_macros::dec;

    fn sample_transaction(status: TransactionStatus) -> TransactionEntity {
        TransactionEntity {
            id: 1,
            reference: "REF-TEST1234567890ABCDE".to_string(),
            payment_method: "mpesa".to_string(),
            amount: dec!(500.00),
            status: status.to_string(),
            customer_identity: "254712345678".to_string(),
            provider_ref: Some("ws_CO_191220191020363925".to_string()),
            provider_transaction_id: None,
            failure_reason: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn mpesa_success_body() -> Vec<u8> {
        br#"{"Body":{"stkCallback":{"CheckoutRequestID":"ws_CO_191220191020363925","ResultCode":0,"ResultDesc":"ok","CallbackMetadata":{"Item":[{"Name":"MpesaReceiptNumber","Value":"NLJ7RT61SV"}]}}}}"#
            .to_vec()
    }

    fn mpesa_failure_body() -> Vec<u8> {
        br#"{"Body":{"stkCallback":{"CheckoutRequestID":"ws_CO_191220191020363925","ResultCode":1032,"ResultDesc":"Request cancelled by user."}}}"#
            .to_vec()
    }

    fn test_policy() -> PaymentPolicy {
        PaymentPolicy {
            max_amount: dec!(150000.00),
            rate_limit_per_minute: 0,
        }
    }

    fn test_secrets() -> CallbackSecrets {
        CallbackSecrets {
            mpesa: "mpesa-secret".to_string(),
            paypal: "paypal-secret".to_string(),
            card: "card-secret".to_string(),
        }
    }

    fn build_usecase(
        transaction_repo: MockTransactionRepository,
        checkout_repo: MockCheckoutRepository,
        mpesa: MockProviderGateway,
        policy: PaymentPolicy,
    ) -> PaymentUseCase<MockTransactionRepository, MockCheckoutRepository> {
        let gateways = ProviderGateways {
            mpesa: Arc::new(mpesa),
            paypal: Arc::new(MockProviderGateway::new()),
            card: Arc::new(MockProviderGateway::new()),
        };
        PaymentUseCase::new(
            Arc::new(transaction_repo),
            Arc::new(checkout_repo),
            gateways,
            test_secrets(),
            policy,
        )
    }

    fn initiate_model(amount: Decimal) -> InitiatePaymentModel {
        InitiatePaymentModel {
            payment_method: PaymentMethod::Mpesa,
            amount,
            phone_number: Some("0712345678".to_string()),
        }
    }

    #[tokio::test]
    async fn test_initiate_rejects_non_positive_amount() {
        let usecase = build_usecase(
            MockTransactionRepository::new(),
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let result = usecase
            .initiate_payment("254712345678", initiate_model(dec!(0)))
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidInput(_))));

        let result = usecase
            .initiate_payment("254712345678", initiate_model(dec!(-5.00)))
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_initiate_rejects_amount_over_maximum() {
        let usecase = build_usecase(
            MockTransactionRepository::new(),
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let result = usecase
            .initiate_payment("254712345678", initiate_model(dec!(150000.01)))
            .await;
        assert!(matches!(result, Err(PaymentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_initiate_rejects_invalid_mpesa_phone() {
        let usecase = build_usecase(
            MockTransactionRepository::new(),
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let mut model = initiate_model(dec!(500.00));
        model.phone_number = Some("12345".to_string());
        let result = usecase.initiate_payment("254712345678", model).await;
        assert!(matches!(result, Err(PaymentError::InvalidInput(_))));

        let mut model = initiate_model(dec!(500.00));
        model.phone_number = None;
        let result = usecase.initiate_payment("254712345678", model).await;
        assert!(matches!(result, Err(PaymentError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_initiate_dispatches_and_marks_processing() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_create().returning(|entity| {
            assert!(entity.reference.starts_with("REF-"));
            assert_eq!(entity.status, "pending");
            let mut transaction = sample_transaction(TransactionStatus::Pending);
            transaction.reference = entity.reference;
            transaction.provider_ref = None;
            Ok(CreateResult::Created(transaction))
        });
        transaction_repo
            .expect_mark_processing()
            .withf(|_, provider_ref| *provider_ref == Some("ws_CO_191220191020363925"))
            .returning(|reference, provider_ref| {
                let mut transaction = sample_transaction(TransactionStatus::Processing);
                transaction.reference = reference.to_string();
                transaction.provider_ref = provider_ref.map(|value| value.to_string());
                Ok(TransitionOutcome::Applied(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_initiate()
            .withf(|amount, reference, phone| {
                *amount == dec!(500.00)
                    && reference.starts_with("REF-")
                    && *phone == Some("254712345678")
            })
            .returning(|_, _, _| {
                Ok(ProviderAck {
                    provider_ref: Some("ws_CO_191220191020363925".to_string()),
                })
            });

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let initiated = usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await
            .unwrap();
        assert!(initiated.reference.starts_with("REF-"));
        assert_eq!(
            initiated.provider_correlation_id.as_deref(),
            Some("ws_CO_191220191020363925")
        );
    }

    #[tokio::test]
    async fn test_initiate_retries_on_duplicate_reference() {
        let mut transaction_repo = MockTransactionRepository::new();
        let mut attempts = 0;
        transaction_repo.expect_create().times(2).returning(move |entity| {
            attempts += 1;
            if attempts == 1 {
                Ok(CreateResult::DuplicateReference)
            } else {
                let mut transaction = sample_transaction(TransactionStatus::Pending);
                transaction.reference = entity.reference;
                Ok(CreateResult::Created(transaction))
            }
        });
        transaction_repo
            .expect_mark_processing()
            .returning(|reference, _| {
                let mut transaction = sample_transaction(TransactionStatus::Processing);
                transaction.reference = reference.to_string();
                Ok(TransitionOutcome::Applied(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_initiate()
            .returning(|_, _, _| Ok(ProviderAck { provider_ref: None }));

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let initiated = usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await
            .unwrap();
        assert!(initiated.provider_correlation_id.is_none());
    }

    #[tokio::test]
    async fn test_initiate_tolerates_callback_winning_dispatch_race() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_create().returning(|entity| {
            let mut transaction = sample_transaction(TransactionStatus::Pending);
            transaction.reference = entity.reference;
            Ok(CreateResult::Created(transaction))
        });
        // The callback landed between the provider ack and the bookkeeping:
        // the terminal state must stand, and initiation still succeeds.
        transaction_repo
            .expect_mark_processing()
            .returning(|reference, _| {
                let mut transaction = sample_transaction(TransactionStatus::Completed);
                transaction.reference = reference.to_string();
                Ok(TransitionOutcome::AlreadyTerminal(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa.expect_initiate().returning(|_, _, _| {
            Ok(ProviderAck {
                provider_ref: Some("ws_CO_191220191020363925".to_string()),
            })
        });

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let initiated = usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await
            .unwrap();
        assert!(initiated.reference.starts_with("REF-"));
    }

    #[tokio::test]
    async fn test_initiate_provider_failure_routes_to_failed() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_create().returning(|entity| {
            let mut transaction = sample_transaction(TransactionStatus::Pending);
            transaction.reference = entity.reference;
            Ok(CreateResult::Created(transaction))
        });
        transaction_repo
            .expect_fail_transaction()
            .times(1)
            .returning(|reference, reason| {
                let mut transaction = sample_transaction(TransactionStatus::Failed);
                transaction.reference = reference.to_string();
                transaction.failure_reason = Some(reason.to_string());
                Ok(TransitionOutcome::Applied(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_initiate()
            .returning(|_, _, _| Err(anyhow::anyhow!("M-Pesa STK push rejected: insufficient float")));

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let result = usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await;
        match result {
            Err(PaymentError::Provider(message)) => {
                assert!(message.contains("insufficient float"));
            }
            other => panic!("expected provider error, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_initiate_rate_limited() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_create().times(1).returning(|entity| {
            let mut transaction = sample_transaction(TransactionStatus::Pending);
            transaction.reference = entity.reference;
            Ok(CreateResult::Created(transaction))
        });
        transaction_repo
            .expect_mark_processing()
            .returning(|reference, _| {
                let mut transaction = sample_transaction(TransactionStatus::Processing);
                transaction.reference = reference.to_string();
                Ok(TransitionOutcome::Applied(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_initiate()
            .returning(|_, _, _| Ok(ProviderAck { provider_ref: None }));

        let policy = PaymentPolicy {
            max_amount: dec!(150000.00),
            rate_limit_per_minute: 1,
        };
        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            policy,
        );

        usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await
            .unwrap();
        let second = usecase
            .initiate_payment("254712345678", initiate_model(dec!(500.00)))
            .await;
        assert!(matches!(second, Err(PaymentError::RateLimited)));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_invalid_signature_without_lookup() {
        // No expectations on either repository: any lookup would panic.
        let usecase = build_usecase(
            MockTransactionRepository::new(),
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let body = mpesa_success_body();
        let tampered = signature::sign(b"wrong-secret", &body);
        let result = usecase
            .reconcile(PaymentMethod::Mpesa, &body, &tampered)
            .await;
        assert!(matches!(result, Err(PaymentError::UnauthorizedCallback)));
    }

    #[tokio::test]
    async fn test_reconcile_rejects_tampered_body() {
        let usecase = build_usecase(
            MockTransactionRepository::new(),
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let valid_signature = signature::sign(b"mpesa-secret", &mpesa_success_body());
        let result = usecase
            .reconcile(
                PaymentMethod::Mpesa,
                &mpesa_failure_body(),
                &valid_signature,
            )
            .await;
        assert!(matches!(result, Err(PaymentError::UnauthorizedCallback)));
    }

    #[tokio::test]
    async fn test_reconcile_unknown_transaction_is_a_noop() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_find_by_provider_ref()
            .with(eq("ws_CO_191220191020363925"))
            .returning(|_| Ok(None));

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_parse_callback()
            .returning(|raw| MpesaClient::parse_stk_callback(raw));

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let body = mpesa_success_body();
        let sig = signature::sign(b"mpesa-secret", &body);
        let result = usecase.reconcile(PaymentMethod::Mpesa, &body, &sig).await;
        assert!(matches!(result, Err(PaymentError::UnknownTransaction)));
    }

    #[tokio::test]
    async fn test_reconcile_success_completes_and_materializes() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_find_by_provider_ref()
            .returning(|_| Ok(Some(sample_transaction(TransactionStatus::Processing))));

        let mut checkout_repo = MockCheckoutRepository::new();
        checkout_repo
            .expect_complete_checkout()
            .with(eq("REF-TEST1234567890ABCDE"), eq("NLJ7RT61SV"))
            .times(1)
            .returning(|reference, provider_transaction_id| {
                let mut transaction = sample_transaction(TransactionStatus::Completed);
                transaction.reference = reference.to_string();
                transaction.provider_transaction_id =
                    Some(provider_transaction_id.to_string());
                let order = crate::domain::entities::orders::OrderEntity {
                    id: 7,
                    reference: reference.to_string(),
                    customer_identity: "254712345678".to_string(),
                    total_amount: dec!(500.00),
                    created_at: Utc::now(),
                };
                Ok(CheckoutOutcome::Completed { transaction, order })
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_parse_callback()
            .returning(|raw| MpesaClient::parse_stk_callback(raw));

        let usecase = build_usecase(transaction_repo, checkout_repo, mpesa, test_policy());

        let body = mpesa_success_body();
        let sig = signature::sign(b"mpesa-secret", &body);
        let result = usecase
            .reconcile(PaymentMethod::Mpesa, &body, &sig)
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Completed);
        assert_eq!(result.provider_transaction_id.as_deref(), Some("NLJ7RT61SV"));
        assert!(!result.replayed);
    }

    #[tokio::test]
    async fn test_reconcile_terminal_transaction_replays_stored_outcome() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_find_by_provider_ref().returning(|_| {
            let mut transaction = sample_transaction(TransactionStatus::Completed);
            transaction.provider_transaction_id = Some("NLJ7RT61SV".to_string());
            Ok(Some(transaction))
        });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_parse_callback()
            .returning(|raw| MpesaClient::parse_stk_callback(raw));

        // No complete_checkout expectation: a second materialization would panic.
        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let body = mpesa_success_body();
        let sig = signature::sign(b"mpesa-secret", &body);
        let result = usecase
            .reconcile(PaymentMethod::Mpesa, &body, &sig)
            .await
            .unwrap();
        assert!(result.replayed);
        assert_eq!(result.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_reconcile_failure_callback_fails_transaction() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_find_by_provider_ref()
            .returning(|_| Ok(Some(sample_transaction(TransactionStatus::Processing))));
        transaction_repo
            .expect_fail_transaction()
            .with(eq("REF-TEST1234567890ABCDE"), eq("Request cancelled by user."))
            .times(1)
            .returning(|reference, reason| {
                let mut transaction = sample_transaction(TransactionStatus::Failed);
                transaction.reference = reference.to_string();
                transaction.failure_reason = Some(reason.to_string());
                Ok(TransitionOutcome::Applied(transaction))
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_parse_callback()
            .returning(|raw| MpesaClient::parse_stk_callback(raw));

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            mpesa,
            test_policy(),
        );

        let body = mpesa_failure_body();
        let sig = signature::sign(b"mpesa-secret", &body);
        let result = usecase
            .reconcile(PaymentMethod::Mpesa, &body, &sig)
            .await
            .unwrap();
        assert_eq!(result.status, TransactionStatus::Failed);
        assert!(!result.replayed);
    }

    #[tokio::test]
    async fn test_reconcile_out_of_stock_surfaces_conflict() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_find_by_provider_ref()
            .returning(|_| Ok(Some(sample_transaction(TransactionStatus::Processing))));

        let mut checkout_repo = MockCheckoutRepository::new();
        checkout_repo
            .expect_complete_checkout()
            .returning(|reference, _| {
                let mut transaction = sample_transaction(TransactionStatus::Failed);
                transaction.reference = reference.to_string();
                Ok(CheckoutOutcome::OutOfStock {
                    transaction,
                    detail: "insufficient stock for product 'widget'".to_string(),
                })
            });

        let mut mpesa = MockProviderGateway::new();
        mpesa
            .expect_parse_callback()
            .returning(|raw| MpesaClient::parse_stk_callback(raw));

        let usecase = build_usecase(transaction_repo, checkout_repo, mpesa, test_policy());

        let body = mpesa_success_body();
        let sig = signature::sign(b"mpesa-secret", &body);
        let result = usecase.reconcile(PaymentMethod::Mpesa, &body, &sig).await;
        assert!(matches!(result, Err(PaymentError::InsufficientStock(_))));
    }

    #[tokio::test]
    async fn test_payment_status_enforces_ownership() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo
            .expect_find_by_reference()
            .returning(|_| Ok(Some(sample_transaction(TransactionStatus::Processing))));

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let result = usecase
            .payment_status("REF-TEST1234567890ABCDE", "attacker@example.com")
            .await;
        assert!(matches!(result, Err(PaymentError::Forbidden)));

        let status = usecase
            .payment_status("REF-TEST1234567890ABCDE", "254712345678")
            .await
            .unwrap();
        assert_eq!(status.status, TransactionStatus::Processing);
        assert_eq!(status.amount, dec!(500.00));
    }

    #[tokio::test]
    async fn test_payment_status_surfaces_corrupted_method_as_internal() {
        let mut transaction_repo = MockTransactionRepository::new();
        transaction_repo.expect_find_by_reference().returning(|_| {
            let mut transaction = sample_transaction(TransactionStatus::Completed);
            transaction.payment_method = "giftcard".to_string();
            Ok(Some(transaction))
        });

        let usecase = build_usecase(
            transaction_repo,
            MockCheckoutRepository::new(),
            MockProviderGateway::new(),
            test_policy(),
        );

        let result = usecase
            .payment_status("REF-TEST1234567890ABCDE", "254712345678")
            .await;
        assert!(matches!(result, Err(PaymentError::Internal(_))));
    }

    #[test]
    fn test_generated_references_are_unique_and_prefixed() {
        let a = generate_reference();
        let b = generate_reference();
        assert!(a.starts_with("REF-"));
        assert_eq!(a.len(), 24);
        assert_ne!(a, b);
    }
}
