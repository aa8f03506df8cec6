use std::{sync::Arc, time::Duration};

use tracing::{error, info};

use crate::{
    domain::repositories::{checkout::CheckoutRepository, transactions::TransactionRepository},
    usecases::payments::PaymentUseCase,
};

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Background sweep that fails transactions stuck past the payment window.
/// Providers occasionally drop callbacks; without this, abandoned STK pushes
/// would sit in `processing` forever.
pub async fn run_reaper_loop<T, C>(
    usecase: Arc<PaymentUseCase<T, C>>,
    pending_timeout: chrono::Duration,
) where
    T: TransactionRepository + Send + Sync + 'static,
    C: CheckoutRepository + Send + Sync + 'static,
{
    info!(
        pending_timeout_minutes = pending_timeout.num_minutes(),
        "reaper: started"
    );

    let mut interval = tokio::time::interval(SWEEP_INTERVAL);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        interval.tick().await;
        match usecase.expire_stale(pending_timeout).await {
            Ok(0) => {}
            Ok(expired) => info!(expired, "reaper: swept stale transactions"),
            Err(err) => error!(error = %err, "reaper: sweep failed"),
        }
    }
}
