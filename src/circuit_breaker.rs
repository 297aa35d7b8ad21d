use failsafe::backoff::{self, Exponential};
use failsafe::failure_policy::{self, ConsecutiveFailures};
use failsafe::futures::CircuitBreaker;
use failsafe::{Config, StateMachine};
use std::future::Future;
use std::time::Duration;

use crate::errors::AppError;

/// Circuit breaker guarding one upstream government API.
pub type UpstreamBreaker = StateMachine<ConsecutiveFailures<Exponential>, ()>;

/// Creates a circuit breaker for an upstream API to fail fast while it is down.
///
/// # Configuration
///
/// - **Failure threshold**: 5 consecutive failures triggers OPEN state.
/// - **Backoff**: Exponential backoff from 10s to 60s before attempting recovery.
///
/// # States
///
/// - **CLOSED**: Normal operation, requests pass through.
/// - **OPEN**: Too many failures, requests fail fast with `UpstreamUnavailable`.
/// - **HALF_OPEN**: Testing if service recovered.
pub fn create_upstream_circuit_breaker() -> UpstreamBreaker {
    let backoff_strategy = backoff::exponential(
        Duration::from_secs(10), // Initial delay
        Duration::from_secs(60), // Maximum delay
    );

    let failure_policy = failure_policy::consecutive_failures(5, backoff_strategy);

    Config::new().failure_policy(failure_policy).build()
}

/// Runs an upstream call through `breaker`.
///
/// Only `ExternalApiError`s count as failures; a rejected call surfaces as
/// `AppError::UpstreamUnavailable` naming `upstream`.
pub async fn guarded<F, T>(breaker: &UpstreamBreaker, upstream: &str, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    let is_failure = |err: &AppError| matches!(err.root(), AppError::ExternalApiError(_));

    match breaker.call_with(is_failure, call).await {
        Ok(value) => Ok(value),
        Err(failsafe::Error::Inner(err)) => Err(err),
        Err(failsafe::Error::Rejected) => {
            tracing::warn!("Circuit open for {}, rejecting call", upstream);
            Err(AppError::UpstreamUnavailable(format!(
                "{} circuit breaker is open",
                upstream
            )))
        }
    }
}
