use tracing::{error, warn};

use super::outcome::GovernanceError;
use super::quota::ContentionPolicy;
use super::storage::StoreError;

/// Run a compensating step, retrying storage failures and contention up to `attempts` times.
///
/// Any other error aborts at once. Exhaustion surfaces as `StoreError::Unavailable` so the
/// caller reports an unhealthy system rather than a business outcome.
pub(crate) fn compensate<F>(
    action: &'static str,
    attempts: u32,
    policy: &ContentionPolicy,
    step: F,
) -> Result<(), GovernanceError>
where
    F: FnMut() -> Result<(), GovernanceError>,
{
    retry_transient(action, attempts, policy, step)?;
    warn!(action, "compensation applied");
    Ok(())
}

/// Retry `step` through storage failures and contention, backing off between attempts.
pub(crate) fn retry_transient<T, F>(
    action: &'static str,
    attempts: u32,
    policy: &ContentionPolicy,
    mut step: F,
) -> Result<T, GovernanceError>
where
    F: FnMut() -> Result<T, GovernanceError>,
{
    let attempts = attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match step() {
            Ok(value) => return Ok(value),
            Err(err @ (GovernanceError::Storage(_) | GovernanceError::Contention { .. })) => {
                warn!(action, attempt, error = %err, "attempt failed");
                last_error = Some(err);
            }
            Err(err) => return Err(err),
        }

        if attempt < attempts {
            let delay = policy.backoff_delay(attempt - 1);
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }

    let detail = last_error.map(|err| err.to_string()).unwrap_or_default();
    error!(action, attempts, %detail, "retries exhausted; state needs manual repair");
    Err(GovernanceError::Storage(StoreError::Unavailable(format!(
        "{action} failed after {attempts} attempts: {detail}"
    ))))
}
