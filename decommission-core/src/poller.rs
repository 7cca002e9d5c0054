//! Convergence polling for eventually-consistent remote state.
//!
//! The caller performs the first, synchronous check itself. `poll_until` is
//! entered only when that check did not already match and then waits one
//! interval before every subsequent check.

use crate::config::PollSettings;
use crate::error::PollError;
use std::fmt::Display;
use std::future::Future;
use tracing::debug;

/// A state that converged, and how many checks it took.
#[derive(Debug, Clone, PartialEq)]
pub struct Converged<S> {
    pub state: S,
    pub attempts: u32,
}

/// Re-runs `check` every `settings.interval` until it returns `desired`.
///
/// Stops early on the first check error. Never issues more than
/// `settings.max_attempts` checks; intermediate states are not inspected.
pub async fn poll_until<S, E, F, Fut>(
    mut check: F,
    desired: &S,
    settings: &PollSettings,
) -> Result<Converged<S>, PollError<E>>
where
    S: PartialEq + Display,
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<S, E>>,
{
    for attempt in 1..=settings.max_attempts {
        tokio::time::sleep(settings.interval).await;

        let state = check()
            .await
            .map_err(|source| PollError::Check { attempt, source })?;
        debug!(attempt, %state, %desired, "polled for desired state");

        if &state == desired {
            return Ok(Converged { state, attempts: attempt });
        }
    }

    Err(PollError::Timeout {
        desired: desired.to_string(),
        attempts: settings.max_attempts,
    })
}
