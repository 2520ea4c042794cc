//! Fixed-interval readiness polling for freshly created instances.
//!
//! The poller re-fetches the instance on every tick and stops as soon as the
//! readiness predicate holds. Fetch failures end the wait immediately; only
//! the waiting itself is retried.

use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::info;

use crate::backend::{Backend, InstanceHandle, InstanceSnapshot};

/// Default pause between readiness checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default number of readiness checks (five minutes at the default interval).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;

/// Errors surfaced while waiting for an instance to become ready.
#[derive(Debug, Error)]
pub enum ReadinessError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the attempt budget runs out before the instance is ready.
    #[error("instance {instance_id} did not become active within {attempts} status checks")]
    Timeout {
        /// Provider instance identifier.
        instance_id: String,
        /// Number of checks performed.
        attempts: u32,
    },
    /// Raised when fetching the instance status fails.
    #[error("failed to get status of instance {instance_id}: {source}")]
    Fetch {
        /// Provider instance identifier.
        instance_id: String,
        /// Provider-specific error.
        #[source]
        source: BackendError,
    },
}

/// Polls a backend until an instance is active and has an address.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ReadinessPoller {
    poll_interval: Duration,
    max_attempts: u32,
}

impl Default for ReadinessPoller {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReadinessPoller {
    /// Creates a poller with the given interval and attempt budget.
    #[must_use]
    pub const fn new(poll_interval: Duration, max_attempts: u32) -> Self {
        Self {
            poll_interval,
            max_attempts,
        }
    }

    /// Pause between consecutive checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Maximum number of checks performed.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Waits until the instance behind `handle` is ready and returns the
    /// snapshot that satisfied the readiness predicate.
    ///
    /// Each attempt performs exactly one fetch. The poller sleeps between
    /// attempts but not after the final one, so a timeout costs
    /// `max_attempts` fetches and `max_attempts - 1` sleeps. A budget of
    /// zero times out without fetching.
    ///
    /// # Errors
    ///
    /// Returns [`ReadinessError::Fetch`] as soon as a status fetch fails and
    /// [`ReadinessError::Timeout`] when the budget is exhausted.
    pub async fn wait_until_ready<B: Backend>(
        &self,
        backend: &B,
        handle: &InstanceHandle,
    ) -> Result<InstanceSnapshot, ReadinessError<B::Error>> {
        info!(instance_id = %handle.id, "waiting for instance to become active and get an IP");

        for attempt in 1..=self.max_attempts {
            let snapshot = backend.fetch_instance(handle).await.map_err(|source| {
                ReadinessError::Fetch {
                    instance_id: handle.id.clone(),
                    source,
                }
            })?;

            if snapshot.is_ready() {
                info!(instance_id = %handle.id, attempt, "instance is active");
                return Ok(snapshot);
            }

            if attempt == self.max_attempts {
                break;
            }

            info!(
                instance_id = %handle.id,
                attempt,
                max_attempts = self.max_attempts,
                status = %snapshot.status,
                address = %snapshot.main_ip,
                "instance not ready; retrying in {}s",
                self.poll_interval.as_secs()
            );
            sleep(self.poll_interval).await;
        }

        Err(ReadinessError::Timeout {
            instance_id: handle.id.clone(),
            attempts: self.max_attempts,
        })
    }
}
