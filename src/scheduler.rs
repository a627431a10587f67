use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Polling cadence for the monitor loop.
///
/// Fixed interval by default; optional jitter can be configured to
/// prevent a fleet of devices hitting the control plane in lockstep.
pub struct PollingScheduler {
    base_interval: Duration,
    jitter_range: Duration,
}

impl PollingScheduler {
    /// Create a new polling scheduler
    ///
    /// # Arguments
    /// * `interval_secs` - Base polling interval in seconds
    /// * `jitter_secs` - Maximum jitter to add in seconds (0 = fixed)
    pub fn new(interval_secs: u64, jitter_secs: u64) -> Self {
        Self {
            base_interval: Duration::from_secs(interval_secs),
            jitter_range: Duration::from_secs(jitter_secs),
        }
    }

    /// Sleep until the next cycle is due
    pub async fn sleep_until_next_poll(&self) {
        let sleep_duration = self.next_interval();
        tracing::debug!(
            "Sleeping {} seconds until next cycle",
            sleep_duration.as_secs()
        );
        sleep(sleep_duration).await;
    }

    /// Estimate when the next cycle will run
    pub fn next_poll_time(&self) -> DateTime<Utc> {
        Utc::now()
            + chrono::Duration::from_std(self.next_interval())
                .unwrap_or_else(|_| chrono::Duration::seconds(0))
    }

    fn next_interval(&self) -> Duration {
        self.base_interval + self.random_jitter()
    }

    fn random_jitter(&self) -> Duration {
        if self.jitter_range.is_zero() {
            return Duration::ZERO;
        }
        let jitter_secs = rand::thread_rng().gen_range(0..=self.jitter_range.as_secs());
        Duration::from_secs(jitter_secs)
    }
}
