//! Fixed-delay retry for backend fetches.
//!
//! "Still initializing" answers wait `warmup`; any other failure waits
//! `error`.  There is no backoff.  A failure that cannot improve by waiting
//! (a parse error) is returned at once.

use std::future::Future;
use std::time::Duration;

use super::client::BackendError;
use crate::config::BackendConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub warmup: Duration,
    pub error: Duration,
    pub max_attempts: u32,
}

impl From<&BackendConfig> for RetryPolicy {
    fn from(cfg: &BackendConfig) -> Self {
        Self {
            warmup: Duration::from_millis(cfg.warmup_retry_ms),
            error: Duration::from_millis(cfg.error_retry_ms),
            max_attempts: cfg.max_attempts.max(1),
        }
    }
}

impl RetryPolicy {
    /// Run `op` until it succeeds or attempts run out.
    pub async fn run<T, F, Fut>(&self, what: &'static str, mut op: F) -> Result<T, BackendError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BackendError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let delay = match op().await {
                Ok(value) => return Ok(value),
                Err(e @ BackendError::Parse(_)) => return Err(e),
                Err(BackendError::Warming) => {
                    log::info!("backend: {what} not ready, retrying in {:?}", self.warmup);
                    self.warmup
                }
                Err(e) => {
                    log::warn!("backend: {what} failed: {e}, retrying in {:?}", self.error);
                    self.error
                }
            };

            if attempt >= self.max_attempts {
                return Err(BackendError::GaveUp {
                    what,
                    attempts: attempt,
                });
            }
            tokio::time::sleep(delay).await;
        }
    }
}
