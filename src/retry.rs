use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Bounded-retry policy with exponential backoff, invoked explicitly at
/// the call sites that talk to the network (upload, download). Transient
/// errors never escape this layer until the attempt ceiling is reached.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 1.5,
        }
    }
}

impl RetryPolicy {
    /// Runs `op`, retrying failures that match `is_retryable` with backoff.
    /// Non-matching errors propagate immediately; the last error is
    /// re-raised once the ceiling is exhausted. Generic over the error type
    /// so both anyhow call sites and typed service errors can gate on their
    /// own transience predicate.
    pub async fn run<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        mut op: F,
    ) -> Result<T, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt: u32 = 0;
        let mut delay = self.initial_delay_ms;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(err),
                Err(err) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        debug!("retry ceiling exhausted for {}", label);
                        return Err(err);
                    }
                    warn!(
                        "transient error in {}: {}, retrying ({}/{}) after {}ms",
                        label, err, attempt, self.max_retries, delay
                    );
                    sleep(Duration::from_millis(delay)).await;
                    delay = std::cmp::min(
                        (delay as f64 * self.backoff_multiplier) as u64,
                        self.max_delay_ms,
                    );
                }
            }
        }
    }

    /// Like [`run`](Self::run), but an exhausted ceiling resolves to
    /// `Ok(None)` instead of re-raising. Non-matching errors still
    /// propagate immediately.
    pub async fn run_swallowing<T, E, F, Fut>(
        &self,
        label: &str,
        is_retryable: impl Fn(&E) -> bool,
        op: F,
    ) -> Result<Option<T>, E>
    where
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.run(label, &is_retryable, op).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_retryable(&err) => {
                warn!("{} gave up after {} retries: {}", label, self.max_retries, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

/// Predicate for errors worth retrying: timeouts, connection resets and
/// 5xx/429-style service hiccups. Matching is textual because the errors
/// funnel through anyhow from several client crates.
pub fn is_transient(err: &anyhow::Error) -> bool {
    if let Some(req_err) = err.downcast_ref::<reqwest::Error>() {
        if req_err.is_timeout() || req_err.is_connect() {
            return true;
        }
        if let Some(status) = req_err.status() {
            return status.is_server_error() || status.as_u16() == 429;
        }
        return false;
    }
    let text = format!("{:#}", err).to_ascii_lowercase();
    text.contains("timeout")
        || text.contains("timed out")
        || text.contains("connection reset")
        || text.contains("rate limit")
        || text.contains("too many requests")
        || text.contains("service unavailable")
        || text.contains("dispatch failure")
}
