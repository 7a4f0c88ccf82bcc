//! Exponential backoff with jitter, for callers retrying transient failures.
//!
//! delay(attempt) = round(min(max, base * 2^attempt) * (1 + (2r - 1) * jitter))
//! with r uniform in [0, 1). Caches and decoders never retry on their own.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    jitter: f64,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(400), Duration::from_millis(8000), 0.4)
    }
}

impl Backoff {
    /// `jitter` is clamped to [0, 1]; `max` is raised to at least `base`.
    pub fn new(base: Duration, max: Duration, jitter: f64) -> Self {
        let jitter = if jitter.is_finite() { jitter.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            base,
            max: max.max(base),
            jitter,
        }
    }

    /// Delay before retry number `attempt` (0-based) for a given draw `r`.
    pub fn next_delay_with(&self, attempt: u32, r: f64) -> Duration {
        let base = self.base.as_millis() as f64;
        let max = self.max.as_millis() as f64;
        let raw = (base * 2f64.powi(attempt.min(64) as i32)).min(max);
        let spread = (2.0 * r.clamp(0.0, 1.0) - 1.0) * self.jitter;
        let delay = (raw * (1.0 + spread)).round().max(0.0);
        Duration::from_millis(delay as u64)
    }

    pub fn next_delay(&self, attempt: u32) -> Duration {
        self.next_delay_with(attempt, rand::random::<f64>())
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or has
    /// been tried `max_attempts` times. `op` receives the 0-based attempt.
    pub async fn retry<T, E, F, Fut>(
        &self,
        mut op: F,
        max_attempts: u32,
        is_retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut attempt = 0;
        loop {
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt + 1 < max_attempts && is_retryable(&e) => {
                    let delay = self.next_delay(attempt);
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure; backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ms(d: Duration) -> u64 {
        d.as_millis() as u64
    }

    #[test]
    fn attempt_zero_bounds() {
        let b = Backoff::default();
        assert_eq!(ms(b.next_delay_with(0, 0.5)), 400);
        assert_eq!(ms(b.next_delay_with(0, 0.0)), 240);
        assert_eq!(ms(b.next_delay_with(0, 1.0)), 560);
    }

    #[test]
    fn doubles_then_saturates() {
        let b = Backoff::default();
        let delays: Vec<u64> = (0..8).map(|a| ms(b.next_delay_with(a, 0.5))).collect();
        assert_eq!(delays, vec![400, 800, 1600, 3200, 6400, 8000, 8000, 8000]);
        assert_eq!(ms(b.next_delay_with(1_000, 0.0)), 4800);
        assert_eq!(ms(b.next_delay_with(1_000, 1.0)), 11200);
    }

    #[test]
    fn random_draws_stay_in_band() {
        let b = Backoff::default();
        for _ in 0..200 {
            let d = ms(b.next_delay(0));
            assert!((240..=560).contains(&d), "{d}");
        }
    }

    #[tokio::test]
    async fn retry_stops_on_success() {
        let b = Backoff::new(Duration::from_millis(1), Duration::from_millis(2), 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<u32, String> = b
            .retry(
                |attempt| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if attempt < 2 {
                            Err("flaky".to_string())
                        } else {
                            Ok(attempt)
                        }
                    }
                },
                5,
                |_| true,
            )
            .await;
        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let b = Backoff::new(Duration::from_millis(1), Duration::from_millis(1), 0.0);
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = b
            .retry(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("down".to_string()) }
                },
                3,
                |_| true,
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_permanent_errors() {
        let b = Backoff::default();
        let calls = AtomicU32::new(0);
        let result: Result<(), String> = b
            .retry(
                |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err("bundle_http_404".to_string()) }
                },
                4,
                |e| !e.ends_with("404"),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
