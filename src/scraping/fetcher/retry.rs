//! Retry with exponential backoff
//!
//! Delay before retry `i` (0-based) is `max(server delay, base * 2^i)` plus
//! uniform jitter in `[0, max_jitter)`. A server-provided delay always wins
//! over the exponential floor.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;
use url::Url;

use super::FetchError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts in total, including the first
    pub max_attempts: u32,
    pub backoff_base_secs: f64,
    pub max_jitter_secs: f64,
    /// Upper bound on an honoured `Retry-After`
    pub max_server_delay_secs: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base_secs: 1.0,
            max_jitter_secs: 1.0,
            max_server_delay_secs: 120,
        }
    }
}

impl RetryPolicy {
    /// `jitter_unit` is a sample from `[0, 1)`
    pub fn delay_for(&self, attempt: u32, server_delay: Option<Duration>, jitter_unit: f64) -> Duration {
        let exponential = self.backoff_base_secs * 2f64.powi(attempt.min(30) as i32);
        let server = server_delay
            .map(|d| d.min(Duration::from_secs(self.max_server_delay_secs)).as_secs_f64())
            .unwrap_or(0.0);
        let jitter = jitter_unit.clamp(0.0, 1.0) * self.max_jitter_secs;
        Duration::from_secs_f64(exponential.max(server) + jitter)
    }

    pub fn is_retryable_status(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

/// Parse a `Retry-After` value: delta seconds or an HTTP date
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let when = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = when.with_timezone(&chrono::Utc) - chrono::Utc::now();
    Some(delta.to_std().unwrap_or(Duration::ZERO))
}

/// How a single attempt failed
#[derive(Debug)]
pub enum AttemptError {
    Retry {
        error: FetchError,
        server_delay: Option<Duration>,
    },
    Fatal(FetchError),
}

fn jitter_sample() -> f64 {
    rand::thread_rng().gen::<f64>()
}

/// Run `op` until it succeeds, fails fatally or the attempts run out.
/// `op` receives the 0-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, url: &Url, mut op: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, AttemptError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(AttemptError::Fatal(error)) => return Err(error),
            Err(AttemptError::Retry { error, server_delay }) => {
                if attempt + 1 >= attempts {
                    return Err(FetchError::RetriesExhausted {
                        attempts,
                        last: Box::new(error),
                    });
                }
                let delay = policy.delay_for(attempt, server_delay, jitter_sample());
                warn!(
                    "Attempt {}/{} for {} failed ({}), retrying in {:.1}s",
                    attempt + 1,
                    attempts,
                    url,
                    error,
                    delay.as_secs_f64()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_floor() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, None, 0.0), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, None, 0.0), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2, None, 0.5), Duration::from_secs_f64(4.5));
    }

    #[test]
    fn test_server_delay_takes_precedence() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.delay_for(0, Some(Duration::from_secs(10)), 0.0),
            Duration::from_secs(10)
        );
        // Exponential floor still applies when the server asks for less
        assert_eq!(
            policy.delay_for(2, Some(Duration::from_secs(1)), 0.0),
            Duration::from_secs(4)
        );
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 500, 502, 503, 504, 599] {
            assert!(RetryPolicy::is_retryable_status(status), "{}", status);
        }
        for status in [200, 301, 400, 403, 404, 410] {
            assert!(!RetryPolicy::is_retryable_status(status), "{}", status);
        }
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausts_after_max_attempts() {
        let url = Url::parse("https://example.com/").unwrap();
        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<(), _> = with_retry(&RetryPolicy::default(), &url, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(AttemptError::Retry {
                    error: FetchError::HttpStatus(503),
                    server_delay: None,
                })
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(FetchError::RetriesExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last, FetchError::HttpStatus(503)));
            }
            other => panic!("unexpected {:?}", other),
        }
        // 1s + 2s floors, each with under 1s jitter
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(3) && elapsed < Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_is_not_retried() {
        let url = Url::parse("https://example.com/").unwrap();
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_retry(&RetryPolicy::default(), &url, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AttemptError::Fatal(FetchError::HttpStatus(404))) }
        })
        .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(FetchError::HttpStatus(404))));
    }
}
