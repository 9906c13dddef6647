use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::error::IngestError;

/// Outcome of a single failed attempt.
#[derive(Debug)]
pub enum AttemptError {
    /// Worth trying again after a delay.
    Transient(IngestError),
    /// Retrying cannot help.
    Permanent(IngestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after the failed attempt `attempt` (0-based): `base * 2^attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails permanently, or the attempt ceiling is hit.
    pub fn run<T, F>(&self, operation: &str, mut op: F) -> Result<T, IngestError>
    where
        F: FnMut(u32) -> Result<T, AttemptError>,
    {
        let mut attempt = 0u32;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(AttemptError::Permanent(err)) => return Err(err),
                Err(AttemptError::Transient(err)) => {
                    if attempt + 1 >= self.max_attempts {
                        return Err(IngestError::RetriesExhausted {
                            operation: operation.to_string(),
                            attempts: attempt + 1,
                            last_error: err.to_string(),
                        });
                    }
                    let delay = self.delay_for(attempt);
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient failure, backing off"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

pub fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request() || err.is_body()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn instant() -> RetryPolicy {
        RetryPolicy::new(4, Duration::ZERO)
    }

    #[test]
    fn delays_double() {
        let policy = RetryPolicy::new(10, Duration::from_millis(100));
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let mut seen = Vec::new();
        let value = instant()
            .run("fetch", |attempt| {
                seen.push(attempt);
                if attempt < 2 {
                    Err(AttemptError::Transient(IngestError::UniprotHttp(
                        "reset".to_string(),
                    )))
                } else {
                    Ok(7)
                }
            })
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(seen, vec![0, 1, 2]);
    }

    #[test]
    fn exhausting_attempts_is_fatal() {
        let mut calls = 0;
        let err = instant()
            .run::<(), _>("fetch", |_| {
                calls += 1;
                Err(AttemptError::Transient(IngestError::UniprotHttp(
                    "timeout".to_string(),
                )))
            })
            .unwrap_err();
        assert_eq!(calls, 4);
        assert_matches!(err, IngestError::RetriesExhausted { attempts: 4, .. });
    }

    #[test]
    fn permanent_failure_is_not_retried() {
        let mut calls = 0;
        let err = instant()
            .run::<(), _>("fetch", |_| {
                calls += 1;
                Err(AttemptError::Permanent(IngestError::UniprotStatus {
                    status: 400,
                    message: "bad query".to_string(),
                }))
            })
            .unwrap_err();
        assert_eq!(calls, 1);
        assert_matches!(err, IngestError::UniprotStatus { status: 400, .. });
    }

    #[test]
    fn retryable_statuses() {
        assert!(is_retryable_status(503));
        assert!(is_retryable_status(429));
        assert!(!is_retryable_status(404));
    }
}
