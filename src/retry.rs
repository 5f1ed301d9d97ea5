// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::time::Duration;

/// Bounded exponential backoff for retry-later faults
///
/// Fatal faults (invariant violations, I/O errors) are never retried;
/// only errors marked retryable by [`crate::Error::is_retryable`] are.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts after the first failure
    pub max_retries: usize,

    /// Backoff before the first retry
    pub initial_backoff: Duration,

    /// Backoff ceiling
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Runs the operation, retrying retryable faults with backoff until the
/// policy is exhausted; the last fault is surfaced.
pub fn run_with_retry<T>(
    policy: &RetryPolicy,
    origin: &str,
    mut op: impl FnMut() -> crate::Result<T>,
) -> crate::Result<T> {
    let mut backoff = policy.initial_backoff;

    for attempt in 0..=policy.max_retries {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                log::warn!("{origin}: attempt {attempt} failed with {e}, retrying in {backoff:?}");
                std::thread::sleep(backoff);
                backoff = (backoff * 2).min(policy.max_backoff);
            }
            Err(e) => return Err(e),
        }
    }

    unreachable!("loop either returns or errors out")
}
