//! How long to wait before re-sending a failed chunk, and when to give up.

use crate::client::transport::TransportError;
use std::time::Duration;

/// Resend schedule for one chunk.
///
/// Each resend waits twice as long as the previous one, starting at
/// `first_delay` and never longer than `delay_cap`. A resend reuses the
/// upload token, so a chunk the server already wrote is appended twice and
/// the file is refused at finalize by the size check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends allowed after the first attempt.
    pub resends: u32,
    pub first_delay: Duration,
    pub delay_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::with_retries(4)
    }
}

impl RetryPolicy {
    /// A failed chunk stalls its file straight away.
    pub fn none() -> Self {
        Self::with_retries(0)
    }

    pub fn with_retries(resends: u32) -> Self {
        Self {
            resends,
            first_delay: Duration::from_millis(200),
            delay_cap: Duration::from_secs(10),
        }
    }

    /// Pause before resending after `failed_sends` attempts (1-based) ended
    /// in `err`. `None` means the chunk is stalled.
    pub fn delay_before_resend(&self, failed_sends: u32, err: &TransportError) -> Option<Duration> {
        if failed_sends == 0 || failed_sends > self.resends || !err.is_retryable() {
            return None;
        }
        let factor = 1u32 << (failed_sends - 1).min(16);
        let delay = self
            .first_delay
            .checked_mul(factor)
            .unwrap_or(self.delay_cap);
        Some(delay.min(self.delay_cap))
    }
}
