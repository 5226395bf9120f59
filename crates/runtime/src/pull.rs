use std::time::{Duration, Instant};

use tracing::debug;

/// Bounds for a synchronous read of a value only the surface knows.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PullPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PullPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(200),
            interval: Duration::from_millis(10),
        }
    }
}

impl PullPolicy {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pulled<T> {
    /// The surface answered in time.
    Fresh(T),
    /// Nothing arrived before the deadline; this is the fallback value.
    TimedOut(T),
}

impl<T> Pulled<T> {
    pub fn into_inner(self) -> T {
        match self {
            Pulled::Fresh(v) | Pulled::TimedOut(v) => v,
        }
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, Pulled::TimedOut(_))
    }
}

/// Polls until `poll` yields a value or the policy's timeout passes.
///
/// `poll` runs at least once, even with a zero timeout. On timeout the result
/// is `fallback()`; this never blocks past the deadline.
pub fn pull<T>(
    policy: PullPolicy,
    mut poll: impl FnMut() -> Option<T>,
    fallback: impl FnOnce() -> T,
) -> Pulled<T> {
    let deadline = Instant::now() + policy.timeout;
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        if let Some(v) = poll() {
            return Pulled::Fresh(v);
        }
        let now = Instant::now();
        if now >= deadline {
            debug!(
                "pull timed out after {attempts} attempts ({:?})",
                policy.timeout
            );
            return Pulled::TimedOut(fallback());
        }
        std::thread::sleep(policy.interval.min(deadline - now));
    }
}
