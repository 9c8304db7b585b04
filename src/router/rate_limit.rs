use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::error;

/// Maximum number of tracked senders before stale windows are pruned.
const MAX_TRACKED_SENDERS: usize = 5000;

#[derive(Debug, Clone, Copy)]
struct Window {
    start: Instant,
    count: u32,
}

/// Per-sender fixed-window throughput limiter.
///
/// A fresh window opens on the first event from a sender (or after the
/// previous window expired) and admits up to `cap` events until `window`
/// has elapsed from its start. The whole check runs under one lock, so
/// concurrent events from the same sender can never undercount.
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    cap: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(cap: u32, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            cap,
            window,
        }
    }

    pub fn allow(&self, sender: &str, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        // Prune expired windows so idle senders do not accumulate forever
        if windows.len() > MAX_TRACKED_SENDERS {
            let window = self.window;
            windows.retain(|_, w| now.duration_since(w.start) < window);
        }

        match windows.get_mut(sender) {
            Some(w) if now.duration_since(w.start) < self.window => {
                w.count += 1;
                w.count <= self.cap
            }
            _ => {
                windows.insert(
                    sender.to_string(),
                    Window {
                        start: now,
                        count: 1,
                    },
                );
                true
            }
        }
    }

    #[cfg(test)]
    fn tracked_senders(&self) -> usize {
        self.windows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

/// Apply the configured failure policy to a limiter backend decision.
///
/// The in-process limiter is infallible; a shared backend (for a scaled-out
/// deployment) surfaces errors here, where the `fail_open` tunable decides
/// whether an outage admits or drops traffic.
pub fn gate_outcome(decision: anyhow::Result<bool>, fail_open: bool) -> bool {
    match decision {
        Ok(allowed) => allowed,
        Err(e) => {
            error!(
                "rate limiter backend error: {e:#}; failing {}",
                if fail_open { "open" } else { "closed" }
            );
            fail_open
        }
    }
}
