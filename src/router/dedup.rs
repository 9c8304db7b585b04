use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Recently seen message-id set backing idempotent webhook processing.
///
/// WhatsApp redelivers events it considers unacknowledged; redeliveries
/// cluster shortly after the original, so a bounded TTL cache is enough to
/// suppress duplicate processing. Forgetting an id after the horizon is an
/// accepted, bounded risk rather than a correctness violation.
pub struct Deduper {
    seen: Mutex<HashMap<String, Instant>>,
    ttl: Duration,
    max_entries: usize,
}

impl Deduper {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            seen: Mutex::new(HashMap::new()),
            ttl,
            max_entries,
        }
    }

    /// Record the id as seen and report whether it had already been recorded.
    ///
    /// The check-and-record is a single locked read-modify-write: of any
    /// number of concurrent callers with the same id, exactly one observes
    /// `false`.
    pub fn seen(&self, id: &str) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        // Evict expired entries when at capacity; if still full, drop the oldest
        if seen.len() >= self.max_entries {
            let ttl = self.ttl;
            seen.retain(|_, ts| now.duration_since(*ts) < ttl);
        }
        if seen.len() >= self.max_entries {
            if let Some(oldest) = seen
                .iter()
                .min_by_key(|(_, ts)| *ts)
                .map(|(id, _)| id.clone())
            {
                seen.remove(&oldest);
            }
        }

        if let Some(ts) = seen.get(id) {
            if now.duration_since(*ts) < self.ttl {
                return true;
            }
        }

        seen.insert(id.to_string(), now);
        false
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
