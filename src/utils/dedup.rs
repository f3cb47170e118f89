//! Provider message id bookkeeping so webhook redeliveries are handled once

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

pub struct MessageDeduplicator {
    ttl: Duration,
    capacity: usize,
    inner: Mutex<Seen>,
}

#[derive(Default)]
struct Seen {
    claimed: HashMap<String, Instant>,
    order: VecDeque<(String, Instant)>,
}

impl MessageDeduplicator {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            inner: Mutex::new(Seen::default()),
        }
    }

    /// True if this id was not seen before; the id is now taken
    pub fn claim(&self, message_id: &str) -> bool {
        let now = Instant::now();
        let mut seen = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        self.evict(&mut seen, now);

        if seen.claimed.contains_key(message_id) {
            return false;
        }
        seen.claimed.insert(message_id.to_string(), now);
        seen.order.push_back((message_id.to_string(), now));
        true
    }

    /// Forget a claim so a redelivery of the same id gets processed again
    pub fn release(&self, message_id: &str) {
        let mut seen = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        seen.claimed.remove(message_id);
    }

    fn evict(&self, seen: &mut Seen, now: Instant) {
        while let Some((id, at)) = seen.order.front().cloned() {
            let expired = now.duration_since(at) >= self.ttl;
            if !expired && seen.order.len() <= self.capacity {
                break;
            }
            seen.order.pop_front();
            // a released and re-claimed id has a newer timestamp; leave it alone
            if seen.claimed.get(&id) == Some(&at) {
                seen.claimed.remove(&id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_claim_is_duplicate() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60), 100);
        assert!(dedup.claim("wamid.1"));
        assert!(!dedup.claim("wamid.1"));
        assert!(dedup.claim("wamid.2"));
    }

    #[test]
    fn test_release_allows_reprocessing() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60), 100);
        assert!(dedup.claim("wamid.1"));
        dedup.release("wamid.1");
        assert!(dedup.claim("wamid.1"));
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let dedup = MessageDeduplicator::new(Duration::from_secs(60), 2);
        assert!(dedup.claim("a"));
        assert!(dedup.claim("b"));
        assert!(dedup.claim("c"));
        assert!(dedup.claim("a"));
    }
}
