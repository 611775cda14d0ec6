use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Identity of one in-flight fetch for a cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
    key: String,
    generation: u64,
}

impl Ticket {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Default)]
struct State {
    next: u64,
    latest: HashMap<String, u64>,
}

/// Hands out a new generation per key on every fetch. Only the latest
/// generation may write its result back.
///
/// Generations come from one counter shared by all keys, so a key that was
/// dropped and begun again never reissues a generation an older ticket
/// still holds. Entries live only while a fetch for the key is in flight.
#[derive(Debug, Default)]
pub struct RequestTracker {
    state: Mutex<State>,
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn begin(&self, key: &str) -> Ticket {
        let mut state = self.state();
        state.next += 1;
        let generation = state.next;
        state.latest.insert(key.to_string(), generation);
        Ticket {
            key: key.to_string(),
            generation,
        }
    }

    pub fn is_current(&self, ticket: &Ticket) -> bool {
        self.state().latest.get(&ticket.key) == Some(&ticket.generation)
    }

    /// Run `write` only if `ticket` is still the latest for its key. The
    /// check and the write happen under one lock, so a newer request
    /// cannot begin in between.
    pub fn commit<T>(&self, ticket: &Ticket, write: impl FnOnce() -> T) -> Option<T> {
        let mut state = self.state();
        if state.latest.get(&ticket.key) != Some(&ticket.generation) {
            return None;
        }
        state.latest.remove(&ticket.key);
        Some(write())
    }

    /// End a fetch that has nothing to write.
    pub fn release(&self, ticket: &Ticket) {
        let mut state = self.state();
        if state.latest.get(&ticket.key) == Some(&ticket.generation) {
            state.latest.remove(&ticket.key);
        }
    }

    /// Supersede whatever is in flight for `key`.
    pub fn forget(&self, key: &str) {
        self.state().latest.remove(key);
    }

    pub fn clear(&self) {
        self.state().latest.clear();
    }

    /// Keys with a fetch in flight.
    pub fn len(&self) -> usize {
        self.state().latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_newer_request_supersedes() {
        let tracker = RequestTracker::new();
        let first = tracker.begin("weibo");
        let second = tracker.begin("weibo");

        assert!(!tracker.is_current(&first));
        assert!(tracker.is_current(&second));
        assert_eq!(tracker.commit(&first, || 1), None);
        assert_eq!(tracker.commit(&second, || 2), Some(2));
    }

    #[test]
    fn test_keys_are_independent() {
        let tracker = RequestTracker::new();
        let weibo = tracker.begin("weibo");
        let _zhihu = tracker.begin("zhihu");

        assert!(tracker.is_current(&weibo));
        assert_eq!(weibo.key(), "weibo");
    }

    #[test]
    fn test_finished_fetches_leave_no_entries() {
        let tracker = RequestTracker::new();
        for page in 0..100 {
            let ticket = tracker.begin(&format!("bestblogs?page={}", page));
            if page % 2 == 0 {
                assert_eq!(tracker.commit(&ticket, || ()), Some(()));
            } else {
                tracker.release(&ticket);
            }
        }
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_forget_supersedes_without_reusing_generations() {
        let tracker = RequestTracker::new();
        let stale = tracker.begin("weibo");
        tracker.forget("weibo");
        assert!(tracker.is_empty());

        let fresh = tracker.begin("weibo");
        assert!(!tracker.is_current(&stale));
        assert_eq!(tracker.commit(&stale, || ()), None);
        assert_eq!(tracker.commit(&fresh, || ()), Some(()));

        tracker.begin("a");
        tracker.begin("b");
        tracker.clear();
        assert_eq!(tracker.len(), 0);
    }
}
