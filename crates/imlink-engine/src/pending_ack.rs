use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::config::deadline;

/// Invoked with the server-assigned `msgId` each time a DELIVERED for the seq arrives.
pub type AckCallback = Box<dyn FnMut(u64) + Send>;

struct Entry {
    callback: AckCallback,
    evict_at: Option<Instant>,
}

/// Maps outstanding `seq` tokens to their acknowledgement callbacks.
///
/// An entry outlives its first acknowledgement by a grace window, so a DELIVERED for a
/// resent duplicate still reaches the callback.
pub struct PendingAckTracker {
    grace: Duration,
    entries: HashMap<String, Entry>,
}

impl PendingAckTracker {
    pub fn new(grace: Duration) -> Self {
        Self {
            grace,
            entries: HashMap::new(),
        }
    }

    /// Bind `callback` to `seq`, replacing any previous binding and its eviction.
    pub fn register(&mut self, seq: impl Into<String>, callback: AckCallback) {
        self.entries.insert(
            seq.into(),
            Entry {
                callback,
                evict_at: None,
            },
        );
    }

    /// Fire the callback for `seq` with `msg_id`.
    ///
    /// The first resolve schedules eviction at `now + grace`; later ones inside the window
    /// fire again without moving it. Returns false if nothing is registered for `seq`.
    pub fn resolve(&mut self, seq: &str, msg_id: u64, now: Instant) -> bool {
        let Some(entry) = self.entries.get_mut(seq) else {
            return false;
        };
        (entry.callback)(msg_id);
        entry.evict_at.get_or_insert(deadline(now, self.grace));
        true
    }

    pub fn contains(&self, seq: &str) -> bool {
        self.entries.contains_key(seq)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Earliest pending eviction.
    pub fn poll_timeout(&self) -> Option<Instant> {
        self.entries.values().filter_map(|e| e.evict_at).min()
    }

    /// Drop every entry whose grace window has ended.
    pub fn handle_timeout(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.evict_at.is_none_or(|at| at > now));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "acknowledged seqs evicted");
        }
        evicted
    }
}

impl fmt::Debug for PendingAckTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingAckTracker")
            .field("grace", &self.grace)
            .field("entries", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u64>>>, AckCallback) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, Box::new(move |id| sink.lock().unwrap().push(id)))
    }

    #[test]
    fn resolve_fires_until_grace_ends() {
        let t0 = Instant::now();
        let grace = Duration::from_secs(30);
        let mut acks = PendingAckTracker::new(grace);
        let (seen, cb) = recorder();
        acks.register("a", cb);

        assert!(acks.resolve("a", 101, t0));
        assert!(acks.resolve("a", 101, t0 + Duration::from_secs(10)));
        assert_eq!(*seen.lock().unwrap(), vec![101, 101]);

        // the second resolve did not push the deadline out
        assert_eq!(acks.poll_timeout(), Some(t0 + grace));
        assert_eq!(acks.handle_timeout(t0 + grace), 1);

        assert!(!acks.resolve("a", 101, t0 + grace));
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert!(acks.is_empty());
    }

    #[test]
    fn unknown_seq_is_noop() {
        let mut acks = PendingAckTracker::new(Duration::from_secs(30));
        assert!(!acks.resolve("missing", 1, Instant::now()));
    }

    #[test]
    fn register_is_last_write_wins() {
        let t0 = Instant::now();
        let mut acks = PendingAckTracker::new(Duration::from_secs(30));
        let (first, cb1) = recorder();
        let (second, cb2) = recorder();

        acks.register("a", cb1);
        acks.resolve("a", 7, t0);
        acks.register("a", cb2);

        // re-registering cleared the eviction
        assert_eq!(acks.poll_timeout(), None);
        assert_eq!(acks.handle_timeout(t0 + Duration::from_secs(60)), 0);

        acks.resolve("a", 8, t0 + Duration::from_secs(60));
        assert_eq!(*first.lock().unwrap(), vec![7]);
        assert_eq!(*second.lock().unwrap(), vec![8]);
    }

    #[test]
    fn unresolved_entries_are_kept() {
        let mut acks = PendingAckTracker::new(Duration::from_secs(1));
        let (_, cb) = recorder();
        acks.register("pending", cb);
        acks.handle_timeout(Instant::now() + Duration::from_secs(3600));
        assert!(acks.contains("pending"));
        assert_eq!(acks.len(), 1);
    }
}
