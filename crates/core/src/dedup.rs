use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use crate::domain::event::EventId;

/// Process-wide at-most-once filter over inbound event identities.
///
/// `observe` performs the membership test and the insert under one lock, so
/// concurrent deliveries of the same event yield exactly one `true`. Entries are
/// never evicted; the set lives as long as the process.
#[derive(Debug, Default)]
pub struct DeduplicationGuard {
    seen: Mutex<HashSet<EventId>>,
}

impl DeduplicationGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` the first time `id` is observed and `false` afterwards.
    pub fn observe(&self, id: &EventId) -> bool {
        let mut seen = self.lock();
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // The set is never left half-updated, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, HashSet<EventId>> {
        self.seen.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Barrier};
    use std::thread;

    use super::DeduplicationGuard;
    use crate::domain::event::EventId;

    #[test]
    fn second_observation_is_a_duplicate() {
        let guard = DeduplicationGuard::new();
        let id = EventId::for_message("C1", "1712345678.000100");

        assert!(guard.observe(&id));
        assert!(!guard.observe(&id));
        assert!(!guard.observe(&id));
        assert_eq!(guard.len(), 1);
    }

    #[test]
    fn distinct_events_are_independent() {
        let guard = DeduplicationGuard::new();

        assert!(guard.observe(&EventId::for_message("C1", "1.1")));
        assert!(guard.observe(&EventId::for_message("C1", "1.2")));
        assert!(guard.observe(&EventId::for_message("C2", "1.1")));
        assert_eq!(guard.len(), 3);
    }

    #[test]
    fn concurrent_observers_of_one_event_get_exactly_one_true() {
        const CALLERS: usize = 32;

        for _ in 0..20 {
            let guard = Arc::new(DeduplicationGuard::new());
            let barrier = Arc::new(Barrier::new(CALLERS));
            let id = EventId::for_message("C1", "1712345678.000100");

            let handles: Vec<_> = (0..CALLERS)
                .map(|_| {
                    let guard = Arc::clone(&guard);
                    let barrier = Arc::clone(&barrier);
                    let id = id.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        guard.observe(&id)
                    })
                })
                .collect();

            let firsts = handles
                .into_iter()
                .map(|handle| handle.join().expect("observer thread panicked"))
                .filter(|first| *first)
                .count();

            assert_eq!(firsts, 1);
            assert_eq!(guard.len(), 1);
        }
    }

    #[test]
    fn concurrent_distinct_events_lose_no_updates() {
        let guard = Arc::new(DeduplicationGuard::new());

        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let guard = Arc::clone(&guard);
                thread::spawn(move || {
                    (0..250)
                        .filter(|n| guard.observe(&EventId::for_message("C1", &format!("{worker}.{n}"))))
                        .count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|handle| handle.join().unwrap()).sum();
        assert_eq!(total, 2_000);
        assert_eq!(guard.len(), 2_000);
    }
}
