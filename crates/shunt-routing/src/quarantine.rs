use std::collections::HashMap;
use std::sync::Mutex;

use shunt_common::Destination;

/// Per-destination consecutive connect-failure registry.
///
/// Every failed connect increments the destination's counter; when it
/// reaches `max_connect_errors` the destination is quarantined and the
/// selectors skip it. A successful connect resets the counter and lifts the
/// quarantine. Quarantine is process-lifetime: there is no timed recovery.
///
/// Counters are monotonic between resets, so concurrent failing connects
/// commute; the critical sections are short and the lock is never held
/// across await points.
pub struct Quarantine {
    max_connect_errors: u32,
    entries: Mutex<HashMap<Destination, u32>>,
}

impl Quarantine {
    pub fn new(max_connect_errors: u32) -> Self {
        Self {
            max_connect_errors,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Records a failed connect to `dest`. Returns `true` exactly when this
    /// failure crossed the quarantine threshold, so callers can log the
    /// transition once.
    pub fn record_failure(&self, dest: &Destination) -> bool {
        let mut entries = self.lock();
        let count = entries.entry(dest.clone()).or_insert(0);
        *count = count.saturating_add(1);
        *count == self.max_connect_errors
    }

    /// Records a successful connect: resets the counter and lifts any
    /// quarantine.
    pub fn record_success(&self, dest: &Destination) {
        self.lock().remove(dest);
    }

    pub fn is_quarantined(&self, dest: &Destination) -> bool {
        self.lock()
            .get(dest)
            .is_some_and(|count| *count >= self.max_connect_errors)
    }

    pub fn failure_count(&self, dest: &Destination) -> u32 {
        self.lock().get(dest).copied().unwrap_or(0)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Destination, u32>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
