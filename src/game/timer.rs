//! Cancellable one-shot timers driven by the session tick

use std::time::Instant;

/// Handle returned by [`TimerQueue::schedule`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Scheduled<T> {
    handle: TimerHandle,
    deadline: Instant,
    payload: T,
}

/// Deferred tasks that fire once their deadline passes, unless cancelled first
#[derive(Debug)]
pub struct TimerQueue<T> {
    next_handle: u64,
    entries: Vec<Scheduled<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            entries: Vec::new(),
        }
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Instant, payload: T) -> TimerHandle {
        let handle = TimerHandle(self.next_handle);
        self.next_handle += 1;
        self.entries.push(Scheduled {
            handle,
            deadline,
            payload,
        });
        handle
    }

    /// Returns the payload if the timer had not fired yet
    pub fn cancel(&mut self, handle: TimerHandle) -> Option<T> {
        let idx = self.entries.iter().position(|e| e.handle == handle)?;
        Some(self.entries.remove(idx).payload)
    }

    /// Remove and return every payload due at `now`, earliest deadline first
    pub fn drain_due(&mut self, now: Instant) -> Vec<T> {
        let mut due = Vec::new();
        let mut idx = 0;
        while idx < self.entries.len() {
            if self.entries[idx].deadline <= now {
                due.push(self.entries.remove(idx));
            } else {
                idx += 1;
            }
        }
        due.sort_by_key(|e| (e.deadline, e.handle.0));
        due.into_iter().map(|e| e.payload).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_only_after_deadline() {
        let start = Instant::now();
        let mut timers = TimerQueue::new();
        timers.schedule(start + Duration::from_secs(3), "respawn");

        assert!(timers.drain_due(start + Duration::from_millis(2999)).is_empty());
        assert_eq!(timers.drain_due(start + Duration::from_secs(3)), vec!["respawn"]);
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let start = Instant::now();
        let mut timers = TimerQueue::new();
        let handle = timers.schedule(start + Duration::from_secs(1), 1);
        timers.schedule(start + Duration::from_secs(1), 2);

        assert_eq!(timers.cancel(handle), Some(1));
        assert_eq!(timers.cancel(handle), None);
        assert_eq!(timers.drain_due(start + Duration::from_secs(5)), vec![2]);
    }

    #[test]
    fn due_payloads_come_out_in_deadline_order() {
        let start = Instant::now();
        let mut timers = TimerQueue::new();
        timers.schedule(start + Duration::from_secs(2), 'b');
        timers.schedule(start + Duration::from_secs(1), 'a');
        timers.schedule(start + Duration::from_secs(9), 'z');

        assert_eq!(timers.drain_due(start + Duration::from_secs(3)), vec!['a', 'b']);
        assert_eq!(timers.len(), 1);
    }
}
