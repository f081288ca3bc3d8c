use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::traits::{Clock, TimerData, TimerHandle};

/// Clock for targets without an event loop: timers are never armed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoTimer;

impl Clock for NoTimer {
    fn add_timer(&mut self, _delay: Duration, _data: TimerData) -> TimerHandle {
        TimerHandle::NONE
    }

    fn cancel_timer(&mut self, _handle: TimerHandle) -> TimerHandle {
        TimerHandle::NONE
    }

    fn is_defined(&self, _handle: TimerHandle) -> bool {
        false
    }

    fn next_deadline(&self) -> Option<Duration> {
        None
    }

    fn take_expired(&mut self) -> Option<TimerData> {
        None
    }
}

/// Deadline-ordered set of armed timers, shared by the concrete clocks.
#[derive(Debug, Default)]
struct TimerQueue {
    next_id: u32,
    entries: BTreeMap<(Duration, u32), TimerData>,
}

impl TimerQueue {
    fn add(&mut self, now: Duration, delay: Duration, data: TimerData) -> TimerHandle {
        self.next_id = self.next_id.wrapping_add(1);
        if self.next_id == 0 {
            self.next_id = 1;
        }
        let id = self.next_id;
        self.entries.insert((now + delay, id), data);
        trace!(id, delay_ms = delay.as_millis() as u64, data, "timer armed");
        TimerHandle::from_raw(id)
    }

    fn cancel(&mut self, handle: TimerHandle) -> TimerHandle {
        if !handle.is_none() {
            let before = self.entries.len();
            self.entries.retain(|(_, id), _| *id != handle.raw());
            if self.entries.len() != before {
                trace!(id = handle.raw(), "timer cancelled");
            }
        }
        TimerHandle::NONE
    }

    fn contains(&self, handle: TimerHandle) -> bool {
        !handle.is_none() && self.entries.keys().any(|(_, id)| *id == handle.raw())
    }

    fn next_deadline(&self, now: Duration) -> Option<Duration> {
        self.entries
            .keys()
            .next()
            .map(|(expires, _)| expires.saturating_sub(now))
    }

    fn pop_expired(&mut self, now: Duration) -> Option<TimerData> {
        let key = *self.entries.keys().next()?;
        if key.0 > now {
            return None;
        }
        let data = self.entries.remove(&key)?;
        trace!(id = key.1, data, "timer expired");
        Some(data)
    }
}

/// Virtual-time clock advanced explicitly by the caller.
///
/// Used to drive retransmission and link-establishment timers in tests
/// without sleeping.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Duration,
    queue: TimerQueue,
}

impl ManualClock {
    /// Create a clock at virtual time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Current virtual time.
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of armed timers.
    pub fn armed(&self) -> usize {
        self.queue.entries.len()
    }
}

impl Clock for ManualClock {
    fn add_timer(&mut self, delay: Duration, data: TimerData) -> TimerHandle {
        self.queue.add(self.now, delay, data)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) -> TimerHandle {
        self.queue.cancel(handle)
    }

    fn is_defined(&self, handle: TimerHandle) -> bool {
        self.queue.contains(handle)
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline(self.now)
    }

    fn take_expired(&mut self) -> Option<TimerData> {
        self.queue.pop_expired(self.now)
    }
}

/// Monotonic wall-clock timers.
#[derive(Debug)]
pub struct SystemClock {
    origin: Instant,
    queue: TimerQueue,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            queue: TimerQueue::default(),
        }
    }

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn add_timer(&mut self, delay: Duration, data: TimerData) -> TimerHandle {
        let now = self.now();
        self.queue.add(now, delay, data)
    }

    fn cancel_timer(&mut self, handle: TimerHandle) -> TimerHandle {
        self.queue.cancel(handle)
    }

    fn is_defined(&self, handle: TimerHandle) -> bool {
        self.queue.contains(handle)
    }

    fn next_deadline(&self) -> Option<Duration> {
        self.queue.next_deadline(self.now())
    }

    fn take_expired(&mut self) -> Option<TimerData> {
        let now = self.now();
        self.queue.pop_expired(now)
    }
}
