use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use crate::vm::thread::thread::ThreadId;

/// Time as the VM sees it. Deadlines are measured from the clock's own start.
pub trait Clock {
    fn now(&self) -> Duration;

    /// Milliseconds since the Unix epoch, for `System.currentTimeMillis`.
    fn wall_millis(&self) -> i64;

    /// Called when every live thread waits on a timer.
    fn sleep_until(&self, deadline: Duration);
}

pub struct SystemClock {
    start: Instant,
    epoch_millis: i64,
}

impl Default for SystemClock {
    fn default() -> Self {
        let epoch_millis = SystemTime::now().duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        SystemClock { start: Instant::now(), epoch_millis }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn wall_millis(&self) -> i64 {
        self.epoch_millis + self.now().as_millis() as i64
    }

    fn sleep_until(&self, deadline: Duration) {
        if let Some(left) = deadline.checked_sub(self.now()) {
            std::thread::sleep(left);
        }
    }
}

/// A clock that only moves when told to, or when the VM would otherwise sleep.
/// Clones share the same time.
#[derive(Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn wall_millis(&self) -> i64 {
        self.now.get().as_millis() as i64
    }

    fn sleep_until(&self, deadline: Duration) {
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Timer {
    pub deadline: Duration,
    seq: u64,
    pub thread: ThreadId,
    /// The thread's wake generation when the timer was armed.
    pub generation: u64,
}

/// Pending wake-ups, earliest first. Firing one for a thread that has been woken
/// since is harmless; the generation tells them apart.
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<Reverse<Timer>>,
    seq: u64,
}

impl TimerQueue {
    pub fn schedule(&mut self, deadline: Duration, thread: ThreadId, generation: u64) {
        self.seq += 1;
        self.heap.push(Reverse(Timer { deadline, seq: self.seq, thread, generation }));
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.heap.peek().map(|Reverse(t)| t.deadline)
    }

    pub fn pop_due(&mut self, now: Duration) -> Vec<Timer> {
        let mut due = vec![];
        while let Some(Reverse(timer)) = self.heap.peek() {
            if timer.deadline > now {
                break;
            }
            due.push(*timer);
            self.heap.pop();
        }
        due
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;
    use crate::vm::thread::thread::ThreadId;
    use crate::vm::thread::timer::{Clock, ManualClock, TimerQueue};

    #[test]
    fn timers_fire_in_deadline_order() {
        let mut queue = TimerQueue::default();
        queue.schedule(Duration::from_millis(30), ThreadId(1), 0);
        queue.schedule(Duration::from_millis(10), ThreadId(2), 4);
        queue.schedule(Duration::from_millis(10), ThreadId(3), 0);

        assert_eq!(queue.next_deadline(), Some(Duration::from_millis(10)));
        let due: Vec<_> = queue.pop_due(Duration::from_millis(20)).iter().map(|t| t.thread).collect();
        assert_eq!(due, vec![ThreadId(2), ThreadId(3)]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn manual_clock_jumps_to_deadline() {
        let clock = ManualClock::default();
        let shared = clock.clone();
        clock.sleep_until(Duration::from_secs(2));
        shared.advance(Duration::from_millis(5));
        assert_eq!(clock.now(), Duration::from_millis(2005));
        clock.sleep_until(Duration::from_secs(1));
        assert_eq!(clock.wall_millis(), 2005);
    }
}
