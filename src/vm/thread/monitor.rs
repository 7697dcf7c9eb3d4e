use std::collections::{HashMap, VecDeque};
use log::debug;
use thiserror::Error;
use crate::vm::thread::thread::{Resume, ThreadId, ThreadStatus};
use crate::vm::value::ObjectRef;
use crate::vm::vm::Vm;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("current thread is not the owner of the monitor")]
pub struct NotOwner;

/// Lock state of one object. Both queues are FIFO.
#[derive(Debug, Default)]
pub struct Monitor {
    pub owner: Option<ThreadId>,
    pub count: u32,
    blocked: VecDeque<ThreadId>,
    waiting: VecDeque<ThreadId>,
}

/// Monitors of objects that are locked or have threads queued on them.
#[derive(Debug, Default)]
pub struct MonitorTable {
    monitors: HashMap<ObjectRef, Monitor>,
}

impl Monitor {
    fn is_idle(&self) -> bool {
        self.owner.is_none() && self.blocked.is_empty() && self.waiting.is_empty()
    }
}

impl MonitorTable {
    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    fn prune(&mut self, object: ObjectRef) {
        if self.monitors.get(&object).map_or(false, Monitor::is_idle) {
            self.monitors.remove(&object);
        }
    }

    pub fn get(&self, object: ObjectRef) -> Option<&Monitor> {
        self.monitors.get(&object)
    }

    pub fn owner(&self, object: ObjectRef) -> Option<ThreadId> {
        self.monitors.get(&object).and_then(|m| m.owner)
    }

    pub fn holds(&self, thread: ThreadId, object: ObjectRef) -> bool {
        self.owner(object) == Some(thread)
    }

    /// Takes the monitor `count` times. Fails without side effects when another
    /// thread owns it.
    pub fn try_enter(&mut self, thread: ThreadId, object: ObjectRef, count: u32) -> bool {
        let monitor = self.monitors.entry(object).or_default();
        match monitor.owner {
            None => {
                monitor.owner = Some(thread);
                monitor.count = count;
                true
            }
            Some(owner) if owner == thread => {
                monitor.count += count;
                true
            }
            Some(_) => false,
        }
    }

    pub fn add_blocked(&mut self, thread: ThreadId, object: ObjectRef) {
        let monitor = self.monitors.entry(object).or_default();
        if !monitor.blocked.contains(&thread) {
            monitor.blocked.push_back(thread);
        }
    }

    /// Drops one level of ownership. When the monitor becomes free the first
    /// blocked thread is handed back so it can contend again.
    pub fn exit(&mut self, thread: ThreadId, object: ObjectRef) -> Result<Option<ThreadId>, NotOwner> {
        let monitor = self.monitors.get_mut(&object).ok_or(NotOwner)?;
        if monitor.owner != Some(thread) {
            return Err(NotOwner);
        }

        monitor.count -= 1;
        if monitor.count > 0 {
            return Ok(None);
        }
        monitor.owner = None;
        let next = monitor.blocked.pop_front();
        self.prune(object);
        Ok(next)
    }

    /// Releases the monitor completely and queues `thread` as a waiter. Returns the
    /// recursion count to restore later and the blocked thread to wake.
    pub fn wait(&mut self, thread: ThreadId, object: ObjectRef) -> Result<(u32, Option<ThreadId>), NotOwner> {
        let monitor = self.monitors.get_mut(&object).ok_or(NotOwner)?;
        if monitor.owner != Some(thread) {
            return Err(NotOwner);
        }

        let count = monitor.count;
        monitor.owner = None;
        monitor.count = 0;
        monitor.waiting.push_back(thread);
        Ok((count, monitor.blocked.pop_front()))
    }

    /// Removes the longest waiting thread, if any.
    pub fn notify(&mut self, thread: ThreadId, object: ObjectRef) -> Result<Option<ThreadId>, NotOwner> {
        let monitor = self.monitors.get_mut(&object).ok_or(NotOwner)?;
        if monitor.owner != Some(thread) {
            return Err(NotOwner);
        }
        Ok(monitor.waiting.pop_front())
    }

    pub fn notify_all(&mut self, thread: ThreadId, object: ObjectRef) -> Result<Vec<ThreadId>, NotOwner> {
        let monitor = self.monitors.get_mut(&object).ok_or(NotOwner)?;
        if monitor.owner != Some(thread) {
            return Err(NotOwner);
        }
        Ok(monitor.waiting.drain(..).collect())
    }

    /// All waiters, regardless of ownership (thread termination wakes joiners).
    pub fn take_waiters(&mut self, object: ObjectRef) -> Vec<ThreadId> {
        let waiters = self.monitors.get_mut(&object)
            .map(|m| m.waiting.drain(..).collect())
            .unwrap_or_default();
        self.prune(object);
        waiters
    }

    pub fn remove_waiter(&mut self, thread: ThreadId, object: ObjectRef) -> bool {
        let removed = match self.monitors.get_mut(&object) {
            Some(monitor) => {
                let before = monitor.waiting.len();
                monitor.waiting.retain(|t| *t != thread);
                before != monitor.waiting.len()
            }
            None => false,
        };
        self.prune(object);
        removed
    }

    pub fn waiters(&self, object: ObjectRef) -> Vec<ThreadId> {
        self.monitors.get(&object).map(|m| m.waiting.iter().copied().collect()).unwrap_or_default()
    }

    pub fn blocked(&self, object: ObjectRef) -> Vec<ThreadId> {
        self.monitors.get(&object).map(|m| m.blocked.iter().copied().collect()).unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.monitors.clear();
    }
}

pub const EXIT_NOT_OWNER: &str = "Cannot exit a monitor that you do not own.";
pub const WAIT_NOT_OWNER: &str = "Cannot wait on an object that you do not own.";
pub const NOTIFY_NOT_OWNER: &str = "Cannot notify on a monitor that you do not own.";

impl Vm {
    /// Monitor entry for `thread`. On contention the thread is parked on the
    /// monitor's blocked queue and `false` is returned; the caller suspends.
    pub(crate) fn monitor_enter(&mut self, thread: ThreadId, object: ObjectRef, count: u32) -> bool {
        if self.monitors.try_enter(thread, object, count) {
            return true;
        }

        debug!("thread {} blocks on monitor {} owned by {:?}", thread, object, self.monitors.owner(object));
        self.monitors.add_blocked(thread, object);
        self.set_status(thread, ThreadStatus::Blocked(object));
        false
    }

    pub(crate) fn monitor_exit(&mut self, thread: ThreadId, object: ObjectRef) -> Result<(), NotOwner> {
        if let Some(next) = self.monitors.exit(thread, object)? {
            self.wake(next, None);
        }
        Ok(())
    }

    /// `Object.wait`. The thread gives up the monitor and sleeps until notified,
    /// interrupted, or, with a timeout, until the timer fires.
    pub(crate) fn monitor_wait(&mut self, thread: ThreadId, object: ObjectRef,
                               timeout: Option<std::time::Duration>) -> Result<(), NotOwner> {
        let (count, next) = self.monitors.wait(thread, object)?;
        if let Some(next) = next {
            self.wake(next, None);
        }

        self.set_status(thread, ThreadStatus::Waiting { monitor: object, count, timed: timeout.is_some() });
        if let Some(timeout) = timeout {
            self.arm_timer(thread, timeout);
        }
        Ok(())
    }

    pub(crate) fn monitor_notify(&mut self, thread: ThreadId, object: ObjectRef, all: bool) -> Result<(), NotOwner> {
        let woken = if all {
            self.monitors.notify_all(thread, object)?
        } else {
            self.monitors.notify(thread, object)?.into_iter().collect()
        };

        for waiter in woken {
            self.reacquire_after_wait(waiter, Resume::Return(None));
        }
        Ok(())
    }

    /// Moves a thread out of `wait` and lines it up for the monitor again.
    /// `then` runs once the monitor is reacquired.
    pub(crate) fn reacquire_after_wait(&mut self, thread: ThreadId, then: Resume) {
        let (monitor, count) = match self.thread(thread).map(|t| t.status) {
            Some(ThreadStatus::Waiting { monitor, count, .. }) => (monitor, count),
            _ => return,
        };
        self.monitors.remove_waiter(thread, monitor);

        let resume = Resume::Reacquire { monitor, count, then: Box::new(then) };
        if self.monitors.owner(monitor).is_none() {
            self.wake(thread, Some(resume));
        } else {
            // goes straight to the blocked queue; woken by the owner's exit
            self.monitors.add_blocked(thread, monitor);
            self.set_status(thread, ThreadStatus::Blocked(monitor));
            self.set_resume(thread, resume);
        }
    }
}
