use std::time::Duration;
use log::{debug, info, trace, warn};
use crate::vm::interpreter::SliceEnd;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::thread::thread::{Resume, ThreadId, ThreadOutcome, ThreadStatus, VMThread};
use crate::vm::vm::Vm;

/// Why [`Vm::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// No non-daemon thread is alive.
    Finished,
    /// `System.exit` was called with this status.
    Halted(i32),
    /// Every live thread waits on the host: class bytes or a native completion.
    Idle,
    /// Live threads remain but none can ever be woken.
    Deadlocked,
}

impl Vm {
    pub(crate) fn thread(&self, id: ThreadId) -> Option<&VMThread> {
        self.threads.get(id.0 as usize)
    }

    pub(crate) fn thread_mut(&mut self, id: ThreadId) -> Option<&mut VMThread> {
        self.threads.get_mut(id.0 as usize)
    }

    pub(crate) fn set_status(&mut self, id: ThreadId, status: ThreadStatus) {
        if let Some(thread) = self.thread_mut(id) {
            if thread.status != status {
                debug!("thread {}: {:?} -> {:?}", id, thread.status, status);
                thread.status = status;
            }
        }
    }

    pub(crate) fn set_resume(&mut self, id: ThreadId, resume: Resume) {
        if let Some(thread) = self.thread_mut(id) {
            thread.resume = Some(resume);
        }
    }

    /// Makes a suspended thread runnable. Without a `resume` the thread keeps the
    /// one it already has, or retries its current instruction.
    pub(crate) fn wake(&mut self, id: ThreadId, resume: Option<Resume>) {
        let thread = match self.thread_mut(id) {
            Some(thread) if thread.is_alive() => thread,
            _ => return,
        };

        thread.wake_generation += 1;
        if resume.is_some() {
            thread.resume = resume;
        }
        self.set_status(id, ThreadStatus::Runnable);
        if !self.run_queue.contains(&id) {
            self.run_queue.push_back(id);
        }
    }

    /// Wakes `id` after `timeout` unless it is woken some other way first.
    pub(crate) fn arm_timer(&mut self, id: ThreadId, timeout: Duration) {
        let generation = match self.thread(id) {
            Some(thread) => thread.wake_generation,
            None => return,
        };
        let deadline = self.clock.now() + timeout;
        self.timers.schedule(deadline, id, generation);
    }

    fn fire_timers(&mut self) {
        let now = self.clock.now();
        for timer in self.timers.pop_due(now) {
            let current = self.thread(timer.thread).map(|t| (t.wake_generation, t.status));
            let status = match current {
                Some((generation, status)) if generation == timer.generation => status,
                _ => continue,
            };

            trace!("timer for thread {} fired", timer.thread);
            match status {
                ThreadStatus::Sleeping | ThreadStatus::Parked { timed: true } =>
                    self.wake(timer.thread, Some(Resume::Return(None))),
                ThreadStatus::Waiting { timed: true, .. } =>
                    self.reacquire_after_wait(timer.thread, Resume::Return(None)),
                _ => {}
            }
        }
    }

    pub(crate) fn sleep(&mut self, id: ThreadId, duration: Duration) {
        self.set_status(id, ThreadStatus::Sleeping);
        self.arm_timer(id, duration);
    }

    /// Parks `id` unless a permit is available or it is interrupted. Returns
    /// whether the thread was suspended.
    pub(crate) fn park(&mut self, id: ThreadId, timeout: Option<Duration>) -> bool {
        let thread = match self.thread_mut(id) {
            Some(thread) => thread,
            None => return false,
        };
        if thread.permit {
            thread.permit = false;
            return false;
        }
        if thread.interrupted {
            return false;
        }

        self.set_status(id, ThreadStatus::Parked { timed: timeout.is_some() });
        if let Some(timeout) = timeout {
            self.arm_timer(id, timeout);
        }
        true
    }

    pub(crate) fn unpark(&mut self, id: ThreadId) {
        match self.thread_status(id) {
            Some(ThreadStatus::Parked { .. }) => self.wake(id, Some(Resume::Return(None))),
            Some(status) if status.is_alive() => {
                if let Some(thread) = self.thread_mut(id) {
                    thread.permit = true;
                }
            }
            _ => {}
        }
    }

    /// Sets the interrupt flag. Sleeping and waiting threads leave with an
    /// `InterruptedException`, clearing the flag; parked threads return normally
    /// with the flag still set.
    pub(crate) fn interrupt(&mut self, id: ThreadId) {
        let status = match self.thread_mut(id) {
            Some(thread) if thread.is_alive() => {
                thread.interrupted = true;
                thread.status
            }
            _ => return,
        };

        let interrupted = |message: &str| Resume::Throw(Throwable::new("java/lang/InterruptedException", message));
        match status {
            ThreadStatus::Sleeping => {
                self.clear_interrupt(id);
                self.wake(id, Some(interrupted("sleep interrupted")));
            }
            ThreadStatus::Waiting { .. } => {
                self.clear_interrupt(id);
                self.reacquire_after_wait(id, interrupted("wait interrupted"));
            }
            ThreadStatus::Parked { .. } => self.wake(id, Some(Resume::Return(None))),
            _ => {}
        }
    }

    /// Clears the interrupt flag, returning its previous value.
    pub(crate) fn clear_interrupt(&mut self, id: ThreadId) -> bool {
        match self.thread_mut(id) {
            Some(thread) => std::mem::replace(&mut thread.interrupted, false),
            None => false,
        }
    }

    pub(crate) fn finish_thread(&mut self, id: ThreadId, outcome: ThreadOutcome) {
        let java_object = match self.thread_mut(id) {
            Some(thread) => {
                info!("thread {} ({}) terminated: {:?}", id, thread.name, outcome);
                thread.status = ThreadStatus::Terminated;
                thread.outcome = Some(outcome);
                thread.resume = None;
                thread.stack.clear();
                thread.java_object
            }
            None => return,
        };
        self.run_queue.retain(|t| *t != id);

        // joiners wait on the thread object
        if let Some(object) = java_object {
            for waiter in self.monitors.take_waiters(object) {
                self.reacquire_after_wait(waiter, Resume::Return(None));
            }
        }
    }

    /// Stops every thread; nothing runs after a halt.
    pub(crate) fn halt(&mut self, status: i32) {
        info!("halt with status {}", status);
        self.halted = Some(status);
        for thread in self.threads.iter_mut().filter(|t| t.is_alive()) {
            thread.status = ThreadStatus::Terminated;
            thread.outcome = Some(ThreadOutcome::Halted(status));
            thread.stack.clear();
        }
        self.run_queue.clear();
        self.timers.clear();
    }

    fn has_user_threads(&self) -> bool {
        self.threads.iter().any(|t| t.is_alive() && !t.daemon)
    }

    /// Runs threads round-robin, each for at most one quantum, until no
    /// progress is possible without the host or the program has ended.
    pub fn run(&mut self) -> RunOutcome {
        loop {
            if let Some(status) = self.halted {
                self.run_ended();
                return RunOutcome::Halted(status);
            }
            self.fire_timers();

            if !self.has_user_threads() {
                self.run_ended();
                return RunOutcome::Finished;
            }

            match self.run_queue.pop_front() {
                Some(id) => {
                    if self.thread_status(id) != Some(ThreadStatus::Runnable) {
                        continue;
                    }
                    let quantum = self.options.quantum.max(1);
                    let end = self.run_slice(id, quantum);
                    trace!("slice of thread {} ended: {:?}", id, end);
                    if matches!(end, SliceEnd::Preempted | SliceEnd::Suspended) && self.thread_status(id) == Some(ThreadStatus::Runnable)
                        && !self.run_queue.contains(&id) {
                        self.run_queue.push_back(id);
                    }
                }
                None if self.threads.iter().any(|t| t.status.awaits_host()) => return RunOutcome::Idle,
                None => match self.timers.next_deadline() {
                    Some(deadline) => self.clock.sleep_until(deadline),
                    None => {
                        for thread in self.threads.iter().filter(|t| t.is_alive()) {
                            warn!("thread {} ({}) stuck: {:?}", thread.id, thread.name, thread.status);
                        }
                        return RunOutcome::Deadlocked;
                    }
                },
            }
        }
    }

    fn run_ended(&self) {
        #[cfg(feature = "statistics")]
        self.report_statistics();
    }
}
