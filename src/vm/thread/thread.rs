use std::fmt::{Display, Formatter};
use crate::vm::class::class::ClassId;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::thread::frame::{CallStack, EntryTask};
use crate::vm::value::{ObjectRef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl Display for ThreadId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Holds or waits for the execution token.
    Runnable,
    /// Contending for a monitor owned by another thread.
    Blocked(ObjectRef),
    /// In `Object.wait`; `count` is the recursion depth to restore on reacquire.
    Waiting { monitor: ObjectRef, count: u32, timed: bool },
    Sleeping,
    Parked { timed: bool },
    /// A class it needs is being fetched by the host.
    AwaitingClass,
    /// Another thread is running the static initializer of this class.
    AwaitingInit(ClassId),
    /// A native call waits for the host to complete a ticket.
    AwaitingHost(u64),
    Terminated,
}

impl ThreadStatus {
    pub fn is_alive(&self) -> bool {
        *self != ThreadStatus::Terminated
    }

    /// States that only the host can end.
    pub fn awaits_host(&self) -> bool {
        matches!(self, ThreadStatus::AwaitingClass | ThreadStatus::AwaitingHost(_))
    }
}

/// How a suspended thread continues once woken. `Retry` re-executes the
/// instruction at the current pc.
#[derive(Debug, Clone)]
pub enum Resume {
    Retry,
    /// Completes the pending invocation with this result.
    Return(Option<Value>),
    Throw(Throwable),
    /// Re-enters `monitor` with the given recursion count, then continues with `then`.
    Reacquire { monitor: ObjectRef, count: u32, then: Box<Resume> },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ThreadOutcome {
    Returned(Option<Value>),
    Uncaught(ObjectRef),
    Halted(i32),
    /// The VM could not continue the thread, e.g. an exception class was missing.
    Aborted(String),
}

#[derive(Debug)]
pub struct VMThread {
    pub id: ThreadId,
    pub name: String,
    pub status: ThreadStatus,
    pub(crate) stack: CallStack,
    pub interrupted: bool,
    pub(crate) permit: bool,
    pub(crate) resume: Option<Resume>,
    /// Monitor of a synchronized native that suspended; released when it completes.
    pub(crate) native_lock: Option<ObjectRef>,
    /// Bumped on every wake so that timeouts armed for an earlier wait are ignored.
    pub(crate) wake_generation: u64,
    pub java_object: Option<ObjectRef>,
    pub daemon: bool,
    pub outcome: Option<ThreadOutcome>,
}

impl VMThread {
    pub fn new(id: ThreadId, name: String, task: EntryTask) -> Self {
        VMThread {
            id,
            name,
            status: ThreadStatus::Runnable,
            stack: CallStack::new(task),
            interrupted: false,
            permit: false,
            resume: None,
            native_lock: None,
            wake_generation: 0,
            java_object: None,
            daemon: false,
            outcome: None,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.depth()
    }
}
