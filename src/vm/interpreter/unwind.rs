use log::{debug, warn};
use crate::ready;
use crate::vm::class::class::{ClassId, ClassState};
use crate::vm::class_loader::bootstrap::THROWABLE;
use crate::vm::class_loader::Lookup;
use crate::vm::error::LinkError;
use crate::vm::interpreter::Step;
use crate::vm::thread::frame::{InternalFrame, StackEntry};
use crate::vm::thread::thread::{Resume, ThreadId, ThreadOutcome, ThreadStatus};
use crate::vm::value::{ObjectRef, Value};
use crate::vm::vm::Vm;

const ERROR: &str = "java/lang/Error";
const INITIALIZER_ERROR: &str = "java/lang/ExceptionInInitializerError";

/// An exception in flight. Exceptions raised by the VM itself are only turned
/// into objects when unwinding starts, since that may need classes loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Throwable {
    Object(ObjectRef),
    New { class: String, message: Option<String> },
    Link(LinkError),
    /// `ExceptionInInitializerError` wrapping what escaped a static initializer.
    InitializerError(ObjectRef),
}

impl Throwable {
    pub fn new(class: &str, message: impl Into<String>) -> Self {
        Throwable::New { class: class.to_string(), message: Some(message.into()) }
    }

    pub fn bare(class: &str) -> Self {
        Throwable::New { class: class.to_string(), message: None }
    }
}

impl From<LinkError> for Throwable {
    fn from(e: LinkError) -> Self {
        Throwable::Link(e)
    }
}

enum Handler {
    Found(u32),
    None,
    Pending,
}

impl Vm {
    /// The exception object for `throwable`, allocated without running a
    /// constructor.
    pub(crate) fn materialize(&mut self, thread: ThreadId, throwable: &Throwable) -> Lookup<ObjectRef> {
        let (class, message, cause) = match throwable {
            Throwable::Object(object) => return Lookup::Ready(*object),
            Throwable::New { class, message } => (class.as_str(), message.clone(), None),
            Throwable::Link(e) => (e.java_class(), Some(e.to_string()), None),
            Throwable::InitializerError(cause) => (INITIALIZER_ERROR, None, Some(*cause)),
        };

        let class = ready!(self.loader.load_resolved(class, Some(thread)));
        let message = match message {
            Some(text) => Some(ready!(self.new_string(Some(thread), &text))),
            None => None,
        };

        let exception = self.new_object(class);
        self.set_field_by_name(exception, "detailMessage", Value::Ref(message));
        self.set_field_by_name(exception, "cause", Value::Ref(cause));
        let trace = self.backtrace(thread);
        self.backtraces.insert(exception, trace);
        Lookup::Ready(exception)
    }

    /// Stack trace lines of `thread`, innermost first, leaving out the frames
    /// that are constructing a throwable.
    pub(crate) fn backtrace(&self, thread: ThreadId) -> Vec<String> {
        let thread = match self.thread(thread) {
            Some(thread) => thread,
            None => return vec![],
        };

        thread.stack.frames()
            .skip_while(|f| f.method.is_instance_init() || f.method.name == "fillInStackTrace")
            .map(|frame| {
                let class = self.loader.class(frame.class);
                let source = class.data()
                    .and_then(|d| d.source_file.clone())
                    .unwrap_or_else(|| "Unknown Source".to_string());
                format!("{}.{}({})", class.java_name(), frame.method.name, source)
            })
            .collect()
    }

    fn is_error(&self, class: ClassId) -> bool {
        self.loader.superclasses(class).any(|c| self.loader.class(c).name == ERROR)
    }

    /// Searches the handler table of the innermost frame for one covering its pc
    /// that catches `exception`.
    fn find_handler(&mut self, thread: ThreadId, exception: ObjectRef) -> Handler {
        let (method, pc) = match self.thread_mut(thread).and_then(|t| t.stack.frame()) {
            Some(frame) => (frame.method.clone(), frame.pc),
            None => return Handler::None,
        };
        let code = match &method.code {
            Some(code) => code,
            None => return Handler::None,
        };

        let thrown = self.heap.class_of(exception);
        for handler in code.handlers.iter().filter(|h| h.covers(pc)) {
            let catch_type = match &handler.catch_type {
                None => return Handler::Found(handler.handler_pc),
                Some(name) => name,
            };
            match self.loader.load_resolved(catch_type, Some(thread)) {
                Lookup::Ready(class) if self.loader.is_assignable(thrown, class) =>
                    return Handler::Found(handler.handler_pc),
                Lookup::Ready(_) => {}
                Lookup::Pending => return Handler::Pending,
                // an unloadable catch type catches nothing
                Lookup::Failed(e) => debug!("catch type {} unavailable: {}", catch_type, e),
            }
        }
        Handler::None
    }

    /// Walks the stack of `thread` outward until a handler takes `throwable`.
    /// Frames without one are popped, releasing their monitors; a static
    /// initializer left this way marks its class erroneous.
    pub(crate) fn unwind(&mut self, thread: ThreadId, throwable: Throwable) -> Step {
        let mut throwable = throwable;
        loop {
            let exception = match self.materialize(thread, &throwable) {
                Lookup::Ready(exception) => exception,
                Lookup::Pending => {
                    self.set_resume(thread, Resume::Throw(throwable));
                    self.set_status(thread, ThreadStatus::AwaitingClass);
                    return Step::Suspended;
                }
                Lookup::Failed(e) => {
                    warn!("thread {} cannot raise {:?}: {}", thread, throwable, e);
                    self.finish_thread(thread, ThreadOutcome::Aborted(format!("cannot raise {:?}: {}", throwable, e)));
                    return Step::Terminated;
                }
            };
            throwable = Throwable::Object(exception);

            let top_is_frame = match self.thread(thread).and_then(|t| t.stack.top()) {
                Some(StackEntry::Frame(_)) => true,
                Some(StackEntry::Internal(_)) => false,
                None => return Step::Terminated,
            };

            if top_is_frame {
                match self.find_handler(thread, exception) {
                    Handler::Found(handler_pc) => {
                        if let Some(frame) = self.thread_mut(thread).and_then(|t| t.stack.frame()) {
                            debug!("{:?} caught in {:?} at {}", exception, frame.method, handler_pc);
                            frame.clear_stack();
                            frame.push(Value::Ref(Some(exception)));
                            frame.pc = handler_pc;
                        }
                        return Step::Continue;
                    }
                    Handler::Pending => {
                        self.set_resume(thread, Resume::Throw(throwable));
                        self.set_status(thread, ThreadStatus::AwaitingClass);
                        return Step::Suspended;
                    }
                    Handler::None => {
                        if let Some(StackEntry::Frame(frame)) = self.thread_mut(thread).and_then(|t| t.stack.pop()) {
                            if let Some(lock) = frame.lock {
                                let _ = self.monitor_exit(thread, lock);
                            }
                        }
                    }
                }
                continue;
            }

            match self.thread_mut(thread).and_then(|t| t.stack.pop()) {
                Some(StackEntry::Internal(InternalFrame::ClassInit { class, .. })) => {
                    self.fail_init(class);
                    let thrown = self.heap.class_of(exception);
                    if !self.is_error(thrown) {
                        throwable = Throwable::InitializerError(exception);
                    }
                }
                Some(StackEntry::Internal(InternalFrame::Entry { .. })) | None => {
                    self.report_uncaught(thread, exception);
                    self.finish_thread(thread, ThreadOutcome::Uncaught(exception));
                    return Step::Terminated;
                }
                Some(StackEntry::Frame(_)) => {}
            }
        }
    }

    /// `<class>: <message>` the way `Throwable.toString` prints it.
    pub(crate) fn describe_throwable(&self, exception: ObjectRef) -> String {
        let class = self.loader.class(self.heap.class_of(exception)).java_name();
        let message = match self.field_by_name(exception, "detailMessage") {
            Some(Value::Ref(Some(message))) => self.string_value(message),
            _ => None,
        };
        match message {
            Some(message) => format!("{}: {}", class, message),
            None => class,
        }
    }

    /// The stack trace as `printStackTrace` writes it, causes included.
    pub(crate) fn format_stack_trace(&self, exception: ObjectRef) -> String {
        let mut out = String::new();
        let mut current = Some(exception);
        let mut seen = vec![];
        while let Some(exception) = current {
            if seen.contains(&exception) {
                break;
            }
            seen.push(exception);

            if seen.len() > 1 {
                out.push_str("Caused by: ");
            }
            out.push_str(&self.describe_throwable(exception));
            out.push('\n');
            for line in self.backtraces.get(&exception).into_iter().flatten() {
                out.push_str("\tat ");
                out.push_str(line);
                out.push('\n');
            }
            current = match self.field_by_name(exception, "cause") {
                Some(Value::Ref(cause)) => cause,
                _ => None,
            };
        }
        out
    }

    fn report_uncaught(&mut self, thread: ThreadId, exception: ObjectRef) {
        let name = self.thread(thread).map(|t| t.name.clone()).unwrap_or_default();
        let text = format!("Exception in thread \"{}\" {}", name, self.format_stack_trace(exception));
        warn!("uncaught exception in thread {}: {}", thread, self.describe_throwable(exception));
        self.host.write_stderr(text.as_bytes());
    }

    /// Marks a class whose initializer failed and releases threads waiting for it.
    pub(crate) fn fail_init(&mut self, class: ClassId) {
        let class = self.loader.class(class).clone();
        debug!("initialization of {} failed", class.name);
        class.set_state(ClassState::Erroneous);
        let waiters: Vec<ThreadId> = class.init_waiters.borrow_mut().drain(..).collect();
        for waiter in waiters {
            self.wake(waiter, None);
        }
    }

    pub(crate) fn is_throwable_class(&self, class: ClassId) -> bool {
        self.loader.superclasses(class).any(|c| self.loader.class(c).name == THROWABLE)
    }
}
