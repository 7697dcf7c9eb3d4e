use log::trace;
use crate::vm::class::class::ClassId;
use crate::vm::class::method::Method;
use crate::vm::class_loader::init::InitCheck;
use crate::vm::class_loader::Lookup;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::thread::frame::{EntryTask, Frame, InternalFrame, StackEntry};
use crate::vm::thread::thread::{Resume, ThreadId, ThreadOutcome, ThreadStatus};
use crate::vm::value::Value;
use crate::vm::vm::Vm;
use std::rc::Rc;

pub mod decode;
pub mod exec;
pub mod invoke;
pub mod unwind;

#[cfg(test)]
mod tests;

/// How an instruction hands control back to the dispatch loop.
#[derive(Debug)]
pub(crate) enum Flow {
    Next,
    Jump(u32),
    /// Run this frame on top of the current one; the caller's pc stays on the
    /// invoke until the callee returns.
    Call(Frame),
    /// Initialize the class, then execute the instruction again.
    Init(ClassId),
    Return(Option<Value>),
    Throw(Throwable),
    /// The thread was suspended with its pc unchanged.
    Suspend,
    Halt(i32),
}

/// Instruction handlers return `Err` for anything but falling through or jumping,
/// so that `?` can carry suspension and exceptions out of helpers.
pub(crate) type Exec = Result<Flow, Flow>;

/// Result of one scheduling step of a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Suspended,
    Terminated,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceEnd {
    /// The quantum ran out or the thread yielded.
    Preempted,
    Suspended,
    Terminated,
    Halted,
}

impl Vm {
    /// Runs `thread` for at most `budget` steps.
    pub(crate) fn run_slice(&mut self, thread: ThreadId, budget: usize) -> SliceEnd {
        self.yielded = false;
        if let Some(resume) = self.thread_mut(thread).and_then(|t| t.resume.take()) {
            trace!("thread {} resumes with {:?}", thread, resume);
            match self.apply_resume(thread, resume) {
                Step::Continue => {}
                step => return Self::slice_end(step),
            }
        }

        for _ in 0..budget {
            match self.step(thread) {
                Step::Continue => {}
                step => return Self::slice_end(step),
            }
            if self.thread_status(thread) != Some(ThreadStatus::Runnable) {
                return SliceEnd::Suspended;
            }
            if self.yielded {
                break;
            }
        }
        SliceEnd::Preempted
    }

    fn slice_end(step: Step) -> SliceEnd {
        match step {
            Step::Continue => SliceEnd::Preempted,
            Step::Suspended => SliceEnd::Suspended,
            Step::Terminated => SliceEnd::Terminated,
            Step::Halted => SliceEnd::Halted,
        }
    }

    fn apply_resume(&mut self, thread: ThreadId, resume: Resume) -> Step {
        match resume {
            Resume::Retry => Step::Continue,
            Resume::Return(value) => {
                self.release_native_lock(thread);
                self.complete_invoke(thread, value);
                Step::Continue
            }
            Resume::Throw(throwable) => {
                self.release_native_lock(thread);
                self.unwind(thread, throwable)
            }
            Resume::Reacquire { monitor, count, then } => {
                if self.monitors.try_enter(thread, monitor, count) {
                    return self.apply_resume(thread, *then);
                }
                self.monitors.add_blocked(thread, monitor);
                self.set_status(thread, ThreadStatus::Blocked(monitor));
                self.set_resume(thread, Resume::Reacquire { monitor, count, then });
                Step::Suspended
            }
        }
    }

    /// Finishes the invoke the innermost frame is stopped at: pushes the result
    /// and moves past the instruction.
    fn complete_invoke(&mut self, thread: ThreadId, value: Option<Value>) {
        if let Some(frame) = self.thread_mut(thread).and_then(|t| t.stack.frame()) {
            if let Some(value) = value {
                frame.push(value);
            }
            let method = frame.method.clone();
            if let Some(instr) = method.code.as_ref().and_then(|c| c.at(frame.pc)) {
                frame.pc = instr.next_pc();
            }
        }
    }

    fn push_frame(&mut self, thread: ThreadId, frame: Frame) {
        if let Some(thread) = self.thread_mut(thread) {
            thread.stack.push_frame(frame);
        }
    }

    pub(crate) fn stack_depth(&self, thread: ThreadId) -> usize {
        self.thread(thread).map_or(0, |t| t.stack_depth())
    }

    fn step(&mut self, thread: ThreadId) -> Step {
        let entry = match self.thread(thread).and_then(|t| t.stack.top()) {
            Some(StackEntry::Frame(_)) => return self.step_frame(thread),
            Some(StackEntry::Internal(InternalFrame::ClassInit { class, phase })) => {
                let (class, phase) = (*class, *phase);
                return self.step_class_init(thread, class, phase);
            }
            Some(StackEntry::Internal(InternalFrame::Entry { task, invoked: false })) => task.clone(),
            Some(StackEntry::Internal(InternalFrame::Entry { invoked: true, .. })) => {
                self.finish_thread(thread, ThreadOutcome::Returned(None));
                return Step::Terminated;
            }
            None => return Step::Terminated,
        };
        self.step_entry(thread, entry)
    }

    /// Executes the instruction at the pc of the innermost frame. The frame is
    /// off the stack while its instruction runs.
    fn step_frame(&mut self, thread: ThreadId) -> Step {
        let mut frame = match self.thread_mut(thread).and_then(|t| t.stack.pop()) {
            Some(StackEntry::Frame(frame)) => frame,
            Some(other) => {
                if let Some(t) = self.thread_mut(thread) {
                    t.stack.push(other);
                }
                return Step::Continue;
            }
            None => return Step::Terminated,
        };

        let method = frame.method.clone();
        let instr = match method.code.as_ref().and_then(|c| c.at(frame.pc)) {
            Some(instr) => instr,
            None => {
                let message = format!("no instruction at pc {} of {:?}", frame.pc, method);
                self.push_frame(thread, frame);
                return self.unwind(thread, Throwable::new("java/lang/InternalError", message));
            }
        };
        trace!("{} {:?}@{} {}", thread, method, instr.pc, instr.opcode);
        #[cfg(feature = "statistics")]
        {
            self.opcode_counts[instr.opcode as usize] += 1;
        }

        let flow = self.execute(thread, &mut frame, instr).unwrap_or_else(|flow| flow);
        match flow {
            Flow::Next => {
                frame.pc = instr.next_pc();
                self.push_frame(thread, frame);
                Step::Continue
            }
            Flow::Jump(target) => {
                frame.pc = target;
                self.push_frame(thread, frame);
                Step::Continue
            }
            Flow::Call(callee) => {
                self.push_frame(thread, frame);
                self.push_frame(thread, callee);
                Step::Continue
            }
            Flow::Init(class) => {
                self.push_frame(thread, frame);
                self.push_class_init(thread, class);
                Step::Continue
            }
            Flow::Return(value) => {
                if let Some(lock) = frame.lock {
                    let _ = self.monitor_exit(thread, lock);
                }
                self.deliver_return(thread, value)
            }
            Flow::Throw(throwable) => {
                self.push_frame(thread, frame);
                self.unwind(thread, throwable)
            }
            Flow::Suspend => {
                self.push_frame(thread, frame);
                Step::Suspended
            }
            Flow::Halt(status) => {
                self.halt(status);
                Step::Halted
            }
        }
    }

    fn deliver_return(&mut self, thread: ThreadId, value: Option<Value>) -> Step {
        match self.thread(thread).and_then(|t| t.stack.top()) {
            Some(StackEntry::Frame(_)) => {
                self.complete_invoke(thread, value);
                Step::Continue
            }
            Some(StackEntry::Internal(InternalFrame::ClassInit { .. })) => Step::Continue,
            Some(StackEntry::Internal(InternalFrame::Entry { .. })) | None => {
                self.finish_thread(thread, ThreadOutcome::Returned(value));
                Step::Terminated
            }
        }
    }

    /// Starts the method a thread was created for.
    fn step_entry(&mut self, thread: ThreadId, task: EntryTask) -> Step {
        let (method, args) = match task {
            EntryTask::Main { class, args } => {
                let method = match self.entry_method(thread, &class, "main", "([Ljava/lang/String;)V") {
                    Ok(method) => method,
                    Err(step) => return step,
                };
                let array = match self.string_array(thread, &args) {
                    Lookup::Ready(array) => array,
                    Lookup::Pending => {
                        self.set_status(thread, ThreadStatus::AwaitingClass);
                        return Step::Suspended;
                    }
                    Lookup::Failed(e) => return self.unwind(thread, e.into()),
                };
                (method, vec![Value::Ref(Some(array))])
            }
            EntryTask::Invoke { class, name, descriptor, args } => {
                match self.entry_method(thread, &class, &name, &descriptor) {
                    Ok(method) => (method, args),
                    Err(step) => return step,
                }
            }
            EntryTask::Run { thread: object } => {
                let class = self.heap.class_of(object);
                let method = self.loader.resolve_method(class, "run", "()V")
                    .and_then(|m| self.loader.select_method(class, &m));
                match method {
                    Ok(method) => (method, vec![Value::Ref(Some(object))]),
                    Err(e) => return self.unwind(thread, e.into()),
                }
            }
        };

        if method.code.is_none() {
            let message = format!("{:?} has no bytecode", method);
            return self.unwind(thread, Throwable::new("java/lang/UnsatisfiedLinkError", message));
        }
        if let Some(t) = self.thread_mut(thread) {
            if let Some(StackEntry::Internal(InternalFrame::Entry { invoked, .. })) = t.stack.top_mut() {
                *invoked = true;
            }
            t.stack.push_frame(Frame::new(method, &args));
        }
        Step::Continue
    }

    /// Loads and initializes `class` and finds the static method a thread starts in.
    fn entry_method(&mut self, thread: ThreadId, class: &str, name: &str, descriptor: &str)
                    -> Result<Rc<Method>, Step> {
        let class = match self.loader.load_resolved(class, Some(thread)) {
            Lookup::Ready(class) => class,
            Lookup::Pending => {
                self.set_status(thread, ThreadStatus::AwaitingClass);
                return Err(Step::Suspended);
            }
            Lookup::Failed(e) => return Err(self.unwind(thread, e.into())),
        };

        match self.begin_init(thread, class) {
            InitCheck::Ready => {}
            InitCheck::Run => {
                self.push_class_init(thread, class);
                return Err(Step::Continue);
            }
            InitCheck::Wait => return Err(Step::Suspended),
            InitCheck::Failed(throwable) => return Err(self.unwind(thread, throwable)),
        }

        match self.loader.class(class).find_method(name, descriptor) {
            Some(method) if method.is_static() => Ok(method),
            _ => {
                let message = format!("{}.{}{}", self.loader.class(class).java_name(), name, descriptor);
                Err(self.unwind(thread, Throwable::new("java/lang/NoSuchMethodError", message)))
            }
        }
    }

    fn string_array(&mut self, thread: ThreadId, args: &[String]) -> Lookup<crate::vm::value::ObjectRef> {
        use crate::vm::object::ArrayData;

        let array_class = crate::ready!(self.loader.load("[Ljava/lang/String;", Some(thread)));
        let mut strings = Vec::with_capacity(args.len());
        for arg in args {
            strings.push(Some(crate::ready!(self.new_string(Some(thread), arg))));
        }
        Lookup::Ready(self.heap.alloc_array(array_class, ArrayData::Ref(strings)))
    }
}
