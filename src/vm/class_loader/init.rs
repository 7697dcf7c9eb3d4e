use log::debug;
use crate::vm::class::class::{ClassId, ClassState};
use crate::vm::class::constant_pool::Loadable;
use crate::vm::class_loader::Lookup;
use crate::vm::error::LinkError;
use crate::vm::interpreter::Step;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::thread::frame::{Frame, InitPhase, InternalFrame, StackEntry};
use crate::vm::thread::thread::{ThreadId, ThreadStatus};
use crate::vm::value::Value;
use crate::vm::vm::Vm;

/// Whether a class may be used by a thread right now.
#[derive(Debug)]
pub(crate) enum InitCheck {
    Ready,
    /// The thread now owns the initialization and must run it before retrying.
    Run,
    /// The thread was suspended: the class is still being fetched, or another
    /// thread is initializing it.
    Wait,
    Failed(Throwable),
}

impl Vm {
    /// Resolves `class` and claims its initialization for `thread` if nobody has
    /// started it. The initializing thread itself sees the class as ready, so
    /// recursive requests do not run `<clinit>` again.
    pub(crate) fn begin_init(&mut self, thread: ThreadId, class: ClassId) -> InitCheck {
        match self.loader.resolve(class, Some(thread)) {
            Lookup::Ready(_) => {}
            Lookup::Pending => {
                self.set_status(thread, ThreadStatus::AwaitingClass);
                return InitCheck::Wait;
            }
            Lookup::Failed(e) => return InitCheck::Failed(Throwable::Link(e)),
        }

        let class = self.loader.class(class).clone();
        match class.state() {
            ClassState::Initialized => InitCheck::Ready,
            ClassState::Initializing(owner) if owner == thread => InitCheck::Ready,
            ClassState::Initializing(owner) => {
                debug!("thread {} waits for thread {} to initialize {}", thread, owner, class.name);
                class.init_waiters.borrow_mut().push(thread);
                self.set_status(thread, ThreadStatus::AwaitingInit(class.id));
                InitCheck::Wait
            }
            ClassState::Erroneous => InitCheck::Failed(Throwable::new(
                "java/lang/NoClassDefFoundError",
                format!("Could not initialize class {}", class.java_name()))),
            ClassState::Loaded | ClassState::Resolved => {
                debug!("thread {} initializes {}", thread, class.name);
                class.set_state(ClassState::Initializing(thread));
                InitCheck::Run
            }
        }
    }

    pub(crate) fn push_class_init(&mut self, thread: ThreadId, class: ClassId) {
        if let Some(thread) = self.thread_mut(thread) {
            thread.stack.push(StackEntry::Internal(InternalFrame::ClassInit { class, phase: InitPhase::Super }));
        }
    }

    /// One step of the initialization entry on top of the stack: superclass
    /// first, then constant fields, then `<clinit>`.
    pub(crate) fn step_class_init(&mut self, thread: ThreadId, id: ClassId, phase: InitPhase) -> Step {
        if phase == InitPhase::Running {
            self.pop_entry(thread);
            self.finish_init(id);
            return Step::Continue;
        }

        let class = self.loader.class(id).clone();
        if let Some(superclass) = class.superclass().filter(|_| !class.is_interface()) {
            match self.begin_init(thread, superclass) {
                InitCheck::Ready => {}
                InitCheck::Run => {
                    self.push_class_init(thread, superclass);
                    return Step::Continue;
                }
                InitCheck::Wait => return Step::Suspended,
                InitCheck::Failed(throwable) => return self.unwind(thread, throwable),
            }
        }

        match self.seed_constants(thread, id) {
            Lookup::Ready(()) => {}
            Lookup::Pending => {
                self.set_status(thread, ThreadStatus::AwaitingClass);
                return Step::Suspended;
            }
            Lookup::Failed(e) => return self.unwind(thread, Throwable::Link(e)),
        }

        match class.find_method("<clinit>", "()V") {
            Some(clinit) => {
                if let Some(thread) = self.thread_mut(thread) {
                    if let Some(StackEntry::Internal(InternalFrame::ClassInit { phase, .. })) = thread.stack.top_mut() {
                        *phase = InitPhase::Running;
                    }
                    thread.stack.push_frame(Frame::new(clinit, &[]));
                }
            }
            None => {
                self.pop_entry(thread);
                self.finish_init(id);
            }
        }
        Step::Continue
    }

    /// Stores the `ConstantValue` of every static field that has one.
    fn seed_constants(&mut self, thread: ThreadId, id: ClassId) -> Lookup<()> {
        let class = self.loader.class(id).clone();
        let data = match class.data() {
            Some(data) => data,
            None => return Lookup::Ready(()),
        };

        for (slot, field) in data.fields.iter().enumerate() {
            let index = match field.constant_value {
                Some(index) if field.is_static() => index,
                _ => continue,
            };
            let constant = match data.pool.loadable(index) {
                Ok(constant) => constant,
                Err(e) => return Lookup::Failed(LinkError::from_parse(&class.name, e)),
            };

            let value = match constant {
                Loadable::Int(v) => Value::Int(v).narrow_to(&field.ty),
                Loadable::Float(v) => Value::Float(v),
                Loadable::Long(v) => Value::Long(v),
                Loadable::Double(v) => Value::Double(v),
                Loadable::String(text) => match self.intern(Some(thread), &text) {
                    Lookup::Ready(string) => Value::Ref(Some(string)),
                    Lookup::Pending => return Lookup::Pending,
                    Lookup::Failed(e) => return Lookup::Failed(e),
                },
                Loadable::Class(_) => continue,
            };
            if let Some(static_slot) = data.statics_mut().get_mut(slot) {
                *static_slot = value;
            }
        }
        Lookup::Ready(())
    }

    fn pop_entry(&mut self, thread: ThreadId) {
        if let Some(thread) = self.thread_mut(thread) {
            thread.stack.pop();
        }
    }

    pub(crate) fn finish_init(&mut self, id: ClassId) {
        let class = self.loader.class(id).clone();
        class.set_state(ClassState::Initialized);
        debug!("initialized {}", class.name);
        let waiters: Vec<ThreadId> = class.init_waiters.borrow_mut().drain(..).collect();
        for waiter in waiters {
            self.wake(waiter, None);
        }
    }
}
