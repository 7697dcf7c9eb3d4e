use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use log::{debug, info, warn};
use crate::helper::to_internal_name;
use crate::ready;
use crate::vm::class::class::{Class, ClassId};
use crate::vm::class_loader::bootstrap::{runtime_classes, STRING};
use crate::vm::class_loader::source::{ClassRequest, ClassSource, RequestToken};
use crate::vm::class_loader::{ClassLoader, Lookup};
use crate::vm::config::{ClockKind, VmOptions};
use crate::vm::error::VmError;
use crate::vm::host::{HostIo, HostReply};
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::native::NativeRegistry;
use crate::vm::natives;
use crate::vm::object::{ArrayData, Body, Heap};
use crate::vm::thread::frame::EntryTask;
use crate::vm::thread::monitor::MonitorTable;
use crate::vm::thread::thread::{Resume, ThreadId, ThreadOutcome, ThreadStatus, VMThread};
use crate::vm::thread::timer::{Clock, SystemClock, TimerQueue};
use crate::vm::value::{ObjectRef, Value};

/// One virtual machine: its classes, heap, threads and the host it talks to.
/// Nothing is shared between instances.
pub struct Vm {
    pub(crate) options: VmOptions,
    pub(crate) loader: ClassLoader,
    pub(crate) heap: Heap,
    pub(crate) threads: Vec<VMThread>,
    pub(crate) run_queue: VecDeque<ThreadId>,
    pub(crate) monitors: MonitorTable,
    pub(crate) timers: TimerQueue,
    pub(crate) clock: Box<dyn Clock>,
    pub(crate) host: Box<dyn HostIo>,
    pub(crate) natives: NativeRegistry,
    strings: HashMap<String, ObjectRef>,
    /// `java.lang.Class` objects back to the class they stand for.
    mirrors: HashMap<ObjectRef, ClassId>,
    /// Stack trace lines recorded for throwables, innermost first.
    pub(crate) backtraces: HashMap<ObjectRef, Vec<String>>,
    host_tickets: HashMap<u64, ThreadId>,
    next_ticket: u64,
    pub(crate) halted: Option<i32>,
    /// Set by `Thread.yield`; ends the current slice early.
    pub(crate) yielded: bool,
    #[cfg(feature = "statistics")]
    pub(crate) opcode_counts: Vec<u64>,
}

impl Vm {
    pub fn new(source: Box<dyn ClassSource>, host: Box<dyn HostIo>, options: VmOptions) -> Self {
        let builtin = if options.builtin_runtime { runtime_classes() } else { HashMap::new() };
        let clock: Box<dyn Clock> = match &options.clock {
            ClockKind::System => Box::new(SystemClock::default()),
            ClockKind::Manual(clock) => Box::new(clock.clone()),
        };

        let mut registry = NativeRegistry::default();
        natives::register_core(&mut registry);

        Vm {
            options,
            loader: ClassLoader::new(source, Rc::new(builtin), 0),
            heap: Heap::default(),
            threads: vec![],
            run_queue: VecDeque::new(),
            monitors: MonitorTable::default(),
            timers: TimerQueue::default(),
            clock,
            host,
            natives: registry,
            strings: HashMap::new(),
            mirrors: HashMap::new(),
            backtraces: HashMap::new(),
            host_tickets: HashMap::new(),
            next_ticket: 1,
            halted: None,
            yielded: false,
            #[cfg(feature = "statistics")]
            opcode_counts: vec![0; 256],
        }
    }

    pub fn options(&self) -> &VmOptions {
        &self.options
    }

    pub fn loader(&self) -> &ClassLoader {
        &self.loader
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn class(&self, id: ClassId) -> &Rc<Class> {
        self.loader.class(id)
    }

    // Threads

    /// Creates a runnable thread. It first runs when the scheduler gets to it.
    pub fn spawn(&mut self, name: &str, task: EntryTask) -> ThreadId {
        let id = ThreadId(self.threads.len() as u32);
        info!("thread {} ({}) created for {:?}", id, name, task);
        self.threads.push(VMThread::new(id, name.to_string(), task));
        self.run_queue.push_back(id);
        id
    }

    /// Spawns the `main` thread running `class.main(args)`. The class may be
    /// given as `pkg.Main` or `pkg/Main`.
    pub fn spawn_main(&mut self, class: &str, args: Vec<String>) -> ThreadId {
        self.spawn("main", EntryTask::Main { class: to_internal_name(class), args })
    }

    /// Spawns a thread running a static method. `args` are in slot form.
    pub fn spawn_invoke(&mut self, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> ThreadId {
        self.spawn(name, EntryTask::Invoke {
            class: class.to_string(),
            name: name.to_string(),
            descriptor: descriptor.to_string(),
            args,
        })
    }

    pub fn thread_status(&self, id: ThreadId) -> Option<ThreadStatus> {
        self.thread(id).map(|t| t.status)
    }

    pub fn thread_outcome(&self, id: ThreadId) -> Option<&ThreadOutcome> {
        self.thread(id).and_then(|t| t.outcome.as_ref())
    }

    pub fn threads(&self) -> impl Iterator<Item = &VMThread> {
        self.threads.iter()
    }

    /// `Thread.interrupt` on behalf of the host.
    pub fn interrupt_thread(&mut self, id: ThreadId) -> Result<(), VmError> {
        self.thread(id).ok_or(VmError::NoSuchThread(id))?;
        self.interrupt(id);
        Ok(())
    }

    /// Loads and links `name` outside of any thread. A class the source only
    /// answers for later is reported as `ClassPending`.
    pub fn preload_class(&mut self, name: &str) -> Result<ClassId, VmError> {
        match self.loader.load_resolved(name, None) {
            Lookup::Ready(class) => Ok(class),
            Lookup::Pending => Err(VmError::ClassPending(name.to_string())),
            Lookup::Failed(e) => Err(e.into()),
        }
    }

    // Host boundary

    pub fn pending_class_requests(&self) -> Vec<ClassRequest> {
        self.loader.pending_requests()
    }

    /// Completes a class request the source answered with `Pending`. `None` means
    /// the class does not exist. Completions for an earlier cache generation are
    /// ignored.
    pub fn supply_class(&mut self, token: RequestToken, bytes: Option<Vec<u8>>) {
        for waiter in self.loader.supply(token, bytes) {
            if self.thread_status(waiter) == Some(ThreadStatus::AwaitingClass) {
                self.wake(waiter, None);
            }
        }
    }

    /// Suspends `thread` until the host completes the returned ticket. Natives
    /// that wait on the host call this and return `NativeResult::Suspend`.
    pub fn await_host(&mut self, thread: ThreadId) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.host_tickets.insert(ticket, thread);
        self.set_status(thread, ThreadStatus::AwaitingHost(ticket));
        ticket
    }

    pub fn pending_host_tickets(&self) -> Vec<(u64, ThreadId)> {
        let mut tickets: Vec<_> = self.host_tickets.iter().map(|(t, id)| (*t, *id)).collect();
        tickets.sort();
        tickets
    }

    pub fn complete_host(&mut self, ticket: u64, reply: HostReply) -> Result<(), VmError> {
        let thread = self.host_tickets.remove(&ticket).ok_or(VmError::UnknownTicket(ticket))?;
        if self.thread_status(thread) != Some(ThreadStatus::AwaitingHost(ticket)) {
            warn!("host ticket {} completed for thread {} that no longer waits on it", ticket, thread);
            return Ok(());
        }

        let resume = match reply {
            HostReply::Return(value) => Resume::Return(value),
            HostReply::Throw { class, message } => Resume::Throw(Throwable::New { class, message }),
        };
        self.wake(thread, Some(resume));
        Ok(())
    }

    /// Discards every class, object and thread and starts a new loader generation.
    /// Only allowed while no thread can run; threads waiting on the host are
    /// abandoned and their pending completions become no-ops.
    pub fn reset_class_cache(&mut self) -> Result<(), VmError> {
        let busy = self.threads.iter().any(|t| t.is_alive() && !t.status.awaits_host());
        if busy {
            return Err(VmError::Busy);
        }

        debug!("class cache reset, generation {} ends", self.loader.generation());
        self.loader.reset();
        self.heap.clear();
        self.threads.clear();
        self.run_queue.clear();
        self.monitors.clear();
        self.timers.clear();
        self.strings.clear();
        self.mirrors.clear();
        self.backtraces.clear();
        self.host_tickets.clear();
        self.halted = None;
        Ok(())
    }

    // Objects

    /// A fresh instance of a resolved class, every field zeroed.
    pub(crate) fn new_object(&mut self, class: ClassId) -> ObjectRef {
        let fields = self.loader.class(class).layout().map(|l| l.defaults()).unwrap_or_default();
        self.heap.alloc_instance(class, fields)
    }

    pub fn field_by_name(&self, object: ObjectRef, name: &str) -> Option<Value> {
        let obj = self.heap.try_get(object)?;
        let offset = self.loader.class(obj.class).layout()?.offset_by_name(name)?;
        Some(obj.field(offset))
    }

    pub(crate) fn set_field_by_name(&mut self, object: ObjectRef, name: &str, value: Value) {
        let class = self.heap.class_of(object);
        if let Some(offset) = self.loader.class(class).layout().and_then(|l| l.offset_by_name(name)) {
            self.heap.get_mut(object).set_field(offset, value);
        }
    }

    /// Value of a static field, for embedders and tests. `None` until the class
    /// is loaded.
    pub fn static_field(&self, class: &str, name: &str) -> Option<Value> {
        let class = self.loader.class(self.loader.lookup(class)?);
        let data = class.data()?;
        let index = data.fields.iter().position(|f| f.is_static() && f.name == name)?;
        data.statics().get(index).copied()
    }

    /// A new `java.lang.String`. Not interned.
    pub(crate) fn new_string(&mut self, waiter: Option<ThreadId>, text: &str) -> Lookup<ObjectRef> {
        let string_class = ready!(self.loader.load_resolved(STRING, waiter));
        let chars_class = ready!(self.loader.load("[C", waiter));

        let units: Vec<u16> = text.encode_utf16().collect();
        let chars = self.heap.alloc_array(chars_class, ArrayData::Char(units));
        let string = self.new_object(string_class);
        self.set_field_by_name(string, "value", Value::Ref(Some(chars)));
        Lookup::Ready(string)
    }

    /// The canonical string with this content.
    pub(crate) fn intern(&mut self, waiter: Option<ThreadId>, text: &str) -> Lookup<ObjectRef> {
        if let Some(string) = self.strings.get(text) {
            return Lookup::Ready(*string);
        }
        let string = ready!(self.new_string(waiter, text));
        self.strings.insert(text.to_string(), string);
        Lookup::Ready(string)
    }

    /// Interns an existing string object.
    pub(crate) fn intern_object(&mut self, string: ObjectRef) -> ObjectRef {
        match self.string_value(string) {
            Some(text) => *self.strings.entry(text).or_insert(string),
            None => string,
        }
    }

    /// Content of a `java.lang.String`.
    pub fn string_value(&self, string: ObjectRef) -> Option<String> {
        match self.field_by_name(string, "value")? {
            Value::Ref(Some(chars)) => self.heap.chars_to_string(chars),
            _ => None,
        }
    }

    /// The `java.lang.Class` object of `class`, created on first use.
    pub(crate) fn mirror_of(&mut self, waiter: Option<ThreadId>, class: ClassId) -> Lookup<ObjectRef> {
        if let Some(mirror) = self.loader.class(class).mirror() {
            return Lookup::Ready(mirror);
        }

        let class_class = ready!(self.loader.load_resolved("java/lang/Class", waiter));
        let mirror = self.new_object(class_class);
        self.loader.class(class).set_mirror(mirror);
        self.mirrors.insert(mirror, class);
        Lookup::Ready(mirror)
    }

    pub(crate) fn class_of_mirror(&self, mirror: ObjectRef) -> Option<ClassId> {
        self.mirrors.get(&mirror).copied()
    }

    pub(crate) fn is_array_object(&self, object: ObjectRef) -> bool {
        matches!(self.heap.get(object).body, Body::Array(_))
    }

    /// `Object.hashCode` of an object that does not override it.
    pub(crate) fn identity_hash(&self, object: ObjectRef) -> i32 {
        // spread consecutive ids over the int range
        (object.id().wrapping_mul(0x9E37_79B9) >> 1) as i32
    }

    /// `Object.toString` of an object that does not override it.
    pub(crate) fn default_to_string(&self, object: ObjectRef) -> String {
        let class = self.loader.class(self.heap.class_of(object));
        format!("{}@{:x}", class.java_name(), self.identity_hash(object))
    }

    #[cfg(feature = "statistics")]
    pub(crate) fn report_statistics(&self) {
        use crate::vm::instructions::Instruction;

        let mut counts: Vec<(u64, String)> = self.opcode_counts.iter().enumerate()
            .filter(|(_, count)| **count > 0)
            .filter_map(|(op, count)| Instruction::try_from(op as u8).ok().map(|i| (*count, i.to_string())))
            .collect();
        counts.sort_by(|a, b| b.0.cmp(&a.0));
        for (count, name) in counts {
            info!("{:>14} {}", name, count);
        }
    }
}
