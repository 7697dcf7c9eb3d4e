use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use smallvec::SmallVec;
use crate::vm::class::class::ClassId;
use crate::vm::class::method::Method;
use crate::vm::value::{ObjectRef, Value};

pub type Args = SmallVec<[Value; 8]>;

/// Activation of a bytecode method. Locals and the operand stack share one array,
/// locals first. Longs and doubles take two slots in both.
pub struct Frame {
    pub method: Rc<Method>,
    pub class: ClassId,
    pub pc: u32,
    /// Monitor entered on behalf of a synchronized method.
    pub lock: Option<ObjectRef>,
    local_array_size: usize,
    data: Vec<Value>,
}

impl Debug for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}@{} [(", self.method, self.pc)?;
        for value in &self.data[..self.local_array_size] {
            write!(f, "{}, ", value)?;
        }
        write!(f, ") op: (")?;
        for value in &self.data[self.local_array_size..] {
            write!(f, "{}, ", value)?;
        }
        write!(f, ")]")
    }
}

impl Frame {
    /// `args` are in slot form and become the first locals.
    pub fn new(method: Rc<Method>, args: &[Value]) -> Self {
        let (max_locals, max_stack) = method.code.as_ref()
            .map(|c| (c.max_locals, c.max_stack))
            .unwrap_or((0, 0));
        let local_array_size = max_locals.max(args.len());

        let mut data = Vec::with_capacity(local_array_size + max_stack);
        data.extend_from_slice(args);
        data.resize(local_array_size, Value::Top);

        Frame {
            class: method.class,
            method,
            pc: 0,
            lock: None,
            local_array_size,
            data,
        }
    }

    // Local array
    pub fn get(&self, index: usize) -> Value {
        self.data[..self.local_array_size].get(index).copied().unwrap_or(Value::Top)
    }

    pub fn set(&mut self, index: usize, value: Value) {
        if index < self.local_array_size {
            self.data[index] = value;
        }
        if value.is_wide() && index + 1 < self.local_array_size {
            self.data[index + 1] = Value::Top;
        }
    }

    // Operand stack
    /// Pushes a value, padding wide ones with a second slot.
    pub fn push(&mut self, value: Value) {
        self.data.push(value);
        if value.is_wide() {
            self.data.push(Value::Top);
        }
    }

    /// Pushes one raw slot, as the category-agnostic `dup`/`swap` family does.
    pub fn push_slot(&mut self, value: Value) {
        self.data.push(value);
    }

    pub fn pop_slot(&mut self) -> Value {
        if self.data.len() > self.local_array_size {
            self.data.pop().unwrap_or(Value::Top)
        } else {
            Value::Top
        }
    }

    /// Pops one value; a wide value comes off with its padding slot.
    pub fn pop(&mut self) -> Value {
        match self.pop_slot() {
            Value::Top if self.stack_depth() > 0 && self.peek_nth(0).is_wide() => self.pop_slot(),
            value => value,
        }
    }

    pub fn pop_int(&mut self) -> i32 {
        self.pop().as_int()
    }

    pub fn pop_long(&mut self) -> i64 {
        self.pop().as_long()
    }

    pub fn pop_float(&mut self) -> f32 {
        self.pop().as_float()
    }

    pub fn pop_double(&mut self) -> f64 {
        self.pop().as_double()
    }

    pub fn pop_ref(&mut self) -> Option<ObjectRef> {
        self.pop().as_ref()
    }

    pub fn clear_stack(&mut self) {
        self.data.truncate(self.local_array_size);
    }

    pub fn stack_depth(&self) -> usize {
        self.data.len() - self.local_array_size
    }

    /// Slot `index` counted from the top of the operand stack, 0 being the top.
    pub fn peek_nth(&self, index: usize) -> Value {
        if index < self.stack_depth() {
            self.data[self.data.len() - index - 1]
        } else {
            Value::Top
        }
    }

    pub fn pop_args(&mut self, no_of_slots: usize) -> Args {
        let start = self.data.len() - no_of_slots.min(self.stack_depth());
        let args = SmallVec::from_slice(&self.data[start..]);
        self.data.truncate(start);
        args
    }
}

/// What the bottom entry of a thread's stack runs.
#[derive(Debug, Clone)]
pub enum EntryTask {
    /// `public static void main(String[])` of a class, with its arguments.
    Main { class: String, args: Vec<String> },
    /// `run()` of a started `java.lang.Thread`.
    Run { thread: ObjectRef },
    /// Any static method, for embedders and tests.
    Invoke { class: String, name: String, descriptor: String, args: Vec<Value> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    /// Waiting for the superclass to finish initializing.
    Super,
    /// `<clinit>` is on the stack above.
    Running,
}

/// Stack entries run by the VM itself rather than by bytecode.
#[derive(Debug)]
pub enum InternalFrame {
    /// Thread entry; the sentinel at the bottom of every stack.
    Entry { task: EntryTask, invoked: bool },
    /// Drives the initialization of one class on behalf of the entry below it.
    ClassInit { class: ClassId, phase: InitPhase },
}

#[derive(Debug)]
pub enum StackEntry {
    Frame(Frame),
    Internal(InternalFrame),
}

#[derive(Debug, Default)]
pub struct CallStack {
    entries: Vec<StackEntry>,
}

impl CallStack {
    pub fn new(task: EntryTask) -> Self {
        CallStack { entries: vec![StackEntry::Internal(InternalFrame::Entry { task, invoked: false })] }
    }

    pub fn push(&mut self, entry: StackEntry) {
        self.entries.push(entry);
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.entries.push(StackEntry::Frame(frame));
    }

    pub fn pop(&mut self) -> Option<StackEntry> {
        self.entries.pop()
    }

    pub fn top(&self) -> Option<&StackEntry> {
        self.entries.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut StackEntry> {
        self.entries.last_mut()
    }

    /// The innermost entry if it is a bytecode frame.
    pub fn frame(&mut self) -> Option<&mut Frame> {
        match self.entries.last_mut() {
            Some(StackEntry::Frame(frame)) => Some(frame),
            _ => None,
        }
    }

    pub fn depth(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.entries.iter().rev().filter_map(|e| match e {
            StackEntry::Frame(frame) => Some(frame),
            StackEntry::Internal(_) => None,
        })
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
