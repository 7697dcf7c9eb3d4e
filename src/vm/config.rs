use crate::vm::thread::timer::ManualClock;

#[derive(Clone)]
pub enum ClockKind {
    System,
    Manual(ManualClock),
}

/// Knobs of one VM instance.
#[derive(Clone)]
pub struct VmOptions {
    /// Instructions a thread may run before the scheduler moves on.
    pub quantum: usize,
    /// Call depth at which `StackOverflowError` is thrown.
    pub max_stack_depth: usize,
    /// Synthesize the core `java/lang` classes instead of asking the class source.
    pub builtin_runtime: bool,
    /// Largest array, in bytes of element storage, before `OutOfMemoryError`.
    pub max_array_bytes: usize,
    pub clock: ClockKind,
}

impl Default for VmOptions {
    fn default() -> Self {
        VmOptions {
            quantum: 1000,
            max_stack_depth: 2048,
            builtin_runtime: true,
            max_array_bytes: 1 << 30,
            clock: ClockKind::System,
        }
    }
}
