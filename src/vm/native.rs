use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use log::{debug, warn};
use crate::helper::to_binary_name;
use crate::vm::class::method::Method;
use crate::vm::error::LinkError;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::thread::thread::ThreadId;
use crate::vm::value::Value;
use crate::vm::vm::Vm;

/// What a native call hands back to the interpreter.
#[derive(Debug)]
pub enum NativeResult {
    Return(Option<Value>),
    Throw(Throwable),
    /// The native parked the thread and arranged how it resumes. The invocation
    /// is considered complete once the thread's resume action runs.
    Suspend,
    /// The thread was suspended before the native could act; the whole invoke is
    /// executed again once it is woken.
    Retry,
    /// `System.exit`.
    Halt(i32),
}

/// Arguments arrive in slot form with the receiver first; longs and doubles are
/// followed by their `Top` padding.
pub type NativeFn = Rc<dyn Fn(&mut Vm, ThreadId, &[Value]) -> NativeResult>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeMethodRef {
    pub class_name: String,
    pub method_name: String,
    pub descriptor: String,
}

impl NativeMethodRef {
    pub fn new(class_name: &str, method_name: &str, descriptor: &str) -> Self {
        NativeMethodRef {
            class_name: class_name.to_string(),
            method_name: method_name.to_string(),
            descriptor: descriptor.to_string(),
        }
    }
}

#[derive(Default, Clone)]
pub struct NativeRegistry {
    store: HashMap<NativeMethodRef, NativeFn>,
}

impl Debug for NativeRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "NativeRegistry({} entries)", self.store.len())
    }
}

impl NativeRegistry {
    pub fn register(&mut self, class_name: &str, method_name: &str, descriptor: &str,
                    native: impl Fn(&mut Vm, ThreadId, &[Value]) -> NativeResult + 'static) {
        let key = NativeMethodRef::new(class_name, method_name, descriptor);
        if self.store.insert(key, Rc::new(native)).is_some() {
            debug!("native {}.{}{} replaced", class_name, method_name, descriptor);
        }
    }

    pub fn get(&self, class_name: &str, method_name: &str, descriptor: &str) -> Option<NativeFn> {
        self.store.get(&NativeMethodRef::new(class_name, method_name, descriptor)).cloned()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Vm {
    /// Makes `native` the implementation of `class_name.method_name descriptor`.
    /// Methods already bound keep their old implementation.
    pub fn register_native(&mut self, class_name: &str, method_name: &str, descriptor: &str,
                           native: impl Fn(&mut Vm, ThreadId, &[Value]) -> NativeResult + 'static) {
        self.natives.register(class_name, method_name, descriptor, native);
    }

    /// The implementation of a native method, bound on first use.
    pub(crate) fn link_native(&self, method: &Method) -> Result<NativeFn, LinkError> {
        if let Some(native) = method.native.get() {
            return Ok(native.clone());
        }

        match self.natives.get(&method.class_name, &method.name, &method.descriptor) {
            Some(native) => {
                let _ = method.native.set(native.clone());
                Ok(native)
            }
            None => {
                warn!("no native implementation for {:?}", method);
                Err(LinkError::UnsatisfiedLink(format!("{}.{}{}", to_binary_name(&method.class_name),
                                                       method.name, method.descriptor)))
            }
        }
    }
}
