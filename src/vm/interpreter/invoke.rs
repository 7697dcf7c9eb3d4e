use std::rc::Rc;
use log::trace;
use crate::vm::class::constant_pool::MemberKind;
use crate::vm::class::method::Method;
use crate::vm::error::LinkError;
use crate::vm::interpreter::decode::{InvokeKind, Site};
use crate::vm::interpreter::exec::null_pointer;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::interpreter::{Exec, Flow};
use crate::vm::native::NativeResult;
use crate::vm::thread::frame::Frame;
use crate::vm::thread::thread::ThreadId;
use crate::vm::value::ObjectRef;
use crate::vm::vm::Vm;

fn link_error(e: LinkError) -> Flow {
    Flow::Throw(e.into())
}

impl Vm {
    /// Resolves, selects and calls. Arguments stay on the caller's stack until
    /// the call is certain to go ahead, so a suspended invoke can simply run
    /// again.
    pub(crate) fn invoke(&mut self, thread: ThreadId, frame: &mut Frame, kind: InvokeKind,
                         site: &Site<Rc<Method>>) -> Exec {
        let resolved = match site.linked() {
            Some(method) => method,
            None => {
                let method = self.link_invoke(thread, frame, kind, site)?;
                if kind == InvokeKind::Static {
                    self.init_check(thread, method.class)?;
                }
                if kind != InvokeKind::Static || self.loader.class(method.class).is_initialized() {
                    site.link(method.clone());
                }
                method
            }
        };

        let method = match kind {
            InvokeKind::Static | InvokeKind::Special => resolved,
            InvokeKind::Virtual | InvokeKind::Interface => {
                let receiver = frame.peek_nth(resolved.arg_slots()).as_ref().ok_or_else(null_pointer)?;
                let class = self.heap.class_of(receiver);
                self.loader.select_method(class, &resolved).map_err(link_error)?
            }
        };
        self.call(thread, frame, method)
    }

    /// Method resolution for an invoke site. For `invokespecial` the result is
    /// already the method that will run.
    fn link_invoke(&mut self, thread: ThreadId, frame: &Frame, kind: InvokeKind, site: &Site<Rc<Method>>)
                   -> Result<Rc<Method>, Flow> {
        let member = self.constant(frame, |pool| pool.member(site.index))?;
        let class = self.load_class(thread, &member.class)?;

        let resolved = if kind == InvokeKind::Interface || member.kind == MemberKind::InterfaceMethod {
            self.loader.resolve_interface_method(class, &member.name, &member.descriptor)
        } else {
            self.loader.resolve_method(class, &member.name, &member.descriptor)
        }.map_err(link_error)?;

        if (kind == InvokeKind::Static) != resolved.is_static() {
            let expected = if kind == InvokeKind::Static { "static" } else { "non-static" };
            return Err(link_error(LinkError::IncompatibleClassChange(
                format!("Expected {} method {:?}", expected, resolved))));
        }

        trace!("linked {:?} at {:?}#{}", resolved, frame.method, site.index);
        if kind == InvokeKind::Special {
            return self.loader.select_special(frame.class, class, &resolved).map_err(link_error);
        }
        Ok(resolved)
    }

    /// The monitor a synchronized method locks: the receiver, or the class mirror
    /// for static methods.
    fn method_lock(&mut self, thread: ThreadId, frame: &Frame, method: &Method, slots: usize)
                   -> Result<Option<ObjectRef>, Flow> {
        if !method.is_synchronized() {
            return Ok(None);
        }
        if method.is_static() {
            let mirror = self.mirror_of(Some(thread), method.class);
            return self.lookup(thread, mirror).map(Some);
        }
        frame.peek_nth(slots - 1).as_ref().map(Some).ok_or_else(null_pointer)
    }

    /// Transfers control to `method` with its arguments taken from `frame`.
    pub(crate) fn call(&mut self, thread: ThreadId, frame: &mut Frame, method: Rc<Method>) -> Exec {
        if method.is_abstract() {
            return Err(link_error(LinkError::AbstractMethod(format!("{:?}", method))));
        }
        if self.stack_depth(thread) >= self.options.max_stack_depth {
            return Err(Flow::Throw(Throwable::bare("java/lang/StackOverflowError")));
        }

        let slots = method.arg_slots() + if method.is_static() { 0 } else { 1 };
        if !method.is_static() && frame.peek_nth(slots - 1).as_ref().is_none() {
            return Err(null_pointer());
        }
        if method.is_native() {
            return self.call_native(thread, frame, method, slots);
        }

        let lock = self.method_lock(thread, frame, &method, slots)?;
        if let Some(lock) = lock {
            if !self.monitor_enter(thread, lock, 1) {
                return Err(Flow::Suspend);
            }
        }

        let args = frame.pop_args(slots);
        let mut callee = Frame::new(method, &args);
        callee.lock = lock;
        Ok(Flow::Call(callee))
    }

    fn call_native(&mut self, thread: ThreadId, frame: &mut Frame, method: Rc<Method>, slots: usize) -> Exec {
        let native = self.link_native(&method).map_err(link_error)?;
        let lock = self.method_lock(thread, frame, &method, slots)?;
        if let Some(lock) = lock {
            if !self.monitor_enter(thread, lock, 1) {
                return Err(Flow::Suspend);
            }
        }

        let args = frame.pop_args(slots);
        let result = native(self, thread, &args);
        match (lock, &result) {
            (Some(lock), NativeResult::Suspend) => {
                if let Some(t) = self.thread_mut(thread) {
                    t.native_lock = Some(lock);
                }
            }
            (Some(lock), _) => {
                let _ = self.monitor_exit(thread, lock);
            }
            (None, _) => {}
        }

        match result {
            NativeResult::Return(value) => {
                if let Some(value) = value {
                    frame.push(value.narrow_to(&method.signature.ret));
                }
                Ok(Flow::Next)
            }
            NativeResult::Throw(throwable) => Err(Flow::Throw(throwable)),
            NativeResult::Suspend => Err(Flow::Suspend),
            NativeResult::Retry => {
                for arg in args {
                    frame.push_slot(arg);
                }
                Err(Flow::Suspend)
            }
            NativeResult::Halt(status) => Err(Flow::Halt(status)),
        }
    }

    /// Unlocks the monitor a suspended synchronized native kept while it waited.
    pub(crate) fn release_native_lock(&mut self, thread: ThreadId) {
        if let Some(lock) = self.thread_mut(thread).and_then(|t| t.native_lock.take()) {
            let _ = self.monitor_exit(thread, lock);
        }
    }
}
