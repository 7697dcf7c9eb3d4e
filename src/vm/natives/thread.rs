use std::time::Duration;
use log::debug;
use crate::vm::class_loader::bootstrap::THREAD;
use crate::vm::class_loader::Lookup;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::native::{NativeRegistry, NativeResult};
use crate::vm::natives::lang::this;
use crate::vm::natives::{boolean, done, native_try, null_pointer, reference, throw};
use crate::vm::thread::frame::EntryTask;
use crate::vm::thread::thread::ThreadId;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::vm::Vm;

const LOCK_SUPPORT: &str = "java/util/concurrent/locks/LockSupport";
const UNSAFE: &str = "sun/misc/Unsafe";

pub fn register(registry: &mut NativeRegistry) {
    registry.register(THREAD, "start0", "()V", start0);
    registry.register(THREAD, "interrupt0", "()V", |vm, _, args| {
        if let Some(id) = vm.thread_of_object(this(args)) {
            vm.interrupt(id);
        }
        done()
    });
    registry.register(THREAD, "isInterrupted", "(Z)Z", |vm, _, args| {
        let id = match vm.thread_of_object(this(args)) {
            Some(id) => id,
            None => return boolean(false),
        };
        if args[1].as_bool() {
            boolean(vm.clear_interrupt(id))
        } else {
            boolean(vm.thread(id).map_or(false, |t| t.interrupted))
        }
    });
    registry.register(THREAD, "isAlive", "()Z", |vm, _, args| {
        let alive = vm.thread_of_object(this(args)).and_then(|id| vm.thread(id)).map_or(false, |t| t.is_alive());
        boolean(alive)
    });
    registry.register(THREAD, "currentThread", "()Ljava/lang/Thread;", |vm, thread, _| {
        let object = vm.thread_object(thread);
        reference(Some(native_try!(vm, thread, object)))
    });
    registry.register(THREAD, "sleep", "(J)V", sleep);
    registry.register(THREAD, "yield", "()V", |vm, _, _| {
        vm.yielded = true;
        done()
    });
    registry.register(THREAD, "holdsLock", "(Ljava/lang/Object;)Z", |vm, thread, args| {
        match args[0].as_ref() {
            Some(object) => boolean(vm.monitors.holds(thread, object)),
            None => null_pointer(),
        }
    });

    registry.register(LOCK_SUPPORT, "park", "()V", |vm, thread, _| park(vm, thread, None));
    registry.register(LOCK_SUPPORT, "parkNanos", "(J)V", |vm, thread, args| {
        match args[0].as_long() {
            nanos if nanos <= 0 => done(),
            nanos => park(vm, thread, Some(Duration::from_nanos(nanos as u64))),
        }
    });
    registry.register(LOCK_SUPPORT, "unpark", "(Ljava/lang/Thread;)V", |vm, _, args| unpark(vm, args[0]));

    registry.register(UNSAFE, "park", "(ZJ)V", |vm, thread, args| {
        let (absolute, time) = (args[1].as_bool(), args[2].as_long());
        let timeout = if absolute {
            match time - vm.clock.wall_millis() {
                left if left <= 0 => return done(),
                left => Some(Duration::from_millis(left as u64)),
            }
        } else {
            match time {
                0 => None,
                nanos if nanos < 0 => return done(),
                nanos => Some(Duration::from_nanos(nanos as u64)),
            }
        };
        park(vm, thread, timeout)
    });
    registry.register(UNSAFE, "unpark", "(Ljava/lang/Object;)V", |vm, _, args| unpark(vm, args[1]));
}

impl Vm {
    /// The VM thread started for a `java.lang.Thread` object.
    pub(crate) fn thread_of_object(&self, object: ObjectRef) -> Option<ThreadId> {
        self.threads.iter().find(|t| t.java_object == Some(object)).map(|t| t.id)
    }

    /// The `java.lang.Thread` object of `thread`. Threads spawned by the host
    /// get one on first request, allocated without running a constructor.
    pub(crate) fn thread_object(&mut self, thread: ThreadId) -> Lookup<ObjectRef> {
        if let Some(object) = self.thread(thread).and_then(|t| t.java_object) {
            return Lookup::Ready(object);
        }

        let class = crate::ready!(self.loader.load_resolved(THREAD, Some(thread)));
        let name = self.thread(thread).map(|t| t.name.clone()).unwrap_or_default();
        let name = crate::ready!(self.new_string(Some(thread), &name));

        let object = self.new_object(class);
        self.set_field_by_name(object, "name", Value::Ref(Some(name)));
        self.set_field_by_name(object, "priority", Value::Int(5));
        self.set_field_by_name(object, "tid", Value::Long(thread.0 as i64 + 1));
        if let Some(t) = self.thread_mut(thread) {
            t.java_object = Some(object);
        }
        Lookup::Ready(object)
    }
}

fn start0(vm: &mut Vm, _: ThreadId, args: &[Value]) -> NativeResult {
    let object = this(args);
    if vm.thread_of_object(object).is_some() {
        return NativeResult::Throw(Throwable::bare("java/lang/IllegalThreadStateException"));
    }

    let next = vm.threads.len();
    let name = match vm.field_by_name(object, "name") {
        Some(Value::Ref(Some(name))) => vm.string_value(name).unwrap_or_default(),
        _ => format!("Thread-{}", next),
    };
    let daemon = vm.field_by_name(object, "daemon").map_or(false, |v| v.as_bool());

    let id = vm.spawn(&name, EntryTask::Run { thread: object });
    vm.set_field_by_name(object, "tid", Value::Long(id.0 as i64 + 1));
    if let Some(thread) = vm.thread_mut(id) {
        thread.java_object = Some(object);
        thread.daemon = daemon;
    }
    debug!("started thread {} ({}), daemon: {}", id, name, daemon);
    done()
}

fn sleep(vm: &mut Vm, thread: ThreadId, args: &[Value]) -> NativeResult {
    let millis = args[0].as_long();
    if millis < 0 {
        return throw("java/lang/IllegalArgumentException", "timeout value is negative");
    }
    if vm.clear_interrupt(thread) {
        return throw("java/lang/InterruptedException", "sleep interrupted");
    }
    if millis == 0 {
        vm.yielded = true;
        return done();
    }

    vm.sleep(thread, Duration::from_millis(millis as u64));
    NativeResult::Suspend
}

fn park(vm: &mut Vm, thread: ThreadId, timeout: Option<Duration>) -> NativeResult {
    if vm.park(thread, timeout) {
        NativeResult::Suspend
    } else {
        done()
    }
}

fn unpark(vm: &mut Vm, target: Value) -> NativeResult {
    if let Some(id) = target.as_ref().and_then(|object| vm.thread_of_object(object)) {
        vm.unpark(id);
    }
    done()
}
