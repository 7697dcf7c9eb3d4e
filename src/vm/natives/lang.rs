use std::time::Duration;
use crate::vm::class_loader::bootstrap::{STRING, THROWABLE};
use crate::vm::class_loader::resolve::OBJECT;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::native::{NativeRegistry, NativeResult};
use crate::vm::natives::{boolean, display, done, format_char, format_double, int, native_try, null_pointer,
                         reference, string, text_of, throw};
use crate::vm::object::{ArrayData, Body};
use crate::vm::thread::monitor::{NOTIFY_NOT_OWNER, WAIT_NOT_OWNER};
use crate::vm::thread::thread::ThreadId;
use crate::vm::value::{ObjectRef, Value};
use crate::vm::vm::Vm;

const CLASS: &str = "java/lang/Class";
const STRING_BUILDER: &str = "java/lang/StringBuilder";
const SYSTEM: &str = "java/lang/System";

pub fn register(registry: &mut NativeRegistry) {
    registry.register(OBJECT, "hashCode", "()I", |vm, _, args| int(vm.identity_hash(this(args))));
    registry.register(OBJECT, "toString", "()Ljava/lang/String;", |vm, thread, args| {
        let text = vm.default_to_string(this(args));
        string(vm, thread, &text)
    });
    registry.register(OBJECT, "getClass", "()Ljava/lang/Class;", get_class);
    registry.register(OBJECT, "clone", "()Ljava/lang/Object;", clone);
    registry.register(OBJECT, "wait", "(J)V", wait);
    registry.register(OBJECT, "notify", "()V", |vm, thread, args| notify(vm, thread, args, false));
    registry.register(OBJECT, "notifyAll", "()V", |vm, thread, args| notify(vm, thread, args, true));

    registry.register(CLASS, "getName", "()Ljava/lang/String;", |vm, thread, args| {
        match vm.class_of_mirror(this(args)) {
            Some(class) => {
                let name = vm.class(class).java_name();
                string(vm, thread, &name)
            }
            None => reference(None),
        }
    });
    registry.register(CLASS, "isInterface", "()Z", |vm, _, args| {
        boolean(vm.class_of_mirror(this(args)).map_or(false, |c| vm.class(c).is_interface()))
    });
    registry.register(CLASS, "isArray", "()Z", |vm, _, args| {
        boolean(vm.class_of_mirror(this(args)).map_or(false, |c| vm.class(c).is_array()))
    });

    register_string(registry);
    register_string_builder(registry);
    register_system(registry);

    registry.register(THROWABLE, "fillInStackTrace", "()Ljava/lang/Throwable;", fillInStackTrace);
    registry.register(THROWABLE, "printStackTrace", "()V", |vm, _, args| {
        let trace = vm.format_stack_trace(this(args));
        vm.host.write_stderr(trace.as_bytes());
        done()
    });
    registry.register(THROWABLE, "toString", "()Ljava/lang/String;", |vm, thread, args| {
        let text = vm.describe_throwable(this(args));
        string(vm, thread, &text)
    });
}

/// The receiver of an instance native. Calls on `null` throw before reaching
/// the native.
pub(crate) fn this(args: &[Value]) -> ObjectRef {
    match args.first().and_then(|v| v.as_ref()) {
        Some(object) => object,
        None => unreachable!("instance native without a receiver"),
    }
}

fn get_class(vm: &mut Vm, thread: ThreadId, args: &[Value]) -> NativeResult {
    let class = vm.heap.class_of(this(args));
    let mirror = vm.mirror_of(Some(thread), class);
    reference(Some(native_try!(vm, thread, mirror)))
}

/// Arrays and `Cloneable` instances are copied shallowly.
fn clone(vm: &mut Vm, _: ThreadId, args: &[Value]) -> NativeResult {
    let object = this(args);
    let class = vm.heap.class_of(object);
    let cloneable = vm.is_array_object(object) || vm.loader.all_interfaces(class).iter()
        .any(|i| vm.class(*i).name == "java/lang/Cloneable");
    if !cloneable {
        return throw("java/lang/CloneNotSupportedException", vm.class(class).java_name());
    }

    let copy = vm.heap.get(object).clone();
    reference(Some(vm.heap.alloc(copy)))
}

fn wait(vm: &mut Vm, thread: ThreadId, args: &[Value]) -> NativeResult {
    let millis = args[1].as_long();
    if millis < 0 {
        return throw("java/lang/IllegalArgumentException", "timeout value is negative");
    }
    if vm.clear_interrupt(thread) {
        return NativeResult::Throw(Throwable::bare("java/lang/InterruptedException"));
    }

    let timeout = if millis == 0 { None } else { Some(Duration::from_millis(millis as u64)) };
    match vm.monitor_wait(thread, this(args), timeout) {
        Ok(()) => NativeResult::Suspend,
        Err(_) => throw("java/lang/IllegalMonitorStateException", WAIT_NOT_OWNER),
    }
}

fn notify(vm: &mut Vm, thread: ThreadId, args: &[Value], all: bool) -> NativeResult {
    match vm.monitor_notify(thread, this(args), all) {
        Ok(()) => done(),
        Err(_) => throw("java/lang/IllegalMonitorStateException", NOTIFY_NOT_OWNER),
    }
}

#[allow(non_snake_case)]
fn fillInStackTrace(vm: &mut Vm, thread: ThreadId, args: &[Value]) -> NativeResult {
    let trace = vm.backtrace(thread);
    vm.backtraces.insert(this(args), trace);
    reference(Some(this(args)))
}

fn chars(vm: &Vm, string: ObjectRef) -> Vec<u16> {
    match vm.field_by_name(string, "value") {
        Some(Value::Ref(Some(array))) => match vm.heap.get(array).array() {
            Some(ArrayData::Char(units)) => units.clone(),
            _ => vec![],
        },
        _ => vec![],
    }
}

fn is_string(vm: &Vm, object: ObjectRef) -> bool {
    vm.class(vm.heap.class_of(object)).name == STRING
}

fn register_string(registry: &mut NativeRegistry) {
    registry.register(STRING, "hashCode", "()I", |vm, _, args| {
        int(chars(vm, this(args)).iter().fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(*c as i32)))
    });
    registry.register(STRING, "equals", "(Ljava/lang/Object;)Z", |vm, _, args| {
        let equal = match args[1].as_ref() {
            Some(other) if other == this(args) => true,
            Some(other) if is_string(vm, other) => chars(vm, this(args)) == chars(vm, other),
            _ => false,
        };
        boolean(equal)
    });
    registry.register(STRING, "intern", "()Ljava/lang/String;", |vm, _, args| {
        reference(Some(vm.intern_object(this(args))))
    });
    registry.register(STRING, "concat", "(Ljava/lang/String;)Ljava/lang/String;", |vm, thread, args| {
        if args[1].as_ref().is_none() {
            return null_pointer();
        }
        let text = text_of(vm, args[0]) + &text_of(vm, args[1]);
        string(vm, thread, &text)
    });
    registry.register(STRING, "valueOf", "(I)Ljava/lang/String;", |vm, thread, args| {
        string(vm, thread, &args[0].as_int().to_string())
    });
    registry.register(STRING, "valueOf", "(J)Ljava/lang/String;", |vm, thread, args| {
        string(vm, thread, &args[0].as_long().to_string())
    });
    registry.register(STRING, "valueOf", "(C)Ljava/lang/String;", |vm, thread, args| {
        string(vm, thread, &format_char(args[0].as_int()))
    });
}

/// Text of a `StringBuilder`, kept as one immutable string that every append
/// replaces.
fn builder_text(vm: &Vm, builder: ObjectRef) -> String {
    match vm.field_by_name(builder, "text") {
        Some(Value::Ref(Some(text))) => vm.string_value(text).unwrap_or_default(),
        _ => String::new(),
    }
}

fn append(vm: &mut Vm, thread: ThreadId, builder: ObjectRef, suffix: &str) -> NativeResult {
    let text = builder_text(vm, builder) + suffix;
    let string = vm.new_string(Some(thread), &text);
    let string = native_try!(vm, thread, string);
    vm.set_field_by_name(builder, "text", Value::Ref(Some(string)));
    reference(Some(builder))
}

fn register_string_builder(registry: &mut NativeRegistry) {
    fn register_append(registry: &mut NativeRegistry, arg: &str, format: fn(&Vm, &[Value]) -> String) {
        registry.register(STRING_BUILDER, "append", &format!("({})Ljava/lang/StringBuilder;", arg),
                          move |vm, thread, args| {
                              let suffix = format(vm, args);
                              append(vm, thread, this(args), &suffix)
                          });
    }

    register_append(registry, "Ljava/lang/String;", |vm, args| text_of(vm, args[1]));
    register_append(registry, "Ljava/lang/Object;", |vm, args| display(vm, args[1]));
    register_append(registry, "I", |_, args| args[1].as_int().to_string());
    register_append(registry, "J", |_, args| args[1].as_long().to_string());
    register_append(registry, "C", |_, args| format_char(args[1].as_int()));
    register_append(registry, "Z", |_, args| args[1].as_bool().to_string());
    register_append(registry, "D", |_, args| format_double(args[1].as_double()));

    registry.register(STRING_BUILDER, "length", "()I", |vm, _, args| {
        int(builder_text(vm, this(args)).encode_utf16().count() as i32)
    });
    registry.register(STRING_BUILDER, "toString", "()Ljava/lang/String;", |vm, thread, args| {
        let text = builder_text(vm, this(args));
        string(vm, thread, &text)
    });
}

fn register_system(registry: &mut NativeRegistry) {
    registry.register(SYSTEM, "exit", "(I)V", |_, _, args| NativeResult::Halt(args[0].as_int()));
    registry.register(SYSTEM, "currentTimeMillis", "()J", |vm, _, _| {
        NativeResult::Return(Some(Value::Long(vm.clock.wall_millis())))
    });
    registry.register(SYSTEM, "nanoTime", "()J", |vm, _, _| {
        NativeResult::Return(Some(Value::Long(vm.clock.now().as_nanos() as i64)))
    });
    registry.register(SYSTEM, "identityHashCode", "(Ljava/lang/Object;)I", |vm, _, args| {
        int(args[0].as_ref().map_or(0, |o| vm.identity_hash(o)))
    });
    registry.register(SYSTEM, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V", arraycopy);
}

fn arraycopy(vm: &mut Vm, _: ThreadId, args: &[Value]) -> NativeResult {
    let (src, dst) = match (args[0].as_ref(), args[2].as_ref()) {
        (Some(src), Some(dst)) => (src, dst),
        _ => return null_pointer(),
    };
    let (src_pos, dst_pos, len) = (args[1].as_int(), args[3].as_int(), args[4].as_int());

    let (src_len, dst_len) = match (&vm.heap.get(src).body, &vm.heap.get(dst).body) {
        (Body::Array(s), Body::Array(d)) => (s.len() as i64, d.len() as i64),
        _ => return throw("java/lang/ArrayStoreException", "arraycopy: argument type mismatch"),
    };
    if src_pos < 0 || dst_pos < 0 || len < 0
        || src_pos as i64 + len as i64 > src_len || dst_pos as i64 + len as i64 > dst_len {
        let message = format!("arraycopy: range [{}, {}) out of bounds", src_pos, src_pos as i64 + len as i64);
        return throw("java/lang/ArrayIndexOutOfBoundsException", message);
    }
    let (src_pos, dst_pos, len) = (src_pos as usize, dst_pos as usize, len as usize);

    if src == dst {
        if let Some(data) = vm.heap.get_mut(dst).array_mut() {
            data.copy_within(src_pos, dst_pos, len);
        }
        return done();
    }

    let source = match vm.heap.get(src).array() {
        Some(data) => data.clone(),
        None => return done(),
    };
    if let ArrayData::Ref(elements) = &source {
        return copy_references(vm, elements, src_pos, dst, dst_pos, len);
    }
    let copied = vm.heap.get_mut(dst).array_mut().map_or(false, |d| d.copy_from(dst_pos, &source, src_pos, len));
    if copied {
        done()
    } else {
        throw("java/lang/ArrayStoreException", "arraycopy: type mismatch")
    }
}

// Elements are checked one by one; those before a failing one stay copied.
fn copy_references(vm: &mut Vm, elements: &[Option<ObjectRef>], src_pos: usize, dst: ObjectRef,
                   dst_pos: usize, len: usize) -> NativeResult {
    let component = match vm.class(vm.heap.class_of(dst)).component() {
        Some(component) if !vm.class(component).is_primitive() => component,
        _ => return throw("java/lang/ArrayStoreException", "arraycopy: type mismatch"),
    };

    for i in 0..len {
        let element = elements[src_pos + i];
        if let Some(object) = element {
            let class = vm.heap.class_of(object);
            if !vm.loader.is_assignable(class, component) {
                let message = format!("arraycopy: element type mismatch: {}", vm.class(class).java_name());
                return throw("java/lang/ArrayStoreException", message);
            }
        }
        if let Some(data) = vm.heap.get_mut(dst).array_mut() {
            data.set(dst_pos + i, Value::Ref(element));
        }
    }
    done()
}
