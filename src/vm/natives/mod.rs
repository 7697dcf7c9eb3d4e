use crate::vm::class_loader::Lookup;
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::native::{NativeRegistry, NativeResult};
use crate::vm::thread::thread::{ThreadId, ThreadStatus};
use crate::vm::value::{ObjectRef, Value};
use crate::vm::vm::Vm;

pub mod io;
pub mod lang;
pub mod thread;

/// Registers the natives of the built-in runtime classes.
pub fn register_core(registry: &mut NativeRegistry) {
    lang::register(registry);
    io::register(registry);
    thread::register(registry);
}

/// Like `?`, but for natives: a pending class suspends the thread and asks for
/// the whole invoke to run again.
macro_rules! native_try {
    ($vm: expr, $thread: expr, $lookup: expr) => {
        match $crate::vm::natives::settle($vm, $thread, $lookup) {
            Ok(value) => value,
            Err(result) => return result,
        }
    }
}
pub(crate) use native_try;

pub(crate) fn settle<T>(vm: &mut Vm, thread: ThreadId, lookup: Lookup<T>) -> Result<T, NativeResult> {
    match lookup {
        Lookup::Ready(t) => Ok(t),
        Lookup::Pending => {
            vm.set_status(thread, ThreadStatus::AwaitingClass);
            Err(NativeResult::Retry)
        }
        Lookup::Failed(e) => Err(NativeResult::Throw(e.into())),
    }
}

pub(crate) fn throw(class: &str, message: impl Into<String>) -> NativeResult {
    NativeResult::Throw(Throwable::new(class, message))
}

pub(crate) fn null_pointer() -> NativeResult {
    NativeResult::Throw(Throwable::bare("java/lang/NullPointerException"))
}

pub(crate) fn done() -> NativeResult {
    NativeResult::Return(None)
}

pub(crate) fn int(value: i32) -> NativeResult {
    NativeResult::Return(Some(Value::Int(value)))
}

pub(crate) fn boolean(value: bool) -> NativeResult {
    NativeResult::Return(Some(Value::from_bool(value)))
}

pub(crate) fn reference(value: Option<ObjectRef>) -> NativeResult {
    NativeResult::Return(Some(Value::Ref(value)))
}

/// Returns a new string holding `text`.
pub(crate) fn string(vm: &mut Vm, thread: ThreadId, text: &str) -> NativeResult {
    let string = vm.new_string(Some(thread), text);
    reference(Some(native_try!(vm, thread, string)))
}

/// Text of a string argument; `null` reads as `"null"`.
pub(crate) fn text_of(vm: &Vm, value: Value) -> String {
    match value.as_ref() {
        Some(string) => vm.string_value(string).unwrap_or_default(),
        None => "null".to_string(),
    }
}

/// How `print` and `append` show an object: strings by content, throwables
/// like `Throwable.toString`, anything else by class and identity hash.
pub(crate) fn display(vm: &Vm, value: Value) -> String {
    let object = match value.as_ref() {
        Some(object) => object,
        None => return "null".to_string(),
    };
    let class = vm.heap.class_of(object);
    if vm.loader.class(class).name == crate::vm::class_loader::bootstrap::STRING {
        return vm.string_value(object).unwrap_or_default();
    }
    if vm.is_throwable_class(class) {
        return vm.describe_throwable(object);
    }
    vm.default_to_string(object)
}

/// `Double.toString`: plain notation between 10^-3 and 10^7, computerized
/// scientific notation outside it.
pub fn format_double(d: f64) -> String {
    if d.is_nan() {
        return "NaN".to_string();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if d == 0.0 {
        return if d.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    if (1e-3..1e7).contains(&d.abs()) {
        let plain = d.to_string();
        return if plain.contains('.') { plain } else { format!("{}.0", plain) };
    }
    let scientific = format!("{:e}", d);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    if mantissa.contains('.') {
        format!("{}E{}", mantissa, exponent)
    } else {
        format!("{}.0E{}", mantissa, exponent)
    }
}

pub(crate) fn format_char(c: i32) -> String {
    String::from_utf16_lossy(&[c as u16])
}
