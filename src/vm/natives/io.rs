use crate::vm::class_loader::bootstrap::PRINTED_TYPES;
use crate::vm::native::NativeRegistry;
use crate::vm::natives::lang::this;
use crate::vm::natives::{display, done, format_char, format_double, text_of};
use crate::vm::value::Value;
use crate::vm::vm::Vm;

const PRINT_STREAM: &str = "java/io/PrintStream";

/// `PrintStream` writes to the host; the `fd` field picks stdout (1) or stderr (2).
pub fn register(registry: &mut NativeRegistry) {
    for descriptor in PRINTED_TYPES {
        let format: fn(&Vm, Value) -> String = match descriptor {
            "Ljava/lang/String;" => text_of,
            "Ljava/lang/Object;" => display,
            "I" => |_, v| v.as_int().to_string(),
            "J" => |_, v| v.as_long().to_string(),
            "C" => |_, v| format_char(v.as_int()),
            "Z" => |_, v| v.as_bool().to_string(),
            _ => |_, v| format_double(v.as_double()),
        };

        for (name, newline) in [("print", false), ("println", true)] {
            registry.register(PRINT_STREAM, name, &format!("({})V", descriptor), move |vm, _, args| {
                let mut text = format(vm, args[1]);
                if newline {
                    text.push('\n');
                }
                write(vm, args, &text);
                done()
            });
        }
    }

    registry.register(PRINT_STREAM, "println", "()V", |vm, _, args| {
        write(vm, args, "\n");
        done()
    });
}

fn write(vm: &mut Vm, args: &[Value], text: &str) {
    match vm.field_by_name(this(args), "fd") {
        Some(Value::Int(2)) => vm.host.write_stderr(text.as_bytes()),
        _ => vm.host.write_stdout(text.as_bytes()),
    }
}
