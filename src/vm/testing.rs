use std::rc::Rc;
use once_cell::unsync::OnceCell;
use crate::class_parser::writer::{ClassWriter, CodeBuilder};
use crate::vm::class::class::ClassId;
use crate::vm::class::field::FieldType;
use crate::vm::class::method::{Code, Method, MethodDescriptor};
use crate::vm::class_loader::source::MapSource;
use crate::vm::config::{ClockKind, VmOptions};
use crate::vm::host::CaptureHost;
use crate::vm::thread::timer::ManualClock;
use crate::vm::vm::Vm;

pub const PUBLIC_STATIC: u16 = 0x0009;
pub const MAIN: &str = "([Ljava/lang/String;)V";

/// A static method without instructions, enough to back a bare frame.
pub fn method_with_code(max_stack: usize, max_locals: usize) -> Rc<Method> {
    Rc::new(Method {
        flag: PUBLIC_STATIC,
        name: "test".to_string(),
        descriptor: "()V".to_string(),
        signature: MethodDescriptor { parameters: vec![], ret: FieldType::V },
        class: ClassId(0),
        class_name: "Test".to_string(),
        code: Some(Code::new(max_stack, max_locals, 0, vec![], vec![])),
        native: OnceCell::new(),
    })
}

/// A VM over the built-in runtime with captured output and a clock that only
/// moves when every thread sleeps.
pub struct TestVm {
    pub vm: Vm,
    pub host: CaptureHost,
    pub clock: ManualClock,
}

impl TestVm {
    pub fn new(source: MapSource) -> Self {
        let host = CaptureHost::default();
        let clock = ManualClock::default();
        let options = VmOptions {
            quantum: 50,
            clock: ClockKind::Manual(clock.clone()),
            ..VmOptions::default()
        };
        let vm = Vm::new(Box::new(source), Box::new(host.clone()), options);
        TestVm { vm, host, clock }
    }

    pub fn with_classes(classes: Vec<(&str, Vec<u8>)>) -> Self {
        let mut source = MapSource::new();
        for (name, bytes) in classes {
            source.insert(name, bytes);
        }
        TestVm::new(source)
    }
}

/// A class holding only `public static void main(String[])`.
pub fn main_class(name: &str, max_stack: u16, max_locals: u16, body: impl FnOnce(&mut CodeBuilder)) -> Vec<u8> {
    let mut code = CodeBuilder::new(max_stack, max_locals.max(1));
    body(&mut code);
    ClassWriter::new(name, Some("java/lang/Object"))
        .method(PUBLIC_STATIC, "main", MAIN, code)
        .finish()
}
