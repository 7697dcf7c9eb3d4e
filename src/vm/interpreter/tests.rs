use crate::class_parser::writer::{ClassWriter, CodeBuilder, Constant};
use crate::vm::class_loader::source::MapSource;
use crate::vm::error::VmError;
use crate::vm::host::HostReply;
use crate::vm::instructions::Instruction::*;
use crate::vm::native::NativeResult;
use crate::vm::testing::{main_class, TestVm, PUBLIC_STATIC};
use crate::vm::thread::scheduler::RunOutcome;
use crate::vm::thread::thread::{ThreadId, ThreadOutcome};
use crate::vm::value::Value;

const OBJECT: &str = "java/lang/Object";
const PUBLIC: u16 = 0x0001;
const SYNCHRONIZED: u16 = 0x0020;

fn static_method(class: &str, name: &str, descriptor: &str, max_stack: u16, max_locals: u16,
                 body: impl FnOnce(&mut CodeBuilder)) -> Vec<u8> {
    let mut code = CodeBuilder::new(max_stack, max_locals);
    body(&mut code);
    ClassWriter::new(class, Some(OBJECT))
        .method(PUBLIC_STATIC, name, descriptor, code)
        .finish()
}

fn constructor(writer: &mut ClassWriter, super_name: &str) {
    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokespecial, super_name, "<init>", "()V").op(_return);
    writer.method(PUBLIC, "<init>", "()V", code);
}

fn println(code: &mut CodeBuilder, text: &str) {
    code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
        .ldc(Constant::Str(text.to_string()))
        .invoke(invokevirtual, "java/io/PrintStream", "println", "(Ljava/lang/String;)V");
}

fn returned(test: &TestVm, thread: ThreadId) -> Option<Value> {
    match test.vm.thread_outcome(thread) {
        Some(ThreadOutcome::Returned(value)) => *value,
        other => panic!("thread did not return: {:?}\n{}", other, test.host.stderr()),
    }
}

#[test]
fn adds_two_constants() {
    let calc = static_method("pkg/Calc", "add", "()I", 2, 0, |code| {
        code.op(iconst_2).op(iconst_3).op(iadd).op(ireturn);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Calc", calc)]);

    let thread = test.vm.spawn_invoke("pkg/Calc", "add", "()I", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(returned(&test, thread), Some(Value::Int(5)));
}

#[test]
fn long_shift_uses_the_low_six_bits() {
    let calc = static_method("pkg/Calc", "shift", "(JI)J", 3, 3, |code| {
        code.op(lload_0).op(iload_2).op(lshl).op(lreturn);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Calc", calc)]);

    let args = vec![Value::Long(1), Value::Top, Value::Int(65)];
    let thread = test.vm.spawn_invoke("pkg/Calc", "shift", "(JI)J", args);
    test.vm.run();
    assert_eq!(returned(&test, thread), Some(Value::Long(2)));
}

#[test]
fn virtual_calls_dispatch_on_the_receiver() {
    let mut base = ClassWriter::new("pkg/Base", Some(OBJECT));
    constructor(&mut base, OBJECT);
    let mut code = CodeBuilder::new(1, 1);
    code.op(iconst_1).op(ireturn);
    base.method(PUBLIC, "value", "()I", code);

    let mut derived = ClassWriter::new("pkg/Derived", Some("pkg/Base"));
    constructor(&mut derived, "pkg/Base");
    let mut code = CodeBuilder::new(1, 1);
    code.op(iconst_2).op(ireturn);
    derived.method(PUBLIC, "value", "()I", code);

    let main = static_method("pkg/Main", "run", "()I", 2, 0, |code| {
        code.class_op(new, "pkg/Derived").op(dup)
            .invoke(invokespecial, "pkg/Derived", "<init>", "()V")
            .invoke(invokevirtual, "pkg/Base", "value", "()I")
            .op(ireturn);
    });
    let mut test = TestVm::with_classes(vec![
        ("pkg/Base", base.finish()), ("pkg/Derived", derived.finish()), ("pkg/Main", main),
    ]);

    let thread = test.vm.spawn_invoke("pkg/Main", "run", "()I", vec![]);
    test.vm.run();
    assert_eq!(returned(&test, thread), Some(Value::Int(2)));
}

#[test]
fn handler_catches_arithmetic_exception() {
    let calc = static_method("pkg/Calc", "safe", "()I", 2, 0, |code| {
        let (start, end, handler) = (code.new_label(), code.new_label(), code.new_label());
        code.bind(start).op(iconst_1).op(iconst_0).op(idiv).op(ireturn)
            .bind(end)
            .bind(handler).op(pop).iconst(-1).op(ireturn)
            .handler(start, end, handler, Some("java/lang/ArithmeticException"));
    });
    let mut test = TestVm::with_classes(vec![("pkg/Calc", calc)]);

    let thread = test.vm.spawn_invoke("pkg/Calc", "safe", "()I", vec![]);
    test.vm.run();
    assert_eq!(returned(&test, thread), Some(Value::Int(-1)));
}

#[test]
fn println_reaches_the_host() {
    let main = main_class("pkg/Hello", 3, 1, |code| {
        println(code, "hello");
        code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
            .iconst(42)
            .invoke(invokevirtual, "java/io/PrintStream", "println", "(I)V")
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Hello", main)]);

    test.vm.spawn_main("pkg.Hello", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "hello\n42\n");
}

#[test]
fn uncaught_exception_is_printed_with_the_thread_name() {
    let main = main_class("pkg/Boom", 3, 1, |code| {
        code.class_op(new, "java/lang/RuntimeException").op(dup)
            .ldc(Constant::Str("boom".to_string()))
            .invoke(invokespecial, "java/lang/RuntimeException", "<init>", "(Ljava/lang/String;)V")
            .op(athrow);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Boom", main)]);

    let thread = test.vm.spawn_main("pkg/Boom", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert!(matches!(test.vm.thread_outcome(thread), Some(ThreadOutcome::Uncaught(_))));
    assert!(test.host.stderr().starts_with("Exception in thread \"main\" java.lang.RuntimeException: boom\n"),
            "{}", test.host.stderr());
}

#[test]
fn array_index_errors_name_index_and_length() {
    let main = main_class("pkg/Arrays", 3, 1, |code| {
        code.op(iconst_2).op_u1(newarray, 10).op(iconst_3).op(iaload).op(pop).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Arrays", main)]);

    test.vm.spawn_main("pkg/Arrays", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains(
        "java.lang.ArrayIndexOutOfBoundsException: Index 3 out of bounds for length 2"), "{}", test.host.stderr());
}

#[test]
fn missing_superclass_fails_at_first_use() {
    let child = ClassWriter::new("pkg/Child", Some("pkg/Missing")).finish();
    let main = main_class("pkg/Main", 2, 1, |code| {
        println(code, "before");
        code.class_op(new, "pkg/Child").op(pop).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Child", child), ("pkg/Main", main)]);

    let thread = test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert_eq!(test.host.stdout(), "before\n");
    assert!(matches!(test.vm.thread_outcome(thread), Some(ThreadOutcome::Uncaught(_))));
    assert!(test.host.stderr().contains("java.lang.NoClassDefFoundError"), "{}", test.host.stderr());
}

#[test]
fn static_initializer_runs_once() {
    let mut counter = ClassWriter::new("pkg/Counter", Some(OBJECT));
    counter.field(PUBLIC_STATIC, "count", "I");
    let mut code = CodeBuilder::new(2, 0);
    code.field(getstatic, "pkg/Counter", "count", "I").op(iconst_1).op(iadd)
        .field(putstatic, "pkg/Counter", "count", "I").op(_return);
    counter.method(0x0008, "<clinit>", "()V", code);

    let main = main_class("pkg/Main", 2, 1, |code| {
        code.field(getstatic, "pkg/Counter", "count", "I").op(pop)
            .field(getstatic, "pkg/Counter", "count", "I").op(pop)
            .iconst(7).field(putstatic, "pkg/Counter", "count", "I")
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Counter", counter.finish()), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert_eq!(test.vm.static_field("pkg/Counter", "count"), Some(Value::Int(7)));

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert_eq!(test.vm.static_field("pkg/Counter", "count"), Some(Value::Int(7)));
}

#[test]
fn failed_initializer_leaves_the_class_unusable() {
    let mut broken = ClassWriter::new("pkg/Broken", Some(OBJECT));
    broken.field(PUBLIC_STATIC, "value", "I");
    let mut code = CodeBuilder::new(2, 0);
    code.op(iconst_1).op(iconst_0).op(idiv).field(putstatic, "pkg/Broken", "value", "I").op(_return);
    broken.method(0x0008, "<clinit>", "()V", code);

    let main = main_class("pkg/Main", 1, 1, |code| {
        code.field(getstatic, "pkg/Broken", "value", "I").op(pop).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Broken", broken.finish()), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains("java.lang.ExceptionInInitializerError"), "{}", test.host.stderr());

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains("java.lang.NoClassDefFoundError: Could not initialize class pkg.Broken"),
            "{}", test.host.stderr());
}

#[test]
fn runaway_recursion_overflows_the_stack() {
    let deep = static_method("pkg/Deep", "dive", "()V", 0, 0, |code| {
        code.invoke(invokestatic, "pkg/Deep", "dive", "()V").op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Deep", deep)]);

    let thread = test.vm.spawn_invoke("pkg/Deep", "dive", "()V", vec![]);
    test.vm.run();
    assert!(matches!(test.vm.thread_outcome(thread), Some(ThreadOutcome::Uncaught(_))));
    assert!(test.host.stderr().contains("java.lang.StackOverflowError"));
}

#[test]
fn exit_halts_every_thread() {
    let main = main_class("pkg/Exit", 1, 1, |code| {
        code.iconst(3).invoke(invokestatic, "java/lang/System", "exit", "(I)V");
        println(code, "unreachable");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Exit", main)]);

    let thread = test.vm.spawn_main("pkg/Exit", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Halted(3));
    assert_eq!(test.vm.thread_outcome(thread), Some(&ThreadOutcome::Halted(3)));
    assert_eq!(test.host.stdout(), "");
}

#[test]
fn deferred_classes_are_requested_once_and_resume_the_thread() {
    let calc = static_method("pkg/Calc", "add", "()I", 2, 0, |code| {
        code.op(iconst_2).op(iconst_3).op(iadd).op(ireturn);
    });
    let source = MapSource::new().deferred();
    let log = source.request_log();
    let mut test = TestVm::new(source);

    let first = test.vm.spawn_invoke("pkg/Calc", "add", "()I", vec![]);
    let second = test.vm.spawn_invoke("pkg/Calc", "add", "()I", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Idle);

    let requests = test.vm.pending_class_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].name, "pkg/Calc");
    test.vm.supply_class(requests[0].token, Some(calc));

    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(returned(&test, first), Some(Value::Int(5)));
    assert_eq!(returned(&test, second), Some(Value::Int(5)));
    assert_eq!(*log.borrow(), vec!["pkg/Calc".to_string()]);
}

#[test]
fn natives_can_wait_on_a_host_ticket() {
    let mut host = ClassWriter::new("pkg/Host", Some(OBJECT));
    host.native_method(PUBLIC_STATIC, "fetch", "()I");
    let mut code = CodeBuilder::new(2, 0);
    code.invoke(invokestatic, "pkg/Host", "fetch", "()I").op(iconst_1).op(iadd).op(ireturn);
    host.method(PUBLIC_STATIC, "compute", "()I", code);

    let mut test = TestVm::with_classes(vec![("pkg/Host", host.finish())]);
    test.vm.register_native("pkg/Host", "fetch", "()I", |vm, thread, _| {
        vm.await_host(thread);
        NativeResult::Suspend
    });

    let thread = test.vm.spawn_invoke("pkg/Host", "compute", "()I", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Idle);

    let tickets = test.vm.pending_host_tickets();
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].1, thread);
    assert!(matches!(test.vm.complete_host(999, HostReply::Return(None)), Err(VmError::UnknownTicket(999))));
    test.vm.complete_host(tickets[0].0, HostReply::Return(Some(Value::Int(41)))).unwrap();

    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(returned(&test, thread), Some(Value::Int(42)));
}

#[test]
fn synchronized_natives_keep_their_lock_while_suspended() {
    let mut host = ClassWriter::new("pkg/Host", Some(OBJECT));
    host.native_method(PUBLIC_STATIC | SYNCHRONIZED, "fetch", "()I");
    let mut code = CodeBuilder::new(3, 0);
    code.invoke(invokestatic, "pkg/Host", "fetch", "()I")
        .ldc(Constant::Class("pkg/Host".to_string()))
        .invoke(invokestatic, "java/lang/Thread", "holdsLock", "(Ljava/lang/Object;)Z")
        .iconst(100).op(imul).op(iadd).op(ireturn);
    host.method(PUBLIC_STATIC, "compute", "()I", code);

    let mut test = TestVm::with_classes(vec![("pkg/Host", host.finish())]);
    test.vm.register_native("pkg/Host", "fetch", "()I", |vm, thread, _| {
        vm.await_host(thread);
        NativeResult::Suspend
    });

    let thread = test.vm.spawn_invoke("pkg/Host", "compute", "()I", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Idle);
    let class = test.vm.loader().lookup("pkg/Host").unwrap();
    let mirror = test.vm.class(class).mirror().unwrap();
    assert!(test.vm.monitors.holds(thread, mirror));

    let ticket = test.vm.pending_host_tickets()[0].0;
    test.vm.complete_host(ticket, HostReply::Return(Some(Value::Int(41)))).unwrap();
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(returned(&test, thread), Some(Value::Int(41)));
    assert!(test.vm.monitors.is_empty());
}

#[test]
fn cache_reset_needs_an_idle_vm() {
    let source = MapSource::new().deferred();
    let mut test = TestVm::new(source);

    test.vm.spawn_invoke("pkg/Calc", "add", "()I", vec![]);
    assert!(matches!(test.vm.reset_class_cache(), Err(VmError::Busy)));

    assert_eq!(test.vm.run(), RunOutcome::Idle);
    let stale = test.vm.pending_class_requests()[0].token;
    test.vm.reset_class_cache().unwrap();
    assert_eq!(test.vm.threads().count(), 0);

    test.vm.supply_class(stale, Some(ClassWriter::new("pkg/Calc", Some(OBJECT)).finish()));
    assert!(test.vm.loader().lookup("pkg/Calc").is_none());
}

fn call(test: &mut TestVm, class: &str, name: &str, descriptor: &str, args: Vec<Value>) -> Option<Value> {
    let thread = test.vm.spawn_invoke(class, name, descriptor, args);
    test.vm.run();
    returned(test, thread)
}

#[test]
fn switches_pick_targets_and_fall_back_to_default() {
    let mut switch = ClassWriter::new("pkg/Switch", Some(OBJECT));

    let mut code = CodeBuilder::new(1, 1);
    let (one, two, three, other) = (code.new_label(), code.new_label(), code.new_label(), code.new_label());
    code.op(iload_0).tableswitch(1, other, &[one, two, three])
        .bind(one).iconst(10).op(ireturn)
        .bind(two).iconst(20).op(ireturn)
        .bind(three).iconst(30).op(ireturn)
        .bind(other).iconst(-1).op(ireturn);
    switch.method(PUBLIC_STATIC, "table", "(I)I", code);

    let mut code = CodeBuilder::new(1, 1);
    let (min, zero, max, other) = (code.new_label(), code.new_label(), code.new_label(), code.new_label());
    code.op(iload_0).lookupswitch(other, &[(i32::MAX, max), (i32::MIN, min), (0, zero)])
        .bind(min).iconst(1).op(ireturn)
        .bind(zero).iconst(2).op(ireturn)
        .bind(max).iconst(3).op(ireturn)
        .bind(other).iconst(0).op(ireturn);
    switch.method(PUBLIC_STATIC, "lookup", "(I)I", code);

    let mut test = TestVm::with_classes(vec![("pkg/Switch", switch.finish())]);
    for (key, expected) in [(0, -1), (1, 10), (3, 30), (4, -1), (i32::MIN, -1), (i32::MAX, -1)] {
        assert_eq!(call(&mut test, "pkg/Switch", "table", "(I)I", vec![Value::Int(key)]), Some(Value::Int(expected)));
    }
    for (key, expected) in [(i32::MIN, 1), (0, 2), (i32::MAX, 3), (5, 0), (-1, 0)] {
        assert_eq!(call(&mut test, "pkg/Switch", "lookup", "(I)I", vec![Value::Int(key)]), Some(Value::Int(expected)));
    }
}

#[test]
fn instanceof_follows_array_covariance() {
    let checks = static_method("pkg/Checks", "run", "()I", 3, 0, |code| {
        code.op(iconst_0).class_op(anewarray, "java/lang/String")
            .class_op(instanceof, "[Ljava/lang/Object;").iconst(1000).op(imul)
            .op(iconst_0).class_op(anewarray, OBJECT)
            .class_op(instanceof, "[Ljava/lang/String;").iconst(100).op(imul).op(iadd)
            .op(iconst_0).class_op(anewarray, "java/lang/String")
            .class_op(instanceof, "java/lang/Cloneable").iconst(10).op(imul).op(iadd)
            .op(aconst_null).class_op(instanceof, OBJECT).op(iadd)
            .op(ireturn);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Checks", checks)]);

    assert_eq!(call(&mut test, "pkg/Checks", "run", "()I", vec![]), Some(Value::Int(1010)));
}

#[test]
fn failed_checkcast_throws_class_cast_exception() {
    let main = main_class("pkg/Cast", 2, 1, |code| {
        code.op(aconst_null).class_op(checkcast, "java/lang/String").op(pop);
        println(code, "null passes");
        code.class_op(new, OBJECT).op(dup).invoke(invokespecial, OBJECT, "<init>", "()V")
            .class_op(checkcast, "java/lang/String").op(pop);
        println(code, "unreachable");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Cast", main)]);

    test.vm.spawn_main("pkg/Cast", vec![]);
    test.vm.run();
    assert_eq!(test.host.stdout(), "null passes\n");
    assert!(test.host.stderr().contains(
        "java.lang.ClassCastException: class java.lang.Object cannot be cast to class java.lang.String"),
            "{}", test.host.stderr());
}

#[test]
fn aastore_checks_the_element_type() {
    let main = main_class("pkg/Store", 5, 2, |code| {
        code.op(iconst_1).class_op(anewarray, "java/lang/String").op(astore_1)
            .op(aload_1).op(iconst_0).ldc(Constant::Str("fits".to_string())).op(aastore);
        println(code, "stored");
        code.op(aload_1).op(iconst_0)
            .class_op(new, OBJECT).op(dup).invoke(invokespecial, OBJECT, "<init>", "()V")
            .op(aastore);
        println(code, "unreachable");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Store", main)]);

    test.vm.spawn_main("pkg/Store", vec![]);
    test.vm.run();
    assert_eq!(test.host.stdout(), "stored\n");
    assert!(test.host.stderr().contains("java.lang.ArrayStoreException: java.lang.Object"), "{}", test.host.stderr());
}

#[test]
fn multianewarray_builds_every_dimension() {
    let arrays = static_method("pkg/Grid", "shape", "()I", 3, 1, |code| {
        code.op(iconst_2).op(iconst_3).multianewarray("[[I", 2).op(astore_0)
            .op(aload_0).op(iconst_1).op(aaload).op(arraylength)
            .op(aload_0).op(arraylength).iconst(10).op(imul).op(iadd)
            .op(aload_0).op(iconst_1).op(aaload).op(iconst_2).op(iaload).op(iadd)
            .op(ireturn);
    });
    let negative = main_class("pkg/Negative", 2, 1, |code| {
        code.op(iconst_2).op(iconst_m1).multianewarray("[[I", 2).op(pop).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Grid", arrays), ("pkg/Negative", negative)]);

    assert_eq!(call(&mut test, "pkg/Grid", "shape", "()I", vec![]), Some(Value::Int(23)));

    test.vm.spawn_main("pkg/Negative", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains("java.lang.NegativeArraySizeException: -1"), "{}", test.host.stderr());
}

#[test]
fn jsr_and_ret_run_a_subroutine_twice() {
    let old = static_method("pkg/Old", "twice", "()I", 1, 2, |code| {
        let subroutine = code.new_label();
        code.op(iconst_0).op(istore_0)
            .branch(jsr, subroutine)
            .branch(jsr, subroutine)
            .op(iload_0).op(ireturn)
            .bind(subroutine).op(astore_1).iinc(0, 5).op_u1(ret, 1);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Old", old)]);

    assert_eq!(call(&mut test, "pkg/Old", "twice", "()I", vec![]), Some(Value::Int(10)));
}

#[test]
fn oversized_arrays_throw_out_of_memory_error() {
    let main = main_class("pkg/Huge", 1, 1, |code| {
        code.iconst(i32::MAX).op_u1(newarray, 11).op(pop).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Huge", main)]);

    let thread = test.vm.spawn_main("pkg/Huge", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert!(matches!(test.vm.thread_outcome(thread), Some(ThreadOutcome::Uncaught(_))));
    assert!(test.host.stderr().contains("java.lang.OutOfMemoryError"), "{}", test.host.stderr());
}
