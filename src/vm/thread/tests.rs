use crate::class_parser::writer::{ClassWriter, CodeBuilder, Constant};
use crate::vm::instructions::Instruction::*;
use crate::vm::testing::{main_class, TestVm, PUBLIC_STATIC};
use crate::vm::thread::scheduler::RunOutcome;
use crate::vm::thread::thread::{ThreadOutcome, ThreadStatus};
use crate::vm::value::Value;

const OBJECT: &str = "java/lang/Object";
const THREAD: &str = "java/lang/Thread";
const SHARED: &str = "pkg/Shared";
const WORKER: &str = "pkg/Worker";

/// A `Thread` subclass whose `run` is `body`; local 1 is free.
fn worker(body: impl FnOnce(&mut CodeBuilder)) -> Vec<u8> {
    let mut writer = ClassWriter::new(WORKER, Some(THREAD));

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokespecial, THREAD, "<init>", "()V").op(_return);
    writer.method(0x0001, "<init>", "()V", code);

    let mut code = CodeBuilder::new(3, 2);
    body(&mut code);
    writer.method(0x0001, "run", "()V", code);
    writer.finish()
}

fn shared() -> Vec<u8> {
    ClassWriter::new(SHARED, Some(OBJECT))
        .field(PUBLIC_STATIC, "lock", "Ljava/lang/Object;")
        .field(PUBLIC_STATIC, "ready", "I")
        .finish()
}

fn println(code: &mut CodeBuilder, text: &str) {
    code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
        .ldc(Constant::Str(text.to_string()))
        .invoke(invokevirtual, "java/io/PrintStream", "println", "(Ljava/lang/String;)V");
}

fn print_bool(code: &mut CodeBuilder, push: impl FnOnce(&mut CodeBuilder)) {
    code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;");
    push(code);
    code.invoke(invokevirtual, "java/io/PrintStream", "println", "(Z)V");
}

fn new_object(code: &mut CodeBuilder) {
    code.class_op(new, OBJECT).op(dup).invoke(invokespecial, OBJECT, "<init>", "()V");
}

/// Creates a worker into local 1 and starts it.
fn start_worker(code: &mut CodeBuilder) {
    code.class_op(new, WORKER).op(dup).invoke(invokespecial, WORKER, "<init>", "()V").op(astore_1)
        .op(aload_1).invoke(invokevirtual, THREAD, "start", "()V");
}

fn sleep(code: &mut CodeBuilder, millis: i64) {
    code.ldc(Constant::Long(millis)).invoke(invokestatic, THREAD, "sleep", "(J)V");
}

fn join(code: &mut CodeBuilder) {
    code.op(aload_1).invoke(invokevirtual, THREAD, "join", "()V");
}

#[test]
fn monitors_are_reentrant() {
    let main = main_class("pkg/Main", 3, 2, |code| {
        new_object(code);
        code.op(astore_1)
            .op(aload_1).op(monitorenter)
            .op(aload_1).op(monitorenter)
            .op(aload_1).op(monitorexit);
        print_bool(code, |c| {
            c.op(aload_1).invoke(invokestatic, THREAD, "holdsLock", "(Ljava/lang/Object;)Z");
        });
        code.op(aload_1).op(monitorexit);
        print_bool(code, |c| {
            c.op(aload_1).invoke(invokestatic, THREAD, "holdsLock", "(Ljava/lang/Object;)Z");
        });
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "true\nfalse\n");
}

#[test]
fn exiting_an_unowned_monitor_throws() {
    let main = main_class("pkg/Main", 2, 2, |code| {
        new_object(code);
        code.op(monitorexit).op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains("java.lang.IllegalMonitorStateException"), "{}", test.host.stderr());
}

#[test]
fn wait_is_released_by_notify_from_another_thread() {
    let worker = worker(|code| {
        code.field(getstatic, SHARED, "lock", "Ljava/lang/Object;").op(dup).op(astore_1).op(monitorenter)
            .op(iconst_1).field(putstatic, SHARED, "ready", "I")
            .field(getstatic, SHARED, "lock", "Ljava/lang/Object;").invoke(invokevirtual, OBJECT, "notify", "()V")
            .op(aload_1).op(monitorexit)
            .op(_return);
    });
    let main = main_class("pkg/Main", 3, 3, |code| {
        new_object(code);
        code.field(putstatic, SHARED, "lock", "Ljava/lang/Object;");
        start_worker(code);

        let (check, done) = (code.new_label(), code.new_label());
        code.field(getstatic, SHARED, "lock", "Ljava/lang/Object;").op(dup).op(astore_2).op(monitorenter)
            .bind(check).field(getstatic, SHARED, "ready", "I").branch(ifne, done)
            .field(getstatic, SHARED, "lock", "Ljava/lang/Object;").invoke(invokevirtual, OBJECT, "wait", "()V")
            .branch(goto, check)
            .bind(done).op(aload_2).op(monitorexit);
        println(code, "notified");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(SHARED, shared()), (WORKER, worker), ("pkg/Main", main)]);

    let thread = test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "notified\n", "{}", test.host.stderr());
    assert_eq!(test.vm.thread_outcome(thread), Some(&ThreadOutcome::Returned(None)));
}

#[test]
fn waiting_with_nobody_to_notify_is_a_deadlock() {
    let main = main_class("pkg/Main", 2, 2, |code| {
        new_object(code);
        code.op(astore_1).op(aload_1).op(monitorenter)
            .op(aload_1).invoke(invokevirtual, OBJECT, "wait", "()V")
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Main", main)]);

    let thread = test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Deadlocked);
    assert!(matches!(test.vm.thread_status(thread), Some(ThreadStatus::Waiting { timed: false, .. })));
}

#[test]
fn sleep_advances_the_manual_clock() {
    let mut code = CodeBuilder::new(2, 0);
    sleep(&mut code, 1000);
    code.invoke(invokestatic, "java/lang/System", "currentTimeMillis", "()J").op(lreturn);
    let clock = ClassWriter::new("pkg/Clock", Some(OBJECT))
        .method(PUBLIC_STATIC, "nap", "()J", code)
        .finish();
    let mut test = TestVm::with_classes(vec![("pkg/Clock", clock)]);

    let thread = test.vm.spawn_invoke("pkg/Clock", "nap", "()J", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.vm.thread_outcome(thread), Some(&ThreadOutcome::Returned(Some(Value::Long(1000)))));
}

#[test]
fn join_waits_for_termination() {
    let worker = worker(|code| {
        sleep(code, 5);
        println(code, "worker");
        code.op(_return);
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        start_worker(code);
        join(code);
        println(code, "main");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "worker\nmain\n");
    assert!(test.vm.threads().all(|t| t.status == ThreadStatus::Terminated));
}

#[test]
fn unpark_releases_a_parked_thread() {
    let worker = worker(|code| {
        code.invoke(invokestatic, "java/util/concurrent/locks/LockSupport", "park", "()V");
        println(code, "unparked");
        code.op(_return);
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        start_worker(code);
        sleep(code, 10);
        code.op(aload_1).invoke(invokestatic, "java/util/concurrent/locks/LockSupport", "unpark", "(Ljava/lang/Thread;)V");
        join(code);
        println(code, "done");
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "unparked\ndone\n");
}

#[test]
fn timed_park_returns_after_the_timeout() {
    let mut code = CodeBuilder::new(2, 0);
    code.ldc(Constant::Long(5_000_000))
        .invoke(invokestatic, "java/util/concurrent/locks/LockSupport", "parkNanos", "(J)V")
        .invoke(invokestatic, "java/lang/System", "nanoTime", "()J")
        .op(lreturn);
    let class = ClassWriter::new("pkg/Nap", Some(OBJECT))
        .method(PUBLIC_STATIC, "nap", "()J", code)
        .finish();
    let mut test = TestVm::with_classes(vec![("pkg/Nap", class)]);

    let thread = test.vm.spawn_invoke("pkg/Nap", "nap", "()J", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.vm.thread_outcome(thread), Some(&ThreadOutcome::Returned(Some(Value::Long(5_000_000)))));
}

#[test]
fn interrupt_wakes_a_sleeping_thread() {
    let worker = worker(|code| {
        let (start, end, handler) = (code.new_label(), code.new_label(), code.new_label());
        code.bind(start);
        sleep(code, 10_000);
        code.bind(end);
        println(code, "slept");
        code.op(_return).bind(handler).op(pop);
        println(code, "interrupted");
        code.op(_return)
            .handler(start, end, handler, Some("java/lang/InterruptedException"));
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        start_worker(code);
        sleep(code, 10);
        code.op(aload_1).invoke(invokevirtual, THREAD, "interrupt", "()V");
        join(code);
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "interrupted\n");
}

#[test]
fn interrupted_clears_the_flag() {
    let main = main_class("pkg/Main", 2, 1, |code| {
        code.invoke(invokestatic, THREAD, "currentThread", "()Ljava/lang/Thread;")
            .invoke(invokevirtual, THREAD, "interrupt", "()V");
        for _ in 0..2 {
            print_bool(code, |c| {
                c.invoke(invokestatic, THREAD, "interrupted", "()Z");
            });
        }
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert_eq!(test.host.stdout(), "true\nfalse\n");
}

#[test]
fn the_main_thread_object_is_named_main() {
    let main = main_class("pkg/Main", 2, 1, |code| {
        code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
            .invoke(invokestatic, THREAD, "currentThread", "()Ljava/lang/Thread;")
            .invoke(invokevirtual, THREAD, "getName", "()Ljava/lang/String;")
            .invoke(invokevirtual, "java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert_eq!(test.host.stdout(), "main\n");
}

#[test]
fn daemon_threads_do_not_keep_the_vm_alive() {
    let worker = worker(|code| {
        code.invoke(invokestatic, "java/util/concurrent/locks/LockSupport", "park", "()V").op(_return);
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        code.class_op(new, WORKER).op(dup).invoke(invokespecial, WORKER, "<init>", "()V").op(astore_1)
            .op(aload_1).op(iconst_1).invoke(invokevirtual, THREAD, "setDaemon", "(Z)V")
            .op(aload_1).invoke(invokevirtual, THREAD, "start", "()V")
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![(WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    let daemon = test.vm.threads().find(|t| t.daemon).map(|t| t.status);
    assert!(daemon.map_or(false, |status| status.is_alive()));
}

#[test]
fn starting_a_thread_twice_throws() {
    let worker = worker(|code| {
        code.op(_return);
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        start_worker(code);
        code.op(aload_1).invoke(invokevirtual, THREAD, "start", "()V").op(_return);
    });
    let mut test = TestVm::with_classes(vec![(WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    test.vm.run();
    assert!(test.host.stderr().contains("java.lang.IllegalThreadStateException"), "{}", test.host.stderr());
}

const LOCK: &str = "Ljava/lang/Object;";

fn hold_check(code: &mut CodeBuilder, local: u8) {
    print_bool(code, |c| {
        c.op_u1(aload, local).invoke(invokestatic, THREAD, "holdsLock", "(Ljava/lang/Object;)Z");
    });
}

fn print_millis(code: &mut CodeBuilder) {
    code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
        .invoke(invokestatic, "java/lang/System", "currentTimeMillis", "()J")
        .invoke(invokevirtual, "java/io/PrintStream", "println", "(J)V");
}

#[test]
fn a_reentrant_owner_must_exit_every_entry_before_a_contender_gets_in() {
    let worker = worker(|code| {
        code.field(getstatic, SHARED, "lock", LOCK).op(dup).op(astore_1).op(monitorenter);
        println(code, "worker");
        code.op(aload_1).op(monitorexit).op(_return);
    });
    let main = main_class("pkg/Main", 3, 3, |code| {
        new_object(code);
        code.op(dup).op(astore_2).field(putstatic, SHARED, "lock", LOCK)
            .op(aload_2).op(monitorenter)
            .op(aload_2).op(monitorenter);
        start_worker(code);
        sleep(code, 10);
        println(code, "main1");
        code.op(aload_2).op(monitorexit);
        sleep(code, 10);
        println(code, "main2");
        code.op(aload_2).op(monitorexit);
        join(code);
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(SHARED, shared()), (WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "main1\nmain2\nworker\n", "{}", test.host.stderr());
    assert!(test.vm.monitors.is_empty());
}

#[test]
fn synchronized_methods_release_on_return_and_on_unwind() {
    const GUARDED: &str = "pkg/Guarded";
    let mut writer = ClassWriter::new(GUARDED, Some(OBJECT));

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokespecial, OBJECT, "<init>", "()V").op(_return);
    writer.method(0x0001, "<init>", "()V", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokestatic, THREAD, "holdsLock", "(Ljava/lang/Object;)Z").op(ireturn);
    writer.method(0x0021, "held", "()Z", code);

    let mut code = CodeBuilder::new(2, 1);
    code.class_op(new, "java/lang/RuntimeException").op(dup)
        .invoke(invokespecial, "java/lang/RuntimeException", "<init>", "()V")
        .op(athrow);
    writer.method(0x0021, "fail", "()V", code);

    let mut code = CodeBuilder::new(1, 0);
    code.ldc(Constant::Class(GUARDED.to_string()))
        .invoke(invokestatic, THREAD, "holdsLock", "(Ljava/lang/Object;)Z").op(ireturn);
    writer.method(PUBLIC_STATIC | 0x0020, "classHeld", "()Z", code);
    let guarded = writer.finish();

    let main = main_class("pkg/Main", 3, 2, |code| {
        code.class_op(new, GUARDED).op(dup).invoke(invokespecial, GUARDED, "<init>", "()V").op(astore_1);
        print_bool(code, |c| {
            c.op(aload_1).invoke(invokevirtual, GUARDED, "held", "()Z");
        });
        hold_check(code, 1);

        let (start, end, handler, after) = (code.new_label(), code.new_label(), code.new_label(), code.new_label());
        code.bind(start).op(aload_1).invoke(invokevirtual, GUARDED, "fail", "()V").bind(end)
            .branch(goto, after)
            .bind(handler).op(pop)
            .bind(after)
            .handler(start, end, handler, Some("java/lang/RuntimeException"));
        hold_check(code, 1);

        print_bool(code, |c| {
            c.invoke(invokestatic, GUARDED, "classHeld", "()Z");
        });
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(GUARDED, guarded), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "true\nfalse\nfalse\ntrue\n", "{}", test.host.stderr());
    assert!(test.vm.monitors.is_empty());
}

#[test]
fn timed_wait_times_out_and_reacquires_the_monitor() {
    let worker = worker(|code| {
        code.field(getstatic, SHARED, "lock", LOCK).op(dup).op(astore_1).op(monitorenter);
        sleep(code, 100);
        println(code, "worker");
        code.op(aload_1).op(monitorexit).op(_return);
    });
    let main = main_class("pkg/Main", 3, 3, |code| {
        new_object(code);
        code.op(dup).op(astore_2).field(putstatic, SHARED, "lock", LOCK)
            .op(aload_2).op(monitorenter);
        start_worker(code);
        code.op(aload_2).ldc(Constant::Long(50)).invoke(invokevirtual, OBJECT, "wait", "(J)V");
        hold_check(code, 2);
        print_millis(code);
        code.op(aload_2).op(monitorexit).op(_return);
    });
    let mut test = TestVm::with_classes(vec![(SHARED, shared()), (WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "worker\ntrue\n100\n", "{}", test.host.stderr());
}

#[test]
fn an_interrupted_waiter_throws_only_after_reacquiring() {
    let worker = worker(|code| {
        let (start, end, handler) = (code.new_label(), code.new_label(), code.new_label());
        code.field(getstatic, SHARED, "lock", LOCK).op(dup).op(astore_1).op(monitorenter)
            .bind(start).op(aload_1).invoke(invokevirtual, OBJECT, "wait", "()V").bind(end);
        println(code, "notified");
        code.op(aload_1).op(monitorexit).op(_return);

        code.bind(handler)
            .invoke(invokevirtual, "java/lang/Throwable", "getMessage", "()Ljava/lang/String;")
            .op(astore_0);
        hold_check(code, 1);
        code.field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;").op(aload_0)
            .invoke(invokevirtual, "java/io/PrintStream", "println", "(Ljava/lang/String;)V")
            .op(aload_1).op(monitorexit).op(_return)
            .handler(start, end, handler, Some("java/lang/InterruptedException"));
    });
    let main = main_class("pkg/Main", 3, 3, |code| {
        new_object(code);
        code.op(dup).op(astore_2).field(putstatic, SHARED, "lock", LOCK);
        start_worker(code);
        sleep(code, 10);
        code.op(aload_2).op(monitorenter)
            .op(aload_1).invoke(invokevirtual, THREAD, "interrupt", "()V");
        println(code, "main");
        code.op(aload_2).op(monitorexit);
        join(code);
        code.op(_return);
    });
    let mut test = TestVm::with_classes(vec![(SHARED, shared()), (WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "main\ntrue\nwait interrupted\n", "{}", test.host.stderr());
}

#[test]
fn notify_all_wakes_every_waiter_in_arrival_order() {
    // each worker takes a ticket, waits, then prints the ticket
    let worker = worker(|code| {
        code.field(getstatic, SHARED, "lock", LOCK).op(dup).op(astore_1).op(monitorenter)
            .field(getstatic, SHARED, "ready", "I").op(iconst_1).op(iadd).op(dup)
            .field(putstatic, SHARED, "ready", "I")
            .op(aload_1).invoke(invokevirtual, OBJECT, "wait", "()V")
            .field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;").op(swap)
            .invoke(invokevirtual, "java/io/PrintStream", "println", "(I)V")
            .op(aload_1).op(monitorexit).op(_return);
    });
    let main = main_class("pkg/Main", 3, 2, |code| {
        new_object(code);
        code.field(putstatic, SHARED, "lock", LOCK);
        for _ in 0..3 {
            code.class_op(new, WORKER).op(dup).invoke(invokespecial, WORKER, "<init>", "()V")
                .invoke(invokevirtual, THREAD, "start", "()V");
        }
        sleep(code, 10);
        code.field(getstatic, SHARED, "lock", LOCK).op(dup).op(astore_1).op(monitorenter)
            .field(getstatic, "java/lang/System", "out", "Ljava/io/PrintStream;")
            .field(getstatic, SHARED, "ready", "I")
            .invoke(invokevirtual, "java/io/PrintStream", "println", "(I)V")
            .op(aload_1).invoke(invokevirtual, OBJECT, "notifyAll", "()V")
            .op(aload_1).op(monitorexit)
            .op(_return);
    });
    let mut test = TestVm::with_classes(vec![(SHARED, shared()), (WORKER, worker), ("pkg/Main", main)]);

    test.vm.spawn_main("pkg/Main", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.host.stdout(), "3\n1\n2\n3\n", "{}", test.host.stderr());
    assert!(test.vm.monitors.is_empty());
}

#[test]
fn unsafe_park_takes_relative_nanos_or_an_absolute_deadline() {
    const UNSAFE: &str = "sun/misc/Unsafe";
    let park = |code: &mut CodeBuilder, absolute: bool, time: i64| {
        code.op(aload_0).op(if absolute { iconst_1 } else { iconst_0 })
            .ldc(Constant::Long(time))
            .invoke(invokevirtual, UNSAFE, "park", "(ZJ)V");
    };

    let mut code = CodeBuilder::new(4, 1);
    code.invoke(invokestatic, UNSAFE, "getUnsafe", "()Lsun/misc/Unsafe;").op(astore_0);
    park(&mut code, false, 5_000_000);
    code.invoke(invokestatic, "java/lang/System", "currentTimeMillis", "()J")
        .field(putstatic, "pkg/Nap", "relative", "J");
    park(&mut code, true, 20);
    // a deadline in the past returns at once
    park(&mut code, true, 3);
    code.invoke(invokestatic, "java/lang/System", "currentTimeMillis", "()J").op(lreturn);

    let mut writer = ClassWriter::new("pkg/Nap", Some(OBJECT));
    writer.field(PUBLIC_STATIC, "relative", "J");
    writer.method(PUBLIC_STATIC, "nap", "()J", code);
    let nap = writer.finish();
    let mut test = TestVm::with_classes(vec![("pkg/Nap", nap)]);

    let thread = test.vm.spawn_invoke("pkg/Nap", "nap", "()J", vec![]);
    assert_eq!(test.vm.run(), RunOutcome::Finished);
    assert_eq!(test.vm.static_field("pkg/Nap", "relative"), Some(Value::Long(5)));
    assert_eq!(test.vm.thread_outcome(thread), Some(&ThreadOutcome::Returned(Some(Value::Long(20)))));
}
