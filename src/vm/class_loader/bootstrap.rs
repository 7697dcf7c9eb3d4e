use std::collections::HashMap;
use crate::class_parser::writer::{ClassWriter, CodeBuilder};
use crate::vm::class_loader::resolve::OBJECT;
use crate::vm::instructions::Instruction::*;

const PUBLIC: u16 = 0x0001;
const PRIVATE: u16 = 0x0002;
const PROTECTED: u16 = 0x0004;
const STATIC: u16 = 0x0008;
const FINAL: u16 = 0x0010;
const SYNCHRONIZED: u16 = 0x0020;

pub const STRING: &str = "java/lang/String";
pub const THROWABLE: &str = "java/lang/Throwable";
pub const THREAD: &str = "java/lang/Thread";

/// Exception and error classes the VM itself may throw, each with its superclass.
const THROWABLES: &[(&str, &str)] = &[
    ("java/lang/Exception", THROWABLE),
    ("java/lang/Error", THROWABLE),
    ("java/lang/RuntimeException", "java/lang/Exception"),
    ("java/lang/InterruptedException", "java/lang/Exception"),
    ("java/lang/CloneNotSupportedException", "java/lang/Exception"),
    ("java/lang/ReflectiveOperationException", "java/lang/Exception"),
    ("java/lang/ClassNotFoundException", "java/lang/ReflectiveOperationException"),
    ("java/lang/ArithmeticException", "java/lang/RuntimeException"),
    ("java/lang/NullPointerException", "java/lang/RuntimeException"),
    ("java/lang/ClassCastException", "java/lang/RuntimeException"),
    ("java/lang/ArrayStoreException", "java/lang/RuntimeException"),
    ("java/lang/NegativeArraySizeException", "java/lang/RuntimeException"),
    ("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException"),
    ("java/lang/ArrayIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/StringIndexOutOfBoundsException", "java/lang/IndexOutOfBoundsException"),
    ("java/lang/IllegalArgumentException", "java/lang/RuntimeException"),
    ("java/lang/IllegalThreadStateException", "java/lang/IllegalArgumentException"),
    ("java/lang/IllegalMonitorStateException", "java/lang/RuntimeException"),
    ("java/lang/UnsupportedOperationException", "java/lang/RuntimeException"),
    ("java/lang/LinkageError", "java/lang/Error"),
    ("java/lang/NoClassDefFoundError", "java/lang/LinkageError"),
    ("java/lang/ClassFormatError", "java/lang/LinkageError"),
    ("java/lang/UnsupportedClassVersionError", "java/lang/ClassFormatError"),
    ("java/lang/ClassCircularityError", "java/lang/LinkageError"),
    ("java/lang/UnsatisfiedLinkError", "java/lang/LinkageError"),
    ("java/lang/ExceptionInInitializerError", "java/lang/LinkageError"),
    ("java/lang/IncompatibleClassChangeError", "java/lang/LinkageError"),
    ("java/lang/InstantiationError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchFieldError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/NoSuchMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/AbstractMethodError", "java/lang/IncompatibleClassChangeError"),
    ("java/lang/VirtualMachineError", "java/lang/Error"),
    ("java/lang/StackOverflowError", "java/lang/VirtualMachineError"),
    ("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError"),
    ("java/lang/InternalError", "java/lang/VirtualMachineError"),
];

/// Class files of the minimal `java.lang` core, keyed by internal name.
pub fn runtime_classes() -> HashMap<String, Vec<u8>> {
    let mut classes = HashMap::new();
    let mut add = |name: &str, bytes: Vec<u8>| {
        classes.insert(name.to_string(), bytes);
    };

    add(OBJECT, object());
    add("java/lang/Class", class());
    add(STRING, string());
    add("java/lang/StringBuilder", string_builder());
    add("java/lang/Cloneable", ClassWriter::interface("java/lang/Cloneable").finish());
    add("java/io/Serializable", ClassWriter::interface("java/io/Serializable").finish());
    add("java/lang/Runnable", ClassWriter::interface("java/lang/Runnable")
        .abstract_method(PUBLIC, "run", "()V")
        .finish());
    add(THROWABLE, throwable());
    for &(name, super_name) in THROWABLES {
        add(name, exception(name, super_name));
    }
    add(THREAD, thread());
    add("java/lang/System", system());
    add("java/io/PrintStream", print_stream());
    add("java/util/concurrent/locks/LockSupport", lock_support());
    add("sun/misc/Unsafe", unsafe_class());
    classes
}

fn super_init(code: &mut CodeBuilder, super_name: &str) {
    code.op(aload_0).invoke(invokespecial, super_name, "<init>", "()V");
}

fn default_constructor(writer: &mut ClassWriter, super_name: &str) {
    let mut code = CodeBuilder::new(1, 1);
    super_init(&mut code, super_name);
    code.op(_return);
    writer.method(PUBLIC, "<init>", "()V", code);
}

fn object() -> Vec<u8> {
    let mut writer = ClassWriter::new(OBJECT, None);

    let mut code = CodeBuilder::new(0, 1);
    code.op(_return);
    writer.method(PUBLIC, "<init>", "()V", code);

    let mut code = CodeBuilder::new(2, 2);
    let different = code.new_label();
    code.op(aload_0).op(aload_1).branch(if_acmpne, different)
        .op(iconst_1).op(ireturn)
        .bind(different).op(iconst_0).op(ireturn);
    writer.method(PUBLIC, "equals", "(Ljava/lang/Object;)Z", code);

    let mut code = CodeBuilder::new(3, 1);
    code.op(aload_0).op(lconst_0).invoke(invokevirtual, OBJECT, "wait", "(J)V").op(_return);
    writer.method(PUBLIC | FINAL, "wait", "()V", code);

    writer
        .native_method(PUBLIC, "hashCode", "()I")
        .native_method(PUBLIC, "toString", "()Ljava/lang/String;")
        .native_method(PUBLIC | FINAL, "getClass", "()Ljava/lang/Class;")
        .native_method(PROTECTED, "clone", "()Ljava/lang/Object;")
        .native_method(PUBLIC | FINAL, "wait", "(J)V")
        .native_method(PUBLIC | FINAL, "notify", "()V")
        .native_method(PUBLIC | FINAL, "notifyAll", "()V")
        .finish()
}

fn class() -> Vec<u8> {
    let mut writer = ClassWriter::new("java/lang/Class", Some(OBJECT));
    writer.access_flags(PUBLIC | FINAL | 0x0020);
    writer
        .native_method(PUBLIC, "getName", "()Ljava/lang/String;")
        .native_method(PUBLIC, "isInterface", "()Z")
        .native_method(PUBLIC, "isArray", "()Z")
        .finish()
}

fn string() -> Vec<u8> {
    let mut writer = ClassWriter::new(STRING, Some(OBJECT));
    writer.access_flags(PUBLIC | FINAL | 0x0020);
    writer.implements("java/io/Serializable");
    writer.field(PRIVATE | FINAL, "value", "[C");

    let mut code = CodeBuilder::new(2, 1);
    super_init(&mut code, OBJECT);
    code.op(aload_0).op(iconst_0).op_u1(newarray, 5).field(putfield, STRING, "value", "[C").op(_return);
    writer.method(PUBLIC, "<init>", "()V", code);

    let mut code = CodeBuilder::new(5, 2);
    super_init(&mut code, OBJECT);
    code.op(aload_0).op(aload_1).op(arraylength).op_u1(newarray, 5).field(putfield, STRING, "value", "[C")
        .op(aload_1).op(iconst_0)
        .op(aload_0).field(getfield, STRING, "value", "[C").op(iconst_0)
        .op(aload_1).op(arraylength)
        .invoke(invokestatic, "java/lang/System", "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V")
        .op(_return);
    writer.method(PUBLIC, "<init>", "([C)V", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).field(getfield, STRING, "value", "[C").op(arraylength).op(ireturn);
    writer.method(PUBLIC, "length", "()I", code);

    let mut code = CodeBuilder::new(2, 2);
    code.op(aload_0).field(getfield, STRING, "value", "[C").op(iload_1).op(caload).op(ireturn);
    writer.method(PUBLIC, "charAt", "(I)C", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).op(areturn);
    writer.method(PUBLIC, "toString", "()Ljava/lang/String;", code);

    writer
        .native_method(PUBLIC, "hashCode", "()I")
        .native_method(PUBLIC, "equals", "(Ljava/lang/Object;)Z")
        .native_method(PUBLIC, "intern", "()Ljava/lang/String;")
        .native_method(PUBLIC, "concat", "(Ljava/lang/String;)Ljava/lang/String;")
        .native_method(PUBLIC | STATIC, "valueOf", "(I)Ljava/lang/String;")
        .native_method(PUBLIC | STATIC, "valueOf", "(J)Ljava/lang/String;")
        .native_method(PUBLIC | STATIC, "valueOf", "(C)Ljava/lang/String;")
        .finish()
}

fn string_builder() -> Vec<u8> {
    const NAME: &str = "java/lang/StringBuilder";
    let mut writer = ClassWriter::new(NAME, Some(OBJECT));
    writer.access_flags(PUBLIC | FINAL | 0x0020);
    writer.field(PRIVATE, "text", "Ljava/lang/String;");
    default_constructor(&mut writer, OBJECT);

    let mut code = CodeBuilder::new(2, 2);
    super_init(&mut code, OBJECT);
    code.op(aload_0).op(aload_1)
        .invoke(invokevirtual, NAME, "append", "(Ljava/lang/String;)Ljava/lang/StringBuilder;")
        .op(pop).op(_return);
    writer.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", code);

    for arg in ["Ljava/lang/String;", "Ljava/lang/Object;", "I", "J", "C", "Z", "D"] {
        writer.native_method(PUBLIC, "append", &format!("({})Ljava/lang/StringBuilder;", arg));
    }
    writer
        .native_method(PUBLIC, "length", "()I")
        .native_method(PUBLIC, "toString", "()Ljava/lang/String;")
        .finish()
}

fn throwable() -> Vec<u8> {
    let mut writer = ClassWriter::new(THROWABLE, Some(OBJECT));
    writer.implements("java/io/Serializable");
    writer
        .field(PRIVATE, "detailMessage", "Ljava/lang/String;")
        .field(PRIVATE, "cause", "Ljava/lang/Throwable;");

    let constructors: [(&str, &[(u8, &str, &str)]); 4] = [
        ("()V", &[]),
        ("(Ljava/lang/String;)V", &[(1, "detailMessage", "Ljava/lang/String;")]),
        ("(Ljava/lang/String;Ljava/lang/Throwable;)V",
         &[(1, "detailMessage", "Ljava/lang/String;"), (2, "cause", "Ljava/lang/Throwable;")]),
        ("(Ljava/lang/Throwable;)V", &[(1, "cause", "Ljava/lang/Throwable;")]),
    ];
    for (descriptor, stores) in constructors {
        let mut code = CodeBuilder::new(2, 3);
        super_init(&mut code, OBJECT);
        for (local, field, field_descriptor) in stores {
            code.op(aload_0).op_u1(aload, *local).field(putfield, THROWABLE, field, field_descriptor);
        }
        code.op(aload_0).invoke(invokevirtual, THROWABLE, "fillInStackTrace", "()Ljava/lang/Throwable;")
            .op(pop).op(_return);
        writer.method(PUBLIC, "<init>", descriptor, code);
    }

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).field(getfield, THROWABLE, "detailMessage", "Ljava/lang/String;").op(areturn);
    writer.method(PUBLIC, "getMessage", "()Ljava/lang/String;", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).field(getfield, THROWABLE, "cause", "Ljava/lang/Throwable;").op(areturn);
    writer.method(PUBLIC, "getCause", "()Ljava/lang/Throwable;", code);

    let mut code = CodeBuilder::new(2, 2);
    code.op(aload_0).op(aload_1).field(putfield, THROWABLE, "cause", "Ljava/lang/Throwable;")
        .op(aload_0).op(areturn);
    writer.method(PUBLIC | SYNCHRONIZED, "initCause", "(Ljava/lang/Throwable;)Ljava/lang/Throwable;", code);

    writer
        .native_method(PUBLIC | SYNCHRONIZED, "fillInStackTrace", "()Ljava/lang/Throwable;")
        .native_method(PUBLIC, "printStackTrace", "()V")
        .native_method(PUBLIC, "toString", "()Ljava/lang/String;")
        .finish()
}

fn exception(name: &str, super_name: &str) -> Vec<u8> {
    let mut writer = ClassWriter::new(name, Some(super_name));
    default_constructor(&mut writer, super_name);

    let mut code = CodeBuilder::new(2, 2);
    code.op(aload_0).op(aload_1)
        .invoke(invokespecial, super_name, "<init>", "(Ljava/lang/String;)V")
        .op(_return);
    writer.method(PUBLIC, "<init>", "(Ljava/lang/String;)V", code);
    writer.finish()
}

fn thread() -> Vec<u8> {
    let mut writer = ClassWriter::new(THREAD, Some(OBJECT));
    writer.implements("java/lang/Runnable");
    writer
        .field(PRIVATE, "name", "Ljava/lang/String;")
        .field(PRIVATE, "target", "Ljava/lang/Runnable;")
        .field(PRIVATE, "daemon", "Z")
        .field(PRIVATE, "priority", "I")
        .field(PRIVATE, "tid", "J");

    let constructors: [(&str, &[(u8, &str, &str)]); 4] = [
        ("()V", &[]),
        ("(Ljava/lang/Runnable;)V", &[(1, "target", "Ljava/lang/Runnable;")]),
        ("(Ljava/lang/String;)V", &[(1, "name", "Ljava/lang/String;")]),
        ("(Ljava/lang/Runnable;Ljava/lang/String;)V",
         &[(1, "target", "Ljava/lang/Runnable;"), (2, "name", "Ljava/lang/String;")]),
    ];
    for (descriptor, stores) in constructors {
        let mut code = CodeBuilder::new(2, 3);
        super_init(&mut code, OBJECT);
        code.op(aload_0).iconst(5).field(putfield, THREAD, "priority", "I");
        for (local, field, field_descriptor) in stores {
            code.op(aload_0).op_u1(aload, *local).field(putfield, THREAD, field, field_descriptor);
        }
        code.op(_return);
        writer.method(PUBLIC, "<init>", descriptor, code);
    }

    let mut code = CodeBuilder::new(1, 2);
    let done = code.new_label();
    code.op(aload_0).field(getfield, THREAD, "target", "Ljava/lang/Runnable;").op(astore_1)
        .op(aload_1).branch(ifnull, done)
        .op(aload_1).invoke(invokeinterface, "java/lang/Runnable", "run", "()V")
        .bind(done).op(_return);
    writer.method(PUBLIC, "run", "()V", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokespecial, THREAD, "start0", "()V").op(_return);
    writer.method(PUBLIC | SYNCHRONIZED, "start", "()V", code);

    let mut code = CodeBuilder::new(1, 1);
    code.op(aload_0).invoke(invokespecial, THREAD, "interrupt0", "()V").op(_return);
    writer.method(PUBLIC, "interrupt", "()V", code);

    let mut code = CodeBuilder::new(2, 1);
    code.op(aload_0).op(iconst_0).invoke(invokespecial, THREAD, "isInterrupted", "(Z)Z").op(ireturn);
    writer.method(PUBLIC, "isInterrupted", "()Z", code);

    let mut code = CodeBuilder::new(2, 0);
    code.invoke(invokestatic, THREAD, "currentThread", "()Ljava/lang/Thread;")
        .op(iconst_1).invoke(invokespecial, THREAD, "isInterrupted", "(Z)Z").op(ireturn);
    writer.method(PUBLIC | STATIC, "interrupted", "()Z", code);

    // waits on the thread object until termination notifies it
    let mut code = CodeBuilder::new(3, 1);
    let (check, done) = (code.new_label(), code.new_label());
    code.bind(check).op(aload_0).invoke(invokevirtual, THREAD, "isAlive", "()Z").branch(ifeq, done)
        .op(aload_0).op(lconst_0).invoke(invokevirtual, OBJECT, "wait", "(J)V")
        .branch(goto, check)
        .bind(done).op(_return);
    writer.method(PUBLIC | FINAL | SYNCHRONIZED, "join", "()V", code);

    let getters: [(&str, &str, &str, crate::vm::instructions::Instruction); 4] = [
        ("getName", "name", "Ljava/lang/String;", areturn),
        ("isDaemon", "daemon", "Z", ireturn),
        ("getPriority", "priority", "I", ireturn),
        ("getId", "tid", "J", lreturn),
    ];
    for (method, field, descriptor, ret_op) in getters {
        let mut code = CodeBuilder::new(2, 1);
        code.op(aload_0).field(getfield, THREAD, field, descriptor).op(ret_op);
        writer.method(PUBLIC | FINAL, method, &format!("(){}", descriptor), code);
    }

    let setters: [(&str, &str, &str, crate::vm::instructions::Instruction); 3] = [
        ("setName", "name", "Ljava/lang/String;", aload_1),
        ("setDaemon", "daemon", "Z", iload_1),
        ("setPriority", "priority", "I", iload_1),
    ];
    for (method, field, descriptor, load) in setters {
        let mut code = CodeBuilder::new(2, 2);
        code.op(aload_0).op(load).field(putfield, THREAD, field, descriptor).op(_return);
        writer.method(PUBLIC | FINAL, method, &format!("({})V", descriptor), code);
    }

    writer
        .native_method(PRIVATE, "start0", "()V")
        .native_method(PRIVATE, "interrupt0", "()V")
        .native_method(PRIVATE, "isInterrupted", "(Z)Z")
        .native_method(PUBLIC | FINAL, "isAlive", "()Z")
        .native_method(PUBLIC | STATIC, "currentThread", "()Ljava/lang/Thread;")
        .native_method(PUBLIC | STATIC, "sleep", "(J)V")
        .native_method(PUBLIC | STATIC, "yield", "()V")
        .native_method(PUBLIC | STATIC, "holdsLock", "(Ljava/lang/Object;)Z")
        .finish()
}

fn system() -> Vec<u8> {
    const NAME: &str = "java/lang/System";
    let mut writer = ClassWriter::new(NAME, Some(OBJECT));
    writer.access_flags(PUBLIC | FINAL | 0x0020);
    writer
        .field(PUBLIC | STATIC | FINAL, "out", "Ljava/io/PrintStream;")
        .field(PUBLIC | STATIC | FINAL, "err", "Ljava/io/PrintStream;");

    let mut code = CodeBuilder::new(3, 0);
    for (fd, field) in [(1, "out"), (2, "err")] {
        code.class_op(new, "java/io/PrintStream").op(dup).iconst(fd)
            .invoke(invokespecial, "java/io/PrintStream", "<init>", "(I)V")
            .field(putstatic, NAME, field, "Ljava/io/PrintStream;");
    }
    code.op(_return);
    writer.method(STATIC, "<clinit>", "()V", code);

    writer
        .native_method(PUBLIC | STATIC, "exit", "(I)V")
        .native_method(PUBLIC | STATIC, "currentTimeMillis", "()J")
        .native_method(PUBLIC | STATIC, "nanoTime", "()J")
        .native_method(PUBLIC | STATIC, "arraycopy", "(Ljava/lang/Object;ILjava/lang/Object;II)V")
        .native_method(PUBLIC | STATIC, "identityHashCode", "(Ljava/lang/Object;)I")
        .finish()
}

pub const PRINTED_TYPES: [&str; 7] = ["Ljava/lang/String;", "Ljava/lang/Object;", "I", "J", "C", "Z", "D"];

fn print_stream() -> Vec<u8> {
    const NAME: &str = "java/io/PrintStream";
    let mut writer = ClassWriter::new(NAME, Some(OBJECT));
    writer.field(PRIVATE | FINAL, "fd", "I");

    let mut code = CodeBuilder::new(2, 2);
    super_init(&mut code, OBJECT);
    code.op(aload_0).op(iload_1).field(putfield, NAME, "fd", "I").op(_return);
    writer.method(PUBLIC, "<init>", "(I)V", code);

    let mut code = CodeBuilder::new(0, 1);
    code.op(_return);
    writer.method(PUBLIC, "flush", "()V", code);

    for arg in PRINTED_TYPES {
        writer.native_method(PUBLIC, "print", &format!("({})V", arg));
        writer.native_method(PUBLIC, "println", &format!("({})V", arg));
    }
    writer.native_method(PUBLIC, "println", "()V").finish()
}

fn lock_support() -> Vec<u8> {
    let mut writer = ClassWriter::new("java/util/concurrent/locks/LockSupport", Some(OBJECT));
    writer
        .native_method(PUBLIC | STATIC, "park", "()V")
        .native_method(PUBLIC | STATIC, "parkNanos", "(J)V")
        .native_method(PUBLIC | STATIC, "unpark", "(Ljava/lang/Thread;)V")
        .finish()
}

fn unsafe_class() -> Vec<u8> {
    const NAME: &str = "sun/misc/Unsafe";
    let mut writer = ClassWriter::new(NAME, Some(OBJECT));
    writer.access_flags(PUBLIC | FINAL | 0x0020);
    writer.field(PRIVATE | STATIC | FINAL, "theUnsafe", "Lsun/misc/Unsafe;");

    let mut code = CodeBuilder::new(1, 1);
    super_init(&mut code, OBJECT);
    code.op(_return);
    writer.method(PRIVATE, "<init>", "()V", code);

    let mut code = CodeBuilder::new(2, 0);
    code.class_op(new, NAME).op(dup).invoke(invokespecial, NAME, "<init>", "()V")
        .field(putstatic, NAME, "theUnsafe", "Lsun/misc/Unsafe;").op(_return);
    writer.method(STATIC, "<clinit>", "()V", code);

    let mut code = CodeBuilder::new(1, 0);
    code.field(getstatic, NAME, "theUnsafe", "Lsun/misc/Unsafe;").op(areturn);
    writer.method(PUBLIC | STATIC, "getUnsafe", "()Lsun/misc/Unsafe;", code);

    writer
        .native_method(PUBLIC, "park", "(ZJ)V")
        .native_method(PUBLIC, "unpark", "(Ljava/lang/Object;)V")
        .finish()
}
