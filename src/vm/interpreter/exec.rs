use std::cmp::Ordering;
use crate::class_parser::ParseError;
use crate::vm::class::class::ClassId;
use crate::vm::class::constant_pool::{Loadable, RuntimePool};
use crate::vm::class::field::FieldType;
use crate::vm::class_loader::init::InitCheck;
use crate::vm::class_loader::Lookup;
use crate::vm::error::LinkError;
use crate::vm::instructions::Instruction;
use crate::vm::interpreter::decode::{FieldAccess, FieldLink, Instr, Op, Site};
use crate::vm::interpreter::unwind::Throwable;
use crate::vm::interpreter::{Exec, Flow};
use crate::vm::object::ArrayData;
use crate::vm::thread::frame::Frame;
use crate::vm::thread::monitor::EXIT_NOT_OWNER;
use crate::vm::thread::thread::{ThreadId, ThreadStatus};
use crate::vm::value::{ObjectRef, Value};
use crate::vm::vm::Vm;

pub(crate) fn throw(class: &str, message: impl Into<String>) -> Flow {
    Flow::Throw(Throwable::new(class, message))
}

fn out_of_memory() -> Flow {
    throw("java/lang/OutOfMemoryError", "Requested array size exceeds VM limit")
}

pub(crate) fn null_pointer() -> Flow {
    Flow::Throw(Throwable::bare("java/lang/NullPointerException"))
}

fn compare<T: PartialOrd>(a: T, b: T, nan: i32) -> i32 {
    match a.partial_cmp(&b) {
        Some(Ordering::Less) => -1,
        Some(Ordering::Equal) => 0,
        Some(Ordering::Greater) => 1,
        None => nan,
    }
}

impl Vm {
    /// Maps a loader answer to the value, or to the flow that suspends or throws.
    pub(crate) fn lookup<T>(&mut self, thread: ThreadId, lookup: Lookup<T>) -> Result<T, Flow> {
        match lookup {
            Lookup::Ready(t) => Ok(t),
            Lookup::Pending => {
                self.set_status(thread, ThreadStatus::AwaitingClass);
                Err(Flow::Suspend)
            }
            Lookup::Failed(e) => Err(Flow::Throw(e.into())),
        }
    }

    /// Loads and links a class for an instruction of `thread`.
    pub(crate) fn load_class(&mut self, thread: ThreadId, name: &str) -> Result<ClassId, Flow> {
        let lookup = self.loader.load_resolved(name, Some(thread));
        self.lookup(thread, lookup)
    }

    pub(crate) fn load_array_class(&mut self, thread: ThreadId, name: &str) -> Result<ClassId, Flow> {
        let lookup = self.loader.load(name, Some(thread));
        self.lookup(thread, lookup)
    }

    /// Succeeds once `class` may be used by `thread`; otherwise the instruction
    /// runs again after initialization.
    pub(crate) fn init_check(&mut self, thread: ThreadId, class: ClassId) -> Result<(), Flow> {
        match self.begin_init(thread, class) {
            InitCheck::Ready => Ok(()),
            InitCheck::Run => Err(Flow::Init(class)),
            InitCheck::Wait => Err(Flow::Suspend),
            InitCheck::Failed(throwable) => Err(Flow::Throw(throwable)),
        }
    }

    /// Reads the constant pool of the class `frame` runs in.
    pub(crate) fn constant<T>(&self, frame: &Frame, read: impl FnOnce(&RuntimePool) -> Result<T, ParseError>)
                              -> Result<T, Flow> {
        let class = self.loader.class(frame.class);
        let result = match class.data() {
            Some(data) => read(&data.pool),
            None => Err(ParseError::Malformed("class has no constant pool".to_string())),
        };
        result.map_err(|e| Flow::Throw(LinkError::from_parse(&class.name, e).into()))
    }

    fn site_class(&mut self, thread: ThreadId, frame: &Frame, site: &Site<ClassId>) -> Result<ClassId, Flow> {
        if let Some(class) = site.linked() {
            return Ok(class);
        }
        let name = self.constant(frame, |pool| pool.class_name(site.index).map(str::to_string))?;
        let class = self.load_class(thread, &name)?;
        site.link(class);
        Ok(class)
    }

    pub(crate) fn execute(&mut self, thread: ThreadId, frame: &mut Frame, instr: &Instr) -> Exec {
        match &instr.op {
            Op::Nop => {}
            Op::Push(value) => frame.push(*value),
            Op::Ldc(site) => {
                let value = match site.linked() {
                    Some(value) => value,
                    None => self.link_constant(thread, frame, site)?,
                };
                frame.push(value);
            }
            Op::Load(index) => {
                let value = frame.get(*index as usize);
                frame.push(value);
            }
            Op::Store(index) => {
                let value = frame.pop();
                frame.set(*index as usize, value);
            }
            Op::ArrayLoad => self.array_load(frame)?,
            Op::ArrayStore => self.array_store(frame)?,
            Op::Pop => {
                frame.pop_slot();
            }
            Op::Pop2 => {
                frame.pop_slot();
                frame.pop_slot();
            }
            Op::Dup => {
                let v = frame.peek_nth(0);
                frame.push_slot(v);
            }
            Op::DupX1 => {
                let (v1, v2) = (frame.pop_slot(), frame.pop_slot());
                for v in [v1, v2, v1] {
                    frame.push_slot(v);
                }
            }
            Op::DupX2 => {
                let (v1, v2, v3) = (frame.pop_slot(), frame.pop_slot(), frame.pop_slot());
                for v in [v1, v3, v2, v1] {
                    frame.push_slot(v);
                }
            }
            Op::Dup2 => {
                let (v1, v2) = (frame.peek_nth(0), frame.peek_nth(1));
                frame.push_slot(v2);
                frame.push_slot(v1);
            }
            Op::Dup2X1 => {
                let (v1, v2, v3) = (frame.pop_slot(), frame.pop_slot(), frame.pop_slot());
                for v in [v2, v1, v3, v2, v1] {
                    frame.push_slot(v);
                }
            }
            Op::Dup2X2 => {
                let (v1, v2, v3, v4) = (frame.pop_slot(), frame.pop_slot(), frame.pop_slot(), frame.pop_slot());
                for v in [v2, v1, v4, v3, v2, v1] {
                    frame.push_slot(v);
                }
            }
            Op::Swap => {
                let (v1, v2) = (frame.pop_slot(), frame.pop_slot());
                frame.push_slot(v1);
                frame.push_slot(v2);
            }
            Op::Math(opcode) => math(frame, *opcode)?,
            Op::Iinc(index, delta) => {
                let value = frame.get(*index as usize).as_int().wrapping_add(*delta);
                frame.set(*index as usize, Value::Int(value));
            }
            Op::If(opcode, target) => {
                if condition(frame, *opcode) {
                    return Ok(Flow::Jump(*target));
                }
            }
            Op::Goto(target) => return Ok(Flow::Jump(*target)),
            Op::Jsr(target) => {
                frame.push(Value::ReturnAddress(instr.next_pc()));
                return Ok(Flow::Jump(*target));
            }
            Op::Ret(index) => return match frame.get(*index as usize) {
                Value::ReturnAddress(pc) => Ok(Flow::Jump(pc)),
                other => Err(throw("java/lang/InternalError", format!("ret through {}", other))),
            },
            Op::TableSwitch { default, low, targets } => {
                let index = frame.pop_int() as i64 - *low as i64;
                let target = usize::try_from(index).ok()
                    .and_then(|i| targets.get(i))
                    .unwrap_or(default);
                return Ok(Flow::Jump(*target));
            }
            Op::LookupSwitch { default, pairs } => {
                let key = frame.pop_int();
                let target = match pairs.binary_search_by_key(&key, |(k, _)| *k) {
                    Ok(i) => pairs[i].1,
                    Err(_) => *default,
                };
                return Ok(Flow::Jump(target));
            }
            Op::Return => return Ok(Flow::Return(None)),
            Op::ReturnValue => {
                let value = frame.pop().narrow_to(&frame.method.signature.ret);
                return Ok(Flow::Return(Some(value)));
            }
            Op::Field(access, site) => self.field_access(thread, frame, *access, site)?,
            Op::Invoke(kind, site) => return self.invoke(thread, frame, *kind, site),
            Op::InvokeDynamic => return Err(throw("java/lang/InternalError", "invokedynamic is not supported")),
            Op::New(site) => {
                let class = match site.linked() {
                    Some(class) => class,
                    None => self.link_new(thread, frame, site)?,
                };
                let object = self.new_object(class);
                frame.push(Value::Ref(Some(object)));
            }
            Op::NewArray(atype) => {
                let class = self.load_array_class(thread, atype.descriptor())?;
                let array = self.new_array(class, frame.pop_int())?;
                frame.push(Value::Ref(Some(array)));
            }
            Op::ANewArray(site) => {
                let class = match site.linked() {
                    Some(class) => class,
                    None => {
                        let name = self.constant(frame, |pool| pool.class_name(site.index).map(str::to_string))?;
                        let array_name = if name.starts_with('[') { format!("[{}", name) } else { format!("[L{};", name) };
                        let class = self.load_array_class(thread, &array_name)?;
                        site.link(class);
                        class
                    }
                };
                let array = self.new_array(class, frame.pop_int())?;
                frame.push(Value::Ref(Some(array)));
            }
            Op::MultiANewArray(site, dimensions) => {
                let class = match site.linked() {
                    Some(class) => class,
                    None => {
                        let name = self.constant(frame, |pool| pool.class_name(site.index).map(str::to_string))?;
                        let class = self.load_array_class(thread, &name)?;
                        site.link(class);
                        class
                    }
                };
                let mut counts = vec![0; *dimensions as usize];
                for count in counts.iter_mut().rev() {
                    *count = frame.pop_int();
                }
                if let Some(negative) = counts.iter().find(|c| **c < 0) {
                    return Err(throw("java/lang/NegativeArraySizeException", negative.to_string()));
                }
                let array = self.new_multi_array(class, &counts)?;
                frame.push(Value::Ref(Some(array)));
            }
            Op::ArrayLength => {
                let array = frame.pop_ref().ok_or_else(null_pointer)?;
                let len = self.heap.get(array).array().map_or(0, |a| a.len());
                frame.push(Value::Int(len as i32));
            }
            Op::AThrow => {
                let exception = frame.pop_ref().ok_or_else(null_pointer)?;
                return Err(Flow::Throw(Throwable::Object(exception)));
            }
            Op::CheckCast(site) => {
                let class = self.site_class(thread, frame, site)?;
                if let Some(object) = frame.peek_nth(0).as_ref() {
                    let actual = self.heap.class_of(object);
                    if !self.loader.is_assignable(actual, class) {
                        let message = format!("class {} cannot be cast to class {}",
                                              self.loader.class(actual).java_name(), self.loader.class(class).java_name());
                        return Err(throw("java/lang/ClassCastException", message));
                    }
                }
            }
            Op::InstanceOf(site) => {
                let class = self.site_class(thread, frame, site)?;
                let result = match frame.pop_ref() {
                    Some(object) => self.loader.is_assignable(self.heap.class_of(object), class),
                    None => false,
                };
                frame.push(Value::from_bool(result));
            }
            Op::MonitorEnter => {
                let object = match frame.peek_nth(0).as_ref() {
                    Some(object) => object,
                    None => {
                        frame.pop_slot();
                        return Err(null_pointer());
                    }
                };
                if !self.monitor_enter(thread, object, 1) {
                    return Err(Flow::Suspend);
                }
                frame.pop_slot();
            }
            Op::MonitorExit => {
                let object = frame.pop_ref().ok_or_else(null_pointer)?;
                if self.monitor_exit(thread, object).is_err() {
                    return Err(throw("java/lang/IllegalMonitorStateException", EXIT_NOT_OWNER));
                }
            }
        }
        Ok(Flow::Next)
    }

    fn link_constant(&mut self, thread: ThreadId, frame: &Frame, site: &Site<Value>) -> Result<Value, Flow> {
        let constant = self.constant(frame, |pool| pool.loadable(site.index))?;
        let value = match constant {
            Loadable::String(text) => {
                let string = self.intern(Some(thread), &text);
                Value::Ref(Some(self.lookup(thread, string)?))
            }
            Loadable::Class(name) => {
                let class = self.load_class(thread, &name)?;
                let mirror = self.mirror_of(Some(thread), class);
                Value::Ref(Some(self.lookup(thread, mirror)?))
            }
            Loadable::Int(v) => Value::Int(v),
            Loadable::Float(v) => Value::Float(v),
            Loadable::Long(v) => Value::Long(v),
            Loadable::Double(v) => Value::Double(v),
        };
        site.link(value);
        Ok(value)
    }

    /// Resolves the class of a `new`. The site is linked once the class is
    /// initialized, so later executions skip both checks.
    fn link_new(&mut self, thread: ThreadId, frame: &Frame, site: &Site<ClassId>) -> Result<ClassId, Flow> {
        let name = self.constant(frame, |pool| pool.class_name(site.index).map(str::to_string))?;
        let class = self.load_class(thread, &name)?;
        let target = self.loader.class(class).clone();
        if target.is_interface() || target.is_abstract() || target.is_array() {
            return Err(throw("java/lang/InstantiationError", target.java_name()));
        }

        self.init_check(thread, class)?;
        if target.is_initialized() {
            site.link(class);
        }
        Ok(class)
    }

    fn link_field(&mut self, thread: ThreadId, frame: &Frame, access: FieldAccess, site: &Site<FieldLink>)
                  -> Result<FieldLink, Flow> {
        let member = self.constant(frame, |pool| pool.member(site.index))?;
        let class = self.load_class(thread, &member.class)?;
        let target = self.loader.resolve_field(class, &member.name, &member.descriptor)
            .map_err(|e| Flow::Throw(e.into()))?;

        let wants_static = matches!(access, FieldAccess::GetStatic | FieldAccess::PutStatic);
        if wants_static != target.is_static {
            let expected = if wants_static { "static" } else { "non-static" };
            let message = format!("Expected {} field {}.{}", expected, self.loader.class(class).java_name(), member.name);
            return Err(Flow::Throw(LinkError::IncompatibleClassChange(message).into()));
        }

        let ty = match self.loader.field(&target) {
            Some(field) => field.ty.clone(),
            None => return Err(Flow::Throw(LinkError::NoSuchField(member.name.clone()).into())),
        };

        if target.is_static {
            self.init_check(thread, target.owner)?;
            let link = FieldLink::Static { class: target.owner, slot: target.index, ty };
            if self.loader.class(target.owner).is_initialized() {
                site.link(link.clone());
            }
            return Ok(link);
        }

        let offset = self.loader.class(target.owner).layout()
            .and_then(|l| l.offset_of(target.owner, &member.name));
        match offset {
            Some(offset) => {
                let link = FieldLink::Instance { offset, ty };
                site.link(link.clone());
                Ok(link)
            }
            None => Err(Flow::Throw(LinkError::NoSuchField(member.name.clone()).into())),
        }
    }

    fn field_access(&mut self, thread: ThreadId, frame: &mut Frame, access: FieldAccess, site: &Site<FieldLink>)
                    -> Result<(), Flow> {
        let link = match site.linked() {
            Some(link) => link,
            None => self.link_field(thread, frame, access, site)?,
        };

        match (access, link) {
            (FieldAccess::GetStatic, FieldLink::Static { class, slot, .. }) => {
                let value = self.loader.class(class).data()
                    .and_then(|d| d.statics().get(slot).copied())
                    .unwrap_or(Value::Top);
                frame.push(value);
            }
            (FieldAccess::PutStatic, FieldLink::Static { class, slot, ty }) => {
                let value = frame.pop().narrow_to(&ty);
                if let Some(data) = self.loader.class(class).data() {
                    if let Some(static_slot) = data.statics_mut().get_mut(slot) {
                        *static_slot = value;
                    }
                }
            }
            (FieldAccess::GetField, FieldLink::Instance { offset, .. }) => {
                let object = frame.pop_ref().ok_or_else(null_pointer)?;
                frame.push(self.heap.get(object).field(offset));
            }
            (FieldAccess::PutField, FieldLink::Instance { offset, ty }) => {
                let value = frame.pop().narrow_to(&ty);
                let object = frame.pop_ref().ok_or_else(null_pointer)?;
                self.heap.get_mut(object).set_field(offset, value);
            }
            (access, link) => return Err(throw("java/lang/InternalError", format!("{:?} through {:?}", access, link))),
        }
        Ok(())
    }

    pub(crate) fn new_array(&mut self, class: ClassId, count: i32) -> Result<ObjectRef, Flow> {
        if count < 0 {
            return Err(throw("java/lang/NegativeArraySizeException", count.to_string()));
        }
        let data = match self.loader.class(class).component_type() {
            Some(component) => self.array_data(component, count as usize)?,
            None => return Err(throw("java/lang/InternalError", format!("{} is not an array class", self.loader.class(class).name))),
        };
        Ok(self.heap.alloc_array(class, data))
    }

    fn array_data(&self, component: &FieldType, len: usize) -> Result<ArrayData, Flow> {
        let bytes = len.checked_mul(ArrayData::element_size(component));
        match bytes.filter(|b| *b <= self.options.max_array_bytes) {
            Some(_) => ArrayData::new(component, len).ok_or_else(out_of_memory),
            None => Err(out_of_memory()),
        }
    }

    /// Nested arrays for `multianewarray`. Loading an array class loads all its
    /// component array classes, so no lookup can be pending here.
    fn new_multi_array(&mut self, class: ClassId, counts: &[i32]) -> Result<ObjectRef, Flow> {
        let array = self.loader.class(class).clone();
        let len = counts[0] as usize;
        let data = match (array.component(), counts.len()) {
            (Some(component), n) if n > 1 => {
                let reference = FieldType::L(String::new());
                let mut elements = match self.array_data(&reference, len)? {
                    ArrayData::Ref(elements) => elements,
                    _ => Vec::new(),
                };
                for element in elements.iter_mut() {
                    *element = Some(self.new_multi_array(component, &counts[1..])?);
                }
                ArrayData::Ref(elements)
            }
            _ => match array.component_type() {
                Some(component) => self.array_data(component, len)?,
                None => self.array_data(&FieldType::L(String::new()), len)?,
            },
        };
        Ok(self.heap.alloc_array(class, data))
    }

    fn array_load(&mut self, frame: &mut Frame) -> Result<(), Flow> {
        let index = frame.pop_int();
        let array = frame.pop_ref().ok_or_else(null_pointer)?;
        let data = self.heap.get(array).array().ok_or_else(null_pointer)?;
        match usize::try_from(index).ok().and_then(|i| data.get(i)) {
            Some(value) => {
                frame.push(value);
                Ok(())
            }
            None => Err(out_of_bounds(index, data.len())),
        }
    }

    fn array_store(&mut self, frame: &mut Frame) -> Result<(), Flow> {
        let value = frame.pop();
        let index = frame.pop_int();
        let array = frame.pop_ref().ok_or_else(null_pointer)?;

        if let Value::Ref(Some(element)) = value {
            let component = self.loader.class(self.heap.class_of(array)).component();
            let actual = self.heap.class_of(element);
            if let Some(component) = component {
                if !self.loader.is_assignable(actual, component) {
                    return Err(throw("java/lang/ArrayStoreException", self.loader.class(actual).java_name()));
                }
            }
        }

        let data = self.heap.get_mut(array).array_mut().ok_or_else(null_pointer)?;
        let len = data.len();
        match usize::try_from(index) {
            Ok(i) if data.set(i, value) => Ok(()),
            _ => Err(out_of_bounds(index, len)),
        }
    }
}

fn out_of_bounds(index: i32, len: usize) -> Flow {
    throw("java/lang/ArrayIndexOutOfBoundsException", format!("Index {} out of bounds for length {}", index, len))
}

fn condition(frame: &mut Frame, opcode: Instruction) -> bool {
    use Instruction::*;

    match opcode {
        ifeq | ifne | iflt | ifge | ifgt | ifle => {
            let v = frame.pop_int();
            match opcode {
                ifeq => v == 0,
                ifne => v != 0,
                iflt => v < 0,
                ifge => v >= 0,
                ifgt => v > 0,
                _ => v <= 0,
            }
        }
        if_icmpeq | if_icmpne | if_icmplt | if_icmpge | if_icmpgt | if_icmple => {
            let b = frame.pop_int();
            let a = frame.pop_int();
            match opcode {
                if_icmpeq => a == b,
                if_icmpne => a != b,
                if_icmplt => a < b,
                if_icmpge => a >= b,
                if_icmpgt => a > b,
                _ => a <= b,
            }
        }
        if_acmpeq | if_acmpne => {
            let b = frame.pop_ref();
            let a = frame.pop_ref();
            (a == b) == (opcode == if_acmpeq)
        }
        ifnull => frame.pop_ref().is_none(),
        _ => frame.pop_ref().is_some(),
    }
}

/// Instructions that only work on the operand stack.
fn math(frame: &mut Frame, opcode: Instruction) -> Result<(), Flow> {
    use Instruction::*;

    let value = match opcode {
        iadd | isub | imul | idiv | irem | ishl | ishr | iushr | iand | ior | ixor => {
            let b = frame.pop_int();
            let a = frame.pop_int();
            if matches!(opcode, idiv | irem) && b == 0 {
                return Err(throw("java/lang/ArithmeticException", "/ by zero"));
            }
            Value::Int(match opcode {
                iadd => a.wrapping_add(b),
                isub => a.wrapping_sub(b),
                imul => a.wrapping_mul(b),
                idiv => a.wrapping_div(b),
                irem => a.wrapping_rem(b),
                ishl => a.wrapping_shl(b as u32),
                ishr => a.wrapping_shr(b as u32),
                iushr => ((a as u32) >> (b & 0x1f)) as i32,
                iand => a & b,
                ior => a | b,
                _ => a ^ b,
            })
        }
        ladd | lsub | lmul | ldiv | lrem | land | lor | lxor => {
            let b = frame.pop_long();
            let a = frame.pop_long();
            if matches!(opcode, ldiv | lrem) && b == 0 {
                return Err(throw("java/lang/ArithmeticException", "/ by zero"));
            }
            Value::Long(match opcode {
                ladd => a.wrapping_add(b),
                lsub => a.wrapping_sub(b),
                lmul => a.wrapping_mul(b),
                ldiv => a.wrapping_div(b),
                lrem => a.wrapping_rem(b),
                land => a & b,
                lor => a | b,
                _ => a ^ b,
            })
        }
        lshl | lshr | lushr => {
            let shift = frame.pop_int() as u32;
            let a = frame.pop_long();
            Value::Long(match opcode {
                lshl => a.wrapping_shl(shift),
                lshr => a.wrapping_shr(shift),
                _ => ((a as u64) >> (shift & 0x3f)) as i64,
            })
        }
        fadd | fsub | fmul | fdiv | frem => {
            let b = frame.pop_float();
            let a = frame.pop_float();
            Value::Float(match opcode {
                fadd => a + b,
                fsub => a - b,
                fmul => a * b,
                fdiv => a / b,
                _ => a % b,
            })
        }
        dadd | dsub | dmul | ddiv | drem => {
            let b = frame.pop_double();
            let a = frame.pop_double();
            Value::Double(match opcode {
                dadd => a + b,
                dsub => a - b,
                dmul => a * b,
                ddiv => a / b,
                _ => a % b,
            })
        }
        ineg => Value::Int(frame.pop_int().wrapping_neg()),
        lneg => Value::Long(frame.pop_long().wrapping_neg()),
        fneg => Value::Float(-frame.pop_float()),
        dneg => Value::Double(-frame.pop_double()),

        // float to int conversions saturate and map NaN to zero, as `as` does
        i2l => Value::Long(frame.pop_int() as i64),
        i2f => Value::Float(frame.pop_int() as f32),
        i2d => Value::Double(frame.pop_int() as f64),
        l2i => Value::Int(frame.pop_long() as i32),
        l2f => Value::Float(frame.pop_long() as f32),
        l2d => Value::Double(frame.pop_long() as f64),
        f2i => Value::Int(frame.pop_float() as i32),
        f2l => Value::Long(frame.pop_float() as i64),
        f2d => Value::Double(frame.pop_float() as f64),
        d2i => Value::Int(frame.pop_double() as i32),
        d2l => Value::Long(frame.pop_double() as i64),
        d2f => Value::Float(frame.pop_double() as f32),
        i2b => Value::Int(frame.pop_int() as i8 as i32),
        i2c => Value::Int(frame.pop_int() as u16 as i32),
        i2s => Value::Int(frame.pop_int() as i16 as i32),

        lcmp => {
            let b = frame.pop_long();
            let a = frame.pop_long();
            Value::Int(compare(a, b, 0))
        }
        fcmpl | fcmpg => {
            let b = frame.pop_float();
            let a = frame.pop_float();
            Value::Int(compare(a, b, if opcode == fcmpl { -1 } else { 1 }))
        }
        dcmpl | dcmpg => {
            let b = frame.pop_double();
            let a = frame.pop_double();
            Value::Int(compare(a, b, if opcode == dcmpl { -1 } else { 1 }))
        }
        other => return Err(throw("java/lang/InternalError", format!("unsupported opcode {}", other))),
    };
    frame.push(value);
    Ok(())
}

#[cfg(test)]
mod test {
    use crate::vm::instructions::Instruction::{self, *};
    use crate::vm::interpreter::exec::math;
    use crate::vm::interpreter::Flow;
    use crate::vm::interpreter::unwind::Throwable;
    use crate::vm::testing::method_with_code;
    use crate::vm::thread::frame::Frame;
    use crate::vm::value::Value;

    fn run(inputs: &[Value], opcode: Instruction) -> Result<Value, Flow> {
        let mut frame = Frame::new(method_with_code(4, 0), &[]);
        for input in inputs {
            frame.push(*input);
        }
        math(&mut frame, opcode)?;
        Ok(frame.pop())
    }

    fn value(inputs: &[Value], opcode: Instruction) -> Value {
        run(inputs, opcode).unwrap_or_else(|flow| panic!("{} threw {:?}", opcode, flow))
    }

    #[test]
    fn int_arithmetic_wraps() {
        assert_eq!(value(&[Value::Int(i32::MAX), Value::Int(1)], iadd), Value::Int(i32::MIN));
        assert_eq!(value(&[Value::Int(i32::MIN), Value::Int(-1)], idiv), Value::Int(i32::MIN));
        assert_eq!(value(&[Value::Int(i32::MIN), Value::Int(-1)], irem), Value::Int(0));
        assert_eq!(value(&[Value::Int(-7), Value::Int(2)], idiv), Value::Int(-3));
        assert_eq!(value(&[Value::Int(-7), Value::Int(2)], irem), Value::Int(-1));
        assert_eq!(value(&[Value::Int(i32::MIN)], ineg), Value::Int(i32::MIN));
    }

    #[test]
    fn division_by_zero_throws() {
        match run(&[Value::Int(1), Value::Int(0)], idiv) {
            Err(Flow::Throw(Throwable::New { class, message })) => {
                assert_eq!(class, "java/lang/ArithmeticException");
                assert_eq!(message.as_deref(), Some("/ by zero"));
            }
            other => panic!("{:?}", other),
        }
        assert!(run(&[Value::Long(1), Value::Long(0)], lrem).is_err());
        assert_eq!(value(&[Value::Double(1.0), Value::Double(0.0)], ddiv), Value::Double(f64::INFINITY));
    }

    #[test]
    fn shift_distances_are_masked() {
        assert_eq!(value(&[Value::Int(1), Value::Int(33)], ishl), Value::Int(2));
        assert_eq!(value(&[Value::Long(1), Value::Int(65)], lshl), Value::Long(2));
        assert_eq!(value(&[Value::Int(-1), Value::Int(28)], iushr), Value::Int(15));
        assert_eq!(value(&[Value::Int(-16), Value::Int(2)], ishr), Value::Int(-4));
        assert_eq!(value(&[Value::Long(-1), Value::Int(60)], lushr), Value::Long(15));
    }

    #[test]
    fn conversions_saturate() {
        assert_eq!(value(&[Value::Float(f32::NAN)], f2i), Value::Int(0));
        assert_eq!(value(&[Value::Double(1e20)], d2i), Value::Int(i32::MAX));
        assert_eq!(value(&[Value::Double(-1e20)], d2l), Value::Long(i64::MIN));
        assert_eq!(value(&[Value::Int(0x1_0041)], i2c), Value::Int(0x41));
        assert_eq!(value(&[Value::Int(200)], i2b), Value::Int(-56));
        assert_eq!(value(&[Value::Long(0x1_0000_0005)], l2i), Value::Int(5));
    }

    #[test]
    fn nan_comparisons_depend_on_the_variant() {
        let nan = [Value::Float(f32::NAN), Value::Float(1.0)];
        assert_eq!(value(&nan, fcmpl), Value::Int(-1));
        assert_eq!(value(&nan, fcmpg), Value::Int(1));
        assert_eq!(value(&[Value::Double(2.0), Value::Double(1.0)], dcmpl), Value::Int(1));
        assert_eq!(value(&[Value::Long(-5), Value::Long(3)], lcmp), Value::Int(-1));
    }
}
