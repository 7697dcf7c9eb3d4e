use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use crate::class_parser::be_reader::ByteReader;
use crate::class_parser::ParseError;
use crate::vm::class::class::ClassId;
use crate::vm::class::constant_pool::{Loadable, RuntimePool};
use crate::vm::class::field::FieldType;
use crate::vm::class::method::Method;
use crate::vm::instructions::{instruction_length, ArrayType, Instruction};
use crate::vm::value::Value;

/// A constant pool reference inside an instruction. The first successful execution
/// stores what the reference resolved to, and later executions skip resolution.
pub struct Site<T> {
    pub index: u16,
    link: RefCell<Option<T>>,
}

impl<T: Clone> Site<T> {
    pub fn new(index: u16) -> Self {
        Site { index, link: RefCell::new(None) }
    }

    pub fn linked(&self) -> Option<T> {
        self.link.borrow().clone()
    }

    pub fn link(&self, target: T) {
        *self.link.borrow_mut() = Some(target);
    }

    pub fn is_linked(&self) -> bool {
        self.link.borrow().is_some()
    }
}

impl<T> Debug for Site<T> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let state = if self.link.borrow().is_some() { "linked" } else { "unlinked" };
        write!(f, "#{} ({})", self.index, state)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldLink {
    /// Slot in the declaring class's statics.
    Static { class: ClassId, slot: usize, ty: FieldType },
    Instance { offset: usize, ty: FieldType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldAccess {
    GetStatic,
    PutStatic,
    GetField,
    PutField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvokeKind {
    Virtual,
    Special,
    Static,
    Interface,
}

/// A decoded instruction body. Branch targets are absolute pcs.
#[derive(Debug)]
pub enum Op {
    Nop,
    Push(Value),
    /// String and class constants; numeric ones decode to `Push`.
    Ldc(Site<Value>),
    Load(u16),
    Store(u16),
    ArrayLoad,
    ArrayStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    /// Arithmetic, conversions and comparisons that only touch the operand stack.
    Math(Instruction),
    Iinc(u16, i32),
    /// Conditional branches, `ifeq` through `if_acmpne`, `ifnull` and `ifnonnull`.
    If(Instruction, u32),
    Goto(u32),
    Jsr(u32),
    Ret(u16),
    TableSwitch { default: u32, low: i32, targets: Box<[u32]> },
    LookupSwitch { default: u32, pairs: Box<[(i32, u32)]> },
    Return,
    ReturnValue,
    Field(FieldAccess, Site<FieldLink>),
    /// The link is the resolved method; virtual and interface calls still select
    /// by receiver.
    Invoke(InvokeKind, Site<Rc<Method>>),
    InvokeDynamic,
    New(Site<ClassId>),
    NewArray(ArrayType),
    /// Linked to the array class, not the element class.
    ANewArray(Site<ClassId>),
    MultiANewArray(Site<ClassId>, u8),
    ArrayLength,
    AThrow,
    CheckCast(Site<ClassId>),
    InstanceOf(Site<ClassId>),
    MonitorEnter,
    MonitorExit,
}

#[derive(Debug)]
pub struct Instr {
    pub pc: u32,
    pub len: u32,
    pub opcode: Instruction,
    pub op: Op,
}

impl Instr {
    pub fn next_pc(&self) -> u32 {
        self.pc + self.len
    }
}

fn bad_code(pc: usize, reason: impl Into<String>) -> ParseError {
    ParseError::BadCode { pc: pc as u32, reason: reason.into() }
}

fn target(pc: usize, offset: i32, targets: &mut Vec<(usize, u32)>) -> Result<u32, ParseError> {
    let target = pc as i64 + offset as i64;
    if target < 0 || target > u32::MAX as i64 {
        return Err(bad_code(pc, format!("branch offset {} leaves the method", offset)));
    }
    targets.push((pc, target as u32));
    Ok(target as u32)
}

fn local_op(instr: Instruction) -> Option<(bool, u16)> {
    let (base, store) = match instr as u8 {
        26..=45 => (26u8, false),
        59..=78 => (59u8, true),
        _ => return None,
    };
    Some((store, ((instr as u8 - base) % 4) as u16))
}

/// Decodes a method body into one `Instr` per instruction start, checking operands
/// and branch targets against the code and the constant pool.
pub fn decode(code: &[u8], pool: &RuntimePool) -> Result<Vec<Instr>, ParseError> {
    use Instruction::*;

    let mut reader = ByteReader::new(code);
    let mut instrs = vec![];
    let mut targets = vec![];

    while !reader.is_empty() {
        let pc = reader.position();
        let byte = reader.read_u1()?;
        let opcode = Instruction::try_from(byte).map_err(|_| bad_code(pc, format!("unknown opcode {:#04x}", byte)))?;

        let op = match opcode {
            nop => Op::Nop,
            aconst_null => Op::Push(Value::NULL),
            iconst_m1 | iconst_0 | iconst_1 | iconst_2 | iconst_3 | iconst_4 | iconst_5 =>
                Op::Push(Value::Int(byte as i32 - iconst_0 as i32)),
            lconst_0 | lconst_1 => Op::Push(Value::Long((byte - lconst_0 as u8) as i64)),
            fconst_0 | fconst_1 | fconst_2 => Op::Push(Value::Float((byte - fconst_0 as u8) as f32)),
            dconst_0 | dconst_1 => Op::Push(Value::Double((byte - dconst_0 as u8) as f64)),
            bipush => Op::Push(Value::Int(reader.read_i1()? as i32)),
            sipush => Op::Push(Value::Int(reader.read_i2()? as i32)),
            ldc | ldc_w | ldc2_w => {
                let index = if opcode == ldc { reader.read_u1()? as u16 } else { reader.read_u2()? };
                let constant = pool.loadable(index)?;
                let is_wide = matches!(constant, Loadable::Long(_) | Loadable::Double(_));
                if is_wide != (opcode == ldc2_w) {
                    return Err(bad_code(pc, format!("{} cannot load constant #{}", opcode, index)));
                }
                match constant {
                    Loadable::Int(v) => Op::Push(Value::Int(v)),
                    Loadable::Float(v) => Op::Push(Value::Float(v)),
                    Loadable::Long(v) => Op::Push(Value::Long(v)),
                    Loadable::Double(v) => Op::Push(Value::Double(v)),
                    Loadable::String(_) | Loadable::Class(_) => Op::Ldc(Site::new(index)),
                }
            }
            iload | lload | fload | dload | aload => Op::Load(reader.read_u1()? as u16),
            istore | lstore | fstore | dstore | astore => Op::Store(reader.read_u1()? as u16),
            iaload | laload | faload | daload | aaload | baload | caload | saload => Op::ArrayLoad,
            iastore | lastore | fastore | dastore | aastore | bastore | castore | sastore => Op::ArrayStore,
            pop => Op::Pop,
            pop2 => Op::Pop2,
            dup => Op::Dup,
            dup_x1 => Op::DupX1,
            dup_x2 => Op::DupX2,
            dup2 => Op::Dup2,
            dup2_x1 => Op::Dup2X1,
            dup2_x2 => Op::Dup2X2,
            swap => Op::Swap,
            iinc => Op::Iinc(reader.read_u1()? as u16, reader.read_i1()? as i32),
            ifeq | ifne | iflt | ifge | ifgt | ifle | if_icmpeq | if_icmpne | if_icmplt | if_icmpge
            | if_icmpgt | if_icmple | if_acmpeq | if_acmpne | ifnull | ifnonnull =>
                Op::If(opcode, target(pc, reader.read_i2()? as i32, &mut targets)?),
            goto => Op::Goto(target(pc, reader.read_i2()? as i32, &mut targets)?),
            goto_w => Op::Goto(target(pc, reader.read_i4()?, &mut targets)?),
            jsr => Op::Jsr(target(pc, reader.read_i2()? as i32, &mut targets)?),
            jsr_w => Op::Jsr(target(pc, reader.read_i4()?, &mut targets)?),
            ret => Op::Ret(reader.read_u1()? as u16),
            tableswitch => {
                reader.align(4)?;
                let default = target(pc, reader.read_i4()?, &mut targets)?;
                let low = reader.read_i4()?;
                let high = reader.read_i4()?;
                if high < low {
                    return Err(bad_code(pc, format!("tableswitch bounds {}..{}", low, high)));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                let mut jumps = Vec::with_capacity(count.min(reader.remaining() / 4));
                for _ in 0..count {
                    jumps.push(target(pc, reader.read_i4()?, &mut targets)?);
                }
                Op::TableSwitch { default, low, targets: jumps.into_boxed_slice() }
            }
            lookupswitch => {
                reader.align(4)?;
                let default = target(pc, reader.read_i4()?, &mut targets)?;
                let count = reader.read_i4()?;
                if count < 0 {
                    return Err(bad_code(pc, format!("lookupswitch with {} pairs", count)));
                }
                let mut pairs = Vec::with_capacity((count as usize).min(reader.remaining() / 8));
                for _ in 0..count {
                    let key = reader.read_i4()?;
                    pairs.push((key, target(pc, reader.read_i4()?, &mut targets)?));
                }
                if pairs.windows(2).any(|w| w[0].0 >= w[1].0) {
                    return Err(bad_code(pc, "lookupswitch keys are not sorted"));
                }
                Op::LookupSwitch { default, pairs: pairs.into_boxed_slice() }
            }
            ireturn | lreturn | freturn | dreturn | areturn => Op::ReturnValue,
            _return => Op::Return,
            getstatic | putstatic | getfield | putfield => {
                let index = reader.read_u2()?;
                pool.member(index)?;
                let access = match opcode {
                    getstatic => FieldAccess::GetStatic,
                    putstatic => FieldAccess::PutStatic,
                    getfield => FieldAccess::GetField,
                    _ => FieldAccess::PutField,
                };
                Op::Field(access, Site::new(index))
            }
            invokevirtual | invokespecial | invokestatic => {
                let index = reader.read_u2()?;
                pool.member(index)?;
                let kind = match opcode {
                    invokevirtual => InvokeKind::Virtual,
                    invokespecial => InvokeKind::Special,
                    _ => InvokeKind::Static,
                };
                Op::Invoke(kind, Site::new(index))
            }
            invokeinterface => {
                let index = reader.read_u2()?;
                pool.member(index)?;
                let (_count, zero) = (reader.read_u1()?, reader.read_u1()?);
                if zero != 0 {
                    return Err(bad_code(pc, "invokeinterface fourth operand byte must be zero"));
                }
                Op::Invoke(InvokeKind::Interface, Site::new(index))
            }
            invokedynamic => {
                reader.read_u2()?;
                reader.read_u2()?;
                Op::InvokeDynamic
            }
            new | anewarray | checkcast | instanceof => {
                let index = reader.read_u2()?;
                pool.class_name(index)?;
                let site = Site::new(index);
                match opcode {
                    new => Op::New(site),
                    anewarray => Op::ANewArray(site),
                    checkcast => Op::CheckCast(site),
                    _ => Op::InstanceOf(site),
                }
            }
            newarray => {
                let atype = reader.read_u1()?;
                Op::NewArray(ArrayType::try_from(atype)
                    .map_err(|_| bad_code(pc, format!("unknown array type {}", atype)))?)
            }
            multianewarray => {
                let index = reader.read_u2()?;
                pool.class_name(index)?;
                let dimensions = reader.read_u1()?;
                if dimensions == 0 {
                    return Err(bad_code(pc, "multianewarray with zero dimensions"));
                }
                Op::MultiANewArray(Site::new(index), dimensions)
            }
            arraylength => Op::ArrayLength,
            athrow => Op::AThrow,
            monitorenter => Op::MonitorEnter,
            monitorexit => Op::MonitorExit,
            wide => {
                let byte = reader.read_u1()?;
                let modified = Instruction::try_from(byte)
                    .map_err(|_| bad_code(pc, format!("unknown opcode {:#04x} after wide", byte)))?;
                match modified {
                    iload | lload | fload | dload | aload => Op::Load(reader.read_u2()?),
                    istore | lstore | fstore | dstore | astore => Op::Store(reader.read_u2()?),
                    ret => Op::Ret(reader.read_u2()?),
                    iinc => Op::Iinc(reader.read_u2()?, reader.read_i2()? as i32),
                    other => return Err(bad_code(pc, format!("{} cannot be widened", other))),
                }
            }
            other => match local_op(other) {
                Some((false, index)) => Op::Load(index),
                Some((true, index)) => Op::Store(index),
                None => Op::Math(other),
            },
        };

        let len = reader.position() - pc;
        debug_assert!(instruction_length(opcode).map_or(true, |l| l == len));
        instrs.push(Instr { pc: pc as u32, len: len as u32, opcode, op });
    }

    let starts: HashSet<u32> = instrs.iter().map(|i| i.pc).collect();
    if let Some((pc, bad)) = targets.iter().find(|(_, t)| !starts.contains(t)) {
        return Err(bad_code(*pc, format!("branch to {} is not an instruction start", bad)));
    }

    Ok(instrs)
}

#[cfg(test)]
mod test {
    use crate::class_parser::parse_class;
    use crate::class_parser::types::ConstantPool;
    use crate::class_parser::writer::{ClassWriter, CodeBuilder, Constant};
    use crate::class_parser::ParseError;
    use crate::vm::class::constant_pool::RuntimePool;
    use crate::vm::instructions::Instruction::{self, *};
    use crate::vm::interpreter::decode::{decode, Instr, Op};
    use crate::vm::value::Value;

    fn empty_pool() -> RuntimePool {
        RuntimePool::new(ConstantPool::default())
    }

    fn decode_first_method(bytes: &[u8]) -> Result<Vec<Instr>, ParseError> {
        let class = parse_class(bytes).unwrap();
        let method = &class.methods[0];
        let attribute = class.find_attribute(&method.attributes, "Code").unwrap();
        let body = crate::class_parser::attributes::parse_code_attribute(attribute).unwrap();
        let pool = RuntimePool::new(class.constant_pool.clone());
        decode(&body.code, &pool)
    }

    fn single_method(body: impl FnOnce(&mut CodeBuilder)) -> Vec<u8> {
        let mut code = CodeBuilder::new(2, 0);
        body(&mut code);
        ClassWriter::new("L", Some("java/lang/Object"))
            .method(0x0008, "f", "()V", code)
            .finish()
    }

    #[test]
    fn constants_and_locals() {
        let code = [iconst_2 as u8, iconst_3 as u8, iadd as u8, istore_1 as u8, bipush as u8, 0xFE,
            lload_2 as u8, ireturn as u8];
        let instrs = decode(&code, &empty_pool()).unwrap();

        let pcs: Vec<u32> = instrs.iter().map(|i| i.pc).collect();
        assert_eq!(pcs, vec![0, 1, 2, 3, 4, 6, 7]);
        assert!(matches!(instrs[0].op, Op::Push(Value::Int(2))));
        assert!(matches!(instrs[2].op, Op::Math(Instruction::iadd)));
        assert!(matches!(instrs[3].op, Op::Store(1)));
        assert!(matches!(instrs[4].op, Op::Push(Value::Int(-2))));
        assert!(matches!(instrs[5].op, Op::Load(2)));
        assert!(matches!(instrs[6].op, Op::ReturnValue));
    }

    #[test]
    fn branches_must_land_on_instructions() {
        let code = [goto as u8, 0x00, 0x03, _return as u8];
        let instrs = decode(&code, &empty_pool()).unwrap();
        assert!(matches!(instrs[0].op, Op::Goto(3)));

        let code = [goto as u8, 0x00, 0x02, _return as u8];
        assert!(matches!(decode(&code, &empty_pool()), Err(ParseError::BadCode { pc: 0, .. })));

        let code = [nop as u8, goto as u8, 0xFF, 0xFE];
        assert!(matches!(decode(&code, &empty_pool()), Err(ParseError::BadCode { pc: 1, .. })));
    }

    #[test]
    fn wide_and_truncated_code() {
        let code = [wide as u8, iinc as u8, 0x01, 0x00, 0xFF, 0xFF, _return as u8];
        let instrs = decode(&code, &empty_pool()).unwrap();
        assert!(matches!(instrs[0].op, Op::Iinc(256, -1)));
        assert_eq!(instrs[0].len, 6);

        assert!(matches!(decode(&[sipush as u8, 0x01], &empty_pool()), Err(ParseError::UnexpectedEof(_))));
        assert!(matches!(decode(&[0xCA], &empty_pool()), Err(ParseError::BadCode { .. })));
    }

    #[test]
    fn switches_decode_to_absolute_targets() {
        let mut writer = ClassWriter::new("S", Some("java/lang/Object"));
        let mut code = CodeBuilder::new(1, 1);
        let (a, b, other) = (code.new_label(), code.new_label(), code.new_label());
        code.op(iload_0).tableswitch(1, other, &[a, b])
            .bind(a).op(iconst_1).op(ireturn)
            .bind(b).op(iconst_2).op(ireturn)
            .bind(other).ldc(Constant::Str("x".into())).op(pop).op(iconst_0).op(ireturn);
        writer.method(0x0008, "f", "(I)I", code);
        let instrs = decode_first_method(&writer.finish()).unwrap();

        match &instrs[1].op {
            Op::TableSwitch { default, low, targets } => {
                assert_eq!(*low, 1);
                assert_eq!(targets.len(), 2);
                assert_eq!(targets[0], 24);
                assert!(instrs.iter().any(|i| i.pc == *default));
            }
            other => panic!("{:?}", other),
        }
        assert!(instrs.iter().any(|i| matches!(i.op, Op::Ldc(_))));
    }

    #[test]
    fn ldc_width_must_match_the_constant() {
        let long_constant = single_method(|code| {
            code.ldc(Constant::Long(1 << 40)).op(pop2).op(_return);
        });
        let instrs = decode_first_method(&long_constant).unwrap();
        assert!(matches!(instrs[0].op, Op::Push(Value::Long(v)) if v == 1 << 40));

        let narrow_long = single_method(|code| {
            code.ldc_narrow(Constant::Long(7)).op(pop2).op(_return);
        });
        assert!(matches!(decode_first_method(&narrow_long), Err(ParseError::BadCode { pc: 0, .. })));
    }
}
