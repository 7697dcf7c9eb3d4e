use std::collections::HashMap;
use crate::class_parser::constants::{AccessFlagClass, AccessFlagMethod, CPInfo};
use crate::class_parser::types::U2;
use crate::helper::encode_modified_utf8;
use crate::vm::instructions::Instruction;

/// A constant that an instruction or attribute refers to, interned into the pool
/// when the class is assembled.
#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Str(String),
    Class(String),
    Field(String, String, String),
    Method(String, String, String),
    InterfaceMethod(String, String, String),
}

#[derive(Default)]
pub struct PoolBuilder {
    entries: Vec<CPInfo>,
    index: HashMap<CPInfo, U2>,
}

impl PoolBuilder {
    fn add(&mut self, info: CPInfo) -> U2 {
        if let Some(index) = self.index.get(&info) {
            return *index;
        }

        let index = self.entries.len() as U2 + 1;
        let wide = info.is_wide();
        self.index.insert(info.clone(), index);
        self.entries.push(info);
        if wide {
            self.entries.push(CPInfo::Hole);
        }
        index
    }

    pub fn utf8(&mut self, s: &str) -> U2 {
        self.add(CPInfo::Utf8(s.to_string()))
    }

    pub fn class(&mut self, name: &str) -> U2 {
        let name = self.utf8(name);
        self.add(CPInfo::Class(name))
    }

    pub fn name_and_type(&mut self, name: &str, descriptor: &str) -> U2 {
        let name = self.utf8(name);
        let descriptor = self.utf8(descriptor);
        self.add(CPInfo::NameAndType(name, descriptor))
    }

    pub fn constant(&mut self, constant: &Constant) -> U2 {
        match constant {
            Constant::Int(v) => self.add(CPInfo::Integer(*v as u32)),
            Constant::Float(v) => self.add(CPInfo::Float(v.to_bits())),
            Constant::Long(v) => self.add(CPInfo::Long((*v as u64 >> 32) as u32, *v as u32)),
            Constant::Double(v) => {
                let bits = v.to_bits();
                self.add(CPInfo::Double((bits >> 32) as u32, bits as u32))
            }
            Constant::Str(s) => {
                let s = self.utf8(s);
                self.add(CPInfo::String(s))
            }
            Constant::Class(name) => self.class(name),
            Constant::Field(class, name, descriptor) => {
                let class = self.class(class);
                let nat = self.name_and_type(name, descriptor);
                self.add(CPInfo::Fieldref(class, nat))
            }
            Constant::Method(class, name, descriptor) => {
                let class = self.class(class);
                let nat = self.name_and_type(name, descriptor);
                self.add(CPInfo::Methodref(class, nat))
            }
            Constant::InterfaceMethod(class, name, descriptor) => {
                let class = self.class(class);
                let nat = self.name_and_type(name, descriptor);
                self.add(CPInfo::InterfaceMethodref(class, nat))
            }
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        put_u2(out, self.entries.len() as U2 + 1);
        for entry in &self.entries {
            match entry {
                CPInfo::Hole => {}
                CPInfo::Utf8(s) => {
                    out.push(1);
                    let bytes = encode_modified_utf8(s);
                    put_u2(out, bytes.len() as U2);
                    out.extend_from_slice(&bytes);
                }
                CPInfo::Integer(v) => { out.push(3); put_u4(out, *v); }
                CPInfo::Float(v) => { out.push(4); put_u4(out, *v); }
                CPInfo::Long(hi, lo) => { out.push(5); put_u4(out, *hi); put_u4(out, *lo); }
                CPInfo::Double(hi, lo) => { out.push(6); put_u4(out, *hi); put_u4(out, *lo); }
                CPInfo::Class(i) => { out.push(7); put_u2(out, *i); }
                CPInfo::String(i) => { out.push(8); put_u2(out, *i); }
                CPInfo::Fieldref(a, b) => { out.push(9); put_u2(out, *a); put_u2(out, *b); }
                CPInfo::Methodref(a, b) => { out.push(10); put_u2(out, *a); put_u2(out, *b); }
                CPInfo::InterfaceMethodref(a, b) => { out.push(11); put_u2(out, *a); put_u2(out, *b); }
                CPInfo::NameAndType(a, b) => { out.push(12); put_u2(out, *a); put_u2(out, *b); }
                // never produced by the builder
                other => unreachable!("unsupported constant {:?}", other),
            }
        }
    }
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_u4(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn arg_slots(descriptor: &str) -> u8 {
    let mut slots = 0;
    let mut chars = descriptor.chars().skip(1).peekable();
    while let Some(c) = chars.next() {
        match c {
            ')' => break,
            'J' | 'D' => slots += 2,
            'L' => {
                for c in chars.by_ref() {
                    if c == ';' { break; }
                }
                slots += 1;
            }
            '[' => {
                while chars.peek() == Some(&'[') {
                    chars.next();
                }
                if chars.next() == Some('L') {
                    for c in chars.by_ref() {
                        if c == ';' { break; }
                    }
                }
                slots += 1;
            }
            _ => slots += 1,
        }
    }
    slots
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

struct BranchFixup {
    instr_start: usize,
    at: usize,
    wide: bool,
    label: Label,
}

struct Handler {
    start: Label,
    end: Label,
    handler: Label,
    catch_type: Option<String>,
}

/// Assembles one method body. Pool references and branch targets are patched in
/// when the method is added to a [`ClassWriter`].
pub struct CodeBuilder {
    max_stack: U2,
    max_locals: U2,
    code: Vec<u8>,
    pool_fixups: Vec<(usize, bool, Constant)>,
    labels: Vec<Option<usize>>,
    branches: Vec<BranchFixup>,
    handlers: Vec<Handler>,
}

impl CodeBuilder {
    pub fn new(max_stack: U2, max_locals: U2) -> Self {
        CodeBuilder {
            max_stack,
            max_locals,
            code: vec![],
            pool_fixups: vec![],
            labels: vec![],
            branches: vec![],
            handlers: vec![],
        }
    }

    pub fn position(&self) -> usize {
        self.code.len()
    }

    pub fn op(&mut self, instr: Instruction) -> &mut Self {
        self.code.push(instr.into());
        self
    }

    pub fn op_u1(&mut self, instr: Instruction, operand: u8) -> &mut Self {
        self.code.push(instr.into());
        self.code.push(operand);
        self
    }

    pub fn op_u2(&mut self, instr: Instruction, operand: u16) -> &mut Self {
        self.code.push(instr.into());
        put_u2(&mut self.code, operand);
        self
    }

    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.code.extend_from_slice(bytes);
        self
    }

    /// Pushes an int constant with the shortest encoding.
    pub fn iconst(&mut self, value: i32) -> &mut Self {
        use Instruction::*;

        match value {
            -1 => self.op(iconst_m1),
            0 => self.op(iconst_0),
            1 => self.op(iconst_1),
            2 => self.op(iconst_2),
            3 => self.op(iconst_3),
            4 => self.op(iconst_4),
            5 => self.op(iconst_5),
            -128..=127 => self.op_u1(bipush, value as i8 as u8),
            -32768..=32767 => self.op_u2(sipush, value as i16 as u16),
            _ => self.ldc(Constant::Int(value)),
        }
    }

    fn pool_ref(&mut self, instr: Instruction, constant: Constant) -> &mut Self {
        self.code.push(instr.into());
        self.pool_fixups.push((self.code.len(), true, constant));
        put_u2(&mut self.code, 0);
        self
    }

    /// `ldc_w`, or `ldc2_w` for longs and doubles.
    pub fn ldc(&mut self, constant: Constant) -> &mut Self {
        match constant {
            Constant::Long(_) | Constant::Double(_) => self.pool_ref(Instruction::ldc2_w, constant),
            _ => self.pool_ref(Instruction::ldc_w, constant),
        }
    }

    /// The one-byte-index form; the pool of the class must stay below 256 entries.
    pub fn ldc_narrow(&mut self, constant: Constant) -> &mut Self {
        self.code.push(Instruction::ldc.into());
        self.pool_fixups.push((self.code.len(), false, constant));
        self.code.push(0);
        self
    }

    pub fn iinc(&mut self, index: u8, delta: i8) -> &mut Self {
        self.code.push(Instruction::iinc.into());
        self.code.push(index);
        self.code.push(delta as u8);
        self
    }

    pub fn field(&mut self, instr: Instruction, class: &str, name: &str, descriptor: &str) -> &mut Self {
        self.pool_ref(instr, Constant::Field(class.to_string(), name.to_string(), descriptor.to_string()))
    }

    pub fn invoke(&mut self, instr: Instruction, class: &str, name: &str, descriptor: &str) -> &mut Self {
        let (class, name, desc) = (class.to_string(), name.to_string(), descriptor.to_string());
        if instr == Instruction::invokeinterface {
            self.pool_ref(instr, Constant::InterfaceMethod(class, name, desc));
            self.code.push(arg_slots(descriptor) + 1);
            self.code.push(0);
            self
        } else {
            self.pool_ref(instr, Constant::Method(class, name, desc))
        }
    }

    /// `new`, `anewarray`, `checkcast` and `instanceof`.
    pub fn class_op(&mut self, instr: Instruction, class: &str) -> &mut Self {
        self.pool_ref(instr, Constant::Class(class.to_string()))
    }

    pub fn multianewarray(&mut self, descriptor: &str, dimensions: u8) -> &mut Self {
        self.pool_ref(Instruction::multianewarray, Constant::Class(descriptor.to_string()));
        self.code.push(dimensions);
        self
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    pub fn bind(&mut self, label: Label) -> &mut Self {
        self.labels[label.0] = Some(self.code.len());
        self
    }

    pub fn branch(&mut self, instr: Instruction, label: Label) -> &mut Self {
        let instr_start = self.code.len();
        let wide = matches!(instr, Instruction::goto_w | Instruction::jsr_w);
        self.code.push(instr.into());
        self.branches.push(BranchFixup { instr_start, at: self.code.len(), wide, label });
        if wide {
            put_u4(&mut self.code, 0);
        } else {
            put_u2(&mut self.code, 0);
        }
        self
    }

    fn switch_target(&mut self, instr_start: usize, label: Label) {
        self.branches.push(BranchFixup { instr_start, at: self.code.len(), wide: true, label });
        put_u4(&mut self.code, 0);
    }

    fn switch_padding(&mut self) {
        while self.code.len() % 4 != 0 {
            self.code.push(0);
        }
    }

    pub fn tableswitch(&mut self, low: i32, default: Label, targets: &[Label]) -> &mut Self {
        let instr_start = self.code.len();
        self.code.push(Instruction::tableswitch.into());
        self.switch_padding();
        self.switch_target(instr_start, default);
        put_u4(&mut self.code, low as u32);
        put_u4(&mut self.code, (low + targets.len() as i32 - 1) as u32);
        for target in targets {
            self.switch_target(instr_start, *target);
        }
        self
    }

    pub fn lookupswitch(&mut self, default: Label, pairs: &[(i32, Label)]) -> &mut Self {
        let instr_start = self.code.len();
        self.code.push(Instruction::lookupswitch.into());
        self.switch_padding();
        self.switch_target(instr_start, default);
        put_u4(&mut self.code, pairs.len() as u32);
        let mut sorted = pairs.to_vec();
        sorted.sort_by_key(|(key, _)| *key);
        for (key, target) in sorted {
            put_u4(&mut self.code, key as u32);
            self.switch_target(instr_start, target);
        }
        self
    }

    /// Covers `[start, end)` with a handler; `None` catches everything.
    pub fn handler(&mut self, start: Label, end: Label, handler: Label, catch_type: Option<&str>) -> &mut Self {
        self.handlers.push(Handler { start, end, handler, catch_type: catch_type.map(str::to_string) });
        self
    }

    fn label_pos(&self, label: Label) -> usize {
        match self.labels.get(label.0).copied().flatten() {
            Some(pos) => pos,
            None => panic!("label {} used but never bound", label.0),
        }
    }

    fn assemble(mut self, pool: &mut PoolBuilder) -> Vec<u8> {
        for (at, wide, constant) in std::mem::take(&mut self.pool_fixups) {
            let index = pool.constant(&constant);
            if wide {
                self.code[at..at + 2].copy_from_slice(&index.to_be_bytes());
            } else {
                assert!(index <= u8::MAX as u16, "ldc index {} does not fit in one byte", index);
                self.code[at] = index as u8;
            }
        }

        for fixup in std::mem::take(&mut self.branches) {
            let offset = self.label_pos(fixup.label) as i64 - fixup.instr_start as i64;
            if fixup.wide {
                self.code[fixup.at..fixup.at + 4].copy_from_slice(&(offset as i32).to_be_bytes());
            } else {
                self.code[fixup.at..fixup.at + 2].copy_from_slice(&(offset as i16).to_be_bytes());
            }
        }

        let mut out = vec![];
        put_u2(&mut out, self.max_stack);
        put_u2(&mut out, self.max_locals);
        put_u4(&mut out, self.code.len() as u32);
        out.extend_from_slice(&self.code);

        put_u2(&mut out, self.handlers.len() as U2);
        for handler in &self.handlers {
            put_u2(&mut out, self.label_pos(handler.start) as U2);
            put_u2(&mut out, self.label_pos(handler.end) as U2);
            put_u2(&mut out, self.label_pos(handler.handler) as U2);
            let catch = handler.catch_type.as_deref().map(|c| pool.class(c)).unwrap_or(0);
            put_u2(&mut out, catch);
        }

        put_u2(&mut out, 0);
        out
    }
}

struct Member {
    flags: U2,
    name: U2,
    descriptor: U2,
    attributes: Vec<(U2, Vec<u8>)>,
}

/// Produces class file bytes. Used to synthesize the built-in runtime classes and
/// by tests that need small hand-made classes.
pub struct ClassWriter {
    pool: PoolBuilder,
    major_version: U2,
    access_flags: U2,
    this_class: U2,
    super_class: U2,
    interfaces: Vec<U2>,
    fields: Vec<Member>,
    methods: Vec<Member>,
    source_file: Option<String>,
}

impl ClassWriter {
    pub fn new(name: &str, super_name: Option<&str>) -> Self {
        let mut pool = PoolBuilder::default();
        let this_class = pool.class(name);
        let super_class = super_name.map(|s| pool.class(s)).unwrap_or(0);

        ClassWriter {
            pool,
            major_version: 50,
            access_flags: AccessFlagClass::ACC_PUBLIC as U2 | AccessFlagClass::ACC_SUPER as U2,
            this_class,
            super_class,
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            source_file: None,
        }
    }

    pub fn interface(name: &str) -> Self {
        let mut writer = ClassWriter::new(name, Some("java/lang/Object"));
        writer.access_flags = AccessFlagClass::ACC_PUBLIC as U2 | AccessFlagClass::ACC_INTERFACE as U2
            | AccessFlagClass::ACC_ABSTRACT as U2;
        writer
    }

    pub fn access_flags(&mut self, flags: U2) -> &mut Self {
        self.access_flags = flags;
        self
    }

    pub fn version(&mut self, major: U2) -> &mut Self {
        self.major_version = major;
        self
    }

    pub fn implements(&mut self, name: &str) -> &mut Self {
        let index = self.pool.class(name);
        self.interfaces.push(index);
        self
    }

    pub fn source_file(&mut self, name: &str) -> &mut Self {
        self.source_file = Some(name.to_string());
        self
    }

    pub fn field(&mut self, flags: U2, name: &str, descriptor: &str) -> &mut Self {
        let member = Member {
            flags,
            name: self.pool.utf8(name),
            descriptor: self.pool.utf8(descriptor),
            attributes: vec![],
        };
        self.fields.push(member);
        self
    }

    /// A static field with a `ConstantValue` attribute.
    pub fn constant_field(&mut self, flags: U2, name: &str, descriptor: &str, value: Constant) -> &mut Self {
        let attribute_name = self.pool.utf8("ConstantValue");
        let index = self.pool.constant(&value);
        let member = Member {
            flags,
            name: self.pool.utf8(name),
            descriptor: self.pool.utf8(descriptor),
            attributes: vec![(attribute_name, index.to_be_bytes().to_vec())],
        };
        self.fields.push(member);
        self
    }

    pub fn method(&mut self, flags: U2, name: &str, descriptor: &str, code: CodeBuilder) -> &mut Self {
        let attribute_name = self.pool.utf8("Code");
        let body = code.assemble(&mut self.pool);
        let member = Member {
            flags,
            name: self.pool.utf8(name),
            descriptor: self.pool.utf8(descriptor),
            attributes: vec![(attribute_name, body)],
        };
        self.methods.push(member);
        self
    }

    pub fn native_method(&mut self, flags: U2, name: &str, descriptor: &str) -> &mut Self {
        self.bodyless_method(flags | AccessFlagMethod::ACC_NATIVE as U2, name, descriptor)
    }

    pub fn abstract_method(&mut self, flags: U2, name: &str, descriptor: &str) -> &mut Self {
        self.bodyless_method(flags | AccessFlagMethod::ACC_ABSTRACT as U2, name, descriptor)
    }

    fn bodyless_method(&mut self, flags: U2, name: &str, descriptor: &str) -> &mut Self {
        let member = Member {
            flags,
            name: self.pool.utf8(name),
            descriptor: self.pool.utf8(descriptor),
            attributes: vec![],
        };
        self.methods.push(member);
        self
    }

    fn write_members(out: &mut Vec<u8>, members: &[Member]) {
        put_u2(out, members.len() as U2);
        for member in members {
            put_u2(out, member.flags);
            put_u2(out, member.name);
            put_u2(out, member.descriptor);
            put_u2(out, member.attributes.len() as U2);
            for (name, body) in &member.attributes {
                put_u2(out, *name);
                put_u4(out, body.len() as u32);
                out.extend_from_slice(body);
            }
        }
    }

    pub fn finish(&mut self) -> Vec<u8> {
        let source_file = self.source_file.take().map(|s| {
            let name = self.pool.utf8("SourceFile");
            (name, self.pool.utf8(&s))
        });

        let mut out = vec![];
        put_u4(&mut out, 0xCAFEBABE);
        put_u2(&mut out, 0);
        put_u2(&mut out, self.major_version);
        self.pool.write(&mut out);
        put_u2(&mut out, self.access_flags);
        put_u2(&mut out, self.this_class);
        put_u2(&mut out, self.super_class);
        put_u2(&mut out, self.interfaces.len() as U2);
        for interface in &self.interfaces {
            put_u2(&mut out, *interface);
        }
        Self::write_members(&mut out, &self.fields);
        Self::write_members(&mut out, &self.methods);

        match source_file {
            Some((name, value)) => {
                put_u2(&mut out, 1);
                put_u2(&mut out, name);
                put_u4(&mut out, 2);
                put_u2(&mut out, value);
            }
            None => put_u2(&mut out, 0),
        }
        out
    }
}
