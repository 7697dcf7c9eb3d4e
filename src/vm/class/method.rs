use std::fmt::{Debug, Formatter};
use once_cell::unsync::OnceCell;
use crate::class_parser::constants::AccessFlagMethod;
use crate::helper::has_flag;
use crate::vm::class::class::ClassId;
use crate::vm::class::field::FieldType;
use crate::vm::interpreter::decode::Instr;
use crate::vm::native::NativeFn;

#[derive(Debug, PartialEq, Clone)]
pub struct MethodDescriptor {
    pub parameters: Vec<FieldType>,
    pub ret: FieldType
}

impl MethodDescriptor {
    /// Slots the arguments take on the operand stack, receiver excluded.
    pub fn arg_slots(&self) -> usize {
        self.parameters.iter().map(FieldType::slots).sum()
    }
}

pub struct Method {
    pub flag: u16,
    pub name: String,
    pub descriptor: String,
    pub signature: MethodDescriptor,
    pub class: ClassId,
    pub class_name: String,
    pub code: Option<Code>,
    pub(crate) native: OnceCell<NativeFn>,
}

impl Debug for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

impl Method {
    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_STATIC)
    }

    pub fn is_native(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_NATIVE)
    }

    pub fn is_abstract(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_ABSTRACT)
    }

    pub fn is_synchronized(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_SYNCHRONIZED)
    }

    pub fn is_private(&self) -> bool {
        has_flag(self.flag, AccessFlagMethod::ACC_PRIVATE)
    }

    pub fn is_instance_init(&self) -> bool {
        self.name == "<init>"
    }

    pub fn key(&self) -> String {
        method_key(&self.name, &self.descriptor)
    }

    pub fn arg_slots(&self) -> usize {
        self.signature.arg_slots()
    }
}

pub fn method_key(name: &str, descriptor: &str) -> String {
    format!("{}{}", name, descriptor)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionHandler {
    pub start_pc: u32,
    pub end_pc: u32,
    pub handler_pc: u32,
    pub catch_type: Option<String>,
}

impl ExceptionHandler {
    pub fn covers(&self, pc: u32) -> bool {
        self.start_pc <= pc && pc < self.end_pc
    }
}

#[derive(Debug)]
pub struct Code {
    pub max_stack: usize,
    pub max_locals: usize,
    pub instrs: Vec<Instr>,
    pc_index: Vec<u32>,
    pub handlers: Vec<ExceptionHandler>,
}

const NO_INSTR: u32 = u32::MAX;

impl Code {
    pub fn new(max_stack: usize, max_locals: usize, code_length: usize, instrs: Vec<Instr>,
               handlers: Vec<ExceptionHandler>) -> Self {
        let mut pc_index = vec![NO_INSTR; code_length];
        for (i, instr) in instrs.iter().enumerate() {
            pc_index[instr.pc as usize] = i as u32;
        }

        Code { max_stack, max_locals, instrs, pc_index, handlers }
    }

    /// The instruction starting at `pc`, if one does.
    pub fn at(&self, pc: u32) -> Option<&Instr> {
        match self.pc_index.get(pc as usize) {
            Some(&i) if i != NO_INSTR => self.instrs.get(i as usize),
            _ => None,
        }
    }

    pub fn is_instruction_start(&self, pc: u32) -> bool {
        self.at(pc).is_some()
    }
}
