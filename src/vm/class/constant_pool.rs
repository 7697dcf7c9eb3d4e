use std::rc::Rc;
use once_cell::unsync::OnceCell;
use crate::class_parser::constants::CPInfo;
use crate::class_parser::types::{ConstantPool, U2};
use crate::class_parser::ParseError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A dereferenced field or method reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberRef {
    pub kind: MemberKind,
    pub class: String,
    pub name: String,
    pub descriptor: String,
}

impl MemberRef {
    pub fn key(&self) -> String {
        format!("{}{}", self.name, self.descriptor)
    }
}

/// Constants `ldc` can push.
#[derive(Debug, Clone, PartialEq)]
pub enum Loadable {
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(String),
}

/// Per-class view of the constant pool. Member references are composed the first
/// time they are asked for and shared afterwards.
#[derive(Debug)]
pub struct RuntimePool {
    raw: ConstantPool,
    members: Vec<OnceCell<Rc<MemberRef>>>,
}

impl RuntimePool {
    pub fn new(raw: ConstantPool) -> Self {
        let members = (0..raw.len()).map(|_| OnceCell::new()).collect();
        RuntimePool { raw, members }
    }

    pub fn raw(&self) -> &ConstantPool {
        &self.raw
    }

    pub fn class_name(&self, index: U2) -> Result<&str, ParseError> {
        self.raw.class_name(index)
    }

    pub fn member(&self, index: U2) -> Result<Rc<MemberRef>, ParseError> {
        let cell = self.members.get((index as usize).wrapping_sub(1))
            .ok_or(ParseError::BadConstantIndex(index))?;

        cell.get_or_try_init(|| {
            let kind = match self.raw.get(index)? {
                CPInfo::Fieldref(..) => MemberKind::Field,
                CPInfo::Methodref(..) => MemberKind::Method,
                CPInfo::InterfaceMethodref(..) => MemberKind::InterfaceMethod,
                _ => return Err(ParseError::BadConstantIndex(index)),
            };
            let (class, name, descriptor) = self.raw.member(index)?;
            Ok(Rc::new(MemberRef {
                kind,
                class: class.to_string(),
                name: name.to_string(),
                descriptor: descriptor.to_string(),
            }))
        }).map(Rc::clone)
    }

    pub fn loadable(&self, index: U2) -> Result<Loadable, ParseError> {
        Ok(match self.raw.get(index)? {
            CPInfo::Integer(v) => Loadable::Int(*v as i32),
            CPInfo::Float(v) => Loadable::Float(f32::from_bits(*v)),
            CPInfo::Long(hi, lo) => Loadable::Long((((*hi as u64) << 32) | *lo as u64) as i64),
            CPInfo::Double(hi, lo) => Loadable::Double(f64::from_bits(((*hi as u64) << 32) | *lo as u64)),
            CPInfo::String(_) => Loadable::String(self.raw.string(index)?.to_string()),
            CPInfo::Class(_) => Loadable::Class(self.raw.class_name(index)?.to_string()),
            _ => return Err(ParseError::BadConstantIndex(index)),
        })
    }
}
