use crate::class_parser::constants::{CPInfo, CPTag};
use crate::class_parser::ParseError;

pub type U1 = u8;
pub type U2 = u16;
pub type U4 = u32;

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub access_flags: U2,
    pub name_index: U2,
    pub descriptor_index: U2,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub access_flags: U2,
    pub name_index: U2,
    pub descriptor_index: U2,
    pub attributes: Vec<AttributeInfo>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub attribute_name_index: U2,
    pub info: Vec<u8>,
}

/// The constant pool as it appears in the file, indexed from 1.
///
/// Cross references are stored as indices and only followed on request, so a
/// pool whose entries point at each other in any order parses the same way.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConstantPool {
    entries: Vec<CPInfo>,
}

impl ConstantPool {
    pub fn new(entries: Vec<CPInfo>) -> Self {
        ConstantPool { entries }
    }

    /// Number of slots, counting the unusable slot after each long or double.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: U2) -> Result<&CPInfo, ParseError> {
        if index == 0 {
            return Err(ParseError::BadConstantIndex(index));
        }
        match self.entries.get(index as usize - 1) {
            Some(CPInfo::Hole) | None => Err(ParseError::BadConstantIndex(index)),
            Some(entry) => Ok(entry),
        }
    }

    pub fn tag(&self, index: U2) -> Option<CPTag> {
        self.get(index).ok().and_then(CPInfo::tag)
    }

    pub fn utf8(&self, index: U2) -> Result<&str, ParseError> {
        match self.get(index)? {
            CPInfo::Utf8(s) => Ok(s),
            _ => Err(ParseError::BadConstantIndex(index)),
        }
    }

    pub fn class_name(&self, index: U2) -> Result<&str, ParseError> {
        match self.get(index)? {
            CPInfo::Class(name) => self.utf8(*name),
            _ => Err(ParseError::BadConstantIndex(index)),
        }
    }

    pub fn string(&self, index: U2) -> Result<&str, ParseError> {
        match self.get(index)? {
            CPInfo::String(value) => self.utf8(*value),
            _ => Err(ParseError::BadConstantIndex(index)),
        }
    }

    pub fn name_and_type(&self, index: U2) -> Result<(&str, &str), ParseError> {
        match self.get(index)? {
            CPInfo::NameAndType(name, descriptor) => Ok((self.utf8(*name)?, self.utf8(*descriptor)?)),
            _ => Err(ParseError::BadConstantIndex(index)),
        }
    }

    /// Class, name and descriptor of a field, method or interface method reference.
    pub fn member(&self, index: U2) -> Result<(&str, &str, &str), ParseError> {
        match self.get(index)? {
            CPInfo::Fieldref(class, nat)
            | CPInfo::Methodref(class, nat)
            | CPInfo::InterfaceMethodref(class, nat) => {
                let (name, descriptor) = self.name_and_type(*nat)?;
                Ok((self.class_name(*class)?, name, descriptor))
            }
            _ => Err(ParseError::BadConstantIndex(index)),
        }
    }

    /// Composes the human readable form of an entry: `pkg/Class` for classes,
    /// `pkg/Class.name(sig)` for member references, the literal otherwise.
    pub fn describe(&self, index: U2) -> Result<String, ParseError> {
        Ok(match self.get(index)? {
            CPInfo::Utf8(s) => s.clone(),
            CPInfo::Class(_) => self.class_name(index)?.to_string(),
            CPInfo::String(_) => format!("\"{}\"", self.string(index)?),
            CPInfo::Integer(v) => (*v as i32).to_string(),
            CPInfo::Float(v) => f32::from_bits(*v).to_string(),
            CPInfo::Long(hi, lo) => ((((*hi as u64) << 32) | *lo as u64) as i64).to_string(),
            CPInfo::Double(hi, lo) => f64::from_bits(((*hi as u64) << 32) | *lo as u64).to_string(),
            CPInfo::NameAndType(..) => {
                let (name, descriptor) = self.name_and_type(index)?;
                format!("{}{}", name, descriptor)
            }
            CPInfo::Fieldref(..) => {
                let (class, name, descriptor) = self.member(index)?;
                format!("{}.{}:{}", class, name, descriptor)
            }
            CPInfo::Methodref(..) | CPInfo::InterfaceMethodref(..) => {
                let (class, name, descriptor) = self.member(index)?;
                format!("{}.{}{}", class, name, descriptor)
            }
            other => format!("{:?}", other),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = (U2, &CPInfo)> {
        self.entries.iter().enumerate().map(|(i, e)| ((i + 1) as U2, e))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedClass {
    pub minor_version: U2,
    pub major_version: U2,
    pub constant_pool: ConstantPool,
    pub access_flags: U2,
    pub this_class: U2,
    pub super_class: U2,
    pub interfaces: Vec<U2>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<AttributeInfo>,
}

impl ParsedClass {
    pub fn name(&self) -> Result<&str, ParseError> {
        self.constant_pool.class_name(self.this_class)
    }

    /// `None` only for java/lang/Object.
    pub fn super_name(&self) -> Result<Option<&str>, ParseError> {
        if self.super_class == 0 {
            Ok(None)
        } else {
            self.constant_pool.class_name(self.super_class).map(Some)
        }
    }

    pub fn interface_names(&self) -> Result<Vec<&str>, ParseError> {
        self.interfaces.iter()
            .map(|i| self.constant_pool.class_name(*i))
            .collect()
    }

    pub fn find_attribute<'a>(&self, attributes: &'a [AttributeInfo], name: &str) -> Option<&'a AttributeInfo> {
        attributes.iter().find(|a| self.constant_pool.utf8(a.attribute_name_index) == Ok(name))
    }
}
