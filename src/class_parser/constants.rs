use num_enum::{IntoPrimitive, TryFromPrimitive};
use crate::class_parser::types::{U1, U2, U4};

#[derive(TryFromPrimitive, IntoPrimitive, Debug, PartialEq, Eq, Clone, Copy)]
#[repr(u8)]
pub enum CPTag {
    Utf8 = 1,
    Integer = 3,        // START loadable
    Float = 4,
    Long = 5,
    Double = 6,
    Class = 7,
    String = 8,         // END
    Fieldref = 9,
    Methodref = 10,
    InterfaceMethodref = 11,
    NameAndType = 12,
    MethodHandle = 15,
    MethodType = 16,
    Dynamic = 17,
    InvokeDynamic = 18,
    Module = 19,
    Package = 20,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CPInfo {
    Class(U2),
    String(U2),
    MethodType(U2),
    Module(U2),
    Package(U2),
    Integer(U4),
    Float(U4),
    MethodHandle(U1, U2),
    Fieldref(U2, U2),
    Methodref(U2, U2),
    InterfaceMethodref(U2, U2),
    NameAndType(U2, U2),
    Dynamic(U2, U2),
    InvokeDynamic(U2, U2),
    Long(U4, U4),
    Double(U4, U4),
    Utf8(std::string::String),
    Hole, // second slot taken by a long or double
}

impl CPInfo {
    pub const fn tag(&self) -> Option<CPTag> {
        match self {
            CPInfo::Class(_) => Some(CPTag::Class),
            CPInfo::String(_) => Some(CPTag::String),
            CPInfo::MethodType(_) => Some(CPTag::MethodType),
            CPInfo::Module(_) => Some(CPTag::Module),
            CPInfo::Package(_) => Some(CPTag::Package),
            CPInfo::Integer(_) => Some(CPTag::Integer),
            CPInfo::Float(_) => Some(CPTag::Float),
            CPInfo::MethodHandle(_, _) => Some(CPTag::MethodHandle),
            CPInfo::Fieldref(_, _) => Some(CPTag::Fieldref),
            CPInfo::Methodref(_, _) => Some(CPTag::Methodref),
            CPInfo::InterfaceMethodref(_, _) => Some(CPTag::InterfaceMethodref),
            CPInfo::NameAndType(_, _) => Some(CPTag::NameAndType),
            CPInfo::Dynamic(_, _) => Some(CPTag::Dynamic),
            CPInfo::InvokeDynamic(_, _) => Some(CPTag::InvokeDynamic),
            CPInfo::Long(_, _) => Some(CPTag::Long),
            CPInfo::Double(_, _) => Some(CPTag::Double),
            CPInfo::Utf8(_) => Some(CPTag::Utf8),
            CPInfo::Hole => None
        }
    }

    pub const fn is_wide(&self) -> bool {
        matches!(self, CPInfo::Long(..) | CPInfo::Double(..))
    }
}

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy)]
#[repr(u16)]
pub enum AccessFlagClass {
    ACC_PUBLIC = 0x0001,
    ACC_FINAL = 0x0010,
    ACC_SUPER = 0x0020,
    ACC_INTERFACE = 0x0200,
    ACC_ABSTRACT = 0x0400,
    ACC_SYNTHETIC = 0x1000,
    ACC_ANNOTATION = 0x2000,
    ACC_ENUM = 0x4000,
}

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy)]
#[repr(u16)]
pub enum AccessFlagField {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_VOLATILE = 0x0040,
    ACC_TRANSIENT = 0x0080,
    ACC_SYNTHETIC = 0x1000,
    ACC_ENUM = 0x4000,
}

#[allow(non_camel_case_types)]
#[derive(IntoPrimitive, Debug, Clone, Copy)]
#[repr(u16)]
pub enum AccessFlagMethod {
    ACC_PUBLIC = 0x0001,
    ACC_PRIVATE = 0x0002,
    ACC_PROTECTED = 0x0004,
    ACC_STATIC = 0x0008,
    ACC_FINAL = 0x0010,
    ACC_SYNCHRONIZED = 0x0020,
    ACC_BRIDGE = 0x0040,
    ACC_VARARGS = 0x0080,
    ACC_NATIVE = 0x0100,
    ACC_ABSTRACT = 0x0400,
    ACC_STRICT = 0x0800,
    ACC_SYNTHETIC = 0x1000,
}
