use thiserror::Error;
use crate::class_parser::be_reader::ByteReader;
use crate::class_parser::constants::{CPInfo, CPTag};
use crate::class_parser::types::{AttributeInfo, ConstantPool, FieldInfo, MethodInfo, ParsedClass};
use crate::helper::decode_modified_utf8;

pub mod types;
pub mod constants;
pub mod attributes;
pub mod writer;
pub mod be_reader;

pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 51;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of data at offset {0}")]
    UnexpectedEof(usize),
    #[error("not a class file (magic {0:#010x})")]
    BadMagic(u32),
    #[error("unsupported class file version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },
    #[error("class file is {0} bytes longer than expected")]
    TrailingBytes(usize),
    #[error("unknown constant pool tag {0}")]
    BadConstantTag(u8),
    #[error("constant pool index {0} is invalid or of the wrong kind")]
    BadConstantIndex(u16),
    #[error("malformed modified UTF-8 string in constant pool")]
    BadUtf8,
    #[error("malformed descriptor {0}")]
    BadDescriptor(String),
    #[error("bad bytecode at pc {pc}: {reason}")]
    BadCode { pc: u32, reason: String },
    #[error("{0}")]
    Malformed(String),
}

fn parse_cp_info(reader: &mut ByteReader, constant_pool: &mut Vec<CPInfo>) -> Result<(), ParseError> {
    use CPTag::*;

    let tag = reader.read_u1()?;
    let tag = CPTag::try_from(tag).map_err(|_| ParseError::BadConstantTag(tag))?;

    let info = match tag {
        Utf8 => {
            let length = reader.read_u2()? as usize;
            let units = decode_modified_utf8(reader.take(length)?).ok_or(ParseError::BadUtf8)?;
            CPInfo::Utf8(std::string::String::from_utf16_lossy(&units))
        }
        Class => CPInfo::Class(reader.read_u2()?),
        String => CPInfo::String(reader.read_u2()?),
        MethodType => CPInfo::MethodType(reader.read_u2()?),
        Module => CPInfo::Module(reader.read_u2()?),
        Package => CPInfo::Package(reader.read_u2()?),
        Integer => CPInfo::Integer(reader.read_u4()?),
        Float => CPInfo::Float(reader.read_u4()?),
        Fieldref => CPInfo::Fieldref(reader.read_u2()?, reader.read_u2()?),
        Methodref => CPInfo::Methodref(reader.read_u2()?, reader.read_u2()?),
        InterfaceMethodref => CPInfo::InterfaceMethodref(reader.read_u2()?, reader.read_u2()?),
        NameAndType => CPInfo::NameAndType(reader.read_u2()?, reader.read_u2()?),
        Dynamic => CPInfo::Dynamic(reader.read_u2()?, reader.read_u2()?),
        InvokeDynamic => CPInfo::InvokeDynamic(reader.read_u2()?, reader.read_u2()?),
        Long => CPInfo::Long(reader.read_u4()?, reader.read_u4()?),
        Double => CPInfo::Double(reader.read_u4()?, reader.read_u4()?),
        MethodHandle => CPInfo::MethodHandle(reader.read_u1()?, reader.read_u2()?),
    };

    let wide = info.is_wide();
    constant_pool.push(info);
    if wide {
        constant_pool.push(CPInfo::Hole);
    }

    Ok(())
}

fn parse_field_info(reader: &mut ByteReader) -> Result<FieldInfo, ParseError> {
    let access_flags = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes = parse_attributes(reader)?;

    Ok(FieldInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn parse_method_info(reader: &mut ByteReader) -> Result<MethodInfo, ParseError> {
    let access_flags = reader.read_u2()?;
    let name_index = reader.read_u2()?;
    let descriptor_index = reader.read_u2()?;
    let attributes = parse_attributes(reader)?;

    Ok(MethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

pub(crate) fn parse_attribute_info(reader: &mut ByteReader) -> Result<AttributeInfo, ParseError> {
    let attribute_name_index = reader.read_u2()?;
    let attribute_length = reader.read_u4()?;
    let info = reader.take(attribute_length as usize)?.to_vec();

    Ok(AttributeInfo {
        attribute_name_index,
        info,
    })
}

fn parse_attributes(reader: &mut ByteReader) -> Result<Vec<AttributeInfo>, ParseError> {
    let attributes_count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(attributes_count as usize);
    for _ in 0..attributes_count {
        attributes.push(parse_attribute_info(reader)?);
    }
    Ok(attributes)
}

pub fn parse_class(buf: &[u8]) -> Result<ParsedClass, ParseError> {
    let mut reader = ByteReader::new(buf);

    let magic = reader.read_u4()?;
    if magic != 0xCAFEBABE {
        return Err(ParseError::BadMagic(magic));
    }

    let minor_version = reader.read_u2()?;
    let major_version = reader.read_u2()?;
    if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major_version) {
        return Err(ParseError::UnsupportedVersion { major: major_version, minor: minor_version });
    }

    let constant_pool_count = reader.read_u2()?.saturating_sub(1) as usize;
    let mut constant_pool = Vec::with_capacity(constant_pool_count);
    while constant_pool.len() < constant_pool_count {
        parse_cp_info(&mut reader, &mut constant_pool)?;
    }
    if constant_pool.len() > constant_pool_count {
        return Err(ParseError::Malformed("wide constant overruns the constant pool".to_string()));
    }

    let access_flags = reader.read_u2()?;
    let this_class = reader.read_u2()?;
    let super_class = reader.read_u2()?;

    let interfaces_count = reader.read_u2()?;
    let mut interfaces = Vec::with_capacity(interfaces_count as usize);
    for _ in 0..interfaces_count {
        interfaces.push(reader.read_u2()?);
    }

    let fields_count = reader.read_u2()?;
    let mut fields = Vec::with_capacity(fields_count as usize);
    for _ in 0..fields_count {
        fields.push(parse_field_info(&mut reader)?);
    }

    let methods_count = reader.read_u2()?;
    let mut methods = Vec::with_capacity(methods_count as usize);
    for _ in 0..methods_count {
        methods.push(parse_method_info(&mut reader)?);
    }

    let attributes = parse_attributes(&mut reader)?;

    if !reader.is_empty() {
        return Err(ParseError::TrailingBytes(reader.remaining()));
    }

    let parsed_class = ParsedClass {
        minor_version,
        major_version,
        constant_pool: ConstantPool::new(constant_pool),
        access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };

    // the class name is needed by everything downstream
    parsed_class.name()?;

    Ok(parsed_class)
}
