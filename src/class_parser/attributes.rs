use crate::class_parser::be_reader::ByteReader;
use crate::class_parser::types::{AttributeInfo, ConstantPool, U2};
use crate::class_parser::{parse_attribute_info, ParseError};

#[derive(Debug, Clone, PartialEq)]
pub struct ExceptionTableEntry {
    pub start_pc: U2,
    pub end_pc: U2,
    pub handler_pc: U2,
    pub catch_type: U2, // 0 catches everything
}

#[derive(Debug, Clone, PartialEq)]
pub struct CodeAttribute {
    pub max_stack: U2,
    pub max_locals: U2,
    pub code: Vec<u8>,
    pub exception_table: Vec<ExceptionTableEntry>,
    pub attributes: Vec<AttributeInfo>,
}

pub fn parse_code_attribute(attribute: &AttributeInfo) -> Result<CodeAttribute, ParseError> {
    let mut reader = ByteReader::new(&attribute.info);

    let max_stack = reader.read_u2()?;
    let max_locals = reader.read_u2()?;
    let code_length = reader.read_u4()? as usize;
    if code_length == 0 {
        return Err(ParseError::Malformed("empty code array".to_string()));
    }
    let code = reader.take(code_length)?.to_vec();

    let exception_table_length = reader.read_u2()?;
    let mut exception_table = Vec::with_capacity(exception_table_length as usize);
    for _ in 0..exception_table_length {
        exception_table.push(ExceptionTableEntry {
            start_pc: reader.read_u2()?,
            end_pc: reader.read_u2()?,
            handler_pc: reader.read_u2()?,
            catch_type: reader.read_u2()?,
        });
    }

    let attributes_count = reader.read_u2()?;
    let mut attributes = Vec::with_capacity(attributes_count as usize);
    for _ in 0..attributes_count {
        attributes.push(parse_attribute_info(&mut reader)?);
    }

    if !reader.is_empty() {
        return Err(ParseError::Malformed("Code attribute is longer than its contents".to_string()));
    }

    Ok(CodeAttribute { max_stack, max_locals, code, exception_table, attributes })
}

/// Index of the constant a static field starts out with.
pub fn parse_constant_value(attribute: &AttributeInfo) -> Result<U2, ParseError> {
    let mut reader = ByteReader::new(&attribute.info);
    let index = reader.read_u2()?;
    if !reader.is_empty() {
        return Err(ParseError::Malformed("ConstantValue attribute must be 2 bytes".to_string()));
    }
    Ok(index)
}

pub fn parse_source_file<'a>(attribute: &AttributeInfo, pool: &'a ConstantPool) -> Result<&'a str, ParseError> {
    let mut reader = ByteReader::new(&attribute.info);
    pool.utf8(reader.read_u2()?)
}
