use crate::class_parser::constants::AccessFlagField;
use crate::helper::has_flag;

#[derive(Debug, PartialEq, Eq, Hash, Clone)]
pub enum FieldType {
    B,
    C,
    D,
    F,
    I,
    J,
    L(String),
    S,
    Z,
    A(Box<FieldType>), // [
    V
}

impl FieldType {
    pub fn is_wide(&self) -> bool {
        matches!(self, FieldType::J | FieldType::D)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, FieldType::L(_) | FieldType::A(_))
    }

    pub fn slots(&self) -> usize {
        match self {
            FieldType::V => 0,
            FieldType::J | FieldType::D => 2,
            _ => 1,
        }
    }

    pub fn descriptor(&self) -> String {
        match self {
            FieldType::B => "B".to_string(),
            FieldType::C => "C".to_string(),
            FieldType::D => "D".to_string(),
            FieldType::F => "F".to_string(),
            FieldType::I => "I".to_string(),
            FieldType::J => "J".to_string(),
            FieldType::S => "S".to_string(),
            FieldType::Z => "Z".to_string(),
            FieldType::V => "V".to_string(),
            FieldType::L(name) => format!("L{};", name),
            FieldType::A(component) => format!("[{}", component.descriptor()),
        }
    }

    /// Name of the class modelling values of this type: `int`, `pkg/Foo`, `[I`.
    pub fn class_name(&self) -> String {
        match self {
            FieldType::B => "byte".to_string(),
            FieldType::C => "char".to_string(),
            FieldType::D => "double".to_string(),
            FieldType::F => "float".to_string(),
            FieldType::I => "int".to_string(),
            FieldType::J => "long".to_string(),
            FieldType::S => "short".to_string(),
            FieldType::Z => "boolean".to_string(),
            FieldType::V => "void".to_string(),
            FieldType::L(name) => name.clone(),
            FieldType::A(_) => self.descriptor(),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    pub flag: u16,
    pub name: String,
    pub descriptor: String,
    pub ty: FieldType,
    /// Constant pool index of a `ConstantValue` attribute.
    pub constant_value: Option<u16>,
}

impl Field {
    pub fn is_static(&self) -> bool {
        has_flag(self.flag, AccessFlagField::ACC_STATIC)
    }
}
