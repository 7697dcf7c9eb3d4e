use std::fmt::{Display, Formatter};
use std::num::NonZeroU32;
use crate::vm::class::field::FieldType;

/// Opaque handle of a heap object. Ids are handed out in increasing order and never
/// reused during a run; `null` is `None` in a [`Reference`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef(NonZeroU32);

pub type Reference = Option<ObjectRef>;

impl ObjectRef {
    pub(crate) fn from_index(index: usize) -> Option<Self> {
        u32::try_from(index + 1).ok().and_then(NonZeroU32::new).map(ObjectRef)
    }

    pub fn id(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn index(self) -> usize {
        self.0.get() as usize - 1
    }
}

impl Display for ObjectRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// A slot value. Longs and doubles occupy two slots, the second holding `Top`;
/// booleans, bytes, chars and shorts travel as `Int`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Reference),
    ReturnAddress(u32),
    Top,
}

impl Default for Value {
    fn default() -> Self {
        Value::Top
    }
}

// Ill-typed operands only come from unverified bytecode; they read as zero.
impl Value {
    pub const NULL: Value = Value::Ref(None);

    pub fn is_wide(&self) -> bool {
        matches!(self, Value::Long(_) | Value::Double(_))
    }

    pub fn as_int(self) -> i32 {
        match self {
            Value::Int(v) => v,
            _ => 0,
        }
    }

    pub fn as_long(self) -> i64 {
        match self {
            Value::Long(v) => v,
            _ => 0,
        }
    }

    pub fn as_float(self) -> f32 {
        match self {
            Value::Float(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_double(self) -> f64 {
        match self {
            Value::Double(v) => v,
            _ => 0.0,
        }
    }

    pub fn as_ref(self) -> Reference {
        match self {
            Value::Ref(r) => r,
            _ => None,
        }
    }

    pub fn as_bool(self) -> bool {
        self.as_int() != 0
    }

    pub fn from_bool(b: bool) -> Value {
        Value::Int(b as i32)
    }

    pub fn zero_of(ty: &FieldType) -> Value {
        match ty {
            FieldType::B | FieldType::C | FieldType::I | FieldType::S | FieldType::Z => Value::Int(0),
            FieldType::J => Value::Long(0),
            FieldType::F => Value::Float(0.0),
            FieldType::D => Value::Double(0.0),
            FieldType::L(_) | FieldType::A(_) => Value::NULL,
            FieldType::V => Value::Top,
        }
    }

    /// Narrows an int to what a field or array element of type `ty` can hold.
    pub fn narrow_to(self, ty: &FieldType) -> Value {
        match (ty, self) {
            (FieldType::Z, Value::Int(v)) => Value::Int(v & 1),
            (FieldType::B, Value::Int(v)) => Value::Int(v as i8 as i32),
            (FieldType::C, Value::Int(v)) => Value::Int(v as u16 as i32),
            (FieldType::S, Value::Int(v)) => Value::Int(v as i16 as i32),
            _ => self,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Long(v) => write!(f, "{}L", v),
            Value::Float(v) => write!(f, "{}f", v),
            Value::Double(v) => write!(f, "{}d", v),
            Value::Ref(Some(r)) => write!(f, "{}", r),
            Value::Ref(None) => write!(f, "null"),
            Value::ReturnAddress(pc) => write!(f, "ret@{}", pc),
            Value::Top => write!(f, "-"),
        }
    }
}
