use crate::vm::class::class::ClassId;
use crate::vm::class::field::FieldType;
use crate::vm::value::{ObjectRef, Reference, Value};

/// Typed element storage of an array object.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Boolean(Vec<i8>),
    Byte(Vec<i8>),
    Char(Vec<u16>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Long(Vec<i64>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    Ref(Vec<Reference>),
}

fn zeroed<T: Clone>(len: usize, zero: T) -> Option<Vec<T>> {
    let mut elements = Vec::new();
    elements.try_reserve_exact(len).ok()?;
    elements.resize(len, zero);
    Some(elements)
}

impl ArrayData {
    /// Bytes one element of `component` takes.
    pub fn element_size(component: &FieldType) -> usize {
        match component {
            FieldType::Z | FieldType::B => 1,
            FieldType::C | FieldType::S => 2,
            FieldType::I | FieldType::F => 4,
            FieldType::J | FieldType::D => 8,
            FieldType::L(_) | FieldType::A(_) | FieldType::V => std::mem::size_of::<Reference>(),
        }
    }

    /// Zeroed storage for `len` elements; `None` when the host cannot provide it.
    pub fn new(component: &FieldType, len: usize) -> Option<Self> {
        Some(match component {
            FieldType::Z => ArrayData::Boolean(zeroed(len, 0)?),
            FieldType::B => ArrayData::Byte(zeroed(len, 0)?),
            FieldType::C => ArrayData::Char(zeroed(len, 0)?),
            FieldType::S => ArrayData::Short(zeroed(len, 0)?),
            FieldType::I => ArrayData::Int(zeroed(len, 0)?),
            FieldType::J => ArrayData::Long(zeroed(len, 0)?),
            FieldType::F => ArrayData::Float(zeroed(len, 0.0)?),
            FieldType::D => ArrayData::Double(zeroed(len, 0.0)?),
            FieldType::L(_) | FieldType::A(_) | FieldType::V => ArrayData::Ref(zeroed(len, None)?),
        })
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => v.len(),
            ArrayData::Char(v) => v.len(),
            ArrayData::Short(v) => v.len(),
            ArrayData::Int(v) => v.len(),
            ArrayData::Long(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::Double(v) => v.len(),
            ArrayData::Ref(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        Some(match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => Value::Int(*v.get(index)? as i32),
            ArrayData::Char(v) => Value::Int(*v.get(index)? as i32),
            ArrayData::Short(v) => Value::Int(*v.get(index)? as i32),
            ArrayData::Int(v) => Value::Int(*v.get(index)?),
            ArrayData::Long(v) => Value::Long(*v.get(index)?),
            ArrayData::Float(v) => Value::Float(*v.get(index)?),
            ArrayData::Double(v) => Value::Double(*v.get(index)?),
            ArrayData::Ref(v) => Value::Ref(*v.get(index)?),
        })
    }

    /// Stores with the narrowing the element type implies; `false` when out of bounds.
    pub fn set(&mut self, index: usize, value: Value) -> bool {
        fn put<T>(v: &mut [T], index: usize, x: T) -> bool {
            match v.get_mut(index) {
                Some(slot) => {
                    *slot = x;
                    true
                }
                None => false,
            }
        }

        match self {
            ArrayData::Boolean(v) => put(v, index, (value.as_int() & 1) as i8),
            ArrayData::Byte(v) => put(v, index, value.as_int() as i8),
            ArrayData::Char(v) => put(v, index, value.as_int() as u16),
            ArrayData::Short(v) => put(v, index, value.as_int() as i16),
            ArrayData::Int(v) => put(v, index, value.as_int()),
            ArrayData::Long(v) => put(v, index, value.as_long()),
            ArrayData::Float(v) => put(v, index, value.as_float()),
            ArrayData::Double(v) => put(v, index, value.as_double()),
            ArrayData::Ref(v) => put(v, index, value.as_ref()),
        }
    }

    /// Copies `len` elements from `src[src_pos..]` into `self[dst_pos..]`. Both
    /// arrays must hold the same element type and the ranges must be in bounds.
    pub fn copy_from(&mut self, dst_pos: usize, src: &ArrayData, src_pos: usize, len: usize) -> bool {
        fn copy<T: Copy>(dst: &mut [T], dst_pos: usize, src: &[T], src_pos: usize, len: usize) -> bool {
            match (dst.get_mut(dst_pos..dst_pos + len), src.get(src_pos..src_pos + len)) {
                (Some(d), Some(s)) => {
                    d.copy_from_slice(s);
                    true
                }
                _ => false,
            }
        }

        match (self, src) {
            (ArrayData::Boolean(d), ArrayData::Boolean(s)) | (ArrayData::Byte(d), ArrayData::Byte(s)) =>
                copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Char(d), ArrayData::Char(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Short(d), ArrayData::Short(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Int(d), ArrayData::Int(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Long(d), ArrayData::Long(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Float(d), ArrayData::Float(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Double(d), ArrayData::Double(s)) => copy(d, dst_pos, s, src_pos, len),
            (ArrayData::Ref(d), ArrayData::Ref(s)) => copy(d, dst_pos, s, src_pos, len),
            _ => false,
        }
    }

    pub fn copy_within(&mut self, src_pos: usize, dst_pos: usize, len: usize) -> bool {
        fn shift<T: Copy>(v: &mut [T], src_pos: usize, dst_pos: usize, len: usize) -> bool {
            if src_pos + len > v.len() || dst_pos + len > v.len() {
                return false;
            }
            v.copy_within(src_pos..src_pos + len, dst_pos);
            true
        }

        match self {
            ArrayData::Boolean(v) | ArrayData::Byte(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Char(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Short(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Int(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Long(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Float(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Double(v) => shift(v, src_pos, dst_pos, len),
            ArrayData::Ref(v) => shift(v, src_pos, dst_pos, len),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Instance field values, indexed by the class layout's offsets.
    Fields(Vec<Value>),
    Array(ArrayData),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub class: ClassId,
    pub body: Body,
}

impl Object {
    pub fn array(&self) -> Option<&ArrayData> {
        match &self.body {
            Body::Array(data) => Some(data),
            Body::Fields(_) => None,
        }
    }

    pub fn array_mut(&mut self) -> Option<&mut ArrayData> {
        match &mut self.body {
            Body::Array(data) => Some(data),
            Body::Fields(_) => None,
        }
    }

    pub fn field(&self, offset: usize) -> Value {
        match &self.body {
            Body::Fields(fields) => fields.get(offset).copied().unwrap_or(Value::Top),
            Body::Array(_) => Value::Top,
        }
    }

    pub fn set_field(&mut self, offset: usize, value: Value) {
        if let Body::Fields(fields) = &mut self.body {
            if let Some(slot) = fields.get_mut(offset) {
                *slot = value;
            }
        }
    }
}

/// All objects of one VM instance. There is no collector; objects live until the
/// heap is dropped or cleared by a cache reset.
#[derive(Debug, Default)]
pub struct Heap {
    objects: Vec<Object>,
}

impl Heap {
    pub fn alloc(&mut self, object: Object) -> ObjectRef {
        let reference = ObjectRef::from_index(self.objects.len())
            .unwrap_or_else(|| panic!("heap exhausted after {} objects", self.objects.len()));
        self.objects.push(object);
        reference
    }

    pub fn alloc_instance(&mut self, class: ClassId, fields: Vec<Value>) -> ObjectRef {
        self.alloc(Object { class, body: Body::Fields(fields) })
    }

    pub fn alloc_array(&mut self, class: ClassId, data: ArrayData) -> ObjectRef {
        self.alloc(Object { class, body: Body::Array(data) })
    }

    pub fn get(&self, reference: ObjectRef) -> &Object {
        &self.objects[reference.index()]
    }

    pub fn get_mut(&mut self, reference: ObjectRef) -> &mut Object {
        &mut self.objects[reference.index()]
    }

    pub fn try_get(&self, reference: ObjectRef) -> Option<&Object> {
        self.objects.get(reference.index())
    }

    pub fn class_of(&self, reference: ObjectRef) -> ClassId {
        self.get(reference).class
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
    }

    /// Reads a `char[]` as a Rust string, replacing unpaired surrogates.
    pub fn chars_to_string(&self, array: ObjectRef) -> Option<String> {
        match self.try_get(array)?.array()? {
            ArrayData::Char(units) => Some(String::from_utf16_lossy(units)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod test {
    use crate::vm::class::class::ClassId;
    use crate::vm::class::field::FieldType;
    use crate::vm::object::{ArrayData, Heap};
    use crate::vm::value::Value;

    #[test]
    fn references_are_monotonic() {
        let mut heap = Heap::default();
        let a = heap.alloc_instance(ClassId(0), vec![Value::Int(0)]);
        let b = heap.alloc_instance(ClassId(0), vec![]);
        assert!(b.id() > a.id());
        assert_eq!(heap.get(a).field(0), Value::Int(0));
    }

    #[test]
    fn arrays_start_zeroed_and_narrow_on_store() {
        let mut data = ArrayData::new(&FieldType::B, 3).unwrap();
        assert_eq!(data.get(2), Some(Value::Int(0)));
        assert!(data.set(1, Value::Int(0x1FF)));
        assert_eq!(data.get(1), Some(Value::Int(-1)));
        assert!(!data.set(3, Value::Int(1)));
        assert_eq!(data.get(3), None);

        let mut refs = ArrayData::new(&FieldType::L("java/lang/Object".into()), 2).unwrap();
        assert_eq!(refs.get(0), Some(Value::NULL));
        assert!(refs.set(0, Value::NULL));
    }

    #[test]
    fn overlapping_copies() {
        let mut data = ArrayData::Int(vec![1, 2, 3, 4]);
        assert!(data.copy_within(0, 1, 3));
        assert_eq!(data, ArrayData::Int(vec![1, 1, 2, 3]));
        assert!(!data.copy_within(2, 0, 3));

        let src = ArrayData::Int(vec![9, 8]);
        assert!(data.copy_from(2, &src, 0, 2));
        assert_eq!(data, ArrayData::Int(vec![1, 1, 9, 8]));
        assert!(!data.copy_from(0, &ArrayData::Long(vec![1]), 0, 1));
    }
}
