use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use once_cell::unsync::OnceCell;
use smallvec::SmallVec;
use crate::class_parser::constants::AccessFlagClass;
use crate::helper::{has_flag, to_binary_name};
use crate::vm::class::constant_pool::RuntimePool;
use crate::vm::class::field::{Field, FieldType};
use crate::vm::class::method::{method_key, Method};
use crate::vm::error::LinkError;
use crate::vm::thread::thread::ThreadId;
use crate::vm::value::{ObjectRef, Value};

/// Index of a class in its loader's arena. Only meaningful for the loader
/// generation that handed it out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) u32);

impl ClassId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// The loader that defined a class. A class is identified by its name together
/// with this id; only the bootstrap loader exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoaderId(pub(crate) u32);

impl LoaderId {
    pub const BOOTSTRAP: LoaderId = LoaderId(0);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassState {
    Loaded,
    Resolved,
    Initializing(ThreadId),
    Initialized,
    Erroneous,
}

pub enum ClassKind {
    Primitive(FieldType),
    Array {
        component: FieldType,
        component_class: ClassId,
    },
    Reference(ClassData),
}

pub struct ClassData {
    pub major_version: u16,
    pub pool: RuntimePool,
    pub super_name: Option<String>,
    pub interface_names: Vec<String>,
    pub fields: Vec<Field>,
    field_index: HashMap<String, usize>,
    pub methods: Vec<Rc<Method>>,
    method_index: HashMap<String, usize>,
    statics: OnceCell<RefCell<Vec<Value>>>,
    pub source_file: Option<String>,
}

impl ClassData {
    pub fn new(major_version: u16, pool: RuntimePool, super_name: Option<String>,
               interface_names: Vec<String>, fields: Vec<Field>, methods: Vec<Rc<Method>>,
               source_file: Option<String>) -> Self {
        let field_index = fields.iter().enumerate()
            .map(|(i, f)| (format!("{}:{}", f.name, f.descriptor), i))
            .collect();
        let method_index = methods.iter().enumerate()
            .map(|(i, m)| (m.key(), i))
            .collect();

        ClassData {
            major_version,
            pool,
            super_name,
            interface_names,
            fields,
            field_index,
            methods,
            method_index,
            statics: OnceCell::new(),
            source_file,
        }
    }

    /// A field declared by this class itself.
    pub fn find_field(&self, name: &str, descriptor: &str) -> Option<(usize, &Field)> {
        let index = *self.field_index.get(&format!("{}:{}", name, descriptor))?;
        Some((index, &self.fields[index]))
    }

    /// A method declared by this class itself.
    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<&Rc<Method>> {
        self.method_index.get(&method_key(name, descriptor)).map(|i| &self.methods[*i])
    }

    pub fn find_method_by_key(&self, key: &str) -> Option<&Rc<Method>> {
        self.method_index.get(key).map(|i| &self.methods[*i])
    }

    // Slots are indexed like `fields`; instance fields leave theirs unused.
    fn statics_cell(&self) -> &RefCell<Vec<Value>> {
        self.statics.get_or_init(|| {
            RefCell::new(self.fields.iter()
                .map(|f| if f.is_static() { Value::zero_of(&f.ty) } else { Value::Top })
                .collect())
        })
    }

    pub fn statics(&self) -> Ref<'_, Vec<Value>> {
        self.statics_cell().borrow()
    }

    pub fn statics_mut(&self) -> RefMut<'_, Vec<Value>> {
        self.statics_cell().borrow_mut()
    }
}

#[derive(Debug, Clone)]
pub struct FieldSlot {
    pub owner: ClassId,
    pub name: String,
    pub ty: FieldType,
}

/// Instance fields of a class and all its superclasses, superclass fields first.
/// A subclass layout starts with its superclass layout, so an offset stays valid
/// down the hierarchy.
#[derive(Debug, Default)]
pub struct InstanceLayout {
    pub slots: Vec<FieldSlot>,
}

impl InstanceLayout {
    pub fn offset_of(&self, owner: ClassId, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|s| s.owner == owner && s.name == name)
    }

    pub fn offset_by_name(&self, name: &str) -> Option<usize> {
        self.slots.iter().rposition(|s| s.name == name)
    }

    pub fn defaults(&self) -> Vec<Value> {
        self.slots.iter().map(|s| Value::zero_of(&s.ty)).collect()
    }
}

pub struct Class {
    pub id: ClassId,
    pub name: String,
    pub flags: u16,
    pub kind: ClassKind,
    pub loader: LoaderId,
    pub generation: u32,
    state: Cell<ClassState>,
    superclass: OnceCell<Option<ClassId>>,
    interfaces: OnceCell<SmallVec<[ClassId; 4]>>,
    layout: OnceCell<Rc<InstanceLayout>>,
    mirror: Cell<Option<ObjectRef>>,
    link_error: RefCell<Option<LinkError>>,
    pub(crate) init_waiters: RefCell<Vec<ThreadId>>,
}

impl Debug for Class {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}, {:?})", self.name, self.id, self.state.get())
    }
}

impl Class {
    pub fn new(id: ClassId, name: String, flags: u16, kind: ClassKind, loader: LoaderId, generation: u32) -> Self {
        let state = match kind {
            ClassKind::Primitive(_) => ClassState::Initialized,
            _ => ClassState::Loaded,
        };

        let class = Class {
            id,
            name,
            flags,
            kind,
            loader,
            generation,
            state: Cell::new(state),
            superclass: OnceCell::new(),
            interfaces: OnceCell::new(),
            layout: OnceCell::new(),
            mirror: Cell::new(None),
            link_error: RefCell::new(None),
            init_waiters: RefCell::new(vec![]),
        };

        if class.is_primitive() {
            let _ = class.superclass.set(None);
            let _ = class.interfaces.set(SmallVec::new());
            let _ = class.layout.set(Rc::new(InstanceLayout::default()));
        }
        class
    }

    pub fn state(&self) -> ClassState {
        self.state.get()
    }

    pub(crate) fn set_state(&self, state: ClassState) {
        self.state.set(state);
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self.state.get(), ClassState::Loaded) && self.link_error.borrow().is_none()
    }

    pub fn is_initialized(&self) -> bool {
        self.state.get() == ClassState::Initialized
    }

    pub fn is_interface(&self) -> bool {
        has_flag(self.flags, AccessFlagClass::ACC_INTERFACE)
    }

    pub fn is_abstract(&self) -> bool {
        has_flag(self.flags, AccessFlagClass::ACC_ABSTRACT)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, ClassKind::Array { .. })
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self.kind, ClassKind::Primitive(_))
    }

    pub fn data(&self) -> Option<&ClassData> {
        match &self.kind {
            ClassKind::Reference(data) => Some(data),
            _ => None,
        }
    }

    pub fn component(&self) -> Option<ClassId> {
        match &self.kind {
            ClassKind::Array { component_class, .. } => Some(*component_class),
            _ => None,
        }
    }

    pub fn component_type(&self) -> Option<&FieldType> {
        match &self.kind {
            ClassKind::Array { component, .. } => Some(component),
            _ => None,
        }
    }

    /// `None` before resolution and for classes without a superclass.
    pub fn superclass(&self) -> Option<ClassId> {
        self.superclass.get().copied().flatten()
    }

    pub fn interfaces(&self) -> &[ClassId] {
        self.interfaces.get().map(|i| i.as_slice()).unwrap_or(&[])
    }

    pub(crate) fn link(&self, superclass: Option<ClassId>, interfaces: SmallVec<[ClassId; 4]>) {
        let _ = self.superclass.set(superclass);
        let _ = self.interfaces.set(interfaces);
    }

    pub fn layout(&self) -> Option<Rc<InstanceLayout>> {
        self.layout.get().cloned()
    }

    pub(crate) fn set_layout(&self, layout: InstanceLayout) -> Rc<InstanceLayout> {
        self.layout.get_or_init(|| Rc::new(layout)).clone()
    }

    pub fn mirror(&self) -> Option<ObjectRef> {
        self.mirror.get()
    }

    pub(crate) fn set_mirror(&self, mirror: ObjectRef) {
        self.mirror.set(Some(mirror));
    }

    pub fn link_error(&self) -> Option<LinkError> {
        self.link_error.borrow().clone()
    }

    pub(crate) fn set_link_error(&self, error: LinkError) {
        *self.link_error.borrow_mut() = Some(error);
    }

    pub fn find_method(&self, name: &str, descriptor: &str) -> Option<Rc<Method>> {
        self.data()?.find_method(name, descriptor).cloned()
    }

    /// Binary name as shown to Java code (`java.lang.String`, `[I`).
    pub fn java_name(&self) -> String {
        to_binary_name(&self.name)
    }
}
