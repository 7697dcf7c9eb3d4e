use smallvec::SmallVec;
use crate::ready;
use crate::vm::class::class::{Class, ClassId, ClassKind, ClassState, InstanceLayout};
use crate::vm::class::field::FieldType;
use crate::vm::class_loader::resolve::OBJECT;
use crate::vm::class_loader::{ClassLoader, Lookup};
use crate::vm::error::LinkError;
use crate::vm::thread::thread::ThreadId;

const ARRAY_INTERFACES: [&str; 2] = ["java/lang/Cloneable", "java/io/Serializable"];

/// Name of the array class whose elements are of class `component`.
pub fn array_class_name(component: &Class) -> String {
    match &component.kind {
        ClassKind::Primitive(ty) => format!("[{}", ty.descriptor()),
        ClassKind::Array { .. } => format!("[{}", component.name),
        ClassKind::Reference(_) => format!("[L{};", component.name),
    }
}

/// The type values of `class` have when stored in a field or array.
pub fn field_type_of(class: &Class) -> FieldType {
    match &class.kind {
        ClassKind::Primitive(ty) => ty.clone(),
        ClassKind::Array { component, .. } => FieldType::A(Box::new(component.clone())),
        ClassKind::Reference(_) => FieldType::L(class.name.clone()),
    }
}

impl ClassLoader {
    /// Array classes are never read from a class file; they are made on demand once
    /// their element class is resolved, and start out initialized.
    pub(super) fn load_array(&mut self, name: &str, waiter: Option<ThreadId>) -> Lookup<ClassId> {
        let component = match FieldType::array_component(name) {
            Some(component) => component,
            None => return Lookup::Failed(LinkError::NoClassDefFound(name.to_string())),
        };

        let component_class = match &component {
            FieldType::L(element) => ready!(self.load_resolved(element, waiter)),
            FieldType::A(_) => ready!(self.load(&component.descriptor(), waiter)),
            primitive => match self.lookup(&primitive.class_name()) {
                Some(id) => id,
                None => return Lookup::Failed(LinkError::NoClassDefFound(name.to_string())),
            },
        };

        let object = ready!(self.load_resolved(OBJECT, waiter));
        let mut interfaces = SmallVec::new();
        for interface in ARRAY_INTERFACES {
            match self.load_resolved(interface, waiter) {
                Lookup::Ready(id) => interfaces.push(id),
                Lookup::Pending => return Lookup::Pending,
                Lookup::Failed(_) => {}
            }
        }

        // public final abstract, plus the element class's visibility
        let flags = 0x0410 | (self.class(component_class).flags & 0x0001);
        let id = self.insert(name.to_string(), flags, ClassKind::Array { component, component_class });

        let class = self.class(id);
        class.link(Some(object), interfaces);
        class.set_layout(InstanceLayout::default());
        class.set_state(ClassState::Initialized);
        Lookup::Ready(id)
    }

    /// The array class with elements of class `component`.
    pub fn array_of(&mut self, component: ClassId, waiter: Option<ThreadId>) -> Lookup<ClassId> {
        let name = array_class_name(self.class(component));
        self.load(&name, waiter)
    }
}
