use std::rc::Rc;
use log::debug;
use smallvec::SmallVec;
use crate::ready;
use crate::vm::class::class::{ClassId, ClassKind, ClassState, FieldSlot, InstanceLayout};
use crate::vm::class::field::Field;
use crate::vm::class::method::Method;
use crate::vm::class_loader::{ClassLoader, Lookup};
use crate::vm::error::LinkError;
use crate::vm::thread::thread::ThreadId;

pub const OBJECT: &str = "java/lang/Object";

/// A resolved field reference.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTarget {
    /// The class that declares the field.
    pub owner: ClassId,
    /// Index into the owner's `fields`.
    pub index: usize,
    pub is_static: bool,
}

impl ClassLoader {
    /// Loads `name` and links it. Linking loads the superclass and interfaces and
    /// computes the instance layout.
    pub fn load_resolved(&mut self, name: &str, waiter: Option<ThreadId>) -> Lookup<ClassId> {
        let id = ready!(self.load(name, waiter));
        self.resolve(id, waiter)
    }

    pub fn resolve(&mut self, id: ClassId, waiter: Option<ThreadId>) -> Lookup<ClassId> {
        self.resolve_checked(id, waiter, &mut vec![])
    }

    fn resolve_checked(&mut self, id: ClassId, waiter: Option<ThreadId>, chain: &mut Vec<ClassId>) -> Lookup<ClassId> {
        let class = self.class(id).clone();
        if let Some(error) = class.link_error() {
            return Lookup::Failed(error);
        }
        if class.state() != ClassState::Loaded {
            return Lookup::Ready(id);
        }
        if chain.contains(&id) {
            return Lookup::Failed(LinkError::ClassCircularity(class.name.clone()));
        }

        let data = match class.data() {
            Some(data) => data,
            None => return Lookup::Ready(id),
        };

        chain.push(id);
        let linked = self.link_parents(&class.name, data.super_name.as_deref(), &data.interface_names, waiter, chain);
        chain.pop();

        let (superclass, interfaces) = match linked {
            Lookup::Ready(parents) => parents,
            Lookup::Pending => return Lookup::Pending,
            Lookup::Failed(error) => {
                debug!("linking {} failed: {}", class.name, error);
                class.set_link_error(error.clone());
                return Lookup::Failed(error);
            }
        };

        let mut slots = match superclass {
            Some(superclass) => self.class(superclass).layout().map(|l| l.slots.clone()).unwrap_or_default(),
            None => vec![],
        };
        slots.extend(data.fields.iter()
            .filter(|f| !f.is_static())
            .map(|f| FieldSlot { owner: id, name: f.name.clone(), ty: f.ty.clone() }));

        class.link(superclass, interfaces);
        class.set_layout(InstanceLayout { slots });
        class.set_state(ClassState::Resolved);
        debug!("resolved {}", class.name);
        Lookup::Ready(id)
    }

    fn link_parents(&mut self, name: &str, super_name: Option<&str>, interface_names: &[String],
                    waiter: Option<ThreadId>, chain: &mut Vec<ClassId>)
                    -> Lookup<(Option<ClassId>, SmallVec<[ClassId; 4]>)> {
        let superclass = match super_name {
            Some(super_name) => {
                let superclass = ready!(self.load(super_name, waiter));
                let superclass = ready!(self.resolve_checked(superclass, waiter, chain));
                if self.class(superclass).is_interface() {
                    return Lookup::Failed(LinkError::IncompatibleClassChange(
                        format!("class {} has interface {} as super class", name, super_name)));
                }
                Some(superclass)
            }
            None if name == OBJECT => None,
            None => return Lookup::Failed(LinkError::ClassFormat {
                name: name.to_string(),
                cause: crate::class_parser::ParseError::Malformed("missing super class".to_string()),
            }),
        };

        let mut interfaces = SmallVec::new();
        for interface_name in interface_names {
            let interface = ready!(self.load(interface_name, waiter));
            let interface = ready!(self.resolve_checked(interface, waiter, chain));
            if !self.class(interface).is_interface() {
                return Lookup::Failed(LinkError::IncompatibleClassChange(
                    format!("class {} can not implement {}, because it is not an interface", name, interface_name)));
            }
            interfaces.push(interface);
        }

        Lookup::Ready((superclass, interfaces))
    }

    /// `class` followed by its superclasses, nearest first.
    pub fn superclasses(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(Some(class), move |c| self.class(*c).superclass())
    }

    /// Every interface `class` implements, directly or through its parents.
    pub fn all_interfaces(&self, class: ClassId) -> Vec<ClassId> {
        let mut found = vec![];
        let mut stack: Vec<ClassId> = self.superclasses(class).collect();
        while let Some(next) = stack.pop() {
            for interface in self.class(next).interfaces() {
                if !found.contains(interface) {
                    found.push(*interface);
                    stack.push(*interface);
                }
            }
        }
        found
    }

    /// Whether a value of class `from` may be stored where `to` is expected.
    /// Both classes must be resolved.
    pub fn is_assignable(&self, from: ClassId, to: ClassId) -> bool {
        if from == to {
            return true;
        }

        let (source, target) = (self.class(from), self.class(to));
        match (&source.kind, &target.kind) {
            (ClassKind::Primitive(_), _) | (_, ClassKind::Primitive(_)) => false,
            (ClassKind::Array { component_class: sc, .. }, ClassKind::Array { component_class: tc, .. }) => {
                let (sc, tc) = (*sc, *tc);
                if self.class(sc).is_primitive() || self.class(tc).is_primitive() {
                    sc == tc
                } else {
                    self.is_assignable(sc, tc)
                }
            }
            (ClassKind::Array { .. }, _) => target.name == OBJECT || source.interfaces().contains(&to),
            (_, ClassKind::Array { .. }) => false,
            _ if target.is_interface() => self.all_interfaces(from).contains(&to),
            _ => self.superclasses(from).any(|c| c == to),
        }
    }

    /// Finds a field by name and descriptor: the class itself, then its
    /// superinterfaces, then its superclass.
    pub fn resolve_field(&self, class: ClassId, name: &str, descriptor: &str) -> Result<FieldTarget, LinkError> {
        self.lookup_field(class, name, descriptor)
            .ok_or_else(|| LinkError::NoSuchField(format!("{}.{}:{}", self.class(class).name, name, descriptor)))
    }

    fn lookup_field(&self, class: ClassId, name: &str, descriptor: &str) -> Option<FieldTarget> {
        let current = self.class(class);
        if let Some((index, field)) = current.data().and_then(|d| d.find_field(name, descriptor)) {
            return Some(FieldTarget { owner: class, index, is_static: field.is_static() });
        }
        for interface in current.interfaces() {
            if let Some(target) = self.lookup_field(*interface, name, descriptor) {
                return Some(target);
            }
        }
        self.lookup_field(current.superclass()?, name, descriptor)
    }

    pub fn field(&self, target: &FieldTarget) -> Option<&Field> {
        self.class(target.owner).data()?.fields.get(target.index)
    }

    /// Method resolution for `invokevirtual`, `invokespecial` and `invokestatic`
    /// against a class reference.
    pub fn resolve_method(&self, class: ClassId, name: &str, descriptor: &str) -> Result<Rc<Method>, LinkError> {
        let current = self.class(class);
        if current.is_interface() {
            return Err(LinkError::IncompatibleClassChange(
                format!("found interface {}, but class was expected", current.name)));
        }

        let found = self.superclasses(class)
            .find_map(|c| self.class(c).find_method(name, descriptor))
            .or_else(|| self.interface_method(class, name, descriptor));

        found.ok_or_else(|| LinkError::NoSuchMethod(format!("{}.{}{}", current.name, name, descriptor)))
    }

    /// Method resolution against an interface reference, falling back to the
    /// public methods of `java/lang/Object`.
    pub fn resolve_interface_method(&self, class: ClassId, name: &str, descriptor: &str) -> Result<Rc<Method>, LinkError> {
        let current = self.class(class);
        if !current.is_interface() {
            return Err(LinkError::IncompatibleClassChange(
                format!("found class {}, but interface was expected", current.name)));
        }

        let found = current.find_method(name, descriptor)
            .or_else(|| {
                let object = self.lookup(OBJECT)?;
                self.class(object).find_method(name, descriptor).filter(|m| !m.is_static() && !m.is_private())
            })
            .or_else(|| self.interface_method(class, name, descriptor));

        found.ok_or_else(|| LinkError::NoSuchMethod(format!("{}.{}{}", current.name, name, descriptor)))
    }

    // Prefers a non-abstract declaration among the superinterfaces.
    fn interface_method(&self, class: ClassId, name: &str, descriptor: &str) -> Option<Rc<Method>> {
        let candidates: Vec<Rc<Method>> = self.all_interfaces(class).into_iter()
            .filter_map(|i| self.class(i).find_method(name, descriptor))
            .filter(|m| !m.is_static() && !m.is_private())
            .collect();

        candidates.iter().find(|m| !m.is_abstract()).or_else(|| candidates.first()).cloned()
    }

    /// Picks the implementation `invokevirtual`/`invokeinterface` runs for a
    /// receiver of class `receiver`.
    pub fn select_method(&self, receiver: ClassId, resolved: &Rc<Method>) -> Result<Rc<Method>, LinkError> {
        if resolved.is_private() {
            return Ok(resolved.clone());
        }

        let selected = self.superclasses(receiver)
            .filter_map(|c| self.class(c).find_method(&resolved.name, &resolved.descriptor))
            .find(|m| !m.is_static())
            .or_else(|| self.interface_method(receiver, &resolved.name, &resolved.descriptor));

        match selected {
            Some(method) if !method.is_abstract() => Ok(method),
            _ => Err(LinkError::AbstractMethod(format!("{:?}", resolved))),
        }
    }

    /// The method `invokespecial` runs: the resolved one, unless it is an
    /// ordinary method reached through a superclass of the caller, in which case
    /// lookup starts again at the caller's direct superclass.
    pub fn select_special(&self, caller: ClassId, reference_class: ClassId, resolved: &Rc<Method>)
                          -> Result<Rc<Method>, LinkError> {
        if resolved.is_instance_init() || resolved.is_private() || reference_class == caller
            || self.class(reference_class).is_interface()
            || !self.superclasses(caller).skip(1).any(|c| c == reference_class) {
            return Ok(resolved.clone());
        }

        let start = match self.class(caller).superclass() {
            Some(start) => start,
            None => return Ok(resolved.clone()),
        };
        self.select_method(start, resolved)
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::rc::Rc;
    use crate::class_parser::writer::{ClassWriter, CodeBuilder};
    use crate::vm::class::class::ClassState;
    use crate::vm::class_loader::source::MapSource;
    use crate::vm::class_loader::{ClassLoader, Lookup};
    use crate::vm::error::LinkError;
    use crate::vm::instructions::Instruction::*;

    fn object() -> Vec<u8> {
        let mut writer = ClassWriter::new("java/lang/Object", None);
        let mut code = CodeBuilder::new(1, 1);
        code.iconst(7).op(ireturn);
        writer.method(0x0001, "hashCode", "()I", code);
        writer.finish()
    }

    fn loader(classes: Vec<(&str, Vec<u8>)>) -> ClassLoader {
        let mut source = MapSource::new().with("java/lang/Object", object());
        for (name, bytes) in classes {
            source.insert(name, bytes);
        }
        ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0)
    }

    fn ready(lookup: Lookup<crate::vm::class::class::ClassId>) -> crate::vm::class::class::ClassId {
        match lookup {
            Lookup::Ready(id) => id,
            other => panic!("expected a class, got {:?}", other),
        }
    }

    #[test]
    fn layout_extends_superclass_layout() {
        let mut a = ClassWriter::new("A", Some("java/lang/Object"));
        a.field(0, "x", "I").field(0x0008, "s", "J");
        let mut b = ClassWriter::new("B", Some("A"));
        b.field(0, "y", "D").field(0, "x", "I");
        let mut loader = loader(vec![("A", a.finish()), ("B", b.finish())]);

        let b = ready(loader.load_resolved("B", None));
        let a = ready(loader.load("A", None));
        assert_eq!(loader.class(a).state(), ClassState::Resolved);

        let layout = loader.class(b).layout().unwrap();
        let names: Vec<&str> = layout.slots.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "x"]);
        assert_eq!(layout.offset_of(a, "x"), Some(0));
        assert_eq!(layout.offset_of(b, "x"), Some(2));
        assert_eq!(loader.class(a).layout().unwrap().offset_of(a, "x"), Some(0));
    }

    #[test]
    fn missing_superclass_fails_every_time() {
        let c = ClassWriter::new("C", Some("Gone")).finish();
        let mut loader = loader(vec![("C", c)]);

        let expected = Lookup::Failed(LinkError::NoClassDefFound("Gone".to_string()));
        assert_eq!(loader.load_resolved("C", None), expected);
        assert_eq!(loader.load_resolved("C", None), expected);
    }

    #[test]
    fn circular_hierarchy_is_rejected() {
        let mut loader = loader(vec![
            ("P", ClassWriter::new("P", Some("Q")).finish()),
            ("Q", ClassWriter::new("Q", Some("P")).finish()),
        ]);
        assert!(matches!(loader.load_resolved("P", None), Lookup::Failed(LinkError::ClassCircularity(_))));
    }

    #[test]
    fn assignability_is_reflexive_and_transitive() {
        let mut i = ClassWriter::interface("I");
        i.abstract_method(0x0401, "run", "()V");
        let mut a = ClassWriter::new("A", Some("java/lang/Object"));
        a.implements("I");
        let mut loader = loader(vec![
            ("I", i.finish()),
            ("A", a.finish()),
            ("B", ClassWriter::new("B", Some("A")).finish()),
            ("C", ClassWriter::new("C", Some("B")).finish()),
        ]);

        let c = ready(loader.load_resolved("C", None));
        let b = ready(loader.load("B", None));
        let a = ready(loader.load("A", None));
        let i = ready(loader.load("I", None));
        let object = ready(loader.load("java/lang/Object", None));

        for class in [a, b, c, i, object] {
            assert!(loader.is_assignable(class, class));
        }
        assert!(loader.is_assignable(c, b) && loader.is_assignable(b, a) && loader.is_assignable(c, a));
        assert!(loader.is_assignable(c, i));
        assert!(loader.is_assignable(c, object));
        assert!(!loader.is_assignable(a, c));
        assert!(!loader.is_assignable(object, i));
    }

    #[test]
    fn method_lookup_walks_the_hierarchy() {
        let mut a = ClassWriter::new("A", Some("java/lang/Object"));
        let mut code = CodeBuilder::new(1, 1);
        code.iconst(1).op(ireturn);
        a.method(0x0001, "f", "()I", code);
        let mut b = ClassWriter::new("B", Some("A"));
        let mut code = CodeBuilder::new(1, 1);
        code.iconst(2).op(ireturn);
        b.method(0x0001, "f", "()I", code);
        let mut loader = loader(vec![("A", a.finish()), ("B", b.finish())]);

        let b = ready(loader.load_resolved("B", None));
        let a = ready(loader.load("A", None));

        let resolved = loader.resolve_method(a, "f", "()I").unwrap();
        assert_eq!(resolved.class, a);
        assert_eq!(loader.select_method(b, &resolved).unwrap().class, b);
        assert_eq!(loader.resolve_method(b, "hashCode", "()I").unwrap().class_name, "java/lang/Object");
        assert!(matches!(loader.resolve_method(b, "g", "()V"), Err(LinkError::NoSuchMethod(_))));
        assert!(matches!(loader.resolve_field(b, "nope", "I"), Err(LinkError::NoSuchField(_))));
    }
}
