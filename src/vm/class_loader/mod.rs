use std::collections::HashMap;
use std::rc::Rc;
use log::{debug, warn};
use once_cell::unsync::OnceCell;
use crate::class_parser::attributes::{parse_code_attribute, parse_constant_value, parse_source_file};
use crate::class_parser::{parse_class, ParseError};
use crate::class_parser::types::{MethodInfo, ParsedClass};
use crate::vm::class::class::{Class, ClassData, ClassId, ClassKind, LoaderId};
use crate::vm::class::constant_pool::RuntimePool;
use crate::vm::class::field::{Field, FieldType};
use crate::vm::class::method::{Code, ExceptionHandler, Method, MethodDescriptor};
use crate::vm::class_loader::source::{ClassBytes, ClassRequest, ClassSource, RequestToken};
use crate::vm::error::LinkError;
use crate::vm::interpreter::decode::decode;
use crate::vm::thread::thread::ThreadId;

pub mod array;
pub mod bootstrap;
pub mod classpath;
pub mod init;
pub mod resolve;
pub mod source;

/// Outcome of a loader operation that may have to wait for the host.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup<T> {
    Ready(T),
    /// The requesting thread, if any, is recorded as a waiter and woken once the
    /// host answers.
    Pending,
    Failed(LinkError),
}

impl<T> Lookup<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Ready(t) => Lookup::Ready(f(t)),
            Lookup::Pending => Lookup::Pending,
            Lookup::Failed(e) => Lookup::Failed(e),
        }
    }
}

/// Propagates `Pending` and `Failed`, the way `?` does for `Result`.
#[macro_export]
macro_rules! ready {
    ($e: expr) => {
        match $e {
            $crate::vm::class_loader::Lookup::Ready(t) => t,
            $crate::vm::class_loader::Lookup::Pending => return $crate::vm::class_loader::Lookup::Pending,
            $crate::vm::class_loader::Lookup::Failed(e) => return $crate::vm::class_loader::Lookup::Failed(e),
        }
    }
}

struct InFlight {
    token: RequestToken,
    waiters: Vec<ThreadId>,
}

/// A class name within the namespace of its defining loader.
type ClassKey = (LoaderId, String);

/// The bootstrap loader: owns every class of one generation, keyed by defining
/// loader and internal name, and parses each name at most once.
pub struct ClassLoader {
    id: LoaderId,
    generation: u32,
    classes: Vec<Rc<Class>>,
    by_name: HashMap<ClassKey, ClassId>,
    failed: HashMap<ClassKey, LinkError>,
    in_flight: HashMap<ClassKey, InFlight>,
    builtin: Rc<HashMap<String, Vec<u8>>>,
    source: Box<dyn ClassSource>,
    next_token: u64,
}

const PRIMITIVES: [FieldType; 9] = [
    FieldType::Z, FieldType::B, FieldType::C, FieldType::S, FieldType::I,
    FieldType::J, FieldType::F, FieldType::D, FieldType::V,
];

impl ClassLoader {
    pub fn new(source: Box<dyn ClassSource>, builtin: Rc<HashMap<String, Vec<u8>>>, generation: u32) -> Self {
        let mut loader = ClassLoader {
            id: LoaderId::BOOTSTRAP,
            generation,
            classes: vec![],
            by_name: HashMap::new(),
            failed: HashMap::new(),
            in_flight: HashMap::new(),
            builtin,
            source,
            next_token: 0,
        };

        for primitive in PRIMITIVES {
            let name = primitive.class_name();
            loader.insert(name, 0x0411, ClassKind::Primitive(primitive));
        }
        loader
    }

    /// Throws away every class and starts a new generation with the same sources.
    /// Requests still in flight become orphans.
    pub fn reset(&mut self) {
        let source = std::mem::replace(&mut self.source, Box::new(source::MapSource::new()));
        let orphaned = self.in_flight.len();
        *self = ClassLoader::new(source, self.builtin.clone(), self.generation + 1);
        debug!("class cache reset, generation {} ({} requests orphaned)", self.generation, orphaned);
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn id(&self) -> LoaderId {
        self.id
    }

    fn key(&self, name: &str) -> ClassKey {
        (self.id, name.to_string())
    }

    pub fn class(&self, id: ClassId) -> &Rc<Class> {
        &self.classes[id.index()]
    }

    pub fn lookup(&self, name: &str) -> Option<ClassId> {
        self.by_name.get(&self.key(name)).copied()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn pending_requests(&self) -> Vec<ClassRequest> {
        let mut requests: Vec<ClassRequest> = self.in_flight.iter()
            .map(|((_, name), flight)| ClassRequest { name: name.clone(), token: flight.token })
            .collect();
        requests.sort_by_key(|r| r.token.id);
        requests
    }

    fn insert(&mut self, name: String, flags: u16, kind: ClassKind) -> ClassId {
        let id = ClassId(self.classes.len() as u32);
        let class = Class::new(id, name.clone(), flags, kind, self.id, self.generation);
        self.classes.push(Rc::new(class));
        self.by_name.insert((self.id, name), id);
        id
    }

    /// Finds or loads `name`. Array names are derived from their component.
    pub fn load(&mut self, name: &str, waiter: Option<ThreadId>) -> Lookup<ClassId> {
        let key = self.key(name);
        if let Some(id) = self.by_name.get(&key) {
            return Lookup::Ready(*id);
        }
        if let Some(error) = self.failed.get(&key) {
            return Lookup::Failed(error.clone());
        }
        if name.starts_with('[') {
            return self.load_array(name, waiter);
        }

        if let Some(bytes) = self.builtin.clone().get(name) {
            return self.finish_load(name, Some(bytes));
        }

        if let Some(flight) = self.in_flight.get_mut(&key) {
            if let Some(waiter) = waiter {
                if !flight.waiters.contains(&waiter) {
                    flight.waiters.push(waiter);
                }
            }
            return Lookup::Pending;
        }

        self.next_token += 1;
        let request = ClassRequest {
            name: name.to_string(),
            token: RequestToken { generation: self.generation, id: self.next_token },
        };

        match self.source.request(&request) {
            ClassBytes::Ready(bytes) => self.finish_load(name, Some(&bytes)),
            ClassBytes::Missing => self.finish_load(name, None),
            ClassBytes::Pending => {
                debug!("waiting for host to supply {}", name);
                self.in_flight.insert(key, InFlight {
                    token: request.token,
                    waiters: waiter.into_iter().collect(),
                });
                Lookup::Pending
            }
        }
    }

    fn finish_load(&mut self, name: &str, bytes: Option<&[u8]>) -> Lookup<ClassId> {
        let result = match bytes {
            Some(bytes) => self.define(name, bytes),
            None => Err(LinkError::NoClassDefFound(name.to_string())),
        };

        match result {
            Ok(id) => Lookup::Ready(id),
            Err(error) => {
                debug!("loading {} failed: {}", name, error);
                self.failed.insert(self.key(name), error.clone());
                Lookup::Failed(error)
            }
        }
    }

    /// Completes a request the source answered with `Pending`. Returns the threads
    /// that were waiting for it.
    pub fn supply(&mut self, token: RequestToken, bytes: Option<Vec<u8>>) -> Vec<ThreadId> {
        if token.generation != self.generation {
            debug!("ignoring class bytes for stale request {:?}", token);
            return vec![];
        }

        let key = match self.in_flight.iter().find(|(_, f)| f.token == token) {
            Some((key, _)) => key.clone(),
            None => {
                warn!("no class request with token {:?}", token);
                return vec![];
            }
        };
        let flight = match self.in_flight.remove(&key) {
            Some(flight) => flight,
            None => return vec![],
        };
        let name = key.1;

        self.finish_load(&name, bytes.as_deref());
        flight.waiters
    }

    /// Parses `bytes` as the class `name` and registers it in state Loaded.
    pub fn define(&mut self, name: &str, bytes: &[u8]) -> Result<ClassId, LinkError> {
        let format_error = |e: ParseError| LinkError::from_parse(name, e);

        let parsed = parse_class(bytes).map_err(format_error)?;
        let actual = parsed.name().map_err(format_error)?;
        if actual != name {
            return Err(LinkError::NoClassDefFound(format!("{} (wrong name: {})", name, actual)));
        }

        let id = ClassId(self.classes.len() as u32);
        let data = self.class_data(id, name, &parsed).map_err(format_error)?;
        let flags = parsed.access_flags;

        let id = self.insert(name.to_string(), flags, ClassKind::Reference(data));
        debug!("defined {} as {:?}", name, id);
        Ok(id)
    }

    fn class_data(&self, id: ClassId, name: &str, parsed: &ParsedClass) -> Result<ClassData, ParseError> {
        let pool = RuntimePool::new(parsed.constant_pool.clone());
        let raw = pool.raw();

        let mut fields = Vec::with_capacity(parsed.fields.len());
        for info in &parsed.fields {
            let descriptor = raw.utf8(info.descriptor_index)?;
            let ty = FieldType::parse(descriptor)
                .ok_or_else(|| ParseError::BadDescriptor(descriptor.to_string()))?;
            let constant_value = match parsed.find_attribute(&info.attributes, "ConstantValue") {
                Some(attribute) => Some(parse_constant_value(attribute)?),
                None => None,
            };

            fields.push(Field {
                flag: info.access_flags,
                name: raw.utf8(info.name_index)?.to_string(),
                descriptor: descriptor.to_string(),
                ty,
                constant_value,
            });
        }

        let mut methods = Vec::with_capacity(parsed.methods.len());
        for info in &parsed.methods {
            methods.push(Rc::new(self.method(id, name, parsed, &pool, info)?));
        }

        let source_file = match parsed.find_attribute(&parsed.attributes, "SourceFile") {
            Some(attribute) => Some(parse_source_file(attribute, raw)?.to_string()),
            None => None,
        };

        let super_name = parsed.super_name()?.map(str::to_string);
        let interface_names = parsed.interface_names()?.into_iter().map(str::to_string).collect();

        Ok(ClassData::new(parsed.major_version, pool, super_name, interface_names, fields, methods, source_file))
    }

    fn method(&self, id: ClassId, class_name: &str, parsed: &ParsedClass, pool: &RuntimePool,
              info: &MethodInfo) -> Result<Method, ParseError> {
        let raw = pool.raw();
        let name = raw.utf8(info.name_index)?.to_string();
        let descriptor = raw.utf8(info.descriptor_index)?.to_string();
        let signature = MethodDescriptor::parse(&descriptor)
            .ok_or_else(|| ParseError::BadDescriptor(descriptor.clone()))?;

        let code = match parsed.find_attribute(&info.attributes, "Code") {
            Some(attribute) => {
                let attribute = parse_code_attribute(attribute)?;
                let instrs = decode(&attribute.code, pool)?;

                let mut handlers = Vec::with_capacity(attribute.exception_table.len());
                for entry in &attribute.exception_table {
                    let catch_type = match entry.catch_type {
                        0 => None,
                        index => Some(raw.class_name(index)?.to_string()),
                    };
                    handlers.push(ExceptionHandler {
                        start_pc: entry.start_pc as u32,
                        end_pc: entry.end_pc as u32,
                        handler_pc: entry.handler_pc as u32,
                        catch_type,
                    });
                }

                Some(Code::new(attribute.max_stack as usize, attribute.max_locals as usize,
                               attribute.code.len(), instrs, handlers))
            }
            None => None,
        };

        Ok(Method {
            flag: info.access_flags,
            name,
            descriptor,
            signature,
            class: id,
            class_name: class_name.to_string(),
            code,
            native: OnceCell::new(),
        })
    }
}

#[cfg(test)]
mod test {
    use std::collections::HashMap;
    use std::rc::Rc;
    use crate::class_parser::writer::ClassWriter;
    use crate::vm::class::class::{ClassState, LoaderId};
    use crate::vm::class_loader::source::MapSource;
    use crate::vm::class_loader::{ClassLoader, Lookup};
    use crate::vm::error::LinkError;
    use crate::vm::thread::thread::ThreadId;

    fn class(name: &str) -> Vec<u8> {
        ClassWriter::new(name, Some("java/lang/Object")).finish()
    }

    #[test]
    fn loads_once_and_caches() {
        let source = MapSource::new().with("pkg/A", class("pkg/A"));
        let log = source.request_log();
        let mut loader = ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0);

        let first = loader.load("pkg/A", None);
        let second = loader.load("pkg/A", None);
        assert_eq!(first, second);
        assert_eq!(log.borrow().len(), 1);

        let id = match first { Lookup::Ready(id) => id, other => panic!("{:?}", other) };
        assert_eq!(loader.class(id).state(), ClassState::Loaded);
        assert_eq!(loader.class(id).loader, LoaderId::BOOTSTRAP);
        assert_eq!(loader.id(), LoaderId::BOOTSTRAP);
        assert!(loader.lookup("int").is_some());
    }

    #[test]
    fn missing_and_misnamed_classes_fail_and_stay_failed() {
        let source = MapSource::new().with("pkg/B", class("pkg/Other"));
        let log = source.request_log();
        let mut loader = ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0);

        assert_eq!(loader.load("pkg/A", None), Lookup::Failed(LinkError::NoClassDefFound("pkg/A".into())));
        assert_eq!(loader.load("pkg/A", None), Lookup::Failed(LinkError::NoClassDefFound("pkg/A".into())));
        assert!(matches!(loader.load("pkg/B", None), Lookup::Failed(LinkError::NoClassDefFound(_))));
        assert_eq!(log.borrow().len(), 2);
    }

    #[test]
    fn bad_bytes_are_a_format_error() {
        let source = MapSource::new().with("pkg/C", vec![0xCA, 0xFE]);
        let mut loader = ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0);
        assert!(matches!(loader.load("pkg/C", None), Lookup::Failed(LinkError::ClassFormat { .. })));
    }

    #[test]
    fn pending_requests_are_shared_and_supplied_once() {
        let source = MapSource::new().deferred();
        let log = source.request_log();
        let mut loader = ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0);

        assert_eq!(loader.load("pkg/A", Some(ThreadId(1))), Lookup::Pending);
        assert_eq!(loader.load("pkg/A", Some(ThreadId(2))), Lookup::Pending);
        assert_eq!(log.borrow().len(), 1);

        let request = loader.pending_requests().pop().unwrap();
        assert_eq!(request.name, "pkg/A");
        let woken = loader.supply(request.token, Some(class("pkg/A")));
        assert_eq!(woken, vec![ThreadId(1), ThreadId(2)]);
        assert!(matches!(loader.load("pkg/A", None), Lookup::Ready(_)));
        assert!(loader.pending_requests().is_empty());
    }

    #[test]
    fn reset_orphans_in_flight_requests() {
        let source = MapSource::new().deferred();
        let mut loader = ClassLoader::new(Box::new(source), Rc::new(HashMap::new()), 0);

        assert_eq!(loader.load("pkg/A", Some(ThreadId(1))), Lookup::Pending);
        let stale = loader.pending_requests()[0].token;
        loader.reset();

        assert_eq!(loader.generation(), 1);
        assert!(loader.supply(stale, Some(class("pkg/A"))).is_empty());
        assert_eq!(loader.lookup("pkg/A"), None);
    }
}
