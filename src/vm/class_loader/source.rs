use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Identifies one outstanding class request. Tokens from before a cache reset
/// carry an older generation and are ignored when completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestToken {
    pub generation: u32,
    pub id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassRequest {
    /// Internal name, e.g. `java/lang/String`.
    pub name: String,
    pub token: RequestToken,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassBytes {
    Ready(Vec<u8>),
    Missing,
    /// The host answers later through `Vm::supply_class`.
    Pending,
}

/// Where class file bytes come from.
pub trait ClassSource {
    fn request(&mut self, request: &ClassRequest) -> ClassBytes;
}

/// In-memory class table. In deferred mode every request is answered with
/// `Pending`, leaving the host to supply the bytes.
#[derive(Default)]
pub struct MapSource {
    classes: HashMap<String, Vec<u8>>,
    deferred: bool,
    requests: Rc<RefCell<Vec<String>>>,
}

impl MapSource {
    pub fn new() -> Self {
        MapSource::default()
    }

    pub fn with(mut self, name: &str, bytes: Vec<u8>) -> Self {
        self.classes.insert(name.to_string(), bytes);
        self
    }

    pub fn insert(&mut self, name: &str, bytes: Vec<u8>) {
        self.classes.insert(name.to_string(), bytes);
    }

    pub fn deferred(mut self) -> Self {
        self.deferred = true;
        self
    }

    /// Names of all requests seen so far, shared with the source.
    pub fn request_log(&self) -> Rc<RefCell<Vec<String>>> {
        self.requests.clone()
    }
}

impl ClassSource for MapSource {
    fn request(&mut self, request: &ClassRequest) -> ClassBytes {
        self.requests.borrow_mut().push(request.name.clone());

        if self.deferred {
            return ClassBytes::Pending;
        }
        match self.classes.get(&request.name) {
            Some(bytes) => ClassBytes::Ready(bytes.clone()),
            None => ClassBytes::Missing,
        }
    }
}
