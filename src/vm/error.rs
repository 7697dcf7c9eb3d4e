use thiserror::Error;
use crate::class_parser::ParseError;
use crate::vm::thread::thread::ThreadId;

/// Failures while loading or linking a class or member. Raised inside the VM as
/// the Java error named by [`LinkError::java_class`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    #[error("{0}")]
    NoClassDefFound(String),
    #[error("{0}")]
    ClassNotFound(String),
    #[error("{name}: {cause}")]
    ClassFormat { name: String, cause: ParseError },
    #[error("{name} has unsupported class file version {major}.{minor}")]
    UnsupportedClassVersion { name: String, major: u16, minor: u16 },
    #[error("{0}")]
    ClassCircularity(String),
    #[error("{0}")]
    IncompatibleClassChange(String),
    #[error("{0}")]
    NoSuchField(String),
    #[error("{0}")]
    NoSuchMethod(String),
    #[error("{0}")]
    AbstractMethod(String),
    #[error("{0}")]
    UnsatisfiedLink(String),
}

impl LinkError {
    pub fn java_class(&self) -> &'static str {
        match self {
            LinkError::NoClassDefFound(_) => "java/lang/NoClassDefFoundError",
            LinkError::ClassNotFound(_) => "java/lang/ClassNotFoundException",
            LinkError::ClassFormat { .. } => "java/lang/ClassFormatError",
            LinkError::UnsupportedClassVersion { .. } => "java/lang/UnsupportedClassVersionError",
            LinkError::ClassCircularity(_) => "java/lang/ClassCircularityError",
            LinkError::IncompatibleClassChange(_) => "java/lang/IncompatibleClassChangeError",
            LinkError::NoSuchField(_) => "java/lang/NoSuchFieldError",
            LinkError::NoSuchMethod(_) => "java/lang/NoSuchMethodError",
            LinkError::AbstractMethod(_) => "java/lang/AbstractMethodError",
            LinkError::UnsatisfiedLink(_) => "java/lang/UnsatisfiedLinkError",
        }
    }

    pub(crate) fn from_parse(name: &str, cause: ParseError) -> Self {
        match cause {
            ParseError::UnsupportedVersion { major, minor } =>
                LinkError::UnsupportedClassVersion { name: name.to_string(), major, minor },
            cause => LinkError::ClassFormat { name: name.to_string(), cause },
        }
    }
}

/// Errors reported to the embedding host.
#[derive(Debug, Error)]
pub enum VmError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("class {0} is not available yet")]
    ClassPending(String),
    #[error("no thread {0}")]
    NoSuchThread(ThreadId),
    #[error("the operation needs a VM with no runnable threads")]
    Busy,
    #[error("unknown host ticket {0}")]
    UnknownTicket(u64),
}
