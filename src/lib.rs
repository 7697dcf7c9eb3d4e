//! A small Java virtual machine. Class files are parsed and linked lazily,
//! bytecode runs in an interpreter whose instruction sites specialize on first
//! use, and Java threads are multiplexed cooperatively on the calling host thread.
//!
//! Everything outside the VM goes through a few seams: a [`ClassSource`] for
//! class bytes, a [`HostIo`] for output, and host tickets for natives that wait
//! on the embedder.

pub mod class_parser;
pub mod vm;
mod helper;

pub use crate::vm::class_loader::classpath::ClassPath;
pub use crate::vm::class_loader::source::{ClassBytes, ClassRequest, ClassSource, MapSource, RequestToken};
pub use crate::vm::config::{ClockKind, VmOptions};
pub use crate::vm::error::{LinkError, VmError};
pub use crate::vm::host::{CaptureHost, HostIo, HostReply, StdHost};
pub use crate::vm::native::NativeResult;
pub use crate::vm::thread::scheduler::RunOutcome;
pub use crate::vm::thread::thread::{ThreadId, ThreadOutcome, ThreadStatus};
pub use crate::vm::thread::timer::ManualClock;
pub use crate::vm::value::Value;
pub use crate::vm::vm::Vm;
