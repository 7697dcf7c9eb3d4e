use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use log::warn;
use crate::vm::value::Value;

/// Output streams visible to natives. The interpreter core never writes to them.
pub trait HostIo {
    fn write_stdout(&mut self, bytes: &[u8]);

    fn write_stderr(&mut self, bytes: &[u8]);
}

#[derive(Default)]
pub struct StdHost;

impl HostIo for StdHost {
    fn write_stdout(&mut self, bytes: &[u8]) {
        let mut out = std::io::stdout();
        if let Err(e) = out.write_all(bytes).and_then(|_| out.flush()) {
            warn!("stdout write failed: {}", e);
        }
    }

    fn write_stderr(&mut self, bytes: &[u8]) {
        if let Err(e) = std::io::stderr().write_all(bytes) {
            warn!("stderr write failed: {}", e);
        }
    }
}

/// Collects output in memory. Clones share the buffers.
#[derive(Clone, Default)]
pub struct CaptureHost {
    stdout: Rc<RefCell<Vec<u8>>>,
    stderr: Rc<RefCell<Vec<u8>>>,
}

impl CaptureHost {
    pub fn stdout(&self) -> String {
        String::from_utf8_lossy(&self.stdout.borrow()).into_owned()
    }

    pub fn stderr(&self) -> String {
        String::from_utf8_lossy(&self.stderr.borrow()).into_owned()
    }
}

impl HostIo for CaptureHost {
    fn write_stdout(&mut self, bytes: &[u8]) {
        self.stdout.borrow_mut().extend_from_slice(bytes);
    }

    fn write_stderr(&mut self, bytes: &[u8]) {
        self.stderr.borrow_mut().extend_from_slice(bytes);
    }
}

/// How the host finishes a native call that suspended on a ticket.
#[derive(Debug, Clone, PartialEq)]
pub enum HostReply {
    Return(Option<Value>),
    /// Raised in the waiting thread as a new exception of this class.
    Throw { class: String, message: Option<String> },
}
