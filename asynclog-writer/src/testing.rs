//! Test doubles shared by the unit tests.

use crate::error::WriterError;
use crate::worker::ErrorHandler;
use asynclog_rotate::{RotateError, RotatingSink};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records every write in memory. Clones share state.
#[derive(Clone, Default)]
pub struct MemorySink {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
    rotations: Arc<AtomicUsize>,
    failures_left: Arc<AtomicUsize>,
    fail_rotations: Arc<AtomicBool>,
    /// When set, each write waits for one permit (or for the sender to go away).
    gate: Option<Receiver<()>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Receiver<()>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    /// Makes the next `n` writes fail with an I/O error.
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn fail_rotations(&self, fail: bool) {
        self.fail_rotations.store(fail, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes.lock().clone()
    }

    pub fn contents(&self) -> Vec<u8> {
        self.writes.lock().concat()
    }

    pub fn rotations(&self) -> usize {
        self.rotations.load(Ordering::SeqCst)
    }
}

impl RotatingSink for MemorySink {
    fn write(&mut self, buf: &[u8]) -> Result<(), RotateError> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(RotateError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "injected write failure",
            )));
        }
        if !buf.is_empty() {
            self.writes.lock().push(buf.to_vec());
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), RotateError> {
        if self.fail_rotations.load(Ordering::SeqCst) {
            return Err(RotateError::InvalidConfig("injected rotation failure".to_string()));
        }
        self.rotations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Collects errors passed to the writer's error handler.
#[derive(Clone, Default)]
pub struct ErrorLog {
    messages: Arc<Mutex<Vec<String>>>,
}

impl ErrorLog {
    pub fn handler(&self) -> ErrorHandler {
        let messages = self.messages.clone();
        Arc::new(move |err: &WriterError| messages.lock().push(err.to_string()))
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Polls `condition` for up to five seconds.
pub fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
