//! In-memory recording link used for dry runs and tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::info;

use super::link::InstrumentLink;

/// One recorded write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub at: Instant,
    pub text: String,
}

/// Link that records every write instead of sending it anywhere.
///
/// Clones share the same log, so a test can keep one handle while the
/// original is moved into a [`PowerSupply`](super::PowerSupply).
#[derive(Debug, Clone)]
pub struct MockLink {
    name: String,
    writes: Arc<Mutex<Vec<RecordedWrite>>>,
    failing: Arc<AtomicBool>,
}

impl MockLink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            writes: Arc::new(Mutex::new(Vec::new())),
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Make every subsequent write fail with `BrokenPipe`.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Text of every write so far, in order.
    pub fn lines(&self) -> Vec<String> {
        self.log().iter().map(|w| w.text.clone()).collect()
    }

    /// Every write so far with its timestamp.
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.log().clone()
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    fn log(&self) -> MutexGuard<'_, Vec<RecordedWrite>> {
        // Log is append-only, so a poisoned lock still holds valid data
        self.writes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl InstrumentLink for MockLink {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                format!("mock link {} is failing", self.name),
            ));
        }

        let text = String::from_utf8_lossy(bytes).into_owned();
        info!("[{}] {}", self.name, text.trim_end());
        self.log().push(RecordedWrite {
            at: Instant::now(),
            text,
        });
        Ok(bytes.len())
    }

    fn set_timeout(&mut self, _timeout: Duration) -> std::io::Result<()> {
        Ok(())
    }
}
