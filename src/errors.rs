//! Error taxonomy and the captured-error ring buffer
//!
//! Nothing here is fatal to the frame loop. Storage failures are reported to
//! the caller as `StorageError` and swallowed there; panics inside a tick are
//! caught by [`guard`] and recorded in an [`ErrorLog`].
//!
//! Unwinding only exists on native targets. On wasm32 a panic aborts the
//! instance, so [`guard`] never gets to return `None` there; the panic hook
//! still records the failure before the abort.

use std::cell::Cell;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::consts::ERROR_LOG_CAPACITY;
use crate::platform::time::now_ms;

/// Failure talking to the persistent key/value store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// No storage backend (private browsing, sandboxed iframe, ...)
    Unavailable,
    Read(String),
    Write(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable => write!(f, "storage unavailable"),
            StorageError::Read(msg) => write!(f, "storage read failed: {}", msg),
            StorageError::Write(msg) => write!(f, "storage write failed: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {}

/// Where a captured error came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSource {
    /// Panic that escaped everything (process-wide hook)
    Uncaught,
    /// Panic caught around a named unit of work
    Subsystem(String),
    /// Failed read or write of persisted data
    Storage,
}

/// One captured error
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    pub source: ErrorSource,
    pub message: String,
    /// Wall clock (ms) when captured
    pub timestamp: f64,
}

/// Bounded log of captured errors, oldest evicted first
#[derive(Debug, Clone)]
pub struct ErrorLog {
    entries: VecDeque<ErrorRecord>,
    capacity: usize,
    /// Records ever made, evicted ones included
    recorded: u64,
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorLog {
    pub fn new() -> Self {
        Self::with_capacity(ERROR_LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            recorded: 0,
        }
    }

    pub fn record(&mut self, source: ErrorSource, message: impl Into<String>, timestamp: f64) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(ErrorRecord {
            source,
            message: message.into(),
            timestamp,
        });
        self.recorded += 1;
    }

    pub fn total_recorded(&self) -> u64 {
        self.recorded
    }

    /// Entries recorded after the first `seen`, as far as they are still held
    pub fn since(&self, seen: u64) -> impl Iterator<Item = &ErrorRecord> {
        let fresh = self.recorded.saturating_sub(seen).min(self.entries.len() as u64) as usize;
        self.entries.iter().skip(self.entries.len() - fresh)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.entries.iter()
    }

    pub fn latest(&self) -> Option<&ErrorRecord> {
        self.entries.back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Error log shared between the game loop and the panic hook
pub type SharedErrorLog = Arc<Mutex<ErrorLog>>;

pub fn shared_log() -> SharedErrorLog {
    Arc::new(Mutex::new(ErrorLog::new()))
}

/// Lock the shared log, recovering from a poisoned mutex
pub fn lock(log: &SharedErrorLog) -> MutexGuard<'_, ErrorLog> {
    log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

thread_local! {
    /// Set while `guard` runs, so the hook leaves recording to the guard
    static IN_GUARD: Cell<bool> = const { Cell::new(false) };
}

/// Run `f`, catching a panic. Returns `None` and records the failure if it panicked.
pub fn guard<T>(log: &SharedErrorLog, source: &str, f: impl FnOnce() -> T) -> Option<T> {
    let was_guarded = IN_GUARD.with(|g| g.replace(true));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    IN_GUARD.with(|g| g.set(was_guarded));

    match result {
        Ok(value) => Some(value),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            log::error!("{} failed: {}", source, message);
            lock(log).record(ErrorSource::Subsystem(source.to_string()), message, now_ms());
            None
        }
    }
}

/// Install a process-wide panic hook that records into `log` instead of the
/// host's default panic output.
pub fn install_panic_hook(log: SharedErrorLog) {
    panic::set_hook(Box::new(move |info| {
        let message = match info.location() {
            Some(loc) => format!(
                "{} ({}:{})",
                panic_message(info.payload()),
                loc.file(),
                loc.line()
            ),
            None => panic_message(info.payload()),
        };
        if IN_GUARD.with(|g| g.get()) {
            log::debug!("Caught panic: {}", message);
            return;
        }
        log::error!("Uncaught panic: {}", message);
        lock(&log).record(ErrorSource::Uncaught, message, now_ms());
        #[cfg(target_arch = "wasm32")]
        console_error_panic_hook::hook(info);
    }));
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
