//! Key/value persistence
//!
//! LocalStorage in the browser, an in-memory map everywhere else.

use std::collections::HashMap;

use crate::errors::{self, ErrorSource, SharedErrorLog, StorageError};
use crate::platform::time::now_ms;

/// String key/value store with fallible access
pub trait Storage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-memory storage (native builds and tests)
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    items: HashMap<String, String>,
    /// Simulate a broken backend
    pub fail_reads: bool,
    pub fail_writes: bool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-populated with one key
    pub fn with_item(key: &str, value: &str) -> Self {
        let mut storage = Self::new();
        storage.items.insert(key.to_string(), value.to_string());
        storage
    }

    /// Storage whose every access fails
    pub fn broken() -> Self {
        Self {
            fail_reads: true,
            fail_writes: true,
            ..Self::default()
        }
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.fail_reads {
            return Err(StorageError::Read(format!("cannot read {}", key)));
        }
        Ok(self.items.get(key).cloned())
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_writes {
            return Err(StorageError::Write(format!("cannot write {}", key)));
        }
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Wraps a backend and records each failed access in the error log
pub struct ReportingStorage<S> {
    inner: S,
    errors: SharedErrorLog,
}

impl<S: Storage> ReportingStorage<S> {
    pub fn new(inner: S, errors: SharedErrorLog) -> Self {
        Self { inner, errors }
    }

    fn report<T>(&self, result: Result<T, StorageError>) -> Result<T, StorageError> {
        if let Err(e) = &result {
            errors::lock(&self.errors).record(ErrorSource::Storage, e.to_string(), now_ms());
        }
        result
    }
}

impl<S: Storage> Storage for ReportingStorage<S> {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.report(self.inner.get_item(key))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let result = self.inner.set_item(key, value);
        self.report(result)
    }
}

/// Browser LocalStorage
#[cfg(target_arch = "wasm32")]
pub struct LocalStorage {
    inner: web_sys::Storage,
}

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    /// Open the window's LocalStorage, if the browser allows it
    pub fn open() -> Result<Self, StorageError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok())
            .flatten()
            .map(|inner| Self { inner })
            .ok_or(StorageError::Unavailable)
    }
}

#[cfg(target_arch = "wasm32")]
impl Storage for LocalStorage {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner
            .get_item(key)
            .map_err(|e| StorageError::Read(format!("{:?}", e)))
    }

    fn set_item(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.inner
            .set_item(key, value)
            .map_err(|e| StorageError::Write(format!("{:?}", e)))
    }
}
