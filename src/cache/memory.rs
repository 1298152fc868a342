use super::KvBackend;
use crate::error::AppError;
use crate::safe_lock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    reads: HashMap<String, usize>,
}

/// Process-local backend, used for tests and hosts without a writable disk.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        safe_lock(&self.inner, "MemoryStore")
    }

    /// Make every subsequent write and delete fail.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of reads served for `key`.
    pub fn read_count(&self, key: &str) -> usize {
        self.lock().reads.get(key).copied().unwrap_or(0)
    }

    fn check_writable(&self) -> Result<(), AppError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("memory store is read-only".into()));
        }
        Ok(())
    }
}

impl KvBackend for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut inner = self.lock();
        *inner.reads.entry(key.to_string()).or_insert(0) += 1;
        Ok(inner.values.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.check_writable()?;
        self.lock().values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), AppError> {
        self.check_writable()?;
        self.lock().values.remove(key);
        Ok(())
    }
}
