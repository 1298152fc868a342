//! Persisted key-value cache.
//!
//! Reads are served from memory. Writes update memory and the legacy flat
//! store synchronously and are handed to a background writer for the durable
//! store, so callers never wait on durable I/O.
//!
//! A shared cache is one whose durable store other processes also write. It
//! persists synchronously and reloads from durable storage whenever the
//! backend reports a foreign write.

mod legacy;
mod memory;

pub use legacy::JsonFileStore;
pub use memory::MemoryStore;

use crate::constants::keys;
use crate::error::AppError;
use crate::safe_lock;
use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::thread::{self, JoinHandle};

/// Storage of named JSON blobs.
pub trait KvBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>, AppError>;
    fn write(&self, key: &str, value: &str) -> Result<(), AppError>;
    fn delete(&self, key: &str) -> Result<(), AppError>;

    /// Whether another writer changed the store since the previous call.
    /// The first call only records a baseline.
    fn changed_externally(&self) -> bool {
        false
    }
}

/// Outcome of the one-time `init()` migration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Keys found in durable storage.
    pub loaded: usize,
    /// Keys adopted from the legacy flat store and copied into durable storage.
    pub migrated: usize,
    /// Keys whose durable read failed.
    pub failed: usize,
}

enum PersistOp {
    Put(String, String),
    Remove(String),
    Flush(Sender<()>),
}

fn apply(backend: &dyn KvBackend, op: &PersistOp) {
    match op {
        PersistOp::Put(key, value) => {
            if let Err(e) = backend.write(key, value) {
                error!("Failed to persist '{key}': {e}");
            }
        }
        PersistOp::Remove(key) => {
            if let Err(e) = backend.delete(key) {
                error!("Failed to remove persisted '{key}': {e}");
            }
        }
        PersistOp::Flush(done) => {
            let _ = done.send(());
        }
    }
}

pub struct KvCache {
    entries: Mutex<HashMap<String, String>>,
    initialized: AtomicBool,
    init_report: OnceLock<InitReport>,
    durable: Arc<dyn KvBackend>,
    legacy: Arc<dyn KvBackend>,
    shared: bool,
    writer_tx: Mutex<Option<Sender<PersistOp>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl KvCache {
    pub fn new(durable: Arc<dyn KvBackend>, legacy: Arc<dyn KvBackend>) -> Self {
        Self::build(durable, legacy, false)
    }

    /// A cache over storage that another process writes concurrently.
    pub fn shared(durable: Arc<dyn KvBackend>, legacy: Arc<dyn KvBackend>) -> Self {
        Self::build(durable, legacy, true)
    }

    fn build(durable: Arc<dyn KvBackend>, legacy: Arc<dyn KvBackend>, shared: bool) -> Self {
        let (tx, rx) = mpsc::channel::<PersistOp>();
        let backend = Arc::clone(&durable);

        let handle = thread::spawn(move || {
            for op in rx {
                apply(backend.as_ref(), &op);
            }
            debug!("KvCache writer stopped");
        });

        Self {
            entries: Mutex::new(HashMap::new()),
            initialized: AtomicBool::new(false),
            init_report: OnceLock::new(),
            durable,
            legacy,
            shared,
            writer_tx: Mutex::new(Some(tx)),
            writer: Mutex::new(Some(handle)),
        }
    }

    fn lock_entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        safe_lock(&self.entries, "KvCache entries")
    }

    /// Shared caches write through; others hand the write to the writer thread.
    fn persist(&self, op: PersistOp) {
        if self.shared {
            apply(self.durable.as_ref(), &op);
        } else {
            self.enqueue(op);
        }
    }

    fn enqueue(&self, op: PersistOp) {
        match safe_lock(&self.writer_tx, "KvCache writer").as_ref() {
            Some(tx) => {
                if tx.send(op).is_err() {
                    error!("KvCache writer is gone, durable write dropped");
                }
            }
            None => warn!("KvCache is shut down, durable write dropped"),
        }
    }

    /// One-time migration from the legacy flat store. Every caller, including
    /// concurrent ones, gets the report of the single run.
    pub fn init(&self) -> InitReport {
        self.init_report.get_or_init(|| self.migrate()).clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn migrate(&self) -> InitReport {
        let mut report = InitReport::default();
        self.durable.changed_externally();

        for key in keys::ALL {
            let value = match self.durable.read(key) {
                Ok(Some(value)) => {
                    report.loaded += 1;
                    Some(value)
                }
                Ok(None) => match self.legacy.read(key) {
                    Ok(Some(value)) => {
                        report.migrated += 1;
                        self.persist(PersistOp::Put((*key).to_string(), value.clone()));
                        Some(value)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!("Legacy read of '{key}' failed during init: {e}");
                        None
                    }
                },
                Err(e) => {
                    report.failed += 1;
                    error!("Durable read of '{key}' failed during init: {e}");
                    self.legacy.read(key).ok().flatten()
                }
            };

            if let Some(value) = value {
                // A write that landed before init finished is newer than storage.
                self.lock_entries().entry((*key).to_string()).or_insert(value);
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(
            "KvCache initialized: {} loaded, {} migrated, {} failed",
            report.loaded, report.migrated, report.failed
        );
        report
    }

    pub fn is_shared(&self) -> bool {
        self.shared
    }

    /// Reload every known key from durable storage if another process wrote
    /// to it since the last check. Returns whether a reload happened.
    pub fn refresh(&self) -> bool {
        if !self.is_initialized() {
            return false;
        }
        let mut entries = self.lock_entries();
        if !self.durable.changed_externally() {
            return false;
        }
        for key in keys::ALL {
            match self.durable.read(key) {
                Ok(Some(value)) => {
                    entries.insert((*key).to_string(), value);
                }
                Ok(None) => {
                    entries.remove(*key);
                }
                Err(e) => warn!("Durable read of '{key}' failed during reload: {e}"),
            }
        }
        debug!("KvCache reloaded after an external write");
        true
    }

    pub fn get(&self, key: &str) -> Option<String> {
        if self.is_initialized() {
            if self.shared {
                self.refresh();
            }
            return self.lock_entries().get(key).cloned();
        }
        match self.legacy.read(key) {
            Ok(value) => value,
            Err(e) => {
                warn!("Legacy read of '{key}' failed: {e}");
                None
            }
        }
    }

    // The entries lock is held through the durable write so a concurrent
    // reload cannot resurrect the previous value.
    pub fn set(&self, key: &str, value: &str) {
        let mut entries = self.lock_entries();
        entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.legacy.write(key, value) {
            warn!("Failed to mirror '{key}' into legacy store: {e}");
        }
        self.persist(PersistOp::Put(key.to_string(), value.to_string()));
    }

    pub fn remove(&self, key: &str) {
        let mut entries = self.lock_entries();
        entries.remove(key);
        if let Err(e) = self.legacy.delete(key) {
            warn!("Failed to remove '{key}' from legacy store: {e}");
        }
        self.persist(PersistOp::Remove(key.to_string()));
    }

    /// Wait until every durable write queued so far has been applied.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        self.enqueue(PersistOp::Flush(done_tx));
        if done_rx.recv().is_err() {
            warn!("KvCache flush interrupted, writer stopped");
        }
    }

    /// Drain pending writes and stop the writer thread.
    pub fn shutdown(&self) {
        let tx = safe_lock(&self.writer_tx, "KvCache writer").take();
        drop(tx);

        let handle = safe_lock(&self.writer, "KvCache writer").take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("KvCache writer thread panicked");
            }
        }
    }
}

impl Drop for KvCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
