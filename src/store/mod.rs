//! Typed domain state on top of the key-value cache.
//!
//! Every mutation follows the same path: read the collection, apply the
//! change by id, write it back through the cache, publish the category on
//! the bus, then hand remote effects to the outbox when a user is signed in.
//! Read-modify-write runs under `write_lock`; publishing happens after the
//! lock is released so subscribers can read the store.

mod native_apps;
mod sessions;
mod sites;
mod stats;
mod tasks;

use crate::bus::{ChangeBus, ChangeKind};
use crate::cache::KvCache;
use crate::clock::{day_key, iso_from_millis, Clock};
use crate::constants::keys;
use crate::error::AppError;
use crate::models::parse_collection;
use crate::remote::{Effect, Outbox};
use crate::safe_lock;
use log::warn;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};

pub struct DomainStore {
    cache: Arc<KvCache>,
    bus: Arc<ChangeBus>,
    clock: Arc<dyn Clock>,
    outbox: Outbox,
    write_lock: Mutex<()>,
}

impl DomainStore {
    pub fn new(cache: Arc<KvCache>, bus: Arc<ChangeBus>, clock: Arc<dyn Clock>, outbox: Outbox) -> Self {
        Self {
            cache,
            bus,
            clock,
            outbox,
            write_lock: Mutex::new(()),
        }
    }

    pub fn bus(&self) -> &Arc<ChangeBus> {
        &self.bus
    }

    pub fn cache(&self) -> &Arc<KvCache> {
        &self.cache
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    /// Signed-in owner, if any. Remote effects are only produced while set.
    pub fn identity(&self) -> Option<String> {
        self.cache
            .get(keys::USER_ID)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
    }

    pub fn set_identity(&self, owner: Option<&str>) {
        match owner.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => self.cache.set(keys::USER_ID, id),
            None => self.cache.remove(keys::USER_ID),
        }
    }

    fn lock_writes(&self) -> MutexGuard<'_, ()> {
        safe_lock(&self.write_lock, "DomainStore")
    }

    fn read_collection<T>(&self, key: &str, parse: fn(&Value) -> Option<T>) -> Vec<T> {
        parse_collection(self.cache.get(key).as_deref(), key, parse)
    }

    fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), AppError> {
        let json = serde_json::to_string(value)?;
        self.cache.set(key, &json);
        Ok(())
    }

    fn publish(&self, kind: ChangeKind) {
        self.bus.publish(kind);
    }

    /// Queue a remote effect for the signed-in owner. No-op when signed out.
    fn emit(&self, make: impl FnOnce(String) -> Effect) {
        if let Some(owner) = self.identity() {
            self.outbox.emit(make(owner));
        }
    }

    fn now_millis(&self) -> i64 {
        self.clock.now_millis()
    }

    fn now_iso(&self) -> String {
        iso_from_millis(self.clock.now_millis())
    }

    fn today_key(&self) -> String {
        day_key(self.clock.today())
    }
}

fn to_record<T: Serialize>(value: &T) -> Value {
    match serde_json::to_value(value) {
        Ok(record) => record,
        Err(e) => {
            warn!("Failed to serialize record for remote write: {e}");
            Value::Null
        }
    }
}

/// Insert `record` or replace the entry with the same id. Returns whether it
/// was newly inserted.
fn upsert_by_id<T>(items: &mut Vec<T>, record: T, id: impl Fn(&T) -> &str) -> bool {
    match items.iter_mut().find(|existing| id(&**existing) == id(&record)) {
        Some(slot) => {
            *slot = record;
            false
        }
        None => {
            items.push(record);
            true
        }
    }
}

/// Collapse duplicate ids, keeping the last occurrence at the position of the first.
fn dedupe_by_id<T>(items: Vec<T>, id: impl Fn(&T) -> &str) -> Vec<T> {
    let mut out: Vec<T> = Vec::with_capacity(items.len());
    for item in items {
        upsert_by_id(&mut out, item, &id);
    }
    out
}

/// Server-wins merge: remote records overwrite local ones with the same id,
/// unknown ids are appended. Returns the number of remote records applied.
fn merge_by_id<T>(local: &mut Vec<T>, remote: Vec<T>, id: impl Fn(&T) -> &str) -> usize {
    let count = remote.len();
    for record in remote {
        upsert_by_id(local, record, &id);
    }
    count
}
