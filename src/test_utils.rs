//! Shared test utilities.
//!
//! This module provides common setup functions used across test modules.

#![cfg(test)]

use crate::bus::ChangeBus;
use crate::cache::{KvCache, MemoryStore};
use crate::clock::ManualClock;
use crate::db::{migrations, Database};
use crate::remote::Outbox;
use crate::store::DomainStore;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

/// 2024-01-15T12:00:00Z, a Monday.
pub const T0: i64 = 1_705_320_000_000;

/// Create a temporary test database with migrations applied.
///
/// Returns a tuple of (Database, TempDir). The TempDir must be kept alive
/// for the duration of the test to prevent the database file from being deleted.
pub fn setup_test_db() -> (Database, TempDir) {
    let dir = tempdir().expect("Failed to create temp directory for test DB");
    let db_path = dir.path().join("test.db");
    let db = Database::open(&db_path).expect("Failed to open test database");
    migrations::run(db.connection()).expect("Failed to run migrations on test DB");
    (db, dir)
}

/// In-memory cache with `init()` already run.
pub fn memory_cache() -> Arc<KvCache> {
    let cache = KvCache::new(Arc::new(MemoryStore::default()), Arc::new(MemoryStore::default()));
    cache.init();
    Arc::new(cache)
}

pub struct TestStore {
    pub store: Arc<DomainStore>,
    pub bus: Arc<ChangeBus>,
    pub cache: Arc<KvCache>,
    pub clock: Arc<ManualClock>,
}

/// Domain store on in-memory backends with a manual clock set to `T0`.
pub fn setup_store() -> TestStore {
    setup_store_with_outbox(Outbox::disabled())
}

pub fn setup_store_with_outbox(outbox: Outbox) -> TestStore {
    let cache = memory_cache();
    let bus = Arc::new(ChangeBus::new());
    let clock = Arc::new(ManualClock::new(T0));
    let store = Arc::new(DomainStore::new(
        Arc::clone(&cache),
        Arc::clone(&bus),
        Arc::clone(&clock) as Arc<dyn crate::clock::Clock>,
        outbox,
    ));
    TestStore {
        store,
        bus,
        cache,
        clock,
    }
}
