pub mod bridge;
pub mod bus;
pub mod cache;
pub mod clock;
pub mod config;
pub mod constants;
pub mod db;
pub mod enforcement;
pub mod error;
pub mod models;
pub mod native_host;
pub mod platform;
pub mod remote;
pub mod store;
mod test_utils;
pub mod validation;

use crate::bridge::SyncBridge;
use crate::bus::ChangeBus;
use crate::cache::{JsonFileStore, KvCache};
use crate::clock::{Clock, SystemClock};
use crate::config::{AppConfig, ConfigError};
use crate::db::{migrations, Database, SqliteStore};
use crate::enforcement::PolicyReconciler;
use crate::platform::EnforcementSurface;
use crate::remote::{Outbox, RemoteBackend, RemoteError, RemoteSync, RestBackend, SyncReport};
use crate::store::DomainStore;
use log::{info, warn};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug)]
pub enum InitError {
    Config(ConfigError),
    DataDirCreation(std::io::Error),
    DatabaseOpen(rusqlite::Error),
    Migration(rusqlite::Error),
    Remote(RemoteError),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::Config(e) => write!(f, "Invalid configuration: {e}"),
            InitError::DataDirCreation(e) => write!(f, "Could not create data directory: {e}"),
            InitError::DatabaseOpen(e) => write!(f, "Failed to open database: {e}"),
            InitError::Migration(e) => write!(f, "Failed to run database migrations: {e}"),
            InitError::Remote(e) => write!(f, "Failed to set up remote backend: {e}"),
        }
    }
}

impl std::error::Error for InitError {}

/// Lock a mutex, recovering from poisoning if necessary
pub(crate) fn safe_lock<'a, T>(mutex: &'a Mutex<T>, context: &str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("{context} mutex was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// A wired-up core: cache, bus, store, companion bridge and, when
/// configured, remote sync. Enforcement is mounted separately because only
/// hosts with a native blocker have a surface to give it.
pub struct FocusSphere {
    config: AppConfig,
    cache: Arc<KvCache>,
    store: Arc<DomainStore>,
    bridge: Arc<SyncBridge>,
    remote: Option<RemoteSync>,
    enforcement: Mutex<Option<Arc<PolicyReconciler>>>,
}

fn db_path(config: &AppConfig) -> Result<(PathBuf, PathBuf), InitError> {
    let data_dir = config.resolve_data_dir().map_err(InitError::Config)?;
    std::fs::create_dir_all(&data_dir).map_err(InitError::DataDirCreation)?;
    let legacy = config.resolve_legacy_store(&data_dir);
    Ok((data_dir.join("focussphere.db"), legacy))
}

impl FocusSphere {
    pub fn open(config: AppConfig) -> Result<Self, InitError> {
        Self::open_with_clock(config, Arc::new(SystemClock))
    }

    pub fn open_with_clock(config: AppConfig, clock: Arc<dyn Clock>) -> Result<Self, InitError> {
        let backend = match &config.remote {
            Some(remote) => {
                let backend: Arc<dyn RemoteBackend> = Arc::new(RestBackend::new(remote).map_err(InitError::Remote)?);
                Some(backend)
            }
            None => None,
        };
        Self::open_with(config, clock, backend)
    }

    /// Open with an explicit remote backend instead of the configured one.
    pub fn open_with(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        backend: Option<Arc<dyn RemoteBackend>>,
    ) -> Result<Self, InitError> {
        let (db_path, legacy_path) = db_path(&config)?;
        let db = Database::open(&db_path).map_err(InitError::DatabaseOpen)?;
        migrations::run(db.connection()).map_err(InitError::Migration)?;

        let durable = Arc::new(SqliteStore::new(Arc::new(Mutex::new(db))));
        let legacy = Arc::new(JsonFileStore::open(&legacy_path));
        // The native host opens the same data directory from its own process.
        let cache = Arc::new(KvCache::shared(durable, legacy));
        cache.init();

        let outbox = match &backend {
            Some(backend) => Outbox::new(Arc::clone(backend)),
            None => Outbox::disabled(),
        };
        let bus = Arc::new(ChangeBus::new());
        let store = Arc::new(DomainStore::new(Arc::clone(&cache), bus, clock, outbox));
        let remote = backend.map(|backend| RemoteSync::new(Arc::clone(&store), backend));
        let bridge = SyncBridge::mount(Arc::clone(&store));

        info!("FocusSphere opened at {}", db_path.display());
        Ok(Self {
            config,
            cache,
            store,
            bridge,
            remote,
            enforcement: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<DomainStore> {
        &self.store
    }

    pub fn bridge(&self) -> &Arc<SyncBridge> {
        &self.bridge
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start pushing policy to `surface`. Replaces an earlier mount.
    pub fn mount_enforcement(&self, surface: Arc<dyn EnforcementSurface>) -> Arc<PolicyReconciler> {
        let reconciler = PolicyReconciler::mount(Arc::clone(&self.store), surface, self.config.enforcement.debounce());
        if let Some(previous) = safe_lock(&self.enforcement, "Enforcement").replace(Arc::clone(&reconciler)) {
            previous.unmount();
        }
        reconciler
    }

    pub fn enforcement(&self) -> Option<Arc<PolicyReconciler>> {
        safe_lock(&self.enforcement, "Enforcement").clone()
    }

    /// Record the signed-in user. Signing in pulls remote state once per new
    /// user when a backend is configured.
    pub fn set_identity(&self, owner: Option<&str>) -> Option<SyncReport> {
        match &self.remote {
            Some(remote) => remote.set_identity(owner),
            None => {
                self.store.set_identity(owner);
                None
            }
        }
    }

    /// Stop background work and wait for pending writes.
    pub fn shutdown(&self) {
        if let Some(reconciler) = safe_lock(&self.enforcement, "Enforcement").take() {
            reconciler.unmount();
        }
        self.bridge.unmount();
        self.store.outbox().flush();
        self.cache.flush();
        info!("FocusSphere shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::constants::keys;
    use crate::models::{NativeAppMode, Task};
    use crate::platform::testing::{RecordingSurface, SurfaceCall};
    use crate::remote::testing::RecordingBackend;
    use crate::remote::Entity;
    use crate::test_utils::T0;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            data_dir: Some(dir.to_path_buf()),
            ..AppConfig::default()
        }
    }

    fn clock() -> Arc<dyn Clock> {
        Arc::new(ManualClock::new(T0))
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let app = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
            app.store().save_task(Task::new("t1", "Persist me", "2024-01-15T09:00:00.000Z")).unwrap();
            app.shutdown();
        }
        std::fs::remove_file(dir.path().join("legacy_store.json")).unwrap();

        let app = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
        let tasks = app.store().tasks();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Persist me");
    }

    #[test]
    fn test_safe_lock_recovers_poisoned_mutex() {
        let mutex = Arc::new(Mutex::new(1));
        let poisoner = Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();

        assert!(mutex.is_poisoned());
        *safe_lock(&mutex, "test") += 1;
        assert_eq!(*safe_lock(&mutex, "test"), 2);
    }

    #[test]
    fn test_two_processes_share_state() {
        let dir = tempdir().unwrap();
        let app = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
        let host = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();

        app.store().add_saved_time(0.5).unwrap();
        host.bridge()
            .handle_inbound(r#"{"version":1,"type":"addSavedTime","hours":1.0}"#)
            .unwrap();
        app.store().add_saved_time(0.25).unwrap();
        assert!((host.store().today_stats().saved_hours - 1.75).abs() < 1e-9);

        app.store().save_task(Task::new("t1", "From the app", "2024-01-15T09:00:00.000Z")).unwrap();
        let reply = host
            .bridge()
            .handle_inbound(r#"{"version":1,"type":"requestState"}"#)
            .unwrap()
            .unwrap();
        let state: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(state["tasks"][0]["title"], "From the app");

        app.shutdown();
        host.shutdown();
        drop((app, host));

        let reopened = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
        assert!((reopened.store().today_stats().saved_hours - 1.75).abs() < 1e-9);
        assert_eq!(reopened.store().tasks().len(), 1);
    }

    #[test]
    fn test_legacy_store_is_migrated() {
        let dir = tempdir().unwrap();
        let mut legacy = serde_json::Map::new();
        legacy.insert(keys::TASKS.into(), json!(r#"[{"id":"old","title":"From legacy"}]"#));
        legacy.insert(keys::MASTER_SWITCH.into(), json!("false"));
        std::fs::write(
            dir.path().join("legacy_store.json"),
            serde_json::Value::Object(legacy).to_string(),
        )
        .unwrap();

        let app = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
        assert_eq!(app.store().tasks()[0].title, "From legacy");

        let reconciler = app.mount_enforcement(Arc::new(RecordingSurface::default()));
        assert!(!reconciler.master_switch());
    }

    #[test]
    fn test_bridge_snapshot_written_on_open() {
        let dir = tempdir().unwrap();
        let app = FocusSphere::open_with(config(dir.path()), clock(), None).unwrap();
        let raw = app.store().cache().get(keys::SYNC_SNAPSHOT).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["timestamp"], T0);
    }

    #[test]
    fn test_enforcement_mount_pushes_after_debounce() {
        let dir = tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.enforcement.debounce_ms = 50;
        let app = FocusSphere::open_with(cfg, clock(), None).unwrap();
        app.store().toggle_native_app("com.example", NativeAppMode::Persistent).unwrap();

        let surface = Arc::new(RecordingSurface::default());
        app.mount_enforcement(Arc::clone(&surface) as Arc<dyn EnforcementSurface>);
        std::thread::sleep(Duration::from_millis(400));

        assert_eq!(
            surface.calls(),
            vec![SurfaceCall::SetBlocked(vec!["com.example".into()]), SurfaceCall::Start]
        );
        app.shutdown();
        assert!(app.enforcement().is_none());
    }

    #[test]
    fn test_sign_in_pulls_remote_state() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(RecordingBackend::with_records(
            Entity::Tasks,
            vec![json!({"id": "r1", "title": "Remote task"})],
        ));
        let app = FocusSphere::open_with(
            config(dir.path()),
            clock(),
            Some(Arc::clone(&backend) as Arc<dyn RemoteBackend>),
        )
        .unwrap();

        let report = app.set_identity(Some("u1")).unwrap();
        assert_eq!(report.tasks, 1);
        assert_eq!(app.store().tasks()[0].id, "r1");
        assert!(app.set_identity(Some("u1")).is_none());
    }
}
