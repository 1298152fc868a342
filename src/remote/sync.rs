use super::{Entity, RemoteBackend, RemoteError};
use crate::error::AppError;
use crate::models::{BlockedSite, FocusSession, Task};
use crate::safe_lock;
use crate::store::DomainStore;
use log::{error, info, warn};
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Debug, Error)]
enum FamilyError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] AppError),
}

/// Outcome of one pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub tasks: usize,
    pub blocked_sites: usize,
    pub focus_sessions: usize,
    pub failed: Vec<Entity>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Pulls remote records into the store whenever a user signs in.
///
/// Merge is server-wins by id with no timestamps: a local edit made offline
/// is overwritten if the server still holds the older version.
pub struct RemoteSync {
    store: Arc<DomainStore>,
    backend: Arc<dyn RemoteBackend>,
    synced_for: Mutex<Option<String>>,
}

impl RemoteSync {
    pub fn new(store: Arc<DomainStore>, backend: Arc<dyn RemoteBackend>) -> Self {
        Self {
            store,
            backend,
            synced_for: Mutex::new(None),
        }
    }

    fn lock_synced_for(&self) -> MutexGuard<'_, Option<String>> {
        safe_lock(&self.synced_for, "RemoteSync")
    }

    /// Record the signed-in owner. A transition to a new non-empty owner
    /// triggers one pull; repeating the same owner does not, and signing out
    /// re-arms the trigger.
    pub fn set_identity(&self, owner: Option<&str>) -> Option<SyncReport> {
        let owner = owner.map(str::trim).filter(|id| !id.is_empty());
        self.store.set_identity(owner);

        let owner = {
            let mut synced_for = self.lock_synced_for();
            match owner {
                None => {
                    *synced_for = None;
                    return None;
                }
                Some(id) if synced_for.as_deref() == Some(id) => return None,
                Some(id) => {
                    *synced_for = Some(id.to_string());
                    id.to_string()
                }
            }
        };
        Some(self.sync_down(&owner))
    }

    /// Pull every record family for `owner` and merge it into the store.
    /// A failing family is logged and skipped.
    pub fn sync_down(&self, owner: &str) -> SyncReport {
        let mut report = SyncReport::default();

        for entity in Entity::ALL {
            match self.pull(entity, owner) {
                Ok(count) => match entity {
                    Entity::Tasks => report.tasks = count,
                    Entity::BlockedSites => report.blocked_sites = count,
                    Entity::FocusSessions => report.focus_sessions = count,
                },
                Err(e) => {
                    error!("Remote sync of {entity} failed: {e}");
                    report.failed.push(entity);
                }
            }
        }

        info!(
            "Remote sync merged {} task(s), {} site(s), {} session(s), failed: {:?}",
            report.tasks, report.blocked_sites, report.focus_sessions, report.failed
        );
        report
    }

    fn pull(&self, entity: Entity, owner: &str) -> Result<usize, FamilyError> {
        let rows = self.backend.list(entity, owner)?;
        let applied = match entity {
            Entity::Tasks => self.store.merge_remote_tasks(parse_rows(&rows, Task::from_value))?,
            Entity::BlockedSites => self.store.merge_remote_sites(parse_rows(&rows, BlockedSite::from_value))?,
            Entity::FocusSessions => self.store.merge_remote_sessions(parse_rows(&rows, FocusSession::from_value))?,
        };
        Ok(applied)
    }
}

fn parse_rows<T>(rows: &[Value], parse: fn(&Value) -> Option<T>) -> Vec<T> {
    let parsed: Vec<T> = rows.iter().filter_map(parse).collect();
    if parsed.len() < rows.len() {
        warn!("Skipped {} malformed remote row(s)", rows.len() - parsed.len());
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::testing::RecordingBackend;
    use crate::test_utils::setup_store;
    use serde_json::json;

    fn sync_with(backend: RecordingBackend) -> (crate::test_utils::TestStore, Arc<RecordingBackend>, RemoteSync) {
        let t = setup_store();
        let backend = Arc::new(backend);
        let sync = RemoteSync::new(Arc::clone(&t.store), Arc::clone(&backend) as Arc<dyn RemoteBackend>);
        (t, backend, sync)
    }

    #[test]
    fn test_server_wins_on_same_id() {
        let backend = RecordingBackend::with_records(
            Entity::Tasks,
            vec![
                json!({"id": "x", "title": "B", "completed": false}),
                json!({"id": "y", "title": "Remote only"}),
            ],
        );
        let (t, _backend, sync) = sync_with(backend);
        t.store.save_task(Task::new("x", "A", "2024-01-15T09:00:00.000Z")).unwrap();
        t.store.save_task(Task::new("z", "Local only", "2024-01-15T09:00:00.000Z")).unwrap();

        let report = sync.sync_down("u1");

        assert_eq!(report.tasks, 2);
        assert!(report.is_complete());
        let titles: Vec<String> = t.store.tasks().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["B", "Local only", "Remote only"]);
    }

    #[test]
    fn test_identity_transition_triggers_once() {
        let (_t, backend, sync) = sync_with(RecordingBackend::default());

        assert!(sync.set_identity(Some("u1")).is_some());
        assert!(sync.set_identity(Some("u1")).is_none());
        assert_eq!(backend.calls().len(), 3);

        assert!(sync.set_identity(None).is_none());
        assert!(sync.set_identity(Some("u1")).is_some());
        assert_eq!(backend.calls().len(), 6);
    }

    #[test]
    fn test_failed_family_is_skipped() {
        let backend = RecordingBackend::with_records(
            Entity::BlockedSites,
            vec![json!({"id": "s1", "name": "Reddit", "url": "reddit.com", "isEnabled": true, "blockMode": "bogus"})],
        );
        backend.failing.lock().unwrap().push(Entity::Tasks);
        let (t, _backend, sync) = sync_with(backend);

        let report = sync.sync_down("u1");

        assert_eq!(report.failed, vec![Entity::Tasks]);
        assert_eq!(report.blocked_sites, 1);
        assert_eq!(t.store.blocked_sites()[0].block_mode, crate::models::BlockMode::Focus);
    }

    #[test]
    fn test_merge_does_not_echo_remotely() {
        let backend = Arc::new(RecordingBackend::with_records(
            Entity::Tasks,
            vec![json!({"id": "x", "title": "Remote"})],
        ));
        let t = crate::test_utils::setup_store_with_outbox(crate::remote::Outbox::new(
            Arc::clone(&backend) as Arc<dyn RemoteBackend>,
        ));
        let sync = RemoteSync::new(Arc::clone(&t.store), Arc::clone(&backend) as Arc<dyn RemoteBackend>);

        sync.set_identity(Some("u1"));
        t.store.outbox().flush();

        assert!(backend.calls().iter().all(|call| call.starts_with("list ")));
        assert_eq!(t.store.identity().as_deref(), Some("u1"));
    }
}
