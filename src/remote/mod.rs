//! Remote backend access: the backend trait, the HTTP implementation, the
//! outbox that carries local writes to it, and the pull-side reconciler.

pub mod mapping;
mod outbox;
mod rest;
mod sync;

pub use outbox::{Effect, Outbox};
pub use rest::RestBackend;
pub use sync::{RemoteSync, SyncReport};

use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Record families mirrored remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Tasks,
    BlockedSites,
    FocusSessions,
}

impl Entity {
    pub const ALL: [Entity; 3] = [Entity::Tasks, Entity::BlockedSites, Entity::FocusSessions];

    /// Remote table name.
    pub fn table(self) -> &'static str {
        match self {
            Entity::Tasks => "tasks",
            Entity::BlockedSites => "blocked_apps",
            Entity::FocusSessions => "focus_sessions",
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A remote store of per-owner records. Records cross this boundary in the
/// local (`camelCase`) shape and always carry `id`.
pub trait RemoteBackend: Send + Sync {
    fn list(&self, entity: Entity, owner: &str) -> Result<Vec<Value>, RemoteError>;
    fn create(&self, entity: Entity, owner: &str, record: &Value) -> Result<(), RemoteError>;
    fn update(&self, entity: Entity, id: &str, partial: &Value) -> Result<(), RemoteError>;
    fn delete(&self, entity: Entity, id: &str) -> Result<(), RemoteError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{Entity, RemoteBackend, RemoteError};
    use serde_json::Value;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Records every call; `list` answers from `records`.
    #[derive(Default)]
    pub struct RecordingBackend {
        pub calls: Mutex<Vec<String>>,
        pub records: Mutex<HashMap<Entity, Vec<Value>>>,
        pub failing: Mutex<Vec<Entity>>,
    }

    impl RecordingBackend {
        pub fn with_records(entity: Entity, records: Vec<Value>) -> Self {
            let backend = Self::default();
            backend.records.lock().unwrap().insert(entity, records);
            backend
        }

        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, entity: Entity) -> Result<(), RemoteError> {
            if self.failing.lock().unwrap().contains(&entity) {
                return Err(RemoteError::Status {
                    status: 500,
                    body: "boom".into(),
                });
            }
            Ok(())
        }
    }

    impl RemoteBackend for RecordingBackend {
        fn list(&self, entity: Entity, owner: &str) -> Result<Vec<Value>, RemoteError> {
            self.calls.lock().unwrap().push(format!("list {entity} {owner}"));
            self.check(entity)?;
            Ok(self.records.lock().unwrap().get(&entity).cloned().unwrap_or_default())
        }

        fn create(&self, entity: Entity, owner: &str, record: &Value) -> Result<(), RemoteError> {
            self.calls.lock().unwrap().push(format!("create {entity} {owner} {}", record["id"].as_str().unwrap_or("")));
            self.check(entity)
        }

        fn update(&self, entity: Entity, id: &str, partial: &Value) -> Result<(), RemoteError> {
            self.calls.lock().unwrap().push(format!("update {entity} {id} {partial}"));
            self.check(entity)
        }

        fn delete(&self, entity: Entity, id: &str) -> Result<(), RemoteError> {
            self.calls.lock().unwrap().push(format!("delete {entity} {id}"));
            self.check(entity)
        }
    }
}
