//! Cross-context sync bridge.
//!
//! The companion add-on cannot read the store, so every change is flattened
//! into a snapshot, persisted under the sync key and broadcast to listeners.
//! Messages travel in a versioned envelope: `{"version": 1, "type": ...}`.

use crate::bus::{ChangeKind, Subscription};
use crate::constants::{keys, BRIDGE_PROTOCOL_VERSION};
use crate::error::AppError;
use crate::models::{BlockedSite, Settings, Task};
use crate::safe_lock;
use crate::store::DomainStore;
use crate::validation::validate_hours;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, Weak};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unsupported protocol version {0}")]
    UnsupportedVersion(u64),

    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    #[error(transparent)]
    Store(#[from] AppError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// The projection the companion context blocks against.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSnapshot {
    pub tasks: Vec<Task>,
    pub blocked_apps: Vec<BlockedSite>,
    pub settings: Settings,
    pub focus_mode: bool,
    pub timestamp: i64,
}

/// Messages sent to the companion context.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Outbound<'a> {
    SyncData(&'a SyncSnapshot),
    Error { message: &'a str },
}

#[derive(Serialize)]
struct Envelope<'a> {
    version: u32,
    #[serde(flatten)]
    message: &'a Outbound<'a>,
}

/// Serialize `message` inside a versioned envelope.
pub fn encode(message: &Outbound<'_>) -> Result<String, BridgeError> {
    Ok(serde_json::to_string(&Envelope {
        version: BRIDGE_PROTOCOL_VERSION,
        message,
    })?)
}

/// Messages the companion context sends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inbound {
    AddSavedTime { hours: f64 },
    AddWastedTime { hours: f64 },
    RequestState,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum Message {
    AddSavedTime {
        hours: f64,
    },
    AddWastedTime {
        hours: f64,
    },
    RequestState,
    #[serde(other)]
    Unknown,
}

/// The pre-envelope shape: `{"action": ..., "hours": ...}`.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
enum LegacyMessage {
    AddSavedTime { hours: f64 },
    AddWastedTime { hours: f64 },
    RequestState,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Wire {
    Versioned {
        version: u64,
        #[serde(flatten)]
        message: Message,
    },
    Legacy(LegacyMessage),
}

/// The routing fields, read first so a bad version or type gets its own error.
#[derive(Deserialize)]
struct Header {
    version: Option<u64>,
    #[serde(rename = "type")]
    kind: Option<String>,
}

impl From<LegacyMessage> for Message {
    fn from(legacy: LegacyMessage) -> Self {
        match legacy {
            LegacyMessage::AddSavedTime { hours } => Message::AddSavedTime { hours },
            LegacyMessage::AddWastedTime { hours } => Message::AddWastedTime { hours },
            LegacyMessage::RequestState => Message::RequestState,
        }
    }
}

impl Inbound {
    /// Parse and validate one message. Accepts the versioned envelope and the
    /// older `{"action": ..., "hours": ...}` shape.
    pub fn decode(raw: &str) -> Result<Self, BridgeError> {
        let malformed = |e: serde_json::Error| BridgeError::Malformed(e.to_string());
        let value: Value = serde_json::from_str(raw).map_err(malformed)?;
        if !value.is_object() {
            return Err(BridgeError::Malformed("expected a JSON object".into()));
        }
        let header = Header::deserialize(&value).map_err(malformed)?;

        let message = match Wire::deserialize(&value) {
            Ok(Wire::Versioned { version, message }) => {
                if version != u64::from(BRIDGE_PROTOCOL_VERSION) {
                    return Err(BridgeError::UnsupportedVersion(version));
                }
                message
            }
            Ok(Wire::Legacy(legacy)) => legacy.into(),
            Err(e) => {
                return Err(match header.version {
                    Some(version) if version != u64::from(BRIDGE_PROTOCOL_VERSION) => {
                        BridgeError::UnsupportedVersion(version)
                    }
                    Some(_) | None => malformed(e),
                })
            }
        };

        match message {
            Message::AddSavedTime { hours } => Ok(Inbound::AddSavedTime {
                hours: validate_hours(hours)?,
            }),
            Message::AddWastedTime { hours } => Ok(Inbound::AddWastedTime {
                hours: validate_hours(hours)?,
            }),
            Message::RequestState => Ok(Inbound::RequestState),
            Message::Unknown => Err(BridgeError::UnknownType(header.kind.unwrap_or_default())),
        }
    }
}

pub struct SyncBridge {
    store: Arc<DomainStore>,
    listeners: Mutex<Vec<Sender<String>>>,
    subscription: Mutex<Option<Subscription>>,
}

impl SyncBridge {
    /// Subscribe to every store change and publish the first snapshot.
    pub fn mount(store: Arc<DomainStore>) -> Arc<Self> {
        let bridge = Arc::new(Self {
            store,
            listeners: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
        });

        let weak: Weak<Self> = Arc::downgrade(&bridge);
        let subscription = bridge.store.bus().subscribe(ChangeKind::All, move || {
            if let Some(bridge) = weak.upgrade() {
                if let Err(e) = bridge.force_sync() {
                    warn!("Companion sync failed: {e}");
                }
            }
        });
        *safe_lock(&bridge.subscription, "SyncBridge") = Some(subscription);

        if let Err(e) = bridge.force_sync() {
            warn!("Initial companion sync failed: {e}");
        }
        bridge
    }

    /// Current projection of the store.
    pub fn snapshot(&self) -> SyncSnapshot {
        let session_active = self.store.is_session_active();
        SyncSnapshot {
            tasks: self.store.incomplete_tasks(),
            blocked_apps: self.store.effective_blocked_sites(session_active),
            settings: self.store.settings(),
            focus_mode: session_active || self.store.is_time_limit_exceeded(),
            timestamp: self.store.clock().now_millis(),
        }
    }

    /// Build, persist and broadcast a snapshot now.
    pub fn force_sync(&self) -> Result<SyncSnapshot, BridgeError> {
        let snapshot = self.snapshot();
        self.persist(&snapshot)?;
        self.broadcast(&encode(&Outbound::SyncData(&snapshot))?);
        debug!(
            "Companion sync: {} task(s), {} site(s), focus mode {}",
            snapshot.tasks.len(),
            snapshot.blocked_apps.len(),
            snapshot.focus_mode
        );
        Ok(snapshot)
    }

    /// Merge the snapshot into the stored object so fields written by the
    /// companion survive.
    fn persist(&self, snapshot: &SyncSnapshot) -> Result<(), BridgeError> {
        let cache = self.store.cache();
        let mut stored = cache
            .get(keys::SYNC_SNAPSHOT)
            .and_then(|raw| serde_json::from_str::<Value>(&raw).ok())
            .and_then(|value| match value {
                Value::Object(fields) => Some(fields),
                Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) | Value::Array(_) => None,
            })
            .unwrap_or_else(Map::new);

        if let Value::Object(fields) = serde_json::to_value(snapshot)? {
            stored.extend(fields);
        }
        cache.set(keys::SYNC_SNAPSHOT, &serde_json::to_string(&stored)?);
        Ok(())
    }

    /// Receive every future `syncData` envelope.
    pub fn listen(&self) -> Receiver<String> {
        let (tx, rx) = mpsc::channel();
        safe_lock(&self.listeners, "SyncBridge").push(tx);
        rx
    }

    fn broadcast(&self, message: &str) {
        safe_lock(&self.listeners, "SyncBridge").retain(|tx| tx.send(message.to_string()).is_ok());
    }

    /// Apply one inbound message. Returns the reply envelope, if the message
    /// expects one.
    pub fn handle_inbound(&self, raw: &str) -> Result<Option<String>, BridgeError> {
        match Inbound::decode(raw)? {
            Inbound::AddSavedTime { hours } => {
                self.store.add_saved_time(hours)?;
                Ok(None)
            }
            Inbound::AddWastedTime { hours } => {
                self.store.add_wasted_time(hours)?;
                Ok(None)
            }
            Inbound::RequestState => Ok(Some(encode(&Outbound::SyncData(&self.snapshot()))?)),
        }
    }

    pub fn unmount(&self) {
        if let Some(subscription) = safe_lock(&self.subscription, "SyncBridge").take() {
            subscription.unsubscribe();
        }
        safe_lock(&self.listeners, "SyncBridge").clear();
    }
}

impl Drop for SyncBridge {
    fn drop(&mut self) {
        self.unmount();
    }
}
