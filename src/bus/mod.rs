//! Change-notification bus.
//!
//! Publishing carries no payload; subscribers re-read state from the store.
//! Each publish calls a snapshot of the subscriber list taken under the lock,
//! so callbacks may publish, subscribe or unsubscribe re-entrantly.

use crate::safe_lock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeKind {
    Tasks,
    BlockedSites,
    FocusSessions,
    Stats,
    Settings,
    /// Wildcard: receives every publish.
    All,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChangeKind::Tasks => "tasks",
            ChangeKind::BlockedSites => "blocked-sites",
            ChangeKind::FocusSessions => "focus-sessions",
            ChangeKind::Stats => "stats",
            ChangeKind::Settings => "settings",
            ChangeKind::All => "all",
        };
        f.write_str(name)
    }
}

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    by_kind: HashMap<ChangeKind, Vec<(u64, Callback)>>,
}

fn lock(subscribers: &Mutex<Subscribers>) -> MutexGuard<'_, Subscribers> {
    safe_lock(subscribers, "ChangeBus")
}

#[derive(Default)]
pub struct ChangeBus {
    subscribers: Arc<Mutex<Subscribers>>,
}

/// Handle returned by [`ChangeBus::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    subscribers: Weak<Mutex<Subscribers>>,
    kind: ChangeKind,
    id: u64,
}

impl Subscription {
    pub fn unsubscribe(self) {
        if let Some(subscribers) = self.subscribers.upgrade() {
            if let Some(list) = lock(&subscribers).by_kind.get_mut(&self.kind) {
                list.retain(|(id, _)| *id != self.id);
            }
        }
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }
}

impl ChangeBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: ChangeKind, callback: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut subscribers = lock(&self.subscribers);
        subscribers.next_id += 1;
        let id = subscribers.next_id;
        subscribers
            .by_kind
            .entry(kind)
            .or_default()
            .push((id, Arc::new(callback)));

        Subscription {
            subscribers: Arc::downgrade(&self.subscribers),
            kind,
            id,
        }
    }

    /// Fire subscribers of `kind`, then the wildcard subscribers.
    pub fn publish(&self, kind: ChangeKind) {
        let snapshot: Vec<Callback> = {
            let subscribers = lock(&self.subscribers);
            let specific = match kind {
                ChangeKind::All => None,
                ChangeKind::Tasks
                | ChangeKind::BlockedSites
                | ChangeKind::FocusSessions
                | ChangeKind::Stats
                | ChangeKind::Settings => subscribers.by_kind.get(&kind),
            };
            specific
                .into_iter()
                .chain(subscribers.by_kind.get(&ChangeKind::All))
                .flatten()
                .map(|(_, callback)| Arc::clone(callback))
                .collect()
        };

        for callback in snapshot {
            callback();
        }
    }

    pub fn subscriber_count(&self, kind: ChangeKind) -> usize {
        lock(&self.subscribers).by_kind.get(&kind).map_or(0, Vec::len)
    }
}
