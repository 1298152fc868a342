use super::{Entity, RemoteBackend};
use crate::safe_lock;
use log::{debug, error};
use serde_json::Value;
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// A remote write produced by a local mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Create {
        entity: Entity,
        owner: String,
        record: Value,
    },
    Update {
        entity: Entity,
        id: String,
        partial: Value,
    },
    Delete {
        entity: Entity,
        id: String,
    },
}

impl Effect {
    fn apply(&self, backend: &dyn RemoteBackend) {
        let (verb, entity, result) = match self {
            Effect::Create { entity, owner, record } => ("create", *entity, backend.create(*entity, owner, record)),
            Effect::Update { entity, id, partial } => ("update", *entity, backend.update(*entity, id, partial)),
            Effect::Delete { entity, id } => ("delete", *entity, backend.delete(*entity, id)),
        };
        match result {
            Ok(()) => debug!("Remote {verb} on {entity} applied"),
            Err(e) => error!("Remote {verb} on {entity} failed: {e}"),
        }
    }
}

enum Message {
    Effect(Effect),
    Flush(Sender<()>),
}

/// Carries remote effects to a dispatcher thread so commits never wait on
/// the network. Each effect is tried once.
pub struct Outbox {
    tx: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    safe_lock(mutex, "Outbox")
}

impl Outbox {
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        let (tx, rx) = mpsc::channel::<Message>();
        let handle = thread::spawn(move || {
            for message in rx {
                match message {
                    Message::Effect(effect) => effect.apply(backend.as_ref()),
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            debug!("Outbox dispatcher stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(handle)),
        }
    }

    /// An outbox with no backend. Effects are dropped.
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.tx).is_some()
    }

    pub fn emit(&self, effect: Effect) {
        match lock(&self.tx).as_ref() {
            Some(tx) => {
                if tx.send(Message::Effect(effect)).is_err() {
                    error!("Outbox dispatcher is gone, remote write dropped");
                }
            }
            None => debug!("No remote backend, dropping {effect:?}"),
        }
    }

    /// Block until every effect emitted so far has been attempted.
    pub fn flush(&self) {
        let (done_tx, done_rx) = mpsc::channel();
        let sent = lock(&self.tx)
            .as_ref()
            .is_some_and(|tx| tx.send(Message::Flush(done_tx)).is_ok());
        if sent {
            let _ = done_rx.recv();
        }
    }

    pub fn shutdown(&self) {
        lock(&self.tx).take();
        if let Some(handle) = lock(&self.worker).take() {
            if handle.join().is_err() {
                error!("Outbox dispatcher panicked");
            }
        }
    }
}

impl Drop for Outbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}
