//! Policy enforcement: derive the native block set from the store and push
//! it to the enforcement surface.
//!
//! Triggers are blocked-sites, settings and focus-sessions publishes plus
//! mount. Stats and the wildcard are never subscribed: the push would feed
//! back into another evaluation.

mod debounce;

pub use debounce::Debouncer;

use crate::bus::{ChangeKind, Subscription};
use crate::constants::keys;
use crate::platform::EnforcementSurface;
use crate::store::DomainStore;
use log::{debug, info, warn};
use serde::Serialize;
use crate::safe_lock;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

const TRIGGER_KINDS: [ChangeKind; 3] = [ChangeKind::BlockedSites, ChangeKind::Settings, ChangeKind::FocusSessions];

/// Everything the policy depends on, read fresh for each evaluation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicyInputs {
    pub session_active: bool,
    pub limit_exceeded: bool,
    pub persistent_apps: Vec<String>,
    pub session_apps: Vec<String>,
    pub master_switch: bool,
}

/// What gets pushed to the surface.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnforcementPlan {
    pub apps: Vec<String>,
    pub monitor: bool,
}

/// Persistent apps always; session apps while a session runs or the daily
/// limit is spent. Monitoring runs when the switch is on and anything is blocked.
pub fn derive_plan(inputs: &PolicyInputs) -> EnforcementPlan {
    let enforce_session = inputs.session_active || inputs.limit_exceeded;

    let mut apps: Vec<String> = Vec::new();
    let session = if enforce_session { inputs.session_apps.as_slice() } else { &[] };
    for app in inputs.persistent_apps.iter().chain(session) {
        if !apps.contains(app) {
            apps.push(app.clone());
        }
    }

    EnforcementPlan {
        monitor: inputs.master_switch && !apps.is_empty(),
        apps,
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    safe_lock(mutex, "PolicyReconciler")
}

pub struct PolicyReconciler {
    store: Arc<DomainStore>,
    surface: Arc<dyn EnforcementSurface>,
    debouncer: Debouncer,
    subscriptions: Mutex<Vec<Subscription>>,
    run_lock: Mutex<()>,
    last_plan: Mutex<Option<EnforcementPlan>>,
}

impl PolicyReconciler {
    /// Subscribe to the store and schedule the initial reconciliation.
    pub fn mount(store: Arc<DomainStore>, surface: Arc<dyn EnforcementSurface>, delay: Duration) -> Arc<Self> {
        let reconciler = Arc::new_cyclic(|weak: &Weak<Self>| {
            let on_fire = Weak::clone(weak);
            Self {
                store,
                surface,
                debouncer: Debouncer::new(delay, move || {
                    if let Some(reconciler) = on_fire.upgrade() {
                        reconciler.reconcile_now();
                    }
                }),
                subscriptions: Mutex::new(Vec::new()),
                run_lock: Mutex::new(()),
                last_plan: Mutex::new(None),
            }
        });

        let subscriptions: Vec<Subscription> = TRIGGER_KINDS
            .iter()
            .map(|kind| {
                let weak = Arc::downgrade(&reconciler);
                reconciler.store.bus().subscribe(*kind, move || {
                    if let Some(reconciler) = weak.upgrade() {
                        reconciler.schedule();
                    }
                })
            })
            .collect();
        *lock(&reconciler.subscriptions) = subscriptions;

        info!("Policy reconciler mounted (debounce {delay:?})");
        reconciler.schedule();
        reconciler
    }

    /// Queue a debounced reconciliation.
    pub fn schedule(&self) {
        self.debouncer.trigger();
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// The monitoring master switch. Unset means on.
    pub fn master_switch(&self) -> bool {
        self.store
            .cache()
            .get(keys::MASTER_SWITCH)
            .map_or(true, |value| value.trim() == "true")
    }

    pub fn set_master_switch(&self, enabled: bool) {
        self.store
            .cache()
            .set(keys::MASTER_SWITCH, if enabled { "true" } else { "false" });
        self.schedule();
    }

    pub fn inputs(&self) -> PolicyInputs {
        PolicyInputs {
            session_active: self.store.is_session_active(),
            limit_exceeded: self.store.is_time_limit_exceeded(),
            persistent_apps: self.store.persistent_apps(),
            session_apps: self.store.session_apps(),
            master_switch: self.master_switch(),
        }
    }

    /// Evaluate and push immediately. Surface errors are logged; the next
    /// trigger pushes the full set again.
    pub fn reconcile_now(&self) -> EnforcementPlan {
        let _running = lock(&self.run_lock);
        let inputs = self.inputs();
        let plan = derive_plan(&inputs);
        debug!("Reconciling enforcement: {inputs:?} -> {plan:?}");

        match self.surface.set_blocked_apps(&plan.apps) {
            Ok(count) => debug!("Enforcement surface now blocks {count} app(s)"),
            Err(e) => warn!("Failed to push blocked apps: {e}"),
        }

        if plan.monitor {
            if self.store.cache().get(keys::MASTER_SWITCH).is_none() {
                self.store.cache().set(keys::MASTER_SWITCH, "true");
            }
            match self.surface.start_monitoring() {
                Ok(running) => debug!("Monitoring start requested (running: {running})"),
                Err(e) => warn!("Failed to start monitoring: {e}"),
            }
        } else {
            match self.surface.stop_monitoring() {
                Ok(stopped) => debug!("Monitoring stop requested (stopped: {stopped})"),
                Err(e) => warn!("Failed to stop monitoring: {e}"),
            }
        }

        *lock(&self.last_plan) = Some(plan.clone());
        plan
    }

    pub fn last_plan(&self) -> Option<EnforcementPlan> {
        lock(&self.last_plan).clone()
    }

    /// Stop reacting to store changes and drop any pending run.
    pub fn unmount(&self) {
        for subscription in lock(&self.subscriptions).drain(..) {
            subscription.unsubscribe();
        }
        self.debouncer.cancel();
    }
}

impl Drop for PolicyReconciler {
    fn drop(&mut self) {
        self.unmount();
    }
}
