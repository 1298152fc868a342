use super::{to_record, DomainStore};
use crate::bus::ChangeKind;
use crate::clock::iso_from_millis;
use crate::constants::keys;
use crate::error::AppError;
use crate::models::{ActiveSession, FocusSession};
use crate::remote::{Effect, Entity};
use crate::validation::validate_focus_minutes;
use log::{error, info, warn};
use serde_json::Value;

const MILLIS_PER_MINUTE: i64 = 60_000;

fn millis_to_hours(millis: i64) -> f64 {
    let secs = u32::try_from(millis.max(0) / 1000).unwrap_or(u32::MAX);
    f64::from(secs) / 3600.0
}

fn millis_to_rounded_minutes(millis: i64) -> u32 {
    let minutes = millis.max(0).saturating_add(MILLIS_PER_MINUTE / 2) / MILLIS_PER_MINUTE;
    u32::try_from(minutes).unwrap_or(u32::MAX)
}

impl DomainStore {
    /// Finished sessions, oldest first.
    pub fn focus_sessions(&self) -> Vec<FocusSession> {
        self.read_collection(keys::FOCUS_SESSIONS, FocusSession::from_value)
    }

    fn stored_session(&self) -> Option<ActiveSession> {
        let raw = self.cache.get(keys::ACTIVE_SESSION)?;
        match serde_json::from_str::<Value>(&raw) {
            Ok(value) => ActiveSession::from_value(&value),
            Err(e) => {
                warn!("Stored active session is not valid JSON: {e}");
                None
            }
        }
    }

    /// Drop a stored session that could not be read. Caller holds the write lock.
    fn clear_unreadable_session(&self) {
        if self.cache.get(keys::ACTIVE_SESSION).is_some() {
            self.cache.remove(keys::ACTIVE_SESSION);
        }
    }

    /// Start a session of `minutes`, ending any running session first.
    pub fn start_session(&self, minutes: u32) -> Result<ActiveSession, AppError> {
        let minutes = validate_focus_minutes(minutes)?;
        self.end_session()?;

        let session = ActiveSession::starting_at(self.now_millis(), minutes);
        {
            let _guard = self.lock_writes();
            self.write_json(keys::ACTIVE_SESSION, &session)?;
        }
        info!("Focus session started for {minutes} minutes");
        self.publish(ChangeKind::FocusSessions);
        Ok(session)
    }

    /// The running session, if its end is still in the future.
    ///
    /// An expired session is removed here and its natural end recorded once:
    /// one history entry with the full requested duration, and the saved hours.
    pub fn active_session(&self) -> Option<ActiveSession> {
        let now = self.now_millis();
        let finished = {
            let _guard = self.lock_writes();
            let Some(session) = self.stored_session() else {
                self.clear_unreadable_session();
                return None;
            };
            if !session.is_expired(now) {
                return Some(session);
            }
            self.finish_locked(&session, now)
        };

        match finished {
            Ok(record) => {
                info!("Focus session ran to completion ({} min)", record.duration_minutes);
                self.after_finish(&record);
            }
            Err(e) => error!("Failed to record expired focus session: {e}"),
        }
        None
    }

    pub fn is_session_active(&self) -> bool {
        self.active_session().is_some()
    }

    /// End the running session now. Returns the history entry written, or
    /// `None` when nothing was running.
    pub fn end_session(&self) -> Result<Option<FocusSession>, AppError> {
        let now = self.now_millis();
        let record = {
            let _guard = self.lock_writes();
            let Some(session) = self.stored_session() else {
                self.clear_unreadable_session();
                return Ok(None);
            };
            self.finish_locked(&session, now)?
        };

        info!(
            "Focus session ended after {} min (completed: {})",
            record.duration_minutes, record.completed
        );
        self.after_finish(&record);
        Ok(Some(record))
    }

    /// Remove the active session, append its history entry and credit saved
    /// time. Caller holds the write lock.
    fn finish_locked(&self, session: &ActiveSession, now: i64) -> Result<FocusSession, AppError> {
        let completed = session.is_expired(now);
        let (duration_minutes, saved_hours) = if completed {
            (session.duration, f64::from(session.duration) / 60.0)
        } else {
            let elapsed = session.elapsed_millis(now);
            (millis_to_rounded_minutes(elapsed), millis_to_hours(elapsed))
        };

        let record = FocusSession {
            id: uuid::Uuid::new_v4().to_string(),
            start_time: iso_from_millis(session.start_time),
            duration_minutes,
            completed,
            apps_blocked_count: self.blocked_count(),
        };

        self.cache.remove(keys::ACTIVE_SESSION);
        let mut history = self.focus_sessions();
        history.push(record.clone());
        self.write_json(keys::FOCUS_SESSIONS, &history)?;
        self.accumulate_locked(saved_hours, 0.0)?;
        Ok(record)
    }

    fn after_finish(&self, record: &FocusSession) {
        self.publish(ChangeKind::FocusSessions);
        self.publish(ChangeKind::Stats);
        let record = to_record(record);
        self.emit(|owner| Effect::Create {
            entity: Entity::FocusSessions,
            owner,
            record,
        });
    }

    /// Sites and apps that a running session blocks.
    pub fn blocked_count(&self) -> u32 {
        let sites = self.effective_blocked_sites(true).len();
        let apps = self.session_apps().len() + self.persistent_apps().len();
        u32::try_from(sites + apps).unwrap_or(u32::MAX)
    }

    pub(crate) fn merge_remote_sessions(&self, remote: Vec<FocusSession>) -> Result<usize, AppError> {
        let applied = {
            let _guard = self.lock_writes();
            let mut history = self.focus_sessions();
            let applied = super::merge_by_id(&mut history, remote, |s| s.id.as_str());
            self.write_json(keys::FOCUS_SESSIONS, &history)?;
            applied
        };
        self.publish(ChangeKind::FocusSessions);
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlockedSite;
    use crate::remote::testing::RecordingBackend;
    use crate::remote::{Outbox, RemoteBackend};
    use crate::test_utils::{setup_store, setup_store_with_outbox, T0};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_start_and_read_active_session() {
        let t = setup_store();
        let session = t.store.start_session(25).unwrap();
        assert_eq!(session.start_time, T0);
        assert_eq!(session.end_time, T0 + 25 * 60_000);
        assert_eq!(t.store.active_session(), Some(session));
        assert!(t.store.is_session_active());
    }

    #[test]
    fn test_invalid_duration_is_rejected() {
        let t = setup_store();
        assert!(t.store.start_session(0).is_err());
        assert!(t.store.start_session(24 * 60 + 1).is_err());
        assert!(t.store.active_session().is_none());
    }

    #[test]
    fn test_lazy_expiry_records_once() {
        let t = setup_store();
        t.store.save_blocked_site(BlockedSite::new("s", "x", "x.com")).unwrap();
        t.store.start_session(25).unwrap();

        t.clock.set(T0 + 25 * 60_000 + 1_000);
        assert!(t.store.active_session().is_none());
        assert!(t.cache.get(keys::ACTIVE_SESSION).is_none());

        let history = t.store.focus_sessions();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration_minutes, 25);
        assert!(history[0].completed);
        assert_eq!(history[0].apps_blocked_count, 1);
        assert!((t.store.today_stats().saved_hours - 25.0 / 60.0).abs() < 1e-9);

        assert!(t.store.active_session().is_none());
        assert_eq!(t.store.end_session().unwrap(), None);
        assert_eq!(t.store.focus_sessions().len(), 1);
    }

    #[test]
    fn test_expiry_is_exact_at_end_time() {
        let t = setup_store();
        t.store.start_session(1).unwrap();
        t.clock.set(T0 + 60_000 - 1);
        assert!(t.store.active_session().is_some());
        t.clock.set(T0 + 60_000);
        assert!(t.store.active_session().is_none());
    }

    #[test]
    fn test_manual_end_records_elapsed() {
        let t = setup_store();
        t.store.start_session(60).unwrap();
        t.clock.advance_secs(30 * 60);

        let record = t.store.end_session().unwrap().unwrap();
        assert_eq!(record.duration_minutes, 30);
        assert!(!record.completed);
        assert_eq!(record.start_time, "2024-01-15T12:00:00.000Z");
        assert!((t.store.today_stats().saved_hours - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_end_session_is_idempotent() {
        let t = setup_store();
        t.store.start_session(60).unwrap();
        t.clock.advance_secs(60);

        assert!(t.store.end_session().unwrap().is_some());
        let stats_after_first = t.store.today_stats();
        assert!(t.store.end_session().unwrap().is_none());

        assert_eq!(t.store.focus_sessions().len(), 1);
        assert_eq!(t.store.today_stats(), stats_after_first);
    }

    #[test]
    fn test_start_replaces_running_session() {
        let t = setup_store();
        t.store.start_session(60).unwrap();
        t.clock.advance_secs(10 * 60);
        let second = t.store.start_session(15).unwrap();

        assert_eq!(t.store.active_session(), Some(second));
        let history = t.store.focus_sessions();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].duration_minutes, 10);
    }

    #[test]
    fn test_expiry_publishes_sessions_and_stats() {
        let t = setup_store();
        let count = Arc::new(AtomicUsize::new(0));
        for kind in [ChangeKind::FocusSessions, ChangeKind::Stats] {
            let c = Arc::clone(&count);
            t.bus.subscribe(kind, move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        }
        t.store.start_session(1).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);

        t.clock.advance_secs(120);
        t.store.active_session();
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_finished_session_is_sent_remotely() {
        let backend = Arc::new(RecordingBackend::default());
        let t = setup_store_with_outbox(Outbox::new(Arc::clone(&backend) as Arc<dyn RemoteBackend>));
        t.store.set_identity(Some("u1"));

        t.store.start_session(5).unwrap();
        t.clock.advance_secs(5 * 60);
        t.store.active_session();
        t.store.outbox().flush();

        let calls = backend.calls();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("create focus_sessions u1 "));
    }

    #[test]
    fn test_corrupt_active_session_is_cleared() {
        let t = setup_store();
        t.cache.set(keys::ACTIVE_SESSION, "garbage");
        assert!(t.store.active_session().is_none());
        assert!(t.cache.get(keys::ACTIVE_SESSION).is_none());

        t.cache.set(keys::ACTIVE_SESSION, r#"{"startTime":"soon"}"#);
        assert_eq!(t.store.end_session().unwrap(), None);
        assert!(t.cache.get(keys::ACTIVE_SESSION).is_none());
        assert!(t.store.focus_sessions().is_empty());
    }
}
