// src/constants.rs

use std::time::Duration;

/// Persisted keys. These must stay stable across versions for migration.
pub mod keys {
    pub const TASKS: &str = "focussphere_tasks";
    pub const BLOCKED_SITES: &str = "focussphere_blocked_apps";
    pub const FOCUS_SESSIONS: &str = "focussphere_focus_sessions";
    pub const DAILY_STATS: &str = "focussphere_daily_stats";
    pub const SETTINGS: &str = "focussphere_settings";
    pub const DAILY_APP_USAGE: &str = "focussphere_daily_app_usage";
    pub const ACTIVE_SESSION: &str = "focussphere_current_session";
    pub const SYNC_SNAPSHOT: &str = "focussphere_sync";
    pub const SESSION_APPS: &str = "android_blocked_apps";
    pub const PERSISTENT_APPS: &str = "android_persistent_apps";
    pub const MASTER_SWITCH: &str = "android_monitoring";
    pub const USER_ID: &str = "focussphere_user_id";

    /// Every key the cache migrates on `init()`.
    pub const ALL: &[&str] = &[
        TASKS,
        BLOCKED_SITES,
        FOCUS_SESSIONS,
        DAILY_STATS,
        SETTINGS,
        DAILY_APP_USAGE,
        ACTIVE_SESSION,
        SYNC_SNAPSHOT,
        SESSION_APPS,
        PERSISTENT_APPS,
        MASTER_SWITCH,
        USER_ID,
    ];
}

/// Delay between the last policy trigger and the enforcement push.
pub const ENFORCEMENT_DEBOUNCE: Duration = Duration::from_millis(500);

/// Maximum focus session length in minutes (24 hours)
pub const MAX_FOCUS_MINUTES: u32 = 24 * 60;

/// Maximum daily time limit in minutes (24 hours)
pub const MAX_DAILY_LIMIT_MINUTES: u32 = 24 * 60;

/// Maximum task title length
pub const MAX_TASK_TITLE_LEN: usize = 500;

/// Maximum blocked site name length
pub const MAX_SITE_NAME_LEN: usize = 100;

/// Version stamped on every bridge envelope.
pub const BRIDGE_PROTOCOL_VERSION: u32 = 1;

/// Browser native messaging caps a single message at 1 MiB.
pub const MAX_NATIVE_MESSAGE_SIZE: usize = 1024 * 1024;
