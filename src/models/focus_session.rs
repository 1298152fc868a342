use super::lenient::{coerce_u32, de_bool, de_u32, non_empty_str};
use serde::{Deserialize, Serialize};
use serde_json::Value;

const MILLIS_PER_MINUTE: i64 = 60_000;

/// The running focus session. At most one exists at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    /// Epoch milliseconds.
    pub start_time: i64,
    /// Epoch milliseconds, `start_time + duration`.
    pub end_time: i64,
    /// Requested length in minutes.
    pub duration: u32,
}

impl ActiveSession {
    pub fn starting_at(start_time: i64, duration_minutes: u32) -> Self {
        let end_time = start_time.saturating_add(i64::from(duration_minutes).saturating_mul(MILLIS_PER_MINUTE));
        Self {
            start_time,
            end_time,
            duration: duration_minutes,
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let start_time = value.get("startTime").and_then(Value::as_i64)?;
        let end_time = value.get("endTime").and_then(Value::as_i64)?;
        let duration = value.get("duration").and_then(coerce_u32).unwrap_or(0);
        Some(Self {
            start_time,
            end_time,
            duration,
        })
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.end_time
    }

    /// Whole milliseconds elapsed at `now_millis`, capped at the session end.
    pub fn elapsed_millis(&self, now_millis: i64) -> i64 {
        now_millis.min(self.end_time).saturating_sub(self.start_time).max(0)
    }

    pub fn remaining_secs(&self, now_millis: i64) -> i64 {
        self.end_time.saturating_sub(now_millis).max(0) / 1000
    }
}

/// A finished session kept for history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    /// ISO-8601 start timestamp.
    pub start_time: String,
    #[serde(default, deserialize_with = "de_u32")]
    pub duration_minutes: u32,
    #[serde(default, deserialize_with = "de_bool")]
    pub completed: bool,
    #[serde(default, deserialize_with = "de_u32")]
    pub apps_blocked_count: u32,
}

impl FocusSession {
    pub fn from_value(value: &Value) -> Option<Self> {
        non_empty_str(value.get("id"))?;
        serde_json::from_value(value.clone()).ok()
    }

    /// Calendar day prefix of the start timestamp.
    pub fn start_day(&self) -> Option<&str> {
        self.start_time.get(..10)
    }
}
