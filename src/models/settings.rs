use super::lenient::{coerce_bool, coerce_u32};
use crate::error::AppError;
use crate::validation::{validate_daily_limit, validate_focus_minutes};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub task_reminders: bool,
    pub focus_alerts: bool,
    pub strict_mode: bool,
    pub default_focus_duration: u32,
    pub daily_time_limit_enabled: bool,
    pub daily_time_limit_minutes: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            task_reminders: true,
            focus_alerts: true,
            strict_mode: false,
            default_focus_duration: 60,
            daily_time_limit_enabled: false,
            daily_time_limit_minutes: 60,
        }
    }
}

impl Settings {
    /// Overlay whatever fields are readable onto the defaults.
    pub fn from_value(value: &Value) -> Self {
        let defaults = Self::default();
        let flag = |name: &str, default: bool| value.get(name).and_then(coerce_bool).unwrap_or(default);
        let minutes = |name: &str, default: u32| value.get(name).and_then(coerce_u32).unwrap_or(default);

        Self {
            task_reminders: flag("taskReminders", defaults.task_reminders),
            focus_alerts: flag("focusAlerts", defaults.focus_alerts),
            strict_mode: flag("strictMode", defaults.strict_mode),
            default_focus_duration: minutes("defaultFocusDuration", defaults.default_focus_duration),
            daily_time_limit_enabled: flag("dailyTimeLimitEnabled", defaults.daily_time_limit_enabled),
            daily_time_limit_minutes: minutes("dailyTimeLimitMinutes", defaults.daily_time_limit_minutes),
        }
    }

    pub fn from_json(raw: Option<&str>) -> Self {
        match raw.map(serde_json::from_str::<Value>) {
            Some(Ok(value)) if value.is_object() => Self::from_value(&value),
            Some(Ok(_) | Err(_)) => {
                log::warn!("Stored settings are unreadable, using defaults");
                Self::default()
            }
            None => Self::default(),
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        validate_focus_minutes(self.default_focus_duration)?;
        validate_daily_limit(self.daily_time_limit_minutes)?;
        if self.daily_time_limit_enabled && self.daily_time_limit_minutes == 0 {
            return Err(AppError::InvalidInput {
                field: "daily_time_limit_minutes",
                reason: "must be positive when the limit is enabled".into(),
            });
        }
        Ok(())
    }
}
