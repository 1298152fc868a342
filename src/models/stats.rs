use super::lenient::{coerce_f64, de_f64};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStat {
    /// `YYYY-MM-DD`, local timezone.
    pub date: String,
    #[serde(default, deserialize_with = "de_f64")]
    pub saved_hours: f64,
    #[serde(default, deserialize_with = "de_f64")]
    pub wasted_hours: f64,
}

impl DailyStat {
    pub fn empty(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            saved_hours: 0.0,
            wasted_hours: 0.0,
        }
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        value.get("date").and_then(Value::as_str).filter(|d| !d.is_empty())?;
        serde_json::from_value(value.clone()).ok()
    }
}

/// Minutes of tracked app usage for one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAppUsage {
    pub date: String,
    pub minutes: f64,
}

impl DailyAppUsage {
    /// Stored usage for `today`; a record from any other day counts as zero.
    pub fn for_day(raw: Option<&str>, today: &str) -> Self {
        let stored = raw
            .and_then(|raw| serde_json::from_str::<Value>(raw).ok())
            .filter(|value| value.get("date").and_then(Value::as_str) == Some(today))
            .and_then(|value| value.get("minutes").and_then(coerce_f64));

        Self {
            date: today.to_string(),
            minutes: stored.filter(|m| *m > 0.0).unwrap_or(0.0),
        }
    }
}

/// Totals over a set of days.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalStats {
    pub saved_hours: f64,
    pub wasted_hours: f64,
    /// `saved / (saved + wasted)` as a whole percentage, 0 with no data.
    pub efficiency: u32,
}

impl TotalStats {
    pub fn from_days(days: &[DailyStat]) -> Self {
        let saved_hours: f64 = days.iter().map(|d| d.saved_hours).sum();
        let wasted_hours: f64 = days.iter().map(|d| d.wasted_hours).sum();
        let total = saved_hours + wasted_hours;
        let efficiency = if total > 0.0 {
            super::lenient::round_to_u32(saved_hours / total * 100.0)
        } else {
            0
        };
        Self {
            saved_hours,
            wasted_hours,
            efficiency,
        }
    }
}

/// Whole-percent change from `previous` to `current`. With nothing before,
/// any growth reads as 100%.
pub fn percentage_change(current: f64, previous: f64) -> i64 {
    if previous == 0.0 {
        return if current > 0.0 { 100 } else { 0 };
    }
    let rounded = ((current - previous) / previous * 100.0).round();
    format!("{rounded:.0}").parse().unwrap_or(if rounded > 0.0 { i64::MAX } else { i64::MIN })
}
