use super::DomainStore;
use crate::bus::ChangeKind;
use crate::clock::day_key;
use crate::constants::keys;
use crate::error::AppError;
use crate::models::{DailyAppUsage, DailyStat, Settings, TotalStats};
use chrono::{Datelike, Days, NaiveDate, Weekday};
use log::debug;

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

impl DomainStore {
    // Settings

    pub fn settings(&self) -> Settings {
        Settings::from_json(self.cache.get(keys::SETTINGS).as_deref())
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<(), AppError> {
        settings.validate()?;
        {
            let _guard = self.lock_writes();
            self.write_json(keys::SETTINGS, settings)?;
        }
        self.publish(ChangeKind::Settings);
        Ok(())
    }

    // App usage

    pub fn daily_app_usage(&self) -> DailyAppUsage {
        DailyAppUsage::for_day(self.cache.get(keys::DAILY_APP_USAGE).as_deref(), &self.today_key())
    }

    /// Add tracked minutes to today's usage. Non-positive amounts are ignored.
    pub fn add_app_usage(&self, minutes: f64) -> Result<DailyAppUsage, AppError> {
        if !is_positive(minutes) {
            debug!("Ignoring non-positive app usage: {minutes}");
            return Ok(self.daily_app_usage());
        }
        let usage = {
            let _guard = self.lock_writes();
            let mut usage = self.daily_app_usage();
            usage.minutes += minutes;
            self.write_json(keys::DAILY_APP_USAGE, &usage)?;
            usage
        };
        self.publish(ChangeKind::Stats);
        Ok(usage)
    }

    pub fn is_time_limit_exceeded(&self) -> bool {
        let settings = self.settings();
        settings.daily_time_limit_enabled
            && self.daily_app_usage().minutes >= f64::from(settings.daily_time_limit_minutes)
    }

    /// Minutes left before the daily limit, `None` when no limit is set.
    pub fn remaining_minutes(&self) -> Option<f64> {
        let settings = self.settings();
        if !settings.daily_time_limit_enabled {
            return None;
        }
        let remaining = f64::from(settings.daily_time_limit_minutes) - self.daily_app_usage().minutes;
        Some(remaining.max(0.0))
    }

    // Daily stats

    pub fn daily_stats(&self) -> Vec<DailyStat> {
        self.read_collection(keys::DAILY_STATS, DailyStat::from_value)
    }

    pub fn stats_for(&self, date: &str) -> DailyStat {
        self.daily_stats()
            .into_iter()
            .find(|s| s.date == date)
            .unwrap_or_else(|| DailyStat::empty(date))
    }

    pub fn today_stats(&self) -> DailyStat {
        self.stats_for(&self.today_key())
    }

    /// Recorded days of one calendar month, oldest first.
    pub fn month_stats(&self, year: i32, month: u32) -> Vec<DailyStat> {
        let prefix = format!("{year:04}-{month:02}-");
        let mut days: Vec<DailyStat> = self
            .daily_stats()
            .into_iter()
            .filter(|s| s.date.starts_with(&prefix))
            .collect();
        days.sort_by(|a, b| a.date.cmp(&b.date));
        days
    }

    /// Monday through Sunday of the current week, zero-filled.
    pub fn weekly_stats(&self) -> Vec<DailyStat> {
        self.week_of(self.clock.today())
    }

    pub fn weekly_focus_hours(&self) -> f64 {
        self.weekly_stats().iter().map(|s| s.saved_hours).sum()
    }

    pub fn previous_week_focus_hours(&self) -> f64 {
        let last_week = self.clock.today().checked_sub_days(Days::new(7));
        last_week.map_or(0.0, |day| self.week_of(day).iter().map(|s| s.saved_hours).sum())
    }

    /// Day of the current week with the most saved hours, if any were saved.
    pub fn best_productive_day(&self) -> Option<(Weekday, f64)> {
        let mut best: Option<(Weekday, f64)> = None;
        for (stat, weekday) in self.weekly_stats().iter().zip(week_days()) {
            if stat.saved_hours > best.map_or(0.0, |(_, hours)| hours) {
                best = Some((weekday, stat.saved_hours));
            }
        }
        best
    }

    fn week_of(&self, day: NaiveDate) -> Vec<DailyStat> {
        let stats = self.daily_stats();
        week_keys(day)
            .into_iter()
            .map(|key| {
                stats
                    .iter()
                    .find(|s| s.date == key)
                    .cloned()
                    .unwrap_or_else(|| DailyStat::empty(key))
            })
            .collect()
    }

    /// Today's totals and efficiency.
    pub fn total_stats(&self) -> TotalStats {
        TotalStats::from_days(&[self.today_stats()])
    }

    /// Totals across every recorded day.
    pub fn all_time_stats(&self) -> TotalStats {
        TotalStats::from_days(&self.daily_stats())
    }

    /// Accumulate focused time. Non-positive or non-finite amounts are ignored.
    pub fn add_saved_time(&self, hours: f64) -> Result<(), AppError> {
        self.add_time(hours, 0.0)
    }

    /// Accumulate distracted time. Non-positive or non-finite amounts are ignored.
    pub fn add_wasted_time(&self, hours: f64) -> Result<(), AppError> {
        self.add_time(0.0, hours)
    }

    fn add_time(&self, saved: f64, wasted: f64) -> Result<(), AppError> {
        if !is_positive(saved) && !is_positive(wasted) {
            debug!("Ignoring non-positive time: saved={saved}, wasted={wasted}");
            return Ok(());
        }
        {
            let _guard = self.lock_writes();
            self.accumulate_locked(saved, wasted)?;
        }
        self.publish(ChangeKind::Stats);
        Ok(())
    }

    /// Add to today's record. Caller holds the write lock.
    pub(super) fn accumulate_locked(&self, saved: f64, wasted: f64) -> Result<(), AppError> {
        let today = self.today_key();
        let mut stats = self.daily_stats();
        match stats.iter_mut().find(|s| s.date == today) {
            Some(stat) => {
                if is_positive(saved) {
                    stat.saved_hours += saved;
                }
                if is_positive(wasted) {
                    stat.wasted_hours += wasted;
                }
            }
            None => {
                let mut stat = DailyStat::empty(today);
                stat.saved_hours = if is_positive(saved) { saved } else { 0.0 };
                stat.wasted_hours = if is_positive(wasted) { wasted } else { 0.0 };
                stats.push(stat);
            }
        }
        self.write_json(keys::DAILY_STATS, &stats)
    }

    pub fn reset_today_stats(&self) -> Result<(), AppError> {
        {
            let _guard = self.lock_writes();
            let today = self.today_key();
            let mut stats = self.daily_stats();
            stats.retain(|s| s.date != today);
            stats.push(DailyStat::empty(today));
            self.write_json(keys::DAILY_STATS, &stats)?;
        }
        self.publish(ChangeKind::Stats);
        Ok(())
    }
}

/// `YYYY-MM-DD` keys of the Monday-to-Sunday week containing `day`.
pub(super) fn week_keys(day: NaiveDate) -> Vec<String> {
    let offset = u64::from(day.weekday().num_days_from_monday());
    let Some(monday) = day.checked_sub_days(Days::new(offset)) else {
        return Vec::new();
    };
    monday.iter_days().take(7).map(day_key).collect()
}

fn week_days() -> [Weekday; 7] {
    [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ]
}

#[cfg(test)]
mod tests {
    use crate::bus::ChangeKind;
    use crate::clock::{day_key, Clock};
    use crate::constants::keys;
    use crate::models::Settings;
    use crate::test_utils::setup_store;
    use chrono::{Datelike, Weekday};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_time_accumulates_additively() {
        let t = setup_store();
        t.store.add_saved_time(1.0).unwrap();
        t.store.add_saved_time(0.5).unwrap();
        t.store.add_wasted_time(0.25).unwrap();

        let today = t.store.today_stats();
        assert!(approx(today.saved_hours, 1.5));
        assert!(approx(today.wasted_hours, 0.25));
        assert_eq!(t.store.daily_stats().len(), 1);
    }

    #[test]
    fn test_invalid_amounts_are_ignored() {
        let t = setup_store();
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        t.bus.subscribe(ChangeKind::Stats, move || {
            c.fetch_add(1, Ordering::SeqCst);
        });

        t.store.add_saved_time(0.0).unwrap();
        t.store.add_saved_time(-2.0).unwrap();
        t.store.add_wasted_time(f64::NAN).unwrap();

        assert!(t.store.daily_stats().is_empty());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reset_today_stats() {
        let t = setup_store();
        t.store.add_saved_time(2.0).unwrap();
        t.store.reset_today_stats().unwrap();
        let today = t.store.today_stats();
        assert!(approx(today.saved_hours, 0.0));
        assert_eq!(t.store.daily_stats().len(), 1);
    }

    #[test]
    fn test_day_rollover_starts_new_record() {
        let t = setup_store();
        t.store.add_saved_time(1.0).unwrap();
        t.clock.advance_secs(24 * 3600);
        t.store.add_saved_time(2.0).unwrap();

        assert_eq!(t.store.daily_stats().len(), 2);
        assert!(approx(t.store.today_stats().saved_hours, 2.0));
        let totals = t.store.all_time_stats();
        assert!(approx(totals.saved_hours, 3.0));
        assert_eq!(totals.efficiency, 100);

        t.store.add_wasted_time(2.0).unwrap();
        let today = t.store.total_stats();
        assert!(approx(today.saved_hours, 2.0));
        assert_eq!(today.efficiency, 50);
    }

    #[test]
    fn test_weekly_stats_cover_monday_to_sunday() {
        let t = setup_store();
        t.store.add_saved_time(3.0).unwrap();

        let week = t.store.weekly_stats();
        assert_eq!(week.len(), 7);
        let monday = chrono::NaiveDate::parse_from_str(&week[0].date, "%Y-%m-%d").unwrap();
        assert_eq!(monday.weekday(), Weekday::Mon);
        assert!(week.iter().any(|s| s.date == day_key(t.clock.today())));
        assert!(approx(t.store.weekly_focus_hours(), 3.0));
        assert!(approx(t.store.previous_week_focus_hours(), 0.0));

        let (day, hours) = t.store.best_productive_day().unwrap();
        assert_eq!(day, t.clock.today().weekday());
        assert!(approx(hours, 3.0));
    }

    #[test]
    fn test_month_stats_filters_and_sorts() {
        let t = setup_store();
        t.cache.set(
            keys::DAILY_STATS,
            r#"[
                {"date":"2024-01-20","savedHours":1,"wastedHours":0},
                {"date":"2024-02-01","savedHours":1,"wastedHours":0},
                {"date":"2024-01-03","savedHours":2,"wastedHours":1}
            ]"#,
        );
        let january: Vec<String> = t.store.month_stats(2024, 1).into_iter().map(|s| s.date).collect();
        assert_eq!(january, vec!["2024-01-03", "2024-01-20"]);
        assert!(approx(t.store.stats_for("2024-01-03").wasted_hours, 1.0));
        assert!(approx(t.store.stats_for("1999-01-01").saved_hours, 0.0));
    }

    #[test]
    fn test_time_limit() {
        let t = setup_store();
        assert!(t.store.remaining_minutes().is_none());
        t.store
            .save_settings(&Settings {
                daily_time_limit_enabled: true,
                daily_time_limit_minutes: 60,
                ..Settings::default()
            })
            .unwrap();

        t.store.add_app_usage(59.0).unwrap();
        assert!(!t.store.is_time_limit_exceeded());
        assert!(approx(t.store.remaining_minutes().unwrap(), 1.0));

        t.store.add_app_usage(2.0).unwrap();
        assert!(t.store.is_time_limit_exceeded());
        assert!(approx(t.store.remaining_minutes().unwrap(), 0.0));
    }

    #[test]
    fn test_app_usage_resets_next_day() {
        let t = setup_store();
        t.store.add_app_usage(30.0).unwrap();
        t.store.add_app_usage(-5.0).unwrap();
        assert!(approx(t.store.daily_app_usage().minutes, 30.0));

        t.clock.advance_secs(24 * 3600);
        assert!(approx(t.store.daily_app_usage().minutes, 0.0));
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let t = setup_store();
        let bad = Settings {
            default_focus_duration: 0,
            ..Settings::default()
        };
        assert!(t.store.save_settings(&bad).is_err());
        assert_eq!(t.store.settings(), Settings::default());
    }
}
