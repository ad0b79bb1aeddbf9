//! Ledger row and reporting types.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Sync state for one external client ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    pub id: i64,
    pub echis_id: String,
    pub tracked_entity: String,
    pub event_id: String,
    pub org_unit: String,
    pub event_date: Option<DateTime<Utc>>,
    /// Conflict text from the create call; empty when none.
    pub client_creation_errors: String,
    /// Set once every primary result update succeeded. Never reset.
    pub results_updated: bool,
    /// Conflict text from the most recent result update attempt.
    pub results_update_errors: String,
    pub lab_enrollment: String,
    pub lab_event: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl SyncLog {
    pub fn has_lab_enrollment(&self) -> bool {
        !self.lab_enrollment.is_empty()
    }

    pub fn has_lab_event(&self) -> bool {
        !self.lab_event.is_empty()
    }
}

/// Values known when the registry create call returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSyncLog {
    pub echis_id: String,
    pub tracked_entity: String,
    pub event_id: String,
    pub org_unit: String,
    pub event_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_creation_errors: String,
}

/// Per-day counts of created rows and of rows with results pushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    pub day: NaiveDate,
    pub created: i64,
    pub results_updated: i64,
}

/// First day of a `days`-long window ending on `today`.
pub(crate) fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(days.saturating_sub(1))))
        .unwrap_or(NaiveDate::MIN)
}

/// Expands sparse per-day counts into a contiguous, oldest-first series.
pub(crate) fn fill_days(
    today: NaiveDate,
    days: u32,
    counts: &HashMap<NaiveDate, (i64, i64)>,
) -> Vec<DailyActivity> {
    if days == 0 {
        return Vec::new();
    }
    window_start(today, days)
        .iter_days()
        .take(days as usize)
        .map(|day| {
            let (created, results_updated) = counts.get(&day).copied().unwrap_or((0, 0));
            DailyActivity {
                day,
                created,
                results_updated,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_fill_days_zero_fills_oldest_first() {
        let mut counts = HashMap::new();
        counts.insert(date(2025, 2, 27), (3, 1));
        counts.insert(date(2025, 3, 1), (2, 2));

        let series = fill_days(date(2025, 3, 1), 4, &counts);
        let days: Vec<_> = series.iter().map(|a| a.day).collect();
        assert_eq!(
            days,
            vec![
                date(2025, 2, 26),
                date(2025, 2, 27),
                date(2025, 2, 28),
                date(2025, 3, 1)
            ]
        );
        assert_eq!(series[0].created, 0);
        assert_eq!(series[1].created, 3);
        assert_eq!(series[1].results_updated, 1);
        assert_eq!(series[3].results_updated, 2);
    }

    #[test]
    fn test_fill_days_empty_window() {
        assert!(fill_days(date(2025, 3, 1), 0, &HashMap::new()).is_empty());
        assert_eq!(window_start(date(2025, 3, 1), 1), date(2025, 3, 1));
    }
}
