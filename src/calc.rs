use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::BTreeMap;

/// Half-up rounding to a whole percent, matching what the dashboards display:
/// `Int(x + 0.5)`
pub fn round_half_up(x: f64) -> i64 {
    (x + 0.5).floor() as i64
}

/// Half-up rounding to one decimal place:
/// `Int(10*x + 0.5) / 10`
pub fn round_off_1_decimal(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tally {
    pub present: usize,
    pub total: usize,
}

impl Tally {
    pub fn add(&mut self, present: bool) {
        self.total += 1;
        if present {
            self.present += 1;
        }
    }

    pub fn merge(&mut self, other: Tally) {
        self.present += other.present;
        self.total += other.total;
    }

    pub fn absent(&self) -> usize {
        self.total - self.present
    }

    fn ratio(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        100.0 * (self.present as f64) / (self.total as f64)
    }

    /// Whole-number attendance rate; 0 when nothing has been recorded.
    pub fn percent(&self) -> i64 {
        round_half_up(self.ratio())
    }

    /// Attendance rate with one decimal, as shown on the dashboard headline.
    pub fn percent_1dp(&self) -> f64 {
        round_off_1_decimal(self.ratio())
    }
}

impl FromIterator<bool> for Tally {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        let mut t = Tally::default();
        for present in iter {
            t.add(present);
        }
        t
    }
}

/// Scans a date-ordered presence history for `threshold` absences in a row.
///
/// Returns the index of the record that completes the first such run.
pub fn first_absence_run(history: &[bool], threshold: usize) -> Option<usize> {
    if threshold == 0 || history.len() < threshold {
        return None;
    }
    let mut consecutive = 0usize;
    for (i, present) in history.iter().enumerate() {
        if *present {
            consecutive = 0;
            continue;
        }
        consecutive += 1;
        if consecutive == threshold {
            return Some(i);
        }
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

pub fn risk_level(rate: i64, high_below: i64, medium_below: i64) -> RiskLevel {
    if rate < high_below {
        RiskLevel::High
    } else if rate < medium_below {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Week bucket key `YYYY-Www`. Weeks start on Sunday and week 1 is the
/// (possibly partial) week containing January 1st.
pub fn week_key(date: NaiveDate) -> String {
    let day_of_year = date.ordinal0() as i64;
    let weekday = date.weekday().num_days_from_sunday() as i64;
    let jan1_weekday = (weekday - day_of_year).rem_euclid(7);
    let week = (day_of_year + jan1_weekday + 1 + 6) / 7;
    format!("{}-W{:02}", date.year(), week)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekBucket {
    pub week: String,
    pub present: usize,
    pub total: usize,
    pub percent: i64,
}

pub fn weekly_trend<I>(records: I) -> Vec<WeekBucket>
where
    I: IntoIterator<Item = (NaiveDate, bool)>,
{
    let mut by_week: BTreeMap<String, Tally> = BTreeMap::new();
    for (date, present) in records {
        by_week.entry(week_key(date)).or_default().add(present);
    }
    by_week
        .into_iter()
        .map(|(week, t)| WeekBucket {
            week,
            present: t.present,
            total: t.total,
            percent: t.percent(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        parse_date(s).expect("valid date")
    }

    #[test]
    fn percent_rounds_half_up_and_handles_empty() {
        assert_eq!(Tally::default().percent(), 0);
        assert_eq!(Tally { present: 1, total: 2 }.percent(), 50);
        assert_eq!(Tally { present: 2, total: 3 }.percent(), 67);
        assert_eq!(Tally { present: 1, total: 8 }.percent(), 13);
        assert_eq!(Tally { present: 1, total: 3 }.percent_1dp(), 33.3);
        assert_eq!(Tally { present: 2, total: 3 }.percent_1dp(), 66.7);
    }

    #[test]
    fn tally_collects_from_presence_flags() {
        let t: Tally = [true, false, false, true, true].into_iter().collect();
        assert_eq!(t.present, 3);
        assert_eq!(t.absent(), 2);
        assert_eq!(t.total, 5);
    }

    #[test]
    fn absence_run_requires_consecutive_days() {
        assert_eq!(first_absence_run(&[false, false], 3), None);
        assert_eq!(first_absence_run(&[false, false, true, false], 3), None);
        assert_eq!(first_absence_run(&[true, false, false, false], 3), Some(3));
        assert_eq!(
            first_absence_run(&[false, false, false, false, false, false], 3),
            Some(2)
        );
        assert_eq!(first_absence_run(&[false, true, false, false, false], 3), Some(4));
        assert_eq!(first_absence_run(&[false], 0), None);
    }

    #[test]
    fn risk_bands_use_strict_lower_bounds() {
        assert_eq!(risk_level(0, 70, 85), RiskLevel::High);
        assert_eq!(risk_level(69, 70, 85), RiskLevel::High);
        assert_eq!(risk_level(70, 70, 85), RiskLevel::Medium);
        assert_eq!(risk_level(84, 70, 85), RiskLevel::Medium);
        assert_eq!(risk_level(85, 70, 85), RiskLevel::Low);
    }

    #[test]
    fn week_keys_start_on_sunday() {
        // 2024-01-01 is a Monday.
        assert_eq!(week_key(d("2024-01-01")), "2024-W01");
        assert_eq!(week_key(d("2024-01-06")), "2024-W01");
        assert_eq!(week_key(d("2024-01-07")), "2024-W02");
        // 2023-01-01 is a Sunday.
        assert_eq!(week_key(d("2023-01-01")), "2023-W01");
        assert_eq!(week_key(d("2023-01-08")), "2023-W02");
        assert_eq!(week_key(d("2024-12-31")), "2024-W53");
    }

    #[test]
    fn weekly_trend_is_sorted_by_week() {
        let trend = weekly_trend(vec![
            (d("2024-01-08"), true),
            (d("2024-01-02"), false),
            (d("2024-01-03"), true),
            (d("2024-01-09"), true),
        ]);
        assert_eq!(trend.len(), 2);
        assert_eq!(trend[0].week, "2024-W01");
        assert_eq!((trend[0].present, trend[0].total, trend[0].percent), (1, 2, 50));
        assert_eq!(trend[1].week, "2024-W02");
        assert_eq!(trend[1].percent, 100);
    }

    #[test]
    fn parse_date_rejects_other_formats() {
        assert!(parse_date("2024-02-29").is_some());
        assert!(parse_date("2023-02-29").is_none());
        assert!(parse_date("02/03/2024").is_none());
        assert!(parse_date("").is_none());
    }
}
