//! Report periods.
//!
//! A run covers the complete period before its run date: the previous
//! Monday to Sunday for a weekly cadence, the previous day for a daily one.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Utc};
use serde::Deserialize;
use std::fmt;

/// How often the substrate triggers the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cadence {
    Daily,
    #[default]
    Weekly,
}

/// Inclusive date range a report covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportPeriod {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// The full period that ended before `run_date`.
    pub fn preceding(cadence: Cadence, run_date: NaiveDate) -> Self {
        match cadence {
            Cadence::Daily => {
                let day = run_date - Duration::days(1);
                Self {
                    start: day,
                    end: day,
                }
            }
            Cadence::Weekly => {
                let since_monday = i64::from(run_date.weekday().num_days_from_monday());
                let end = run_date - Duration::days(since_monday + 1);
                Self {
                    start: end - Duration::days(6),
                    end,
                }
            }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{} to {}", self.start, self.end)
        }
    }
}

/// Calendar date of `at` in the display offset.
pub fn local_date(at: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    at.with_timezone(&offset).date_naive()
}
