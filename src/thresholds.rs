//! Historical threshold resolution
//!
//! Looks up the (FTP, FTHR) pair that governs an activity date from the
//! historical threshold table: the highest FTP inside the lookback window
//! wins, with ties broken by the most recent date. Callers fall back to
//! the configured defaults when nothing resolves.

use chrono::{Days, NaiveDate};

/// One row of the historical threshold table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdRecord {
    pub date: NaiveDate,
    pub ftp: f64,
    pub fthr: f64,
}

pub struct ThresholdResolver {
    window_days: i64,
}

impl ThresholdResolver {
    pub fn new(window_days: i64) -> Self {
        ThresholdResolver { window_days }
    }

    /// Resolve the thresholds in force on `activity_date`
    pub fn resolve(
        &self,
        records: Option<&[ThresholdRecord]>,
        activity_date: NaiveDate,
    ) -> (Option<f64>, Option<f64>) {
        let records = match records {
            Some(records) if !records.is_empty() => records,
            _ => return (None, None),
        };

        let window_start = activity_date
            .checked_sub_days(Days::new(self.window_days.max(0) as u64))
            .unwrap_or(activity_date);

        let mut best: Option<&ThresholdRecord> = None;
        for record in records {
            if record.date < window_start || record.date > activity_date {
                continue;
            }
            best = match best {
                None => Some(record),
                Some(current) => {
                    if record.ftp > current.ftp
                        || (record.ftp == current.ftp && record.date > current.date)
                    {
                        Some(record)
                    } else {
                        Some(current)
                    }
                }
            };
        }

        match best {
            Some(record) => {
                let fthr = if record.fthr.is_finite() {
                    Some(record.fthr)
                } else {
                    None
                };
                (Some(record.ftp), fthr)
            }
            None => (None, None),
        }
    }
}
