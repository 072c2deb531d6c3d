// virtchan - Virtual time-series channels
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Calendar period grouping of timestamps
//!
//! [`PeriodGrouper`] reduces an ascending timestamp sequence to one
//! representative per period bucket: the latest timestamp inside the
//! bucket. Buckets are computed in UTC.

use crate::error::EngineError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Grouping period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Quarter,
    Year,
}

impl GroupBy {
    /// All periods, finest first
    pub const ALL: [GroupBy; 8] = [
        GroupBy::Second,
        GroupBy::Minute,
        GroupBy::Hour,
        GroupBy::Day,
        GroupBy::Week,
        GroupBy::Month,
        GroupBy::Quarter,
        GroupBy::Year,
    ];

    /// Bucket identifier of `ts`. Equal keys mean the same period.
    pub fn bucket(&self, ts: i64) -> i64 {
        match self {
            GroupBy::Second => ts.div_euclid(1_000),
            GroupBy::Minute => ts.div_euclid(60_000),
            GroupBy::Hour => ts.div_euclid(3_600_000),
            GroupBy::Day => ts.div_euclid(86_400_000),
            GroupBy::Week | GroupBy::Month | GroupBy::Quarter | GroupBy::Year => {
                match DateTime::<Utc>::from_timestamp_millis(ts) {
                    Some(dt) => self.calendar_bucket(&dt),
                    // out of chrono's range, fall back to days
                    None => ts.div_euclid(86_400_000),
                }
            }
        }
    }

    fn calendar_bucket(&self, dt: &DateTime<Utc>) -> i64 {
        let year = dt.year() as i64;
        let month0 = dt.month0() as i64;
        match self {
            GroupBy::Week => {
                let week = dt.iso_week();
                week.year() as i64 * 100 + week.week() as i64
            }
            GroupBy::Month => year * 12 + month0,
            GroupBy::Quarter => year * 4 + month0 / 3,
            _ => year,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            GroupBy::Second => "second",
            GroupBy::Minute => "minute",
            GroupBy::Hour => "hour",
            GroupBy::Day => "day",
            GroupBy::Week => "week",
            GroupBy::Month => "month",
            GroupBy::Quarter => "quarter",
            GroupBy::Year => "year",
        }
    }
}

impl fmt::Display for GroupBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupBy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        GroupBy::ALL
            .iter()
            .copied()
            .find(|g| g.as_str() == lower)
            .ok_or_else(|| EngineError::Config(format!("Unknown group period: {}", s)))
    }
}

/// Keeps the latest timestamp of each period bucket.
///
/// Single forward pass with one timestamp of look-ahead: a bucket's
/// survivor is only known once a timestamp of the next bucket (or the end
/// of input) has been seen.
pub struct PeriodGrouper<I> {
    inner: I,
    period: GroupBy,
    pending: Option<(i64, i64)>,
}

impl<I: Iterator<Item = i64>> PeriodGrouper<I> {
    pub fn new(inner: I, period: GroupBy) -> Self {
        Self {
            inner,
            period,
            pending: None,
        }
    }

    pub fn period(&self) -> GroupBy {
        self.period
    }

    /// Access the wrapped sequence
    pub fn inner_mut(&mut self) -> &mut I {
        &mut self.inner
    }
}

impl<I: Iterator<Item = i64>> Iterator for PeriodGrouper<I> {
    type Item = i64;

    fn next(&mut self) -> Option<i64> {
        loop {
            let Some(ts) = self.inner.next() else {
                return self.pending.take().map(|(_, ts)| ts);
            };
            let bucket = self.period.bucket(ts);

            match self.pending.replace((bucket, ts)) {
                Some((pending_bucket, survivor)) if pending_bucket != bucket => {
                    return Some(survivor);
                }
                _ => {}
            }
        }
    }
}
