//! Statistic and output frequencies

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::calendar::Calendar;
use crate::error::{Error, Result};

/// Accumulation or output cadence, ordered from finest to coarsest
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Frequency {
    #[serde(rename = "hourly")]
    Hourly,
    #[serde(rename = "3hourly")]
    ThreeHourly,
    #[serde(rename = "6hourly")]
    SixHourly,
    #[serde(rename = "12hourly")]
    TwelveHourly,
    #[serde(rename = "daily")]
    Daily,
    #[serde(rename = "weekly")]
    Weekly,
    #[serde(rename = "monthly")]
    Monthly,
    #[serde(rename = "3monthly")]
    ThreeMonthly,
    #[serde(rename = "annual", alias = "annually", alias = "yearly")]
    Annual,
}

/// 1970-01-01 was a Thursday; shifting by three days puts week starts on Monday.
const WEEK_OFFSET_MINUTES: i64 = 3 * 1440;

impl Frequency {
    pub const ALL: [Frequency; 9] = [
        Frequency::Hourly,
        Frequency::ThreeHourly,
        Frequency::SixHourly,
        Frequency::TwelveHourly,
        Frequency::Daily,
        Frequency::Weekly,
        Frequency::Monthly,
        Frequency::ThreeMonthly,
        Frequency::Annual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Hourly => "hourly",
            Frequency::ThreeHourly => "3hourly",
            Frequency::SixHourly => "6hourly",
            Frequency::TwelveHourly => "12hourly",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::ThreeMonthly => "3monthly",
            Frequency::Annual => "annual",
        }
    }

    /// Length in minutes for frequencies that do not depend on the calendar
    pub fn fixed_minutes(&self) -> Option<i64> {
        match self {
            Frequency::Hourly => Some(60),
            Frequency::ThreeHourly => Some(180),
            Frequency::SixHourly => Some(360),
            Frequency::TwelveHourly => Some(720),
            Frequency::Daily => Some(1440),
            Frequency::Weekly => Some(7 * 1440),
            _ => None,
        }
    }

    /// Span in calendar months for month-based frequencies
    pub fn months(&self) -> Option<u32> {
        match self {
            Frequency::Monthly => Some(1),
            Frequency::ThreeMonthly => Some(3),
            Frequency::Annual => Some(12),
            _ => None,
        }
    }

    /// The period `[start, end)` of this frequency containing `timestamp`.
    ///
    /// Fixed-length periods are aligned by euclidean division of the minutes
    /// elapsed since the epoch; weekly periods start on Monday. Month-based
    /// periods start on the first of the month, with quarters starting in
    /// January, April, July and October.
    pub fn bounds(
        &self,
        timestamp: NaiveDateTime,
        calendar: Calendar,
    ) -> Result<(NaiveDateTime, NaiveDateTime)> {
        let out_of_range = || Error::InvalidTimestamp {
            timestamp,
            reason: format!("{} period is outside the representable date range", self),
        };

        if let Some(length) = self.fixed_minutes() {
            let offset = if *self == Frequency::Weekly { WEEK_OFFSET_MINUTES } else { 0 };
            let minutes = calendar.minutes_since_epoch(timestamp) + offset;
            let start = minutes.div_euclid(length) * length - offset;
            let start_ts = calendar.from_minutes(start).ok_or_else(out_of_range)?;
            let end_ts = calendar.from_minutes(start + length).ok_or_else(out_of_range)?;
            return Ok((start_ts, end_ts));
        }

        let span = self.months().unwrap_or(12);
        let month0 = timestamp.month0() / span * span;
        let start = calendar
            .month_start(timestamp.year(), month0 + 1, 0)
            .ok_or_else(out_of_range)?;
        let end = calendar
            .month_start(timestamp.year(), month0 + 1, span as i64)
            .ok_or_else(out_of_range)?;
        Ok((start, end))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "annually" | "yearly" => return Ok(Frequency::Annual),
            _ => {}
        }
        Frequency::ALL
            .into_iter()
            .find(|f| f.as_str() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown frequency `{}`", s)))
    }
}
