//! Calendar conventions
//!
//! All bucket arithmetic happens in whole minutes elapsed since
//! 1970-01-01T00:00 *in the configured calendar*. Under the noleap
//! convention every year has 365 days, so a model year is always
//! 525 600 minutes long and 29 February does not exist.

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MINUTES_PER_DAY: i64 = 1440;
/// `num_days_from_ce` of 1970-01-01
const EPOCH_DAYS_FROM_CE: i64 = 719_163;
/// Days before the first of each month in a 365-day year
const NOLEAP_CUMULATIVE: [i64; 13] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334, 365];

/// Calendar used to interpret timestamps
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calendar {
    /// Proleptic Gregorian with leap years
    #[default]
    #[serde(alias = "standard", alias = "proleptic_gregorian")]
    Gregorian,
    /// Fixed 365-day years
    #[serde(alias = "365_day")]
    NoLeap,
}

impl Calendar {
    pub fn as_str(&self) -> &'static str {
        match self {
            Calendar::Gregorian => "gregorian",
            Calendar::NoLeap => "noleap",
        }
    }

    /// Check that a timestamp exists in this calendar and sits on a whole minute.
    pub fn validate(&self, timestamp: NaiveDateTime) -> Result<()> {
        if timestamp.second() != 0 || timestamp.nanosecond() != 0 {
            return Err(Error::InvalidTimestamp {
                timestamp,
                reason: "timestamps must fall on a whole minute".into(),
            });
        }
        if *self == Calendar::NoLeap && timestamp.month() == 2 && timestamp.day() == 29 {
            return Err(Error::InvalidTimestamp {
                timestamp,
                reason: "29 February does not exist in the noleap calendar".into(),
            });
        }
        Ok(())
    }

    /// Minutes elapsed since 1970-01-01T00:00 in this calendar
    pub fn minutes_since_epoch(&self, timestamp: NaiveDateTime) -> i64 {
        let date = timestamp.date();
        let days = match self {
            Calendar::Gregorian => date.num_days_from_ce() as i64 - EPOCH_DAYS_FROM_CE,
            Calendar::NoLeap => {
                (date.year() as i64 - 1970) * 365
                    + NOLEAP_CUMULATIVE[date.month0() as usize]
                    + date.day0() as i64
            }
        };
        days * MINUTES_PER_DAY + timestamp.hour() as i64 * 60 + timestamp.minute() as i64
    }

    /// Inverse of [`minutes_since_epoch`](Self::minutes_since_epoch)
    ///
    /// Returns `None` when the result is outside chrono's representable range.
    pub fn from_minutes(&self, minutes: i64) -> Option<NaiveDateTime> {
        let days = minutes.div_euclid(MINUTES_PER_DAY);
        let minute_of_day = minutes.rem_euclid(MINUTES_PER_DAY);

        let date = match self {
            Calendar::Gregorian => {
                let days_from_ce = i32::try_from(days + EPOCH_DAYS_FROM_CE).ok()?;
                NaiveDate::from_num_days_from_ce_opt(days_from_ce)?
            }
            Calendar::NoLeap => {
                let year = 1970 + days.div_euclid(365);
                let day_of_year = days.rem_euclid(365);
                let month0 = NOLEAP_CUMULATIVE
                    .iter()
                    .rposition(|&start| start <= day_of_year)?;
                let day = day_of_year - NOLEAP_CUMULATIVE[month0] + 1;
                NaiveDate::from_ymd_opt(
                    i32::try_from(year).ok()?,
                    month0 as u32 + 1,
                    day as u32,
                )?
            }
        };

        date.and_hms_opt((minute_of_day / 60) as u32, (minute_of_day % 60) as u32, 0)
    }

    /// Midnight on the first day of a month, after stepping `months` forward
    /// from (`year`, `month`).
    pub fn month_start(&self, year: i32, month: u32, months: i64) -> Option<NaiveDateTime> {
        let index = year as i64 * 12 + (month as i64 - 1) + months;
        let year = i32::try_from(index.div_euclid(12)).ok()?;
        let month = index.rem_euclid(12) as u32 + 1;
        NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
    }

    pub fn days_in_month(&self, year: i32, month: u32) -> u32 {
        match month {
            4 | 6 | 9 | 11 => 30,
            2 => match self {
                Calendar::Gregorian if is_leap_year(year) => 29,
                _ => 28,
            },
            _ => 31,
        }
    }
}

impl std::fmt::Display for Calendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}
