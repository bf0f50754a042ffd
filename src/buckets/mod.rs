//! Temporal bucketing
//!
//! Maps timestamps onto accumulation periods ("buckets") of a statistic
//! frequency and onto output periods, under a Gregorian or noleap calendar.
//!
//! # Example
//!
//! ```
//! use chrono::{Datelike, NaiveDate, Weekday};
//! use onepass::buckets::{Calendar, Frequency};
//!
//! let ts = NaiveDate::from_ymd_opt(2024, 2, 15).unwrap().and_hms_opt(6, 0, 0).unwrap();
//!
//! let (start, end) = Frequency::Monthly.bounds(ts, Calendar::Gregorian).unwrap();
//! assert_eq!((end - start).num_days(), 29);
//!
//! let (monday, _) = Frequency::Weekly.bounds(ts, Calendar::Gregorian).unwrap();
//! assert_eq!(monday.weekday(), Weekday::Mon);
//! ```

mod bucket;
mod calendar;
mod frequency;
mod manager;

pub use bucket::{Bucket, BucketState};
pub use calendar::Calendar;
pub use frequency::Frequency;
pub use manager::{FrequencyConfig, FrequencyManager, Placement};
