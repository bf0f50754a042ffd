use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use super::bucket::Bucket;
use super::calendar::Calendar;
use super::frequency::Frequency;
use crate::error::{Error, Result};

/// Immutable description of how timestamps map onto buckets
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrequencyConfig {
    statistic: Frequency,
    output: Frequency,
    time_step_minutes: u32,
    calendar: Calendar,
    rolling_output: bool,
}

impl FrequencyConfig {
    /// Validate and build a frequency configuration.
    ///
    /// The time step must tile the statistic frequency exactly (for
    /// month-based frequencies, it must tile a day). Batched output needs an
    /// output frequency at least as coarse as the statistic frequency;
    /// rolling output needs one at most as coarse.
    pub fn new(
        statistic: Frequency,
        output: Frequency,
        time_step_minutes: u32,
        calendar: Calendar,
        rolling_output: bool,
    ) -> Result<Self> {
        if time_step_minutes == 0 {
            return Err(Error::InvalidConfig("time_step_minutes must be positive".into()));
        }
        let tile = statistic.fixed_minutes().unwrap_or(1440);
        if tile % time_step_minutes as i64 != 0 {
            return Err(Error::InvalidConfig(format!(
                "a time step of {} minutes does not evenly divide a {} period",
                time_step_minutes, statistic
            )));
        }
        if rolling_output && output > statistic {
            return Err(Error::InvalidConfig(format!(
                "rolling output frequency {} must not be coarser than statistic frequency {}",
                output, statistic
            )));
        }
        if !rolling_output && output < statistic {
            return Err(Error::InvalidConfig(format!(
                "output frequency {} must not be finer than statistic frequency {}",
                output, statistic
            )));
        }

        Ok(Self {
            statistic,
            output,
            time_step_minutes,
            calendar,
            rolling_output,
        })
    }

    pub fn statistic(&self) -> Frequency {
        self.statistic
    }

    pub fn output(&self) -> Frequency {
        self.output
    }

    pub fn time_step_minutes(&self) -> u32 {
        self.time_step_minutes
    }

    pub fn calendar(&self) -> Calendar {
        self.calendar
    }

    pub fn rolling_output(&self) -> bool {
        self.rolling_output
    }

    /// Human-readable form of the fields that change bucket semantics
    pub fn describe(&self) -> String {
        format!(
            "statistic={} output={} step={}m calendar={}",
            self.statistic, self.output, self.time_step_minutes, self.calendar
        )
    }

    /// Stable 64-bit fingerprint of [`describe`](Self::describe)
    pub fn fingerprint(&self) -> u64 {
        xxh3_64(self.describe().as_bytes())
    }
}

/// Where a timestamp falls within its statistic period
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Placement {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    /// Whether this is the last time step expected before `end`
    pub is_final: bool,
}

/// Turns timestamps into buckets and output periods
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use onepass::buckets::{Calendar, Frequency, FrequencyConfig, FrequencyManager};
///
/// let config = FrequencyConfig::new(Frequency::Daily, Frequency::Daily, 60, Calendar::Gregorian, false).unwrap();
/// let manager = FrequencyManager::new(config);
///
/// let last_hour = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap().and_hms_opt(23, 0, 0).unwrap();
/// let placement = manager.place(last_hour).unwrap();
/// assert!(placement.is_final);
/// assert_eq!(manager.open_bucket(&placement).expected, 24);
/// ```
#[derive(Clone, Debug)]
pub struct FrequencyManager {
    config: FrequencyConfig,
}

impl FrequencyManager {
    pub fn new(config: FrequencyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FrequencyConfig {
        &self.config
    }

    fn minutes(&self, timestamp: NaiveDateTime) -> i64 {
        self.config.calendar.minutes_since_epoch(timestamp)
    }

    fn step(&self) -> i64 {
        self.config.time_step_minutes as i64
    }

    /// Bucket bounds for a timestamp, and whether it is the bucket's final step
    pub fn place(&self, timestamp: NaiveDateTime) -> Result<Placement> {
        self.config.calendar.validate(timestamp)?;
        let (start, end) = self.config.statistic.bounds(timestamp, self.config.calendar)?;
        let is_final = self.minutes(timestamp) + self.step() >= self.minutes(end);
        Ok(Placement { start, end, is_final })
    }

    /// Fresh, empty bucket for a placement
    pub fn open_bucket(&self, placement: &Placement) -> Bucket {
        Bucket::new(
            placement.start,
            placement.end,
            self.config.statistic,
            self.expected_increments(placement.start, placement.end),
        )
    }

    pub fn expected_increments(&self, start: NaiveDateTime, end: NaiveDateTime) -> u64 {
        ((self.minutes(end) - self.minutes(start)) / self.step()).max(0) as u64
    }

    /// Number of whole time steps from `start` up to `timestamp`
    pub fn leading_steps(&self, start: NaiveDateTime, timestamp: NaiveDateTime) -> u64 {
        ((self.minutes(timestamp) - self.minutes(start)) / self.step()).max(0) as u64
    }

    /// Time steps missing between two consecutive increments.
    ///
    /// Consecutive increments must sit a whole number of steps apart. When
    /// `limit` is set, more than `limit` missing steps is a `GapDetected` error.
    pub fn missing_steps(
        &self,
        previous: NaiveDateTime,
        next: NaiveDateTime,
        limit: Option<u32>,
    ) -> Result<u64> {
        let diff = self.minutes(next) - self.minutes(previous);
        if diff <= 0 || diff % self.step() != 0 {
            return Err(Error::InvalidTimestamp {
                timestamp: next,
                reason: format!(
                    "{} minutes after the previous increment at {}, not a multiple of the {} minute time step",
                    diff,
                    previous,
                    self.step()
                ),
            });
        }

        let missing = (diff / self.step() - 1) as u64;
        if let Some(limit) = limit {
            if missing > limit as u64 {
                return Err(Error::GapDetected {
                    previous,
                    next,
                    missing,
                    limit,
                });
            }
        }
        Ok(missing)
    }

    /// Output period `[start, end)` containing a timestamp
    pub fn output_period(&self, timestamp: NaiveDateTime) -> Result<(NaiveDateTime, NaiveDateTime)> {
        self.config.output.bounds(timestamp, self.config.calendar)
    }

    /// In rolling mode, the output period that closes with this time step,
    /// if it closes strictly before the bucket does.
    pub fn rolling_boundary(
        &self,
        timestamp: NaiveDateTime,
        bucket_end: NaiveDateTime,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>> {
        if !self.config.rolling_output {
            return Ok(None);
        }
        let (start, end) = self.output_period(timestamp)?;
        let closes = self.minutes(timestamp) + self.step() >= self.minutes(end);
        Ok((closes && end < bucket_end).then_some((start, end)))
    }

    /// In rolling mode, output periods that closed between the increment at
    /// `cursor` and the one at `timestamp` without either closing them.
    ///
    /// Only periods ending strictly before `bucket_end` are returned, oldest
    /// first.
    pub fn skipped_boundaries(
        &self,
        cursor: NaiveDateTime,
        timestamp: NaiveDateTime,
        bucket_end: NaiveDateTime,
    ) -> Result<Vec<(NaiveDateTime, NaiveDateTime)>> {
        let mut skipped = Vec::new();
        if !self.config.rolling_output {
            return Ok(skipped);
        }

        let (mut start, mut end) = self.output_period(cursor)?;
        while end <= timestamp && end < bucket_end {
            // the cursor's own closing step already emitted this one
            let closed = self.minutes(cursor) + self.step() >= self.minutes(end);
            if !closed {
                skipped.push((start, end));
            }
            (start, end) = self.output_period(end)?;
        }
        Ok(skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, m, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn manager(statistic: Frequency, output: Frequency, step: u32, rolling: bool) -> FrequencyManager {
        FrequencyManager::new(
            FrequencyConfig::new(statistic, output, step, Calendar::Gregorian, rolling).unwrap(),
        )
    }

    // ---- Validation ----

    #[test]
    fn test_step_must_tile_period() {
        let bad = FrequencyConfig::new(Frequency::Hourly, Frequency::Hourly, 45, Calendar::Gregorian, false);
        assert!(matches!(bad, Err(Error::InvalidConfig(_))));
        let bad = FrequencyConfig::new(Frequency::Monthly, Frequency::Monthly, 0, Calendar::Gregorian, false);
        assert!(bad.is_err());
        let ok = FrequencyConfig::new(Frequency::Monthly, Frequency::Monthly, 360, Calendar::NoLeap, false);
        assert!(ok.is_ok());
    }

    #[test]
    fn test_output_ordering() {
        assert!(FrequencyConfig::new(Frequency::Daily, Frequency::Hourly, 60, Calendar::Gregorian, false).is_err());
        assert!(FrequencyConfig::new(Frequency::Daily, Frequency::Monthly, 60, Calendar::Gregorian, true).is_err());
        assert!(FrequencyConfig::new(Frequency::Monthly, Frequency::Weekly, 60, Calendar::Gregorian, true).is_ok());
    }

    #[test]
    fn test_fingerprint_ignores_rolling_only() {
        let a = FrequencyConfig::new(Frequency::Daily, Frequency::Daily, 60, Calendar::Gregorian, false).unwrap();
        let b = FrequencyConfig::new(Frequency::Daily, Frequency::Daily, 60, Calendar::NoLeap, false).unwrap();
        let c = FrequencyConfig::new(Frequency::Daily, Frequency::Daily, 30, Calendar::Gregorian, false).unwrap();
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    // ---- Placement ----

    #[test]
    fn test_final_step() {
        let m = manager(Frequency::Daily, Frequency::Daily, 60, false);
        assert!(!m.place(at(1, 1, 22)).unwrap().is_final);
        assert!(m.place(at(1, 1, 23)).unwrap().is_final);

        let m = manager(Frequency::Monthly, Frequency::Monthly, 1440, false);
        let feb = m.place(at(2, 29, 0)).unwrap();
        assert!(feb.is_final);
        assert_eq!(m.open_bucket(&feb).expected, 29);
    }

    #[test]
    fn test_offset_timestamps() {
        // half-hour stamps on an hourly grid
        let m = manager(Frequency::Daily, Frequency::Daily, 60, false);
        let ts = at(1, 1, 23) + chrono::Duration::minutes(30);
        assert!(m.place(ts).unwrap().is_final);
        assert_eq!(m.leading_steps(at(1, 1, 0), at(1, 1, 0) + chrono::Duration::minutes(30)), 0);
    }

    // ---- Gaps ----

    #[test]
    fn test_missing_steps() {
        let m = manager(Frequency::Daily, Frequency::Daily, 60, false);
        assert_eq!(m.missing_steps(at(1, 1, 0), at(1, 1, 1), None).unwrap(), 0);
        assert_eq!(m.missing_steps(at(1, 1, 0), at(1, 1, 4), None).unwrap(), 3);
        assert!(matches!(
            m.missing_steps(at(1, 1, 0), at(1, 1, 4), Some(2)),
            Err(Error::GapDetected { missing: 3, limit: 2, .. })
        ));
        let off_grid = at(1, 1, 1) + chrono::Duration::minutes(20);
        assert!(matches!(
            m.missing_steps(at(1, 1, 0), off_grid, None),
            Err(Error::InvalidTimestamp { .. })
        ));
    }

    // ---- Output periods ----

    #[test]
    fn test_rolling_boundary() {
        let m = manager(Frequency::Monthly, Frequency::Weekly, 1440, true);
        let (_, month_end) = Frequency::Monthly.bounds(at(1, 1, 0), Calendar::Gregorian).unwrap();
        // 2024-01-07 is a Sunday, closing the week that started Monday 1 January
        let boundary = m.rolling_boundary(at(1, 7, 0), month_end).unwrap();
        assert_eq!(boundary, Some((at(1, 1, 0), at(1, 8, 0))));
        assert_eq!(m.rolling_boundary(at(1, 6, 0), month_end).unwrap(), None);
        // the week straddling month end is closed by the bucket, not the boundary
        assert_eq!(m.rolling_boundary(at(1, 31, 0), month_end).unwrap(), None);

        let batched = manager(Frequency::Daily, Frequency::Monthly, 60, false);
        assert_eq!(batched.rolling_boundary(at(1, 31, 23), month_end).unwrap(), None);
    }

    #[test]
    fn test_skipped_boundaries() {
        let m = manager(Frequency::Monthly, Frequency::Weekly, 1440, true);
        let (_, month_end) = Frequency::Monthly.bounds(at(1, 1, 0), Calendar::Gregorian).unwrap();

        // Jan 7 never arrived, so nothing closed the first week
        let skipped = m.skipped_boundaries(at(1, 6, 0), at(1, 9, 0), month_end).unwrap();
        assert_eq!(skipped, vec![(at(1, 1, 0), at(1, 8, 0))]);

        // Jan 7 closed it already
        assert!(m.skipped_boundaries(at(1, 7, 0), at(1, 9, 0), month_end).unwrap().is_empty());

        // a long gap skips several weeks
        let skipped = m.skipped_boundaries(at(1, 2, 0), at(1, 24, 0), month_end).unwrap();
        assert_eq!(
            skipped,
            vec![
                (at(1, 1, 0), at(1, 8, 0)),
                (at(1, 8, 0), at(1, 15, 0)),
                (at(1, 15, 0), at(1, 22, 0)),
            ]
        );

        // the week straddling month end belongs to the flush
        let skipped = m.skipped_boundaries(at(1, 27, 0), at(2, 6, 0), month_end).unwrap();
        assert_eq!(skipped, vec![(at(1, 22, 0), at(1, 29, 0))]);
        assert!(m.skipped_boundaries(at(1, 28, 0), at(2, 6, 0), month_end).unwrap().is_empty());

        let batched = manager(Frequency::Daily, Frequency::Monthly, 60, false);
        assert!(batched.skipped_boundaries(at(1, 2, 0), at(3, 1, 0), month_end).unwrap().is_empty());
    }
}
