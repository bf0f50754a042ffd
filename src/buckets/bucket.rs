use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::frequency::Frequency;

const LABEL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Lifecycle of a bucket
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BucketState {
    Empty,
    Accumulating,
    Complete,
}

/// One accumulation period `[start, end)` of a statistic frequency
///
/// Besides its bounds, a bucket records how many increments it absorbed
/// against how many the time step implies, how many steps went missing,
/// and whether its first increment arrived after the period had begun.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub frequency: Frequency,
    pub absorbed: u64,
    pub expected: u64,
    pub gaps: u64,
    pub partial: bool,
    pub complete: bool,
    pub last: Option<NaiveDateTime>,
}

impl Bucket {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime, frequency: Frequency, expected: u64) -> Self {
        Self {
            start,
            end,
            frequency,
            absorbed: 0,
            expected,
            gaps: 0,
            partial: false,
            complete: false,
            last: None,
        }
    }

    pub fn state(&self) -> BucketState {
        if self.complete {
            BucketState::Complete
        } else if self.absorbed == 0 {
            BucketState::Empty
        } else {
            BucketState::Accumulating
        }
    }

    pub fn contains(&self, timestamp: NaiveDateTime) -> bool {
        self.start <= timestamp && timestamp < self.end
    }

    /// Increments that never arrived, whether skipped at the start or lost to gaps
    pub fn missing(&self) -> u64 {
        self.expected.saturating_sub(self.absorbed)
    }

    /// Record one absorbed increment.
    ///
    /// `skipped` is the number of time steps between the previous increment
    /// (or the bucket start, for the first one) and this one. The bucket is
    /// complete only once its final step arrives with nothing missing.
    pub(crate) fn absorb(&mut self, timestamp: NaiveDateTime, skipped: u64, leading: bool, is_final: bool) {
        if leading {
            self.partial |= skipped > 0;
        } else {
            self.gaps += skipped;
        }
        self.absorbed += 1;
        self.last = Some(timestamp);
        self.complete = is_final && !self.partial && self.gaps == 0;
    }

    /// Stable label used in logs and error context
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}, {})",
            self.frequency,
            self.start.format(LABEL_FORMAT),
            self.end.format(LABEL_FORMAT)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2020, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut bucket = Bucket::new(at(1, 0), at(2, 0), Frequency::Daily, 24);
        assert_eq!(bucket.state(), BucketState::Empty);

        bucket.absorb(at(1, 3), 3, true, false);
        assert_eq!(bucket.state(), BucketState::Accumulating);
        assert!(bucket.partial);
        assert_eq!(bucket.gaps, 0);

        bucket.absorb(at(1, 6), 2, false, false);
        assert_eq!(bucket.gaps, 2);

        bucket.absorb(at(1, 23), 16, false, true);
        assert_eq!(bucket.state(), BucketState::Accumulating);
        assert!(!bucket.complete);
        assert_eq!(bucket.absorbed, 3);
        assert_eq!(bucket.missing(), 21);
    }

    #[test]
    fn test_complete_only_without_missing_steps() {
        let mut bucket = Bucket::new(at(1, 0), at(2, 0), Frequency::Daily, 24);
        for h in 0..23 {
            bucket.absorb(at(1, h), 0, h == 0, false);
        }
        bucket.absorb(at(1, 23), 0, false, true);
        assert_eq!(bucket.state(), BucketState::Complete);
        assert_eq!(bucket.missing(), 0);

        // final step reached, but only hours 0, 1 and 23 arrived
        let mut sparse = Bucket::new(at(1, 0), at(2, 0), Frequency::Daily, 24);
        sparse.absorb(at(1, 0), 0, true, false);
        sparse.absorb(at(1, 1), 0, false, false);
        sparse.absorb(at(1, 23), 21, false, true);
        assert!(!sparse.complete);
        assert_eq!(sparse.gaps, 21);

        // late start, then every remaining step
        let mut late = Bucket::new(at(1, 0), at(2, 0), Frequency::Daily, 24);
        late.absorb(at(1, 22), 22, true, false);
        late.absorb(at(1, 23), 0, false, true);
        assert!(late.partial);
        assert!(!late.complete);
    }

    #[test]
    fn test_label() {
        let bucket = Bucket::new(at(1, 0), at(2, 0), Frequency::Daily, 24);
        assert_eq!(bucket.label(), "daily[2020-01-01T00:00:00, 2020-01-02T00:00:00)");
        assert!(bucket.contains(at(1, 23)));
        assert!(!bucket.contains(at(2, 0)));
    }
}
