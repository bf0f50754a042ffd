//! Weighted t-digest
//!
//! Keeps a sorted run of weighted centroids whose size is limited by an
//! arcsine scale function: centroids near the median may absorb many
//! values, centroids near either tail stay small. Two digests with the same
//! compression merge into one that answers like a digest of the union.
//!
//! Queries never mutate the digest. Buffered values are folded into a
//! temporary view when a quantile is requested, so a digest that was queried
//! (or checkpointed) continues exactly like one that was not.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::bits;
use crate::error::{Error, Result};
use crate::traits::{QuantileSketch, Sketch};

/// Weighted point mass: the mean of the values it absorbed and their total weight
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    #[serde(with = "bits::float")]
    pub mean: f64,
    #[serde(with = "bits::float")]
    pub weight: f64,
}

impl Centroid {
    pub fn new(mean: f64, weight: f64) -> Self {
        Self { mean, weight }
    }

    /// Add a weighted value to the centroid, updating the weighted mean
    pub fn add(&mut self, value: f64, weight: f64) {
        let new_weight = self.weight + weight;
        self.mean += (value - self.mean) * weight / new_weight;
        self.weight = new_weight;
    }
}

/// Mergeable quantile sketch over weighted `f64` values
///
/// `compression` bounds the number of centroids (roughly `compression`
/// after a full compress). 100 keeps the median within about one percent
/// of rank; larger values trade memory for accuracy.
///
/// Non-finite values and non-positive weights are ignored.
///
/// # Example
///
/// ```
/// use onepass::quantiles::TDigest;
/// use onepass::traits::QuantileSketch;
///
/// let mut digest = TDigest::new(100.0);
///
/// for i in 1..=1000 {
///     digest.add(i as f64);
/// }
///
/// let p50 = digest.quantile(0.5).unwrap();
/// assert!(p50 > 450.0 && p50 < 550.0);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TDigest {
    #[serde(with = "bits::float")]
    compression: f64,
    /// Centroids, sorted by mean
    centroids: Vec<Centroid>,
    /// Weighted values not yet merged into the centroids
    buffer: Vec<Centroid>,
    /// Number of values inserted
    count: u64,
    /// Sum of inserted weights
    #[serde(with = "bits::float")]
    total_weight: f64,
    #[serde(with = "bits::float")]
    min: f64,
    #[serde(with = "bits::float")]
    max: f64,
}

impl TDigest {
    /// # Panics
    ///
    /// Panics if `compression` is not finite or not positive.
    pub fn new(compression: f64) -> Self {
        assert!(
            compression.is_finite() && compression > 0.0,
            "compression must be finite and positive, got {}",
            compression
        );

        Self {
            compression,
            centroids: Vec::new(),
            buffer: Vec::new(),
            count: 0,
            total_weight: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }

    pub fn compression(&self) -> f64 {
        self.compression
    }

    /// Sum of the weights of all inserted values
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Number of compressed centroids, excluding buffered values
    pub fn num_centroids(&self) -> usize {
        self.centroids.len()
    }

    fn buffer_capacity(&self) -> usize {
        ((self.compression * 2.0) as usize).max(1)
    }

    /// Insert a value with the given weight.
    ///
    /// Non-finite values and non-positive or non-finite weights are ignored
    /// so that a single bad cell cannot corrupt the digest.
    pub fn add_weighted(&mut self, value: f64, weight: f64) {
        if !value.is_finite() || !weight.is_finite() || weight <= 0.0 {
            return;
        }

        self.buffer.push(Centroid::new(value, weight));
        self.count += 1;
        self.total_weight += weight;
        self.min = self.min.min(value);
        self.max = self.max.max(value);

        if self.buffer.len() >= self.buffer_capacity() {
            self.compress();
        }
    }

    /// Force compression of the buffer into centroids
    pub fn compress(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        let centroids = std::mem::take(&mut self.centroids);
        let buffer = std::mem::take(&mut self.buffer);
        self.centroids = Self::compress_all(centroids, buffer, self.compression);
    }

    /// Weight in each of `bins` equal-width bins, with the `bins + 1` edges.
    ///
    /// Bins span `range`, or the observed `[min, max]` when it is `None`; a
    /// zero-width span is widened by 0.5 either side. Counts are differences
    /// of the rank model at the edges, so weight outside an explicit range
    /// is left out. `None` for an empty digest or zero bins.
    pub fn histogram(&self, bins: usize, range: Option<(f64, f64)>) -> Option<(Vec<f64>, Vec<f64>)> {
        if self.count == 0 || bins == 0 {
            return None;
        }
        let (mut low, mut high) = range.unwrap_or((self.min, self.max));
        if low == high {
            low -= 0.5;
            high += 0.5;
        }

        let width = (high - low) / bins as f64;
        let edges: Vec<f64> = (0..=bins)
            .map(|i| if i == bins { high } else { low + width * i as f64 })
            .collect();

        let centroids = self.compressed_view();
        let ranks: Vec<f64> = edges
            .iter()
            .map(|&edge| Self::rank_impl(&centroids, self.total_weight, self.min, self.max, edge))
            .collect();
        let counts = ranks
            .windows(2)
            .map(|pair| (pair[1] - pair[0]) * self.total_weight)
            .collect();
        Some((counts, edges))
    }

    /// Sorted, compressed centroids including any buffered values, without
    /// touching `self`.
    fn compressed_view(&self) -> Cow<'_, [Centroid]> {
        if self.buffer.is_empty() {
            Cow::Borrowed(&self.centroids)
        } else {
            Cow::Owned(Self::compress_all(
                self.centroids.clone(),
                self.buffer.clone(),
                self.compression,
            ))
        }
    }

    fn compress_all(
        mut centroids: Vec<Centroid>,
        buffer: Vec<Centroid>,
        compression: f64,
    ) -> Vec<Centroid> {
        centroids.extend(buffer);
        centroids.sort_by(|a, b| a.mean.total_cmp(&b.mean));
        Self::compress_sorted(centroids, compression)
    }

    /// Merge adjacent centroids while each stays within one unit of the
    /// scale function. The arcsine scale is steep near q=0 and q=1, so tail
    /// centroids stay small and the middle absorbs most merging.
    fn compress_sorted(sorted: Vec<Centroid>, compression: f64) -> Vec<Centroid> {
        let mut iter = sorted.into_iter();
        let Some(mut current) = iter.next() else {
            return Vec::new();
        };

        let total_weight: f64 = current.weight + iter.as_slice().iter().map(|c| c.weight).sum::<f64>();
        let mut result = Vec::with_capacity(compression as usize);
        let mut weight_so_far = 0.0_f64;

        for centroid in iter {
            let proposed_weight = current.weight + centroid.weight;
            let q0 = weight_so_far / total_weight;
            let q1 = (weight_so_far + proposed_weight) / total_weight;

            if Self::scale(q1, compression) - Self::scale(q0, compression) <= 1.0 {
                current.add(centroid.mean, centroid.weight);
            } else {
                weight_so_far += current.weight;
                result.push(current);
                current = centroid;
            }
        }

        result.push(current);
        result
    }

    /// `k(q) = compression * (asin(2q - 1) / pi + 1/2)`, clamped so rounding
    /// past the ends of [0, 1] cannot produce NaN.
    #[inline]
    fn scale(q: f64, compression: f64) -> f64 {
        let x = (2.0 * q - 1.0).clamp(-1.0, 1.0);
        compression * (x.asin() / std::f64::consts::PI + 0.5)
    }

    /// Value at rank `q * total`, interpolating linearly between centroid
    /// midpoints `(weight before + weight / 2, mean)`, with `(0, min)` and
    /// `(total, max)` as the end points.
    fn quantile_impl(centroids: &[Centroid], total: f64, min: f64, max: f64, q: f64) -> Option<f64> {
        if total <= 0.0 || centroids.is_empty() {
            return None;
        }

        let q = q.clamp(0.0, 1.0);
        if q <= 0.0 {
            return Some(min);
        }
        if q >= 1.0 {
            return Some(max);
        }

        let target_rank = q * total;

        let mut prev_rank = 0.0_f64;
        let mut prev_mean = min;
        let mut cumulative = 0.0_f64;

        for centroid in centroids {
            let mid_rank = cumulative + centroid.weight / 2.0;

            if target_rank < mid_rank {
                let denom = mid_rank - prev_rank;
                if denom <= 0.0 {
                    return Some(prev_mean);
                }
                let t = (target_rank - prev_rank) / denom;
                return Some(prev_mean + t * (centroid.mean - prev_mean));
            }

            cumulative += centroid.weight;
            prev_rank = mid_rank;
            prev_mean = centroid.mean;
        }

        // past the last midpoint: interpolate to max
        let denom = total - prev_rank;
        if denom <= 0.0 {
            return Some(max);
        }
        let t = (target_rank - prev_rank) / denom;
        Some(prev_mean + t * (max - prev_mean))
    }

    /// Rank query using the same piecewise linear model as `quantile_impl`.
    fn rank_impl(centroids: &[Centroid], total: f64, min: f64, max: f64, value: f64) -> f64 {
        if total <= 0.0 {
            return 0.0;
        }

        // >= max first so that min == max yields 1.0 (P(X <= x) for x >= max)
        if value >= max {
            return 1.0;
        }
        if value <= min {
            return 0.0;
        }

        let mut prev_rank = 0.0_f64;
        let mut prev_mean = min;
        let mut cumulative = 0.0_f64;

        for centroid in centroids {
            let mid_rank = cumulative + centroid.weight / 2.0;

            if value < centroid.mean {
                let denom = centroid.mean - prev_mean;
                if denom <= 0.0 {
                    return prev_rank / total;
                }
                let t = (value - prev_mean) / denom;
                return (prev_rank + t * (mid_rank - prev_rank)) / total;
            }

            cumulative += centroid.weight;
            prev_rank = mid_rank;
            prev_mean = centroid.mean;
        }

        let denom = max - prev_mean;
        if denom <= 0.0 {
            return 1.0;
        }
        let t = (value - prev_mean) / denom;
        (prev_rank + t * (total - prev_rank)) / total
    }
}

impl Default for TDigest {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl Sketch for TDigest {
    type Item = f64;

    fn update(&mut self, item: &f64) {
        self.add_weighted(*item, 1.0);
    }

    fn merge(&mut self, other: &Self) -> Result<()> {
        if self.compression.to_bits() != other.compression.to_bits() {
            return Err(Error::IncompatibleSketch {
                expected: format!("compression={}", self.compression),
                found: format!("compression={}", other.compression),
            });
        }

        let mut all = std::mem::take(&mut self.centroids);
        all.append(&mut self.buffer);
        all.extend(other.centroids.iter().cloned());
        all.extend(other.buffer.iter().cloned());
        all.sort_by(|a, b| a.mean.total_cmp(&b.mean));

        self.count += other.count;
        self.total_weight += other.total_weight;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.centroids = Self::compress_sorted(all, self.compression);

        Ok(())
    }

    fn clear(&mut self) {
        self.centroids.clear();
        self.buffer.clear();
        self.count = 0;
        self.total_weight = 0.0;
        self.min = f64::INFINITY;
        self.max = f64::NEG_INFINITY;
    }

    fn size_bytes(&self) -> usize {
        std::mem::size_of::<Self>()
            + (self.centroids.capacity() + self.buffer.capacity()) * std::mem::size_of::<Centroid>()
    }

    fn count(&self) -> u64 {
        self.count
    }
}

impl QuantileSketch for TDigest {
    type Value = f64;

    fn add(&mut self, value: f64) {
        self.add_weighted(value, 1.0);
    }

    fn quantile(&self, rank: f64) -> Option<f64> {
        let centroids = self.compressed_view();
        Self::quantile_impl(&centroids, self.total_weight, self.min, self.max, rank)
    }

    fn rank(&self, value: &f64) -> f64 {
        let centroids = self.compressed_view();
        Self::rank_impl(&centroids, self.total_weight, self.min, self.max, *value)
    }

    fn min(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.min)
        }
    }

    fn max(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.max)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // ---- Basic functionality ----

    #[test]
    fn test_basic() {
        let mut digest = TDigest::new(100.0);
        for i in 1..=100 {
            digest.add(i as f64);
        }
        let median = digest.median().unwrap();
        assert!(median > 45.0 && median < 55.0);
    }

    #[test]
    fn test_empty() {
        let digest = TDigest::new(100.0);
        assert!(digest.median().is_none());
        assert!(digest.min().is_none());
        assert!(digest.max().is_none());
        assert_eq!(digest.count(), 0);
    }

    #[test]
    fn test_single_value() {
        let mut digest = TDigest::new(100.0);
        digest.add(42.0);
        assert_eq!(digest.quantile(0.0), Some(42.0));
        assert_eq!(digest.quantile(0.5), Some(42.0));
        assert_eq!(digest.quantile(1.0), Some(42.0));
    }

    #[test]
    fn test_quantiles() {
        let mut digest = TDigest::new(100.0);
        for i in 1..=1000 {
            digest.add(i as f64);
        }
        let p10 = digest.quantile(0.1).unwrap();
        let p50 = digest.quantile(0.5).unwrap();
        let p99 = digest.quantile(0.99).unwrap();
        assert!(p10 > 50.0 && p10 < 150.0, "p10={}", p10);
        assert!(p50 > 450.0 && p50 < 550.0, "p50={}", p50);
        assert!(p99 > 950.0 && p99 <= 1000.0, "p99={}", p99);
        assert_eq!(digest.quantile(0.0), Some(1.0));
        assert_eq!(digest.quantile(1.0), Some(1000.0));
    }

    // ---- Weights ----

    #[test]
    fn test_weighted_insert_shifts_median() {
        let mut digest = TDigest::new(100.0);
        digest.add_weighted(0.0, 1.0);
        digest.add_weighted(10.0, 9.0);
        assert_eq!(digest.count(), 2);
        assert!((digest.total_weight() - 10.0).abs() < 1e-12);
        let median = digest.median().unwrap();
        assert!(median > 5.0, "median={}", median);
    }

    #[test]
    fn test_bad_weights_ignored() {
        let mut digest = TDigest::new(100.0);
        digest.add_weighted(1.0, 0.0);
        digest.add_weighted(1.0, -2.0);
        digest.add_weighted(1.0, f64::NAN);
        digest.add_weighted(f64::INFINITY, 1.0);
        digest.add_weighted(f64::NAN, 1.0);
        assert_eq!(digest.count(), 0);
        assert!(digest.median().is_none());
    }

    // ---- Merge ----

    #[test]
    fn test_merge() {
        let mut d1 = TDigest::new(100.0);
        let mut d2 = TDigest::new(100.0);
        for i in 1..=500 {
            d1.add(i as f64);
        }
        for i in 501..=1000 {
            d2.add(i as f64);
        }
        d1.merge(&d2).unwrap();
        assert_eq!(d1.count(), 1000);
        assert_eq!(d1.min(), Some(1.0));
        assert_eq!(d1.max(), Some(1000.0));
        let median = d1.median().unwrap();
        assert!(median > 450.0 && median < 550.0);
    }

    #[test]
    fn test_merge_incompatible_compression() {
        let mut d1 = TDigest::new(100.0);
        let d2 = TDigest::new(200.0);
        d1.add(1.0);
        assert!(matches!(d1.merge(&d2), Err(Error::IncompatibleSketch { .. })));
    }

    // ---- Query purity ----

    #[test]
    fn test_query_does_not_mutate() {
        let mut digest = TDigest::new(100.0);
        for i in 1..=10 {
            digest.add(i as f64);
        }
        let before = digest.clone();
        let first = digest.quantile(0.5);
        let second = digest.quantile(0.5);
        assert_eq!(first, second);
        assert_eq!(digest, before);
    }

    #[test]
    fn test_queried_and_unqueried_digests_stay_identical() {
        let mut queried = TDigest::new(50.0);
        let mut quiet = TDigest::new(50.0);
        for i in 0..2_000 {
            let v = ((i * 7919) % 1000) as f64;
            queried.add(v);
            quiet.add(v);
            if i % 37 == 0 {
                let _ = queried.quantile(0.9);
            }
        }
        assert_eq!(queried, quiet);
    }

    // ---- Centroid bound ----

    #[test]
    fn test_centroid_count_is_bounded() {
        let mut digest = TDigest::new(50.0);
        for i in 0..100_000_i64 {
            digest.add(((i * 104_729) % 100_003) as f64);
        }
        digest.compress();
        assert!(digest.num_centroids() <= 100, "centroids={}", digest.num_centroids());
    }

    // ---- Rank ----

    #[test]
    fn test_rank() {
        let mut digest = TDigest::new(100.0);
        for i in 1..=100 {
            digest.add(i as f64);
        }
        let rank = digest.rank(&50.0);
        assert!(rank > 0.4 && rank < 0.6, "rank={}", rank);
        assert!(digest.rank(&1.0) < 0.05);
        assert!(digest.rank(&100.0) > 0.95);
    }

    #[test]
    fn test_rank_quantile_consistency() {
        let mut digest = TDigest::new(200.0);
        for i in 1..=10000 {
            digest.add(i as f64);
        }
        for i in 1..=99 {
            let q = i as f64 / 100.0;
            let val = digest.quantile(q).unwrap();
            let r = digest.rank(&val);
            assert!((r - q).abs() < 0.05, "q={}, rank(quantile(q))={}", q, r);
        }
    }

    // ---- Degenerate distributions ----

    #[test]
    fn test_histogram_spreads_uniform_data() {
        let mut td = TDigest::new(100.0);
        for i in 0..1000 {
            td.add(i as f64);
        }

        let (counts, edges) = td.histogram(10, None).unwrap();
        assert_eq!(counts.len(), 10);
        assert_eq!(edges.len(), 11);
        assert_eq!(edges[0], 0.0);
        assert_eq!(edges[10], 999.0);
        for &count in &counts {
            assert!((count - 100.0).abs() < 5.0, "count {}", count);
        }
        assert!((counts.iter().sum::<f64>() - 1000.0).abs() < 1e-6);
    }

    #[test]
    fn test_histogram_range_drops_outside_weight() {
        let mut td = TDigest::new(100.0);
        for i in 0..1000 {
            td.add(i as f64);
        }

        let (counts, edges) = td.histogram(4, Some((0.0, 499.5))).unwrap();
        assert_eq!(edges.last(), Some(&499.5));
        let inside: f64 = counts.iter().sum();
        assert!((inside - 500.0).abs() < 5.0, "inside {}", inside);
    }

    #[test]
    fn test_histogram_edge_cases() {
        let empty = TDigest::new(100.0);
        assert!(empty.histogram(10, None).is_none());

        let mut td = TDigest::new(100.0);
        for _ in 0..5 {
            td.add(3.0);
        }
        assert!(td.histogram(0, None).is_none());

        let (counts, edges) = td.histogram(2, None).unwrap();
        assert_eq!(edges, vec![2.5, 3.0, 3.5]);
        assert!((counts.iter().sum::<f64>() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_all_values_equal() {
        let mut digest = TDigest::new(100.0);
        for _ in 0..1000 {
            digest.add(42.0);
        }
        for i in 0..=10 {
            let q = i as f64 / 10.0;
            assert_eq!(digest.quantile(q).unwrap(), 42.0, "q={}", q);
        }
        assert_eq!(digest.rank(&42.0), 1.0);
        assert_eq!(digest.rank(&41.0), 0.0);
    }

    #[test]
    fn test_quantile_monotonicity() {
        let mut digest = TDigest::new(100.0);
        for i in 1..=10000 {
            digest.add(i as f64);
        }
        let mut prev = f64::NEG_INFINITY;
        for i in 0..=100 {
            let q = i as f64 / 100.0;
            let val = digest.quantile(q).unwrap();
            assert!(val >= prev, "monotonicity violation at q={}: {} < {}", q, val, prev);
            prev = val;
        }
    }

    // ---- Parameter validation ----

    #[test]
    #[should_panic(expected = "compression must be finite and positive")]
    fn test_zero_compression_panics() {
        TDigest::new(0.0);
    }

    // ---- Serialization ----

    #[test]
    fn test_serde_roundtrip_preserves_buffer() {
        let mut digest = TDigest::new(20.0);
        for i in 0..25 {
            digest.add(i as f64 * 0.1);
        }
        let json = serde_json::to_string(&digest).unwrap();
        let restored: TDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, digest);

        let empty = TDigest::new(20.0);
        let json = serde_json::to_string(&empty).unwrap();
        let restored: TDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.min(), None);
        assert!(restored.median().is_none());
    }
}
