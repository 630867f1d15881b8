//! Fixed-capacity rolling order-statistic buffer.
//!
//! Maintains a FIFO window of up to `capacity` samples alongside a sorted
//! mirror of the same multiset, so that rank/quantile queries are a binary
//! search instead of an O(n log n) re-sort on every call. Eviction removes
//! exactly one occurrence of the oldest value from the sorted mirror, not
//! every occurrence, so duplicate values are handled correctly.

use std::collections::VecDeque;

/// A fixed-capacity rolling window with O(log n) rank/quantile queries and
/// O(1) mean/stddev.
#[derive(Debug, Clone)]
pub struct RollingStats {
    capacity: usize,
    fifo: VecDeque<f64>,
    sorted: Vec<f64>,
    sum: f64,
    sum_sq: f64,
}

impl RollingStats {
    /// Create an empty buffer. `capacity` of 0 is treated as 1 to avoid a
    /// buffer that can never hold a sample.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            fifo: VecDeque::with_capacity(capacity),
            sorted: Vec::with_capacity(capacity),
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    /// Push a new sample, evicting the oldest one if the buffer is full.
    ///
    /// Non-finite input is treated as zero for accumulation, per the
    /// engine-wide rule that malformed input degrades to a neutral value
    /// rather than poisoning the running statistics.
    pub fn push(&mut self, x: f64) {
        let x = numeric_kit::finite_or(x, 0.0);

        if self.fifo.len() >= self.capacity {
            if let Some(old) = self.fifo.pop_front() {
                self.sum -= old;
                self.sum_sq -= old * old;
                self.remove_one_from_sorted(old);
            }
        }

        self.fifo.push_back(x);
        self.sum += x;
        self.sum_sq += x * x;
        let idx = self.sorted.partition_point(|&y| y < x);
        self.sorted.insert(idx, x);
    }

    /// Remove exactly one occurrence of `value` from the sorted mirror.
    /// Uses an exact-match binary search so duplicate values only lose one
    /// entry, matching the single FIFO eviction.
    fn remove_one_from_sorted(&mut self, value: f64) {
        match self
            .sorted
            .binary_search_by(|probe| probe.partial_cmp(&value).unwrap())
        {
            Ok(idx) => {
                self.sorted.remove(idx);
            }
            Err(_) => {
                // Should not happen: every FIFO entry has a mirror. Guard
                // defensively rather than panic on a corrupted invariant.
            }
        }
    }

    pub fn len(&self) -> usize {
        self.fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fifo.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arithmetic mean of the current window. `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.fifo.is_empty() {
            return 0.0;
        }
        self.sum / self.fifo.len() as f64
    }

    /// Population standard deviation of the current window. `0.0` when the
    /// window has fewer than 2 samples, and clamped to `>= 0` to absorb
    /// floating-point cancellation in `sum_sq/len - mean^2`.
    pub fn stddev(&self) -> f64 {
        let n = self.fifo.len();
        if n < 2 {
            return 0.0;
        }
        let n_f = n as f64;
        let mean = self.sum / n_f;
        let variance = (self.sum_sq / n_f - mean * mean).max(0.0);
        variance.sqrt()
    }

    /// `100 * (count of samples <= x) / len`. `0.0` when empty.
    /// Monotone non-decreasing in `x` by construction.
    pub fn percentile_rank(&self, x: f64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let count_le = self.sorted.partition_point(|&y| y <= x);
        100.0 * count_le as f64 / self.sorted.len() as f64
    }

    /// Linearly-interpolated quantile at `q` in `[0, 1]`. `0.0` when empty.
    /// `quantile(0.0)` is the window minimum, `quantile(1.0)` the maximum.
    pub fn quantile(&self, q: f64) -> f64 {
        if self.sorted.is_empty() {
            return 0.0;
        }
        let q = q.clamp(0.0, 1.0);
        let n = self.sorted.len();
        if n == 1 {
            return self.sorted[0];
        }
        let p = q * (n - 1) as f64;
        let lo = p.floor() as usize;
        let hi = p.ceil() as usize;
        if lo == hi {
            return self.sorted[lo];
        }
        let frac = p - lo as f64;
        self.sorted[lo] + frac * (self.sorted[hi] - self.sorted[lo])
    }

    /// The most recent `k` samples in FIFO (chronological) order. Returns
    /// fewer than `k` if the window hasn't filled that far yet.
    pub fn tail(&self, k: usize) -> Vec<f64> {
        let n = self.fifo.len();
        let take = k.min(n);
        self.fifo.iter().skip(n - take).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naive_mean(data: &[f64]) -> f64 {
        if data.is_empty() {
            return 0.0;
        }
        data.iter().sum::<f64>() / data.len() as f64
    }

    fn naive_stddev(data: &[f64]) -> f64 {
        if data.len() < 2 {
            return 0.0;
        }
        let m = naive_mean(data);
        (data.iter().map(|x| (x - m).powi(2)).sum::<f64>() / data.len() as f64).sqrt()
    }

    #[test]
    fn empty_buffer_boundaries() {
        let buf = RollingStats::new(10);
        assert_eq!(buf.mean(), 0.0);
        assert_eq!(buf.stddev(), 0.0);
        assert_eq!(buf.percentile_rank(5.0), 0.0);
        assert_eq!(buf.quantile(0.5), 0.0);
    }

    #[test]
    fn single_element_boundaries() {
        let mut buf = RollingStats::new(10);
        buf.push(7.0);
        assert_eq!(buf.mean(), 7.0);
        assert_eq!(buf.stddev(), 0.0);
        assert_eq!(buf.percentile_rank(6.0), 0.0);
        assert_eq!(buf.percentile_rank(7.0), 100.0);
        assert_eq!(buf.quantile(0.0), 7.0);
        assert_eq!(buf.quantile(1.0), 7.0);
    }

    #[test]
    fn eviction_keeps_sorted_mirror_a_permutation_of_fifo() {
        let mut buf = RollingStats::new(5);
        for x in [3.0, 1.0, 4.0, 1.0, 5.0, 9.0, 2.0, 6.0] {
            buf.push(x);
        }
        assert_eq!(buf.len(), 5);
        let mut from_fifo = buf.tail(5);
        from_fifo.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(from_fifo, buf.sorted);
    }

    #[test]
    fn matches_naive_recomputation_within_tolerance() {
        let mut buf = RollingStats::new(50);
        let mut window: Vec<f64> = Vec::new();
        let mut seed = 17u64;
        for _ in 0..500 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1);
            let x = ((seed >> 33) % 1000) as f64 / 10.0;
            buf.push(x);
            window.push(x);
            if window.len() > 50 {
                window.remove(0);
            }
            let naive_m = naive_mean(&window);
            let naive_s = naive_stddev(&window);
            assert!((buf.mean() - naive_m).abs() < 1e-9 * naive_m.abs().max(1.0));
            assert!((buf.stddev() - naive_s).abs() < 1e-9 * naive_s.abs().max(1.0));
        }
    }

    #[test]
    fn percentile_rank_is_monotone() {
        let mut buf = RollingStats::new(20);
        for x in [5.0, 2.0, 8.0, 1.0, 9.0, 3.0] {
            buf.push(x);
        }
        let xs = [-10.0, 0.0, 1.0, 3.0, 5.0, 8.0, 9.0, 100.0];
        let ranks: Vec<f64> = xs.iter().map(|&x| buf.percentile_rank(x)).collect();
        for w in ranks.windows(2) {
            assert!(w[1] >= w[0]);
        }
    }

    #[test]
    fn quantile_bounds_match_min_max() {
        let mut buf = RollingStats::new(20);
        for x in [5.0, 2.0, 8.0, 1.0, 9.0, 3.0] {
            buf.push(x);
        }
        assert_eq!(buf.quantile(0.0), 1.0);
        assert_eq!(buf.quantile(1.0), 9.0);
    }

    #[test]
    fn duplicate_eviction_removes_single_occurrence() {
        let mut buf = RollingStats::new(3);
        buf.push(5.0);
        buf.push(5.0);
        buf.push(5.0);
        buf.push(1.0); // evicts one of the three 5.0s
        assert_eq!(buf.tail(3), vec![5.0, 5.0, 1.0]);
        assert_eq!(buf.sorted, vec![1.0, 5.0, 5.0]);
    }

    #[test]
    fn non_finite_input_is_neutralized() {
        let mut buf = RollingStats::new(5);
        buf.push(f64::NAN);
        buf.push(f64::INFINITY);
        buf.push(3.0);
        assert!(buf.mean().is_finite());
        assert!(buf.stddev().is_finite());
    }

    #[test]
    fn len_never_exceeds_capacity() {
        let mut buf = RollingStats::new(4);
        for i in 0..100 {
            buf.push(i as f64);
            assert!(buf.len() <= buf.capacity());
        }
    }
}
