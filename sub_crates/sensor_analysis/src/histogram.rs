#[derive(Debug, Clone, Default)]
pub struct Histogram {
    pub total_samples: usize,
    pub buckets: Vec<usize>,
}

impl Histogram {
    /// Builds a histogram from any iterator yielding items than can be converted to `usize`.
    ///
    /// The values yielded by the iterator are used to directly index
    /// into the histogram buckets, so `bucket_count` should be large
    /// enough to accommodate any yielded values.
    pub fn from_iter<T, Itr>(values: Itr, bucket_count: usize) -> Self
    where
        T: Into<usize>,
        Itr: std::iter::Iterator<Item = T>,
    {
        let mut hist = Histogram {
            total_samples: 0,
            buckets: vec![0; bucket_count],
        };
        for v in values {
            hist.total_samples += 1;
            hist.buckets[v.into()] += 1;
        }
        hist
    }

    /// Returns the index of the first bucket at which the cumulative
    /// count reaches fraction `p` of the total samples.
    ///
    /// An empty histogram returns zero.
    pub fn percentile(&self, p: f32) -> usize {
        let target = ((self.total_samples as f64 * p.clamp(0.0, 1.0) as f64).ceil() as usize).max(1);
        let mut sum = 0;
        for (i, count) in self.buckets.iter().enumerate() {
            sum += count;
            if sum >= target {
                return i;
            }
        }
        0
    }

    /// The lower median bucket.
    #[inline]
    pub fn median(&self) -> usize {
        self.percentile(0.5)
    }

    /// Limits every bucket to `limit` samples and spreads the clipped
    /// excess as evenly as possible over all buckets.
    ///
    /// The total sample count is unchanged.
    pub fn clip_and_redistribute(&mut self, limit: usize) {
        let bucket_count = self.buckets.len();
        if bucket_count == 0 {
            return;
        }

        let mut excess = 0;
        for bucket in self.buckets.iter_mut() {
            if *bucket > limit {
                excess += *bucket - limit;
                *bucket = limit;
            }
        }

        let batch = excess / bucket_count;
        let mut residual = excess % bucket_count;
        for bucket in self.buckets.iter_mut() {
            *bucket += batch;
        }
        if residual > 0 {
            let step = (bucket_count / residual).max(1);
            let mut i = 0;
            while i < bucket_count && residual > 0 {
                self.buckets[i] += 1;
                residual -= 1;
                i += step;
            }
        }
    }

    /// The cumulative distribution of the histogram, scaled into a
    /// `[0, 255]` lookup table with one entry per bucket.
    pub fn equalization_lut(&self) -> Vec<u8> {
        if self.total_samples == 0 {
            return (0..self.buckets.len()).map(|i| i.min(255) as u8).collect();
        }

        let scale = 255.0 / self.total_samples as f32;
        let mut sum = 0;
        self.buckets
            .iter()
            .map(|count| {
                sum += count;
                (sum as f32 * scale).round().clamp(0.0, 255.0) as u8
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_of_small_set() {
        let hist = Histogram::from_iter([3u8, 1, 7, 5, 9].iter().copied(), 16);
        assert_eq!(hist.total_samples, 5);
        assert_eq!(hist.median(), 5);
    }

    #[test]
    fn median_prefers_lower_of_even_split() {
        let hist = Histogram::from_iter([10u8, 10, 200, 200].iter().copied(), 256);
        assert_eq!(hist.median(), 10);
    }

    #[test]
    fn clipping_preserves_total() {
        let mut hist = Histogram::from_iter(std::iter::repeat(7u8).take(1000), 256);
        hist.clip_and_redistribute(10);
        assert_eq!(hist.buckets.iter().sum::<usize>(), 1000);
        assert!(hist.buckets.iter().all(|&b| b <= 14));
    }

    #[test]
    fn equalization_lut_is_monotonic() {
        let hist = Histogram::from_iter((0..=255u8).chain(std::iter::repeat(128).take(300)), 256);
        let lut = hist.equalization_lut();
        assert_eq!(lut.len(), 256);
        assert_eq!(lut[255], 255);
        assert!(lut.windows(2).all(|w| w[0] <= w[1]));
    }
}
