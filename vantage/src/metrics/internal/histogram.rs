use super::{lock_or_recover, Aggregator, Number, ValueMap};
use crate::metrics::data::{HistogramData, HistogramPoint, MetricData};
use crate::metrics::Temporality;
use crate::time;
use crate::KeyValue;
use std::sync::Mutex;
use std::time::SystemTime;

/// Default boundaries when a histogram is built without explicit bounds.
pub(crate) const DEFAULT_BOUNDARIES: [f64; 14] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0, 7500.0,
];

struct Buckets<T> {
    counts: Vec<u64>,
    count: u64,
    total: T,
    min: T,
    max: T,
}

impl<T: Number> Buckets<T> {
    fn new(n: usize) -> Buckets<T> {
        Buckets {
            counts: vec![0; n],
            count: 0,
            total: T::default(),
            min: T::max_value(),
            max: T::min_value(),
        }
    }

    fn bin(&mut self, idx: usize, value: T) {
        self.counts[idx] += 1;
        self.count += 1;
        self.total += value;
        if value < self.min {
            self.min = value;
        }
        if value > self.max {
            self.max = value;
        }
    }
}

pub(crate) struct HistogramTracker<T> {
    buckets: Mutex<Buckets<T>>,
}

impl<T: Number> Aggregator for HistogramTracker<T> {
    type InitConfig = usize;
    /// The value and the index of the bucket it falls in.
    type PreComputedValue = (T, usize);

    fn create(bucket_count: &usize) -> Self {
        HistogramTracker {
            buckets: Mutex::new(Buckets::new(*bucket_count)),
        }
    }

    fn update(&self, (value, index): (T, usize)) {
        let mut buckets = lock_or_recover(&self.buckets);
        buckets.bin(index, value);
    }

    fn clone_and_reset(&self, bucket_count: &usize) -> Self {
        let mut buckets = lock_or_recover(&self.buckets);
        let snapshot = std::mem::replace(&mut *buckets, Buckets::new(*bucket_count));
        HistogramTracker {
            buckets: Mutex::new(snapshot),
        }
    }
}

/// Summarizes measurements into explicitly bucketed distributions, per
/// attribute set.
pub(crate) struct HistogramStorage<T: Number> {
    value_map: ValueMap<HistogramTracker<T>>,
    bounds: Vec<f64>,
    record_min_max: bool,
    start: Mutex<SystemTime>,
}

impl<T: Number> HistogramStorage<T> {
    /// Creates storage for the given boundaries.
    ///
    /// Boundaries are canonicalized: non-finite entries are dropped and the
    /// rest sorted ascending and deduplicated.
    pub(crate) fn new(mut bounds: Vec<f64>, record_min_max: bool) -> Self {
        bounds.retain(|bound| bound.is_finite());
        bounds.sort_by(|a, b| a.partial_cmp(b).expect("NaNs filtered out"));
        bounds.dedup();
        let bucket_count = bounds.len() + 1;
        HistogramStorage {
            value_map: ValueMap::new(bucket_count),
            bounds,
            record_min_max,
            start: Mutex::new(time::now()),
        }
    }

    pub(crate) fn record(&self, value: T, attributes: &[KeyValue]) {
        let as_float = value.into_float();
        // Index of the first boundary >= value; equal to `bounds.len()` for
        // values beyond the last boundary, which lands in the overflow
        // bucket.
        let index = self.bounds.partition_point(|&bound| bound < as_float);
        self.value_map.measure((value, index), attributes);
    }

    pub(crate) fn collect(&self, temporality: Temporality) -> MetricData {
        let t = time::now();
        let start = *lock_or_recover(&self.start);
        let record_min_max = self.record_min_max;
        let bounds = &self.bounds;
        let mut points = Vec::new();

        let to_point = |attributes: Vec<KeyValue>, buckets: &Buckets<T>| HistogramPoint {
            attributes,
            start_time: start,
            time: t,
            count: buckets.count,
            sum: buckets.total.into_float(),
            min: (record_min_max && buckets.count > 0).then(|| buckets.min.into_float()),
            max: (record_min_max && buckets.count > 0).then(|| buckets.max.into_float()),
            bounds: bounds.clone(),
            bucket_counts: buckets.counts.clone(),
        };

        match temporality {
            Temporality::Cumulative => {
                self.value_map.collect_readonly(&mut points, |attributes, tracker| {
                    let buckets = lock_or_recover(&tracker.buckets);
                    to_point(attributes, &buckets)
                });
            }
            Temporality::Delta => {
                self.value_map.collect_and_reset(&mut points, |attributes, tracker| {
                    let buckets = lock_or_recover(&tracker.buckets);
                    to_point(attributes, &buckets)
                });
                *lock_or_recover(&self.start) = t;
            }
        }
        MetricData::Histogram(HistogramData {
            temporality,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_single(storage: &HistogramStorage<u64>) -> HistogramPoint {
        let MetricData::Histogram(histogram) = storage.collect(Temporality::Cumulative) else {
            panic!("expected histogram data");
        };
        assert_eq!(histogram.points.len(), 1);
        histogram.points.into_iter().next().unwrap()
    }

    #[test]
    fn bucketing_and_statistics() {
        let storage = HistogramStorage::<u64>::new(vec![0.0, 5.0, 10.0, 25.0], true);
        for value in [3, 7, 7, 30] {
            storage.record(value, &[]);
        }

        let point = collect_single(&storage);
        assert_eq!(point.count, 4);
        assert_eq!(point.sum, 47.0);
        assert_eq!(point.bucket_counts, vec![0, 1, 2, 0, 1]);
        assert_eq!(point.min, Some(3.0));
        assert_eq!(point.max, Some(30.0));
    }

    #[test]
    fn boundary_values_fall_in_lower_bucket() {
        let storage = HistogramStorage::<u64>::new(vec![5.0, 10.0], true);
        // A value equal to a boundary belongs to that boundary's bucket.
        storage.record(5, &[]);
        storage.record(10, &[]);
        storage.record(11, &[]);

        let point = collect_single(&storage);
        assert_eq!(point.bucket_counts, vec![1, 1, 1]);
    }

    #[test]
    fn bounds_are_canonicalized() {
        let storage = HistogramStorage::<u64>::new(vec![10.0, f64::NAN, 5.0, 10.0], false);
        assert_eq!(storage.bounds, vec![5.0, 10.0]);

        storage.record(7, &[]);
        let point = collect_single(&storage);
        assert_eq!(point.bucket_counts, vec![0, 1, 0]);
        assert_eq!(point.min, None);
        assert_eq!(point.max, None);
    }
}
