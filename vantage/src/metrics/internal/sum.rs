use super::{lock_or_recover, Aggregator, AtomicTracker, Number, ValueMap};
use crate::metrics::data::{MetricData, SumData, SumPoint};
use crate::metrics::Temporality;
use crate::time;
use crate::KeyValue;
use std::sync::Mutex;
use std::time::SystemTime;

pub(crate) struct SumTracker<T: Number> {
    value: T::AtomicTracker,
}

impl<T: Number> Aggregator for SumTracker<T> {
    type InitConfig = ();
    type PreComputedValue = T;

    fn create(_init: &()) -> Self {
        SumTracker {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    fn update(&self, value: T) {
        self.value.add(value);
    }

    fn clone_and_reset(&self, _init: &()) -> Self {
        SumTracker {
            value: T::new_atomic_tracker(self.value.get_and_reset_value()),
        }
    }
}

/// Cumulative per-attribute-set sums for counters and up-down counters.
pub(crate) struct SumStorage<T: Number> {
    value_map: ValueMap<SumTracker<T>>,
    monotonic: bool,
    start: Mutex<SystemTime>,
}

impl<T: Number> SumStorage<T> {
    pub(crate) fn new(monotonic: bool) -> Self {
        SumStorage {
            value_map: ValueMap::new(()),
            monotonic,
            start: Mutex::new(time::now()),
        }
    }

    pub(crate) fn add(&self, value: T, attributes: &[KeyValue]) {
        self.value_map.measure(value, attributes);
    }

    pub(crate) fn collect(&self, temporality: Temporality) -> MetricData {
        let t = time::now();
        let start = *lock_or_recover(&self.start);
        let mut points = Vec::new();
        match temporality {
            Temporality::Cumulative => {
                self.value_map.collect_readonly(&mut points, |attributes, tracker| SumPoint {
                    attributes,
                    start_time: start,
                    time: t,
                    value: tracker.value.get_value().into_metric_value(),
                });
            }
            Temporality::Delta => {
                self.value_map.collect_and_reset(&mut points, |attributes, tracker| SumPoint {
                    attributes,
                    start_time: start,
                    time: t,
                    value: tracker.value.get_value().into_metric_value(),
                });
                // The next delta window starts where this one ended.
                *lock_or_recover(&self.start) = t;
            }
        }
        MetricData::Sum(SumData {
            temporality,
            is_monotonic: self.monotonic,
            points,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricValue;

    #[test]
    fn sums_accumulate_per_attribute_set() {
        let storage = SumStorage::<u64>::new(true);
        storage.add(1, &[KeyValue::new("k", "a")]);
        storage.add(2, &[KeyValue::new("k", "a")]);
        storage.add(10, &[KeyValue::new("k", "b")]);
        storage.add(5, &[]);

        let MetricData::Sum(sum) = storage.collect(Temporality::Cumulative) else {
            panic!("expected sum data");
        };
        assert!(sum.is_monotonic);
        assert_eq!(sum.points.len(), 3);
        let total: u64 = sum
            .points
            .iter()
            .map(|p| match p.value {
                MetricValue::U64(v) => v,
                _ => panic!("expected u64 points"),
            })
            .sum();
        assert_eq!(total, 18);
    }

    #[test]
    fn attribute_order_shares_a_point() {
        let storage = SumStorage::<u64>::new(true);
        storage.add(1, &[KeyValue::new("a", 1), KeyValue::new("b", 2)]);
        storage.add(1, &[KeyValue::new("b", 2), KeyValue::new("a", 1)]);

        let MetricData::Sum(sum) = storage.collect(Temporality::Cumulative) else {
            panic!("expected sum data");
        };
        assert_eq!(sum.points.len(), 1);
        assert_eq!(sum.points[0].value, MetricValue::U64(2));
    }

    #[test]
    fn delta_resets_storage() {
        let storage = SumStorage::<i64>::new(false);
        storage.add(5, &[KeyValue::new("k", "a")]);
        storage.add(-2, &[KeyValue::new("k", "a")]);

        let MetricData::Sum(first) = storage.collect(Temporality::Delta) else {
            panic!("expected sum data");
        };
        assert_eq!(first.points[0].value, MetricValue::I64(3));

        storage.add(7, &[KeyValue::new("k", "a")]);
        let MetricData::Sum(second) = storage.collect(Temporality::Delta) else {
            panic!("expected sum data");
        };
        assert_eq!(second.points[0].value, MetricValue::I64(7));
    }
}
