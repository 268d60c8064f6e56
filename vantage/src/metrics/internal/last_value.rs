use super::{Aggregator, AtomicTracker, Number, ValueMap};
use crate::metrics::data::{GaugeData, GaugePoint, MetricData};
use crate::time;
use crate::KeyValue;

pub(crate) struct LastValueTracker<T: Number> {
    value: T::AtomicTracker,
}

impl<T: Number> Aggregator for LastValueTracker<T> {
    type InitConfig = ();
    type PreComputedValue = T;

    fn create(_init: &()) -> Self {
        LastValueTracker {
            value: T::new_atomic_tracker(T::default()),
        }
    }

    fn update(&self, value: T) {
        self.value.store(value);
    }

    fn clone_and_reset(&self, _init: &()) -> Self {
        LastValueTracker {
            value: T::new_atomic_tracker(self.value.get_and_reset_value()),
        }
    }
}

/// Keeps the latest recorded value per attribute set.
pub(crate) struct GaugeStorage<T: Number> {
    value_map: ValueMap<LastValueTracker<T>>,
}

impl<T: Number> GaugeStorage<T> {
    pub(crate) fn new() -> Self {
        GaugeStorage {
            value_map: ValueMap::new(()),
        }
    }

    pub(crate) fn record(&self, value: T, attributes: &[KeyValue]) {
        self.value_map.measure(value, attributes);
    }

    /// Gauges report the latest observation regardless of the reader's
    /// temporality.
    pub(crate) fn collect(&self) -> MetricData {
        let t = time::now();
        let mut points = Vec::new();
        self.value_map
            .collect_readonly(&mut points, |attributes, tracker| GaugePoint {
                attributes,
                time: t,
                value: tracker.value.get_value().into_metric_value(),
            });
        MetricData::Gauge(GaugeData { points })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricValue;

    #[test]
    fn record_replaces_value() {
        let storage = GaugeStorage::<i64>::new();
        storage.record(10, &[KeyValue::new("k", "a")]);
        storage.record(-3, &[KeyValue::new("k", "a")]);

        let MetricData::Gauge(gauge) = storage.collect() else {
            panic!("expected gauge data");
        };
        assert_eq!(gauge.points.len(), 1);
        assert_eq!(gauge.points[0].value, MetricValue::I64(-3));
    }
}
