use super::{lock_or_recover, sort_and_dedup, Number};
use crate::metrics::data::{GaugeData, GaugePoint, MetricData, SumData, SumPoint};
use crate::metrics::Temporality;
use crate::time;
use crate::{sdk_error, sdk_warn, KeyValue};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// The semantics of an observable instrument's observations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ObservableKind {
    /// Monotonic absolute observations; decreases are treated as process
    /// restarts.
    Counter,
    /// Signed absolute observations.
    UpDownCounter,
    /// The latest observation wins.
    Gauge,
}

type Callback<T> = Arc<dyn Fn(&ObservableResult<T>) + Send + Sync>;

/// Accumulates the `(value, attributes)` tuples reported by one callback
/// invocation.
///
/// A fresh result is handed to every callback on every collection so
/// callbacks cannot observe each other's state.
pub struct ObservableResult<T> {
    observations: Mutex<Vec<(T, Vec<KeyValue>)>>,
}

impl<T: Copy> ObservableResult<T> {
    fn new() -> Self {
        ObservableResult {
            observations: Mutex::new(Vec::new()),
        }
    }

    /// Records the current value for the given attribute set.
    pub fn observe(&self, value: T, attributes: &[KeyValue]) {
        if let Ok(mut observations) = self.observations.lock() {
            observations.push((value, attributes.to_vec()));
        }
    }
}

impl<T> std::fmt::Debug for ObservableResult<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObservableResult").finish()
    }
}

struct ObservedSeries<T> {
    prev: T,
    cumulative: T,
    last_delta: T,
}

/// Callback-driven storage for the observable instrument variants.
///
/// Observation state resets on every collection; the exported streams are
/// rebuilt from the latest callback observations, monotonic-checked for
/// counters.
pub(crate) struct ObservableStorage<T: Number> {
    kind: ObservableKind,
    callbacks: Mutex<Vec<(u64, Callback<T>)>>,
    next_callback_id: AtomicU64,
    series: Mutex<HashMap<Vec<KeyValue>, ObservedSeries<T>>>,
    start: Mutex<SystemTime>,
}

impl<T: Number> ObservableStorage<T> {
    pub(crate) fn new(kind: ObservableKind) -> Self {
        ObservableStorage {
            kind,
            callbacks: Mutex::new(Vec::new()),
            next_callback_id: AtomicU64::new(0),
            series: Mutex::new(HashMap::new()),
            start: Mutex::new(time::now()),
        }
    }

    /// Registers `callback`, returning an id for unregistration.
    pub(crate) fn register_callback<F>(&self, callback: F) -> u64
    where
        F: Fn(&ObservableResult<T>) + Send + Sync + 'static,
    {
        let id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        lock_or_recover(&self.callbacks).push((id, Arc::new(callback)));
        id
    }

    pub(crate) fn unregister_callback(&self, id: u64) {
        lock_or_recover(&self.callbacks).retain(|(existing, _)| *existing != id);
    }

    /// Runs every callback with a fresh [`ObservableResult`] and folds the
    /// observations into the per-attribute-set series state.
    ///
    /// A panicking callback is logged and skipped; the collection cycle
    /// carries on with the remaining callbacks.
    pub(crate) fn collect(&self, temporality: Temporality) -> MetricData {
        let callbacks: Vec<Callback<T>> = lock_or_recover(&self.callbacks)
            .iter()
            .map(|(_, callback)| callback.clone())
            .collect();

        let mut latest: HashMap<Vec<KeyValue>, T> = HashMap::new();
        for callback in callbacks {
            let result = ObservableResult::new();
            if catch_unwind(AssertUnwindSafe(|| callback(&result))).is_err() {
                sdk_error!(
                    name: "ObservableStorage.CallbackPanicked",
                    message = "observable callback panicked and was skipped for this collection"
                );
                continue;
            }
            let observations = lock_or_recover(&result.observations);
            for (value, attributes) in observations.iter() {
                if self.kind == ObservableKind::Counter && *value < T::default() {
                    sdk_warn!(
                        name: "ObservableStorage.NegativeObservation",
                        message = "negative observation on a monotonic counter dropped"
                    );
                    continue;
                }
                // The latest observation for an attribute set wins.
                latest.insert(sort_and_dedup(attributes), *value);
            }
        }

        let t = time::now();
        let start = *lock_or_recover(&self.start);
        let mut series = lock_or_recover(&self.series);
        for (attributes, observed) in latest {
            let entry = series
                .entry(attributes)
                .or_insert_with(|| ObservedSeries {
                    prev: T::default(),
                    cumulative: T::default(),
                    last_delta: T::default(),
                });
            let delta = if entry.prev > observed {
                // The source restarted; the observation is the new total.
                observed
            } else {
                observed.signed_delta(entry.prev)
            };
            entry.cumulative += delta;
            entry.last_delta = delta;
            entry.prev = observed;
        }

        match self.kind {
            ObservableKind::Gauge => {
                let points = series
                    .iter()
                    .map(|(attributes, state)| GaugePoint {
                        attributes: attributes.clone(),
                        time: t,
                        value: state.prev.into_metric_value(),
                    })
                    .collect();
                MetricData::Gauge(GaugeData { points })
            }
            ObservableKind::Counter | ObservableKind::UpDownCounter => {
                let is_monotonic = self.kind == ObservableKind::Counter;
                let points = series
                    .iter()
                    .map(|(attributes, state)| {
                        let value = match (is_monotonic, temporality) {
                            // Monotonic streams rebuild a restart-tolerant
                            // cumulative total; signed streams report the
                            // absolute observation.
                            (true, Temporality::Cumulative) => state.cumulative,
                            (true, Temporality::Delta) => state.last_delta,
                            (false, Temporality::Cumulative) => state.prev,
                            (false, Temporality::Delta) => state.last_delta,
                        };
                        SumPoint {
                            attributes: attributes.clone(),
                            start_time: start,
                            time: t,
                            value: value.into_metric_value(),
                        }
                    })
                    .collect();
                if temporality == Temporality::Delta {
                    *lock_or_recover(&self.start) = t;
                }
                MetricData::Sum(SumData {
                    temporality,
                    is_monotonic,
                    points,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::MetricValue;
    use std::sync::atomic::AtomicI64;

    fn sum_value(data: &MetricData) -> MetricValue {
        let MetricData::Sum(sum) = data else {
            panic!("expected sum data");
        };
        assert_eq!(sum.points.len(), 1);
        sum.points[0].value
    }

    #[test]
    fn counter_reset_detection() {
        let storage = ObservableStorage::<u64>::new(ObservableKind::Counter);
        let observed = Arc::new(AtomicU64::new(0));
        let source = observed.clone();
        storage.register_callback(move |result| {
            result.observe(source.load(Ordering::Relaxed), &[]);
        });

        observed.store(10, Ordering::Relaxed);
        assert_eq!(
            sum_value(&storage.collect(Temporality::Cumulative)),
            MetricValue::U64(10)
        );

        observed.store(25, Ordering::Relaxed);
        assert_eq!(
            sum_value(&storage.collect(Temporality::Cumulative)),
            MetricValue::U64(25)
        );

        // The observed total going backwards means the source restarted;
        // continuity is preserved by treating the value as a fresh delta.
        observed.store(4, Ordering::Relaxed);
        assert_eq!(
            sum_value(&storage.collect(Temporality::Cumulative)),
            MetricValue::U64(29)
        );
    }

    #[test]
    fn up_down_reports_absolute() {
        let storage = ObservableStorage::<i64>::new(ObservableKind::UpDownCounter);
        let observed = Arc::new(AtomicI64::new(7));
        let source = observed.clone();
        storage.register_callback(move |result| {
            result.observe(source.load(Ordering::Relaxed), &[]);
        });

        assert_eq!(
            sum_value(&storage.collect(Temporality::Cumulative)),
            MetricValue::I64(7)
        );
        observed.store(-2, Ordering::Relaxed);
        assert_eq!(
            sum_value(&storage.collect(Temporality::Cumulative)),
            MetricValue::I64(-2)
        );
    }

    #[test]
    fn panicking_callback_does_not_abort_collection() {
        let storage = ObservableStorage::<u64>::new(ObservableKind::Gauge);
        storage.register_callback(|_| panic!("misbehaving callback"));
        storage.register_callback(|result| result.observe(3, &[]));

        let MetricData::Gauge(gauge) = storage.collect(Temporality::Cumulative) else {
            panic!("expected gauge data");
        };
        assert_eq!(gauge.points.len(), 1);
        assert_eq!(gauge.points[0].value, MetricValue::U64(3));
    }

    #[test]
    fn unregistered_callback_stops_observing() {
        let storage = ObservableStorage::<u64>::new(ObservableKind::Gauge);
        let id = storage.register_callback(|result| result.observe(1, &[]));
        storage.unregister_callback(id);

        let MetricData::Gauge(gauge) = storage.collect(Temporality::Cumulative) else {
            panic!("expected gauge data");
        };
        assert!(gauge.points.is_empty());
    }
}
