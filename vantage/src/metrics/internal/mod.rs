mod histogram;
mod last_value;
mod observable;
mod sum;

pub(crate) use histogram::{HistogramStorage, DEFAULT_BOUNDARIES};
pub(crate) use last_value::GaugeStorage;
pub(crate) use observable::{ObservableKind, ObservableStorage};
pub use observable::ObservableResult;
pub(crate) use sum::SumStorage;

use crate::metrics::data::MetricValue;
use crate::{sdk_warn, KeyValue};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, AddAssign, Sub};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, RwLock};

/// Maximum number of attribute sets tracked per instrument before new sets
/// collapse into the overflow series.
pub(crate) const CARDINALITY_LIMIT: usize = 2000;

static OVERFLOW_ATTRIBUTES: OnceLock<Vec<KeyValue>> = OnceLock::new();

fn overflow_attributes() -> &'static Vec<KeyValue> {
    OVERFLOW_ATTRIBUTES.get_or_init(|| vec![KeyValue::new("otel.metric.overflow", true)])
}

/// A per-attribute-set aggregation state.
pub(crate) trait Aggregator: Send + Sync + 'static {
    /// Static configuration needed to initialize the aggregator, e.g. the
    /// bucket count.
    type InitConfig;

    /// The prepared measurement, e.g. a value plus its bucket index.
    type PreComputedValue;

    /// Called when a new attribute set is first stored.
    fn create(init: &Self::InitConfig) -> Self;

    /// Called for each measurement.
    fn update(&self, value: Self::PreComputedValue);

    /// Returns the current state and resets this instance.
    fn clone_and_reset(&self, init: &Self::InitConfig) -> Self;
}

struct NoAttribs<A> {
    tracker: A,
    is_set: AtomicBool,
}

/// Attribute-keyed storage shared by all aggregations.
///
/// Attribute sets are canonicalized by sorting on key and dropping
/// duplicates, so maps constructed in different orders land in the same
/// tracker. The empty attribute set bypasses the map entirely.
pub(crate) struct ValueMap<A>
where
    A: Aggregator,
{
    no_attribs: NoAttribs<A>,
    trackers: RwLock<HashMap<Vec<KeyValue>, Arc<A>>>,
    config: A::InitConfig,
}

impl<A> ValueMap<A>
where
    A: Aggregator,
{
    pub(crate) fn new(config: A::InitConfig) -> Self {
        ValueMap {
            no_attribs: NoAttribs {
                tracker: A::create(&config),
                is_set: AtomicBool::new(false),
            },
            trackers: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub(crate) fn measure(&self, value: A::PreComputedValue, attributes: &[KeyValue]) {
        if attributes.is_empty() {
            self.no_attribs.tracker.update(value);
            self.no_attribs.is_set.store(true, Ordering::Release);
            return;
        }

        let sorted = sort_and_dedup(attributes);

        // Fast path: the attribute set has been seen before.
        if let Ok(trackers) = self.trackers.read() {
            if let Some(tracker) = trackers.get(&sorted) {
                tracker.update(value);
                return;
            }
        } else {
            return;
        }

        let Ok(mut trackers) = self.trackers.write() else {
            return;
        };
        let count = trackers.len();
        let tracker = match trackers.entry(sorted) {
            Entry::Occupied(occupied) => occupied.get().clone(),
            Entry::Vacant(vacant) => {
                if count >= CARDINALITY_LIMIT {
                    let overflow = trackers
                        .entry(overflow_attributes().clone())
                        .or_insert_with(|| {
                            sdk_warn!(
                                name: "Metrics.CardinalityLimitReached",
                                message = "maximum attribute sets for this instrument reached, new sets collapse into the overflow series"
                            );
                            Arc::new(A::create(&self.config))
                        })
                        .clone();
                    overflow.update(value);
                    return;
                }
                vacant.insert(Arc::new(A::create(&self.config))).clone()
            }
        };
        drop(trackers);
        tracker.update(value);
    }

    /// Visits every attribute set without resetting, for cumulative
    /// collection.
    pub(crate) fn collect_readonly<Res, MapFn>(&self, dest: &mut Vec<Res>, mut map_fn: MapFn)
    where
        MapFn: FnMut(Vec<KeyValue>, &A) -> Res,
    {
        if self.no_attribs.is_set.load(Ordering::Acquire) {
            dest.push(map_fn(Vec::new(), &self.no_attribs.tracker));
        }
        let Ok(trackers) = self.trackers.read() else {
            return;
        };
        for (attrs, tracker) in trackers.iter() {
            dest.push(map_fn(attrs.clone(), tracker));
        }
    }

    /// Drains every attribute set and resets the storage, for delta
    /// collection.
    pub(crate) fn collect_and_reset<Res, MapFn>(&self, dest: &mut Vec<Res>, mut map_fn: MapFn)
    where
        MapFn: FnMut(Vec<KeyValue>, A) -> Res,
    {
        if self.no_attribs.is_set.swap(false, Ordering::AcqRel) {
            dest.push(map_fn(
                Vec::new(),
                self.no_attribs.tracker.clone_and_reset(&self.config),
            ));
        }
        let drained = match self.trackers.write() {
            Ok(mut trackers) => std::mem::take(&mut *trackers),
            Err(_) => return,
        };
        for (attrs, tracker) in drained {
            let tracker = Arc::try_unwrap(tracker)
                .unwrap_or_else(|shared| shared.clone_and_reset(&self.config));
            dest.push(map_fn(attrs, tracker));
        }
    }
}

pub(crate) fn sort_and_dedup(attributes: &[KeyValue]) -> Vec<KeyValue> {
    let mut sorted = attributes.to_vec();
    sorted.sort_by(|a, b| a.key.cmp(&b.key));
    sorted.dedup_by(|a, b| a.key == b.key);
    sorted
}

/// A type whose value can be updated and read atomically. Different
/// numeric types need different backing atomics.
pub(crate) trait AtomicTracker<T>: Sync + Send + 'static {
    fn store(&self, value: T);
    fn add(&self, value: T);
    fn get_value(&self) -> T;
    fn get_and_reset_value(&self) -> T;
}

/// A type for which an atomic tracker can be created.
pub(crate) trait AtomicallyUpdate<T> {
    type AtomicTracker: AtomicTracker<T>;
    fn new_atomic_tracker(init: T) -> Self::AtomicTracker;
}

/// The numeric types instruments are generic over.
pub(crate) trait Number:
    Add<Output = Self>
    + AddAssign
    + Sub<Output = Self>
    + PartialOrd
    + fmt::Debug
    + Clone
    + Copy
    + PartialEq
    + Default
    + Send
    + Sync
    + 'static
    + AtomicallyUpdate<Self>
{
    fn min_value() -> Self;
    fn max_value() -> Self;
    fn into_float(self) -> f64;
    fn into_metric_value(self) -> MetricValue;

    /// `self - prev`, saturating at zero for unsigned types.
    fn signed_delta(self, prev: Self) -> Self;
}

impl Number for u64 {
    fn min_value() -> Self {
        u64::MIN
    }

    fn max_value() -> Self {
        u64::MAX
    }

    fn signed_delta(self, prev: Self) -> Self {
        self.saturating_sub(prev)
    }

    fn into_float(self) -> f64 {
        // May lose precision at high values.
        self as f64
    }

    fn into_metric_value(self) -> MetricValue {
        MetricValue::U64(self)
    }
}

impl Number for i64 {
    fn min_value() -> Self {
        i64::MIN
    }

    fn max_value() -> Self {
        i64::MAX
    }

    fn signed_delta(self, prev: Self) -> Self {
        self - prev
    }

    fn into_float(self) -> f64 {
        self as f64
    }

    fn into_metric_value(self) -> MetricValue {
        MetricValue::I64(self)
    }
}

impl Number for f64 {
    fn min_value() -> Self {
        f64::MIN
    }

    fn max_value() -> Self {
        f64::MAX
    }

    fn signed_delta(self, prev: Self) -> Self {
        self - prev
    }

    fn into_float(self) -> f64 {
        self
    }

    fn into_metric_value(self) -> MetricValue {
        MetricValue::F64(self)
    }
}

impl AtomicTracker<u64> for AtomicU64 {
    fn store(&self, value: u64) {
        self.store(value, Ordering::Relaxed);
    }

    fn add(&self, value: u64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn get_value(&self) -> u64 {
        self.load(Ordering::Relaxed)
    }

    fn get_and_reset_value(&self) -> u64 {
        self.swap(0, Ordering::Relaxed)
    }
}

impl AtomicallyUpdate<u64> for u64 {
    type AtomicTracker = AtomicU64;

    fn new_atomic_tracker(init: u64) -> Self::AtomicTracker {
        AtomicU64::new(init)
    }
}

impl AtomicTracker<i64> for AtomicI64 {
    fn store(&self, value: i64) {
        self.store(value, Ordering::Relaxed);
    }

    fn add(&self, value: i64) {
        self.fetch_add(value, Ordering::Relaxed);
    }

    fn get_value(&self) -> i64 {
        self.load(Ordering::Relaxed)
    }

    fn get_and_reset_value(&self) -> i64 {
        self.swap(0, Ordering::Relaxed)
    }
}

impl AtomicallyUpdate<i64> for i64 {
    type AtomicTracker = AtomicI64;

    fn new_atomic_tracker(init: i64) -> Self::AtomicTracker {
        AtomicI64::new(init)
    }
}

/// Floating points have no native atomics; updates spin on the bit
/// representation.
pub(crate) struct F64AtomicTracker {
    inner: AtomicU64,
}

impl F64AtomicTracker {
    fn new(init: f64) -> Self {
        F64AtomicTracker {
            inner: AtomicU64::new(init.to_bits()),
        }
    }
}

impl AtomicTracker<f64> for F64AtomicTracker {
    fn store(&self, value: f64) {
        self.inner.store(value.to_bits(), Ordering::Relaxed);
    }

    fn add(&self, value: f64) {
        let mut current = self.inner.load(Ordering::Relaxed);
        loop {
            let new = (f64::from_bits(current) + value).to_bits();
            match self
                .inner
                .compare_exchange_weak(current, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => current = observed,
            }
        }
    }

    fn get_value(&self) -> f64 {
        f64::from_bits(self.inner.load(Ordering::Relaxed))
    }

    fn get_and_reset_value(&self) -> f64 {
        f64::from_bits(self.inner.swap(0.0_f64.to_bits(), Ordering::Relaxed))
    }
}

impl AtomicallyUpdate<f64> for f64 {
    type AtomicTracker = F64AtomicTracker;

    fn new_atomic_tracker(init: f64) -> Self::AtomicTracker {
        F64AtomicTracker::new(init)
    }
}

/// Shared bookkeeping to export a `Mutex`-guarded value or recover from
/// poison without unwinding into the caller.
pub(crate) fn lock_or_recover<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poison| poison.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_order_is_canonical() {
        let a = sort_and_dedup(&[KeyValue::new("b", 1), KeyValue::new("a", 2)]);
        let b = sort_and_dedup(&[KeyValue::new("a", 2), KeyValue::new("b", 1)]);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_keys_keep_first_after_sort() {
        let deduped = sort_and_dedup(&[KeyValue::new("a", 1), KeyValue::new("a", 2)]);
        assert_eq!(deduped.len(), 1);
    }

    #[test]
    fn f64_atomic_adds() {
        let tracker = F64AtomicTracker::new(0.0);
        tracker.add(1.5);
        tracker.add(2.25);
        assert_eq!(tracker.get_value(), 3.75);
        assert_eq!(tracker.get_and_reset_value(), 3.75);
        assert_eq!(tracker.get_value(), 0.0);
    }
}
