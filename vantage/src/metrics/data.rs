//! Data types produced by metric collection and consumed by exporters.

use crate::metrics::Temporality;
use crate::{InstrumentationScope, KeyValue, Resource};
use std::borrow::Cow;
use std::time::SystemTime;

/// A collection of [`ScopeMetrics`] and the entity that produced them.
#[derive(Clone, Debug)]
pub struct ResourceMetrics {
    /// The entity that collected the metrics.
    pub resource: Resource,
    /// The collection of metrics, grouped by instrumentation scope.
    pub scope_metrics: Vec<ScopeMetrics>,
}

/// The metrics produced by the instruments of one instrumentation scope.
#[derive(Clone, Debug)]
pub struct ScopeMetrics {
    /// The instrumentation scope the metrics came from.
    pub scope: InstrumentationScope,
    /// The metrics, one per instrument.
    pub metrics: Vec<Metric>,
}

/// One instrument's aggregated data at a collection point.
#[derive(Clone, Debug)]
pub struct Metric {
    /// The instrument name.
    pub name: Cow<'static, str>,
    /// The instrument description.
    pub description: Cow<'static, str>,
    /// The instrument unit.
    pub unit: Cow<'static, str>,
    /// The aggregated points.
    pub data: MetricData,
}

/// The aggregation a metric carries, depending on the instrument kind.
#[derive(Clone, Debug)]
pub enum MetricData {
    /// Monotonic or signed sums per attribute set.
    Sum(SumData),
    /// The latest value per attribute set.
    Gauge(GaugeData),
    /// Bucketed value distributions per attribute set.
    Histogram(HistogramData),
}

/// A measurement value, integer or floating point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum MetricValue {
    /// An unsigned integer value.
    U64(u64),
    /// A signed integer value.
    I64(i64),
    /// A floating point value.
    F64(f64),
}

impl MetricValue {
    /// The value as an `f64`, possibly losing precision for large
    /// integers.
    pub fn as_f64(&self) -> f64 {
        match self {
            MetricValue::U64(value) => *value as f64,
            MetricValue::I64(value) => *value as f64,
            MetricValue::F64(value) => *value,
        }
    }
}

/// The points of a sum aggregation.
#[derive(Clone, Debug)]
pub struct SumData {
    /// Whether the points are cumulative or deltas.
    pub temporality: Temporality,
    /// True for counters, false for up-down counters.
    pub is_monotonic: bool,
    /// One point per attribute set.
    pub points: Vec<SumPoint>,
}

/// A single sum value for one attribute set.
#[derive(Clone, Debug)]
pub struct SumPoint {
    /// The attribute set this point describes.
    pub attributes: Vec<KeyValue>,
    /// When the aggregation window started.
    pub start_time: SystemTime,
    /// When the point was collected.
    pub time: SystemTime,
    /// The aggregated value.
    pub value: MetricValue,
}

/// The points of a last-value aggregation.
#[derive(Clone, Debug)]
pub struct GaugeData {
    /// One point per attribute set.
    pub points: Vec<GaugePoint>,
}

/// The latest value for one attribute set.
#[derive(Clone, Debug)]
pub struct GaugePoint {
    /// The attribute set this point describes.
    pub attributes: Vec<KeyValue>,
    /// When the value was observed.
    pub time: SystemTime,
    /// The observed value.
    pub value: MetricValue,
}

/// The points of a histogram aggregation.
#[derive(Clone, Debug)]
pub struct HistogramData {
    /// Whether the points are cumulative or deltas.
    pub temporality: Temporality,
    /// One point per attribute set.
    pub points: Vec<HistogramPoint>,
}

/// A bucketed distribution for one attribute set.
///
/// `bucket_counts` has one more entry than `bounds`; the final bucket
/// counts recordings above the last boundary.
#[derive(Clone, Debug)]
pub struct HistogramPoint {
    /// The attribute set this point describes.
    pub attributes: Vec<KeyValue>,
    /// When the aggregation window started.
    pub start_time: SystemTime,
    /// When the point was collected.
    pub time: SystemTime,
    /// The number of recordings.
    pub count: u64,
    /// The sum of recorded values.
    pub sum: f64,
    /// The smallest recorded value, if tracked.
    pub min: Option<f64>,
    /// The largest recorded value, if tracked.
    pub max: Option<f64>,
    /// The upper boundary of each bucket, sorted ascending.
    pub bounds: Vec<f64>,
    /// The recordings per bucket, including the overflow bucket.
    pub bucket_counts: Vec<u64>,
}
