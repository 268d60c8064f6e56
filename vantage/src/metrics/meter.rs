//! The entry point for creating instruments.

use crate::metrics::data::Metric;
use crate::metrics::instrument::{
    validate_instrument_name, Counter, Descriptor, Gauge, HistogramBuilder,
    InstrumentBuilder, ObservableCounter, ObservableGauge, ObservableInstrument,
    ObservableInstrumentBuilder, ObservableUpDownCounter, SyncInstrument, UpDownCounter,
};
use crate::metrics::internal::{
    GaugeStorage, HistogramStorage, Number, ObservableKind, ObservableStorage, SumStorage,
    DEFAULT_BOUNDARIES,
};
use crate::metrics::Temporality;
use crate::sdk_error;
use crate::InstrumentationScope;
use std::borrow::Cow;
use std::fmt;
use std::sync::{Arc, Mutex};

pub(crate) trait InstrumentCollect: Send + Sync {
    fn collect(&self, temporality: Temporality) -> crate::metrics::data::MetricData;
}

impl<T: Number> InstrumentCollect for SumStorage<T> {
    fn collect(&self, temporality: Temporality) -> crate::metrics::data::MetricData {
        SumStorage::collect(self, temporality)
    }
}

impl<T: Number> InstrumentCollect for HistogramStorage<T> {
    fn collect(&self, temporality: Temporality) -> crate::metrics::data::MetricData {
        HistogramStorage::collect(self, temporality)
    }
}

impl<T: Number> InstrumentCollect for GaugeStorage<T> {
    fn collect(&self, _temporality: Temporality) -> crate::metrics::data::MetricData {
        GaugeStorage::collect(self)
    }
}

impl<T: Number> InstrumentCollect for ObservableStorage<T> {
    fn collect(&self, temporality: Temporality) -> crate::metrics::data::MetricData {
        ObservableStorage::collect(self, temporality)
    }
}

struct RegisteredInstrument {
    descriptor: Descriptor,
    collector: Arc<dyn InstrumentCollect>,
}

/// Creates instruments scoped to one instrumenting library.
///
/// Meters are cheap to clone; instruments created through any clone are
/// registered with the same provider and participate in its collections.
#[derive(Clone)]
pub struct Meter {
    inner: Arc<MeterInner>,
}

struct MeterInner {
    scope: InstrumentationScope,
    instruments: Mutex<Vec<RegisteredInstrument>>,
    enabled: bool,
}

impl fmt::Debug for Meter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Meter")
            .field("scope", &self.inner.scope)
            .finish()
    }
}

impl Meter {
    pub(crate) fn new(scope: InstrumentationScope, enabled: bool) -> Self {
        Meter {
            inner: Arc::new(MeterInner {
                scope,
                instruments: Mutex::new(Vec::new()),
                enabled,
            }),
        }
    }

    /// The instrumentation scope of this meter.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.inner.scope
    }

    /// Creates a monotonic `u64` counter.
    pub fn u64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a monotonic `f64` counter.
    pub fn f64_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, Counter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a signed `i64` up-down counter.
    pub fn i64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a signed `f64` up-down counter.
    pub fn f64_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> InstrumentBuilder<'_, UpDownCounter<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a `u64` histogram.
    pub fn u64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> HistogramBuilder<'_, u64> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates an `f64` histogram.
    pub fn f64_histogram(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> HistogramBuilder<'_, f64> {
        HistogramBuilder::new(self, name.into())
    }

    /// Creates a `u64` gauge.
    pub fn u64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<u64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates an `i64` gauge.
    pub fn i64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<i64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates an `f64` gauge.
    pub fn f64_gauge(&self, name: impl Into<Cow<'static, str>>) -> InstrumentBuilder<'_, Gauge<f64>> {
        InstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported monotonic `u64` counter.
    pub fn u64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableCounter<u64>, u64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported monotonic `f64` counter.
    pub fn f64_observable_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableCounter<f64>, f64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported signed `i64` up-down counter.
    pub fn i64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableUpDownCounter<i64>, i64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported signed `f64` up-down counter.
    pub fn f64_observable_up_down_counter(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableUpDownCounter<f64>, f64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported `u64` gauge.
    pub fn u64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableGauge<u64>, u64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported `i64` gauge.
    pub fn i64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableGauge<i64>, i64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Creates a callback-reported `f64` gauge.
    pub fn f64_observable_gauge(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ObservableInstrumentBuilder<'_, ObservableGauge<f64>, f64> {
        ObservableInstrumentBuilder::new(self, name.into())
    }

    /// Registers `collector` for collection unless the descriptor fails
    /// validation, in which case the instrument still exists but is never
    /// collected.
    fn register(&self, descriptor: Descriptor, collector: Arc<dyn InstrumentCollect>) {
        if !self.inner.enabled {
            return;
        }
        if let Err(err) = validate_instrument_name(&descriptor.name) {
            sdk_error!(
                name: "Meter.InvalidInstrument",
                error = err.to_string()
            );
            return;
        }
        if let Ok(mut instruments) = self.inner.instruments.lock() {
            instruments.push(RegisteredInstrument {
                descriptor,
                collector,
            });
        }
    }

    pub(crate) fn create_sum_monotonic<T: Number>(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrument<T>> {
        let storage = Arc::new(SumStorage::<T>::new(true));
        self.register(descriptor, storage.clone());
        storage
    }

    pub(crate) fn create_sum_signed<T: Number>(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrument<T>> {
        let storage = Arc::new(SumStorage::<T>::new(false));
        self.register(descriptor, storage.clone());
        storage
    }

    pub(crate) fn create_gauge<T: Number>(
        &self,
        descriptor: Descriptor,
    ) -> Arc<dyn SyncInstrument<T>> {
        let storage = Arc::new(GaugeStorage::<T>::new());
        self.register(descriptor, storage.clone());
        storage
    }

    pub(crate) fn create_histogram<T: Number>(
        &self,
        descriptor: Descriptor,
        boundaries: Option<Vec<f64>>,
    ) -> Arc<dyn SyncInstrument<T>> {
        let boundaries = boundaries.unwrap_or_else(|| DEFAULT_BOUNDARIES.to_vec());
        let storage = Arc::new(HistogramStorage::<T>::new(boundaries, true));
        self.register(descriptor, storage.clone());
        storage
    }

    pub(crate) fn create_observable<T: Number>(
        &self,
        descriptor: Descriptor,
        kind: crate::metrics::InstrumentKind,
    ) -> Arc<dyn ObservableInstrument<T>> {
        let observable_kind = match kind {
            crate::metrics::InstrumentKind::ObservableCounter => ObservableKind::Counter,
            crate::metrics::InstrumentKind::ObservableUpDownCounter => {
                ObservableKind::UpDownCounter
            }
            _ => ObservableKind::Gauge,
        };
        let storage = Arc::new(ObservableStorage::<T>::new(observable_kind));
        self.register(descriptor, storage.clone());
        storage
    }

    /// Collects a [`Metric`] per registered instrument; observable
    /// instruments run their callbacks here.
    pub(crate) fn collect(&self, temporality: Temporality) -> Vec<Metric> {
        let Ok(instruments) = self.inner.instruments.lock() else {
            return Vec::new();
        };
        instruments
            .iter()
            .map(|instrument| Metric {
                name: instrument.descriptor.name.clone(),
                description: instrument.descriptor.description.clone(),
                unit: instrument.descriptor.unit.clone(),
                data: instrument.collector.collect(temporality),
            })
            .collect()
    }
}
