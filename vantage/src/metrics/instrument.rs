use crate::metrics::internal::{
    GaugeStorage, HistogramStorage, Number, ObservableStorage, SumStorage,
};
use crate::metrics::{MetricError, MetricResult};
use crate::KeyValue;
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

pub use crate::metrics::internal::ObservableResult;

/// The kinds of instruments a [`Meter`] can create.
///
/// [`Meter`]: crate::metrics::Meter
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InstrumentKind {
    /// A synchronous, monotonic sum.
    Counter,
    /// A synchronous, signed sum.
    UpDownCounter,
    /// A synchronous value distribution.
    Histogram,
    /// A synchronous last-value.
    Gauge,
    /// A callback-reported monotonic sum.
    ObservableCounter,
    /// A callback-reported signed sum.
    ObservableUpDownCounter,
    /// A callback-reported last-value.
    ObservableGauge,
}

/// Identity and metadata of an instrument.
#[derive(Clone, Debug)]
pub(crate) struct Descriptor {
    pub(crate) name: Cow<'static, str>,
    pub(crate) description: Cow<'static, str>,
    pub(crate) unit: Cow<'static, str>,
    #[allow(dead_code)]
    pub(crate) kind: InstrumentKind,
}

/// Instrument names start with a letter and continue with letters, digits,
/// `_`, `.`, `-` or `/`, up to 255 characters.
pub(crate) fn validate_instrument_name(name: &str) -> MetricResult<()> {
    if name.is_empty() || name.len() > 255 {
        return Err(MetricError::Config(format!(
            "instrument name must be 1..=255 characters, got {:?}",
            name
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("non-empty");
    if !first.is_ascii_alphabetic() {
        return Err(MetricError::Config(format!(
            "instrument name must start with a letter, got {:?}",
            name
        )));
    }
    if chars.any(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))) {
        return Err(MetricError::Config(format!(
            "instrument name contains invalid characters: {:?}",
            name
        )));
    }
    Ok(())
}

pub(crate) trait SyncInstrument<T>: Send + Sync {
    fn measure(&self, value: T, attributes: &[KeyValue]);
}

impl<T: Number> SyncInstrument<T> for SumStorage<T> {
    fn measure(&self, value: T, attributes: &[KeyValue]) {
        self.add(value, attributes);
    }
}

impl<T: Number> SyncInstrument<T> for HistogramStorage<T> {
    fn measure(&self, value: T, attributes: &[KeyValue]) {
        self.record(value, attributes);
    }
}

impl<T: Number> SyncInstrument<T> for GaugeStorage<T> {
    fn measure(&self, value: T, attributes: &[KeyValue]) {
        self.record(value, attributes);
    }
}

pub(crate) trait ObservableInstrument<T>: Send + Sync {
    fn register(&self, callback: Box<dyn Fn(&ObservableResult<T>) + Send + Sync>) -> u64;
    fn unregister(&self, id: u64);
}

impl<T: Number> ObservableInstrument<T> for ObservableStorage<T> {
    fn register(&self, callback: Box<dyn Fn(&ObservableResult<T>) + Send + Sync>) -> u64 {
        self.register_callback(move |result| callback(result))
    }

    fn unregister(&self, id: u64) {
        self.unregister_callback(id);
    }
}

/// An instrument that records monotonically increasing values.
#[derive(Clone)]
pub struct Counter<T> {
    inner: Arc<dyn SyncInstrument<T>>,
}

impl<T> fmt::Debug for Counter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Counter").finish()
    }
}

impl<T> Counter<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        Counter { inner }
    }
}

impl Counter<u64> {
    /// Records an increment to the counter.
    pub fn add(&self, value: u64, attributes: &[KeyValue]) {
        self.inner.measure(value, attributes);
    }
}

impl Counter<f64> {
    /// Records an increment to the counter.
    ///
    /// Counters are monotonic; a negative increment is rejected with
    /// [`MetricError::InvalidArgument`] and nothing is recorded.
    pub fn add(&self, value: f64, attributes: &[KeyValue]) -> MetricResult<()> {
        if value < 0.0 {
            return Err(MetricError::InvalidArgument(format!(
                "counters only accept non-negative increments, got {value}"
            )));
        }
        self.inner.measure(value, attributes);
        Ok(())
    }
}

/// An instrument that records signed deltas to a sum.
#[derive(Clone)]
pub struct UpDownCounter<T> {
    inner: Arc<dyn SyncInstrument<T>>,
}

impl<T> fmt::Debug for UpDownCounter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpDownCounter").finish()
    }
}

impl<T> UpDownCounter<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        UpDownCounter { inner }
    }

    /// Records a signed delta.
    pub fn add(&self, value: T, attributes: &[KeyValue]) {
        self.inner.measure(value, attributes);
    }
}

/// An instrument that records a distribution of values.
#[derive(Clone)]
pub struct Histogram<T> {
    inner: Arc<dyn SyncInstrument<T>>,
}

impl<T> fmt::Debug for Histogram<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Histogram").finish()
    }
}

impl<T> Histogram<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        Histogram { inner }
    }

    /// Records a value in the distribution.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        self.inner.measure(value, attributes);
    }
}

/// An instrument that records the latest value.
#[derive(Clone)]
pub struct Gauge<T> {
    inner: Arc<dyn SyncInstrument<T>>,
}

impl<T> fmt::Debug for Gauge<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish()
    }
}

impl<T> Gauge<T> {
    pub(crate) fn new(inner: Arc<dyn SyncInstrument<T>>) -> Self {
        Gauge { inner }
    }

    /// Replaces the current value for the attribute set.
    pub fn record(&self, value: T, attributes: &[KeyValue]) {
        self.inner.measure(value, attributes);
    }
}

/// A handle to remove a callback from an observable instrument.
///
/// Dropping the handle keeps the callback registered; call
/// [`CallbackRegistration::unregister`] to remove it.
pub struct CallbackRegistration {
    unregister: Option<Box<dyn FnOnce() + Send>>,
}

impl fmt::Debug for CallbackRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackRegistration").finish()
    }
}

impl CallbackRegistration {
    pub(crate) fn new(unregister: impl FnOnce() + Send + 'static) -> Self {
        CallbackRegistration {
            unregister: Some(Box::new(unregister)),
        }
    }

    /// Removes the callback; it will not run in future collections.
    pub fn unregister(mut self) {
        if let Some(unregister) = self.unregister.take() {
            unregister();
        }
    }
}

macro_rules! observable_handle {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name<T> {
            inner: Arc<dyn ObservableInstrument<T>>,
        }

        impl<T> fmt::Debug for $name<T> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($name)).finish()
            }
        }

        impl<T> $name<T> {
            pub(crate) fn new(inner: Arc<dyn ObservableInstrument<T>>) -> Self {
                $name { inner }
            }

            /// Registers an additional callback, invoked on every
            /// collection with a fresh [`ObservableResult`].
            pub fn register_callback<F>(&self, callback: F) -> CallbackRegistration
            where
                F: Fn(&ObservableResult<T>) + Send + Sync + 'static,
                T: 'static,
            {
                let id = self.inner.register(Box::new(callback));
                let inner = self.inner.clone();
                CallbackRegistration::new(move || inner.unregister(id))
            }
        }
    };
}

observable_handle!(
    /// A callback-reported monotonic sum. Callbacks observe absolute
    /// totals; decreases are treated as a restart of the source.
    ObservableCounter
);
observable_handle!(
    /// A callback-reported signed sum. Callbacks observe absolute values.
    ObservableUpDownCounter
);
observable_handle!(
    /// A callback-reported last-value.
    ObservableGauge
);

pub use builders::{HistogramBuilder, InstrumentBuilder, ObservableInstrumentBuilder};

mod builders {
    use super::*;
    use crate::metrics::Meter;
    use std::marker::PhantomData;

    /// Configures a synchronous instrument before creation.
    pub struct InstrumentBuilder<'a, I> {
        pub(crate) meter: &'a Meter,
        pub(crate) name: Cow<'static, str>,
        pub(crate) description: Cow<'static, str>,
        pub(crate) unit: Cow<'static, str>,
        pub(crate) _instrument: PhantomData<I>,
    }

    impl<I> fmt::Debug for InstrumentBuilder<'_, I> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("InstrumentBuilder")
                .field("name", &self.name)
                .finish()
        }
    }

    impl<'a, I> InstrumentBuilder<'a, I> {
        pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
            InstrumentBuilder {
                meter,
                name,
                description: Cow::Borrowed(""),
                unit: Cow::Borrowed(""),
                _instrument: PhantomData,
            }
        }

        /// Sets the human readable description.
        pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
            self.description = description.into();
            self
        }

        /// Sets the unit, following the [UCUM] convention.
        ///
        /// [UCUM]: https://ucum.org/ucum
        pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
            self.unit = unit.into();
            self
        }

        pub(crate) fn descriptor(&self, kind: InstrumentKind) -> Descriptor {
            Descriptor {
                name: self.name.clone(),
                description: self.description.clone(),
                unit: self.unit.clone(),
                kind,
            }
        }
    }

    macro_rules! sync_build {
        ($t:ty, $handle:ident, $kind:expr, $create:ident) => {
            impl InstrumentBuilder<'_, $handle<$t>> {
                /// Creates the instrument and registers it for collection.
                pub fn build(self) -> $handle<$t> {
                    let descriptor = self.descriptor($kind);
                    $handle::new(self.meter.$create::<$t>(descriptor))
                }
            }
        };
    }

    sync_build!(u64, Counter, InstrumentKind::Counter, create_sum_monotonic);
    sync_build!(f64, Counter, InstrumentKind::Counter, create_sum_monotonic);
    sync_build!(
        i64,
        UpDownCounter,
        InstrumentKind::UpDownCounter,
        create_sum_signed
    );
    sync_build!(
        f64,
        UpDownCounter,
        InstrumentKind::UpDownCounter,
        create_sum_signed
    );
    sync_build!(u64, Gauge, InstrumentKind::Gauge, create_gauge);
    sync_build!(i64, Gauge, InstrumentKind::Gauge, create_gauge);
    sync_build!(f64, Gauge, InstrumentKind::Gauge, create_gauge);

    /// Configures a histogram before creation.
    pub struct HistogramBuilder<'a, T> {
        pub(crate) meter: &'a Meter,
        pub(crate) name: Cow<'static, str>,
        pub(crate) description: Cow<'static, str>,
        pub(crate) unit: Cow<'static, str>,
        pub(crate) boundaries: Option<Vec<f64>>,
        pub(crate) _value: PhantomData<T>,
    }

    impl<T> fmt::Debug for HistogramBuilder<'_, T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("HistogramBuilder")
                .field("name", &self.name)
                .field("boundaries", &self.boundaries)
                .finish()
        }
    }

    impl<'a, T> HistogramBuilder<'a, T> {
        pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
            HistogramBuilder {
                meter,
                name,
                description: Cow::Borrowed(""),
                unit: Cow::Borrowed(""),
                boundaries: None,
                _value: PhantomData,
            }
        }

        /// Sets the human readable description.
        pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
            self.description = description.into();
            self
        }

        /// Sets the unit, following the [UCUM] convention.
        ///
        /// [UCUM]: https://ucum.org/ucum
        pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
            self.unit = unit.into();
            self
        }

        /// Sets the explicit bucket boundaries, sorted ascending. The
        /// `(last, +inf)` overflow bucket is added automatically.
        pub fn with_boundaries(mut self, boundaries: Vec<f64>) -> Self {
            self.boundaries = Some(boundaries);
            self
        }
    }

    macro_rules! histogram_build {
        ($t:ty) => {
            impl HistogramBuilder<'_, $t> {
                /// Creates the histogram and registers it for collection.
                pub fn build(self) -> Histogram<$t> {
                    let descriptor = Descriptor {
                        name: self.name.clone(),
                        description: self.description.clone(),
                        unit: self.unit.clone(),
                        kind: InstrumentKind::Histogram,
                    };
                    Histogram::new(self.meter.create_histogram::<$t>(descriptor, self.boundaries))
                }
            }
        };
    }

    histogram_build!(u64);
    histogram_build!(f64);

    /// Configures an observable instrument before creation.
    pub struct ObservableInstrumentBuilder<'a, I, T> {
        pub(crate) meter: &'a Meter,
        pub(crate) name: Cow<'static, str>,
        pub(crate) description: Cow<'static, str>,
        pub(crate) unit: Cow<'static, str>,
        pub(crate) callbacks: Vec<Box<dyn Fn(&ObservableResult<T>) + Send + Sync>>,
        pub(crate) _instrument: PhantomData<I>,
    }

    impl<I, T> fmt::Debug for ObservableInstrumentBuilder<'_, I, T> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ObservableInstrumentBuilder")
                .field("name", &self.name)
                .field("callbacks", &self.callbacks.len())
                .finish()
        }
    }

    impl<'a, I, T> ObservableInstrumentBuilder<'a, I, T> {
        pub(crate) fn new(meter: &'a Meter, name: Cow<'static, str>) -> Self {
            ObservableInstrumentBuilder {
                meter,
                name,
                description: Cow::Borrowed(""),
                unit: Cow::Borrowed(""),
                callbacks: Vec::new(),
                _instrument: PhantomData,
            }
        }

        /// Sets the human readable description.
        pub fn with_description(mut self, description: impl Into<Cow<'static, str>>) -> Self {
            self.description = description.into();
            self
        }

        /// Sets the unit, following the [UCUM] convention.
        ///
        /// [UCUM]: https://ucum.org/ucum
        pub fn with_unit(mut self, unit: impl Into<Cow<'static, str>>) -> Self {
            self.unit = unit.into();
            self
        }

        /// Adds a callback run on every collection.
        pub fn with_callback<F>(mut self, callback: F) -> Self
        where
            F: Fn(&ObservableResult<T>) + Send + Sync + 'static,
        {
            self.callbacks.push(Box::new(callback));
            self
        }
    }

    macro_rules! observable_build {
        ($t:ty, $handle:ident, $kind:expr) => {
            impl ObservableInstrumentBuilder<'_, $handle<$t>, $t> {
                /// Creates the instrument and registers it for collection.
                pub fn build(self) -> $handle<$t> {
                    let descriptor = Descriptor {
                        name: self.name.clone(),
                        description: self.description.clone(),
                        unit: self.unit.clone(),
                        kind: $kind,
                    };
                    let storage = self.meter.create_observable::<$t>(descriptor, $kind);
                    for callback in self.callbacks {
                        storage.register(callback);
                    }
                    $handle::new(storage)
                }
            }
        };
    }

    observable_build!(u64, ObservableCounter, InstrumentKind::ObservableCounter);
    observable_build!(f64, ObservableCounter, InstrumentKind::ObservableCounter);
    observable_build!(
        i64,
        ObservableUpDownCounter,
        InstrumentKind::ObservableUpDownCounter
    );
    observable_build!(
        f64,
        ObservableUpDownCounter,
        InstrumentKind::ObservableUpDownCounter
    );
    observable_build!(u64, ObservableGauge, InstrumentKind::ObservableGauge);
    observable_build!(i64, ObservableGauge, InstrumentKind::ObservableGauge);
    observable_build!(f64, ObservableGauge, InstrumentKind::ObservableGauge);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(validate_instrument_name("requests").is_ok());
        assert!(validate_instrument_name("http.server.duration").is_ok());
        assert!(validate_instrument_name("a1_b-c/d").is_ok());
        assert!(validate_instrument_name("").is_err());
        assert!(validate_instrument_name("1starts-with-digit").is_err());
        assert!(validate_instrument_name("has space").is_err());
        assert!(validate_instrument_name(&"x".repeat(256)).is_err());
        assert!(validate_instrument_name(&"x".repeat(255)).is_ok());
    }
}
