//! Metric instruments and their aggregation storage.
//!
//! Instruments are created through a [`Meter`], obtained from an
//! [`SdkMeterProvider`]. Synchronous instruments aggregate measurements
//! per attribute set as they happen; observable instruments run their
//! callbacks when a reader collects. A
//! [`PeriodicExportingMetricReader`] drives collection on an interval and
//! hands the result to a [`MetricExporter`].
//!
//! ```
//! use vantage::metrics::SdkMeterProvider;
//! use vantage::KeyValue;
//!
//! let provider = SdkMeterProvider::builder().build();
//! let meter = provider.meter("my-component");
//!
//! let requests = meter.u64_counter("requests").with_unit("{request}").build();
//! requests.add(1, &[KeyValue::new("route", "/health")]);
//! # provider.shutdown().unwrap();
//! ```

pub mod data;
mod exporter;
mod in_memory_exporter;
mod instrument;
mod internal;
mod meter;
mod meter_provider;
mod periodic_reader;

pub use exporter::MetricExporter;
pub use in_memory_exporter::InMemoryMetricExporter;
pub use instrument::{
    CallbackRegistration, Counter, Gauge, Histogram, HistogramBuilder, InstrumentBuilder,
    InstrumentKind, ObservableCounter, ObservableGauge, ObservableInstrumentBuilder,
    ObservableUpDownCounter, ObservableResult, UpDownCounter,
};
pub use meter::Meter;
pub use meter_provider::{MeterProviderBuilder, SdkMeterProvider};
pub use periodic_reader::{PeriodicExportingMetricReader, PeriodicReaderBuilder};

use thiserror::Error;

/// Whether metric points carry totals since the stream started or only the
/// change since the previous export.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Temporality {
    /// Points accumulate since the start of the stream.
    #[default]
    Cumulative,
    /// Points carry the change since the last collection; storage resets
    /// after every collection.
    Delta,
}

/// Errors returned by the metrics API.
#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum MetricError {
    /// A runtime misuse, such as adding a negative value to a monotonic
    /// counter.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// An invalid configuration at instrument creation.
    #[error("configuration error: {0}")]
    Config(String),
}

/// A specialized `Result` for metric operations.
pub type MetricResult<T> = Result<T, MetricError>;
