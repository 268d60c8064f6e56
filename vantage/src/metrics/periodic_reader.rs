//! A reader that collects and exports metrics on a fixed interval.

use crate::config;
use crate::error::{SdkError, SdkResult};
use crate::metrics::meter_provider::MeterProviderInner;
use crate::metrics::{MetricExporter, Temporality};
use crate::{sdk_debug, sdk_error};
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Mutex, Weak};
use std::thread;
use std::time::Duration;

const OTEL_METRIC_EXPORT_INTERVAL: &str = "OTEL_METRIC_EXPORT_INTERVAL";
const OTEL_METRIC_EXPORT_INTERVAL_DEFAULT: Duration = Duration::from_millis(60_000);
const OTEL_METRIC_EXPORT_TIMEOUT: &str = "OTEL_METRIC_EXPORT_TIMEOUT";
const OTEL_METRIC_EXPORT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

#[derive(Debug)]
enum ReaderMessage {
    Flush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
}

/// Periodically collects every instrument registered with the owning
/// provider and hands the result to its exporter.
///
/// The worker thread starts when the provider is built. An export that
/// outlives the configured timeout is abandoned by the caller side
/// (flush/shutdown return [`SdkError::Timeout`]) and the next tick
/// proceeds. Shutdown performs one final collect-and-export before the
/// exporter itself shuts down.
///
/// ```
/// use vantage::metrics::{InMemoryMetricExporter, PeriodicExportingMetricReader, SdkMeterProvider};
/// use std::time::Duration;
///
/// let exporter = InMemoryMetricExporter::default();
/// let reader = PeriodicExportingMetricReader::builder(exporter)
///     .with_interval(Duration::from_secs(30))
///     .build();
/// let provider = SdkMeterProvider::builder().with_reader(reader).build();
/// # provider.shutdown().unwrap();
/// ```
pub struct PeriodicExportingMetricReader {
    interval: Duration,
    timeout: Duration,
    temporality: Temporality,
    exporter: Mutex<Option<Box<dyn MetricExporter>>>,
    message_sender: Mutex<Option<SyncSender<ReaderMessage>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
}

impl fmt::Debug for PeriodicExportingMetricReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicExportingMetricReader")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("temporality", &self.temporality)
            .finish()
    }
}

impl PeriodicExportingMetricReader {
    /// Create a builder for a reader exporting through `exporter`.
    pub fn builder<E>(exporter: E) -> PeriodicReaderBuilder
    where
        E: MetricExporter + 'static,
    {
        PeriodicReaderBuilder {
            temporality: exporter.temporality(),
            exporter: Box::new(exporter),
            interval: None,
            timeout: None,
        }
    }

    /// Spawns the worker; called by the provider at build time.
    pub(crate) fn start(&self, provider: Weak<MeterProviderInner>) {
        let Some(mut exporter) = self
            .exporter
            .lock()
            .ok()
            .and_then(|mut exporter| exporter.take())
        else {
            return;
        };
        let (message_sender, message_receiver) = mpsc::sync_channel::<ReaderMessage>(16);
        let interval = self.interval;
        let temporality = self.temporality;

        let handle = thread::Builder::new()
            .name("vantage.metrics.PeriodicReader".to_string())
            .spawn(move || {
                sdk_debug!(
                    name: "PeriodicReader.ThreadStarted",
                    interval_in_millisecs = interval.as_millis()
                );
                let collect_and_export = |exporter: &dyn MetricExporter| -> SdkResult {
                    let Some(provider) = provider.upgrade() else {
                        return Err(SdkError::AlreadyShutdown);
                    };
                    let metrics = provider.collect(temporality);
                    let result = exporter.export(&metrics);
                    if let Err(err) = &result {
                        sdk_error!(
                            name: "PeriodicReader.ExportError",
                            error = err.to_string()
                        );
                    }
                    result
                };

                loop {
                    match message_receiver.recv_timeout(interval) {
                        Ok(ReaderMessage::Flush(sender)) => {
                            let _ = sender.send(collect_and_export(&*exporter));
                        }
                        Ok(ReaderMessage::Shutdown(sender)) => {
                            let result = collect_and_export(&*exporter);
                            let _ = exporter.shutdown();
                            let _ = sender.send(result);
                            sdk_debug!(
                                name: "PeriodicReader.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = collect_and_export(&*exporter);
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            sdk_debug!(
                                name: "PeriodicReader.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        if let Ok(mut sender) = self.message_sender.lock() {
            *sender = Some(message_sender);
        }
        if let Ok(mut slot) = self.handle.lock() {
            *slot = Some(handle);
        }
    }

    fn signal<F>(&self, make_message: F) -> SdkResult
    where
        F: FnOnce(SyncSender<SdkResult>) -> ReaderMessage,
    {
        let sender = match self.message_sender.lock() {
            Ok(guard) => guard.clone(),
            Err(_) => None,
        };
        let Some(sender) = sender else {
            return Err(SdkError::AlreadyShutdown);
        };
        let (reply_sender, reply_receiver) = mpsc::sync_channel(1);
        match sender.try_send(make_message(reply_sender)) {
            Ok(_) => reply_receiver
                .recv_timeout(self.timeout)
                .map_err(|err| match err {
                    RecvTimeoutError::Timeout => SdkError::Timeout(self.timeout),
                    other => SdkError::InternalFailure(other.to_string()),
                })?,
            Err(TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "reader control channel full".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(SdkError::AlreadyShutdown),
        }
    }

    /// Collects and exports immediately.
    pub(crate) fn force_flush(&self) -> SdkResult {
        self.signal(ReaderMessage::Flush)
    }

    /// Performs a final collect-and-export, then shuts the exporter down.
    pub(crate) fn shutdown(&self) -> SdkResult {
        let result = self.signal(ReaderMessage::Shutdown);
        if let Ok(mut sender) = self.message_sender.lock() {
            *sender = None;
        }
        if let Some(handle) = self.handle.lock().ok().and_then(|mut handle| handle.take()) {
            let _ = handle.join();
        }
        result
    }
}

/// A builder for [`PeriodicExportingMetricReader`].
pub struct PeriodicReaderBuilder {
    exporter: Box<dyn MetricExporter>,
    temporality: Temporality,
    interval: Option<Duration>,
    timeout: Option<Duration>,
}

impl fmt::Debug for PeriodicReaderBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeriodicReaderBuilder")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl PeriodicReaderBuilder {
    /// Overrides the collection interval (default 60s, or
    /// `OTEL_METRIC_EXPORT_INTERVAL` in milliseconds).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Overrides the per-cycle timeout (default 30s, or
    /// `OTEL_METRIC_EXPORT_TIMEOUT` in milliseconds).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Overrides the temporality (default: the exporter's preference).
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Builds the reader; the worker starts when the provider is built.
    pub fn build(self) -> PeriodicExportingMetricReader {
        PeriodicExportingMetricReader {
            interval: self.interval.or_else(|| config::get_duration_millis(OTEL_METRIC_EXPORT_INTERVAL))
                .unwrap_or(OTEL_METRIC_EXPORT_INTERVAL_DEFAULT),
            timeout: self
                .timeout
                .or_else(|| config::get_duration_millis(OTEL_METRIC_EXPORT_TIMEOUT))
                .unwrap_or(OTEL_METRIC_EXPORT_TIMEOUT_DEFAULT),
            temporality: self.temporality,
            exporter: Mutex::new(Some(self.exporter)),
            message_sender: Mutex::new(None),
            handle: Mutex::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::data::{MetricData, MetricValue};
    use crate::metrics::{InMemoryMetricExporter, SdkMeterProvider};
    use std::time::Instant;

    #[test]
    fn periodic_collection_exports() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicExportingMetricReader::builder(exporter.clone())
            .with_interval(Duration::from_millis(30))
            .build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let counter = provider.meter("periodic").u64_counter("ticks").build();
        counter.add(1, &[]);

        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.get_finished_metrics().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!exporter.get_finished_metrics().is_empty());
        provider.shutdown().unwrap();
    }

    #[test]
    fn shutdown_performs_final_export() {
        let exporter = InMemoryMetricExporter::default();
        let reader = PeriodicExportingMetricReader::builder(exporter.clone())
            .with_interval(Duration::from_secs(3600))
            .build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let counter = provider.meter("final").u64_counter("total").build();
        counter.add(9, &[]);

        provider.shutdown().unwrap();
        let exports = exporter.get_finished_metrics();
        assert_eq!(exports.len(), 1);
        let MetricData::Sum(sum) = &exports[0].scope_metrics[0].metrics[0].data else {
            panic!("expected sum");
        };
        assert_eq!(sum.points[0].value, MetricValue::U64(9));
    }

    #[test]
    fn delta_temporality_resets_between_flushes() {
        let exporter = InMemoryMetricExporter::with_temporality(Temporality::Delta);
        let reader = PeriodicExportingMetricReader::builder(exporter.clone())
            .with_interval(Duration::from_secs(3600))
            .build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        let counter = provider.meter("delta").u64_counter("events").build();

        counter.add(4, &[]);
        provider.force_flush().unwrap();
        counter.add(6, &[]);
        provider.force_flush().unwrap();

        let exports = exporter.get_finished_metrics();
        assert_eq!(exports.len(), 2);
        let value_of = |metrics: &crate::metrics::data::ResourceMetrics| {
            let MetricData::Sum(sum) = &metrics.scope_metrics[0].metrics[0].data else {
                panic!("expected sum");
            };
            sum.points[0].value
        };
        assert_eq!(value_of(&exports[0]), MetricValue::U64(4));
        assert_eq!(value_of(&exports[1]), MetricValue::U64(6));
        provider.shutdown().unwrap();
    }
}
