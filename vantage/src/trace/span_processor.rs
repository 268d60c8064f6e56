//! # Span Processor Interface
//!
//! Span processors hook span start and end, buffering finished spans and
//! handing them to exporters. Processors are registered on the
//! [`SdkTracerProvider`] and invoked in registration order; all tracers of
//! a provider share the same processors.
//!
//! ```ascii
//!   +-----+--------------+   +-----------------------+   +-------------------+
//!   |     |              |   |                       |   |                   |
//!   | SDK | Tracer.start()+--> (Batch)SpanProcessor  +--->  (OTLP)Exporter   |
//!   |     | Span.end()   |   | (Simple)SpanProcessor |   |                   |
//!   +-----+--------------+   +-----------------------+   +-------------------+
//! ```
//!
//! [`SdkTracerProvider`]: crate::trace::SdkTracerProvider

use crate::config;
use crate::error::{SdkError, SdkResult};
use crate::trace::{Span, SpanData, SpanExporter};
use crate::{sdk_debug, sdk_error, sdk_warn, Context, Resource};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Delay interval between two consecutive exports.
const OTEL_BSP_SCHEDULE_DELAY: &str = "OTEL_BSP_SCHEDULE_DELAY";
const OTEL_BSP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(5_000);
/// Maximum queue size.
const OTEL_BSP_MAX_QUEUE_SIZE: &str = "OTEL_BSP_MAX_QUEUE_SIZE";
const OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to the queue size.
const OTEL_BSP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BSP_MAX_EXPORT_BATCH_SIZE";
const OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time to export data.
const OTEL_BSP_EXPORT_TIMEOUT: &str = "OTEL_BSP_EXPORT_TIMEOUT";
const OTEL_BSP_EXPORT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

/// An interface for hooks on span start and end.
///
/// `on_start` and `on_end` are called synchronously on the thread driving
/// the span, so they must not block.
pub trait SpanProcessor: Send + Sync + fmt::Debug {
    /// Called when a span is started. The span is mutable so processors can
    /// seed attributes.
    fn on_start(&self, span: &mut Span, cx: &Context);

    /// Called with the immutable snapshot of every recording span that
    /// ends. Record-only spans arrive here with their `sampled` flag
    /// unset; dropped spans were never created and never arrive.
    fn on_end(&self, span: SpanData);

    /// Export all buffered spans, returning when they have been handed to
    /// the exporter or the processor's timeout elapsed.
    fn force_flush(&self) -> SdkResult;

    /// Drain buffered spans and shut down the exporter.
    fn shutdown(&self) -> SdkResult;

    /// Receives the provider's resource before the pipeline starts.
    fn set_resource(&mut self, _resource: &Resource) {}
}

/// A [`SpanProcessor`] that exports each span synchronously when it ends.
///
/// Keeps spans strictly ordered at the cost of blocking the thread that
/// ends the span; not recommended in production.
pub struct SimpleSpanProcessor {
    exporter: Mutex<Box<dyn SpanExporter>>,
    is_shutdown: AtomicBool,
}

impl SimpleSpanProcessor {
    pub(crate) fn new(exporter: Box<dyn SpanExporter>) -> Self {
        SimpleSpanProcessor {
            exporter: Mutex::new(exporter),
            is_shutdown: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for SimpleSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleSpanProcessor").finish()
    }
}

impl SpanProcessor for SimpleSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        if self.is_shutdown.load(Ordering::Relaxed) {
            sdk_warn!(
                name: "SimpleSpanProcessor.OnEnd.AfterShutdown",
                message = "span received after shutdown, dropping"
            );
            return;
        }

        let result = self
            .exporter
            .lock()
            .map_err(|_| SdkError::InternalFailure("SimpleSpanProcessor mutex poisoned".into()))
            .and_then(|exporter| exporter.export(vec![span]));
        if let Err(err) = result {
            // Telemetry failures are logged, never propagated to the span's
            // thread.
            sdk_error!(
                name: "SimpleSpanProcessor.ExportError",
                error = err.to_string()
            );
        }
    }

    fn force_flush(&self) -> SdkResult {
        if let Ok(exporter) = self.exporter.lock() {
            exporter.force_flush()
        } else {
            Err(SdkError::InternalFailure(
                "SimpleSpanProcessor mutex poisoned".into(),
            ))
        }
    }

    fn shutdown(&self) -> SdkResult {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.shutdown()
        } else {
            Err(SdkError::InternalFailure(
                "SimpleSpanProcessor mutex poisoned".into(),
            ))
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut exporter) = self.exporter.lock() {
            exporter.set_resource(resource);
        }
    }
}

/// Messages sent from the application threads to the worker thread.
#[derive(Debug)]
enum BatchMessage {
    /// Sent when the number of queued spans reaches the batch size.
    ExportSpans(Arc<AtomicBool>),
    /// Flush the current buffer to the exporter.
    ForceFlush(SyncSender<SdkResult>),
    /// Drain the buffer, shut the exporter down and exit the worker.
    Shutdown(SyncSender<SdkResult>),
    /// Install the provider's resource on the exporter.
    SetResource(Arc<Resource>),
}

/// A [`SpanProcessor`] that batches finished spans on a dedicated
/// background thread.
///
/// Spans are buffered in a bounded queue of `max_queue_size` entries and
/// exported in chunks of `max_export_batch_size` when the queue holds a
/// full batch, when `scheduled_delay` elapses, or on
/// `force_flush`/`shutdown`. A full queue drops the new span and counts it,
/// keeping the caller non-blocking. A single export is in flight at a time.
///
/// ### Example
///
/// ```
/// use vantage::trace::{BatchSpanProcessor, BatchConfigBuilder, SdkTracerProvider};
/// use vantage::trace::InMemorySpanExporter;
/// use std::time::Duration;
///
/// let exporter = InMemorySpanExporter::default();
/// let processor = BatchSpanProcessor::builder(exporter)
///     .with_batch_config(
///         BatchConfigBuilder::default()
///             .with_max_queue_size(4096)
///             .with_scheduled_delay(Duration::from_secs(5))
///             .build(),
///     )
///     .build();
///
/// let provider = SdkTracerProvider::builder()
///     .with_span_processor(processor)
///     .build();
/// # provider.shutdown().unwrap();
/// ```
pub struct BatchSpanProcessor {
    span_sender: SyncSender<SpanData>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    export_message_sent: Arc<AtomicBool>,
    current_batch_size: Arc<AtomicUsize>,
    max_export_batch_size: usize,
    dropped_spans_count: AtomicUsize,
    max_queue_size: usize,
}

impl fmt::Debug for BatchSpanProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchSpanProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .finish()
    }
}

impl BatchSpanProcessor {
    pub(crate) fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: SpanExporter + 'static,
    {
        let (span_sender, span_receiver) = mpsc::sync_channel::<SpanData>(config.max_queue_size);
        let (message_sender, message_receiver) = mpsc::sync_channel::<BatchMessage>(64);
        let max_queue_size = config.max_queue_size;
        let max_export_batch_size = config.max_export_batch_size;
        let current_batch_size = Arc::new(AtomicUsize::new(0));
        let current_batch_size_for_thread = current_batch_size.clone();
        let forceflush_timeout = config.max_export_timeout;
        let shutdown_timeout = config.max_export_timeout;

        let handle = thread::Builder::new()
            .name("vantage.trace.BatchProcessor".to_string())
            .spawn(move || {
                sdk_debug!(
                    name: "BatchSpanProcessor.ThreadStarted",
                    interval_in_millisecs = config.scheduled_delay.as_millis(),
                    max_export_batch_size = config.max_export_batch_size,
                    max_queue_size = max_queue_size
                );
                let mut exporter = exporter;
                let mut last_export_time = Instant::now();
                let mut batch = Vec::with_capacity(config.max_export_batch_size);
                let current_batch_size = current_batch_size_for_thread;

                loop {
                    let remaining_time = config
                        .scheduled_delay
                        .checked_sub(last_export_time.elapsed())
                        .unwrap_or(config.scheduled_delay);

                    match message_receiver.recv_timeout(remaining_time) {
                        Ok(BatchMessage::ExportSpans(export_message_sent)) => {
                            // The message has been seen; new enqueues may
                            // request another export.
                            export_message_sent.store(false, Ordering::Relaxed);
                            let _ = Self::drain_and_export(
                                &span_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = Self::drain_and_export(
                                &span_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                            let _ = sender.send(result);
                        }
                        Ok(BatchMessage::Shutdown(sender)) => {
                            let result = Self::drain_and_export(
                                &span_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                            let _ = exporter.shutdown();
                            let _ = sender.send(result);
                            sdk_debug!(
                                name: "BatchSpanProcessor.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = Self::drain_and_export(
                                &span_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            sdk_debug!(
                                name: "BatchSpanProcessor.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        BatchSpanProcessor {
            span_sender,
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout,
            shutdown_timeout,
            export_message_sent: Arc::new(AtomicBool::new(false)),
            current_batch_size,
            max_export_batch_size,
            dropped_spans_count: AtomicUsize::new(0),
            max_queue_size,
        }
    }

    /// Create a builder for a batch processor wrapping `exporter`.
    pub fn builder<E>(exporter: E) -> BatchSpanProcessorBuilder<E>
    where
        E: SpanExporter + 'static,
    {
        BatchSpanProcessorBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    /// Pulls queued spans in batch-sized chunks and exports them until the
    /// count observed on entry has been handled.
    fn drain_and_export<E>(
        span_receiver: &mpsc::Receiver<SpanData>,
        exporter: &E,
        batch: &mut Vec<SpanData>,
        last_export_time: &mut Instant,
        current_batch_size: &AtomicUsize,
        config: &BatchConfig,
    ) -> SdkResult
    where
        E: SpanExporter + ?Sized,
    {
        let target = current_batch_size.load(Ordering::Relaxed);
        let mut result = Ok(());
        let mut total_exported = 0usize;

        while target > 0 && total_exported < target {
            while let Ok(span) = span_receiver.try_recv() {
                batch.push(span);
                if batch.len() == config.max_export_batch_size {
                    break;
                }
            }
            if batch.is_empty() {
                break;
            }
            let count = batch.len();
            total_exported += count;

            *last_export_time = Instant::now();
            let export_result = exporter.export(std::mem::take(batch));
            if let Err(err) = export_result {
                sdk_error!(
                    name: "BatchSpanProcessor.ExportError",
                    error = err.to_string()
                );
                result = Err(err);
            }
            current_batch_size.fetch_sub(count, Ordering::Relaxed);
        }
        result
    }
}

impl SpanProcessor for BatchSpanProcessor {
    fn on_start(&self, _span: &mut Span, _cx: &Context) {
        // Ignored
    }

    fn on_end(&self, span: SpanData) {
        match self.span_sender.try_send(span) {
            Ok(_) => {
                if self.current_batch_size.fetch_add(1, Ordering::Relaxed) + 1
                    >= self.max_export_batch_size
                    && !self.export_message_sent.load(Ordering::Relaxed)
                    && !self.export_message_sent.swap(true, Ordering::Relaxed)
                {
                    if self
                        .message_sender
                        .try_send(BatchMessage::ExportSpans(self.export_message_sent.clone()))
                        .is_err()
                    {
                        self.export_message_sent.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(TrySendError::Full(_)) => {
                // Drop the new span to preserve liveness; the total is
                // reported at shutdown.
                if self.dropped_spans_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    sdk_warn!(
                        name: "BatchSpanProcessor.SpanDroppingStarted",
                        message = "span queue full, dropping spans until there is room; total count reported at shutdown"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                sdk_warn!(
                    name: "BatchSpanProcessor.OnEnd.AfterShutdown",
                    message = "span received after shutdown, dropping"
                );
            }
        }
    }

    fn force_flush(&self) -> SdkResult {
        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::ForceFlush(sender)) {
            Ok(_) => receiver
                .recv_timeout(self.forceflush_timeout)
                .map_err(|err| match err {
                    RecvTimeoutError::Timeout => SdkError::Timeout(self.forceflush_timeout),
                    other => SdkError::InternalFailure(other.to_string()),
                })?,
            Err(TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "force_flush control channel full".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Err(SdkError::AlreadyShutdown),
        }
    }

    fn shutdown(&self) -> SdkResult {
        let dropped = self.dropped_spans_count.load(Ordering::Relaxed);
        if dropped > 0 {
            sdk_warn!(
                name: "BatchSpanProcessor.SpansDropped",
                dropped_spans = dropped,
                max_queue_size = self.max_queue_size,
                message = "spans were dropped due to a full queue; consider raising the queue size or lowering the schedule delay"
            );
        }

        let (sender, receiver) = mpsc::sync_channel(1);
        match self.message_sender.try_send(BatchMessage::Shutdown(sender)) {
            Ok(_) => {
                let result = receiver
                    .recv_timeout(self.shutdown_timeout)
                    .map_err(|err| match err {
                        RecvTimeoutError::Timeout => SdkError::Timeout(self.shutdown_timeout),
                        other => SdkError::InternalFailure(other.to_string()),
                    })?;
                if let Some(handle) = self
                    .handle
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .take()
                {
                    let _ = handle.join();
                }
                result
            }
            Err(TrySendError::Full(_)) => Err(SdkError::InternalFailure(
                "shutdown control channel full".into(),
            )),
            Err(TrySendError::Disconnected(_)) => Ok(()),
        }
    }

    fn set_resource(&mut self, resource: &Resource) {
        let _ = self
            .message_sender
            .try_send(BatchMessage::SetResource(Arc::new(resource.clone())));
    }
}

/// A builder for creating [`BatchSpanProcessor`] instances.
#[derive(Debug)]
pub struct BatchSpanProcessorBuilder<E> {
    exporter: E,
    config: BatchConfig,
}

impl<E> BatchSpanProcessorBuilder<E>
where
    E: SpanExporter + 'static,
{
    /// Set the batch configuration.
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        BatchSpanProcessorBuilder { config, ..self }
    }

    /// Build the processor; this spawns the worker thread.
    pub fn build(self) -> BatchSpanProcessor {
        BatchSpanProcessor::new(self.exporter, self.config)
    }
}

/// Batch span processor configuration.
///
/// Use [`BatchConfigBuilder`] to build an instance; defaults honor the
/// `OTEL_BSP_*` configuration keys.
#[derive(Debug)]
pub struct BatchConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

/// A builder for [`BatchConfig`].
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    /// Starts from spec defaults overridden by `OTEL_BSP_MAX_QUEUE_SIZE`,
    /// `OTEL_BSP_SCHEDULE_DELAY`, `OTEL_BSP_MAX_EXPORT_BATCH_SIZE` and
    /// `OTEL_BSP_EXPORT_TIMEOUT`. Programmatic values override both.
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: config::get_u64(OTEL_BSP_MAX_QUEUE_SIZE)
                .map(|v| v as usize)
                .unwrap_or(OTEL_BSP_MAX_QUEUE_SIZE_DEFAULT),
            scheduled_delay: config::get_duration_millis(OTEL_BSP_SCHEDULE_DELAY)
                .unwrap_or(OTEL_BSP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: config::get_u64(OTEL_BSP_MAX_EXPORT_BATCH_SIZE)
                .map(|v| v as usize)
                .unwrap_or(OTEL_BSP_MAX_EXPORT_BATCH_SIZE_DEFAULT),
            max_export_timeout: config::get_duration_millis(OTEL_BSP_EXPORT_TIMEOUT)
                .unwrap_or(OTEL_BSP_EXPORT_TIMEOUT_DEFAULT),
        }
    }
}

impl BatchConfigBuilder {
    /// Set the maximum number of spans buffered before new spans are
    /// dropped. Default 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the delay between two consecutive scheduled exports. Default 5s.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the maximum number of spans exported in one batch. Default 512;
    /// clamped to the queue size.
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set the maximum time an export (and therefore a flush or shutdown
    /// wait) may take. Default 30s.
    pub fn with_max_export_timeout(mut self, max_export_timeout: Duration) -> Self {
        self.max_export_timeout = max_export_timeout;
        self
    }

    /// Build the [`BatchConfig`].
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            // The batch can never exceed the queue.
            max_export_batch_size: self.max_export_batch_size.min(self.max_queue_size),
            max_export_timeout: self.max_export_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn spawn_spans(provider: &SdkTracerProvider, count: usize) {
        let tracer = provider.tracer("bsp-tests");
        for i in 0..count {
            let mut span = tracer.start(format!("span-{i}"));
            span.end();
        }
    }

    #[test]
    fn batch_waits_for_trigger() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_max_export_batch_size(5)
                    .with_scheduled_delay(Duration::from_secs(10))
                    .build(),
            )
            .build();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .build();

        spawn_spans(&provider, 3);
        // Neither the batch size nor the delay has been reached.
        assert_eq!(exporter.get_finished_spans().len(), 0);

        provider.force_flush().unwrap();
        assert_eq!(exporter.get_finished_spans().len(), 3);
        provider.shutdown().unwrap();
    }

    #[test]
    fn batch_exports_on_batch_size() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_max_export_batch_size(4)
                    .with_scheduled_delay(Duration::from_secs(60))
                    .build(),
            )
            .build();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .build();

        spawn_spans(&provider, 4);
        // The worker exports asynchronously once the batch fills.
        let deadline = Instant::now() + Duration::from_secs(5);
        while exporter.get_finished_spans().len() < 4 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(exporter.get_finished_spans().len(), 4);
        provider.shutdown().unwrap();
    }

    /// An exporter that parks inside `export` until the test hangs up the
    /// release channel.
    #[derive(Debug)]
    struct StallExporter {
        release: Mutex<mpsc::Receiver<()>>,
        exported: Arc<Mutex<Vec<SpanData>>>,
    }

    impl SpanExporter for StallExporter {
        fn export(&self, batch: Vec<SpanData>) -> SdkResult {
            let _ = self.release.lock().unwrap().recv();
            self.exported.lock().unwrap().extend(batch);
            Ok(())
        }
    }

    #[test]
    fn queue_overflow_drops_new_spans() {
        let (release_tx, release_rx) = mpsc::channel();
        let exported = Arc::new(Mutex::new(Vec::new()));
        let processor = BatchSpanProcessor::builder(StallExporter {
            release: Mutex::new(release_rx),
            exported: exported.clone(),
        })
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_max_queue_size(2)
                .with_max_export_batch_size(2)
                .with_scheduled_delay(Duration::from_secs(60))
                .build(),
        )
        .build();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .build();

        // With the exporter stalled, the worker can hold at most one batch
        // in flight while the queue holds two more; the rest must drop.
        spawn_spans(&provider, 8);
        drop(release_tx);
        provider.force_flush().unwrap();
        provider.shutdown().unwrap();

        let exported = exported.lock().unwrap();
        assert!(exported.len() <= 4, "exported {} spans", exported.len());
        assert!(exported.len() >= 2);
    }

    #[test]
    fn shutdown_drains_pending_spans() {
        let exporter = InMemorySpanExporter::default();
        let processor = BatchSpanProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchConfigBuilder::default()
                    .with_scheduled_delay(Duration::from_secs(60))
                    .build(),
            )
            .build();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .build();

        spawn_spans(&provider, 7);
        provider.shutdown().unwrap();
        assert_eq!(exporter.get_finished_spans().len(), 7);
    }

    #[test]
    fn env_config_is_honored() {
        temp_env::with_vars(
            [
                ("OTEL_BSP_SCHEDULE_DELAY", Some("120")),
                ("OTEL_BSP_MAX_QUEUE_SIZE", Some("100")),
                ("OTEL_BSP_MAX_EXPORT_BATCH_SIZE", Some("400")),
            ],
            || {
                let config = BatchConfig::default();
                assert_eq!(config.scheduled_delay, Duration::from_millis(120));
                assert_eq!(config.max_queue_size, 100);
                // Batch size is clamped to the queue size.
                assert_eq!(config.max_export_batch_size, 100);
            },
        );
    }
}
