//! # Batch Log Processor
//!
//! Buffers emitted records and exports them in batches from a dedicated
//! background thread, so the emitting thread never blocks on the network.
//!
//! ```ascii
//!   +-----+---------------+   +----------------------+   +-------------------+
//!   |     |               |   |                      |   |                   |
//!   | SDK | Logger.emit() +---> BatchLogProcessor    +--->  (OTLP)Exporter   |
//!   +-----+---------------+   +----------------------+   +-------------------+
//! ```

use crate::config;
use crate::error::{SdkError, SdkResult};
use crate::logs::{LogExporter, SdkLogRecord};
use crate::{sdk_debug, sdk_error, sdk_warn, InstrumentationScope, Resource};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Delay interval between two consecutive exports.
const OTEL_BLRP_SCHEDULE_DELAY: &str = "OTEL_BLRP_SCHEDULE_DELAY";
const OTEL_BLRP_SCHEDULE_DELAY_DEFAULT: Duration = Duration::from_millis(1_000);
/// Maximum queue size.
const OTEL_BLRP_MAX_QUEUE_SIZE: &str = "OTEL_BLRP_MAX_QUEUE_SIZE";
const OTEL_BLRP_MAX_QUEUE_SIZE_DEFAULT: usize = 2_048;
/// Maximum batch size, must be less than or equal to the queue size.
const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE: &str = "OTEL_BLRP_MAX_EXPORT_BATCH_SIZE";
const OTEL_BLRP_MAX_EXPORT_BATCH_SIZE_DEFAULT: usize = 512;
/// Maximum allowed time to export data.
const OTEL_BLRP_EXPORT_TIMEOUT: &str = "OTEL_BLRP_EXPORT_TIMEOUT";
const OTEL_BLRP_EXPORT_TIMEOUT_DEFAULT: Duration = Duration::from_millis(30_000);

type LogsData = Box<(SdkLogRecord, InstrumentationScope)>;

#[derive(Debug)]
enum BatchMessage {
    ExportLogs(Arc<AtomicBool>),
    ForceFlush(SyncSender<SdkResult>),
    Shutdown(SyncSender<SdkResult>),
    SetResource(Arc<Resource>),
}

/// A [`LogProcessor`] that batches emitted records on a dedicated
/// background thread.
///
/// Mirrors the batch span processor: records are buffered in a bounded
/// queue of `max_queue_size` entries and exported in chunks of
/// `max_export_batch_size` when a full batch is pending, when
/// `scheduled_delay` elapses, or on `force_flush`/`shutdown`. A full
/// queue drops the new record and counts it.
///
/// [`LogProcessor`]: crate::logs::LogProcessor
pub struct BatchLogProcessor {
    logs_sender: SyncSender<LogsData>,
    message_sender: SyncSender<BatchMessage>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    forceflush_timeout: Duration,
    shutdown_timeout: Duration,
    export_message_sent: Arc<AtomicBool>,
    current_batch_size: Arc<AtomicUsize>,
    max_export_batch_size: usize,
    dropped_logs_count: AtomicUsize,
    max_queue_size: usize,
}

impl fmt::Debug for BatchLogProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLogProcessor")
            .field("max_queue_size", &self.max_queue_size)
            .field("max_export_batch_size", &self.max_export_batch_size)
            .finish()
    }
}

impl BatchLogProcessor {
    pub(crate) fn new<E>(exporter: E, config: BatchLogConfig) -> Self
    where
        E: LogExporter + 'static,
    {
        let (logs_sender, logs_receiver) = mpsc::sync_channel::<LogsData>(config.max_queue_size);
        let (message_sender, message_receiver) = mpsc::sync_channel::<BatchMessage>(64);
        let max_queue_size = config.max_queue_size;
        let max_export_batch_size = config.max_export_batch_size;
        let current_batch_size = Arc::new(AtomicUsize::new(0));
        let current_batch_size_for_thread = current_batch_size.clone();
        let forceflush_timeout = config.max_export_timeout;
        let shutdown_timeout = config.max_export_timeout;

        let handle = thread::Builder::new()
            .name("vantage.logs.BatchProcessor".to_string())
            .spawn(move || {
                sdk_debug!(
                    name: "BatchLogProcessor.ThreadStarted",
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
                        Ok(BatchMessage::ExportLogs(export_message_sent)) => {
                            export_message_sent.store(false, Ordering::Relaxed);
                            let _ = Self::drain_and_export(
                                &logs_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                        }
                        Ok(BatchMessage::ForceFlush(sender)) => {
                            let result = Self::drain_and_export(
                                &logs_receiver,
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
                                &logs_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                            let _ = exporter.shutdown();
                            let _ = sender.send(result);
                            sdk_debug!(
                                name: "BatchLogProcessor.ThreadExiting",
                                reason = "ShutdownRequested"
                            );
                            break;
                        }
                        Ok(BatchMessage::SetResource(resource)) => {
                            exporter.set_resource(&resource);
                        }
                        Err(RecvTimeoutError::Timeout) => {
                            let _ = Self::drain_and_export(
                                &logs_receiver,
                                &exporter,
                                &mut batch,
                                &mut last_export_time,
                                &current_batch_size,
                                &config,
                            );
                        }
                        Err(RecvTimeoutError::Disconnected) => {
                            sdk_debug!(
                                name: "BatchLogProcessor.ThreadExiting",
                                reason = "MessageSenderDisconnected"
                            );
                            break;
                        }
                    }
                }
            })
            .expect("failed to spawn thread");

        BatchLogProcessor {
            logs_sender,
            message_sender,
            handle: Mutex::new(Some(handle)),
            forceflush_timeout,
            shutdown_timeout,
            export_message_sent: Arc::new(AtomicBool::new(false)),
            current_batch_size,
            max_export_batch_size,
            dropped_logs_count: AtomicUsize::new(0),
            max_queue_size,
        }
    }

    /// Create a builder for a batch processor wrapping `exporter`.
    pub fn builder<E>(exporter: E) -> BatchLogProcessorBuilder<E>
    where
        E: LogExporter + 'static,
    {
        BatchLogProcessorBuilder {
            exporter,
            config: BatchLogConfig::default(),
        }
    }

    fn drain_and_export<E>(
        logs_receiver: &mpsc::Receiver<LogsData>,
        exporter: &E,
        batch: &mut Vec<LogsData>,
        last_export_time: &mut Instant,
        current_batch_size: &AtomicUsize,
        config: &BatchLogConfig,
    ) -> SdkResult
    where
        E: LogExporter + ?Sized,
    {
        let target = current_batch_size.load(Ordering::Relaxed);
        let mut result = Ok(());
        let mut total_exported = 0usize;

        while target > 0 && total_exported < target {
            while let Ok(log) = logs_receiver.try_recv() {
                batch.push(log);
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
            let to_export = batch.drain(..).map(|boxed| *boxed).collect();
            let export_result = exporter.export(to_export);
            if let Err(err) = export_result {
                sdk_error!(
                    name: "BatchLogProcessor.ExportError",
                    error = err.to_string()
                );
                result = Err(err);
            }
            current_batch_size.fetch_sub(count, Ordering::Relaxed);
        }
        result
    }
}

impl crate::logs::LogProcessor for BatchLogProcessor {
    fn on_emit(&self, record: SdkLogRecord, scope: &InstrumentationScope) {
        match self
            .logs_sender
            .try_send(Box::new((record, scope.clone())))
        {
            Ok(_) => {
                if self.current_batch_size.fetch_add(1, Ordering::Relaxed) + 1
                    >= self.max_export_batch_size
                    && !self.export_message_sent.load(Ordering::Relaxed)
                    && !self.export_message_sent.swap(true, Ordering::Relaxed)
                {
                    if self
                        .message_sender
                        .try_send(BatchMessage::ExportLogs(self.export_message_sent.clone()))
                        .is_err()
                    {
                        self.export_message_sent.store(false, Ordering::Relaxed);
                    }
                }
            }
            Err(TrySendError::Full(_)) => {
                if self.dropped_logs_count.fetch_add(1, Ordering::Relaxed) == 0 {
                    sdk_warn!(
                        name: "BatchLogProcessor.LogDroppingStarted",
                        message = "log queue full, dropping records until there is room; total count reported at shutdown"
                    );
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                sdk_warn!(
                    name: "BatchLogProcessor.OnEmit.AfterShutdown",
                    message = "log record received after shutdown, dropping"
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
        let dropped = self.dropped_logs_count.load(Ordering::Relaxed);
        if dropped > 0 {
            sdk_warn!(
                name: "BatchLogProcessor.LogsDropped",
                dropped_logs = dropped,
                max_queue_size = self.max_queue_size,
                message = "log records were dropped due to a full queue; consider raising the queue size or lowering the schedule delay"
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

/// A builder for [`BatchLogProcessor`].
#[derive(Debug)]
pub struct BatchLogProcessorBuilder<E> {
    exporter: E,
    config: BatchLogConfig,
}

impl<E> BatchLogProcessorBuilder<E>
where
    E: LogExporter + 'static,
{
    /// Set the batch configuration.
    pub fn with_batch_config(self, config: BatchLogConfig) -> Self {
        BatchLogProcessorBuilder { config, ..self }
    }

    /// Build the processor; this spawns the worker thread.
    pub fn build(self) -> BatchLogProcessor {
        BatchLogProcessor::new(self.exporter, self.config)
    }
}

/// Batch log processor configuration; defaults honor the `OTEL_BLRP_*`
/// configuration keys.
#[derive(Debug)]
pub struct BatchLogConfig {
    pub(crate) max_queue_size: usize,
    pub(crate) scheduled_delay: Duration,
    pub(crate) max_export_batch_size: usize,
    pub(crate) max_export_timeout: Duration,
}

impl Default for BatchLogConfig {
    fn default() -> Self {
        BatchLogConfigBuilder::default().build()
    }
}

/// A builder for [`BatchLogConfig`].
#[derive(Debug)]
pub struct BatchLogConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    max_export_timeout: Duration,
}

impl Default for BatchLogConfigBuilder {
    /// Starts from the defaults (queue 2048, delay 1s, batch 512, timeout
    /// 30s) overridden by `OTEL_BLRP_MAX_QUEUE_SIZE`,
    /// `OTEL_BLRP_SCHEDULE_DELAY`, `OTEL_BLRP_MAX_EXPORT_BATCH_SIZE` and
    /// `OTEL_BLRP_EXPORT_TIMEOUT`. Programmatic values override both.
    fn default() -> Self {
        BatchLogConfigBuilder {
            max_queue_size: config::get_u64(OTEL_BLRP_MAX_QUEUE_SIZE)
                .map(|v| v as usize)
                .unwrap_or(OTEL_BLRP_MAX_QUEUE_SIZE_DEFAULT),
            scheduled_delay: config::get_duration_millis(OTEL_BLRP_SCHEDULE_DELAY)
                .unwrap_or(OTEL_BLRP_SCHEDULE_DELAY_DEFAULT),
            max_export_batch_size: config::get_u64(OTEL_BLRP_MAX_EXPORT_BATCH_SIZE)
                .map(|v| v as usize)
                .unwrap_or(OTEL_BLRP_MAX_EXPORT_BATCH_SIZE_DEFAULT),
            max_export_timeout: config::get_duration_millis(OTEL_BLRP_EXPORT_TIMEOUT)
                .unwrap_or(OTEL_BLRP_EXPORT_TIMEOUT_DEFAULT),
        }
    }
}

impl BatchLogConfigBuilder {
    /// Set the maximum number of records buffered before new records are
    /// dropped. Default 2048.
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set the delay between two consecutive scheduled exports. Default 1s.
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set the maximum number of records exported in one batch. Default
    /// 512; clamped to the queue size.
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

    /// Build the [`BatchLogConfig`].
    pub fn build(self) -> BatchLogConfig {
        BatchLogConfig {
            max_queue_size: self.max_queue_size,
            scheduled_delay: self.scheduled_delay,
            max_export_batch_size: self.max_export_batch_size.min(self.max_queue_size),
            max_export_timeout: self.max_export_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::{InMemoryLogExporter, SdkLoggerProvider, Severity};

    fn emit_records(provider: &SdkLoggerProvider, count: usize) {
        let logger = provider.logger("blp-tests");
        for i in 0..count {
            let mut record = logger.create_log_record();
            record.set_severity_number(Severity::Info);
            record.set_body(format!("record-{i}").into());
            logger.emit(record);
        }
    }

    #[test]
    fn flush_drains_buffered_records() {
        let exporter = InMemoryLogExporter::default();
        let processor = BatchLogProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchLogConfigBuilder::default()
                    .with_scheduled_delay(Duration::from_secs(60))
                    .build(),
            )
            .build();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(processor)
            .build();

        emit_records(&provider, 3);
        assert_eq!(exporter.get_emitted_logs().len(), 0);
        provider.force_flush().unwrap();
        assert_eq!(exporter.get_emitted_logs().len(), 3);
        provider.shutdown().unwrap();
    }

    #[test]
    fn shutdown_drains_and_stops() {
        let exporter = InMemoryLogExporter::default();
        let processor = BatchLogProcessor::builder(exporter.clone())
            .with_batch_config(
                BatchLogConfigBuilder::default()
                    .with_scheduled_delay(Duration::from_secs(60))
                    .build(),
            )
            .build();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(processor)
            .build();

        emit_records(&provider, 5);
        provider.shutdown().unwrap();
        assert_eq!(exporter.get_emitted_logs().len(), 5);

        // Emissions after shutdown go nowhere.
        emit_records(&provider, 2);
        assert_eq!(exporter.get_emitted_logs().len(), 5);
    }

    #[test]
    fn env_config_is_honored() {
        temp_env::with_vars(
            [
                ("OTEL_BLRP_SCHEDULE_DELAY", Some("250")),
                ("OTEL_BLRP_MAX_EXPORT_BATCH_SIZE", Some("16")),
            ],
            || {
                let config = BatchLogConfig::default();
                assert_eq!(config.scheduled_delay, Duration::from_millis(250));
                assert_eq!(config.max_export_batch_size, 16);
                assert_eq!(config.max_queue_size, 2048);
            },
        );
    }
}
