//! Log records, loggers and processors.
//!
//! The log pipeline mirrors the span pipeline: a [`Logger`] (from an
//! [`SdkLoggerProvider`]) emits immutable records into registered
//! [`LogProcessor`]s, which buffer them and hand batches to a
//! [`LogExporter`]. Records emitted while a span is current are
//! automatically correlated with it.
//!
//! ```
//! use vantage::logs::{AnyValue, SdkLoggerProvider, Severity};
//!
//! let provider = SdkLoggerProvider::builder().build();
//! let logger = provider.logger("my-component");
//!
//! let mut record = logger.create_log_record();
//! record.set_severity_number(Severity::Info);
//! record.set_body(AnyValue::from("cache warmed"));
//! logger.emit(record);
//! # provider.shutdown().unwrap();
//! ```

mod batch_log_processor;
mod export;
mod in_memory_exporter;
mod log_processor;
mod logger;
mod logger_provider;
mod record;

pub use batch_log_processor::{
    BatchLogConfig, BatchLogConfigBuilder, BatchLogProcessor, BatchLogProcessorBuilder,
};
pub use export::{LogBatch, LogExporter};
pub use in_memory_exporter::InMemoryLogExporter;
pub use log_processor::{LogProcessor, SimpleLogProcessor};
pub use logger::Logger;
pub use logger_provider::{LoggerProviderBuilder, SdkLoggerProvider};
pub use record::{AnyValue, LogRecordLimits, SdkLogRecord, Severity, TraceContext};
