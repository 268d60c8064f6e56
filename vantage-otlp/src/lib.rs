//! OTLP exporters for the vantage SDK.
//!
//! Serializes spans, metrics and logs into the OpenTelemetry protocol and
//! transmits them to a collector over gRPC (`grpc-tonic` feature, default
//! port 4317) or HTTP/protobuf (`http-proto` feature, default port 4318),
//! with exponential-backoff retry and per-call deadlines.
//!
//! # Quickstart
//!
//! ```no_run
//! use vantage::trace::SdkTracerProvider;
//! use vantage_otlp::WithExportConfig;
//!
//! # fn main() -> Result<(), vantage_otlp::ExporterBuildError> {
//! let exporter = vantage_otlp::SpanExporter::builder()
//!     .with_tonic()
//!     .with_endpoint("https://collector.internal:4317")
//!     .build()?;
//!
//! let provider = SdkTracerProvider::builder()
//!     .with_batch_exporter(exporter)
//!     .build();
//! # provider.shutdown().unwrap();
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Endpoint, protocol, timeout, headers, compression and TLS settings are
//! read from the `OTEL_EXPORTER_OTLP_*` configuration keys, with the
//! signal-specific `OTEL_EXPORTER_OTLP_{TRACES,METRICS,LOGS}_*` variants
//! taking precedence; explicit builder calls override both.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod exporter;
pub mod logs;
pub mod metric;
mod retry;
pub mod span;

pub use exporter::{
    Compression, ExportConfig, ExporterBuildError, HasExportConfig, OtlpError, Protocol,
    WithExportConfig,
};
pub use logs::LogExporter;
pub use metric::MetricExporter;
pub use retry::RetryPolicy;
pub use span::SpanExporter;

/// Target to which the exporter sends signals, e.g. `https://localhost:4317`.
pub const OTEL_EXPORTER_OTLP_ENDPOINT: &str = "OTEL_EXPORTER_OTLP_ENDPOINT";
/// The transport protocol, `grpc` or `http/protobuf`.
pub const OTEL_EXPORTER_OTLP_PROTOCOL: &str = "OTEL_EXPORTER_OTLP_PROTOCOL";
/// Key-value pairs to pass as headers or gRPC metadata.
pub const OTEL_EXPORTER_OTLP_HEADERS: &str = "OTEL_EXPORTER_OTLP_HEADERS";
/// Maximum time the backend may take to process each batch, in milliseconds.
pub const OTEL_EXPORTER_OTLP_TIMEOUT: &str = "OTEL_EXPORTER_OTLP_TIMEOUT";
/// Compression algorithm, `none` or `gzip`.
pub const OTEL_EXPORTER_OTLP_COMPRESSION: &str = "OTEL_EXPORTER_OTLP_COMPRESSION";
/// `true` downgrades a gRPC connection to plaintext.
pub const OTEL_EXPORTER_OTLP_INSECURE: &str = "OTEL_EXPORTER_OTLP_INSECURE";
/// Path to the collector's CA certificate bundle.
pub const OTEL_EXPORTER_OTLP_CERTIFICATE: &str = "OTEL_EXPORTER_OTLP_CERTIFICATE";
/// Path to the client's private key for mTLS.
pub const OTEL_EXPORTER_OTLP_CLIENT_KEY: &str = "OTEL_EXPORTER_OTLP_CLIENT_KEY";
/// Path to the client's certificate chain for mTLS.
pub const OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE: &str = "OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE";

/// Default per-call deadline.
pub const OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT: u64 = 10_000;
