//! OTLP exporter for log records.

#[cfg(feature = "http-proto")]
use crate::exporter::http::{HttpExporterBuilder, OtlpHttpClient};
#[cfg(feature = "grpc-tonic")]
use crate::exporter::tonic::{logs::TonicLogsClient, TonicExporterBuilder};
use crate::exporter::{Compression, ExportConfig, ExporterBuildError, HasExportConfig, Signal};
use crate::OTEL_EXPORTER_OTLP_PROTOCOL;
use std::fmt;
use std::sync::Mutex;
use vantage::config;
use vantage::error::SdkResult;
use vantage::logs::LogBatch;
use vantage::Resource;
use vantage_proto::transform::group_logs;

/// An OTLP log exporter, pluggable into the SDK's log processors.
///
/// ```no_run
/// # fn main() -> Result<(), vantage_otlp::ExporterBuildError> {
/// use vantage::logs::SdkLoggerProvider;
///
/// let exporter = vantage_otlp::LogExporter::builder().with_tonic().build()?;
/// let provider = SdkLoggerProvider::builder()
///     .with_batch_exporter(exporter)
///     .build();
/// # provider.shutdown().unwrap(); Ok(())
/// # }
/// ```
pub struct LogExporter {
    client: SupportedTransportClient,
    resource: Mutex<Resource>,
}

enum SupportedTransportClient {
    #[cfg(feature = "grpc-tonic")]
    Tonic(TonicLogsClient),
    #[cfg(feature = "http-proto")]
    Http(OtlpHttpClient),
}

impl fmt::Debug for LogExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogExporter").finish()
    }
}

impl LogExporter {
    /// Creates a builder; pick a transport or let
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` decide.
    pub fn builder() -> LogExporterBuilder {
        LogExporterBuilder::default()
    }
}

impl vantage::logs::LogExporter for LogExporter {
    fn export(&self, batch: LogBatch) -> SdkResult {
        let resource = self
            .resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default();
        let request = group_logs(batch, &resource);
        let result = match &self.client {
            #[cfg(feature = "grpc-tonic")]
            SupportedTransportClient::Tonic(client) => client.export(request),
            #[cfg(feature = "http-proto")]
            SupportedTransportClient::Http(client) => {
                client.export_message(&request, "LogsService.Export")
            }
        };
        result.map_err(Into::into)
    }

    fn shutdown(&mut self) -> SdkResult {
        let result = match &self.client {
            #[cfg(feature = "grpc-tonic")]
            SupportedTransportClient::Tonic(client) => client.shutdown(),
            #[cfg(feature = "http-proto")]
            SupportedTransportClient::Http(client) => client.shutdown(),
        };
        result.map_err(Into::into)
    }

    fn set_resource(&mut self, resource: &Resource) {
        if let Ok(mut stored) = self.resource.lock() {
            *stored = resource.clone();
        }
    }
}

/// Transport selection for a [`LogExporter`].
#[derive(Debug, Default)]
pub struct LogExporterBuilder {
    _private: (),
}

impl LogExporterBuilder {
    /// Continue with the gRPC transport.
    #[cfg(feature = "grpc-tonic")]
    pub fn with_tonic(self) -> TonicLogExporterBuilder {
        TonicLogExporterBuilder {
            inner: TonicExporterBuilder::default(),
        }
    }

    /// Continue with the HTTP/protobuf transport.
    #[cfg(feature = "http-proto")]
    pub fn with_http(self) -> HttpLogExporterBuilder {
        HttpLogExporterBuilder {
            inner: HttpExporterBuilder::default(),
        }
    }

    /// Builds with the transport selected by
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` (`grpc` default, or
    /// `http/protobuf`).
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        match config::get(OTEL_EXPORTER_OTLP_PROTOCOL).as_deref() {
            #[cfg(feature = "http-proto")]
            Some("http/protobuf") | Some("http") => self.with_http().build(),
            #[cfg(feature = "grpc-tonic")]
            _ => self.with_tonic().build(),
            #[cfg(not(feature = "grpc-tonic"))]
            _ => self.with_http().build(),
        }
    }
}

/// Configures a gRPC log exporter.
#[cfg(feature = "grpc-tonic")]
#[derive(Debug, Default)]
pub struct TonicLogExporterBuilder {
    inner: TonicExporterBuilder,
}

#[cfg(feature = "grpc-tonic")]
impl HasExportConfig for TonicLogExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "grpc-tonic")]
impl TonicLogExporterBuilder {
    /// Adds metadata sent with every request; entries override any
    /// configured through `OTEL_EXPORTER_OTLP_HEADERS`.
    pub fn with_metadata<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner = self.inner.with_metadata(headers);
        self
    }

    /// Compresses request payloads.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.inner = self.inner.with_compression(compression);
        self
    }

    /// Overrides the retry policy (default: 5 retries from 1s up to 30s).
    pub fn with_retry_policy(mut self, policy: crate::RetryPolicy) -> Self {
        self.inner = self.inner.with_retry_policy(policy);
        self
    }

    /// Downgrades the connection to plaintext.
    pub fn with_insecure(mut self) -> Self {
        self.inner = self.inner.with_insecure();
        self
    }

    /// Builds the exporter, resolving the remaining settings from the
    /// layered configuration.
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        let transport = self.inner.build_transport(Signal::Logs)?;
        Ok(LogExporter {
            client: SupportedTransportClient::Tonic(TonicLogsClient::new(transport)),
            resource: Mutex::new(Resource::empty()),
        })
    }
}

/// Configures an HTTP/protobuf log exporter.
#[cfg(feature = "http-proto")]
#[derive(Debug, Default)]
pub struct HttpLogExporterBuilder {
    inner: HttpExporterBuilder,
}

#[cfg(feature = "http-proto")]
impl HasExportConfig for HttpLogExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "http-proto")]
impl HttpLogExporterBuilder {
    /// Adds headers sent with every request; entries override any
    /// configured through `OTEL_EXPORTER_OTLP_HEADERS`.
    pub fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.inner = self.inner.with_headers(headers);
        self
    }

    /// Compresses request bodies, setting `Content-Encoding` accordingly.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.inner = self.inner.with_compression(compression);
        self
    }

    /// Overrides the retry policy (default: 5 retries from 1s up to 30s).
    pub fn with_retry_policy(mut self, policy: crate::RetryPolicy) -> Self {
        self.inner = self.inner.with_retry_policy(policy);
        self
    }

    /// Builds the exporter, resolving the remaining settings from the
    /// layered configuration.
    pub fn build(self) -> Result<LogExporter, ExporterBuildError> {
        let client = self.inner.build_client(Signal::Logs)?;
        Ok(LogExporter {
            client: SupportedTransportClient::Http(client),
            resource: Mutex::new(Resource::empty()),
        })
    }
}
