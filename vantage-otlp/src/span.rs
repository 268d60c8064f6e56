//! OTLP exporter for spans.

#[cfg(feature = "http-proto")]
use crate::exporter::http::{HttpExporterBuilder, OtlpHttpClient};
#[cfg(feature = "grpc-tonic")]
use crate::exporter::tonic::{trace::TonicTraceClient, TonicExporterBuilder};
use crate::exporter::{
    Compression, ExportConfig, ExporterBuildError, HasExportConfig, Signal,
};
use crate::OTEL_EXPORTER_OTLP_PROTOCOL;
use std::fmt;
use std::sync::Mutex;
use vantage::config;
use vantage::error::SdkResult;
use vantage::trace::SpanData;
use vantage::Resource;
use vantage_proto::transform::group_spans;

/// An OTLP span exporter, pluggable into the SDK's span processors.
///
/// ```no_run
/// # fn main() -> Result<(), vantage_otlp::ExporterBuildError> {
/// use vantage_otlp::WithExportConfig;
///
/// let exporter = vantage_otlp::SpanExporter::builder()
///     .with_tonic()
///     .with_endpoint("https://collector.internal:4317")
///     .build()?;
/// # let _ = exporter; Ok(())
/// # }
/// ```
pub struct SpanExporter {
    client: SupportedTransportClient,
    resource: Mutex<Resource>,
}

enum SupportedTransportClient {
    #[cfg(feature = "grpc-tonic")]
    Tonic(TonicTraceClient),
    #[cfg(feature = "http-proto")]
    Http(OtlpHttpClient),
}

impl fmt::Debug for SpanExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpanExporter").finish()
    }
}

impl SpanExporter {
    /// Creates a builder; pick a transport with
    /// [`with_tonic`](SpanExporterBuilder::with_tonic) or
    /// [`with_http`](SpanExporterBuilder::with_http), or let
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` decide through
    /// [`build`](SpanExporterBuilder::build).
    pub fn builder() -> SpanExporterBuilder {
        SpanExporterBuilder::default()
    }
}

impl vantage::trace::SpanExporter for SpanExporter {
    fn export(&self, batch: Vec<SpanData>) -> SdkResult {
        let resource = self
            .resource
            .lock()
            .map(|resource| resource.clone())
            .unwrap_or_default();
        let request = group_spans(batch, &resource);
        let result = match &self.client {
            #[cfg(feature = "grpc-tonic")]
            SupportedTransportClient::Tonic(client) => client.export(request),
            #[cfg(feature = "http-proto")]
            SupportedTransportClient::Http(client) => {
                client.export_message(&request, "TraceService.Export")
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

/// Transport selection for a [`SpanExporter`].
#[derive(Debug, Default)]
pub struct SpanExporterBuilder {
    _private: (),
}

impl SpanExporterBuilder {
    /// Continue with the gRPC transport.
    #[cfg(feature = "grpc-tonic")]
    pub fn with_tonic(self) -> TonicSpanExporterBuilder {
        TonicSpanExporterBuilder {
            inner: TonicExporterBuilder::default(),
        }
    }

    /// Continue with the HTTP/protobuf transport.
    #[cfg(feature = "http-proto")]
    pub fn with_http(self) -> HttpSpanExporterBuilder {
        HttpSpanExporterBuilder {
            inner: HttpExporterBuilder::default(),
        }
    }

    /// Builds with the transport selected by
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` (`grpc` default, or
    /// `http/protobuf`).
    pub fn build(self) -> Result<SpanExporter, ExporterBuildError> {
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

/// Configures a gRPC span exporter.
#[cfg(feature = "grpc-tonic")]
#[derive(Debug, Default)]
pub struct TonicSpanExporterBuilder {
    inner: TonicExporterBuilder,
}

#[cfg(feature = "grpc-tonic")]
impl HasExportConfig for TonicSpanExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "grpc-tonic")]
impl TonicSpanExporterBuilder {
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

    /// Uses the given PEM bundle to verify the collector instead of the
    /// system roots.
    pub fn with_ca_certificate(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.inner = self.inner.with_ca_certificate(path);
        self
    }

    /// Presents the given PEM key and certificate chain for mTLS.
    pub fn with_client_identity(
        mut self,
        certificate: impl Into<std::path::PathBuf>,
        key: impl Into<std::path::PathBuf>,
    ) -> Self {
        self.inner = self.inner.with_client_identity(certificate, key);
        self
    }

    /// Builds the exporter, resolving the remaining settings from the
    /// layered configuration.
    pub fn build(self) -> Result<SpanExporter, ExporterBuildError> {
        let transport = self.inner.build_transport(Signal::Traces)?;
        Ok(SpanExporter {
            client: SupportedTransportClient::Tonic(TonicTraceClient::new(transport)),
            resource: Mutex::new(Resource::empty()),
        })
    }
}

/// Configures an HTTP/protobuf span exporter.
#[cfg(feature = "http-proto")]
#[derive(Debug, Default)]
pub struct HttpSpanExporterBuilder {
    inner: HttpExporterBuilder,
}

#[cfg(feature = "http-proto")]
impl HasExportConfig for HttpSpanExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "http-proto")]
impl HttpSpanExporterBuilder {
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
    pub fn build(self) -> Result<SpanExporter, ExporterBuildError> {
        let client = self.inner.build_client(Signal::Traces)?;
        Ok(SpanExporter {
            client: SupportedTransportClient::Http(client),
            resource: Mutex::new(Resource::empty()),
        })
    }
}
