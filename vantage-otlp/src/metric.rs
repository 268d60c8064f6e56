//! OTLP exporter for metrics.

#[cfg(feature = "http-proto")]
use crate::exporter::http::{HttpExporterBuilder, OtlpHttpClient};
#[cfg(feature = "grpc-tonic")]
use crate::exporter::tonic::{metrics::TonicMetricsClient, TonicExporterBuilder};
use crate::exporter::{Compression, ExportConfig, ExporterBuildError, HasExportConfig, Signal};
use crate::OTEL_EXPORTER_OTLP_PROTOCOL;
use std::fmt;
use vantage::config;
use vantage::error::SdkResult;
use vantage::metrics::data::ResourceMetrics;
use vantage::metrics::Temporality;
use vantage_proto::transform::resource_metrics_request;

/// An OTLP metric exporter, pluggable into a periodic reader.
///
/// ```no_run
/// # fn main() -> Result<(), vantage_otlp::ExporterBuildError> {
/// use vantage::metrics::{PeriodicExportingMetricReader, SdkMeterProvider};
///
/// let exporter = vantage_otlp::MetricExporter::builder().with_tonic().build()?;
/// let reader = PeriodicExportingMetricReader::builder(exporter).build();
/// let provider = SdkMeterProvider::builder().with_reader(reader).build();
/// # provider.shutdown().unwrap(); Ok(())
/// # }
/// ```
pub struct MetricExporter {
    client: SupportedTransportClient,
    temporality: Temporality,
}

enum SupportedTransportClient {
    #[cfg(feature = "grpc-tonic")]
    Tonic(TonicMetricsClient),
    #[cfg(feature = "http-proto")]
    Http(OtlpHttpClient),
}

impl fmt::Debug for MetricExporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricExporter")
            .field("temporality", &self.temporality)
            .finish()
    }
}

impl MetricExporter {
    /// Creates a builder; pick a transport or let
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` decide.
    pub fn builder() -> MetricExporterBuilder {
        MetricExporterBuilder::default()
    }
}

impl vantage::metrics::MetricExporter for MetricExporter {
    fn export(&self, metrics: &ResourceMetrics) -> SdkResult {
        let request = resource_metrics_request(metrics.clone());
        let result = match &self.client {
            #[cfg(feature = "grpc-tonic")]
            SupportedTransportClient::Tonic(client) => client.export(request),
            #[cfg(feature = "http-proto")]
            SupportedTransportClient::Http(client) => {
                client.export_message(&request, "MetricsService.Export")
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

    fn temporality(&self) -> Temporality {
        self.temporality
    }
}

/// Transport selection for a [`MetricExporter`].
#[derive(Debug, Default)]
pub struct MetricExporterBuilder {
    temporality: Temporality,
}

impl MetricExporterBuilder {
    /// Sets the temporality readers default to (cumulative if unset).
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Continue with the gRPC transport.
    #[cfg(feature = "grpc-tonic")]
    pub fn with_tonic(self) -> TonicMetricExporterBuilder {
        TonicMetricExporterBuilder {
            inner: TonicExporterBuilder::default(),
            temporality: self.temporality,
        }
    }

    /// Continue with the HTTP/protobuf transport.
    #[cfg(feature = "http-proto")]
    pub fn with_http(self) -> HttpMetricExporterBuilder {
        HttpMetricExporterBuilder {
            inner: HttpExporterBuilder::default(),
            temporality: self.temporality,
        }
    }

    /// Builds with the transport selected by
    /// `OTEL_EXPORTER_OTLP_PROTOCOL` (`grpc` default, or
    /// `http/protobuf`).
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
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

/// Configures a gRPC metric exporter.
#[cfg(feature = "grpc-tonic")]
#[derive(Debug, Default)]
pub struct TonicMetricExporterBuilder {
    inner: TonicExporterBuilder,
    temporality: Temporality,
}

#[cfg(feature = "grpc-tonic")]
impl HasExportConfig for TonicMetricExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "grpc-tonic")]
impl TonicMetricExporterBuilder {
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

    /// Sets the temporality readers default to (cumulative if unset).
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Builds the exporter, resolving the remaining settings from the
    /// layered configuration.
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
        let transport = self.inner.build_transport(Signal::Metrics)?;
        Ok(MetricExporter {
            client: SupportedTransportClient::Tonic(TonicMetricsClient::new(transport)),
            temporality: self.temporality,
        })
    }
}

/// Configures an HTTP/protobuf metric exporter.
#[cfg(feature = "http-proto")]
#[derive(Debug, Default)]
pub struct HttpMetricExporterBuilder {
    inner: HttpExporterBuilder,
    temporality: Temporality,
}

#[cfg(feature = "http-proto")]
impl HasExportConfig for HttpMetricExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.inner.export_config
    }
}

#[cfg(feature = "http-proto")]
impl HttpMetricExporterBuilder {
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

    /// Sets the temporality readers default to (cumulative if unset).
    pub fn with_temporality(mut self, temporality: Temporality) -> Self {
        self.temporality = temporality;
        self
    }

    /// Builds the exporter, resolving the remaining settings from the
    /// layered configuration.
    pub fn build(self) -> Result<MetricExporter, ExporterBuildError> {
        let client = self.inner.build_client(Signal::Metrics)?;
        Ok(MetricExporter {
            client: SupportedTransportClient::Http(client),
            temporality: self.temporality,
        })
    }
}
