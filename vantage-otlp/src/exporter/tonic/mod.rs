//! gRPC transport over tonic.
//!
//! Unary calls to the `opentelemetry.proto.collector.{trace,metrics,logs}.v1`
//! services. TLS is on by default for `https` endpoints; `insecure`
//! downgrades to plaintext. The transport owns a current-thread tokio
//! runtime, so exports can be driven from the SDK's worker threads without
//! requiring the host application to run one.

pub(crate) mod logs;
pub(crate) mod metrics;
pub(crate) mod trace;

use crate::exporter::{
    resolve_compression, resolve_headers, signal_get, Compression, ExportConfig,
    ExporterBuildError, HasExportConfig, Signal,
};
use crate::{OTEL_EXPORTER_OTLP_CERTIFICATE, OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE,
    OTEL_EXPORTER_OTLP_CLIENT_KEY, OTEL_EXPORTER_OTLP_INSECURE};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tonic::codec::CompressionEncoding;
use tonic::metadata::{MetadataKey, MetadataMap, MetadataValue};
use tonic::transport::{Certificate, Channel, ClientTlsConfig, Identity};

/// Configuration specific to the tonic transport.
#[derive(Debug, Default)]
pub(crate) struct TonicConfig {
    headers: Vec<(String, String)>,
    compression: Option<Compression>,
    retry_policy: Option<crate::retry::RetryPolicy>,
    insecure: Option<bool>,
    ca_certificate: Option<PathBuf>,
    client_key: Option<PathBuf>,
    client_certificate: Option<PathBuf>,
}

/// Configures a gRPC exporter before creation.
#[derive(Debug, Default)]
pub(crate) struct TonicExporterBuilder {
    pub(crate) export_config: ExportConfig,
    pub(crate) tonic_config: TonicConfig,
}

impl HasExportConfig for TonicExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.export_config
    }
}

impl TonicExporterBuilder {
    /// Adds metadata sent with every request; entries override any
    /// configured through `OTEL_EXPORTER_OTLP_HEADERS`.
    pub(crate) fn with_metadata<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tonic_config
            .headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Compresses request payloads.
    pub(crate) fn with_compression(mut self, compression: Compression) -> Self {
        self.tonic_config.compression = Some(compression);
        self
    }

    /// Downgrades the connection to plaintext.
    pub(crate) fn with_insecure(mut self) -> Self {
        self.tonic_config.insecure = Some(true);
        self
    }

    /// Overrides the retry policy.
    pub(crate) fn with_retry_policy(mut self, policy: crate::retry::RetryPolicy) -> Self {
        self.tonic_config.retry_policy = Some(policy);
        self
    }

    /// Uses the given PEM bundle to verify the collector instead of the
    /// system roots.
    pub(crate) fn with_ca_certificate(mut self, path: impl Into<PathBuf>) -> Self {
        self.tonic_config.ca_certificate = Some(path.into());
        self
    }

    /// Presents the given PEM key and certificate chain for mTLS.
    pub(crate) fn with_client_identity(
        mut self,
        certificate: impl Into<PathBuf>,
        key: impl Into<PathBuf>,
    ) -> Self {
        self.tonic_config.client_certificate = Some(certificate.into());
        self.tonic_config.client_key = Some(key.into());
        self
    }

    pub(crate) fn build_transport(self, signal: Signal) -> Result<TonicTransport, ExporterBuildError> {
        let timeout = self.export_config.resolve_timeout(signal);
        let mut endpoint_str = self.export_config.resolve_grpc_endpoint(signal);

        let insecure = self.tonic_config.insecure.unwrap_or_else(|| {
            signal_get(signal, OTEL_EXPORTER_OTLP_INSECURE)
                .map(|value| value.eq_ignore_ascii_case("true") || value == "1")
                .unwrap_or(false)
        });
        if insecure && endpoint_str.starts_with("https://") {
            endpoint_str = endpoint_str.replacen("https://", "http://", 1);
        }

        let mut endpoint = tonic::transport::Endpoint::from_shared(endpoint_str.clone())
            .map_err(|err| ExporterBuildError::InvalidEndpoint(endpoint_str.clone(), err.to_string()))?
            .timeout(timeout)
            .connect_timeout(timeout);

        if endpoint_str.starts_with("https://") {
            let mut tls = ClientTlsConfig::new().with_native_roots();
            let ca_path = self
                .tonic_config
                .ca_certificate
                .or_else(|| signal_get(signal, OTEL_EXPORTER_OTLP_CERTIFICATE).map(PathBuf::from));
            if let Some(path) = ca_path {
                let pem = std::fs::read(&path)
                    .map_err(|err| ExporterBuildError::InvalidTls(format!("{path:?}: {err}")))?;
                tls = tls.ca_certificate(Certificate::from_pem(pem));
            }
            let cert_path = self.tonic_config.client_certificate.or_else(|| {
                signal_get(signal, OTEL_EXPORTER_OTLP_CLIENT_CERTIFICATE).map(PathBuf::from)
            });
            let key_path = self
                .tonic_config
                .client_key
                .or_else(|| signal_get(signal, OTEL_EXPORTER_OTLP_CLIENT_KEY).map(PathBuf::from));
            if let (Some(cert_path), Some(key_path)) = (cert_path, key_path) {
                let cert = std::fs::read(&cert_path).map_err(|err| {
                    ExporterBuildError::InvalidTls(format!("{cert_path:?}: {err}"))
                })?;
                let key = std::fs::read(&key_path).map_err(|err| {
                    ExporterBuildError::InvalidTls(format!("{key_path:?}: {err}"))
                })?;
                tls = tls.identity(Identity::from_pem(cert, key));
            }
            endpoint = endpoint
                .tls_config(tls)
                .map_err(|err| ExporterBuildError::InvalidTls(err.to_string()))?;
        }

        let metadata = build_metadata(&self.tonic_config.headers, signal)?;
        let compression = resolve_compression(self.tonic_config.compression, signal)?
            .map(|Compression::Gzip| CompressionEncoding::Gzip);
        let retry_policy = self.tonic_config.retry_policy.unwrap_or_default();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| {
                ExporterBuildError::InvalidEndpoint(endpoint_str.clone(), err.to_string())
            })?;
        // The channel connects lazily on the first call, inside the
        // runtime.
        let _guard = runtime.enter();
        let channel = endpoint.connect_lazy();

        Ok(TonicTransport {
            runtime,
            channel,
            metadata,
            compression,
            timeout,
            retry_policy,
        })
    }
}

fn build_metadata(
    headers: &[(String, String)],
    signal: Signal,
) -> Result<MetadataMap, ExporterBuildError> {
    let mut metadata = MetadataMap::new();
    let user_agent = crate::exporter::default_user_agent();
    metadata.insert(
        "user-agent",
        MetadataValue::try_from(user_agent.as_str())
            .map_err(|_| ExporterBuildError::InvalidHeader("user-agent".to_owned()))?,
    );
    for (key, value) in resolve_headers(headers, signal) {
        let metadata_key = MetadataKey::from_bytes(key.to_lowercase().as_bytes())
            .map_err(|_| ExporterBuildError::InvalidHeader(key.clone()))?;
        let metadata_value = MetadataValue::try_from(value.as_str())
            .map_err(|_| ExporterBuildError::InvalidHeader(key.clone()))?;
        metadata.insert(metadata_key, metadata_value);
    }
    Ok(metadata)
}

/// A lazily connected channel plus the runtime that drives it.
pub(crate) struct TonicTransport {
    pub(crate) runtime: tokio::runtime::Runtime,
    pub(crate) channel: Channel,
    pub(crate) metadata: MetadataMap,
    pub(crate) compression: Option<CompressionEncoding>,
    pub(crate) timeout: Duration,
    pub(crate) retry_policy: crate::retry::RetryPolicy,
}

impl TonicTransport {
    pub(crate) fn request_with_metadata<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        *request.metadata_mut() = self.metadata.clone();
        request
    }
}

impl fmt::Debug for TonicTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicTransport")
            .field("timeout", &self.timeout)
            .field("compression", &self.compression)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insecure_downgrades_scheme() {
        temp_env::with_var(OTEL_EXPORTER_OTLP_INSECURE, Some("true"), || {
            let transport = TonicExporterBuilder::default()
                .build_transport(Signal::Traces)
                .expect("plaintext transport");
            // Nothing observable beyond successful construction without
            // TLS; the endpoint default was https and required downgrade.
            let _ = transport;
        });
    }

    #[test]
    fn metadata_from_environment_headers() {
        temp_env::with_var(
            crate::OTEL_EXPORTER_OTLP_HEADERS,
            Some("Authorization=Basic abc==xyz,X-Tenant=t1"),
            || {
                let metadata = build_metadata(&[], Signal::Traces).unwrap();
                assert_eq!(
                    metadata.get("authorization").unwrap(),
                    &MetadataValue::try_from("Basic abc==xyz").unwrap()
                );
                assert_eq!(
                    metadata.get("x-tenant").unwrap(),
                    &MetadataValue::try_from("t1").unwrap()
                );
            },
        );
    }

    #[test]
    fn explicit_metadata_overrides_environment() {
        temp_env::with_var(
            crate::OTEL_EXPORTER_OTLP_HEADERS,
            Some("X-Tenant=from-env"),
            || {
                let metadata =
                    build_metadata(&[("X-Tenant".to_owned(), "explicit".to_owned())], Signal::Logs)
                        .unwrap();
                assert_eq!(
                    metadata.get("x-tenant").unwrap(),
                    &MetadataValue::try_from("explicit").unwrap()
                );
            },
        );
    }
}
