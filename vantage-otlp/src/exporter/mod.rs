//! Shared exporter configuration and its layered resolution.

#[cfg(feature = "http-proto")]
pub(crate) mod http;
#[cfg(feature = "grpc-tonic")]
pub(crate) mod tonic;

use crate::{
    OTEL_EXPORTER_OTLP_COMPRESSION, OTEL_EXPORTER_OTLP_ENDPOINT, OTEL_EXPORTER_OTLP_HEADERS,
    OTEL_EXPORTER_OTLP_TIMEOUT, OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT,
};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use vantage::config;

/// The signal an exporter instance carries, used to select the
/// signal-specific configuration keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    pub(crate) fn env_infix(&self) -> &'static str {
        match self {
            Signal::Traces => "TRACES",
            Signal::Metrics => "METRICS",
            Signal::Logs => "LOGS",
        }
    }

    pub(crate) fn http_path(&self) -> &'static str {
        match self {
            Signal::Traces => "/v1/traces",
            Signal::Metrics => "/v1/metrics",
            Signal::Logs => "/v1/logs",
        }
    }
}

/// Looks a setting up under the signal-specific key first, then the
/// general key.
pub(crate) fn signal_get(signal: Signal, general_key: &str) -> Option<String> {
    let specific = general_key.replace(
        "OTEL_EXPORTER_OTLP_",
        &format!("OTEL_EXPORTER_OTLP_{}_", signal.env_infix()),
    );
    config::get(&specific).or_else(|| config::get(general_key))
}

/// The transport protocols the exporters speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    /// gRPC, unary calls to the collector services. Default port 4317.
    Grpc,
    /// HTTP POST with a binary protobuf body. Default port 4318.
    HttpBinary,
}

/// The compression algorithms applied to outgoing payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    /// Compress payloads with gzip.
    Gzip,
}

impl FromStr for Compression {
    type Err = ExporterBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gzip" => Ok(Compression::Gzip),
            other => Err(ExporterBuildError::UnsupportedCompression(
                other.to_owned(),
            )),
        }
    }
}

/// Errors raised while assembling an exporter.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ExporterBuildError {
    /// The endpoint could not be parsed or used for the transport.
    #[error("invalid endpoint {0:?}: {1}")]
    InvalidEndpoint(String, String),

    /// A configured header name or value is not valid for the transport.
    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    /// An unsupported compression algorithm was requested.
    #[error("unsupported compression algorithm {0:?}")]
    UnsupportedCompression(String),

    /// A TLS setting could not be applied.
    #[error("invalid TLS configuration: {0}")]
    InvalidTls(String),
}

/// Errors surfaced by a live exporter.
///
/// Transient failures are retried internally by the exporter's backoff
/// policy; what callers see is the terminal outcome for a batch.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum OtlpError {
    /// A retryable transport failure that survived every retry; the batch
    /// is dropped.
    #[error("transient export failure: {0}")]
    Transient(String),

    /// A non-retryable transport failure; the batch is dropped.
    #[error("permanent export failure: {0}")]
    Permanent(String),

    /// The per-call deadline elapsed; the batch is dropped, not retried.
    #[error("export deadline exceeded after {0:?}")]
    Timeout(Duration),

    /// `export` was called after `shutdown`.
    #[error("exporter is shut down")]
    Shutdown,
}

impl From<OtlpError> for vantage::error::SdkError {
    fn from(err: OtlpError) -> Self {
        match err {
            OtlpError::Shutdown => vantage::error::SdkError::AlreadyShutdown,
            OtlpError::Timeout(deadline) => vantage::error::SdkError::Timeout(deadline),
            other => vantage::error::SdkError::InternalFailure(other.to_string()),
        }
    }
}

/// Configuration shared by every transport.
#[derive(Debug, Default)]
pub struct ExportConfig {
    /// The collector address. When unset, the layered configuration and
    /// then the protocol default apply.
    pub endpoint: Option<String>,

    /// The per-call deadline. When unset, `OTEL_EXPORTER_OTLP_TIMEOUT`
    /// (milliseconds) and then the 10s default apply.
    pub timeout: Option<Duration>,
}

impl ExportConfig {
    pub(crate) fn resolve_timeout(&self, signal: Signal) -> Duration {
        // Explicit builder argument wins over the layered configuration.
        self.timeout.unwrap_or_else(|| {
            signal_get(signal, OTEL_EXPORTER_OTLP_TIMEOUT)
                .and_then(|millis| millis.trim().parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::from_millis(OTEL_EXPORTER_OTLP_TIMEOUT_DEFAULT))
        })
    }

    pub(crate) fn resolve_grpc_endpoint(&self, signal: Signal) -> String {
        self.endpoint
            .clone()
            .or_else(|| signal_get(signal, OTEL_EXPORTER_OTLP_ENDPOINT))
            .unwrap_or_else(|| "https://localhost:4317".to_owned())
    }

    /// HTTP endpoints are base urls; the signal path is appended unless
    /// the endpoint came from a signal-specific setting, which is used
    /// verbatim.
    pub(crate) fn resolve_http_endpoint(&self, signal: Signal) -> String {
        if let Some(endpoint) = &self.endpoint {
            return append_signal_path(endpoint, signal);
        }
        let specific = format!(
            "OTEL_EXPORTER_OTLP_{}_ENDPOINT",
            signal.env_infix()
        );
        if let Some(endpoint) = config::get(&specific) {
            return endpoint;
        }
        let base = config::get(OTEL_EXPORTER_OTLP_ENDPOINT)
            .unwrap_or_else(|| "http://localhost:4318".to_owned());
        append_signal_path(&base, signal)
    }
}

fn append_signal_path(base: &str, signal: Signal) -> String {
    format!("{}{}", base.trim_end_matches('/'), signal.http_path())
}

pub(crate) fn resolve_compression(
    explicit: Option<Compression>,
    signal: Signal,
) -> Result<Option<Compression>, ExporterBuildError> {
    if explicit.is_some() {
        return Ok(explicit);
    }
    match signal_get(signal, OTEL_EXPORTER_OTLP_COMPRESSION) {
        Some(value) if value.trim().eq_ignore_ascii_case("none") => Ok(None),
        Some(value) => value.parse().map(Some),
        None => Ok(None),
    }
}

/// Parses a `k1=v1,k2=v2` header list. Values may themselves contain `=`;
/// only the first `=` of each entry splits.
pub(crate) fn parse_header_string(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value
        .split_terminator(',')
        .map(str::trim)
        .filter_map(|entry| {
            let (key, value) = entry.split_once('=')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() {
                return None;
            }
            Some((key, value))
        })
}

/// The headers configured for a signal: layered configuration first, then
/// builder-provided entries on top.
pub(crate) fn resolve_headers(
    explicit: &[(String, String)],
    signal: Signal,
) -> Vec<(String, String)> {
    let mut headers: Vec<(String, String)> = Vec::new();
    if let Some(value) = signal_get(signal, OTEL_EXPORTER_OTLP_HEADERS) {
        for (key, header_value) in parse_header_string(&value) {
            headers.push((key.to_owned(), header_value.to_owned()));
        }
    }
    for (key, value) in explicit {
        headers.retain(|(existing, _)| !existing.eq_ignore_ascii_case(key));
        headers.push((key.clone(), value.clone()));
    }
    headers
}

/// The user agent reported to collectors.
pub(crate) fn default_user_agent() -> String {
    format!("vantage-otlp/{}", env!("CARGO_PKG_VERSION"))
}

/// Provides access to the shared export config inside transport builders.
pub trait HasExportConfig {
    /// A mutable reference to the builder's [`ExportConfig`].
    fn export_config(&mut self) -> &mut ExportConfig;
}

/// Builder methods to override the shared export configuration.
///
/// Implemented for every builder that exposes [`HasExportConfig`].
pub trait WithExportConfig {
    /// Set the collector address, overriding the layered configuration.
    fn with_endpoint<T: Into<String>>(self, endpoint: T) -> Self;
    /// Set the per-call deadline, overriding the layered configuration.
    fn with_timeout(self, timeout: Duration) -> Self;
    /// Replace the whole export config.
    fn with_export_config(self, export_config: ExportConfig) -> Self;
}

impl<B: HasExportConfig> WithExportConfig for B {
    fn with_endpoint<T: Into<String>>(mut self, endpoint: T) -> Self {
        self.export_config().endpoint = Some(endpoint.into());
        self
    }

    fn with_timeout(mut self, timeout: Duration) -> Self {
        self.export_config().timeout = Some(timeout);
        self
    }

    fn with_export_config(mut self, export_config: ExportConfig) -> Self {
        *self.export_config() = export_config;
        self
    }
}

/// Lifecycle of an exporter: exports move `Idle → Sending → Idle`;
/// `shutdown` is terminal.
#[derive(Debug)]
pub(crate) struct ExporterState(std::sync::atomic::AtomicU8);

const STATE_IDLE: u8 = 0;
const STATE_SENDING: u8 = 1;
const STATE_SHUTDOWN: u8 = 2;

impl ExporterState {
    pub(crate) fn new() -> Self {
        ExporterState(std::sync::atomic::AtomicU8::new(STATE_IDLE))
    }

    /// Marks a send in flight; fails once shut down.
    pub(crate) fn begin_send(&self) -> Result<(), OtlpError> {
        use std::sync::atomic::Ordering;
        if self.0.load(Ordering::Acquire) == STATE_SHUTDOWN {
            return Err(OtlpError::Shutdown);
        }
        self.0.store(STATE_SENDING, Ordering::Release);
        Ok(())
    }

    pub(crate) fn end_send(&self) {
        use std::sync::atomic::Ordering;
        let _ = self.0.compare_exchange(
            STATE_SENDING,
            STATE_IDLE,
            Ordering::AcqRel,
            Ordering::Relaxed,
        );
    }

    /// Transitions to the terminal state; returns false if already there.
    pub(crate) fn shutdown(&self) -> bool {
        use std::sync::atomic::Ordering;
        self.0.swap(STATE_SHUTDOWN, Ordering::AcqRel) != STATE_SHUTDOWN
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Grpc => f.write_str("grpc"),
            Protocol::HttpBinary => f.write_str("http/protobuf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_split_on_first_equals() {
        let parsed: Vec<_> =
            parse_header_string("Authorization=Basic abc==xyz,X-Tenant=t1").collect();
        assert_eq!(
            parsed,
            vec![("Authorization", "Basic abc==xyz"), ("X-Tenant", "t1")]
        );
    }

    #[test]
    fn headers_skip_malformed_entries() {
        let parsed: Vec<_> = parse_header_string("ok=1,broken,=nokey,").collect();
        assert_eq!(parsed, vec![("ok", "1")]);
    }

    #[test]
    fn signal_specific_settings_take_precedence() {
        temp_env::with_vars(
            [
                (OTEL_EXPORTER_OTLP_TIMEOUT, Some("5000")),
                ("OTEL_EXPORTER_OTLP_TRACES_TIMEOUT", Some("1500")),
            ],
            || {
                let config = ExportConfig::default();
                assert_eq!(
                    config.resolve_timeout(Signal::Traces),
                    Duration::from_millis(1500)
                );
                assert_eq!(
                    config.resolve_timeout(Signal::Metrics),
                    Duration::from_millis(5000)
                );
            },
        );
    }

    #[test]
    fn explicit_timeout_wins_over_environment() {
        temp_env::with_var(OTEL_EXPORTER_OTLP_TIMEOUT, Some("5000"), || {
            let config = ExportConfig {
                timeout: Some(Duration::from_millis(250)),
                ..Default::default()
            };
            assert_eq!(
                config.resolve_timeout(Signal::Logs),
                Duration::from_millis(250)
            );
        });
    }

    #[test]
    fn http_endpoint_resolution() {
        temp_env::with_vars_unset(
            [OTEL_EXPORTER_OTLP_ENDPOINT, "OTEL_EXPORTER_OTLP_TRACES_ENDPOINT"],
            || {
                let config = ExportConfig::default();
                assert_eq!(
                    config.resolve_http_endpoint(Signal::Traces),
                    "http://localhost:4318/v1/traces"
                );
            },
        );

        temp_env::with_var(
            OTEL_EXPORTER_OTLP_ENDPOINT,
            Some("http://collector:4318/"),
            || {
                let config = ExportConfig::default();
                assert_eq!(
                    config.resolve_http_endpoint(Signal::Logs),
                    "http://collector:4318/v1/logs"
                );
            },
        );

        // Signal-specific endpoints are used verbatim.
        temp_env::with_var(
            "OTEL_EXPORTER_OTLP_METRICS_ENDPOINT",
            Some("http://collector:4318/custom"),
            || {
                let config = ExportConfig::default();
                assert_eq!(
                    config.resolve_http_endpoint(Signal::Metrics),
                    "http://collector:4318/custom"
                );
            },
        );
    }

    #[test]
    fn compression_parsing() {
        assert_eq!("gzip".parse::<Compression>().ok(), Some(Compression::Gzip));
        assert!("snappy".parse::<Compression>().is_err());
        temp_env::with_var(OTEL_EXPORTER_OTLP_COMPRESSION, Some("gzip"), || {
            assert_eq!(
                resolve_compression(None, Signal::Traces).unwrap(),
                Some(Compression::Gzip)
            );
        });
        temp_env::with_var(OTEL_EXPORTER_OTLP_COMPRESSION, Some("none"), || {
            assert_eq!(resolve_compression(None, Signal::Traces).unwrap(), None);
        });
    }

    #[test]
    fn exporter_state_machine() {
        let state = ExporterState::new();
        assert!(state.begin_send().is_ok());
        state.end_send();
        assert!(state.shutdown());
        // Terminal: sends fail, repeated shutdown reports already done.
        assert!(matches!(state.begin_send(), Err(OtlpError::Shutdown)));
        assert!(!state.shutdown());
    }
}
