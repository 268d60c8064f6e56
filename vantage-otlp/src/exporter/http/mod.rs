//! HTTP/protobuf transport.
//!
//! POSTs binary protobuf payloads to `{endpoint}/v1/{traces|metrics|logs}`
//! with `Content-Type: application/x-protobuf`, optionally gzip-compressed,
//! using a blocking reqwest client driven from the SDK's worker threads.

use crate::exporter::{
    resolve_compression, resolve_headers, Compression, ExportConfig, ExporterBuildError,
    ExporterState, HasExportConfig, OtlpError, Signal,
};
use crate::retry::{self, retry_with_backoff, RetryPolicy};
use flate2::write::GzEncoder;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_ENCODING, CONTENT_TYPE, USER_AGENT};
use std::fmt;
use std::io::Write;
use std::time::Duration;

/// Configuration specific to the HTTP transport.
#[derive(Debug, Default)]
pub(crate) struct HttpConfig {
    headers: Vec<(String, String)>,
    compression: Option<Compression>,
    retry_policy: Option<RetryPolicy>,
}

/// Configures an HTTP/protobuf exporter before creation.
#[derive(Debug, Default)]
pub(crate) struct HttpExporterBuilder {
    pub(crate) export_config: ExportConfig,
    pub(crate) http_config: HttpConfig,
}

impl HasExportConfig for HttpExporterBuilder {
    fn export_config(&mut self) -> &mut ExportConfig {
        &mut self.export_config
    }
}

impl HttpExporterBuilder {
    /// Adds headers sent with every request; entries override any
    /// configured through `OTEL_EXPORTER_OTLP_HEADERS`.
    pub(crate) fn with_headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.http_config
            .headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Compresses request bodies, setting `Content-Encoding` accordingly.
    pub(crate) fn with_compression(mut self, compression: Compression) -> Self {
        self.http_config.compression = Some(compression);
        self
    }

    /// Overrides the retry policy.
    pub(crate) fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.http_config.retry_policy = Some(policy);
        self
    }

    pub(crate) fn build_client(self, signal: Signal) -> Result<OtlpHttpClient, ExporterBuildError> {
        let endpoint = self.export_config.resolve_http_endpoint(signal);
        let timeout = self.export_config.resolve_timeout(signal);
        let compression = resolve_compression(self.http_config.compression, signal)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/x-protobuf"));
        let user_agent = crate::exporter::default_user_agent();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&user_agent)
                .map_err(|_| ExporterBuildError::InvalidHeader("user-agent".to_owned()))?,
        );
        for (key, value) in resolve_headers(&self.http_config.headers, signal) {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ExporterBuildError::InvalidHeader(key.clone()))?;
            let header_value = HeaderValue::from_str(&value)
                .map_err(|_| ExporterBuildError::InvalidHeader(key.clone()))?;
            headers.insert(name, header_value);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ExporterBuildError::InvalidEndpoint(endpoint.clone(), err.to_string()))?;

        Ok(OtlpHttpClient {
            client,
            endpoint,
            headers,
            compression,
            timeout,
            state: ExporterState::new(),
            retry_policy: self.http_config.retry_policy.unwrap_or_default(),
        })
    }
}

#[derive(Debug)]
enum HttpExportError {
    Status {
        code: u16,
        retry_after: Option<String>,
    },
    Network(String),
}

impl fmt::Display for HttpExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpExportError::Status { code, .. } => write!(f, "collector returned status {code}"),
            HttpExportError::Network(err) => write!(f, "network failure: {err}"),
        }
    }
}

fn classify(err: &HttpExportError) -> retry::RetryErrorType {
    match err {
        HttpExportError::Status { code, retry_after } => {
            retry::http::classify_http_error(*code, retry_after.as_deref())
        }
        // Connection resets and client-side timeouts are transient.
        HttpExportError::Network(_) => retry::RetryErrorType::Retryable,
    }
}

/// A blocking OTLP/HTTP sender for one signal endpoint.
pub(crate) struct OtlpHttpClient {
    client: reqwest::blocking::Client,
    endpoint: String,
    headers: HeaderMap,
    compression: Option<Compression>,
    #[allow(dead_code)]
    timeout: Duration,
    state: ExporterState,
    retry_policy: RetryPolicy,
}

impl fmt::Debug for OtlpHttpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtlpHttpClient")
            .field("endpoint", &self.endpoint)
            .field("compression", &self.compression)
            .finish()
    }
}

impl OtlpHttpClient {
    /// Encodes and transmits one protobuf message, applying the retry
    /// policy.
    pub(crate) fn export_message<T: prost::Message>(
        &self,
        message: &T,
        operation: &str,
    ) -> Result<(), OtlpError> {
        self.state.begin_send()?;

        let encoded = message.encode_to_vec();
        let (body, content_encoding) = match self.compression {
            Some(Compression::Gzip) => {
                let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
                match encoder.write_all(&encoded).and_then(|_| encoder.finish()) {
                    Ok(compressed) => (compressed, Some("gzip")),
                    Err(err) => {
                        self.state.end_send();
                        return Err(OtlpError::Permanent(format!("gzip failure: {err}")));
                    }
                }
            }
            None => (encoded, None),
        };

        let result = retry_with_backoff(&self.retry_policy, classify, operation, || {
            self.send_once(&body, content_encoding)
        });
        self.state.end_send();

        result.map_err(|err| match classify(&err) {
            retry::RetryErrorType::NonRetryable => OtlpError::Permanent(err.to_string()),
            _ => OtlpError::Transient(err.to_string()),
        })
    }

    fn send_once(&self, body: &[u8], content_encoding: Option<&str>) -> Result<(), HttpExportError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .headers(self.headers.clone())
            .body(body.to_vec());
        if let Some(encoding) = content_encoding {
            request = request.header(CONTENT_ENCODING, encoding);
        }

        let response = request
            .send()
            .map_err(|err| HttpExportError::Network(err.to_string()))?;
        if response.status().is_success() {
            return Ok(());
        }
        let retry_after = response
            .headers()
            .get(http::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Err(HttpExportError::Status {
            code: response.status().as_u16(),
            retry_after,
        })
    }

    pub(crate) fn shutdown(&self) -> Result<(), OtlpError> {
        if self.state.shutdown() {
            Ok(())
        } else {
            Err(OtlpError::Shutdown)
        }
    }
}
