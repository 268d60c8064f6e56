/// `opentelemetry.proto.collector.trace.v1`
pub mod trace {
    #[allow(clippy::doc_lazy_continuation)]
    pub mod v1 {
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportTraceServiceRequest {
            /// An array of ResourceSpans.
            /// For data coming from a single resource this array will typically contain one
            /// element. Intermediary nodes (such as OpenTelemetry Collector) that receive
            /// data from multiple origins typically batch the data before forwarding further and
            /// in that case this array will contain multiple elements.
            #[prost(message, repeated, tag = "1")]
            pub resource_spans:
                ::prost::alloc::vec::Vec<crate::proto::trace::v1::ResourceSpans>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportTraceServiceResponse {
            /// The details of a partially successful export request.
            ///
            /// If the request is only partially accepted then the server MUST initialize
            /// the `partial_success` field.
            #[prost(message, optional, tag = "1")]
            pub partial_success: ::core::option::Option<ExportTracePartialSuccess>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportTracePartialSuccess {
            /// The number of rejected spans.
            ///
            /// A `rejected_<signal>` field holding a `0` also means success.
            #[prost(int64, tag = "1")]
            pub rejected_spans: i64,
            /// A developer-facing human-readable message in English.
            #[prost(string, tag = "2")]
            pub error_message: ::prost::alloc::string::String,
        }
        /// Generated client implementations.
        #[cfg(feature = "gen-tonic")]
        pub mod trace_service_client {
            #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
            use tonic::codegen::http::Uri;
            use tonic::codegen::*;
            /// Service that can be used to push spans between one Application instrumented with
            /// OpenTelemetry and a collector, or between a collector and a central collector (in this
            /// case spans are sent/received to/from multiple Applications).
            #[derive(Debug, Clone)]
            pub struct TraceServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }
            impl TraceServiceClient<tonic::transport::Channel> {
                /// Attempt to create a new client by connecting to a given endpoint.
                pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
                where
                    D: TryInto<tonic::transport::Endpoint>,
                    D::Error: Into<StdError>,
                {
                    let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                    Ok(Self::new(conn))
                }
            }
            impl<T> TraceServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::Body>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
            {
                pub fn new(inner: T) -> Self {
                    let inner = tonic::client::Grpc::new(inner);
                    Self { inner }
                }
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }
                /// Compress requests with the given encoding.
                ///
                /// This requires the server to support it otherwise it might respond with an
                /// error.
                #[must_use]
                pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.send_compressed(encoding);
                    self
                }
                /// Enable decompressing responses.
                #[must_use]
                pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.accept_compressed(encoding);
                    self
                }
                /// For performance reasons, when possible, send a batch of spans to the collector
                /// rather than invoking this RPC for each span.
                pub async fn export(
                    &mut self,
                    request: impl tonic::IntoRequest<super::ExportTraceServiceRequest>,
                ) -> std::result::Result<
                    tonic::Response<super::ExportTraceServiceResponse>,
                    tonic::Status,
                > {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                    })?;
                    let codec = tonic_prost::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/opentelemetry.proto.collector.trace.v1.TraceService/Export",
                    );
                    let mut req = request.into_request();
                    req.extensions_mut().insert(GrpcMethod::new(
                        "opentelemetry.proto.collector.trace.v1.TraceService",
                        "Export",
                    ));
                    self.inner.unary(req, path, codec).await
                }
            }
        }
    }
}

/// `opentelemetry.proto.collector.metrics.v1`
pub mod metrics {
    #[allow(clippy::doc_lazy_continuation)]
    pub mod v1 {
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportMetricsServiceRequest {
            /// An array of ResourceMetrics.
            /// For data coming from a single resource this array will typically contain one
            /// element. Intermediary nodes (such as OpenTelemetry Collector) that receive
            /// data from multiple origins typically batch the data before forwarding further and
            /// in that case this array will contain multiple elements.
            #[prost(message, repeated, tag = "1")]
            pub resource_metrics:
                ::prost::alloc::vec::Vec<crate::proto::metrics::v1::ResourceMetrics>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportMetricsServiceResponse {
            /// The details of a partially successful export request.
            ///
            /// If the request is only partially accepted then the server MUST initialize
            /// the `partial_success` field.
            #[prost(message, optional, tag = "1")]
            pub partial_success: ::core::option::Option<ExportMetricsPartialSuccess>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportMetricsPartialSuccess {
            /// The number of rejected data points.
            ///
            /// A `rejected_<signal>` field holding a `0` also means success.
            #[prost(int64, tag = "1")]
            pub rejected_data_points: i64,
            /// A developer-facing human-readable message in English.
            #[prost(string, tag = "2")]
            pub error_message: ::prost::alloc::string::String,
        }
        /// Generated client implementations.
        #[cfg(feature = "gen-tonic")]
        pub mod metrics_service_client {
            #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
            use tonic::codegen::http::Uri;
            use tonic::codegen::*;
            /// Service that can be used to push metrics between one Application
            /// instrumented with OpenTelemetry and a collector, or between a collector and a
            /// central collector.
            #[derive(Debug, Clone)]
            pub struct MetricsServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }
            impl MetricsServiceClient<tonic::transport::Channel> {
                /// Attempt to create a new client by connecting to a given endpoint.
                pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
                where
                    D: TryInto<tonic::transport::Endpoint>,
                    D::Error: Into<StdError>,
                {
                    let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                    Ok(Self::new(conn))
                }
            }
            impl<T> MetricsServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::Body>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
            {
                pub fn new(inner: T) -> Self {
                    let inner = tonic::client::Grpc::new(inner);
                    Self { inner }
                }
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }
                /// Compress requests with the given encoding.
                ///
                /// This requires the server to support it otherwise it might respond with an
                /// error.
                #[must_use]
                pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.send_compressed(encoding);
                    self
                }
                /// Enable decompressing responses.
                #[must_use]
                pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.accept_compressed(encoding);
                    self
                }
                /// For performance reasons, when possible, send metrics to the collector in
                /// batches rather than invoking this RPC for each metric.
                pub async fn export(
                    &mut self,
                    request: impl tonic::IntoRequest<super::ExportMetricsServiceRequest>,
                ) -> std::result::Result<
                    tonic::Response<super::ExportMetricsServiceResponse>,
                    tonic::Status,
                > {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                    })?;
                    let codec = tonic_prost::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/opentelemetry.proto.collector.metrics.v1.MetricsService/Export",
                    );
                    let mut req = request.into_request();
                    req.extensions_mut().insert(GrpcMethod::new(
                        "opentelemetry.proto.collector.metrics.v1.MetricsService",
                        "Export",
                    ));
                    self.inner.unary(req, path, codec).await
                }
            }
        }
    }
}

/// `opentelemetry.proto.collector.logs.v1`
pub mod logs {
    #[allow(clippy::doc_lazy_continuation)]
    pub mod v1 {
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportLogsServiceRequest {
            /// An array of ResourceLogs.
            /// For data coming from a single resource this array will typically contain one
            /// element. Intermediary nodes (such as OpenTelemetry Collector) that receive
            /// data from multiple origins typically batch the data before forwarding further and
            /// in that case this array will contain multiple elements.
            #[prost(message, repeated, tag = "1")]
            pub resource_logs: ::prost::alloc::vec::Vec<crate::proto::logs::v1::ResourceLogs>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportLogsServiceResponse {
            /// The details of a partially successful export request.
            ///
            /// If the request is only partially accepted then the server MUST initialize
            /// the `partial_success` field.
            #[prost(message, optional, tag = "1")]
            pub partial_success: ::core::option::Option<ExportLogsPartialSuccess>,
        }
        #[allow(clippy::derive_partial_eq_without_eq)]
        #[derive(Clone, PartialEq, ::prost::Message)]
        pub struct ExportLogsPartialSuccess {
            /// The number of rejected log records.
            ///
            /// A `rejected_<signal>` field holding a `0` also means success.
            #[prost(int64, tag = "1")]
            pub rejected_log_records: i64,
            /// A developer-facing human-readable message in English.
            #[prost(string, tag = "2")]
            pub error_message: ::prost::alloc::string::String,
        }
        /// Generated client implementations.
        #[cfg(feature = "gen-tonic")]
        pub mod logs_service_client {
            #![allow(unused_variables, dead_code, missing_docs, clippy::let_unit_value)]
            use tonic::codegen::http::Uri;
            use tonic::codegen::*;
            /// Service that can be used to push logs between one Application instrumented with
            /// OpenTelemetry and an collector, or between an collector and a central collector (in this
            /// case logs are sent/received to/from multiple Applications).
            #[derive(Debug, Clone)]
            pub struct LogsServiceClient<T> {
                inner: tonic::client::Grpc<T>,
            }
            impl LogsServiceClient<tonic::transport::Channel> {
                /// Attempt to create a new client by connecting to a given endpoint.
                pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
                where
                    D: TryInto<tonic::transport::Endpoint>,
                    D::Error: Into<StdError>,
                {
                    let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
                    Ok(Self::new(conn))
                }
            }
            impl<T> LogsServiceClient<T>
            where
                T: tonic::client::GrpcService<tonic::body::Body>,
                T::Error: Into<StdError>,
                T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
                <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
            {
                pub fn new(inner: T) -> Self {
                    let inner = tonic::client::Grpc::new(inner);
                    Self { inner }
                }
                pub fn with_origin(inner: T, origin: Uri) -> Self {
                    let inner = tonic::client::Grpc::with_origin(inner, origin);
                    Self { inner }
                }
                /// Compress requests with the given encoding.
                ///
                /// This requires the server to support it otherwise it might respond with an
                /// error.
                #[must_use]
                pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.send_compressed(encoding);
                    self
                }
                /// Enable decompressing responses.
                #[must_use]
                pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
                    self.inner = self.inner.accept_compressed(encoding);
                    self
                }
                /// For performance reasons, when possible, send a batch of logs to the collector
                /// rather than invoking this RPC for each log record.
                pub async fn export(
                    &mut self,
                    request: impl tonic::IntoRequest<super::ExportLogsServiceRequest>,
                ) -> std::result::Result<
                    tonic::Response<super::ExportLogsServiceResponse>,
                    tonic::Status,
                > {
                    self.inner.ready().await.map_err(|e| {
                        tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
                    })?;
                    let codec = tonic_prost::ProstCodec::default();
                    let path = http::uri::PathAndQuery::from_static(
                        "/opentelemetry.proto.collector.logs.v1.LogsService/Export",
                    );
                    let mut req = request.into_request();
                    req.extensions_mut().insert(GrpcMethod::new(
                        "opentelemetry.proto.collector.logs.v1.LogsService",
                        "Export",
                    ));
                    self.inner.unary(req, path, codec).await
                }
            }
        }
    }
}
