use super::TonicTransport;
use crate::exporter::{ExporterState, OtlpError};
use crate::retry::{self, retry_with_backoff};
use vantage_proto::proto::collector::metrics::v1::metrics_service_client::MetricsServiceClient;
use vantage_proto::proto::collector::metrics::v1::ExportMetricsServiceRequest;

#[derive(Debug)]
pub(crate) struct TonicMetricsClient {
    transport: TonicTransport,
    state: ExporterState,
}

impl TonicMetricsClient {
    pub(crate) fn new(transport: TonicTransport) -> Self {
        TonicMetricsClient {
            transport,
            state: ExporterState::new(),
        }
    }

    pub(crate) fn export(&self, request: ExportMetricsServiceRequest) -> Result<(), OtlpError> {
        self.state.begin_send()?;
        let result = retry_with_backoff(
            &self.transport.retry_policy,
            retry::grpc::classify_tonic_status,
            "MetricsService.Export",
            || {
                self.transport.runtime.block_on(async {
                    let mut client = MetricsServiceClient::new(self.transport.channel.clone());
                    if let Some(encoding) = self.transport.compression {
                        client = client.send_compressed(encoding);
                    }
                    client
                        .export(self.transport.request_with_metadata(request.clone()))
                        .await
                        .map(drop)
                })
            },
        );
        self.state.end_send();
        result.map_err(|status| match retry::grpc::classify_tonic_status(&status) {
            retry::RetryErrorType::NonRetryable => OtlpError::Permanent(status.to_string()),
            _ => OtlpError::Transient(status.to_string()),
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
