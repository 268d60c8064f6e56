use super::TonicTransport;
use crate::exporter::{ExporterState, OtlpError};
use crate::retry::{self, retry_with_backoff};
use vantage_proto::proto::collector::logs::v1::logs_service_client::LogsServiceClient;
use vantage_proto::proto::collector::logs::v1::ExportLogsServiceRequest;

#[derive(Debug)]
pub(crate) struct TonicLogsClient {
    transport: TonicTransport,
    state: ExporterState,
}

impl TonicLogsClient {
    pub(crate) fn new(transport: TonicTransport) -> Self {
        TonicLogsClient {
            transport,
            state: ExporterState::new(),
        }
    }

    pub(crate) fn export(&self, request: ExportLogsServiceRequest) -> Result<(), OtlpError> {
        self.state.begin_send()?;
        let result = retry_with_backoff(
            &self.transport.retry_policy,
            retry::grpc::classify_tonic_status,
            "LogsService.Export",
            || {
                self.transport.runtime.block_on(async {
                    let mut client = LogsServiceClient::new(self.transport.channel.clone());
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
