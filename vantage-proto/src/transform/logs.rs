use crate::proto::collector::logs::v1::ExportLogsServiceRequest;
use crate::proto::common::v1::{any_value, AnyValue, KeyValue, KeyValueList};
use crate::proto::logs::v1::{LogRecord, ResourceLogs, ScopeLogs};
use crate::transform::to_nanos;
use vantage::logs::{AnyValue as SdkAnyValue, SdkLogRecord};
use vantage::InstrumentationScope;

pub(crate) fn log_value(value: SdkAnyValue) -> AnyValue {
    AnyValue {
        value: Some(match value {
            SdkAnyValue::Double(val) => any_value::Value::DoubleValue(val),
            SdkAnyValue::Int(val) => any_value::Value::IntValue(val),
            SdkAnyValue::String(val) => any_value::Value::StringValue(val),
            SdkAnyValue::Boolean(val) => any_value::Value::BoolValue(val),
            SdkAnyValue::Bytes(val) => any_value::Value::BytesValue(*val),
            SdkAnyValue::ListAny(vals) => {
                any_value::Value::ArrayValue(crate::proto::common::v1::ArrayValue {
                    values: (*vals).into_iter().map(log_value).collect(),
                })
            }
            SdkAnyValue::Map(entries) => any_value::Value::KvlistValue(KeyValueList {
                values: (*entries)
                    .into_iter()
                    .map(|(key, value)| KeyValue {
                        key: key.into(),
                        value: Some(log_value(value)),
                    })
                    .collect(),
            }),
            // The SDK value enum may grow; unknown kinds fall back to their
            // debug rendering rather than dropping the record.
            other => any_value::Value::StringValue(format!("{other:?}")),
        }),
    }
}

impl From<&SdkLogRecord> for LogRecord {
    fn from(record: &SdkLogRecord) -> Self {
        let trace_context = record.trace_context();
        LogRecord {
            time_unix_nano: record.timestamp().map(to_nanos).unwrap_or_default(),
            observed_time_unix_nano: to_nanos(record.observed_timestamp()),
            severity_number: record
                .severity_number()
                .map(|severity| severity as i32)
                .unwrap_or_default(),
            severity_text: record.severity_text().unwrap_or_default().to_owned(),
            body: record.body().cloned().map(log_value),
            attributes: record
                .attributes()
                .map(|(key, value)| KeyValue {
                    key: key.as_str().to_owned(),
                    value: Some(log_value(value.clone())),
                })
                .collect(),
            dropped_attributes_count: record.dropped_attributes_count(),
            flags: trace_context
                .and_then(|cx| cx.trace_flags)
                .map(|flags| flags.to_u8() as u32)
                .unwrap_or_default(),
            trace_id: trace_context
                .map(|cx| cx.trace_id.to_bytes().to_vec())
                .unwrap_or_default(),
            span_id: trace_context
                .map(|cx| cx.span_id.to_bytes().to_vec())
                .unwrap_or_default(),
            event_name: record.event_name().unwrap_or_default().to_owned(),
        }
    }
}

/// Buckets emitted records by instrumentation scope under the provider's
/// resource, producing a complete export request.
pub fn group_logs(
    batch: Vec<(SdkLogRecord, InstrumentationScope)>,
    resource: &vantage::Resource,
) -> ExportLogsServiceRequest {
    let mut scope_logs: Vec<(InstrumentationScope, Vec<LogRecord>)> = Vec::new();
    for (record, scope) in batch {
        let proto_record = LogRecord::from(&record);
        match scope_logs.iter_mut().find(|(existing, _)| *existing == scope) {
            Some((_, bucket)) => bucket.push(proto_record),
            None => scope_logs.push((scope, vec![proto_record])),
        }
    }

    ExportLogsServiceRequest {
        resource_logs: vec![ResourceLogs {
            resource: Some(resource.into()),
            scope_logs: scope_logs
                .into_iter()
                .map(|(scope, log_records)| ScopeLogs {
                    schema_url: scope.schema_url().unwrap_or_default().to_owned(),
                    scope: Some((&scope).into()),
                    log_records,
                })
                .collect(),
            schema_url: resource.schema_url().unwrap_or_default().to_owned(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vantage::logs::{InMemoryLogExporter, SdkLoggerProvider, Severity};
    use vantage::trace::SdkTracerProvider;
    use vantage::Resource;

    #[test]
    fn record_fields_map_onto_the_wire() {
        let exporter = InMemoryLogExporter::default();
        let provider = SdkLoggerProvider::builder()
            .with_simple_exporter(exporter.clone())
            .build();
        let tracer_provider = SdkTracerProvider::builder().build();
        let span = tracer_provider.tracer("wire").start("active");

        let logger = provider.logger("wire");
        {
            let _guard = span.make_current();
            let mut record = logger.create_log_record();
            record.set_severity_number(Severity::Warn);
            record.set_severity_text("WARN");
            record.set_event_name("checkout.failed");
            record.set_body(SdkAnyValue::from("payment rejected"));
            record.add_attribute("retryable", true);
            logger.emit(record);
        }

        let request = group_logs(exporter.get_emitted_logs(), &Resource::empty());
        let log_record = &request.resource_logs[0].scope_logs[0].log_records[0];
        assert_eq!(log_record.severity_number, Severity::Warn as i32);
        assert_eq!(log_record.severity_text, "WARN");
        assert_eq!(log_record.event_name, "checkout.failed");
        assert_eq!(
            log_record.body.as_ref().unwrap().value,
            Some(any_value::Value::StringValue("payment rejected".to_owned()))
        );
        // Emitted inside an active span, so the identity is attached.
        assert_eq!(
            log_record.trace_id,
            span.span_context().trace_id().to_bytes().to_vec()
        );
        assert_eq!(
            log_record.span_id,
            span.span_context().span_id().to_bytes().to_vec()
        );
        assert!(log_record.observed_time_unix_nano > 0);
    }
}
