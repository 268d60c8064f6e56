use crate::logs::{SdkLogRecord, SdkLoggerProvider};
use crate::{Context, InstrumentationScope};
use std::fmt;

/// Emits log records for one instrumentation scope.
///
/// Records are created with [`Logger::create_log_record`], filled in, and
/// handed over with [`Logger::emit`], after which they are immutable.
#[derive(Clone)]
pub struct Logger {
    scope: InstrumentationScope,
    provider: SdkLoggerProvider,
}

impl fmt::Debug for Logger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Logger").field("scope", &self.scope).finish()
    }
}

impl Logger {
    pub(crate) fn new(scope: InstrumentationScope, provider: SdkLoggerProvider) -> Self {
        Logger { scope, provider }
    }

    /// The instrumentation scope of this logger.
    pub fn scope(&self) -> &InstrumentationScope {
        &self.scope
    }

    /// Creates an empty record carrying the provider's record limits, with
    /// the observed timestamp set to now.
    pub fn create_log_record(&self) -> SdkLogRecord {
        SdkLogRecord::new(self.provider.log_record_limits())
    }

    /// Emits the record to every registered processor.
    ///
    /// Records below the provider's severity floor are skipped. If a span
    /// is current on the emitting thread and the record carries no
    /// explicit trace context, the active span's identity is attached.
    pub fn emit(&self, mut record: SdkLogRecord) {
        if !self.provider.should_emit(record.severity_number()) {
            return;
        }

        if record.trace_context().is_none() {
            Context::map_current(|cx| {
                if let Some(span_context) = cx.span_context().filter(|sc| sc.is_valid()) {
                    record.set_trace_context(
                        span_context.trace_id(),
                        span_context.span_id(),
                        Some(span_context.trace_flags()),
                    );
                }
            });
        }

        self.provider.deliver(record, &self.scope);
    }
}
