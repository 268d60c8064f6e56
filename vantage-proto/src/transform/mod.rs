//! Conversions from SDK record types into OTLP messages.
//!
//! Records are bucketed first by resource (one per provider) and then by
//! instrumentation scope; attribute ordering is irrelevant on the wire.

mod common;
mod logs;
mod metrics;
mod trace;

pub use common::to_nanos;
pub use logs::group_logs;
pub use metrics::resource_metrics_request;
pub use trace::group_spans;
