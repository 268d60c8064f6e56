//! OTLP protobuf messages and transformations for the vantage SDK.
//!
//! The [`proto`] module holds prost message types matching the
//! [OpenTelemetry protocol definitions]; the [`transform`] module converts
//! the SDK's record types into them, grouping records by resource and
//! instrumentation scope.
//!
//! [OpenTelemetry protocol definitions]: https://github.com/open-telemetry/opentelemetry-proto
#![warn(
    future_incompatible,
    nonstandard_style,
    rust_2018_idioms,
    unused
)]

/// Generated-style protobuf message types.
pub mod proto;

/// Conversions from SDK record types to protobuf messages.
pub mod transform;
