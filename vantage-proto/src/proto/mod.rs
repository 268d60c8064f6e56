//! Message types for the OTLP wire format, bit-compatible with the
//! `opentelemetry.proto.*` protobuf packages.

pub mod collector;
pub mod common;
pub mod logs;
pub mod metrics;
pub mod resource;
pub mod trace;
