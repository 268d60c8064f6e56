//! Implements a telemetry SDK for distributed tracing, metrics and logs.
//!
//! Vantage provides the runtime that accepts telemetry measurements from
//! application code, applies sampling, aggregation and resource attribution,
//! and hands the resulting records to exporters such as
//! [`vantage-otlp`](https://crates.io/crates/vantage-otlp).
//!
//! # Getting Started
//!
//! ```
//! use vantage::trace::SdkTracerProvider;
//!
//! // Configure a tracer provider; spans are handed to its processors.
//! let provider = SdkTracerProvider::builder().build();
//! let tracer = provider.tracer("component-main");
//!
//! let mut span = tracer.start("operation");
//! // ... perform the operation ...
//! span.end();
//!
//! provider.shutdown().expect("provider shutdown");
//! ```
//!
//! # Crate layout
//!
//! - [`trace`]: span lifecycle, sampling, processors.
//! - [`metrics`]: instruments, aggregation storage, readers.
//! - [`logs`]: log records, loggers, processors.
//! - [`propagation`]: W3C TraceContext and Baggage wire formats.
//! - [`resource`]: the attribute set identifying this producer.
//! - [`global`]: process-wide provider and propagator installation.
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

pub mod baggage;

mod common;
pub use common::{Array, InstrumentationScope, InstrumentationScopeBuilder, Key, KeyValue, Value};

pub mod config;

mod context;
pub use context::{Context, ContextGuard};

#[doc(hidden)]
pub mod diag;

pub mod error;

pub mod global;

pub mod logs;

pub mod metrics;

pub mod propagation;

pub mod resource;
pub use resource::Resource;

pub mod time;

pub mod trace;
pub use trace::{SpanId, TraceFlags, TraceId};
