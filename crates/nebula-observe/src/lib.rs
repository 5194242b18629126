//! Observability setup for nebula: structured logging via `tracing` and
//! optional OpenTelemetry export of spans.

pub mod tracing_setup;
