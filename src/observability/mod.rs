//! # Observability
//!
//! Run metrics. Logging goes through `tracing` directly and is set up in
//! `runtime::initialization`.

pub mod metrics;
