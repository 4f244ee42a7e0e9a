//! # Metrics Module
//!
//! Prometheus metrics for a deployment run.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup, registration and text export
//! - `run_metrics` - Step durations, step outcomes, poll iterations and failures

pub mod registry;
pub mod run_metrics;

pub use registry::*;
pub use run_metrics::*;
