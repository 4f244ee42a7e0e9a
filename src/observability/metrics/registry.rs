//! # Metrics Registry
//!
//! Prometheus metrics registry setup, registration and textfile export.

use anyhow::{Context, Result};
use prometheus::{Encoder, Registry, TextEncoder};
use std::path::Path;
use std::sync::LazyLock;

/// Global Prometheus metrics registry
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register all metrics with the Prometheus registry
///
/// Registry::register() takes ownership (Box<dyn Collector>), so the
/// metrics are cloned. Prometheus metrics are Arc-backed internally.
#[allow(
    clippy::missing_errors_doc,
    reason = "Fails only when a metric is registered twice"
)]
pub fn register_metrics() -> Result<()> {
    super::run_metrics::register_run_metrics()?;
    Ok(())
}

/// Render the registry in the Prometheus text exposition format
pub fn render_metrics() -> Result<String> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&REGISTRY.gather(), &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

/// Write the registry to `path` for a node-exporter textfile collector
pub fn write_metrics_file(path: &Path) -> Result<()> {
    let rendered = render_metrics()?;
    std::fs::write(path, rendered)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))
}
