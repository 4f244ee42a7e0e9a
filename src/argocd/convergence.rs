//! # Convergence Waiter
//!
//! Polls an application's remote status through two sequential phases:
//! sync until `Synced`, then health until `Healthy`. On timeout the last
//! observed status is turned into a `DiagnosticReport` for the operator.

use crate::argocd::application::ApplicationStatus;
use crate::cluster::{self, poll_until, ClusterApi, ClusterError, PollError, PollSettings};
use crate::constants::ARGOCD_NAMESPACE;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, Instrument};

const UNKNOWN: &str = "Unknown";

/// Convergence phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Sync,
    Health,
}

impl Phase {
    fn target(self) -> &'static str {
        match self {
            Phase::Sync => "Synced",
            Phase::Health => "Healthy",
        }
    }

    fn waiter(self) -> &'static str {
        match self {
            Phase::Sync => "application_sync",
            Phase::Health => "application_health",
        }
    }

    fn reached(self, status: &ApplicationStatus) -> bool {
        let observed = match self {
            Phase::Sync => status.sync_status(),
            Phase::Health => status.health_status(),
        };
        observed == Some(self.target())
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Sync => write!(f, "sync"),
            Phase::Health => write!(f, "health"),
        }
    }
}

/// One resource line of a diagnostic report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLine {
    pub kind: String,
    pub name: String,
    pub health: String,
    pub sync: String,
}

/// Snapshot of an application that failed to converge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticReport {
    pub application: String,
    pub sync: String,
    pub health: String,
    pub resources: Vec<ResourceLine>,
}

impl DiagnosticReport {
    pub fn from_status(application: &str, status: Option<&ApplicationStatus>) -> Self {
        let Some(status) = status else {
            return Self {
                application: application.to_string(),
                sync: UNKNOWN.to_string(),
                health: UNKNOWN.to_string(),
                resources: Vec::new(),
            };
        };
        Self {
            application: application.to_string(),
            sync: status.sync_status().unwrap_or(UNKNOWN).to_string(),
            health: status.health_status().unwrap_or(UNKNOWN).to_string(),
            resources: status
                .resources
                .iter()
                .map(|r| ResourceLine {
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                    health: r
                        .health
                        .as_ref()
                        .and_then(|h| h.status.clone())
                        .unwrap_or_else(|| UNKNOWN.to_string()),
                    sync: r.status.clone().unwrap_or_else(|| UNKNOWN.to_string()),
                })
                .collect(),
        }
    }

    /// Emit the report at error level, one line per resource
    pub fn log(&self) {
        error!(
            application = %self.application,
            "Application status: Sync={}, Health={}", self.sync, self.health
        );
        for resource in &self.resources {
            error!(
                application = %self.application,
                "  {}/{}: Health={}, Sync={}",
                resource.kind, resource.name, resource.health, resource.sync
            );
        }
    }
}

impl fmt::Display for DiagnosticReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: Sync={}, Health={}",
            self.application, self.sync, self.health
        )?;
        for resource in &self.resources {
            write!(
                f,
                "\n  {}/{}: Health={}, Sync={}",
                resource.kind, resource.name, resource.health, resource.sync
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("{phase} of {} not reached within {}s", report.application, after.as_secs())]
    Timeout {
        phase: Phase,
        after: Duration,
        report: Box<DiagnosticReport>,
    },
    #[error("cancelled")]
    Cancelled,
}

/// Waits for applications to converge
#[derive(Clone)]
pub struct ConvergenceWaiter {
    cluster: Arc<dyn ClusterApi>,
    cancel: CancellationToken,
}

impl fmt::Debug for ConvergenceWaiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConvergenceWaiter").finish_non_exhaustive()
    }
}

impl ConvergenceWaiter {
    pub fn new(cluster: Arc<dyn ClusterApi>, cancel: CancellationToken) -> Self {
        Self { cluster, cancel }
    }

    /// Current remote status, `None` while the object or its status is absent
    pub async fn fetch_status(
        &self,
        application: &str,
    ) -> Result<Option<ApplicationStatus>, ClusterError> {
        let Some(document) = self
            .cluster
            .get(&cluster::applications(), application, Some(ARGOCD_NAMESPACE))
            .await?
        else {
            return Ok(None);
        };
        match document.get("status") {
            Some(status) if !status.is_null() => serde_json::from_value(status.clone())
                .map(Some)
                .map_err(|e| ClusterError::InvalidDocument(e.to_string())),
            _ => Ok(None),
        }
    }

    /// Wait for `Synced` and then `Healthy`, splitting `total_timeout`
    /// between the two phases.
    pub async fn wait_ready(
        &self,
        application: &str,
        total_timeout: Duration,
        interval: Duration,
    ) -> Result<(), ConvergenceError> {
        let sync_timeout = Duration::from_secs(total_timeout.as_secs() / 2);
        let health_timeout = total_timeout.saturating_sub(sync_timeout);

        let span = info_span!("application.convergence", application = %application);
        async {
            info!(
                "Waiting for {} to converge (sync {}s, health {}s)",
                application,
                sync_timeout.as_secs(),
                health_timeout.as_secs()
            );
            self.wait_for_sync(application, sync_timeout, interval).await?;
            info!("{} is Synced", application);
            self.wait_for_health(application, health_timeout, interval)
                .await?;
            info!("{} is Healthy", application);
            Ok::<(), ConvergenceError>(())
        }
        .instrument(span)
        .await
    }

    pub async fn wait_for_sync(
        &self,
        application: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ConvergenceError> {
        self.wait_phase(application, Phase::Sync, timeout, interval)
            .await
    }

    pub async fn wait_for_health(
        &self,
        application: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ConvergenceError> {
        self.wait_phase(application, Phase::Health, timeout, interval)
            .await
    }

    async fn wait_phase(
        &self,
        application: &str,
        phase: Phase,
        timeout: Duration,
        interval: Duration,
    ) -> Result<(), ConvergenceError> {
        let start = Instant::now();
        let last_seen: Mutex<Option<ApplicationStatus>> = Mutex::new(None);

        let result = poll_until(
            PollSettings::new(phase.waiter(), timeout, interval),
            &self.cancel,
            || async {
                let status = self.fetch_status(application).await?;
                let reached = status.as_ref().is_some_and(|s| phase.reached(s));
                if !reached {
                    let elapsed = start.elapsed();
                    let (sync, health) = status.as_ref().map_or((UNKNOWN, UNKNOWN), |s| {
                        (
                            s.sync_status().unwrap_or(UNKNOWN),
                            s.health_status().unwrap_or(UNKNOWN),
                        )
                    });
                    info!(
                        "Waiting for {} {}: Sync={}, Health={} ({}s elapsed, {}s remaining)",
                        application,
                        phase,
                        sync,
                        health,
                        elapsed.as_secs(),
                        timeout.saturating_sub(elapsed).as_secs()
                    );
                }
                *last_seen.lock().unwrap_or_else(PoisonError::into_inner) = status;
                Ok::<bool, ClusterError>(reached)
            },
        )
        .await;

        match result {
            Ok(()) => Ok(()),
            Err(PollError::Cancelled) => Err(ConvergenceError::Cancelled),
            Err(PollError::TimedOut(after)) => {
                let last = last_seen.into_inner().unwrap_or_else(PoisonError::into_inner);
                Err(ConvergenceError::Timeout {
                    phase,
                    after,
                    report: Box::new(DiagnosticReport::from_status(application, last.as_ref())),
                })
            }
        }
    }
}
