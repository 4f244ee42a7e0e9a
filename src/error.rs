//! # Deployment Error Types
//!
//! Orchestrator-facing error taxonomy. Components return their own typed
//! errors; they are folded into [`DeployError`] at step boundaries and the
//! orchestrator alone decides whether a failed step is fatal or a warning.

use crate::cluster::ClusterError;
use crate::config::ConfigError;
use crate::helm::PackageError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failure of a deployment step
#[derive(Debug, Error)]
pub enum DeployError {
    /// A required input file is absent (kubeconfig, secret material)
    #[error("required input missing: {}", path.display())]
    MissingInput { path: PathBuf },

    /// A repository private key is absent
    #[error("repository key missing for '{repository}': {}", path.display())]
    MissingCredential { repository: String, path: PathBuf },

    /// Deployment configuration failed to load or validate
    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    /// The cluster rejected a document
    #[error("failed to apply {target}: {message}")]
    ApplyFailed { target: String, message: String },

    /// The package manager failed
    #[error(transparent)]
    Package(#[from] PackageError),

    /// A wait exceeded its budget
    #[error("timed out after {}s waiting for {what}", after.as_secs())]
    Timeout { what: String, after: Duration },

    /// A component did not become ready again after a forced restart
    #[error("{component} did not become ready after restart")]
    RestartTimeout { component: String },

    /// A cluster read failed
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Signing key material could not be loaded or generated
    #[error("key material error: {0}")]
    KeyMaterial(String),

    /// Local filesystem failure
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A document could not be serialized
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The run was interrupted
    #[error("deployment cancelled")]
    Cancelled,
}

impl DeployError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DeployError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DeployError::MissingInput { .. } => "missing_input",
            DeployError::MissingCredential { .. } => "missing_credential",
            DeployError::InvalidConfig(_) => "invalid_config",
            DeployError::ApplyFailed { .. } => "apply_failed",
            DeployError::Package(_) => "package",
            DeployError::Timeout { .. } => "timeout",
            DeployError::RestartTimeout { .. } => "restart_timeout",
            DeployError::Cluster(_) => "cluster",
            DeployError::KeyMaterial(_) => "key_material",
            DeployError::Io { .. } => "io",
            DeployError::Serialization(_) => "serialization",
            DeployError::Cancelled => "cancelled",
        }
    }

    /// Operator guidance for this error, when there is any
    pub fn remediation(&self) -> Option<String> {
        match self {
            DeployError::MissingInput { path } => Some(format!(
                "Create {} or point the deployer at the right directory with --secrets-dir / --config.",
                path.display()
            )),
            DeployError::MissingCredential { path, .. } => Some(format!(
                "Place the repository deploy key at {} (OpenSSH private key with read access to the repository).",
                path.display()
            )),
            DeployError::InvalidConfig(_) => {
                Some("Fix the deployment configuration file and re-run.".to_string())
            }
            DeployError::Package(PackageError::BinaryNotFound) => {
                Some("Install helm 3 and make sure it is on PATH.".to_string())
            }
            DeployError::Timeout { .. } => Some(
                "Inspect the application in the ArgoCD UI or with `kubectl get applications -n argocd`; the run is safe to repeat."
                    .to_string(),
            ),
            DeployError::RestartTimeout { component } => Some(format!(
                "Check `kubectl -n argocd get pods` and the logs of {component}; restart it manually if needed."
            )),
            _ => None,
        }
    }
}
