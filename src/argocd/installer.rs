//! # Controller Installer
//!
//! Installs ArgoCD from its Helm chart, waits for `argocd-server` to become
//! Available and reads the generated admin credentials.

use crate::cluster::{self, poll_until, ClusterApi, ClusterError, PollError, PollSettings};
use crate::constants::{
    ADMIN_USERNAME, ARGOCD_CHART, ARGOCD_CHART_VERSION, ARGOCD_NAMESPACE, ARGOCD_RELEASE,
    ARGOCD_SERVER_SELECTOR, ARGO_HELM_REPO_NAME, ARGO_HELM_REPO_URL, INITIAL_ADMIN_SECRET,
};
use crate::error::DeployError;
use crate::helm::{PackageError, PackageManager, ReleaseSpec};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, Instrument};
use zeroize::Zeroizing;

/// Why the admin credentials could not be read
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("initial admin secret not found")]
    NotFound,
    #[error("initial admin secret has no password")]
    Empty,
    #[error("initial admin password is not valid base64 UTF-8")]
    Malformed,
    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

/// ArgoCD admin login
pub struct AdminCredentials {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl std::fmt::Debug for AdminCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// True when a deployment reports condition `Available=True`
fn is_available(deployment: &Value) -> bool {
    deployment
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .is_some_and(|conditions| {
            conditions.iter().any(|c| {
                c.get("type").and_then(Value::as_str) == Some("Available")
                    && c.get("status").and_then(Value::as_str) == Some("True")
            })
        })
}

/// Installs ArgoCD and checks its readiness
#[derive(Clone)]
pub struct ControllerInstaller {
    helm: Arc<dyn PackageManager>,
    cluster: Arc<dyn ClusterApi>,
    cancel: CancellationToken,
    poll_interval: Duration,
    values_file: Option<PathBuf>,
}

impl std::fmt::Debug for ControllerInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControllerInstaller")
            .field("poll_interval", &self.poll_interval)
            .field("values_file", &self.values_file)
            .finish_non_exhaustive()
    }
}

impl ControllerInstaller {
    pub fn new(
        helm: Arc<dyn PackageManager>,
        cluster: Arc<dyn ClusterApi>,
        cancel: CancellationToken,
        poll_interval: Duration,
    ) -> Self {
        Self {
            helm,
            cluster,
            cancel,
            poll_interval,
            values_file: None,
        }
    }

    /// Extra values file for the ArgoCD release
    #[must_use]
    pub fn with_values_file(mut self, values_file: Option<PathBuf>) -> Self {
        self.values_file = values_file;
        self
    }

    pub fn release_spec(&self) -> ReleaseSpec {
        ReleaseSpec {
            release: ARGOCD_RELEASE.to_string(),
            chart: ARGOCD_CHART.to_string(),
            version: ARGOCD_CHART_VERSION.to_string(),
            namespace: ARGOCD_NAMESPACE.to_string(),
            create_namespace: true,
            values_file: self.values_file.clone(),
        }
    }

    /// Add the chart repository, refresh the index and install or upgrade
    pub async fn install(&self) -> Result<(), DeployError> {
        let span = info_span!("argocd.install", version = ARGOCD_CHART_VERSION);
        async {
            match self.helm.add_repo(ARGO_HELM_REPO_NAME, ARGO_HELM_REPO_URL).await {
                Ok(()) => {}
                Err(PackageError::RepoExists(_)) => {
                    debug!("Helm repository {} already present", ARGO_HELM_REPO_NAME);
                }
                Err(e) => return Err(DeployError::from(e)),
            }
            self.helm.update_repos().await?;
            self.helm.upgrade_install(&self.release_spec()).await?;
            info!("ArgoCD {} installed", ARGOCD_CHART_VERSION);
            Ok::<(), DeployError>(())
        }
        .instrument(span)
        .await
    }

    /// Wait for `argocd-server` to report Available
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), DeployError> {
        info!("Waiting for argocd-server to become available");
        let resource = cluster::deployments();
        let result = poll_until(
            PollSettings::new("controller_ready", timeout, self.poll_interval),
            &self.cancel,
            || async {
                let deployments = self
                    .cluster
                    .list(&resource, Some(ARGOCD_NAMESPACE), ARGOCD_SERVER_SELECTOR)
                    .await?;
                Ok::<bool, ClusterError>(deployments.iter().any(is_available))
            },
        )
        .await;

        match result {
            Ok(()) => {
                info!("argocd-server is available");
                Ok(())
            }
            Err(PollError::Cancelled) => Err(DeployError::Cancelled),
            Err(PollError::TimedOut(after)) => Err(DeployError::Timeout {
                what: "argocd-server".to_string(),
                after,
            }),
        }
    }

    /// Read the generated admin password
    pub async fn get_credentials(&self) -> Result<AdminCredentials, CredentialError> {
        let secret = self
            .cluster
            .get(&cluster::secrets(), INITIAL_ADMIN_SECRET, Some(ARGOCD_NAMESPACE))
            .await?
            .ok_or(CredentialError::NotFound)?;

        let encoded = secret
            .pointer("/data/password")
            .and_then(Value::as_str)
            .filter(|p| !p.is_empty())
            .ok_or(CredentialError::Empty)?;
        let decoded = Zeroizing::new(
            STANDARD
                .decode(encoded)
                .map_err(|_| CredentialError::Malformed)?,
        );
        let password = std::str::from_utf8(&decoded).map_err(|_| CredentialError::Malformed)?;
        if password.is_empty() {
            return Err(CredentialError::Empty);
        }

        Ok(AdminCredentials {
            username: ADMIN_USERNAME.to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }
}
