//! # Repository Registrar
//!
//! Registers a private Git repository with ArgoCD by applying a labelled
//! repository Secret carrying the SSH deploy key.

use crate::cluster::{self, ClusterApi};
use crate::constants::{ARGOCD_NAMESPACE, REPOSITORY_SECRET_TYPE_LABEL};
use crate::error::DeployError;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use zeroize::Zeroizing;

/// A repository ArgoCD must be able to pull from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryRegistration {
    /// Secret name, unique per ArgoCD instance
    pub name: String,
    pub url: String,
    /// SSH private key file
    pub key_path: PathBuf,
}

/// Credential Secret for one repository.
///
/// The key is normalised to end with exactly one newline; OpenSSH refuses
/// keys without a trailing newline.
pub fn credential_document(registration: &RepositoryRegistration, ssh_key: &str) -> Value {
    let mut key = ssh_key.trim().to_string();
    key.push('\n');
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": registration.name,
            "namespace": ARGOCD_NAMESPACE,
            "labels": {
                REPOSITORY_SECRET_TYPE_LABEL: "repository",
            },
        },
        "type": "Opaque",
        "stringData": {
            "type": "git",
            "name": registration.name,
            "url": registration.url,
            "sshPrivateKey": key,
        },
    })
}

/// Registers repositories with ArgoCD
#[derive(Clone)]
pub struct RepositoryRegistrar {
    cluster: Arc<dyn ClusterApi>,
}

impl std::fmt::Debug for RepositoryRegistrar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryRegistrar").finish_non_exhaustive()
    }
}

impl RepositoryRegistrar {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Create or overwrite the repository credential. Not retried here.
    pub async fn register(&self, registration: &RepositoryRegistration) -> Result<(), DeployError> {
        let key = match std::fs::read_to_string(&registration.key_path) {
            Ok(key) => Zeroizing::new(key),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DeployError::MissingCredential {
                    repository: registration.name.clone(),
                    path: registration.key_path.clone(),
                });
            }
            Err(e) => return Err(DeployError::io(&registration.key_path, e)),
        };
        if key.trim().is_empty() {
            return Err(DeployError::MissingCredential {
                repository: registration.name.clone(),
                path: registration.key_path.clone(),
            });
        }

        let document = credential_document(registration, &key);
        self.cluster
            .apply(&document)
            .await
            .map_err(|e| DeployError::ApplyFailed {
                target: format!("Secret/{}", registration.name),
                message: e.to_string(),
            })?;
        info!(repository = %registration.name, "Registered repository {}", registration.url);
        Ok(())
    }

    /// Remove a repository credential. Absent credentials are not an error.
    pub async fn unregister(&self, name: &str) -> Result<(), DeployError> {
        self.cluster
            .delete(&cluster::secrets(), name, Some(ARGOCD_NAMESPACE))
            .await?;
        info!(repository = %name, "Removed repository credential");
        Ok(())
    }
}
