//! # Application Convergence Driver
//!
//! Builds the ArgoCD `Application` document for each managed application
//! and applies it. Applying never waits; convergence is observed through
//! `ConvergenceWaiter`.

use crate::cluster::{self, ClusterApi};
use crate::constants::{
    ARGOCD_NAMESPACE, BASE_APP, BASE_CHART_PATH, BASE_DESTINATION_NAMESPACE,
    DEFAULT_TARGET_REVISION, DEPENDENCIES_APP, DEPENDENCIES_CHART_PATH, IN_CLUSTER_SERVER,
};
use crate::error::DeployError;
use crate::values::ParameterDocument;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Application",
    group = "argoproj.io",
    version = "v1alpha1",
    namespaced,
    status = "ApplicationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    pub project: String,
    pub source: ApplicationSource,
    pub destination: ApplicationDestination,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_policy: Option<SyncPolicy>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSource {
    #[serde(rename = "repoURL")]
    pub repo_url: String,
    pub target_revision: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub helm: Option<HelmSource>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct HelmSource {
    /// Values document passed to the chart verbatim
    pub values: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ApplicationDestination {
    pub server: String,
    pub namespace: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub automated: Option<AutomatedSync>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sync_options: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AutomatedSync {
    pub self_heal: bool,
    pub prune: bool,
}

/// Remote status as reported by ArgoCD. Only the fields the waiter reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ApplicationStatus {
    #[serde(default)]
    pub sync: Option<StatusField>,
    #[serde(default)]
    pub health: Option<StatusField>,
    #[serde(default)]
    pub resources: Vec<ResourceStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct StatusField {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// One resource tracked under an application
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct ResourceStatus {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    /// Per-resource sync status
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub health: Option<StatusField>,
}

impl ApplicationStatus {
    pub fn sync_status(&self) -> Option<&str> {
        self.sync.as_ref().and_then(|s| s.status.as_deref())
    }

    pub fn health_status(&self) -> Option<&str> {
        self.health.as_ref().and_then(|h| h.status.as_deref())
    }
}

/// Fixed shape of one managed application
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationTarget {
    pub name: String,
    pub repo_url: String,
    pub path: String,
    pub destination_namespace: String,
    pub create_namespace: bool,
}

impl ApplicationTarget {
    pub fn dependencies(repo_url: &str) -> Self {
        Self {
            name: DEPENDENCIES_APP.to_string(),
            repo_url: repo_url.to_string(),
            path: DEPENDENCIES_CHART_PATH.to_string(),
            destination_namespace: ARGOCD_NAMESPACE.to_string(),
            create_namespace: false,
        }
    }

    pub fn base(repo_url: &str) -> Self {
        Self {
            name: BASE_APP.to_string(),
            repo_url: repo_url.to_string(),
            path: BASE_CHART_PATH.to_string(),
            destination_namespace: BASE_DESTINATION_NAMESPACE.to_string(),
            create_namespace: true,
        }
    }

    /// Desired-state document for this target
    pub fn build(
        &self,
        parameters: &ParameterDocument,
        target_revision: Option<&str>,
    ) -> Result<Application, DeployError> {
        let values = parameters
            .to_values_yaml()
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        let sync_options = if self.create_namespace {
            vec!["CreateNamespace=true".to_string()]
        } else {
            Vec::new()
        };

        let mut application = Application::new(
            &self.name,
            ApplicationSpec {
                project: "default".to_string(),
                source: ApplicationSource {
                    repo_url: self.repo_url.clone(),
                    target_revision: target_revision
                        .unwrap_or(DEFAULT_TARGET_REVISION)
                        .to_string(),
                    path: self.path.clone(),
                    helm: Some(HelmSource { values }),
                },
                destination: ApplicationDestination {
                    server: IN_CLUSTER_SERVER.to_string(),
                    namespace: self.destination_namespace.clone(),
                },
                sync_policy: Some(SyncPolicy {
                    automated: Some(AutomatedSync {
                        self_heal: true,
                        prune: true,
                    }),
                    sync_options,
                }),
            },
        );
        application.metadata.namespace = Some(ARGOCD_NAMESPACE.to_string());
        Ok(application)
    }
}

/// Applies managed applications to the cluster
#[derive(Clone)]
pub struct ApplicationDriver {
    cluster: Arc<dyn ClusterApi>,
}

impl std::fmt::Debug for ApplicationDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationDriver").finish_non_exhaustive()
    }
}

impl ApplicationDriver {
    pub fn new(cluster: Arc<dyn ClusterApi>) -> Self {
        Self { cluster }
    }

    /// Create or update the application. Does not wait for reconciliation.
    pub async fn apply(
        &self,
        target: &ApplicationTarget,
        parameters: &ParameterDocument,
        target_revision: Option<&str>,
    ) -> Result<(), DeployError> {
        let application = target.build(parameters, target_revision)?;
        let document: Value = serde_json::to_value(&application)
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        debug!(application = %target.name, "Application document: {}", document);

        self.cluster
            .apply(&document)
            .await
            .map_err(|e| DeployError::ApplyFailed {
                target: format!("Application/{}", target.name),
                message: e.to_string(),
            })?;
        info!(
            application = %target.name,
            "Applied application at revision {}",
            application.spec.source.target_revision
        );
        Ok(())
    }

    /// Remove the application object. Absent applications are not an error.
    pub async fn delete(&self, name: &str) -> Result<(), DeployError> {
        self.cluster
            .delete(&cluster::applications(), name, Some(ARGOCD_NAMESPACE))
            .await?;
        info!(application = %name, "Deleted application");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::render_parameters;
    use serde_json::json;

    fn params() -> ParameterDocument {
        render_parameters(
            &json!({"deploy": {"cert_manager": true}}),
            &["deploy.cert_manager"],
        )
    }

    #[test]
    fn test_dependencies_document_shape() {
        let app = ApplicationTarget::dependencies("git@example.com:org/deps.git")
            .build(&params(), Some("main"))
            .unwrap();
        let doc = serde_json::to_value(&app).unwrap();
        assert_eq!(doc["apiVersion"], json!("argoproj.io/v1alpha1"));
        assert_eq!(doc["kind"], json!("Application"));
        assert_eq!(doc["metadata"]["name"], json!("cm-stack-dependencies"));
        assert_eq!(doc["metadata"]["namespace"], json!("argocd"));
        assert_eq!(doc["spec"]["project"], json!("default"));
        assert_eq!(
            doc["spec"]["source"]["repoURL"],
            json!("git@example.com:org/deps.git")
        );
        assert_eq!(doc["spec"]["source"]["targetRevision"], json!("main"));
        assert_eq!(
            doc["spec"]["destination"],
            json!({"server": "https://kubernetes.default.svc", "namespace": "argocd"})
        );
        assert_eq!(
            doc["spec"]["syncPolicy"],
            json!({"automated": {"selfHeal": true, "prune": true}})
        );
        assert!(doc.get("status").is_none());
    }

    #[test]
    fn test_base_creates_namespace() {
        let app = ApplicationTarget::base("git@example.com:org/base.git")
            .build(&params(), None)
            .unwrap();
        assert_eq!(app.spec.source.target_revision, "HEAD");
        assert_eq!(app.spec.destination.namespace, "cm-stack");
        let sync = app.spec.sync_policy.unwrap();
        assert_eq!(sync.sync_options, vec!["CreateNamespace=true"]);
    }

    #[test]
    fn test_helm_values_carry_parameters() {
        let app = ApplicationTarget::dependencies("repo")
            .build(&params(), None)
            .unwrap();
        let values = app.spec.source.helm.unwrap().values;
        let parsed: Value = serde_yaml::from_str(&values).unwrap();
        assert_eq!(parsed, json!({"deploy": {"cert_manager": true}}));
    }

    #[test]
    fn test_status_parses_remote_document() {
        let status: ApplicationStatus = serde_json::from_value(json!({
            "sync": {"status": "OutOfSync", "revision": "abc"},
            "health": {"status": "Progressing"},
            "resources": [
                {"kind": "Deployment", "name": "api", "namespace": "cm-stack",
                 "status": "Synced", "health": {"status": "Degraded"}},
                {"kind": "ConfigMap", "name": "settings", "status": "OutOfSync"}
            ],
            "operationState": {"phase": "Running"}
        }))
        .unwrap();
        assert_eq!(status.sync_status(), Some("OutOfSync"));
        assert_eq!(status.health_status(), Some("Progressing"));
        assert_eq!(status.resources.len(), 2);
        assert!(status.resources[1].health.is_none());
    }
}
