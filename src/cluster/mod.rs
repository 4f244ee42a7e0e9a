//! # Cluster Access
//!
//! The cluster object applier seam. Every component that touches the
//! cluster receives an `Arc<dyn ClusterApi>`; documents are complete JSON
//! values submitted atomically, never partial patches.
//!
//! - `kube_client` - `ClusterApi` backed by a kube `Client`
//! - `poll` - shared poll-until primitive used by every waiter

pub mod kube_client;
pub mod poll;

pub use kube_client::KubeCluster;
pub use poll::{poll_until, PollError, PollSettings};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, StatefulSet};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret};
use kube::core::{ApiResource, GroupVersionKind};
use serde_json::Value;
use thiserror::Error;

/// Errors reported by the cluster applier
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The API server refused the document
    #[error("{kind}/{name} rejected: {message}")]
    Rejected {
        kind: String,
        name: String,
        message: String,
    },

    /// The document is missing fields needed to address it
    #[error("invalid document: {0}")]
    InvalidDocument(String),

    /// The kubeconfig could not be read or loaded
    #[error("kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// Transport or API failure
    #[error(transparent)]
    Kube(#[from] kube::Error),
}

/// Create/read/list/delete access to cluster objects
#[async_trait]
pub trait ClusterApi: Send + Sync {
    /// Create the object, or replace it after reading its live resourceVersion
    /// when it already exists.
    async fn apply(&self, document: &Value) -> Result<(), ClusterError>;

    /// Read an object by name. `Ok(None)` when it does not exist.
    async fn get(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Value>, ClusterError>;

    /// List objects matching a label selector.
    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>, ClusterError>;

    /// Delete an object. Deleting an absent object succeeds.
    async fn delete(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<(), ClusterError>;
}

pub fn deployments() -> ApiResource {
    ApiResource::erase::<Deployment>(&())
}

pub fn stateful_sets() -> ApiResource {
    ApiResource::erase::<StatefulSet>(&())
}

pub fn pods() -> ApiResource {
    ApiResource::erase::<Pod>(&())
}

pub fn secrets() -> ApiResource {
    ApiResource::erase::<Secret>(&())
}

pub fn config_maps() -> ApiResource {
    ApiResource::erase::<ConfigMap>(&())
}

pub fn namespaces() -> ApiResource {
    ApiResource::erase::<Namespace>(&())
}

/// ArgoCD `Application` resource
pub fn applications() -> ApiResource {
    ApiResource::from_gvk(&GroupVersionKind::gvk(
        "argoproj.io",
        "v1alpha1",
        "Application",
    ))
}

/// Split an apiVersion into (group, version). Core resources have an empty group.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Addressing information pulled from a complete document
#[derive(Debug, Clone)]
pub struct DocumentRef {
    pub resource: ApiResource,
    pub name: String,
    pub namespace: Option<String>,
}

impl DocumentRef {
    pub fn from_document(document: &Value) -> Result<Self, ClusterError> {
        let api_version = document
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| ClusterError::InvalidDocument("missing apiVersion".to_string()))?;
        let kind = document
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| ClusterError::InvalidDocument("missing kind".to_string()))?;
        let name = document
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .ok_or_else(|| ClusterError::InvalidDocument("missing metadata.name".to_string()))?;
        let namespace = document
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .map(str::to_string);

        let (group, version) = parse_api_version(api_version);
        let gvk = GroupVersionKind::gvk(&group, &version, kind);
        Ok(Self {
            resource: ApiResource::from_gvk(&gvk),
            name: name.to_string(),
            namespace,
        })
    }
}

/// Strip fields the API server owns so a document can be submitted for
/// create or replace.
pub fn strip_server_fields(document: &mut Value) {
    if let Some(metadata) = document.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in [
            "resourceVersion",
            "uid",
            "creationTimestamp",
            "managedFields",
            "generation",
            "selfLink",
        ] {
            metadata.remove(field);
        }
    }
    if let Some(obj) = document.as_object_mut() {
        obj.remove("status");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_api_version() {
        assert_eq!(
            parse_api_version("argoproj.io/v1alpha1"),
            ("argoproj.io".to_string(), "v1alpha1".to_string())
        );
        assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn test_document_ref_resolves_plural() {
        let doc = json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": "jwk-config", "namespace": "istio-system"}
        });
        let doc_ref = DocumentRef::from_document(&doc).unwrap();
        assert_eq!(doc_ref.resource.plural, "configmaps");
        assert_eq!(doc_ref.name, "jwk-config");
        assert_eq!(doc_ref.namespace.as_deref(), Some("istio-system"));
    }

    #[test]
    fn test_document_ref_requires_name() {
        let doc = json!({"apiVersion": "v1", "kind": "Secret", "metadata": {}});
        assert!(matches!(
            DocumentRef::from_document(&doc),
            Err(ClusterError::InvalidDocument(_))
        ));
    }

    #[test]
    fn test_strip_server_fields() {
        let mut doc = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": "argocd-repo-server",
                "resourceVersion": "42",
                "uid": "abc",
                "managedFields": [],
                "labels": {"app": "x"}
            },
            "spec": {"replicas": 1},
            "status": {"readyReplicas": 1}
        });
        strip_server_fields(&mut doc);
        assert_eq!(
            doc,
            json!({
                "apiVersion": "apps/v1",
                "kind": "Deployment",
                "metadata": {"name": "argocd-repo-server", "labels": {"app": "x"}},
                "spec": {"replicas": 1}
            })
        );
    }
}
