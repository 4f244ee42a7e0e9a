//! # Kube Cluster Client
//!
//! `ClusterApi` over `Api<DynamicObject>`. The client is built from an
//! explicit kubeconfig path; nothing here reads `KUBECONFIG`.

use super::{strip_server_fields, ClusterApi, ClusterError, DocumentRef};
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::core::ApiResource;
use kube::{Client, Config};
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Cluster access through a kube client
#[derive(Clone)]
pub struct KubeCluster {
    client: Client,
}

impl std::fmt::Debug for KubeCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeCluster").finish_non_exhaustive()
    }
}

impl KubeCluster {
    /// Connect using the kubeconfig at `kubeconfig`
    pub async fn connect(kubeconfig: &Path) -> Result<Self, ClusterError> {
        let kubeconfig = Kubeconfig::read_from(kubeconfig)?;
        let mut config =
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default()).await?;
        config.connect_timeout = Some(CONNECT_TIMEOUT);
        config.read_timeout = Some(READ_TIMEOUT);
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, resource: &ApiResource, namespace: Option<&str>) -> Api<DynamicObject> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, resource),
            None => Api::all_with(self.client.clone(), resource),
        }
    }
}

fn to_dynamic(document: &Value) -> Result<DynamicObject, ClusterError> {
    serde_json::from_value(document.clone())
        .map_err(|e| ClusterError::InvalidDocument(e.to_string()))
}

fn to_value(object: DynamicObject) -> Result<Value, ClusterError> {
    serde_json::to_value(object).map_err(|e| ClusterError::InvalidDocument(e.to_string()))
}

fn rejected(doc_ref: &DocumentRef, err: &kube::Error) -> ClusterError {
    ClusterError::Rejected {
        kind: doc_ref.resource.kind.clone(),
        name: doc_ref.name.clone(),
        message: err.to_string(),
    }
}

#[async_trait]
impl ClusterApi for KubeCluster {
    async fn apply(&self, document: &Value) -> Result<(), ClusterError> {
        let doc_ref = DocumentRef::from_document(document)?;
        let mut document = document.clone();
        strip_server_fields(&mut document);
        let api = self.api(&doc_ref.resource, doc_ref.namespace.as_deref());
        let object = to_dynamic(&document)?;

        match api.create(&PostParams::default(), &object).await {
            Ok(_) => {
                debug!("Created {}/{}", doc_ref.resource.kind, doc_ref.name);
                Ok(())
            }
            Err(kube::Error::Api(ae)) if ae.code == 409 => {
                // Replace needs the live resourceVersion
                let live = api
                    .get(&doc_ref.name)
                    .await
                    .map_err(|e| rejected(&doc_ref, &e))?;
                let mut replacement = object;
                replacement.metadata.resource_version = live.metadata.resource_version;
                api.replace(&doc_ref.name, &PostParams::default(), &replacement)
                    .await
                    .map_err(|e| rejected(&doc_ref, &e))?;
                debug!("Replaced {}/{}", doc_ref.resource.kind, doc_ref.name);
                Ok(())
            }
            Err(e) => Err(rejected(&doc_ref, &e)),
        }
    }

    async fn get(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<Option<Value>, ClusterError> {
        let api = self.api(resource, namespace);
        match api.get_opt(name).await? {
            Some(mut object) => {
                object.types = Some(kube::core::TypeMeta {
                    api_version: resource.api_version.clone(),
                    kind: resource.kind.clone(),
                });
                to_value(object).map(Some)
            }
            None => Ok(None),
        }
    }

    async fn list(
        &self,
        resource: &ApiResource,
        namespace: Option<&str>,
        label_selector: &str,
    ) -> Result<Vec<Value>, ClusterError> {
        let api = self.api(resource, namespace);
        let params = ListParams::default().labels(label_selector);
        let objects = api.list(&params).await?;
        objects
            .items
            .into_iter()
            .map(|mut object| {
                object.types = Some(kube::core::TypeMeta {
                    api_version: resource.api_version.clone(),
                    kind: resource.kind.clone(),
                });
                to_value(object)
            })
            .collect()
    }

    async fn delete(
        &self,
        resource: &ApiResource,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<(), ClusterError> {
        let api = self.api(resource, namespace);
        match api.delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
