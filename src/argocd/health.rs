//! # Component Health Monitor
//!
//! Discovers ArgoCD's own workloads and checks or awaits their readiness.
//! Also drives the restart-and-recheck cycle that makes the repo server and
//! the application controller drop cached repository access.
//!
//! Readiness checks never fail: an unreadable or malformed workload is
//! simply not ready.

use crate::cluster::{self, poll_until, ClusterApi, ClusterError, PollError, PollSettings};
use crate::config::Timings;
use crate::constants::{
    APPLICATION_CONTROLLER, ARGOCD_NAMESPACE, ARGOCD_PART_OF_SELECTOR, REPO_SERVER,
    RESTARTED_AT_ANNOTATION,
};
use crate::error::DeployError;
use kube::core::ApiResource;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::convert::Infallible;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

/// Workload kinds ArgoCD runs as
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum WorkloadKind {
    Deployment,
    StatefulSet,
}

impl WorkloadKind {
    pub fn resource(self) -> ApiResource {
        match self {
            WorkloadKind::Deployment => cluster::deployments(),
            WorkloadKind::StatefulSet => cluster::stateful_sets(),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::Deployment => write!(f, "deployment"),
            WorkloadKind::StatefulSet => write!(f, "statefulset"),
        }
    }
}

/// One discovered ArgoCD workload
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Component {
    pub kind: WorkloadKind,
    pub name: String,
}

impl Component {
    pub fn deployment(name: &str) -> Self {
        Self {
            kind: WorkloadKind::Deployment,
            name: name.to_string(),
        }
    }

    pub fn stateful_set(name: &str) -> Self {
        Self {
            kind: WorkloadKind::StatefulSet,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Ready and desired replica counts of a workload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaTally {
    pub ready: u32,
    pub total: u32,
}

impl ReplicaTally {
    /// Tally from a workload document. `None` when the status is absent or
    /// a count is not a number.
    pub fn from_workload(workload: &Value) -> Option<Self> {
        let status = workload.get("status").filter(|s| s.is_object())?;
        let total = match workload.pointer("/spec/replicas") {
            Some(replicas) => count(replicas)?,
            None => count(status.get("replicas")?)?,
        };
        let ready = match status.get("readyReplicas") {
            Some(ready) => count(ready)?,
            None => 0,
        };
        Some(Self { ready, total })
    }

    /// Every desired replica is ready and at least one is desired
    pub fn is_complete(self) -> bool {
        self.total > 0 && self.ready == self.total
    }
}

fn count(value: &Value) -> Option<u32> {
    value.as_u64().and_then(|n| u32::try_from(n).ok())
}

impl fmt::Display for ReplicaTally {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ready, self.total)
    }
}

/// `spec.selector.matchLabels` rendered as a label selector
fn match_labels_selector(workload: &Value) -> Option<String> {
    let labels = workload
        .pointer("/spec/selector/matchLabels")?
        .as_object()?;
    if labels.is_empty() {
        return None;
    }
    let selector = labels
        .iter()
        .filter_map(|(k, v)| v.as_str().map(|v| format!("{k}={v}")))
        .collect::<Vec<_>>()
        .join(",");
    Some(selector)
}

/// Pod is running, not terminating and every container reports ready
fn pod_ready(pod: &Value) -> bool {
    if pod.pointer("/metadata/deletionTimestamp").is_some_and(|t| !t.is_null()) {
        return false;
    }
    let Some(statuses) = pod
        .pointer("/status/containerStatuses")
        .and_then(Value::as_array)
    else {
        return false;
    };
    !statuses.is_empty()
        && statuses
            .iter()
            .all(|c| c.get("ready").and_then(Value::as_bool) == Some(true))
}

/// Deployment rollout has finished: the controller observed the latest
/// generation and every replica is updated and ready.
fn deployment_rolled_out(deployment: &Value) -> bool {
    let Some(tally) = ReplicaTally::from_workload(deployment) else {
        return false;
    };
    let generation = deployment
        .pointer("/metadata/generation")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let observed = deployment
        .pointer("/status/observedGeneration")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let updated = deployment
        .pointer("/status/updatedReplicas")
        .and_then(count)
        .unwrap_or(0);
    observed >= generation && updated == tally.total && tally.is_complete()
}

/// Watches ArgoCD's own workloads
#[derive(Clone)]
pub struct ComponentHealthMonitor {
    cluster: Arc<dyn ClusterApi>,
    timings: Timings,
    cancel: CancellationToken,
}

impl fmt::Debug for ComponentHealthMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHealthMonitor")
            .field("timings", &self.timings)
            .finish_non_exhaustive()
    }
}

impl ComponentHealthMonitor {
    pub fn new(cluster: Arc<dyn ClusterApi>, timings: Timings, cancel: CancellationToken) -> Self {
        Self {
            cluster,
            timings,
            cancel,
        }
    }

    /// Deployments and stateful sets labelled as part of ArgoCD
    pub async fn discover_components(&self) -> Result<Vec<Component>, ClusterError> {
        let mut components = Vec::new();
        for kind in [WorkloadKind::Deployment, WorkloadKind::StatefulSet] {
            let workloads = self
                .cluster
                .list(
                    &kind.resource(),
                    Some(ARGOCD_NAMESPACE),
                    ARGOCD_PART_OF_SELECTOR,
                )
                .await?;
            components.extend(workloads.iter().filter_map(|w| {
                w.pointer("/metadata/name")
                    .and_then(Value::as_str)
                    .map(|name| Component {
                        kind,
                        name: name.to_string(),
                    })
            }));
        }
        debug!("Discovered {} ArgoCD components", components.len());
        Ok(components)
    }

    /// Single-shot readiness check
    pub async fn check_ready(&self, component: &Component) -> bool {
        let workload = match self
            .cluster
            .get(&component.kind.resource(), &component.name, Some(ARGOCD_NAMESPACE))
            .await
        {
            Ok(Some(workload)) => workload,
            Ok(None) => {
                debug!("{} not found", component);
                return false;
            }
            Err(e) => {
                debug!("Failed to read {}: {}", component, e);
                return false;
            }
        };

        let Some(tally) = ReplicaTally::from_workload(&workload) else {
            debug!("{} has no readable replica status", component);
            return false;
        };
        if !tally.is_complete() {
            debug!("{} replicas ready: {}", component, tally);
            return false;
        }

        match component.kind {
            WorkloadKind::Deployment => true,
            WorkloadKind::StatefulSet => self.stateful_pods_ready(component, &workload).await,
        }
    }

    async fn stateful_pods_ready(&self, component: &Component, workload: &Value) -> bool {
        let Some(selector) = match_labels_selector(workload) else {
            debug!("{} has no pod selector", component);
            return false;
        };
        let pods = match self
            .cluster
            .list(&cluster::pods(), Some(ARGOCD_NAMESPACE), &selector)
            .await
        {
            Ok(pods) => pods,
            Err(e) => {
                debug!("Failed to list pods of {}: {}", component, e);
                return false;
            }
        };
        if pods.is_empty() {
            debug!("{} has no pods", component);
            return false;
        }
        pods.iter().all(pod_ready)
    }

    /// Sweep every discovered component until all have been seen ready.
    ///
    /// Returns false when nothing is discovered or the budget runs out.
    /// A component seen ready stays in the ready set for the rest of the call.
    pub async fn wait_all_ready(&self, timeout: Duration) -> bool {
        let span = info_span!("argocd.components.wait_all_ready");
        async {
            let components = match self.discover_components().await {
                Ok(components) => components,
                Err(e) => {
                    warn!("Failed to discover ArgoCD components: {}", e);
                    return false;
                }
            };
            if components.is_empty() {
                warn!("No ArgoCD components found");
                return false;
            }
            info!("Waiting for {} ArgoCD components", components.len());

            let ready: Mutex<BTreeSet<Component>> = Mutex::new(BTreeSet::new());
            let result = poll_until(
                PollSettings::new("components_sweep", timeout, self.timings.sweep_interval),
                &self.cancel,
                || async {
                    for component in &components {
                        if lock(&ready).contains(component) {
                            continue;
                        }
                        if self.check_ready(component).await {
                            let mut ready = lock(&ready);
                            ready.insert(component.clone());
                            info!(
                                "{} is ready ({}/{})",
                                component,
                                ready.len(),
                                components.len()
                            );
                        }
                    }
                    Ok::<bool, Infallible>(lock(&ready).len() == components.len())
                },
            )
            .await;

            match result {
                Ok(()) => {
                    info!("All ArgoCD components are ready");
                    true
                }
                Err(e) => {
                    let ready = lock(&ready);
                    let pending: Vec<String> = components
                        .iter()
                        .filter(|c| !ready.contains(*c))
                        .map(ToString::to_string)
                        .collect();
                    warn!(
                        "ArgoCD components not ready ({}): {}",
                        e,
                        pending.join(", ")
                    );
                    false
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Wait for a deployment rollout to finish
    pub async fn wait_for_deployment_ready(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), PollError> {
        let resource = cluster::deployments();
        poll_until(
            PollSettings::new("deployment_ready", timeout, self.timings.component_poll_interval),
            &self.cancel,
            || async {
                // Absent deployment keeps waiting
                let deployment = self
                    .cluster
                    .get(&resource, name, Some(ARGOCD_NAMESPACE))
                    .await?;
                Ok::<bool, ClusterError>(deployment.as_ref().is_some_and(deployment_rolled_out))
            },
        )
        .await
    }

    /// Wait for a stateful set and every one of its pods to be ready
    pub async fn wait_for_statefulset_ready(
        &self,
        name: &str,
        timeout: Duration,
    ) -> Result<(), PollError> {
        let component = Component::stateful_set(name);
        poll_until(
            PollSettings::new(
                "statefulset_ready",
                timeout,
                self.timings.component_poll_interval,
            ),
            &self.cancel,
            || async { Ok::<bool, Infallible>(self.check_ready(&component).await) },
        )
        .await
    }

    /// Restart the components that cache repository access and wait for
    /// each to come back.
    pub async fn restart_components(&self) -> Result<(), DeployError> {
        let span = info_span!("argocd.components.restart");
        async {
            self.rollout_restart(REPO_SERVER).await?;
            self.recreate_pods(APPLICATION_CONTROLLER).await?;

            let timeout = self.timings.component_restart_timeout;
            self.wait_for_deployment_ready(REPO_SERVER, timeout)
                .await
                .map_err(|e| restart_failure(REPO_SERVER, e))?;
            info!("{} is ready after restart", REPO_SERVER);

            self.wait_for_statefulset_ready(APPLICATION_CONTROLLER, timeout)
                .await
                .map_err(|e| restart_failure(APPLICATION_CONTROLLER, e))?;
            info!("{} is ready after restart", APPLICATION_CONTROLLER);
            Ok::<(), DeployError>(())
        }
        .instrument(span)
        .await
    }

    /// Stamp the pod template so the deployment rolls its pods
    async fn rollout_restart(&self, name: &str) -> Result<(), DeployError> {
        let target = format!("Deployment/{name}");
        let mut deployment = self
            .cluster
            .get(&cluster::deployments(), name, Some(ARGOCD_NAMESPACE))
            .await?
            .ok_or_else(|| DeployError::ApplyFailed {
                target: target.clone(),
                message: "not found".to_string(),
            })?;

        let annotations = object_at(&mut deployment, &["spec", "template", "metadata", "annotations"])
            .ok_or_else(|| DeployError::ApplyFailed {
                target: target.clone(),
                message: "pod template is not an object".to_string(),
            })?;
        annotations.insert(
            RESTARTED_AT_ANNOTATION.to_string(),
            Value::String(chrono::Utc::now().to_rfc3339()),
        );

        self.cluster
            .apply(&deployment)
            .await
            .map_err(|e| DeployError::ApplyFailed {
                target,
                message: e.to_string(),
            })?;
        info!("Triggered rollout restart of {}", name);
        Ok(())
    }

    /// Delete every pod of a stateful set so the controller recreates them
    async fn recreate_pods(&self, name: &str) -> Result<(), DeployError> {
        let stateful_set = self
            .cluster
            .get(&cluster::stateful_sets(), name, Some(ARGOCD_NAMESPACE))
            .await?
            .ok_or_else(|| DeployError::ApplyFailed {
                target: format!("StatefulSet/{name}"),
                message: "not found".to_string(),
            })?;
        let selector = match_labels_selector(&stateful_set).ok_or_else(|| {
            DeployError::ApplyFailed {
                target: format!("StatefulSet/{name}"),
                message: "no pod selector".to_string(),
            }
        })?;

        let pods = self
            .cluster
            .list(&cluster::pods(), Some(ARGOCD_NAMESPACE), &selector)
            .await?;
        for pod in &pods {
            if let Some(pod_name) = pod.pointer("/metadata/name").and_then(Value::as_str) {
                self.cluster
                    .delete(&cluster::pods(), pod_name, Some(ARGOCD_NAMESPACE))
                    .await?;
                debug!("Deleted pod {}", pod_name);
            }
        }
        info!("Deleted {} pod(s) of {}", pods.len(), name);
        Ok(())
    }
}

fn restart_failure(component: &str, error: PollError) -> DeployError {
    match error {
        PollError::Cancelled => DeployError::Cancelled,
        PollError::TimedOut(_) => DeployError::RestartTimeout {
            component: component.to_string(),
        },
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Walk `path`, creating empty objects where missing
fn object_at<'a>(value: &'a mut Value, path: &[&str]) -> Option<&'a mut Map<String, Value>> {
    let mut current = value.as_object_mut()?;
    for key in path {
        let slot = current
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if slot.is_null() {
            *slot = Value::Object(Map::new());
        }
        current = slot.as_object_mut()?;
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tally_display() {
        let tally = ReplicaTally { ready: 0, total: 2 };
        assert_eq!(tally.to_string(), "0/2");
    }

    #[test]
    fn test_tally_completeness() {
        assert!(ReplicaTally { ready: 2, total: 2 }.is_complete());
        assert!(!ReplicaTally { ready: 1, total: 2 }.is_complete());
        assert!(!ReplicaTally { ready: 0, total: 0 }.is_complete());
    }

    #[test]
    fn test_tally_from_workload() {
        let workload = json!({"spec": {"replicas": 2}, "status": {"readyReplicas": 1}});
        assert_eq!(
            ReplicaTally::from_workload(&workload),
            Some(ReplicaTally { ready: 1, total: 2 })
        );

        let no_ready = json!({"spec": {"replicas": 1}, "status": {"replicas": 1}});
        assert_eq!(
            ReplicaTally::from_workload(&no_ready),
            Some(ReplicaTally { ready: 0, total: 1 })
        );

        assert_eq!(ReplicaTally::from_workload(&json!({"spec": {"replicas": 1}})), None);
        let malformed = json!({"spec": {"replicas": 1}, "status": {"readyReplicas": "1"}});
        assert_eq!(ReplicaTally::from_workload(&malformed), None);
    }

    #[test]
    fn test_pod_ready() {
        let ready = json!({"status": {"containerStatuses": [{"ready": true}, {"ready": true}]}});
        let one_not_ready =
            json!({"status": {"containerStatuses": [{"ready": true}, {"ready": false}]}});
        let terminating = json!({
            "metadata": {"deletionTimestamp": "2026-01-01T00:00:00Z"},
            "status": {"containerStatuses": [{"ready": true}]}
        });
        let no_statuses = json!({"status": {"phase": "Pending"}});
        assert!(pod_ready(&ready));
        assert!(!pod_ready(&one_not_ready));
        assert!(!pod_ready(&terminating));
        assert!(!pod_ready(&no_statuses));
    }

    #[test]
    fn test_match_labels_selector() {
        let workload = json!({"spec": {"selector": {"matchLabels": {
            "app.kubernetes.io/name": "argocd-application-controller"
        }}}});
        assert_eq!(
            match_labels_selector(&workload).as_deref(),
            Some("app.kubernetes.io/name=argocd-application-controller")
        );
        assert_eq!(match_labels_selector(&json!({"spec": {}})), None);
    }

    #[test]
    fn test_deployment_rolled_out() {
        let done = json!({
            "metadata": {"generation": 3},
            "spec": {"replicas": 1},
            "status": {"observedGeneration": 3, "updatedReplicas": 1, "readyReplicas": 1}
        });
        let stale = json!({
            "metadata": {"generation": 4},
            "spec": {"replicas": 1},
            "status": {"observedGeneration": 3, "updatedReplicas": 1, "readyReplicas": 1}
        });
        assert!(deployment_rolled_out(&done));
        assert!(!deployment_rolled_out(&stale));
    }

    #[test]
    fn test_object_at_creates_path() {
        let mut doc = json!({"spec": {"template": {}}});
        object_at(&mut doc, &["spec", "template", "metadata", "annotations"])
            .unwrap()
            .insert("k".to_string(), json!("v"));
        assert_eq!(
            doc,
            json!({"spec": {"template": {"metadata": {"annotations": {"k": "v"}}}}})
        );
    }
}
