//! # Constants
//!
//! Fixed names, versions and default timings used across the deployer.

/// Namespace ArgoCD is installed into; also holds the Application and
/// repository credential objects.
pub const ARGOCD_NAMESPACE: &str = "argocd";

/// Helm repository alias for the ArgoCD chart
pub const ARGO_HELM_REPO_NAME: &str = "argo";

/// Helm repository URL for the ArgoCD chart
pub const ARGO_HELM_REPO_URL: &str = "https://argoproj.github.io/argo-helm";

/// Helm release name for ArgoCD
pub const ARGOCD_RELEASE: &str = "argocd";

/// Chart reference for ArgoCD
pub const ARGOCD_CHART: &str = "argo/argo-cd";

/// Pinned ArgoCD chart version
pub const ARGOCD_CHART_VERSION: &str = "7.8.2";

/// Label selecting the ArgoCD API server deployment
pub const ARGOCD_SERVER_SELECTOR: &str = "app.kubernetes.io/name=argocd-server";

/// Label shared by every ArgoCD-owned workload
pub const ARGOCD_PART_OF_SELECTOR: &str = "app.kubernetes.io/part-of=argocd";

/// Stateless component that caches repository access
pub const REPO_SERVER: &str = "argocd-repo-server";

/// Stateful component that caches repository access
pub const APPLICATION_CONTROLLER: &str = "argocd-application-controller";

/// Secret holding the generated admin password
pub const INITIAL_ADMIN_SECRET: &str = "argocd-initial-admin-secret";

/// Username paired with the generated admin password
pub const ADMIN_USERNAME: &str = "admin";

/// Label marking a Secret as an ArgoCD repository credential
pub const REPOSITORY_SECRET_TYPE_LABEL: &str = "argocd.argoproj.io/secret-type";

/// Annotation stamped on a pod template to trigger a rollout restart
pub const RESTARTED_AT_ANNOTATION: &str = "kubectl.kubernetes.io/restartedAt";

/// In-cluster API server used as the Application destination
pub const IN_CLUSTER_SERVER: &str = "https://kubernetes.default.svc";

/// Revision sentinel meaning "tip of the default branch"
pub const DEFAULT_TARGET_REVISION: &str = "HEAD";

// Managed applications
pub const DEPENDENCIES_APP: &str = "cm-stack-dependencies";
pub const BASE_APP: &str = "cm-stack-base";
pub const DEPENDENCIES_CHART_PATH: &str = "charts/cm-stack-dependencies";
pub const BASE_CHART_PATH: &str = "charts/cm-stack-base";
pub const BASE_DESTINATION_NAMESPACE: &str = "cm-stack";
pub const DEFAULT_DEPENDENCIES_REPO_URL: &str =
    "git@github.com:ConfidentialMind/cm-stack-dependencies.git";
pub const DEFAULT_BASE_REPO_URL: &str = "git@github.com:ConfidentialMind/cm-stack-base.git";

// Secrets directory layout
pub const KUBECONFIG_FILE: &str = "kube.conf";
pub const REGISTRY_AUTH_FILE: &str = "cm-images.json";
pub const TLS_DIR: &str = "tls";
pub const TLS_FULLCHAIN_FILE: &str = "fullchain.pem";
pub const TLS_PRIVKEY_FILE: &str = "privkey.pem";
pub const JWK_DIR: &str = "jwk";

// Rendered values written for inspection
pub const DEPENDENCIES_VALUES_FILE: &str = "deps-values.yaml";
pub const BASE_VALUES_FILE: &str = "base-values.yaml";

// JWK provisioning
pub const JWK_PRIVATE_KEY_FILE: &str = "private-key.pem";
pub const JWKS_FILE: &str = "jwks.json";
pub const JWK_SECRET_NAMESPACE: &str = "api-services";
pub const JWK_SECRET_NAME: &str = "private-key-secret";
pub const JWK_SECRET_KEY: &str = "private.pem";
pub const JWK_CONFIGMAP_NAMESPACE: &str = "istio-system";
pub const JWK_CONFIGMAP_NAME: &str = "jwk-config";
pub const JWK_CONFIGMAP_KEY: &str = "jwk";
pub const JWK_NOTE_ANNOTATION: &str = "cm-deployment-note";

// Timing defaults (seconds)
pub const DEFAULT_CONTROLLER_READY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMPONENTS_READY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_COMPONENT_RESTART_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_COMPONENT_POLL_INTERVAL_SECS: u64 = 2;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CONTROLLER_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_APP_READY_TIMEOUT_SECS: u64 = 1200;
pub const DEFAULT_APP_POLL_INTERVAL_SECS: u64 = 10;

/// Port-forward hint shown once the run completes
pub const ACCESS_PORT_FORWARD_HINT: &str =
    "kubectl port-forward svc/argocd-server -n argocd 8080:443";

/// URL reachable through the port-forward
pub const ACCESS_URL: &str = "https://localhost:8080";
