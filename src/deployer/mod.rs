//! # Deployer
//!
//! Fixed run sequence. `prepare` checks inputs and renders both parameter
//! sets without touching the cluster; `Deployer::execute` then installs
//! ArgoCD, registers the repositories and drives both applications to
//! convergence.
//!
//! Components only report failures. Whether a failed step aborts the run or
//! is logged as a warning is decided here and nowhere else.

pub mod report;

pub use report::{AccessInstructions, RunReport, StepOutcome, StepRecord};

use crate::argocd::{
    ApplicationDriver, ApplicationTarget, ComponentHealthMonitor, ControllerInstaller,
    ConvergenceError, ConvergenceWaiter, RepositoryRegistrar, RepositoryRegistration,
};
use crate::cluster::ClusterApi;
use crate::config::{DeploymentConfig, RunOptions, RunSettings};
use crate::constants::{
    BASE_APP, BASE_VALUES_FILE, DEPENDENCIES_APP, DEPENDENCIES_VALUES_FILE,
};
use crate::error::DeployError;
use crate::helm::PackageManager;
use crate::jwk::{provision_jwk_resources, JwkStore};
use crate::observability::metrics;
use crate::values::{
    self, base_parameters, render_parameters, ParameterDocument, SecretMaterial,
    DEPENDENCIES_PARAMETERS,
};
use serde_json::{json, Value};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

/// Inputs checked and parameter sets computed, ready to execute
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub config: DeploymentConfig,
    /// Merged values of the dependencies application
    pub dependencies_values: Value,
    /// Merged values of the base application, before the JWK is added
    pub base_values: Value,
}

impl PreparedRun {
    pub fn dependencies_parameters(&self) -> ParameterDocument {
        render_parameters(&self.dependencies_values, DEPENDENCIES_PARAMETERS)
    }

    pub fn base_parameters(&self, merged: &Value) -> ParameterDocument {
        render_parameters(merged, &base_parameters(&self.config.secret_parameters))
    }
}

fn require_file(path: &Path) -> Result<(), DeployError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(DeployError::MissingInput {
            path: path.to_path_buf(),
        })
    }
}

/// Check inputs, load the configuration and render both parameter sets.
///
/// Never touches the cluster. The rendered values are written to the output
/// directory for inspection.
pub fn prepare(settings: &RunSettings) -> Result<PreparedRun, DeployError> {
    require_file(&settings.kubeconfig)?;
    require_file(&settings.config_path)?;

    let config = DeploymentConfig::load(&settings.config_path)?;
    info!("Loaded deployment configuration for {}", config.base_domain);

    let secrets = SecretMaterial::load(&settings.secrets_dir, &config)?;
    let defaults =
        values::base_defaults().map_err(|e| DeployError::Serialization(e.to_string()))?;
    let prepared = PreparedRun {
        dependencies_values: values::dependencies_values(&config),
        base_values: values::merge(&defaults, &values::base_values(&config, &secrets)),
        config,
    };

    save_values(
        &settings.output_dir,
        &prepared.dependencies_parameters(),
        &prepared.base_parameters(&prepared.base_values),
    )?;
    Ok(prepared)
}

fn save_values(
    output_dir: &Path,
    dependencies: &ParameterDocument,
    base: &ParameterDocument,
) -> Result<(), DeployError> {
    std::fs::create_dir_all(output_dir).map_err(|e| DeployError::io(output_dir, e))?;
    for (file, document) in [
        (DEPENDENCIES_VALUES_FILE, dependencies),
        (BASE_VALUES_FILE, base),
    ] {
        let path = output_dir.join(file);
        let yaml = document
            .to_values_yaml()
            .map_err(|e| DeployError::Serialization(e.to_string()))?;
        std::fs::write(&path, yaml).map_err(|e| DeployError::io(&path, e))?;
        info!("Wrote {}", path.display());
    }
    Ok(())
}

/// Runs the fixed deployment sequence against one cluster
pub struct Deployer {
    settings: RunSettings,
    cluster: Arc<dyn ClusterApi>,
    helm: Arc<dyn PackageManager>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for Deployer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deployer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Deployer {
    pub fn new(
        settings: RunSettings,
        cluster: Arc<dyn ClusterApi>,
        helm: Arc<dyn PackageManager>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            cluster,
            helm,
            cancel,
        }
    }

    /// Run the sequence. The first fatal step aborts the run; nothing
    /// already applied is rolled back.
    pub async fn execute(
        &self,
        prepared: &PreparedRun,
        options: RunOptions,
    ) -> Result<RunReport, DeployError> {
        let timings = self.settings.timings;
        let config = &prepared.config;
        let mut report = RunReport::default();

        let installer = ControllerInstaller::new(
            Arc::clone(&self.helm),
            Arc::clone(&self.cluster),
            self.cancel.clone(),
            timings.controller_poll_interval,
        )
        .with_values_file(self.settings.controller_values.clone());
        let monitor =
            ComponentHealthMonitor::new(Arc::clone(&self.cluster), timings, self.cancel.clone());
        let registrar = RepositoryRegistrar::new(Arc::clone(&self.cluster));
        let driver = ApplicationDriver::new(Arc::clone(&self.cluster));
        let waiter = ConvergenceWaiter::new(Arc::clone(&self.cluster), self.cancel.clone());

        self.run_step("controller_install", async {
            installer.install().await?;
            installer.wait_ready(timings.controller_ready_timeout).await
        })
        .await?;
        report.record("controller_install", StepOutcome::Succeeded);

        let all_ready = self
            .run_step("components_ready", async {
                Ok(monitor.wait_all_ready(timings.components_ready_timeout).await)
            })
            .await?;
        if all_ready {
            report.record("components_ready", StepOutcome::Succeeded);
        } else {
            warn!("Not all ArgoCD components became ready; continuing");
            report.record(
                "components_ready",
                StepOutcome::Warned("not all ArgoCD components became ready".to_string()),
            );
        }

        self.run_step("repository_registration", async {
            for registration in self.registrations(config) {
                registrar.register(&registration).await?;
            }
            Ok(())
        })
        .await?;
        report.record("repository_registration", StepOutcome::Succeeded);

        if options.skip_restart {
            info!("Skipping component restart");
            report.record("components_restart", StepOutcome::Skipped);
        } else {
            let failure = self
                .run_step("components_restart", async {
                    match monitor.restart_components().await {
                        Ok(()) => Ok(None),
                        Err(DeployError::Cancelled) => Err(DeployError::Cancelled),
                        Err(e) => Ok(Some(e)),
                    }
                })
                .await?;
            match failure {
                None => report.record("components_restart", StepOutcome::Succeeded),
                Some(e) => {
                    warn!("Component restart failed; continuing: {}", e);
                    if let Some(hint) = e.remediation() {
                        warn!("{}", hint);
                    }
                    report.record("components_restart", StepOutcome::Warned(e.to_string()));
                }
            }
        }

        let mut deployed = Vec::new();

        if options.skip_dependencies {
            info!("Skipping {}", DEPENDENCIES_APP);
            report.record("dependencies_application", StepOutcome::Skipped);
        } else {
            self.run_step("dependencies_application", async {
                let target = ApplicationTarget::dependencies(&config.repositories.dependencies_url);
                driver
                    .apply(
                        &target,
                        &prepared.dependencies_parameters(),
                        Some(&config.git_revision.dependencies),
                    )
                    .await?;
                show_credentials(&installer).await;
                self.await_application(&waiter, DEPENDENCIES_APP).await
            })
            .await?;
            report.record("dependencies_application", StepOutcome::Succeeded);
            deployed.push(DEPENDENCIES_APP.to_string());
        }

        if options.skip_base {
            info!("Skipping {}", BASE_APP);
            report.record("jwk", StepOutcome::Skipped);
            report.record("base_application", StepOutcome::Skipped);
        } else {
            let base_values = if options.skip_jwk {
                info!("Skipping JWK provisioning");
                report.record("jwk", StepOutcome::Skipped);
                prepared.base_values.clone()
            } else {
                let jwks = self
                    .run_step("jwk", async {
                        let material =
                            JwkStore::new(&self.settings.jwk_dir).load_or_generate()?;
                        provision_jwk_resources(self.cluster.as_ref(), &material).await?;
                        material.jwks_json()
                    })
                    .await?;
                report.record("jwk", StepOutcome::Succeeded);
                values::merge(
                    &prepared.base_values,
                    &json!({"istio": {"jwkConfig": jwks}}),
                )
            };

            self.run_step("base_application", async {
                let target = ApplicationTarget::base(&config.repositories.base_url);
                driver
                    .apply(
                        &target,
                        &prepared.base_parameters(&base_values),
                        Some(&config.git_revision.base),
                    )
                    .await?;
                show_credentials(&installer).await;
                self.await_application(&waiter, BASE_APP).await
            })
            .await?;
            report.record("base_application", StepOutcome::Succeeded);
            deployed.push(BASE_APP.to_string());
        }

        let access = AccessInstructions::new(deployed);
        info!("Deployment completed successfully");
        for line in access.to_string().lines() {
            info!("{}", line);
        }
        report.access = Some(access);
        Ok(report)
    }

    fn registrations(&self, config: &DeploymentConfig) -> [RepositoryRegistration; 2] {
        [
            RepositoryRegistration {
                name: DEPENDENCIES_APP.to_string(),
                url: config.repositories.dependencies_url.clone(),
                key_path: self.settings.secrets_dir.join(DEPENDENCIES_APP),
            },
            RepositoryRegistration {
                name: BASE_APP.to_string(),
                url: config.repositories.base_url.clone(),
                key_path: self.settings.secrets_dir.join(BASE_APP),
            },
        ]
    }

    /// Wait for convergence, logging the resource breakdown on timeout
    async fn await_application(
        &self,
        waiter: &ConvergenceWaiter,
        application: &str,
    ) -> Result<(), DeployError> {
        let timings = self.settings.timings;
        match waiter
            .wait_ready(application, timings.app_ready_timeout, timings.app_poll_interval)
            .await
        {
            Ok(()) => Ok(()),
            Err(ConvergenceError::Cancelled) => Err(DeployError::Cancelled),
            Err(ConvergenceError::Timeout {
                phase,
                after,
                report,
            }) => {
                report.log();
                Err(DeployError::Timeout {
                    what: format!("application {application} ({phase})"),
                    after,
                })
            }
        }
    }

    /// Time one step and count a fatal failure
    async fn run_step<T, F>(&self, step: &'static str, work: F) -> Result<T, DeployError>
    where
        F: Future<Output = Result<T, DeployError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        let start = Instant::now();
        let result = work.instrument(info_span!("deploy.step", step = step)).await;
        metrics::observe_step_duration(step, start.elapsed().as_secs_f64());

        if let Err(e) = &result {
            metrics::increment_step_outcome(step, "failed");
            metrics::increment_run_failures(e.kind());
            error!(step = step, "Step failed: {}", e);
        }
        result
    }
}

/// Log the admin login. Display only; failure never affects the run.
async fn show_credentials(installer: &ControllerInstaller) {
    match installer.get_credentials().await {
        Ok(credentials) => info!(
            "ArgoCD login: username={} password={}",
            credentials.username,
            credentials.password.as_str()
        ),
        Err(e) => warn!("ArgoCD admin credentials unavailable: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::KUBECONFIG_FILE;
    use std::path::PathBuf;

    fn settings(root: &Path) -> RunSettings {
        RunSettings::new(
            root.join("config.yaml"),
            root.join(".secrets"),
            root.join("generated"),
        )
    }

    #[test]
    fn test_missing_kubeconfig_is_reported_first() {
        let dir = tempfile::tempdir().unwrap();
        let err = prepare(&settings(dir.path())).unwrap_err();
        match err {
            DeployError::MissingInput { path } => {
                assert!(path.ends_with(PathBuf::from(".secrets").join(KUBECONFIG_FILE)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_missing_config_is_missing_input() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        std::fs::create_dir_all(&settings.secrets_dir).unwrap();
        std::fs::write(&settings.kubeconfig, "apiVersion: v1").unwrap();
        let err = prepare(&settings).unwrap_err();
        assert!(matches!(err, DeployError::MissingInput { path } if path.ends_with("config.yaml")));
    }
}
