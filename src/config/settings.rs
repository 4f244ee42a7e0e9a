//! # Run Settings
//!
//! Paths, switches and wait budgets for one deployment run. Built once at
//! start-up and handed to components by value; nothing downstream reads
//! the process environment.

use crate::constants::*;
use std::path::PathBuf;
use std::time::Duration;

/// Wait budgets and poll cadences
///
/// All settings have defaults and can be overridden via environment
/// variables through [`Timings::from_env`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long to wait for argocd-server to report Available
    pub controller_ready_timeout: Duration,
    pub controller_poll_interval: Duration,
    /// Budget for the sweep over every ArgoCD component
    pub components_ready_timeout: Duration,
    pub sweep_interval: Duration,
    /// Budget for each component after a forced restart
    pub component_restart_timeout: Duration,
    pub component_poll_interval: Duration,
    /// Total budget per application, split between sync and health
    pub app_ready_timeout: Duration,
    pub app_poll_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            controller_ready_timeout: Duration::from_secs(DEFAULT_CONTROLLER_READY_TIMEOUT_SECS),
            controller_poll_interval: Duration::from_secs(DEFAULT_CONTROLLER_POLL_INTERVAL_SECS),
            components_ready_timeout: Duration::from_secs(DEFAULT_COMPONENTS_READY_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            component_restart_timeout: Duration::from_secs(DEFAULT_COMPONENT_RESTART_TIMEOUT_SECS),
            component_poll_interval: Duration::from_secs(DEFAULT_COMPONENT_POLL_INTERVAL_SECS),
            app_ready_timeout: Duration::from_secs(DEFAULT_APP_READY_TIMEOUT_SECS),
            app_poll_interval: Duration::from_secs(DEFAULT_APP_POLL_INTERVAL_SECS),
        }
    }
}

impl Timings {
    /// Load timings from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            controller_ready_timeout: secs_var(
                "CM_CONTROLLER_READY_TIMEOUT_SECS",
                DEFAULT_CONTROLLER_READY_TIMEOUT_SECS,
            ),
            controller_poll_interval: secs_var(
                "CM_CONTROLLER_POLL_INTERVAL_SECS",
                DEFAULT_CONTROLLER_POLL_INTERVAL_SECS,
            ),
            components_ready_timeout: secs_var(
                "CM_COMPONENTS_READY_TIMEOUT_SECS",
                DEFAULT_COMPONENTS_READY_TIMEOUT_SECS,
            ),
            sweep_interval: secs_var("CM_SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS),
            component_restart_timeout: secs_var(
                "CM_COMPONENT_RESTART_TIMEOUT_SECS",
                DEFAULT_COMPONENT_RESTART_TIMEOUT_SECS,
            ),
            component_poll_interval: secs_var(
                "CM_COMPONENT_POLL_INTERVAL_SECS",
                DEFAULT_COMPONENT_POLL_INTERVAL_SECS,
            ),
            app_ready_timeout: secs_var("CM_APP_READY_TIMEOUT_SECS", DEFAULT_APP_READY_TIMEOUT_SECS),
            app_poll_interval: secs_var("CM_APP_POLL_INTERVAL_SECS", DEFAULT_APP_POLL_INTERVAL_SECS),
        }
    }

    /// Every budget and interval set to zero-wait values, for tests
    pub fn immediate(budget: Duration) -> Self {
        Self {
            controller_ready_timeout: budget,
            controller_poll_interval: Duration::ZERO,
            components_ready_timeout: budget,
            sweep_interval: Duration::ZERO,
            component_restart_timeout: budget,
            component_poll_interval: Duration::ZERO,
            app_ready_timeout: budget,
            app_poll_interval: Duration::ZERO,
        }
    }
}

fn secs_var(key: &str, default: u64) -> Duration {
    Duration::from_secs(env_var_or_default(key, default))
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Inputs and outputs of one run
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub config_path: PathBuf,
    pub secrets_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Cluster credential file
    pub kubeconfig: PathBuf,
    /// Where the JWK key pair is kept between runs
    pub jwk_dir: PathBuf,
    /// Extra values file passed to the ArgoCD helm release
    pub controller_values: Option<PathBuf>,
    /// Prometheus textfile written after the run
    pub metrics_file: Option<PathBuf>,
    pub timings: Timings,
}

impl RunSettings {
    /// Settings rooted at `secrets_dir` with default file locations
    pub fn new(config_path: PathBuf, secrets_dir: PathBuf, output_dir: PathBuf) -> Self {
        Self {
            kubeconfig: secrets_dir.join(KUBECONFIG_FILE),
            jwk_dir: secrets_dir.join(JWK_DIR),
            config_path,
            secrets_dir,
            output_dir,
            controller_values: None,
            metrics_file: None,
            timings: Timings::default(),
        }
    }
}

/// Steps the operator asked to skip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Each flag maps one-to-one onto a CLI switch"
)]
pub struct RunOptions {
    pub skip_restart: bool,
    pub skip_dependencies: bool,
    pub skip_base: bool,
    pub skip_jwk: bool,
}
