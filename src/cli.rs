//! # CM Deployer CLI
//!
//! Command-line surface of the `cm-deployer` binary.
//!
//! ## Usage
//!
//! ```bash
//! # Full run with the default layout (config.yaml, .secrets/, generated/)
//! cm-deployer
//!
//! # Re-run only the base application, keeping the existing JWK
//! cm-deployer --skip-restart --skip-dependencies --skip-jwk
//!
//! # Give slow clusters more time per application
//! cm-deployer --app-timeout 2400 --metrics-file /var/lib/node-exporter/cm-deployer.prom
//! ```

use crate::config::{RunOptions, RunSettings, Timings};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Bootstrap ArgoCD and deploy the CM stack
#[derive(Debug, Parser)]
#[command(name = "cm-deployer")]
#[command(about = "Bootstrap ArgoCD and deploy the CM stack", long_about = None)]
#[allow(
    clippy::struct_excessive_bools,
    reason = "Each flag is an independent CLI switch"
)]
pub struct Cli {
    /// Deployment configuration file
    #[arg(long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Directory holding kube.conf, repository keys and registry auth
    #[arg(long, default_value = ".secrets")]
    pub secrets_dir: PathBuf,

    /// Where rendered values files are written
    #[arg(long, default_value = "generated")]
    pub output_dir: PathBuf,

    /// Kubeconfig of the target cluster [default: <secrets-dir>/kube.conf]
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// JWK key store [default: <secrets-dir>/jwk]
    #[arg(long)]
    pub jwk_dir: Option<PathBuf>,

    /// Extra values file for the ArgoCD helm release
    #[arg(long)]
    pub controller_values: Option<PathBuf>,

    /// Write run metrics in Prometheus text format to this file
    #[arg(long)]
    pub metrics_file: Option<PathBuf>,

    /// Total convergence budget per application, in seconds
    #[arg(long)]
    pub app_timeout: Option<u64>,

    /// Do not restart the repo server and application controller
    #[arg(long)]
    pub skip_restart: bool,

    /// Do not deploy cm-stack-dependencies
    #[arg(long)]
    pub skip_dependencies: bool,

    /// Do not deploy cm-stack-base
    #[arg(long)]
    pub skip_base: bool,

    /// Do not generate or provision the JWK
    #[arg(long)]
    pub skip_jwk: bool,

    /// Debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Resolve run settings; timings come from the environment
    pub fn settings(&self) -> RunSettings {
        self.settings_with(Timings::from_env())
    }

    pub fn settings_with(&self, mut timings: Timings) -> RunSettings {
        if let Some(secs) = self.app_timeout {
            timings.app_ready_timeout = Duration::from_secs(secs);
        }
        let mut settings = RunSettings::new(
            self.config.clone(),
            self.secrets_dir.clone(),
            self.output_dir.clone(),
        );
        if let Some(kubeconfig) = &self.kubeconfig {
            settings.kubeconfig = kubeconfig.clone();
        }
        if let Some(jwk_dir) = &self.jwk_dir {
            settings.jwk_dir = jwk_dir.clone();
        }
        settings.controller_values = self.controller_values.clone();
        settings.metrics_file = self.metrics_file.clone();
        settings.timings = timings;
        settings
    }

    pub fn options(&self) -> RunOptions {
        RunOptions {
            skip_restart: self.skip_restart,
            skip_dependencies: self.skip_dependencies,
            skip_base: self.skip_base,
            skip_jwk: self.skip_jwk,
        }
    }
}
