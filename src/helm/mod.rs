//! # Package Manager
//!
//! The Helm seam. `ControllerInstaller` talks to a `PackageManager`;
//! `HelmCli` drives the real `helm` binary.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error, info};

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("helm binary not found on PATH")]
    BinaryNotFound,

    /// `helm repo add` refused because the alias is taken
    #[error("helm repository '{0}' already exists")]
    RepoExists(String),

    #[error("`{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("failed to run helm: {0}")]
    Spawn(#[from] std::io::Error),
}

/// A release to install or upgrade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseSpec {
    pub release: String,
    pub chart: String,
    pub version: String,
    pub namespace: String,
    pub create_namespace: bool,
    pub values_file: Option<PathBuf>,
}

impl ReleaseSpec {
    /// Arguments for `helm upgrade --install`
    pub fn upgrade_args(&self) -> Vec<String> {
        let mut args = vec![
            "upgrade".to_string(),
            "--install".to_string(),
            self.release.clone(),
            self.chart.clone(),
            "--version".to_string(),
            self.version.clone(),
            "--namespace".to_string(),
            self.namespace.clone(),
        ];
        if self.create_namespace {
            args.push("--create-namespace".to_string());
        }
        if let Some(values) = &self.values_file {
            args.push("-f".to_string());
            args.push(values.display().to_string());
        }
        args
    }
}

/// Declarative package manager operations
#[async_trait]
pub trait PackageManager: Send + Sync {
    async fn add_repo(&self, name: &str, url: &str) -> Result<(), PackageError>;
    async fn update_repos(&self) -> Result<(), PackageError>;
    async fn upgrade_install(&self, release: &ReleaseSpec) -> Result<(), PackageError>;
}

/// `PackageManager` over the `helm` CLI
#[derive(Debug, Clone)]
pub struct HelmCli {
    binary: PathBuf,
    kubeconfig: PathBuf,
}

impl HelmCli {
    /// Locate `helm` on PATH
    pub fn discover(kubeconfig: &Path) -> Result<Self, PackageError> {
        let binary = which::which("helm").map_err(|e| {
            debug!("helm lookup failed: {}", e);
            PackageError::BinaryNotFound
        })?;
        debug!("Found helm at: {}", binary.display());
        Ok(Self::new(binary, kubeconfig.to_path_buf()))
    }

    pub fn new(binary: PathBuf, kubeconfig: PathBuf) -> Self {
        Self { binary, kubeconfig }
    }

    async fn run(&self, args: &[String]) -> Result<String, PackageError> {
        let command = format!("helm {}", args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.binary)
            .args(args)
            .arg("--kubeconfig")
            .arg(&self.kubeconfig)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            error!("{} failed: {}", command, stderr);
            return Err(PackageError::CommandFailed { command, stderr });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl PackageManager for HelmCli {
    async fn add_repo(&self, name: &str, url: &str) -> Result<(), PackageError> {
        let args = vec![
            "repo".to_string(),
            "add".to_string(),
            name.to_string(),
            url.to_string(),
        ];
        match self.run(&args).await {
            Ok(_) => {
                info!("Added helm repository {} ({})", name, url);
                Ok(())
            }
            Err(PackageError::CommandFailed { stderr, .. }) if stderr.contains("already exists") => {
                Err(PackageError::RepoExists(name.to_string()))
            }
            Err(e) => Err(e),
        }
    }

    async fn update_repos(&self) -> Result<(), PackageError> {
        self.run(&["repo".to_string(), "update".to_string()])
            .await
            .map(|_| ())
    }

    async fn upgrade_install(&self, release: &ReleaseSpec) -> Result<(), PackageError> {
        let stdout = self.run(&release.upgrade_args()).await?;
        debug!("helm output: {}", stdout.trim());
        Ok(())
    }
}
