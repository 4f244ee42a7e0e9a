//! # Configuration
//!
//! The deployment configuration read from `config.yaml` and the run
//! settings assembled from the command line.
//!
//! - `validation` - invariants checked once after loading
//! - `settings` - paths and timings for one run

pub mod settings;
pub mod validation;

pub use settings::{RunOptions, RunSettings, Timings};

use crate::constants;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors loading or validating the deployment configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid configuration: {}", violations.join("; "))]
    Invalid { violations: Vec<String> },
}

/// Accelerator selection for the GPU device plugin
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpuType {
    #[default]
    None,
    Nvidia,
    /// Accepted but no plugin is deployed for it yet
    Amd,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TlsConfig {
    pub enabled: bool,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub use_own_cert: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub deploy_longhorn: bool,
    pub snapshot_class: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseBackupConfig {
    pub enabled: bool,
    pub retention_days: u32,
    pub schedule: String,
}

/// Pinned revision per managed repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRevisionConfig {
    #[serde(default = "default_revision")]
    pub dependencies: String,
    #[serde(default = "default_revision")]
    pub base: String,
}

fn default_revision() -> String {
    "main".to_string()
}

impl Default for GitRevisionConfig {
    fn default() -> Self {
        Self {
            dependencies: default_revision(),
            base: default_revision(),
        }
    }
}

/// Source repository URLs for the two managed applications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoriesConfig {
    #[serde(default = "default_dependencies_url")]
    pub dependencies_url: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

fn default_dependencies_url() -> String {
    constants::DEFAULT_DEPENDENCIES_REPO_URL.to_string()
}

fn default_base_url() -> String {
    constants::DEFAULT_BASE_REPO_URL.to_string()
}

impl Default for RepositoriesConfig {
    fn default() -> Self {
        Self {
            dependencies_url: default_dependencies_url(),
            base_url: default_base_url(),
        }
    }
}

/// Parameter names the base chart reads the secret blobs from.
///
/// These must match the consuming chart. The generator and the renderer
/// both derive their paths from here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretParameterNames {
    #[serde(default = "default_registry_auth")]
    pub registry_auth: String,
    #[serde(default = "default_base_repo_key")]
    pub base_repo_key: String,
    #[serde(default = "default_dependencies_repo_key")]
    pub dependencies_repo_key: String,
}

fn default_registry_auth() -> String {
    "cmImageRegistryKey".to_string()
}

fn default_base_repo_key() -> String {
    "cmStackBaseRepoKey".to_string()
}

fn default_dependencies_repo_key() -> String {
    "cmStackRepoTektonKey".to_string()
}

impl Default for SecretParameterNames {
    fn default() -> Self {
        Self {
            registry_auth: default_registry_auth(),
            base_repo_key: default_base_repo_key(),
            dependencies_repo_key: default_dependencies_repo_key(),
        }
    }
}

/// Validated deployment settings, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentConfig {
    pub base_domain: String,
    pub tls: TlsConfig,
    pub storage: StorageConfig,
    pub database_backup: DatabaseBackupConfig,
    #[serde(default)]
    pub gpu: GpuType,
    #[serde(default)]
    pub git_revision: GitRevisionConfig,
    #[serde(default)]
    pub repositories: RepositoriesConfig,
    #[serde(default)]
    pub secret_parameters: SecretParameterNames,
}

impl DeploymentConfig {
    /// Read, parse and validate the configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validation::validate_config(self)
    }
}
