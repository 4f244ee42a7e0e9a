//! # Secret Material
//!
//! Raw secret files from the secrets directory. Contents are held in
//! `Zeroizing` buffers and never printed.

use crate::config::DeploymentConfig;
use crate::constants::{
    BASE_APP, DEPENDENCIES_APP, REGISTRY_AUTH_FILE, TLS_DIR, TLS_FULLCHAIN_FILE, TLS_PRIVKEY_FILE,
};
use crate::error::DeployError;
use std::path::Path;
use zeroize::Zeroizing;

/// Operator-supplied certificate chain and key
pub struct OwnCertificate {
    pub fullchain: Zeroizing<String>,
    pub private_key: Zeroizing<String>,
}

impl std::fmt::Debug for OwnCertificate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OwnCertificate").finish_non_exhaustive()
    }
}

/// Secret inputs of the base application
pub struct SecretMaterial {
    /// Image registry `dockerconfigjson` contents
    pub registry_auth: Zeroizing<String>,
    pub dependencies_repo_key: Zeroizing<String>,
    pub base_repo_key: Zeroizing<String>,
    /// Present only when the config asks for an own certificate
    pub own_certificate: Option<OwnCertificate>,
}

impl std::fmt::Debug for SecretMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretMaterial")
            .field("registry_auth", &"<redacted>")
            .field("dependencies_repo_key", &"<redacted>")
            .field("base_repo_key", &"<redacted>")
            .field("own_certificate", &self.own_certificate.is_some())
            .finish()
    }
}

impl SecretMaterial {
    /// Read every secret file the configuration needs
    pub fn load(secrets_dir: &Path, config: &DeploymentConfig) -> Result<Self, DeployError> {
        let registry_auth = read_input(&secrets_dir.join(REGISTRY_AUTH_FILE))?;
        let dependencies_repo_key = read_repo_key(secrets_dir, DEPENDENCIES_APP)?;
        let base_repo_key = read_repo_key(secrets_dir, BASE_APP)?;

        let own_certificate = if config.tls.use_own_cert {
            let tls_dir = secrets_dir.join(TLS_DIR);
            Some(OwnCertificate {
                fullchain: read_input(&tls_dir.join(TLS_FULLCHAIN_FILE))?,
                private_key: read_input(&tls_dir.join(TLS_PRIVKEY_FILE))?,
            })
        } else {
            None
        };

        Ok(Self {
            registry_auth,
            dependencies_repo_key,
            base_repo_key,
            own_certificate,
        })
    }
}

fn read_input(path: &Path) -> Result<Zeroizing<String>, DeployError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Zeroizing::new(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DeployError::MissingInput {
            path: path.to_path_buf(),
        }),
        Err(e) => Err(DeployError::io(path, e)),
    }
}

fn read_repo_key(secrets_dir: &Path, repository: &str) -> Result<Zeroizing<String>, DeployError> {
    let path = secrets_dir.join(repository);
    read_input(&path).map_err(|e| match e {
        DeployError::MissingInput { path } => DeployError::MissingCredential {
            repository: repository.to_string(),
            path,
        },
        other => other,
    })
}
