//! # Values Generator
//!
//! Derives the generated layer of each application's values from the
//! deployment configuration and secret material.

use super::SecretMaterial;
use crate::config::{DeploymentConfig, GpuType};
use serde_json::{json, Map, Value};

/// Values for `cm-stack-dependencies`
pub fn dependencies_values(config: &DeploymentConfig) -> Value {
    json!({
        "deploy": {
            // cert-manager follows TLS
            "cert_manager": config.tls.enabled,
            "longhorn_csi": config.storage.deploy_longhorn,
            "nvidia_plugin": config.gpu == GpuType::Nvidia,
        }
    })
}

/// Values for `cm-stack-base`
pub fn base_values(config: &DeploymentConfig, secrets: &SecretMaterial) -> Value {
    let tls = &config.tls;
    let backup = &config.database_backup;
    let names = &config.secret_parameters;

    let (fullchain, private_key) = match &secrets.own_certificate {
        Some(cert) => (
            Value::String(cert.fullchain.to_string()),
            Value::String(cert.private_key.to_string()),
        ),
        None => (Value::Null, Value::Null),
    };

    let mut secret_values = Map::new();
    secret_values.insert(
        names.registry_auth.clone(),
        Value::String(secrets.registry_auth.to_string()),
    );
    secret_values.insert(
        names.base_repo_key.clone(),
        Value::String(secrets.base_repo_key.to_string()),
    );
    secret_values.insert(
        names.dependencies_repo_key.clone(),
        Value::String(secrets.dependencies_repo_key.to_string()),
    );

    json!({
        "base_domain": config.base_domain,
        "tls": {
            "enabled": tls.enabled,
            "certManager": {
                "enabled": tls.enabled && !tls.use_own_cert,
                "email": tls.email,
            },
            "ownCert": {
                "useOwnCert": tls.use_own_cert,
                "fullchainCertificate": fullchain,
                "privateKey": private_key,
            },
        },
        "db": {
            "backup": {
                "enabled": backup.enabled,
                "volumeSnapshot": {
                    "className": config.storage.snapshot_class,
                },
                "retentionPolicy": format!("{}d", backup.retention_days),
                "schedule": backup.schedule,
            },
        },
        "secrets": Value::Object(secret_values),
    })
}
