//! # Validation
//!
//! Checks a parsed `DeploymentConfig` before anything touches the cluster.
//! Every violation is collected so the operator can fix them in one pass.

use super::{ConfigError, DeploymentConfig};
use regex::Regex;

const MIN_RETENTION_DAYS: u32 = 1;
const MAX_RETENTION_DAYS: u32 = 30;

/// Validate all configuration invariants
pub fn validate_config(config: &DeploymentConfig) -> Result<(), ConfigError> {
    let mut violations = Vec::new();

    let domain = config.base_domain.trim();
    if domain.is_empty() {
        violations.push("base_domain must not be empty".to_string());
    } else if !is_valid_domain(domain)? {
        violations.push(format!("base_domain '{domain}' is not a valid DNS name"));
    }

    if config.tls.enabled && config.tls.email.trim().is_empty() {
        violations.push("tls.email is required when TLS is enabled".to_string());
    }

    let days = config.database_backup.retention_days;
    if !(MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS).contains(&days) {
        violations.push(format!(
            "database_backup.retention_days must be between {MIN_RETENTION_DAYS} and {MAX_RETENTION_DAYS}, got {days}"
        ));
    }

    if config.database_backup.enabled && config.database_backup.schedule.trim().is_empty() {
        violations.push("database_backup.schedule is required when backups are enabled".to_string());
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid { violations })
    }
}

/// RFC 1123 host name: dot-separated labels of 1-63 alphanumerics or hyphens,
/// not starting or ending with a hyphen. A single trailing dot (fully
/// qualified form) is accepted.
fn is_valid_domain(domain: &str) -> Result<bool, ConfigError> {
    let domain = domain.strip_suffix('.').unwrap_or(domain);
    if domain.len() > 253 {
        return Ok(false);
    }
    let label = r"[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?";
    let domain_regex =
        Regex::new(&format!(r"^(?i){label}(\.{label})*$")).map_err(|e| ConfigError::Invalid {
            violations: vec![format!("failed to compile domain pattern: {e}")],
        })?;
    Ok(domain_regex.is_match(domain))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        DatabaseBackupConfig, GpuType, StorageConfig, TlsConfig,
    };

    fn valid() -> DeploymentConfig {
        DeploymentConfig {
            base_domain: "test.example.com".to_string(),
            tls: TlsConfig {
                enabled: true,
                email: "admin@example.com".to_string(),
                use_own_cert: false,
            },
            storage: StorageConfig {
                deploy_longhorn: true,
                snapshot_class: "longhorn".to_string(),
            },
            database_backup: DatabaseBackupConfig {
                enabled: true,
                retention_days: 7,
                schedule: "0 0 */4 * * *".to_string(),
            },
            gpu: GpuType::Nvidia,
            git_revision: Default::default(),
            repositories: Default::default(),
            secret_parameters: Default::default(),
        }
    }

    fn violations(config: &DeploymentConfig) -> Vec<String> {
        match validate_config(config) {
            Err(ConfigError::Invalid { violations }) => violations,
            other => panic!("expected violations, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(validate_config(&valid()).is_ok());
    }

    #[test]
    fn test_empty_domain() {
        let mut config = valid();
        config.base_domain = "  ".to_string();
        assert_eq!(violations(&config), vec!["base_domain must not be empty"]);
    }

    #[test]
    fn test_malformed_domain() {
        let mut config = valid();
        config.base_domain = "-bad-.example.com".to_string();
        assert_eq!(violations(&config).len(), 1);
    }

    #[test]
    fn test_fully_qualified_domain() {
        let mut config = valid();
        config.base_domain = "example.com.".to_string();
        assert!(validate_config(&config).is_ok());

        config.base_domain = "example.com..".to_string();
        assert_eq!(violations(&config).len(), 1);

        config.base_domain = ".".to_string();
        assert_eq!(violations(&config).len(), 1);
    }

    #[test]
    fn test_tls_requires_email() {
        let mut config = valid();
        config.tls.email = String::new();
        assert_eq!(
            violations(&config),
            vec!["tls.email is required when TLS is enabled"]
        );

        config.tls.enabled = false;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_retention_bounds() {
        for days in [1, 30] {
            let mut config = valid();
            config.database_backup.retention_days = days;
            assert!(validate_config(&config).is_ok(), "{days} should be accepted");
        }
        for days in [0, 31] {
            let mut config = valid();
            config.database_backup.retention_days = days;
            assert_eq!(violations(&config).len(), 1, "{days} should be rejected");
        }
    }

    #[test]
    fn test_collects_every_violation() {
        let mut config = valid();
        config.base_domain = String::new();
        config.tls.email = String::new();
        config.database_backup.retention_days = 0;
        assert_eq!(violations(&config).len(), 3);
    }
}
