//! # Configuration Compositor
//!
//! Layers chart defaults, generated settings and runtime overrides into the
//! parameter set of each managed application, then renders the enumerated
//! parameter paths into a structured document serialized once as YAML.
//!
//! - `generator` - values derived from `DeploymentConfig`
//! - `secrets` - secret material read from the secrets directory

pub mod generator;
pub mod secrets;

pub use generator::{base_values, dependencies_values};
pub use secrets::SecretMaterial;

use crate::config::SecretParameterNames;
use serde_json::{Map, Value};

/// Chart defaults for the base application, lowest layer of the merge
const BASE_DEFAULTS_YAML: &str = include_str!("defaults.yaml");

/// Parameter paths rendered for the dependencies application
pub const DEPENDENCIES_PARAMETERS: &[&str] = &[
    "deploy.cert_manager",
    "deploy.longhorn_csi",
    "deploy.nvidia_plugin",
];

/// Path the public JWK document is merged under
pub const JWK_PARAMETER: &str = "istio.jwkConfig";

/// Recursive structural merge. Mappings present on both sides merge key by
/// key; any other pairing takes the override as-is.
pub fn merge(defaults: &Value, overrides: &Value) -> Value {
    match (defaults, overrides) {
        (Value::Object(base), Value::Object(over)) => {
            let mut merged = base.clone();
            for (key, value) in over {
                let entry = match merged.get(key) {
                    Some(existing) => merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), entry);
            }
            Value::Object(merged)
        }
        (_, over) => over.clone(),
    }
}

/// Look up a dotted path such as `tls.certManager.email`
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, part| current.as_object()?.get(part))
}

/// Chart defaults for the base application
pub fn base_defaults() -> Result<Value, serde_yaml::Error> {
    serde_yaml::from_str(BASE_DEFAULTS_YAML)
}

/// Every parameter path rendered for the base application
pub fn base_parameters(names: &SecretParameterNames) -> Vec<String> {
    let mut paths: Vec<String> = [
        "base_domain",
        "tls.enabled",
        "tls.certManager.enabled",
        "tls.certManager.email",
        "tls.ownCert.useOwnCert",
        "tls.ownCert.fullchainCertificate",
        "tls.ownCert.privateKey",
        "db.backup.enabled",
        "db.backup.volumeSnapshot.className",
        "db.backup.retentionPolicy",
        "db.backup.schedule",
    ]
    .iter()
    .map(|p| (*p).to_string())
    .collect();
    for name in [
        &names.registry_auth,
        &names.base_repo_key,
        &names.dependencies_repo_key,
    ] {
        paths.push(format!("secrets.{name}"));
    }
    paths.push(JWK_PARAMETER.to_string());
    paths
}

/// Rendered parameters for one application
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterDocument {
    root: Map<String, Value>,
}

impl ParameterDocument {
    pub fn as_value(&self) -> Value {
        Value::Object(self.root.clone())
    }

    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let first = parts.next()?;
        parts.try_fold(self.root.get(first)?, |current, part| {
            current.as_object()?.get(part)
        })
    }

    /// Serialize as a Helm values document
    pub fn to_values_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.root)
    }

    fn insert(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = path.split('.').collect();
        let Some((leaf, parents)) = parts.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for part in parents {
            let slot = current
                .entry((*part).to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(next) = slot else {
                return;
            };
            current = next;
        }
        current.insert((*leaf).to_string(), value);
    }
}

/// Copy each enumerated path from the merged values into a fresh document.
///
/// Absent and null paths are left out. Multi-line strings are trimmed and
/// end with exactly one newline, since keys and certificates are rejected
/// without it. Booleans stay booleans.
pub fn render_parameters<S: AsRef<str>>(merged: &Value, paths: &[S]) -> ParameterDocument {
    let mut document = ParameterDocument::default();
    for path in paths {
        let path = path.as_ref();
        let Some(value) = lookup(merged, path) else {
            continue;
        };
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) if s.contains('\n') => Value::String(format!("{}\n", s.trim())),
            other => other.clone(),
        };
        document.insert(path, rendered);
    }
    document
}
