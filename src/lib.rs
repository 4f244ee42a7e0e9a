//! CM Stack Deployer Library
//!
//! Bootstraps ArgoCD on a target cluster, registers the stack repositories
//! with it and drives the `cm-stack-dependencies` and `cm-stack-base`
//! applications until they report Synced and Healthy.
//!
//! Tests are included in the module files and under `tests/`.

pub mod argocd;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod constants;
pub mod deployer;
pub mod error;
pub mod helm;
pub mod jwk;
pub mod observability;
pub mod runtime;
pub mod values;

pub use error::DeployError;
