//! # ArgoCD
//!
//! Everything that talks to the GitOps controller.
//!
//! - `installer` - Helm install, availability wait, admin credentials
//! - `health` - component discovery, readiness checks and restarts
//! - `repository` - repository credential registration
//! - `application` - the `Application` resource and its driver
//! - `convergence` - sync and health polling with diagnostics

pub mod application;
pub mod convergence;
pub mod health;
pub mod installer;
pub mod repository;

pub use application::{Application, ApplicationDriver, ApplicationStatus, ApplicationTarget};
pub use convergence::{ConvergenceError, ConvergenceWaiter, DiagnosticReport};
pub use health::{Component, ComponentHealthMonitor, ReplicaTally, WorkloadKind};
pub use installer::{AdminCredentials, ControllerInstaller, CredentialError};
pub use repository::{RepositoryRegistrar, RepositoryRegistration};
