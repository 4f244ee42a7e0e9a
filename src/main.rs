//! # CM Deployer
//!
//! Bootstraps ArgoCD on a target cluster and deploys the CM stack through it.
//!
//! ## Overview
//!
//! 1. **Prepare** - checks the kubeconfig, loads and validates `config.yaml`,
//!    reads the secret material and renders both applications' values
//! 2. **Install ArgoCD** - pinned Helm chart, then waits for `argocd-server`
//! 3. **Register repositories** - SSH deploy keys as ArgoCD repository secrets
//! 4. **Deploy applications** - `cm-stack-dependencies` then `cm-stack-base`,
//!    each awaited until Synced and Healthy
//!
//! Exit code 0 on success, 1 on any fatal failure.

use clap::Parser;
use cm_stack_deployer::cli::Cli;
use cm_stack_deployer::runtime::{initialize, run};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = initialize(cli.debug) {
        eprintln!("Failed to initialize: {e:#}");
        return ExitCode::FAILURE;
    }
    run(cli).await
}
