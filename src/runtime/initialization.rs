//! # Initialization
//!
//! Process start-up (rustls provider, tracing, metrics) and the top-level
//! run: prepare, connect, execute, report.

use crate::cli::Cli;
use crate::cluster::{ClusterApi, KubeCluster};
use crate::deployer::{self, Deployer};
use crate::error::DeployError;
use crate::helm::{HelmCli, PackageManager};
use crate::observability;
use anyhow::Result;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Install the crypto provider, the tracing subscriber and the metrics
pub fn initialize(debug: bool) -> Result<()> {
    let default_filter = if debug {
        "cm_stack_deployer=debug"
    } else {
        "cm_stack_deployer=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    // Must run before any cluster client exists
    install_crypto_provider();

    info!("Starting CM Stack Deployer v{}", env!("CARGO_PKG_VERSION"));
    observability::metrics::register_metrics()?;
    Ok(())
}

/// Install rustls' ring provider as the process default. Returns false when
/// a provider was already installed, which is tolerated.
fn install_crypto_provider() -> bool {
    match rustls::crypto::ring::default_provider().install_default() {
        Ok(()) => true,
        Err(_) => {
            debug!("rustls crypto provider already installed, keeping it");
            false
        }
    }
}

/// Cancel `token` on Ctrl-C
fn cancel_on_interrupt(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling deployment");
            token.cancel();
        }
    });
}

/// Run one deployment and map the outcome to an exit code
pub async fn run(cli: Cli) -> ExitCode {
    let settings = cli.settings();
    let options = cli.options();

    let result = async {
        let prepared = deployer::prepare(&settings)?;
        let cluster: Arc<dyn ClusterApi> = Arc::new(KubeCluster::connect(&settings.kubeconfig).await?);
        let helm: Arc<dyn PackageManager> = Arc::new(HelmCli::discover(&settings.kubeconfig)?);

        let cancel = CancellationToken::new();
        cancel_on_interrupt(cancel.clone());

        Deployer::new(settings.clone(), cluster, helm, cancel)
            .execute(&prepared, options)
            .await
    }
    .await;

    let code = match result {
        Ok(report) => {
            for (step, reason) in report.warnings() {
                warn!(step = step, "Completed with warning: {}", reason);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            report_failure(&e);
            ExitCode::FAILURE
        }
    };

    if let Some(path) = &settings.metrics_file {
        match observability::metrics::write_metrics_file(path) {
            Ok(()) => info!("Wrote run metrics to {}", path.display()),
            Err(e) => warn!("Failed to write metrics file {}: {}", path.display(), e),
        }
    }
    code
}

fn report_failure(e: &DeployError) {
    // Failures inside execute are already counted per step
    if matches!(
        e,
        DeployError::MissingInput { .. }
            | DeployError::MissingCredential { .. }
            | DeployError::InvalidConfig(_)
    ) {
        observability::metrics::increment_run_failures(e.kind());
    }
    error!("Deployment failed: {}", e);
    if let Some(hint) = e.remediation() {
        error!("{}", hint);
    }
}
