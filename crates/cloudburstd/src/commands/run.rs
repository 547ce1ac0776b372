//! `cloudburstd run`: assemble the controller and drive it until a shutdown signal.

use std::path::{Path, PathBuf};

use anyhow::Context;
use tokio::sync::watch;
use tracing::{info, warn};

use cloudburst_autoscale::{ControllerConfig, ScalingController};
use cloudburst_core::{CloudburstConfig, Gcloud, epoch_secs_f64};
use cloudburst_deploy::{GcloudShell, RemoteDeployer};
use cloudburst_monitor::SystemMonitor;
use cloudburst_provision::{GceProvisioner, RestCompute};
use cloudburst_state::StateStore;

pub async fn run(config_path: &Path, state_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = CloudburstConfig::from_file(config_path)?;
    config
        .validate()
        .with_context(|| format!("invalid config {}", config_path.display()))?;
    info!(config = %config_path.display(), project = %config.gcp.project, "cloudburstd starting");

    let gcloud = Gcloud::from_env(&config.gcp.credentials_env);
    if let Err(e) = gcloud.ensure_authenticated().await {
        warn!(error = %e, "gcloud credentials not active; scale-out attempts will fail until they are");
    }

    let dir = super::state_dir(&config, state_dir);
    let store = StateStore::open(&dir)?;
    let state = store
        .initialize(epoch_secs_f64(), config.state.reset_on_start)
        .context("initializing state record")?;
    info!(
        dir = %dir.display(),
        scaled_to_cloud = state.scaled_to_cloud,
        failed_attempts = state.failed_attempts,
        "state ready"
    );

    let monitor = SystemMonitor::new(config.monitor.cpu_window(), config.monitor.disk_mount.clone());
    let provisioner = GceProvisioner::new(RestCompute::new(gcloud.clone())?);
    let deployer = RemoteDeployer::from_config(GcloudShell::new(gcloud), &config.deploy);

    let mut controller = ScalingController::new(
        ControllerConfig::from(&config),
        monitor,
        provisioner,
        deployer,
        store,
        state.start_time,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    controller.run(shutdown_rx).await;
    info!("cloudburstd stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = match signal(SignalKind::terminate()) {
        Ok(term) => term,
        Err(e) => {
            warn!(error = %e, "failed to install SIGTERM handler, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
