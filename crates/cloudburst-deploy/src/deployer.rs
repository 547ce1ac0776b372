//! Deployer: ship the workload to a provisioned instance and start it.

use std::future::Future;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use walkdir::WalkDir;

use cloudburst_core::config::DeployConfig;
use cloudburst_state::InstanceInfo;

use crate::error::{DeployError, DeployStep};
use crate::health::{HealthCheck, HttpHealthCheck};
use crate::readiness::Readiness;
use crate::shell::RemoteShell;

pub trait Deployer: Send + Sync {
    /// Copy `workload_path` to `instance`, install its dependencies, and start it detached.
    fn deploy(
        &self,
        instance: &InstanceInfo,
        workload_path: &Path,
    ) -> impl Future<Output = Result<(), DeployError>> + Send;
}

/// Remote commands run after the upload.
#[derive(Debug, Clone, PartialEq)]
pub struct DeploySettings {
    pub remote_dir: String,
    pub install_command: String,
    pub start_command: String,
    pub log_file: String,
}

impl From<&DeployConfig> for DeploySettings {
    fn from(config: &DeployConfig) -> Self {
        Self {
            remote_dir: config.remote_dir.clone(),
            install_command: config.install_command.clone(),
            start_command: config.start_command.clone(),
            log_file: config.log_file.clone(),
        }
    }
}

impl DeploySettings {
    fn mkdir_command(&self) -> String {
        format!("mkdir -p {}", self.remote_dir)
    }

    fn install_command(&self) -> String {
        format!("cd {} && {}", self.remote_dir, self.install_command)
    }

    fn start_command(&self) -> String {
        format!(
            "cd {} && nohup {} > {} 2>&1 &",
            self.remote_dir, self.start_command, self.log_file
        )
    }
}

pub struct RemoteDeployer<S> {
    shell: S,
    settings: DeploySettings,
    readiness: Readiness,
    health_check: Option<Box<dyn HealthCheck>>,
}

impl<S: RemoteShell> RemoteDeployer<S> {
    pub fn new(shell: S, settings: DeploySettings, readiness: Readiness) -> Self {
        Self {
            shell,
            settings,
            readiness,
            health_check: None,
        }
    }

    /// Build from `[deploy]`, including the optional HTTP health check.
    pub fn from_config(shell: S, config: &DeployConfig) -> Self {
        let mut deployer = Self::new(
            shell,
            DeploySettings::from(config),
            Readiness::from_config(&config.readiness),
        );
        if let Some(hc) = &config.health_check {
            deployer = deployer.with_health_check(Box::new(HttpHealthCheck::from(hc)));
        }
        deployer
    }

    pub fn with_health_check(mut self, check: Box<dyn HealthCheck>) -> Self {
        self.health_check = Some(check);
        self
    }

    pub fn shell(&self) -> &S {
        &self.shell
    }

    async fn run_step(
        &self,
        instance: &InstanceInfo,
        step: DeployStep,
        command: &str,
    ) -> Result<(), DeployError> {
        info!(instance = %instance.id, %step, "deploy step");
        self.shell
            .exec(instance, command)
            .await
            .map_err(|e| DeployError::CommandFailed {
                step,
                detail: e.to_string(),
            })
    }
}

impl<S: RemoteShell> Deployer for RemoteDeployer<S> {
    async fn deploy(&self, instance: &InstanceInfo, workload_path: &Path) -> Result<(), DeployError> {
        let address = instance
            .address
            .as_deref()
            .ok_or_else(|| DeployError::NoAddress {
                instance: instance.id.clone(),
            })?;
        let sources = workload_entries(workload_path)?;

        info!(instance = %instance.id, %address, workload = %workload_path.display(), "deploying workload");

        self.shell.authenticate().await?;
        self.readiness.wait(address).await?;

        let settings = &self.settings;
        self.run_step(instance, DeployStep::CreateDirectory, &settings.mkdir_command())
            .await?;

        info!(instance = %instance.id, step = %DeployStep::Upload, entries = sources.len(), "deploy step");
        self.shell
            .upload(instance, &sources, &settings.remote_dir)
            .await
            .map_err(|e| DeployError::CommandFailed {
                step: DeployStep::Upload,
                detail: e.to_string(),
            })?;

        self.run_step(instance, DeployStep::InstallDependencies, &settings.install_command())
            .await?;
        self.run_step(instance, DeployStep::Start, &settings.start_command())
            .await?;

        if let Some(check) = &self.health_check {
            if let Err(e) = check.check(address).await {
                warn!(instance = %instance.id, error = %e, "workload started but failed its health check");
                return Err(e);
            }
        }

        info!(instance = %instance.id, %address, remote_dir = %settings.remote_dir, "workload deployed");
        Ok(())
    }
}

/// Top-level entries of the workload directory, sorted by name.
fn workload_entries(path: &Path) -> Result<Vec<PathBuf>, DeployError> {
    let workload_error = |message: String| DeployError::Workload {
        path: path.to_path_buf(),
        message,
    };

    if !path.is_dir() {
        return Err(workload_error("not a directory".to_string()));
    }

    let entries: Vec<PathBuf> = WalkDir::new(path)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| entry.map(|e| e.into_path()))
        .collect::<Result<_, _>>()
        .map_err(|e| workload_error(e.to_string()))?;

    let files = WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .count();
    if files == 0 {
        return Err(workload_error("contains no files".to_string()));
    }

    info!(workload = %path.display(), entries = entries.len(), files, "workload collected");
    Ok(entries)
}
