//! Remote execution over the gcloud CLI.

use std::future::Future;
use std::path::PathBuf;

use tracing::debug;

use cloudburst_core::gcloud::GcloudError;
use cloudburst_core::{CredentialError, Gcloud};
use cloudburst_state::InstanceInfo;

/// Command execution and file transfer on a provisioned instance.
pub trait RemoteShell: Send + Sync {
    /// Make sure credentials for remote access are active.
    fn authenticate(&self) -> impl Future<Output = Result<(), CredentialError>> + Send;

    /// Run `command` in a login shell on the instance.
    fn exec(
        &self,
        instance: &InstanceInfo,
        command: &str,
    ) -> impl Future<Output = Result<(), GcloudError>> + Send;

    /// Recursively copy `sources` into `remote_dir` on the instance.
    fn upload(
        &self,
        instance: &InstanceInfo,
        sources: &[PathBuf],
        remote_dir: &str,
    ) -> impl Future<Output = Result<(), GcloudError>> + Send;
}

/// `gcloud compute ssh` / `gcloud compute scp`.
#[derive(Debug, Clone)]
pub struct GcloudShell {
    gcloud: Gcloud,
}

impl GcloudShell {
    pub fn new(gcloud: Gcloud) -> Self {
        Self { gcloud }
    }
}

fn location_flags(instance: &InstanceInfo) -> [String; 3] {
    [
        "--quiet".to_string(),
        format!("--project={}", instance.project),
        format!("--zone={}", instance.zone),
    ]
}

fn ssh_args(instance: &InstanceInfo, command: &str) -> Vec<String> {
    let mut args = vec!["compute".to_string(), "ssh".to_string()];
    args.extend(location_flags(instance));
    args.push(instance.id.clone());
    args.push(format!("--command={command}"));
    args
}

fn scp_args(instance: &InstanceInfo, sources: &[PathBuf], remote_dir: &str) -> Vec<String> {
    let mut args = vec!["compute".to_string(), "scp".to_string()];
    args.extend(location_flags(instance));
    args.push("--recurse".to_string());
    args.extend(sources.iter().map(|p| p.display().to_string()));
    args.push(format!("{}:{}/", instance.id, remote_dir.trim_end_matches('/')));
    args
}

impl RemoteShell for GcloudShell {
    async fn authenticate(&self) -> Result<(), CredentialError> {
        self.gcloud.ensure_authenticated().await
    }

    async fn exec(&self, instance: &InstanceInfo, command: &str) -> Result<(), GcloudError> {
        debug!(instance = %instance.id, %command, "remote exec");
        self.gcloud.run(&ssh_args(instance, command)).await?;
        Ok(())
    }

    async fn upload(
        &self,
        instance: &InstanceInfo,
        sources: &[PathBuf],
        remote_dir: &str,
    ) -> Result<(), GcloudError> {
        debug!(instance = %instance.id, entries = sources.len(), %remote_dir, "remote upload");
        self.gcloud
            .run(&scp_args(instance, sources, remote_dir))
            .await?;
        Ok(())
    }
}
