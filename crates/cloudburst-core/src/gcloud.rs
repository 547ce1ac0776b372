//! Async runner over the `gcloud` CLI.
//!
//! Both the provisioner (access tokens, the address fallback lookup) and the
//! deployer (ssh/scp) shell out to `gcloud`. This module owns locating the
//! binary, service-account activation, and turning non-zero exits into errors.

use std::path::PathBuf;
use std::process::Output;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Problems obtaining or activating provisioning credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("environment variable {var} is not set; it must point at a service-account key file")]
    MissingKeyPath { var: String },

    #[error("service-account key file not found: {0}")]
    KeyFileNotFound(PathBuf),

    #[error("failed to activate service account: {0}")]
    Activation(String),

    #[error("failed to obtain access token: {0}")]
    Token(String),
}

/// Failure of a single `gcloud` invocation.
#[derive(Debug, Error)]
pub enum GcloudError {
    #[error("failed to spawn {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`gcloud {command}` exited with {code:?}: {stderr}")]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Handle on the `gcloud` binary and the service-account key it authenticates with.
#[derive(Debug, Clone)]
pub struct Gcloud {
    binary: PathBuf,
    key_file: Option<PathBuf>,
    credentials_env: String,
}

impl Gcloud {
    /// Locate `gcloud` and read the key-file path from `credentials_env`.
    ///
    /// Search order for the binary:
    /// 1. `$CLOUDBURST_GCLOUD_PATH`
    /// 2. `gcloud` on `$PATH`
    pub fn from_env(credentials_env: &str) -> Self {
        let binary = std::env::var_os("CLOUDBURST_GCLOUD_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("gcloud"));
        let key_file = std::env::var_os(credentials_env).map(PathBuf::from);
        debug!(binary = %binary.display(), key_file = ?key_file, "gcloud located");
        Self {
            binary,
            key_file,
            credentials_env: credentials_env.to_string(),
        }
    }

    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn with_key_file(mut self, key_file: impl Into<PathBuf>) -> Self {
        self.key_file = Some(key_file.into());
        self
    }

    /// Run `gcloud <args>` and capture its output. Non-zero exit is an error.
    pub async fn run(&self, args: &[String]) -> Result<Output, GcloudError> {
        debug!(command = %args.join(" "), "running gcloud");
        let output = Command::new(&self.binary)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| GcloudError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(GcloudError::Failed {
                command: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Run `gcloud <args>` and return trimmed stdout.
    pub async fn run_stdout(&self, args: &[String]) -> Result<String, GcloudError> {
        let output = self.run(args).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Whether `gcloud` reports an active account.
    pub async fn is_authenticated(&self) -> bool {
        let args = to_args(&["auth", "list", "--filter=status:ACTIVE", "--format=value(account)"]);
        match self.run_stdout(&args).await {
            Ok(accounts) => !accounts.is_empty(),
            Err(e) => {
                debug!(error = %e, "gcloud auth list failed");
                false
            }
        }
    }

    /// Activate the service account from the configured key file.
    pub async fn activate_service_account(&self) -> Result<(), CredentialError> {
        let key_file = self
            .key_file
            .as_ref()
            .ok_or_else(|| CredentialError::MissingKeyPath {
                var: self.credentials_env.clone(),
            })?;
        if !key_file.is_file() {
            return Err(CredentialError::KeyFileNotFound(key_file.clone()));
        }

        info!(key_file = %key_file.display(), "activating gcloud service account");
        let args = vec![
            "auth".to_string(),
            "activate-service-account".to_string(),
            format!("--key-file={}", key_file.display()),
        ];
        self.run(&args)
            .await
            .map_err(|e| CredentialError::Activation(e.to_string()))?;
        Ok(())
    }

    /// Activate the service account unless an account is already active.
    pub async fn ensure_authenticated(&self) -> Result<(), CredentialError> {
        if self.is_authenticated().await {
            debug!("gcloud already authenticated");
            return Ok(());
        }
        self.activate_service_account().await
    }

    /// OAuth bearer token for the Compute Engine REST API.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        self.ensure_authenticated().await?;
        let token = self
            .run_stdout(&to_args(&["auth", "print-access-token"]))
            .await
            .map_err(|e| CredentialError::Token(e.to_string()))?;
        if token.is_empty() {
            return Err(CredentialError::Token("gcloud printed an empty token".to_string()));
        }
        Ok(token)
    }
}

/// Convert borrowed CLI arguments into owned strings.
pub fn to_args(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gcloud_without_key() -> Gcloud {
        Gcloud {
            binary: PathBuf::from("gcloud"),
            key_file: None,
            credentials_env: "CLOUDBURST_TEST_CREDENTIALS".to_string(),
        }
    }

    #[tokio::test]
    async fn activation_without_key_path_names_the_variable() {
        let err = gcloud_without_key()
            .activate_service_account()
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::MissingKeyPath { ref var } if var == "CLOUDBURST_TEST_CREDENTIALS"));
    }

    #[tokio::test]
    async fn activation_with_missing_key_file_fails_before_running_gcloud() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("key.json");
        let err = gcloud_without_key()
            .with_key_file(&missing)
            .activate_service_account()
            .await
            .unwrap_err();
        assert!(matches!(err, CredentialError::KeyFileNotFound(p) if p == missing));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let gcloud = gcloud_without_key().with_binary("/nonexistent/cloudburst-gcloud");
        let err = gcloud.run(&to_args(&["version"])).await.unwrap_err();
        assert!(matches!(err, GcloudError::Spawn { .. }));
        assert!(!gcloud.is_authenticated().await);
    }
}
