//! Deployment errors.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use cloudburst_core::CredentialError;

/// Remote steps of a deployment, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    CreateDirectory,
    Upload,
    InstallDependencies,
    Start,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeployStep::CreateDirectory => "create remote directory",
            DeployStep::Upload => "upload workload",
            DeployStep::InstallDependencies => "install dependencies",
            DeployStep::Start => "start workload",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("instance {instance} has no external address")]
    NoAddress { instance: String },

    #[error("remote access credentials unavailable: {0}")]
    Credential(#[from] CredentialError),

    #[error("{address} not ready for remote login after {waited:?}")]
    Timeout { address: String, waited: Duration },

    #[error("{step} failed: {detail}")]
    CommandFailed { step: DeployStep, detail: String },

    #[error("workload {path}: {message}")]
    Workload { path: PathBuf, message: String },

    #[error("health check against {url} failed after {waited:?}: last probe {last}")]
    HealthCheckFailed {
        url: String,
        waited: Duration,
        last: String,
    },
}

impl DeployError {
    /// The remote step that failed, if the error came from one.
    pub fn step(&self) -> Option<DeployStep> {
        match self {
            DeployError::CommandFailed { step, .. } => Some(*step),
            _ => None,
        }
    }
}
