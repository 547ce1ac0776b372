//! cloudburst-deploy: ships a workload to a freshly provisioned instance.
//!
//! # Sequence
//!
//! ```text
//! RemoteDeployer::deploy(instance, workload_path)
//!   ├── no address?          → DeployError::NoAddress (no remote call)
//!   ├── RemoteShell::authenticate
//!   ├── Readiness::wait      → TCP poll with backoff, or a fixed grace period
//!   ├── mkdir -p <remote_dir>
//!   ├── upload top-level workload entries
//!   ├── cd <remote_dir> && <install_command>
//!   ├── cd <remote_dir> && nohup <start_command> > <log_file> 2>&1 &
//!   └── HealthCheck (optional HTTP GET until 2xx)
//! ```
//!
//! Any failing step aborts the deployment. Nothing is retried or rolled back;
//! the caller decides whether to try again later.

pub mod deployer;
pub mod error;
pub mod health;
pub mod readiness;
pub mod shell;

pub use deployer::{DeploySettings, Deployer, RemoteDeployer};
pub use error::{DeployError, DeployStep};
pub use health::{HealthCheck, HttpHealthCheck, ProbeResult};
pub use readiness::{Readiness, ReadinessPolicy, ReadinessProbe, TcpProbe};
pub use shell::{GcloudShell, RemoteShell};
