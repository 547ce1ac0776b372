//! cloudburst-provision: remote compute creation.
//!
//! # Algorithm
//!
//! ```text
//! insert instance {prefix}-{unix_secs}   (e2-medium, debian image, external NAT, startup script)
//! wait on zone operation until DONE      (operation error → CreateFailed, stop)
//! sleep settle period                    (network assignment is eventually consistent)
//! get instance → first natIP
//!   └── none? one CLI lookup fallback
//! return InstanceInfo (address may be None)
//! ```
//!
//! A created instance is never deleted here, even if deployment later fails.
//!
//! The Compute Engine surface is behind [`ComputeApi`] so the algorithm in
//! [`GceProvisioner`] runs against test doubles.

pub mod compute;
pub mod error;
pub mod provisioner;
pub mod rest;
pub mod spec;

pub use compute::ComputeApi;
pub use error::ProvisionError;
pub use provisioner::{CloudProvisioner, GceProvisioner};
pub use rest::RestCompute;
pub use spec::InstanceSpec;
