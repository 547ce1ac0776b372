//! The resource-sampling capability consumed by the scaling controller.

use std::future::Future;
use std::path::PathBuf;

use thiserror::Error;

use cloudburst_core::ResourceSample;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("{0} usage is unavailable on this host")]
    Unavailable(&'static str),

    #[error("no mounted filesystem contains {0}")]
    MountNotFound(PathBuf),
}

/// Produces a fresh [`ResourceSample`] on every call.
///
/// Implementations may suspend the caller for a short observation window
/// (CPU usage is a rate, not an instantaneous value).
pub trait ResourceMonitor: Send {
    fn sample(&mut self) -> impl Future<Output = Result<ResourceSample, MonitorError>> + Send;
}
