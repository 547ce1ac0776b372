//! cloudburst-monitor: local resource sampling.
//!
//! # Architecture
//!
//! ```text
//! ResourceMonitor (trait)
//!   └── SystemMonitor (sysinfo)
//!         ├── cpu    ← two refreshes separated by the observation window
//!         ├── memory ← used / total
//!         └── disk   ← (total - available) / total of the configured mount
//! ```
//!
//! Every sample is fresh; nothing is retained between polls.

pub mod monitor;
pub mod system;

pub use monitor::{MonitorError, ResourceMonitor};
pub use system::SystemMonitor;
