//! cloudburst-state: the one-way "have we scaled" record.
//!
//! Persists [`ScalingState`] as `auto_scale_state.json` and the provisioned
//! [`InstanceInfo`] as `cloud_instance.json` inside a state directory.
//!
//! # Crash consistency
//!
//! Every write goes to a sibling `*.tmp` file which is fsynced and then
//! renamed over the target. Readers observe either the previous record or the
//! new one, never a truncated file.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by an `Arc`) and
//! offers an in-memory backend for tests.

pub mod error;
pub mod store;
pub mod types;

pub use error::{StateError, StateResult};
pub use store::StateStore;
pub use types::*;
