//! Persisted domain types.
//!
//! Field names on the wire are stable: older readers expect `start_time`,
//! `scaled_to_cloud`, `instance_info` (with `ip`), and `scale_time`. The retry
//! bookkeeping keys are omitted while unset.

use serde::{Deserialize, Serialize};

use crate::error::{StateError, StateResult};

// ── Instance ──────────────────────────────────────────────────────

/// Lifecycle status of a cloud instance, as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspended,
    Terminated,
    #[serde(other)]
    Unknown,
}

impl InstanceStatus {
    /// Map a Compute Engine status string (`RUNNING`, `STAGING`, ...).
    pub fn from_provider(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "SUSPENDING" | "SUSPENDED" => Self::Suspended,
            "TERMINATED" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

/// A provisioned compute instance. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceInfo {
    /// Instance name, unique within the project.
    pub id: String,
    /// External address; `None` when the provider never assigned one.
    #[serde(rename = "ip")]
    pub address: Option<String>,
    pub status: InstanceStatus,
    pub project: String,
    pub zone: String,
}

// ── Scaling state ─────────────────────────────────────────────────

/// The one-way scaling record.
///
/// `scaled_to_cloud` goes `false → true` at most once. `instance` and
/// `scale_time` are present exactly when it is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingState {
    /// Unix timestamp (fractional seconds) when monitoring started.
    pub start_time: f64,
    pub scaled_to_cloud: bool,
    #[serde(rename = "instance_info", default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<InstanceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale_time: Option<f64>,
    /// Scale-out attempts that failed since the record was created.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub failed_attempts: u32,
    /// Unix timestamp of the most recent failed attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failure_time: Option<f64>,
}

fn is_zero(n: &u32) -> bool {
    *n == 0
}

impl ScalingState {
    /// A record that has not scaled.
    pub fn fresh(start_time: f64) -> Self {
        Self {
            start_time,
            scaled_to_cloud: false,
            instance: None,
            scale_time: None,
            failed_attempts: 0,
            last_failure_time: None,
        }
    }

    /// Record the one successful scale-out.
    ///
    /// Fails if the record already scaled; the transition is irreversible and
    /// happens once. `scale_time` is clamped to be no earlier than `start_time`.
    pub fn mark_scaled(&mut self, instance: InstanceInfo, scale_time: f64) -> StateResult<()> {
        if self.scaled_to_cloud {
            return Err(StateError::Invalid(format!(
                "already scaled to instance {}",
                self.instance.as_ref().map(|i| i.id.as_str()).unwrap_or("?")
            )));
        }
        self.scaled_to_cloud = true;
        self.instance = Some(instance);
        self.scale_time = Some(scale_time.max(self.start_time));
        Ok(())
    }

    /// Count a failed scale-out attempt at `at`.
    pub fn record_failure(&mut self, at: f64) {
        self.failed_attempts = self.failed_attempts.saturating_add(1);
        self.last_failure_time = Some(at);
    }

    /// Check the record's invariants.
    pub fn validate(&self) -> StateResult<()> {
        if self.scaled_to_cloud != self.instance.is_some() {
            return Err(StateError::Invalid(
                "instance_info must be present exactly when scaled_to_cloud is true".to_string(),
            ));
        }
        match (self.scaled_to_cloud, self.scale_time) {
            (true, None) => Err(StateError::Invalid(
                "scale_time missing on a scaled record".to_string(),
            )),
            (false, Some(_)) => Err(StateError::Invalid(
                "scale_time set on a record that has not scaled".to_string(),
            )),
            (true, Some(t)) if t < self.start_time => Err(StateError::Invalid(format!(
                "scale_time {t} precedes start_time {}",
                self.start_time
            ))),
            _ => Ok(()),
        }
    }
}
