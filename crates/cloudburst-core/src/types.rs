//! Shared types used across cloudburst crates.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One monitored resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Cpu,
    Memory,
    Disk,
}

impl Metric {
    pub const ALL: [Metric; 3] = [Metric::Cpu, Metric::Memory, Metric::Disk];

    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Disk => "disk",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Point-in-time utilization of the local host, each value a percentage in `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

impl ResourceSample {
    /// Build a sample, clamping every value into `[0, 100]`.
    ///
    /// NaN readings (e.g. a zero-sized disk) are reported as 0.
    pub fn new(cpu: f64, memory: f64, disk: f64) -> Self {
        Self {
            cpu: clamp_percent(cpu),
            memory: clamp_percent(memory),
            disk: clamp_percent(disk),
        }
    }

    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Memory => self.memory,
            Metric::Disk => self.disk,
        }
    }
}

fn clamp_percent(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Per-metric utilization thresholds, in percent.
///
/// A sample breaches when any single metric is strictly above its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub cpu: f64,
    pub memory: f64,
    pub disk: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            cpu: 75.0,
            memory: 75.0,
            disk: 75.0,
        }
    }
}

impl ThresholdConfig {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Cpu => self.cpu,
            Metric::Memory => self.memory,
            Metric::Disk => self.disk,
        }
    }

    /// Metrics of `sample` that exceed their threshold, in `Metric::ALL` order.
    pub fn exceeded(&self, sample: &ResourceSample) -> Vec<Metric> {
        Metric::ALL
            .into_iter()
            .filter(|m| sample.get(*m) > self.get(*m))
            .collect()
    }
}
