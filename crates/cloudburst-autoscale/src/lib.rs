//! cloudburst-autoscale: the one-shot scaling controller.
//!
//! Samples local resources on a fixed interval and, on the first breach,
//! provisions one cloud instance, deploys the workload to it, and records the
//! scale-out so it never happens twice.
//!
//! # Decision per tick
//!
//! ```text
//! sample = monitor.sample()
//! breached = cpu > t.cpu || memory > t.memory || disk > t.disk
//!
//! if !breached:                        WithinThresholds
//! if scaled (memory latch or record):  AlreadyScaled
//! if failed_attempts >= max_attempts:  AttemptsExhausted
//! if now - last_failure < cooldown(n): CoolingDown
//! provision → address? → deploy → mark scaled, persist
//! ```
//!
//! `cooldown(n) = min(cooldown * 2^(n-1), max_cooldown)` after `n` failures.
//! Failures are persisted with the record, so a restart honours them.

pub mod controller;

pub use controller::{ControllerConfig, Phase, ScalingController, TickOutcome};
