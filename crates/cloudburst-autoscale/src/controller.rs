//! Scaling controller: threshold evaluation and the one-shot scale-out.
//!
//! Each tick samples the host, compares against the thresholds, and on a
//! breach consults the persisted record before provisioning and deploying.
//! Component failures never escape a tick: they are logged, counted in the
//! record, and the controller returns to monitoring.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use cloudburst_core::{Backoff, CloudburstConfig, ResourceSample, ThresholdConfig, epoch_secs_f64};
use cloudburst_deploy::{DeployError, Deployer};
use cloudburst_monitor::ResourceMonitor;
use cloudburst_provision::{CloudProvisioner, InstanceSpec, ProvisionError};
use cloudburst_state::{InstanceInfo, ScalingState, StateStore};

/// Immutable controller settings, fixed at construction.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub thresholds: ThresholdConfig,
    pub interval: Duration,
    pub instance: InstanceSpec,
    pub workload_path: PathBuf,
    /// 0 means unlimited.
    pub max_attempts: u32,
    pub cooldown: Duration,
    pub max_cooldown: Duration,
}

impl From<&CloudburstConfig> for ControllerConfig {
    fn from(config: &CloudburstConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            interval: config.monitor.interval(),
            instance: InstanceSpec::from(&config.gcp),
            workload_path: config.deploy.workload_path.clone(),
            max_attempts: config.scaling.max_attempts,
            cooldown: config.scaling.cooldown(),
            max_cooldown: config.scaling.max_cooldown(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Monitoring,
    ThresholdExceeded,
    Provisioning,
    Deploying,
    /// Terminal for decisions; sampling continues.
    Scaled,
    /// The last attempt failed. The next tick returns to `Monitoring`.
    FailedTransient,
}

/// What a single tick decided.
#[derive(Debug)]
pub enum TickOutcome {
    WithinThresholds,
    AlreadyScaled,
    CoolingDown { remaining: Duration },
    AttemptsExhausted { attempts: u32 },
    Scaled(InstanceInfo),
    ProvisionFailed(ProvisionError),
    NoAddress(InstanceInfo),
    DeployFailed { instance: InstanceInfo, error: DeployError },
}

pub struct ScalingController<M, P, D> {
    config: ControllerConfig,
    monitor: M,
    provisioner: P,
    deployer: D,
    store: StateStore,
    start_time: f64,
    phase: Phase,
    /// Set after a successful scale-out even if persisting it failed.
    scaled: Option<InstanceInfo>,
}

impl<M, P, D> ScalingController<M, P, D>
where
    M: ResourceMonitor,
    P: CloudProvisioner,
    D: Deployer,
{
    pub fn new(
        config: ControllerConfig,
        monitor: M,
        provisioner: P,
        deployer: D,
        store: StateStore,
        start_time: f64,
    ) -> Self {
        Self {
            config,
            monitor,
            provisioner,
            deployer,
            store,
            start_time,
            phase: Phase::Monitoring,
            scaled: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// One loop body: sample, evaluate, and act on a breach.
    ///
    /// Only a failed sample is returned as an error; provisioning and
    /// deployment failures are reported through [`TickOutcome`].
    pub async fn tick(&mut self) -> anyhow::Result<TickOutcome> {
        if self.phase == Phase::FailedTransient {
            self.phase = Phase::Monitoring;
        }

        let sample = self
            .monitor
            .sample()
            .await
            .context("sampling resource usage")?;
        log_usage(&sample);

        let breached = self.config.thresholds.exceeded(&sample);
        if breached.is_empty() {
            return Ok(TickOutcome::WithinThresholds);
        }
        let metrics = breached
            .iter()
            .map(|m| m.as_str())
            .collect::<Vec<_>>()
            .join(",");
        warn!(
            %metrics,
            cpu = sample.cpu,
            memory = sample.memory,
            disk = sample.disk,
            "resource threshold exceeded"
        );

        if let Some(instance) = &self.scaled {
            info!(instance = %instance.id, "already scaled to cloud, nothing to do");
            return Ok(TickOutcome::AlreadyScaled);
        }

        let mut state = self.load_state();
        if state.scaled_to_cloud {
            self.scaled = state.instance.clone();
            self.phase = Phase::Scaled;
            info!(
                instance = state.instance.as_ref().map(|i| i.id.as_str()).unwrap_or("?"),
                "already scaled to cloud, nothing to do"
            );
            return Ok(TickOutcome::AlreadyScaled);
        }

        if self.config.max_attempts > 0 && state.failed_attempts >= self.config.max_attempts {
            warn!(
                attempts = state.failed_attempts,
                max_attempts = self.config.max_attempts,
                "scale-out attempts exhausted, not retrying"
            );
            return Ok(TickOutcome::AttemptsExhausted {
                attempts: state.failed_attempts,
            });
        }

        if let Some(remaining) = self.cooldown_remaining(&state, epoch_secs_f64()) {
            info!(
                remaining_secs = remaining.as_secs(),
                failed_attempts = state.failed_attempts,
                "in cooldown after failed scale-out"
            );
            return Ok(TickOutcome::CoolingDown { remaining });
        }

        self.phase = Phase::ThresholdExceeded;
        Ok(self.scale_out(&mut state).await)
    }

    /// Run `tick` every interval until `shutdown` flips or its sender drops.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            cpu = self.config.thresholds.cpu,
            memory = self.config.thresholds.memory,
            disk = self.config.thresholds.disk,
            "scaling controller started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }
            match self.tick().await {
                Ok(outcome) => debug!(?outcome, phase = ?self.phase, "tick complete"),
                Err(e) => error!("tick failed: {e:#}"),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.interval) => {}
                _ = shutdown.changed() => break,
            }
        }
        info!("scaling controller shutting down");
    }

    fn load_state(&self) -> ScalingState {
        match self.store.load() {
            Ok(state) => state,
            Err(e) if e.is_not_found() => {
                debug!("no state record, assuming fresh");
                ScalingState::fresh(self.start_time)
            }
            Err(e) => {
                warn!(error = %e, "state record unreadable, assuming fresh");
                ScalingState::fresh(self.start_time)
            }
        }
    }

    fn cooldown_remaining(&self, state: &ScalingState, now: f64) -> Option<Duration> {
        let last = state.last_failure_time?;
        let delay = Backoff::delay_for(
            self.config.cooldown,
            self.config.max_cooldown,
            state.failed_attempts,
        );
        let elapsed = Duration::try_from_secs_f64((now - last).max(0.0)).unwrap_or(Duration::MAX);
        (elapsed < delay).then(|| delay - elapsed)
    }

    async fn scale_out(&mut self, state: &mut ScalingState) -> TickOutcome {
        self.phase = Phase::Provisioning;
        info!(attempt = state.failed_attempts + 1, "starting scale-out");

        let instance = match self.provisioner.provision(&self.config.instance).await {
            Ok(instance) => instance,
            Err(e) => {
                error!(error = %e, "provisioning failed");
                self.record_failure(state);
                return TickOutcome::ProvisionFailed(e);
            }
        };

        if let Err(e) = self.store.write_instance_descriptor(&instance) {
            warn!(instance = %instance.id, error = %e, "failed to write instance descriptor");
        }

        if instance.address.is_none() {
            error!(
                instance = %instance.id,
                "provisioned instance has no external address, skipping deploy"
            );
            self.record_failure(state);
            return TickOutcome::NoAddress(instance);
        }

        self.phase = Phase::Deploying;
        if let Err(e) = self
            .deployer
            .deploy(&instance, &self.config.workload_path)
            .await
        {
            error!(
                instance = %instance.id,
                error = %e,
                "deployment failed; instance left running and must be cleaned up manually"
            );
            self.record_failure(state);
            return TickOutcome::DeployFailed { instance, error: e };
        }

        let now = epoch_secs_f64();
        self.scaled = Some(instance.clone());
        self.phase = Phase::Scaled;
        if let Err(e) = state.mark_scaled(instance.clone(), now) {
            error!(error = %e, "scale-out succeeded but the record rejected it");
        } else if let Err(e) = self.store.save(state) {
            error!(
                instance = %instance.id,
                error = %e,
                "scale-out succeeded but persisting it failed"
            );
        }
        info!(
            instance = %instance.id,
            ip = instance.address.as_deref().unwrap_or(""),
            "scaled to cloud"
        );
        TickOutcome::Scaled(instance)
    }

    fn record_failure(&mut self, state: &mut ScalingState) {
        self.phase = Phase::FailedTransient;
        state.record_failure(epoch_secs_f64());
        if let Err(e) = self.store.save(state) {
            warn!(error = %e, "failed to persist failed attempt");
        }
        info!(failed_attempts = state.failed_attempts, "scale-out attempt failed, monitoring continues");
    }
}

fn log_usage(sample: &ResourceSample) {
    info!(
        "current usage: cpu {:.2}%, memory {:.2}%, disk {:.2}%",
        sample.cpu, sample.memory, sample.disk
    );
}
