//! cloudburst.toml configuration parser.
//!
//! Every section and field has a default, so an empty file is a valid
//! configuration apart from `gcp.project`. Durations are written as strings
//! (`"500ms"`, `"10s"`, `"5m"`, `"1h"`; a bare number means seconds).

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};

use crate::types::{Metric, ThresholdConfig};

/// Upper bound accepted by `validate()` for any configured duration.
pub const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CloudburstConfig {
    pub thresholds: ThresholdConfig,
    pub monitor: MonitorConfig,
    pub gcp: GcpConfig,
    pub deploy: DeployConfig,
    pub scaling: ScalingConfig,
    pub state: StateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Time between two polls.
    pub interval: String,
    /// Observation window used to compute CPU usage.
    pub cpu_window: String,
    /// Mount point whose usage is reported as `disk`.
    pub disk_mount: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: "10s".to_string(),
            cpu_window: "1s".to_string(),
            disk_mount: PathBuf::from("/"),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_secs(10))
    }

    pub fn cpu_window(&self) -> Duration {
        parse_duration(&self.cpu_window).unwrap_or(Duration::from_secs(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GcpConfig {
    pub project: String,
    pub zone: String,
    pub machine_type: String,
    pub image_family: String,
    pub image_project: String,
    pub network: String,
    /// Instance names are `{instance_prefix}-{unix_secs}`.
    pub instance_prefix: String,
    /// Runs on first boot to prepare the workload runtime.
    pub startup_script: String,
    /// Wait after the create operation completes, before reading the address.
    pub settle: String,
    /// Environment variable holding the service-account key path.
    pub credentials_env: String,
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            zone: "us-central1-a".to_string(),
            machine_type: "e2-medium".to_string(),
            image_family: "debian-11".to_string(),
            image_project: "debian-cloud".to_string(),
            network: "global/networks/default".to_string(),
            instance_prefix: "auto-scale-instance".to_string(),
            startup_script: "apt-get update && apt-get install -y python3 python3-pip \
                             && echo 'Startup complete' > /tmp/startup-complete"
                .to_string(),
            settle: "30s".to_string(),
            credentials_env: "GOOGLE_APPLICATION_CREDENTIALS".to_string(),
        }
    }
}

impl GcpConfig {
    pub fn settle(&self) -> Duration {
        parse_duration(&self.settle).unwrap_or(Duration::from_secs(30))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Local directory whose contents are copied to the instance.
    pub workload_path: PathBuf,
    /// Destination directory on the instance.
    pub remote_dir: String,
    pub install_command: String,
    pub start_command: String,
    /// Remote file (relative to `remote_dir`) receiving the workload's output.
    pub log_file: String,
    pub readiness: ReadinessConfig,
    pub health_check: Option<HealthCheckConfig>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            workload_path: PathBuf::from("sample-app"),
            remote_dir: "~/app".to_string(),
            install_command: "pip3 install -r requirements.txt".to_string(),
            start_command: "python3 main.py".to_string(),
            log_file: "app.log".to_string(),
            readiness: ReadinessConfig::default(),
            health_check: None,
        }
    }
}

/// How the deployer decides the instance accepts remote logins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessProbeKind {
    /// Poll a TCP connect to `port` with backoff until `timeout`.
    Tcp,
    /// Sleep for `grace` and assume the host is ready.
    Grace,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadinessConfig {
    pub probe: ReadinessProbeKind,
    pub port: u16,
    pub timeout: String,
    pub initial_backoff: String,
    pub max_backoff: String,
    /// Timeout of a single connect attempt.
    pub connect_timeout: String,
    pub grace: String,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe: ReadinessProbeKind::Tcp,
            port: 22,
            timeout: "3m".to_string(),
            initial_backoff: "2s".to_string(),
            max_backoff: "20s".to_string(),
            connect_timeout: "5s".to_string(),
            grace: "60s".to_string(),
        }
    }
}

impl ReadinessConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(180))
    }

    pub fn initial_backoff(&self) -> Duration {
        parse_duration(&self.initial_backoff).unwrap_or(Duration::from_secs(2))
    }

    pub fn max_backoff(&self) -> Duration {
        parse_duration(&self.max_backoff).unwrap_or(Duration::from_secs(20))
    }

    pub fn connect_timeout(&self) -> Duration {
        parse_duration(&self.connect_timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn grace(&self) -> Duration {
        parse_duration(&self.grace).unwrap_or(Duration::from_secs(60))
    }
}

/// Post-start HTTP health check against the deployed workload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    pub port: u16,
    pub path: String,
    /// Give up after this long without a 2xx response.
    pub timeout: String,
    /// Timeout of a single probe.
    pub probe_timeout: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            path: "/".to_string(),
            timeout: "2m".to_string(),
            probe_timeout: "2s".to_string(),
        }
    }
}

impl HealthCheckConfig {
    pub fn timeout(&self) -> Duration {
        parse_duration(&self.timeout).unwrap_or(Duration::from_secs(120))
    }

    pub fn probe_timeout(&self) -> Duration {
        parse_duration(&self.probe_timeout).unwrap_or(Duration::from_secs(2))
    }
}

/// Retry policy for failed scale-out attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Attempts allowed before the controller stops trying. 0 means unlimited.
    pub max_attempts: u32,
    /// Cooldown after the first failure; doubles on each further failure.
    pub cooldown: String,
    pub max_cooldown: String,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            cooldown: "60s".to_string(),
            max_cooldown: "30m".to_string(),
        }
    }
}

impl ScalingConfig {
    pub fn cooldown(&self) -> Duration {
        parse_duration(&self.cooldown).unwrap_or(Duration::from_secs(60))
    }

    pub fn max_cooldown(&self) -> Duration {
        parse_duration(&self.max_cooldown).unwrap_or(Duration::from_secs(1800))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Directory holding the state record and the instance descriptor.
    pub dir: PathBuf,
    /// Overwrite any existing record with a fresh one at startup.
    pub reset_on_start: bool,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            reset_on_start: false,
        }
    }
}

impl CloudburstConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: CloudburstConfig = toml::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a config for the given project and workload directory.
    pub fn scaffold(project: &str, workload_path: &Path) -> Self {
        let mut config = CloudburstConfig::default();
        config.gcp.project = project.to_string();
        config.deploy.workload_path = workload_path.to_path_buf();
        config
    }

    /// Reject values the controller cannot run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        for metric in Metric::ALL {
            let value = self.thresholds.get(metric);
            if !(value > 0.0 && value <= 100.0) {
                bail!("thresholds.{metric} must be in (0, 100], got {value}");
            }
        }

        if self.gcp.project.trim().is_empty() {
            bail!("gcp.project must be set");
        }

        let durations = [
            ("monitor.interval", &self.monitor.interval),
            ("monitor.cpu_window", &self.monitor.cpu_window),
            ("gcp.settle", &self.gcp.settle),
            ("deploy.readiness.timeout", &self.deploy.readiness.timeout),
            ("deploy.readiness.initial_backoff", &self.deploy.readiness.initial_backoff),
            ("deploy.readiness.max_backoff", &self.deploy.readiness.max_backoff),
            ("deploy.readiness.connect_timeout", &self.deploy.readiness.connect_timeout),
            ("deploy.readiness.grace", &self.deploy.readiness.grace),
            ("scaling.cooldown", &self.scaling.cooldown),
            ("scaling.max_cooldown", &self.scaling.max_cooldown),
        ];
        for (key, value) in durations {
            check_duration(key, value)?;
        }
        if let Some(health) = &self.deploy.health_check {
            check_duration("deploy.health_check.timeout", &health.timeout)?;
            check_duration("deploy.health_check.probe_timeout", &health.probe_timeout)?;
        }

        if self.monitor.interval().is_zero() {
            bail!("monitor.interval must be greater than zero");
        }
        if self.deploy.readiness.initial_backoff().is_zero() {
            bail!("deploy.readiness.initial_backoff must be greater than zero");
        }
        Ok(())
    }
}

fn check_duration(key: &str, value: &str) -> anyhow::Result<()> {
    match parse_duration(value) {
        None => bail!("{key}: invalid duration {value:?}"),
        Some(d) if d > MAX_DURATION => {
            bail!("{key}: {value:?} exceeds the {}h maximum", MAX_DURATION.as_secs() / 3600)
        }
        Some(_) => Ok(()),
    }
}

/// Parse a duration string like "500ms", "30s", "5m", "1h". A bare number is seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.trim().parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.trim().parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        let m = mins.trim().parse::<u64>().ok()?;
        m.checked_mul(60).map(Duration::from_secs)
    } else if let Some(hours) = s.strip_suffix('h') {
        let h = hours.trim().parse::<u64>().ok()?;
        h.checked_mul(3600).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gets_defaults() {
        let config: CloudburstConfig = toml::from_str("").unwrap();
        assert_eq!(config.thresholds, ThresholdConfig::default());
        assert_eq!(config.monitor.interval(), Duration::from_secs(10));
        assert_eq!(config.monitor.cpu_window(), Duration::from_secs(1));
        assert_eq!(config.gcp.machine_type, "e2-medium");
        assert_eq!(config.deploy.readiness.probe, ReadinessProbeKind::Tcp);
        assert!(config.deploy.health_check.is_none());
        assert!(!config.state.reset_on_start);
    }

    #[test]
    fn parse_partial_sections() {
        let toml_str = r#"
[thresholds]
cpu = 90.0

[gcp]
project = "demo-project"
zone = "europe-west1-b"

[deploy.readiness]
probe = "grace"
grace = "45s"

[deploy.health_check]
port = 8080
path = "/healthz"
"#;
        let config: CloudburstConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.thresholds.cpu, 90.0);
        assert_eq!(config.thresholds.memory, 75.0);
        assert_eq!(config.gcp.zone, "europe-west1-b");
        assert_eq!(config.gcp.image_family, "debian-11");
        assert_eq!(config.deploy.readiness.probe, ReadinessProbeKind::Grace);
        assert_eq!(config.deploy.readiness.grace(), Duration::from_secs(45));
        let health = config.deploy.health_check.unwrap();
        assert_eq!(health.port, 8080);
        assert_eq!(health.timeout(), Duration::from_secs(120));
        config_validates("demo-project");
    }

    fn config_validates(project: &str) {
        let config = CloudburstConfig::scaffold(project, Path::new("app"));
        config.validate().unwrap();
    }

    #[test]
    fn scaffold_round_trips_through_toml() {
        let config = CloudburstConfig::scaffold("my-project", Path::new("./sample-app"));
        let toml_str = config.to_toml_string().unwrap();
        assert!(toml_str.contains("my-project"));

        let parsed: CloudburstConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.gcp.project, "my-project");
        assert_eq!(parsed.deploy.workload_path, PathBuf::from("./sample-app"));
        parsed.validate().unwrap();
    }

    #[test]
    fn validate_rejects_missing_project() {
        let err = CloudburstConfig::default().validate().unwrap_err();
        assert!(err.to_string().contains("gcp.project"));
    }

    #[test]
    fn validate_rejects_out_of_range_threshold() {
        let mut config = CloudburstConfig::scaffold("p", Path::new("app"));
        config.thresholds.disk = 120.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("thresholds.disk"));
    }

    #[test]
    fn validate_rejects_bad_duration() {
        let mut config = CloudburstConfig::scaffold("p", Path::new("app"));
        config.scaling.cooldown = "soon".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("scaling.cooldown"));

        config.scaling.cooldown = "60s".to_string();
        config.monitor.interval = "0s".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_durations_above_cap() {
        let mut config = CloudburstConfig::scaffold("p", Path::new("app"));
        config.deploy.readiness.timeout = "18446744073709551615s".to_string();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("deploy.readiness.timeout"));

        config.deploy.readiness.timeout = "169h".to_string();
        assert!(config.validate().is_err());

        config.deploy.readiness.timeout = "168h".to_string();
        config.validate().unwrap();
    }

    #[test]
    fn parse_duration_rejects_overflow() {
        assert_eq!(parse_duration("307445734561825861m"), None);
        assert_eq!(parse_duration("5124095576030931h"), None);
        assert_eq!(
            parse_duration("18446744073709551615s"),
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_duration("2h"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("invalid"), None);
    }
}
