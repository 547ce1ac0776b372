//! Host resource sampling backed by `sysinfo`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::{Disks, System};
use tracing::debug;

use cloudburst_core::ResourceSample;

use crate::monitor::{MonitorError, ResourceMonitor};

/// Samples the local host.
pub struct SystemMonitor {
    sys: System,
    cpu_window: Duration,
    disk_mount: PathBuf,
}

impl SystemMonitor {
    /// `cpu_window` is raised to sysinfo's minimum refresh interval if shorter.
    pub fn new(cpu_window: Duration, disk_mount: impl Into<PathBuf>) -> Self {
        Self {
            sys: System::new(),
            cpu_window: cpu_window.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL),
            disk_mount: disk_mount.into(),
        }
    }

    pub fn cpu_window(&self) -> Duration {
        self.cpu_window
    }

    async fn cpu_percent(&mut self) -> f64 {
        self.sys.refresh_cpu_usage();
        tokio::time::sleep(self.cpu_window).await;
        self.sys.refresh_cpu_usage();
        self.sys.global_cpu_usage() as f64
    }

    fn memory_percent(&mut self) -> Result<f64, MonitorError> {
        self.sys.refresh_memory();
        let total = self.sys.total_memory();
        if total == 0 {
            return Err(MonitorError::Unavailable("memory"));
        }
        Ok(self.sys.used_memory() as f64 / total as f64 * 100.0)
    }

    fn disk_percent(&self) -> Result<f64, MonitorError> {
        let disks = Disks::new_with_refreshed_list();
        let mounts = disks
            .iter()
            .map(|d| (d.mount_point(), d.total_space(), d.available_space()));
        let (total, available) = pick_mount(mounts, &self.disk_mount)
            .ok_or_else(|| MonitorError::MountNotFound(self.disk_mount.clone()))?;
        if total == 0 {
            return Err(MonitorError::Unavailable("disk"));
        }
        Ok(total.saturating_sub(available) as f64 / total as f64 * 100.0)
    }
}

impl ResourceMonitor for SystemMonitor {
    async fn sample(&mut self) -> Result<ResourceSample, MonitorError> {
        let cpu = self.cpu_percent().await;
        let memory = self.memory_percent()?;
        let disk = self.disk_percent()?;
        let sample = ResourceSample::new(cpu, memory, disk);
        debug!(
            cpu = sample.cpu,
            memory = sample.memory,
            disk = sample.disk,
            "resource sample taken"
        );
        Ok(sample)
    }
}

/// Select the filesystem holding `target`: the mount point that is the
/// longest prefix of it. Returns `(total_bytes, available_bytes)`.
fn pick_mount<'a>(
    mounts: impl Iterator<Item = (&'a Path, u64, u64)>,
    target: &Path,
) -> Option<(u64, u64)> {
    mounts
        .filter(|(mount, _, _)| target.starts_with(mount))
        .max_by_key(|(mount, _, _)| mount.components().count())
        .map(|(_, total, available)| (total, available))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pick_mount_prefers_most_specific_mount() {
        let mounts = vec![
            (Path::new("/"), 100, 50),
            (Path::new("/home"), 200, 20),
            (Path::new("/boot"), 10, 9),
        ];
        assert_eq!(
            pick_mount(mounts.clone().into_iter(), Path::new("/home/user")),
            Some((200, 20))
        );
        assert_eq!(pick_mount(mounts.clone().into_iter(), Path::new("/")), Some((100, 50)));
        assert_eq!(pick_mount(mounts.into_iter(), Path::new("/var/lib")), Some((100, 50)));
    }

    #[test]
    fn pick_mount_without_match() {
        let mounts = vec![(Path::new("/data"), 100, 50)];
        assert_eq!(pick_mount(mounts.into_iter(), Path::new("/")), None);
    }

    #[test]
    fn short_window_is_raised_to_minimum() {
        let monitor = SystemMonitor::new(Duration::ZERO, "/");
        assert_eq!(monitor.cpu_window(), sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
    }

    #[tokio::test]
    async fn cpu_and_memory_are_within_percent_range() {
        let mut monitor = SystemMonitor::new(Duration::ZERO, "/");
        let cpu = monitor.cpu_percent().await;
        let memory = monitor.memory_percent().unwrap();
        let sample = ResourceSample::new(cpu, memory, 0.0);
        assert!((0.0..=100.0).contains(&sample.cpu));
        assert!(memory > 0.0 && memory <= 100.0, "{memory} out of range");
    }
}
