//! `cloudburstd check`: one sample against the thresholds, no scaling.

use std::path::Path;

use cloudburst_core::{ResourceSample, ThresholdConfig};
use cloudburst_monitor::{ResourceMonitor, SystemMonitor};

pub async fn check(config_path: &Path) -> anyhow::Result<()> {
    let config = super::load_or_default(config_path)?;
    let mut monitor = SystemMonitor::new(config.monitor.cpu_window(), config.monitor.disk_mount.clone());
    let sample = monitor.sample().await?;
    print!("{}", render(&sample, &config.thresholds));
    Ok(())
}

fn render(sample: &ResourceSample, thresholds: &ThresholdConfig) -> String {
    let mut out = String::new();
    for metric in cloudburst_core::Metric::ALL {
        let value = sample.get(metric);
        let limit = thresholds.get(metric);
        let mark = if value > limit { "BREACH" } else { "ok" };
        out.push_str(&format!("{metric:<7} {value:>6.2}% / {limit:>6.2}%  {mark}\n"));
    }
    let breached = thresholds.exceeded(sample);
    if breached.is_empty() {
        out.push_str("within thresholds\n");
    } else {
        let names: Vec<&str> = breached.iter().map(|m| m.as_str()).collect();
        out.push_str(&format!("would scale out (exceeded: {})\n", names.join(", ")));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_marks_breached_metrics() {
        let out = render(&ResourceSample::new(80.0, 40.0, 30.0), &ThresholdConfig::default());
        assert!(out.contains("cpu      80.00% /  75.00%  BREACH"), "{out}");
        assert!(out.contains("memory   40.00% /  75.00%  ok"), "{out}");
        assert!(out.ends_with("would scale out (exceeded: cpu)\n"));
    }

    #[test]
    fn render_within_thresholds() {
        let out = render(&ResourceSample::new(70.0, 70.0, 70.0), &ThresholdConfig::default());
        assert!(out.ends_with("within thresholds\n"));
    }
}
