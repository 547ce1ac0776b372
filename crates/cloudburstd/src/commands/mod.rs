pub mod check;
pub mod init;
pub mod run;
pub mod status;

use std::path::{Path, PathBuf};

use cloudburst_core::CloudburstConfig;

/// The `--state-dir` flag wins over `[state].dir`.
fn state_dir(config: &CloudburstConfig, flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| config.state.dir.clone())
}

/// Load `path`, or fall back to defaults when it does not exist.
fn load_or_default(path: &Path) -> anyhow::Result<CloudburstConfig> {
    if path.exists() {
        CloudburstConfig::from_file(path)
    } else {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        Ok(CloudburstConfig::default())
    }
}
