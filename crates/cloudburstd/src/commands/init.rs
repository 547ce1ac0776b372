//! `cloudburstd init`: write a scaffold config.

use std::path::Path;

use anyhow::bail;

use cloudburst_core::CloudburstConfig;

pub fn init(path: &Path, project: &str, workload: &Path, force: bool) -> anyhow::Result<()> {
    write_scaffold(path, project, workload, force)?;
    println!("✓ Generated {}", path.display());
    if project.is_empty() {
        println!("  set [gcp].project before running `cloudburstd run`");
    }
    Ok(())
}

fn write_scaffold(path: &Path, project: &str, workload: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = CloudburstConfig::scaffold(project, workload);
    std::fs::write(path, config.to_toml_string()?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scaffold_round_trips_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudburst.toml");

        write_scaffold(&path, "demo", Path::new("./app"), false).unwrap();
        let config = CloudburstConfig::from_file(&path).unwrap();
        assert_eq!(config.gcp.project, "demo");
        assert_eq!(config.deploy.workload_path, Path::new("./app"));
        config.validate().unwrap();
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloudburst.toml");
        std::fs::write(&path, "# mine\n").unwrap();

        assert!(write_scaffold(&path, "demo", Path::new("app"), false).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# mine\n");

        write_scaffold(&path, "demo", Path::new("app"), true).unwrap();
        assert!(std::fs::read_to_string(&path).unwrap().contains("demo"));
    }
}
