//! `cloudburstd status`: print what the daemon has persisted.

use std::path::{Path, PathBuf};

use serde_json::json;

use cloudburst_state::{ScalingState, StateStore};

pub fn status(config_path: &Path, state_dir: Option<PathBuf>) -> anyhow::Result<()> {
    let config = super::load_or_default(config_path)?;
    let store = StateStore::open(&super::state_dir(&config, state_dir))?;
    println!("{}", serde_json::to_string_pretty(&report(&store)?)?);
    Ok(())
}

fn report(store: &StateStore) -> anyhow::Result<serde_json::Value> {
    let state: Option<ScalingState> = match store.load() {
        Ok(state) => Some(state),
        Err(e) if e.is_not_found() => None,
        Err(e) => return Err(e.into()),
    };
    Ok(json!({
        "state_file": store.state_path().display().to_string(),
        "state": state,
        "instance_file": store.instance_path().display().to_string(),
        "instance": store.load_instance_descriptor()?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudburst_state::{InstanceInfo, InstanceStatus};

    #[test]
    fn report_without_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let value = report(&store).unwrap();
        assert!(value["state"].is_null());
        assert!(value["instance"].is_null());
    }

    #[test]
    fn report_shows_scaled_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        let instance = InstanceInfo {
            id: "auto-scale-instance-1".to_string(),
            address: Some("34.1.2.3".to_string()),
            status: InstanceStatus::Running,
            project: "demo".to_string(),
            zone: "us-central1-a".to_string(),
        };
        let mut state = ScalingState::fresh(100.0);
        state.mark_scaled(instance.clone(), 200.0).unwrap();
        store.save(&state).unwrap();
        store.write_instance_descriptor(&instance).unwrap();

        let value = report(&store).unwrap();
        assert_eq!(value["state"]["scaled_to_cloud"], true);
        assert_eq!(value["state"]["instance_info"]["ip"], "34.1.2.3");
        assert_eq!(value["instance"]["id"], "auto-scale-instance-1");
        assert_eq!(
            value["instance_file"],
            store.instance_path().display().to_string()
        );
        assert!(std::path::Path::new(value["instance_file"].as_str().unwrap()).is_file());
    }

    #[test]
    fn corrupt_record_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::open(dir.path()).unwrap();
        std::fs::write(store.state_path(), "not json").unwrap();
        assert!(report(&store).is_err());
    }
}
