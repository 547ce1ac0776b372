//! What to create: machine shape, image, network, and startup script.

use std::time::Duration;

use cloudburst_core::config::GcpConfig;

use crate::compute::{
    AccessConfig, AttachedDisk, AttachedDiskInitializeParams, Instance, Metadata, MetadataItem,
    NetworkInterface,
};

/// Parameters of the instance to provision.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceSpec {
    pub name_prefix: String,
    pub project: String,
    pub zone: String,
    pub machine_type: String,
    pub image_family: String,
    pub image_project: String,
    pub network: String,
    pub startup_script: String,
    /// Wait after the create operation completes before reading the address.
    pub settle: Duration,
}

impl From<&GcpConfig> for InstanceSpec {
    fn from(config: &GcpConfig) -> Self {
        Self {
            name_prefix: config.instance_prefix.clone(),
            project: config.project.clone(),
            zone: config.zone.clone(),
            machine_type: config.machine_type.clone(),
            image_family: config.image_family.clone(),
            image_project: config.image_project.clone(),
            network: config.network.clone(),
            startup_script: config.startup_script.clone(),
            settle: config.settle(),
        }
    }
}

impl InstanceSpec {
    /// Instance name salted with the creation time.
    pub fn instance_name(&self, epoch_secs: u64) -> String {
        format!("{}-{epoch_secs}", self.name_prefix)
    }

    /// Build the `instances.insert` request body.
    pub fn to_resource(&self, name: &str) -> Instance {
        Instance {
            name: name.to_string(),
            machine_type: format!("zones/{}/machineTypes/{}", self.zone, self.machine_type),
            status: None,
            disks: vec![AttachedDisk {
                boot: true,
                auto_delete: true,
                initialize_params: Some(AttachedDiskInitializeParams {
                    source_image: format!(
                        "projects/{}/global/images/family/{}",
                        self.image_project, self.image_family
                    ),
                }),
            }],
            network_interfaces: vec![NetworkInterface {
                network: Some(self.network.clone()),
                access_configs: vec![AccessConfig {
                    name: Some("External NAT".to_string()),
                    kind: Some("ONE_TO_ONE_NAT".to_string()),
                    nat_ip: None,
                }],
            }],
            metadata: Some(Metadata {
                items: vec![MetadataItem {
                    key: "startup-script".to_string(),
                    value: self.startup_script.clone(),
                }],
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_from_default_config() {
        let mut config = GcpConfig::default();
        config.project = "demo".to_string();
        let spec = InstanceSpec::from(&config);

        assert_eq!(spec.project, "demo");
        assert_eq!(spec.settle, Duration::from_secs(30));
        assert_eq!(spec.instance_name(1700000000), "auto-scale-instance-1700000000");
    }

    #[test]
    fn insert_body_matches_compute_api_shape() {
        let mut config = GcpConfig::default();
        config.project = "demo".to_string();
        let spec = InstanceSpec::from(&config);

        let body = serde_json::to_value(spec.to_resource("auto-scale-instance-1")).unwrap();
        assert_eq!(body["name"], "auto-scale-instance-1");
        assert_eq!(body["machineType"], "zones/us-central1-a/machineTypes/e2-medium");
        assert_eq!(body["disks"][0]["boot"], true);
        assert_eq!(body["disks"][0]["autoDelete"], true);
        assert_eq!(
            body["disks"][0]["initializeParams"]["sourceImage"],
            "projects/debian-cloud/global/images/family/debian-11"
        );
        let nic = &body["networkInterfaces"][0];
        assert_eq!(nic["network"], "global/networks/default");
        assert_eq!(nic["accessConfigs"][0]["type"], "ONE_TO_ONE_NAT");
        assert!(nic["accessConfigs"][0].get("natIP").is_none());
        assert_eq!(body["metadata"]["items"][0]["key"], "startup-script");
        assert!(body.get("status").is_none());
    }
}
