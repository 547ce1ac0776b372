//! Provisioner: creates one instance and resolves its external address.

use std::future::Future;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use cloudburst_state::{InstanceInfo, InstanceStatus};

use crate::compute::{ComputeApi, Operation};
use crate::error::ProvisionError;
use crate::spec::InstanceSpec;

/// Creates remote compute for the scaling controller.
pub trait CloudProvisioner: Send + Sync {
    /// Create an instance. `Ok` with `address: None` means the instance
    /// exists but is unreachable; the caller decides what that means.
    fn provision(
        &self,
        spec: &InstanceSpec,
    ) -> impl Future<Output = Result<InstanceInfo, ProvisionError>> + Send;
}

/// Compute Engine provisioner.
pub struct GceProvisioner<C> {
    api: C,
}

impl<C: ComputeApi> GceProvisioner<C> {
    pub fn new(api: C) -> Self {
        Self { api }
    }

    pub fn api(&self) -> &C {
        &self.api
    }

    async fn wait_until_done(
        &self,
        spec: &InstanceSpec,
        name: &str,
        mut operation: Operation,
    ) -> Result<(), ProvisionError> {
        while !operation.is_done() {
            operation = self
                .api
                .wait_operation(&spec.project, &spec.zone, &operation.name)
                .await?;
        }
        match operation.error_summary() {
            Some(reason) => Err(ProvisionError::CreateFailed {
                instance: name.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }

    async fn fallback_address(&self, spec: &InstanceSpec, name: &str) -> Option<String> {
        warn!(instance = %name, "external IP not in instance resource, trying gcloud lookup");
        match self
            .api
            .lookup_external_ip(&spec.project, &spec.zone, name)
            .await
        {
            Ok(Some(ip)) => Some(ip),
            Ok(None) => {
                warn!(instance = %name, "gcloud lookup returned no external IP either");
                None
            }
            Err(e) => {
                warn!(instance = %name, error = %e, "gcloud address lookup failed");
                None
            }
        }
    }
}

impl<C: ComputeApi> CloudProvisioner for GceProvisioner<C> {
    async fn provision(&self, spec: &InstanceSpec) -> Result<InstanceInfo, ProvisionError> {
        let name = spec.instance_name(epoch_secs());
        info!(
            instance = %name,
            project = %spec.project,
            zone = %spec.zone,
            machine_type = %spec.machine_type,
            "creating instance"
        );

        let operation = self
            .api
            .insert_instance(&spec.project, &spec.zone, &spec.to_resource(&name))
            .await?;
        self.wait_until_done(spec, &name, operation).await?;

        info!(
            instance = %name,
            settle_secs = spec.settle.as_secs(),
            "instance created, waiting for network assignment"
        );
        tokio::time::sleep(spec.settle).await;

        let instance = self
            .api
            .get_instance(&spec.project, &spec.zone, &name)
            .await?;
        let status = instance
            .status
            .as_deref()
            .map(InstanceStatus::from_provider)
            .unwrap_or(InstanceStatus::Unknown);

        let address = match instance.external_ip() {
            Some(ip) => Some(ip.to_string()),
            None => self.fallback_address(spec, &name).await,
        };

        info!(instance = %name, ip = ?address, ?status, "instance provisioned");
        Ok(InstanceInfo {
            id: name,
            address,
            status,
            project: spec.project.clone(),
            zone: spec.zone.clone(),
        })
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    use crate::compute::{
        AccessConfig, Instance, NetworkInterface, Operation, OperationError, OperationErrorEntry,
    };

    /// Scripted Compute Engine double.
    #[derive(Default)]
    struct FakeCompute {
        calls: Mutex<Vec<String>>,
        inserted: Mutex<Vec<Instance>>,
        insert_status: String,
        waits: Mutex<VecDeque<Operation>>,
        nat_ip: Option<String>,
        lookup: Option<Result<Option<String>, String>>,
    }

    impl FakeCompute {
        fn new() -> Self {
            Self {
                insert_status: "RUNNING".to_string(),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }

    fn op(status: &str) -> Operation {
        Operation {
            name: "operation-1".to_string(),
            status: status.to_string(),
            error: None,
        }
    }

    impl ComputeApi for FakeCompute {
        async fn insert_instance(
            &self,
            _project: &str,
            _zone: &str,
            instance: &Instance,
        ) -> Result<Operation, ProvisionError> {
            self.record("insert");
            self.inserted.lock().unwrap().push(instance.clone());
            Ok(op(&self.insert_status))
        }

        async fn wait_operation(
            &self,
            _project: &str,
            _zone: &str,
            _operation: &str,
        ) -> Result<Operation, ProvisionError> {
            self.record("wait");
            Ok(self
                .waits
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| op("DONE")))
        }

        async fn get_instance(
            &self,
            _project: &str,
            _zone: &str,
            name: &str,
        ) -> Result<Instance, ProvisionError> {
            self.record("get");
            Ok(Instance {
                name: name.to_string(),
                status: Some("RUNNING".to_string()),
                network_interfaces: vec![NetworkInterface {
                    network: None,
                    access_configs: vec![AccessConfig {
                        name: Some("External NAT".to_string()),
                        kind: Some("ONE_TO_ONE_NAT".to_string()),
                        nat_ip: self.nat_ip.clone(),
                    }],
                }],
                ..Default::default()
            })
        }

        async fn lookup_external_ip(
            &self,
            _project: &str,
            _zone: &str,
            name: &str,
        ) -> Result<Option<String>, ProvisionError> {
            self.record("lookup");
            match self.lookup.clone().unwrap_or(Ok(None)) {
                Ok(ip) => Ok(ip),
                Err(message) => Err(ProvisionError::AddressLookup {
                    instance: name.to_string(),
                    message,
                }),
            }
        }
    }

    fn test_spec() -> InstanceSpec {
        InstanceSpec {
            name_prefix: "auto-scale-instance".to_string(),
            project: "demo".to_string(),
            zone: "us-central1-a".to_string(),
            machine_type: "e2-medium".to_string(),
            image_family: "debian-11".to_string(),
            image_project: "debian-cloud".to_string(),
            network: "global/networks/default".to_string(),
            startup_script: "true".to_string(),
            settle: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn address_from_instance_resource() {
        let mut api = FakeCompute::new();
        api.nat_ip = Some("34.1.2.3".to_string());
        let provisioner = GceProvisioner::new(api);

        let info = provisioner.provision(&test_spec()).await.unwrap();

        assert_eq!(info.address.as_deref(), Some("34.1.2.3"));
        assert_eq!(info.status, InstanceStatus::Running);
        assert_eq!(info.project, "demo");
        assert!(info.id.starts_with("auto-scale-instance-"));
        assert_eq!(provisioner.api().calls(), vec!["insert", "wait", "get"]);

        let inserted = provisioner.api().inserted.lock().unwrap();
        assert_eq!(inserted[0].name, info.id);
    }

    #[tokio::test]
    async fn waits_until_operation_is_done() {
        let api = FakeCompute::new();
        api.waits
            .lock()
            .unwrap()
            .extend([op("RUNNING"), op("RUNNING"), op("DONE")]);
        let provisioner = GceProvisioner::new(api);

        provisioner.provision(&test_spec()).await.unwrap();
        let waits = provisioner
            .api()
            .calls()
            .iter()
            .filter(|c| *c == "wait")
            .count();
        assert_eq!(waits, 3);
    }

    #[tokio::test]
    async fn already_done_insert_skips_wait() {
        let mut api = FakeCompute::new();
        api.insert_status = "DONE".to_string();
        api.nat_ip = Some("34.1.2.3".to_string());
        let provisioner = GceProvisioner::new(api);

        provisioner.provision(&test_spec()).await.unwrap();
        assert_eq!(provisioner.api().calls(), vec!["insert", "get"]);
    }

    #[tokio::test]
    async fn operation_error_is_create_failed_and_stops() {
        let api = FakeCompute::new();
        api.waits.lock().unwrap().push_back(Operation {
            name: "operation-1".to_string(),
            status: "DONE".to_string(),
            error: Some(OperationError {
                errors: vec![OperationErrorEntry {
                    code: "ZONE_RESOURCE_POOL_EXHAUSTED".to_string(),
                    message: "zone out of e2-medium".to_string(),
                }],
            }),
        });
        let provisioner = GceProvisioner::new(api);

        let err = provisioner.provision(&test_spec()).await.unwrap_err();
        assert!(matches!(
            err,
            ProvisionError::CreateFailed { ref reason, .. } if reason.contains("ZONE_RESOURCE_POOL_EXHAUSTED")
        ));
        assert_eq!(provisioner.api().calls(), vec!["insert", "wait"]);
    }

    #[tokio::test]
    async fn falls_back_once_to_cli_lookup() {
        let mut api = FakeCompute::new();
        api.lookup = Some(Ok(Some("35.9.9.9".to_string())));
        let provisioner = GceProvisioner::new(api);

        let info = provisioner.provision(&test_spec()).await.unwrap();
        assert_eq!(info.address.as_deref(), Some("35.9.9.9"));
        assert_eq!(provisioner.api().calls(), vec!["insert", "wait", "get", "lookup"]);
    }

    #[tokio::test]
    async fn no_address_anywhere_is_not_an_error() {
        let mut api = FakeCompute::new();
        api.lookup = Some(Err("gcloud: command not found".to_string()));
        let provisioner = GceProvisioner::new(api);

        let info = provisioner.provision(&test_spec()).await.unwrap();
        assert!(info.address.is_none());
        let lookups = provisioner
            .api()
            .calls()
            .iter()
            .filter(|c| *c == "lookup")
            .count();
        assert_eq!(lookups, 1);
    }
}
