//! Compute Engine REST client.
//!
//! Talks to `compute.googleapis.com/compute/v1` with a bearer token minted by
//! the gcloud CLI for the activated service account. The address fallback
//! shells out to `gcloud compute instances describe`.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use cloudburst_core::Gcloud;

use crate::compute::{ComputeApi, Instance, Operation};
use crate::error::ProvisionError;

pub const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";

/// `zoneOperations.wait` holds the request open for up to two minutes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

#[derive(Debug, Clone)]
pub struct RestCompute {
    client: Client,
    gcloud: Gcloud,
    base_url: String,
}

impl RestCompute {
    pub fn new(gcloud: Gcloud) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProvisionError::Transport {
                context: "building HTTP client".to_string(),
                message: e.to_string(),
            })?;
        Ok(Self {
            client,
            gcloud,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn zone_url(&self, project: &str, zone: &str) -> String {
        format!("{}/projects/{project}/zones/{zone}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        context: String,
        request: RequestBuilder,
    ) -> Result<T, ProvisionError> {
        let token = self.gcloud.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| ProvisionError::Transport {
                context: context.clone(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| ProvisionError::Transport {
            context: context.clone(),
            message: e.to_string(),
        })?;

        if !status.is_success() {
            return Err(ProvisionError::Api {
                context,
                status: status.as_u16(),
                message: api_error_message(&body),
            });
        }

        serde_json::from_str(&body).map_err(|e| ProvisionError::Decode {
            context,
            message: e.to_string(),
        })
    }
}

impl ComputeApi for RestCompute {
    async fn insert_instance(
        &self,
        project: &str,
        zone: &str,
        instance: &Instance,
    ) -> Result<Operation, ProvisionError> {
        let url = format!("{}/instances", self.zone_url(project, zone));
        debug!(%url, instance = %instance.name, "inserting instance");
        self.send(
            format!("insert instance {}", instance.name),
            self.client.post(url).json(instance),
        )
        .await
    }

    async fn wait_operation(
        &self,
        project: &str,
        zone: &str,
        operation: &str,
    ) -> Result<Operation, ProvisionError> {
        let url = format!("{}/operations/{operation}/wait", self.zone_url(project, zone));
        self.send(format!("wait for operation {operation}"), self.client.post(url))
            .await
    }

    async fn get_instance(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Instance, ProvisionError> {
        let url = format!("{}/instances/{name}", self.zone_url(project, zone));
        self.send(format!("get instance {name}"), self.client.get(url))
            .await
    }

    async fn lookup_external_ip(
        &self,
        project: &str,
        zone: &str,
        name: &str,
    ) -> Result<Option<String>, ProvisionError> {
        let args = vec![
            "compute".to_string(),
            "instances".to_string(),
            "describe".to_string(),
            name.to_string(),
            format!("--project={project}"),
            format!("--zone={zone}"),
            "--format=get(networkInterfaces[0].accessConfigs[0].natIP)".to_string(),
        ];
        let ip = self
            .gcloud
            .run_stdout(&args)
            .await
            .map_err(|e| ProvisionError::AddressLookup {
                instance: name.to_string(),
                message: e.to_string(),
            })?;
        Ok((!ip.is_empty()).then_some(ip))
    }
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// Extract `error.message` from a Google API error body, falling back to the raw body.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_url_uses_base_url() {
        let compute = RestCompute::new(Gcloud::from_env("CLOUDBURST_TEST_UNSET_CREDENTIALS"))
            .unwrap()
            .with_base_url("http://localhost:8080/compute/v1/");
        assert_eq!(
            compute.zone_url("demo", "us-central1-a"),
            "http://localhost:8080/compute/v1/projects/demo/zones/us-central1-a"
        );
    }

    #[test]
    fn api_error_message_prefers_structured_message() {
        let body = r#"{"error": {"code": 403, "message": "Required 'compute.instances.create' permission", "errors": []}}"#;
        assert_eq!(
            api_error_message(body),
            "Required 'compute.instances.create' permission"
        );
        assert_eq!(api_error_message("  upstream timeout \n"), "upstream timeout");
    }
}
