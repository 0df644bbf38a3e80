use reqwest::Client;
use serde::Serialize;

use crate::server::discovery::{RegistrationDescriptor, ServiceRegistry, send};
use crate::server::error::Result;

/// Eureka REST API.
#[derive(Debug, Clone)]
pub struct EurekaRegistry {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct Envelope {
    instance: Instance,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Instance {
    instance_id: String,
    host_name: String,
    app: String,
    ip_addr: String,
    vip_address: String,
    status: &'static str,
    port: Port,
    secure_port: Port,
    health_check_url: String,
    data_center_info: DataCenterInfo,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
struct Port {
    #[serde(rename = "$")]
    port: u16,
    #[serde(rename = "@enabled")]
    enabled: String,
}

#[derive(Debug, Serialize)]
struct DataCenterInfo {
    #[serde(rename = "@class")]
    class: &'static str,
    name: &'static str,
}

#[derive(Debug, Serialize)]
struct Metadata {
    version: String,
    tags: String,
}

impl EurekaRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn app(descriptor: &RegistrationDescriptor) -> String {
        descriptor.name.to_ascii_uppercase()
    }

    fn envelope(descriptor: &RegistrationDescriptor) -> Envelope {
        let tls = descriptor.tls_enabled;
        Envelope {
            instance: Instance {
                instance_id: descriptor.service_id(),
                host_name: descriptor.address.clone(),
                app: Self::app(descriptor),
                ip_addr: descriptor.address.clone(),
                vip_address: descriptor.name.clone(),
                status: "UP",
                port: Port {
                    port: descriptor.port,
                    enabled: (!tls).to_string(),
                },
                secure_port: Port {
                    port: descriptor.port,
                    enabled: tls.to_string(),
                },
                health_check_url: descriptor.health_url(),
                data_center_info: DataCenterInfo {
                    class: "com.netflix.appinfo.InstanceInfo$DefaultDataCenterInfo",
                    name: "MyOwn",
                },
                metadata: Metadata {
                    version: descriptor.version.clone(),
                    tags: descriptor.tags.join(","),
                },
            },
        }
    }
}

impl ServiceRegistry for EurekaRegistry {
    fn backend(&self) -> &'static str {
        "eureka"
    }

    async fn register(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        let url = format!("{}/eureka/apps/{}", self.base_url, Self::app(descriptor));
        let body = Self::envelope(descriptor);
        send(self.backend(), "register", self.client.post(url).json(&body)).await?;
        tracing::info!(instance_id = %body.instance.instance_id, "registered with eureka");
        Ok(())
    }

    async fn deregister(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        let instance_id = descriptor.service_id();
        let url = format!(
            "{}/eureka/apps/{}/{instance_id}",
            self.base_url,
            Self::app(descriptor)
        );
        send(self.backend(), "deregister", self.client.delete(url)).await?;
        tracing::info!(%instance_id, "deregistered from eureka");
        Ok(())
    }
}
