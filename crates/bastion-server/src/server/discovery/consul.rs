use reqwest::Client;
use serde::Serialize;

use crate::server::discovery::{RegistrationDescriptor, ServiceRegistry, send};
use crate::server::error::Result;
use crate::server::protocol::ProtocolKind;

/// Consul agent HTTP API.
#[derive(Debug, Clone)]
pub struct ConsulRegistry {
    client: Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ServiceRegistration<'a> {
    #[serde(rename = "ID")]
    id: String,
    name: &'a str,
    tags: Vec<String>,
    address: &'a str,
    port: u16,
    check: Check,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct Check {
    #[serde(rename = "HTTP", skip_serializing_if = "Option::is_none")]
    http: Option<String>,
    #[serde(rename = "GRPC", skip_serializing_if = "Option::is_none")]
    grpc: Option<String>,
    #[serde(rename = "GRPCUseTLS")]
    grpc_use_tls: bool,
    interval: String,
    deregister_critical_service_after: String,
}

impl ConsulRegistry {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn registration<'a>(&self, descriptor: &'a RegistrationDescriptor) -> ServiceRegistration<'a> {
        let (http, grpc) = match descriptor.protocol {
            ProtocolKind::Http => (Some(descriptor.health_url()), None),
            ProtocolKind::Grpc => (
                None,
                Some(format!("{}:{}", descriptor.address, descriptor.port)),
            ),
        };
        ServiceRegistration {
            id: descriptor.service_id(),
            name: &descriptor.name,
            tags: descriptor.tags_with_version(),
            address: &descriptor.address,
            port: descriptor.port,
            check: Check {
                http,
                grpc,
                grpc_use_tls: descriptor.protocol == ProtocolKind::Grpc && descriptor.tls_enabled,
                interval: format!("{}s", descriptor.health_check_interval.as_secs()),
                deregister_critical_service_after: format!(
                    "{}s",
                    descriptor.deregister_after_critical.as_secs()
                ),
            },
        }
    }
}

impl ServiceRegistry for ConsulRegistry {
    fn backend(&self) -> &'static str {
        "consul"
    }

    async fn register(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        let url = format!("{}/v1/agent/service/register", self.base_url);
        let body = self.registration(descriptor);
        send(self.backend(), "register", self.client.put(url).json(&body)).await?;
        tracing::info!(service_id = %body.id, "registered with consul");
        Ok(())
    }

    async fn deregister(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        let service_id = descriptor.service_id();
        let url = format!(
            "{}/v1/agent/service/deregister/{service_id}",
            self.base_url
        );
        send(self.backend(), "deregister", self.client.put(url)).await?;
        tracing::info!(%service_id, "deregistered from consul");
        Ok(())
    }
}
