//! Registration with an external service registry.
//!
//! The backend is chosen once, at bootstrap, from the configured tag. The
//! runtime registers before binding its listener and deregisters, with the
//! same [`RegistrationDescriptor`], while draining.

pub mod consul;
pub mod eureka;

#[cfg(test)]
pub(crate) mod tests;

use core::future::Future;
use core::time::Duration;
use reqwest::Client;

use crate::server::config::RuntimeConfig;
use crate::server::error::{Error, Result};
use crate::server::protocol::ProtocolKind;

pub use self::consul::ConsulRegistry;
pub use self::eureka::EurekaRegistry;

/// Upper bound for a single registry request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Everything a registry needs to know about this instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrationDescriptor {
    pub name: String,
    pub version: String,
    /// Advertised address, which may differ from the listen host.
    pub address: String,
    pub port: u16,
    pub tags: Vec<String>,
    pub protocol: ProtocolKind,
    pub tls_enabled: bool,
    pub deregister_after_critical: Duration,
    pub health_check_interval: Duration,
}

impl RegistrationDescriptor {
    pub fn from_config(config: &RuntimeConfig, protocol: ProtocolKind) -> Self {
        Self {
            name: config.project.name.clone(),
            version: config.project.version.clone(),
            address: config.webapp.address.clone(),
            port: config.webapp.port,
            tags: config.project.tags.clone(),
            protocol,
            tls_enabled: config.tls.enabled,
            deregister_after_critical: config.project.deregister_after_critical,
            health_check_interval: config.project.health_check_interval,
        }
    }

    /// Stable instance id: `{name}-{version}-{address}-{port}`.
    pub fn service_id(&self) -> String {
        format!("{}-{}-{}-{}", self.name, self.version, self.address, self.port)
    }

    /// Application tags plus `version=<version>`.
    pub fn tags_with_version(&self) -> Vec<String> {
        let mut tags = self.tags.clone();
        tags.push(format!("version={}", self.version));
        tags
    }

    pub(crate) fn health_url(&self) -> String {
        let scheme = if self.tls_enabled { "https" } else { "http" };
        format!("{scheme}://{}:{}/health", self.address, self.port)
    }
}

/// A registry this process can announce itself to.
pub trait ServiceRegistry: Send + Sync {
    /// Backend name used in logs and errors.
    fn backend(&self) -> &'static str;

    fn register(
        &self,
        descriptor: &RegistrationDescriptor,
    ) -> impl Future<Output = Result<()>> + Send;

    fn deregister(
        &self,
        descriptor: &RegistrationDescriptor,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// The configured registry backend.
#[derive(Debug, Clone)]
pub enum Registrar {
    Consul(ConsulRegistry),
    Eureka(EurekaRegistry),
}

impl Registrar {
    /// Resolves the backend tag (`consul` or `eureka`, case-insensitive).
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownDiscoveryBackend`] for any other tag.
    /// - [`Error::Config`] if the HTTP client cannot be built.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let discovery = &config.discovery;
        let base_url = format!("http://{}:{}", discovery.address, discovery.port);
        match discovery.backend.to_ascii_lowercase().as_str() {
            "consul" => Ok(Self::Consul(ConsulRegistry::new(client()?, base_url))),
            "eureka" => Ok(Self::Eureka(EurekaRegistry::new(client()?, base_url))),
            _ => Err(Error::UnknownDiscoveryBackend(discovery.backend.clone())),
        }
    }
}

impl ServiceRegistry for Registrar {
    fn backend(&self) -> &'static str {
        match self {
            Self::Consul(registry) => registry.backend(),
            Self::Eureka(registry) => registry.backend(),
        }
    }

    async fn register(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        match self {
            Self::Consul(registry) => registry.register(descriptor).await,
            Self::Eureka(registry) => registry.register(descriptor).await,
        }
    }

    async fn deregister(&self, descriptor: &RegistrationDescriptor) -> Result<()> {
        match self {
            Self::Consul(registry) => registry.deregister(descriptor).await,
            Self::Eureka(registry) => registry.deregister(descriptor).await,
        }
    }
}

fn client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|err| Error::Config(format!("discovery client: {err}")))
}

/// Sends `request` and maps transport failures and non-2xx answers into
/// [`Error::Discovery`].
pub(crate) async fn send(
    backend: &'static str,
    operation: &'static str,
    request: reqwest::RequestBuilder,
) -> Result<()> {
    let response = request.send().await.map_err(|err| Error::Discovery {
        backend,
        operation,
        status: None,
        message: err.to_string(),
    })?;

    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::Discovery {
        backend,
        operation,
        status: Some(status.as_u16()),
        message,
    })
}
