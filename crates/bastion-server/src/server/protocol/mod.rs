//! Builds the one server a process runs.
//!
//! The protocol tag is resolved into a [`ServerPlan`] before any network
//! resource is acquired: an unknown tag or unusable TLS material fails here.
//!
//! ## Structure
//!
//! - [`http`] - axum router assembly and the HTTP/1 serve loop.
//! - [`idle`] - keep-alive idle tracking for HTTP/1 connections.
//! - [`grpc`] - tonic server with the interceptor chain and health service.
//! - [`tls`] - certificate, key and CA loading for mutual TLS.
//! - [`auth`] - actor resolution for both protocols.

pub mod auth;
pub mod grpc;
pub mod http;
pub mod idle;
pub mod tls;

#[cfg(test)]
mod tests;

use axum::Router;
use core::convert::Infallible;
use core::fmt;
use core::str::FromStr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tonic::server::NamedService;
use tonic::service::Routes;

use crate::server::config::RuntimeConfig;
use crate::server::error::{Error, Result};
use crate::server::runtime::AppHandle;
use crate::server::view::ViewConfig;

use self::grpc::GrpcPlan;
use self::http::HttpPlan;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolKind {
    Http,
    Grpc,
}

impl FromStr for ProtocolKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "HTTP" => Ok(Self::Http),
            "GRPC" => Ok(Self::Grpc),
            _ => Err(Error::UnsupportedProtocol(s.to_string())),
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Http => "HTTP",
            Self::Grpc => "GRPC",
        })
    }
}

/// Builds the application router for a view. Called again on every reload.
pub type RouteFactory = Arc<dyn Fn(&ViewConfig, AppHandle) -> Router + Send + Sync>;

/// What the application contributes to the server: HTTP routes, gRPC
/// services, or both. Only the configured protocol's part is used.
#[derive(Clone, Default)]
pub struct Services {
    http: Option<RouteFactory>,
    grpc: Routes,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn http<F>(mut self, factory: F) -> Self
    where
        F: Fn(&ViewConfig, AppHandle) -> Router + Send + Sync + 'static,
    {
        self.http = Some(Arc::new(factory));
        self
    }

    pub fn grpc<S>(mut self, service: S) -> Self
    where
        S: tower::Service<
                axum::http::Request<tonic::body::Body>,
                Error = Infallible,
            > + NamedService
            + Clone
            + Send
            + Sync
            + 'static,
        S::Response: axum::response::IntoResponse,
        S::Future: Send + 'static,
    {
        self.grpc = core::mem::take(&mut self.grpc).add_service(service);
        self
    }

    fn http_routes(&self, view: &ViewConfig, handle: AppHandle) -> Router {
        match &self.http {
            Some(factory) => factory(view, handle),
            None => Router::new(),
        }
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("http", &self.http.is_some())
            .finish_non_exhaustive()
    }
}

/// A fully built server waiting for its listener.
#[derive(Clone)]
pub enum ServerPlan {
    Http(HttpPlan),
    Grpc(GrpcPlan),
}

impl ServerPlan {
    /// Resolves the protocol and builds its server.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedProtocol`] for an unknown web app type.
    /// - [`Error::Tls`] if TLS is enabled and its material is unusable.
    pub fn build(
        config: &RuntimeConfig,
        view: &ViewConfig,
        services: &Services,
        handle: AppHandle,
    ) -> Result<Self> {
        match config.webapp.protocol.parse::<ProtocolKind>()? {
            ProtocolKind::Http => Ok(Self::Http(HttpPlan::new(
                &config.webapp,
                view,
                services.http_routes(view, handle),
            ))),
            ProtocolKind::Grpc => Ok(Self::Grpc(GrpcPlan::new(
                &config.tls,
                services.grpc.clone(),
            )?)),
        }
    }

    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::Http(_) => ProtocolKind::Http,
            Self::Grpc(_) => ProtocolKind::Grpc,
        }
    }

    /// Runs the accept loop until `shutdown` is cancelled.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        match self {
            Self::Http(plan) => plan.serve(listener, shutdown).await,
            Self::Grpc(plan) => plan.serve(listener, shutdown).await,
        }
    }
}

impl fmt::Debug for ServerPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(plan) => f.debug_tuple("Http").field(plan.settings()).finish(),
            Self::Grpc(plan) => f
                .debug_struct("Grpc")
                .field("tls", &plan.is_tls())
                .finish(),
        }
    }
}
