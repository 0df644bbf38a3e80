use axum::body::Body;
use axum::http::{HeaderValue, Response, header};
use core::any::Any;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::service::{InterceptorLayer, Routes};
use tonic::transport::{Server, ServerTlsConfig};
use tonic_health::ServingStatus;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

use crate::server::config::TlsConfig;
use crate::server::error::Result;
use crate::server::protocol::{auth, tls};

/// gRPC `INTERNAL`.
const GRPC_STATUS_INTERNAL: &str = "13";

#[derive(Clone)]
pub struct GrpcPlan {
    tls: Option<ServerTlsConfig>,
    routes: Routes,
}

impl GrpcPlan {
    /// Loads TLS material when enabled. Without TLS the same interceptor
    /// chain runs over plaintext.
    pub fn new(config: &TlsConfig, routes: Routes) -> Result<Self> {
        let tls = if config.enabled {
            Some(tls::load(config)?)
        } else {
            None
        };
        Ok(Self { tls, routes })
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Serves the application services plus `grpc.health.v1` until
    /// `shutdown` fires. Health reports `NOT_SERVING` as soon as draining
    /// starts.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let (reporter, health) = tonic_health::server::health_reporter();
        reporter
            .set_service_status("", ServingStatus::Serving)
            .await;

        let mut server = Server::builder();
        if let Some(tls) = self.tls {
            server = server.tls_config(tls)?;
        }

        let signal = async move {
            shutdown.cancelled().await;
            reporter
                .set_service_status("", ServingStatus::NotServing)
                .await;
        };

        server
            .layer(
                ServiceBuilder::new()
                    .layer(CatchPanicLayer::custom(panic_to_status))
                    .layer(TraceLayer::new_for_grpc())
                    .layer(InterceptorLayer::new(auth::authenticate)),
            )
            .add_routes(self.routes.add_service(health))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal)
            .await?;
        Ok(())
    }
}

/// Turns a handler panic into a trailers-only `INTERNAL` response.
pub fn panic_to_status(panic: Box<dyn Any + Send + 'static>) -> Response<Body> {
    let detail = panic
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| panic.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "grpc handler panicked");

    let mut response = Response::new(Body::empty());
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert("grpc-status", HeaderValue::from_static(GRPC_STATUS_INTERNAL));
    headers.insert("grpc-message", HeaderValue::from_static("internal%20error"));
    response
}
