use axum::routing::get;
use axum::{Json, Router, middleware};
use core::time::Duration;
use hyper::Request;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::{TokioIo, TokioTimer};
use hyper_util::server::graceful::GracefulShutdown;
use hyper_util::service::TowerToHyperService;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::{ServiceBuilder, ServiceExt};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tower_http::trace::TraceLayer;

use crate::server::config::WebAppConfig;
use crate::server::error::Result;
use crate::server::protocol::auth;
use crate::server::protocol::idle::{Activity, IdleStream};
use crate::server::view::ViewConfig;

/// hyper refuses read buffers smaller than this.
const MIN_BUF_SIZE: usize = 8192;

/// How long open connections get to finish once the listener stops.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Connection and request limits. A zero duration disables that limit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpSettings {
    pub read_timeout: Duration,
    pub read_header_timeout: Duration,
    pub write_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_header_bytes: usize,
    pub max_body_bytes: usize,
}

impl From<&WebAppConfig> for HttpSettings {
    fn from(webapp: &WebAppConfig) -> Self {
        Self {
            read_timeout: webapp.read_timeout,
            read_header_timeout: webapp.read_header_timeout,
            write_timeout: webapp.write_timeout,
            idle_timeout: webapp.idle_timeout,
            max_header_bytes: webapp.max_header_bytes,
            max_body_bytes: webapp.max_body_bytes,
        }
    }
}

fn enabled(limit: Duration) -> Option<Duration> {
    (!limit.is_zero()).then_some(limit)
}

#[derive(Clone)]
pub struct HttpPlan {
    router: Router,
    settings: HttpSettings,
}

impl HttpPlan {
    pub fn new(webapp: &WebAppConfig, view: &ViewConfig, routes: Router) -> Self {
        let settings = HttpSettings::from(webapp);
        let router = app_router(view, routes, &settings);
        Self { router, settings }
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Accepts connections until `shutdown` fires, then gives open
    /// connections [`DRAIN_TIMEOUT`] to finish.
    ///
    /// A connection without traffic or an in-flight request for the idle
    /// timeout is closed.
    pub async fn serve(self, listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
        let mut http = http1::Builder::new();
        http.timer(TokioTimer::new())
            .max_buf_size(self.settings.max_header_bytes.max(MIN_BUF_SIZE))
            .keep_alive(enabled(self.settings.idle_timeout).is_some());
        if let Some(timeout) = enabled(self.settings.read_header_timeout) {
            http.header_read_timeout(timeout);
        }

        let graceful = GracefulShutdown::new();
        loop {
            let (stream, peer) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        continue;
                    }
                },
                () = shutdown.cancelled() => break,
            };

            let activity = Activity::new();
            let tracked = Arc::clone(&activity);
            let router = ServiceExt::<Request<Incoming>>::map_future(
                self.router.clone(),
                move |response| {
                    let guard = tracked.begin();
                    async move {
                        let response = response.await;
                        drop(guard);
                        response
                    }
                },
            );
            let io = TokioIo::new(IdleStream::new(stream, Arc::clone(&activity)));
            let connection =
                graceful.watch(http.serve_connection(io, TowerToHyperService::new(router)));
            let idle_timeout = enabled(self.settings.idle_timeout);
            tokio::spawn(async move {
                let result = match idle_timeout {
                    Some(limit) => tokio::select! {
                        result = connection => result,
                        () = activity.expired(limit) => {
                            tracing::debug!(%peer, timeout = ?limit, "closing idle connection");
                            return;
                        }
                    },
                    None => connection.await,
                };
                if let Err(err) = result {
                    tracing::debug!(%peer, error = %err, "connection ended with error");
                }
            });
        }
        drop(listener);

        tokio::select! {
            () = graceful.shutdown() => tracing::debug!("http connections drained"),
            () = tokio::time::sleep(DRAIN_TIMEOUT) => {
                tracing::warn!(timeout = ?DRAIN_TIMEOUT, "http connections still open after drain");
            }
        }
        Ok(())
    }
}

/// Mounts `routes` under the view's base path next to `/health` and wraps
/// everything in the request middleware.
pub fn app_router(view: &ViewConfig, routes: Router, settings: &HttpSettings) -> Router {
    let app = if view.is_root() {
        routes
    } else {
        Router::new().nest(&view.base_path, routes)
    };

    #[allow(deprecated)]
    let write_timeout = enabled(settings.write_timeout).map(TimeoutLayer::new);

    app.route("/health", get(health)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(auth::resolve_actor))
            .option_layer(enabled(settings.read_timeout).map(RequestBodyTimeoutLayer::new))
            .layer(RequestBodyLimitLayer::new(settings.max_body_bytes))
            .option_layer(write_timeout),
    )
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "UP" }))
}
