use anyhow::Context;
use axum::routing::get;
use axum::{Json, Router};
use bastion_server::server::telemetry::init_logging;
use bastion_server::{AppHandle, EnvConfigProvider, Runtime, Services, ViewConfig};
use serde_json::{Value, json};

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let services = Services::new().http(routes);

    let runtime = match Runtime::bootstrap(EnvConfigProvider::from_env(), services).await {
        Ok(runtime) => runtime,
        Err(err) => {
            tracing::error!(error = %err, "bootstrap failed");
            return Err(err).context("failed to bootstrap bastion-server");
        }
    };

    runtime.serve().await.context("bastion-server stopped with an error")?;
    tracing::info!("Service shut down successfully");
    Ok(())
}

/// Built-in routes: service information next to the runtime's `/health`.
fn routes(_view: &ViewConfig, handle: AppHandle) -> Router {
    Router::new().route(
        "/info",
        get(move || {
            let handle = handle.clone();
            async move { info(&handle) }
        }),
    )
}

fn info(handle: &AppHandle) -> Json<Value> {
    let view = handle.view();
    let config = handle.config();
    Json(json!({
        "name": view.service_name,
        "version": view.service_version,
        "run_mode": view.run_mode,
        "protocol": config.webapp.protocol,
        "node_id": config.node_id,
    }))
}
