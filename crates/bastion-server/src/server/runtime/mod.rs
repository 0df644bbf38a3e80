//! Process lifecycle: bootstrap, serve, drain, reload.
//!
//! A [`Runtime`] owns one configuration snapshot at a time together with the
//! store and server plan built from it. Request handlers read the snapshot
//! through an [`AppHandle`] without locking; [`Runtime::reload`] replaces it
//! wholesale.
//!
//! ```text
//! Created -> Configured -> ServerBuilt -> Unregistered | Registered
//!         -> Serving -> Draining -> Closed
//! ```
//!
//! Serving ends at the first of three events: an OS signal, a serve loop
//! failure, or a failed registration. Whichever comes first drives the drain;
//! the other tasks are left to finish on their own.

mod signal;


use arc_swap::ArcSwap;
use bastion_id::IdGenerator;
use bastion_store::Store;
use core::fmt;
use core::future::Future;
use core::time::Duration;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::server::config::{ConfigProvider, RuntimeConfig};
use crate::server::discovery::{Registrar, RegistrationDescriptor, ServiceRegistry};
use crate::server::error::{Error, Result};
use crate::server::protocol::{ServerPlan, Services};
use crate::server::telemetry::{self, LogSink, TracingSink};
use crate::server::view::ViewConfig;

pub use self::signal::shutdown_signal;

/// How long draining waits for the serve loop to return.
const STOP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    Configured,
    ServerBuilt,
    /// Serving without a registry entry, either by configuration or because
    /// registration failed.
    Unregistered,
    Registered,
    Serving,
    Draining,
    Closed,
}

/// The event that ends serving.
#[derive(Debug)]
pub enum Completion {
    Server(Error),
    Registration(Error),
    Signal(&'static str),
}

/// Everything derived from one configuration load.
#[derive(Debug)]
pub struct Snapshot {
    pub config: Arc<RuntimeConfig>,
    pub store: Store,
    pub view: Arc<ViewConfig>,
}

/// Read access to the current snapshot, shared with request handlers.
///
/// Every accessor returns the snapshot current at the time of the call; a
/// reload in between is never observed half-applied.
#[derive(Clone)]
pub struct AppHandle {
    snapshot: Arc<ArcSwap<Snapshot>>,
}

impl AppHandle {
    fn new(snapshot: Snapshot) -> Self {
        Self {
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    pub fn config(&self) -> Arc<RuntimeConfig> {
        self.snapshot.load().config.clone()
    }

    pub fn store(&self) -> Store {
        self.snapshot.load().store.clone()
    }

    pub fn view(&self) -> Arc<ViewConfig> {
        self.snapshot.load().view.clone()
    }

    fn replace(&self, snapshot: Snapshot) {
        self.snapshot.store(Arc::new(snapshot));
    }
}

impl fmt::Debug for AppHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("AppHandle")
            .field(&*self.snapshot.load())
            .finish()
    }
}

pub struct Runtime {
    provider: Box<dyn ConfigProvider>,
    services: Services,
    sink: Arc<dyn LogSink>,
    handle: AppHandle,
    plan: ArcSwap<ServerPlan>,
    registrar: Option<Registrar>,
    /// Serializes reloads and holds the generator they may reuse.
    reload: Mutex<Arc<IdGenerator>>,
    phase: watch::Sender<Phase>,
    local_addr: OnceLock<SocketAddr>,
}

impl Runtime {
    /// Loads configuration and builds everything needed to serve, logging
    /// lifecycle lines through `tracing`.
    ///
    /// # Errors
    ///
    /// Fails before any listener is bound on invalid configuration, an
    /// unusable node id, a database that cannot be opened, an unsupported
    /// protocol, unusable TLS material, or an unknown discovery backend.
    pub async fn bootstrap<P>(provider: P, services: Services) -> Result<Self>
    where
        P: ConfigProvider + 'static,
    {
        Self::bootstrap_with_sink(provider, services, Arc::new(TracingSink)).await
    }

    /// Like [`Runtime::bootstrap`], printing lifecycle lines to `sink`.
    pub async fn bootstrap_with_sink<P>(
        provider: P,
        services: Services,
        sink: Arc<dyn LogSink>,
    ) -> Result<Self>
    where
        P: ConfigProvider + 'static,
    {
        let (phase, _) = watch::channel(Phase::Created);

        let config = Arc::new(provider.load(None)?);
        telemetry::init_logging();
        phase.send_replace(Phase::Configured);

        let ids = Arc::new(IdGenerator::new(config.node_id)?);
        let store = Store::open(&config.database, ids.clone()).await?;
        let view = Arc::new(ViewConfig::from_config(&config));
        let handle = AppHandle::new(Snapshot {
            config: config.clone(),
            store: store.clone(),
            view: view.clone(),
        });

        let built = ServerPlan::build(&config, &view, &services, handle.clone()).and_then(|plan| {
            let registrar = if config.discovery.auto_register {
                Some(Registrar::from_config(&config)?)
            } else {
                None
            };
            Ok((plan, registrar))
        });
        let (plan, registrar) = match built {
            Ok(built) => built,
            Err(err) => {
                store.close().await;
                return Err(err);
            }
        };
        phase.send_replace(Phase::ServerBuilt);

        tracing::info!(
            run_mode = %config.run_mode,
            protocol = %plan.kind(),
            node_id = config.node_id,
            driver = %config.database.driver,
            discovery = registrar.as_ref().map(|r| r.backend()),
            "runtime bootstrapped"
        );

        Ok(Self {
            provider: Box::new(provider),
            services,
            sink,
            handle,
            plan: ArcSwap::from_pointee(plan),
            registrar,
            reload: Mutex::new(ids),
            phase,
            local_addr: OnceLock::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// Follows phase changes.
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.phase.subscribe()
    }

    pub fn handle(&self) -> AppHandle {
        self.handle.clone()
    }

    /// The bound address, once the listener is up.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Serves until SIGINT or SIGTERM, then drains.
    pub async fn serve(&self) -> Result<()> {
        self.serve_until(shutdown_signal()).await
    }

    /// Serves until `signal` resolves, the serve loop fails, or registration
    /// fails, then drains. A runtime serves at most once.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidPhase`] if the runtime already served.
    /// - The registration or server error that ended serving.
    pub async fn serve_until<F>(&self, signal: F) -> Result<()>
    where
        F: Future<Output = &'static str> + Send + 'static,
    {
        self.transition(Phase::ServerBuilt, Phase::Unregistered)?;

        let snapshot = self.handle.snapshot();
        let config = &snapshot.config;
        let plan = self.plan.load_full().as_ref().clone();
        let descriptor = RegistrationDescriptor::from_config(config, plan.kind());
        let (tx, mut rx) = mpsc::channel(1);

        if let Some(registrar) = &self.registrar {
            match registrar.register(&descriptor).await {
                Ok(()) => {
                    self.phase.send_replace(Phase::Registered);
                }
                Err(err) => {
                    tracing::error!(
                        error = %err,
                        backend = registrar.backend(),
                        service_id = %descriptor.service_id(),
                        "service registration failed"
                    );
                    let _ = tx.try_send(Completion::Registration(err));
                }
            }
        }

        let shutdown = CancellationToken::new();
        let addr = config.webapp.listen_addr();
        let server = match TcpListener::bind(&addr).await {
            Ok(listener) => {
                let port = listener.local_addr().map_or(config.webapp.port, |local| {
                    let _ = self.local_addr.set(local);
                    local.port()
                });
                self.phase.send_replace(Phase::Serving);
                self.sink.print(&format!(
                    "start {} server listening : {port}, version : {}",
                    plan.kind(),
                    config.project.version
                ));
                Some(spawn_server(plan.clone(), listener, shutdown.clone(), tx.clone()))
            }
            Err(source) => {
                tracing::error!(%addr, error = %source, "bind failed");
                let _ = tx.try_send(Completion::Server(Error::Bind { addr, source }));
                None
            }
        };

        let signal_tx = tx.clone();
        tokio::spawn(async move {
            let name = signal.await;
            let _ = signal_tx.send(Completion::Signal(name)).await;
        });
        drop(tx);

        let completion = rx
            .recv()
            .await
            .unwrap_or_else(|| Completion::Server(Error::Server("every task exited".into())));
        let result = match completion {
            Completion::Signal(name) => {
                tracing::info!(signal = name, "shutdown requested");
                Ok(())
            }
            Completion::Server(err) => {
                tracing::error!(error = %err, "server stopped");
                Err(err)
            }
            Completion::Registration(err) => Err(err),
        };

        self.drain(&plan, &descriptor, shutdown, server).await;
        result
    }

    /// Stops the listener, deregisters, closes the store and flushes the
    /// sink. Each step runs even if an earlier one failed.
    async fn drain(
        &self,
        plan: &ServerPlan,
        descriptor: &RegistrationDescriptor,
        shutdown: CancellationToken,
        server: Option<JoinHandle<()>>,
    ) {
        self.phase.send_replace(Phase::Draining);
        shutdown.cancel();

        if let Some(server) = server {
            match tokio::time::timeout(STOP_TIMEOUT, server).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!(error = %err, "server task failed"),
                Err(_) => tracing::warn!(timeout = ?STOP_TIMEOUT, "server still running"),
            }
        }

        if let Some(registrar) = &self.registrar {
            if let Err(err) = registrar.deregister(descriptor).await {
                tracing::warn!(
                    error = %err,
                    service_id = %descriptor.service_id(),
                    "service deregistration failed"
                );
            }
        }

        self.handle.store().close().await;

        let port = self.local_addr().map_or(descriptor.port, |addr| addr.port());
        self.sink.print(&format!(
            "end {} server listening : {port}, version : {}",
            plan.kind(),
            descriptor.version
        ));
        self.sink.flush();
        self.phase.send_replace(Phase::Closed);
    }

    /// Rebuilds configuration, store and server plan for `run_mode` and
    /// swaps them in atomically.
    ///
    /// Stores handed out earlier stay open. A running listener keeps serving
    /// its current router; the new plan is used by the next serve. Discovery
    /// registration is left as is.
    ///
    /// # Errors
    ///
    /// Any bootstrap error for the new snapshot. The current snapshot stays
    /// in place.
    pub async fn reload(&self, run_mode: &str) -> Result<()> {
        let mut ids = self.reload.lock().await;

        let config = Arc::new(self.provider.load(Some(run_mode))?);
        telemetry::init_logging();

        let next_ids = if ids.node_id() == config.node_id {
            ids.clone()
        } else {
            Arc::new(IdGenerator::new(config.node_id)?)
        };
        let store = Store::open(&config.database, next_ids.clone()).await?;
        let view = Arc::new(ViewConfig::from_config(&config));

        let plan = match ServerPlan::build(&config, &view, &self.services, self.handle.clone()) {
            Ok(plan) => plan,
            Err(err) => {
                store.close().await;
                return Err(err);
            }
        };

        self.handle.replace(Snapshot {
            config: config.clone(),
            store,
            view,
        });
        self.plan.store(Arc::new(plan));
        *ids = next_ids;

        tracing::info!(run_mode = %config.run_mode, "runtime reloaded");
        Ok(())
    }

    fn transition(&self, from: Phase, to: Phase) -> Result<()> {
        let mut actual = from;
        let moved = self.phase.send_if_modified(|current| {
            if *current == from {
                *current = to;
                true
            } else {
                actual = *current;
                false
            }
        });
        if moved {
            Ok(())
        } else {
            Err(Error::InvalidPhase {
                expected: from,
                actual,
            })
        }
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("phase", &self.phase())
            .field("plan", &*self.plan.load())
            .field("registrar", &self.registrar)
            .field("local_addr", &self.local_addr())
            .finish_non_exhaustive()
    }
}

fn spawn_server(
    plan: ServerPlan,
    listener: TcpListener,
    shutdown: CancellationToken,
    tx: mpsc::Sender<Completion>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let failure = match plan.serve(listener, shutdown.clone()).await {
            Err(err) => Some(err),
            Ok(()) if !shutdown.is_cancelled() => {
                Some(Error::Server("serve loop exited".into()))
            }
            Ok(()) => None,
        };
        if let Some(err) = failure {
            let _ = tx.send(Completion::Server(err)).await;
        }
    })
}
