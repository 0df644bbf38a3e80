use axum::Router;
use axum::extract::State;
use axum::http::{Method, StatusCode, Uri};
use core::time::Duration;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

use super::*;

/// One request seen by a [`FakeAgent`].
#[derive(Debug, Clone)]
pub(crate) struct Recorded {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

#[derive(Clone)]
struct AgentState {
    status: StatusCode,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

/// A registry stand-in answering every request with a fixed status.
pub(crate) struct FakeAgent {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<Recorded>>>,
}

impl FakeAgent {
    pub async fn start(status: StatusCode) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = AgentState {
            status,
            requests: requests.clone(),
        };
        let app = Router::new().fallback(record).with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        Self { addr, requests }
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn paths(&self) -> Vec<(Method, String)> {
        self.requests()
            .into_iter()
            .map(|r| (r.method, r.path))
            .collect()
    }
}

async fn record(State(state): State<AgentState>, method: Method, uri: Uri, body: String) -> StatusCode {
    state.requests.lock().unwrap().push(Recorded {
        method,
        path: uri.path().to_string(),
        body: serde_json::from_str(&body).ok(),
    });
    state.status
}

fn descriptor(protocol: ProtocolKind) -> RegistrationDescriptor {
    RegistrationDescriptor {
        name: String::from("orders"),
        version: String::from("1.2.0"),
        address: String::from("10.0.0.5"),
        port: 9000,
        tags: vec![String::from("blue")],
        protocol,
        tls_enabled: false,
        deregister_after_critical: Duration::from_secs(60),
        health_check_interval: Duration::from_secs(10),
    }
}

fn config_for(agent: &FakeAgent, backend: &str) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.discovery.backend = backend.to_string();
    config.discovery.address = agent.addr.ip().to_string();
    config.discovery.port = agent.addr.port();
    config
}

#[test]
fn service_id_joins_name_version_address_and_port() {
    assert_eq!(
        descriptor(ProtocolKind::Http).service_id(),
        "orders-1.2.0-10.0.0.5-9000"
    );
}

#[test]
fn descriptor_uses_the_advertised_address() {
    let mut config = RuntimeConfig::default();
    config.webapp.address = String::from("svc.internal");
    config.webapp.listen_host = String::from("0.0.0.0");
    let descriptor = RegistrationDescriptor::from_config(&config, ProtocolKind::Grpc);
    assert_eq!(descriptor.address, "svc.internal");
    assert_eq!(descriptor.protocol, ProtocolKind::Grpc);
}

#[test]
fn unknown_backend_is_rejected() {
    let mut config = RuntimeConfig::default();
    config.discovery.backend = String::from("zookeeper");
    assert!(matches!(
        Registrar::from_config(&config),
        Err(Error::UnknownDiscoveryBackend(tag)) if tag == "zookeeper"
    ));
}

#[tokio::test]
async fn consul_registration_carries_tags_and_http_check() {
    let agent = FakeAgent::start(StatusCode::OK).await;
    let registrar = Registrar::from_config(&config_for(&agent, "Consul")).unwrap();
    assert_eq!(registrar.backend(), "consul");

    let descriptor = descriptor(ProtocolKind::Http);
    registrar.register(&descriptor).await.unwrap();

    let requests = agent.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, Method::PUT);
    assert_eq!(requests[0].path, "/v1/agent/service/register");

    let body = requests[0].body.clone().unwrap();
    assert_eq!(body["ID"], "orders-1.2.0-10.0.0.5-9000");
    assert_eq!(body["Name"], "orders");
    assert_eq!(body["Address"], "10.0.0.5");
    assert_eq!(body["Port"], 9000);
    assert_eq!(body["Tags"], serde_json::json!(["blue", "version=1.2.0"]));
    assert_eq!(body["Check"]["HTTP"], "http://10.0.0.5:9000/health");
    assert_eq!(body["Check"]["Interval"], "10s");
    assert_eq!(body["Check"]["DeregisterCriticalServiceAfter"], "60s");
    assert!(body["Check"].get("GRPC").is_none());
}

#[tokio::test]
async fn consul_grpc_check_and_deregister_use_the_service_id() {
    let agent = FakeAgent::start(StatusCode::OK).await;
    let registrar = Registrar::from_config(&config_for(&agent, "consul")).unwrap();
    let mut descriptor = descriptor(ProtocolKind::Grpc);
    descriptor.tls_enabled = true;

    registrar.register(&descriptor).await.unwrap();
    registrar.deregister(&descriptor).await.unwrap();

    let requests = agent.requests();
    let check = &requests[0].body.as_ref().unwrap()["Check"];
    assert_eq!(check["GRPC"], "10.0.0.5:9000");
    assert_eq!(check["GRPCUseTLS"], true);
    assert_eq!(
        (requests[1].method.clone(), requests[1].path.as_str()),
        (
            Method::PUT,
            "/v1/agent/service/deregister/orders-1.2.0-10.0.0.5-9000"
        )
    );
}

#[tokio::test]
async fn eureka_registers_under_the_uppercase_app() {
    let agent = FakeAgent::start(StatusCode::NO_CONTENT).await;
    let registrar = Registrar::from_config(&config_for(&agent, "eureka")).unwrap();
    let descriptor = descriptor(ProtocolKind::Http);

    registrar.register(&descriptor).await.unwrap();
    registrar.deregister(&descriptor).await.unwrap();

    assert_eq!(
        agent.paths(),
        vec![
            (Method::POST, String::from("/eureka/apps/ORDERS")),
            (
                Method::DELETE,
                String::from("/eureka/apps/ORDERS/orders-1.2.0-10.0.0.5-9000")
            ),
        ]
    );
    let body = agent.requests()[0].body.clone().unwrap();
    assert_eq!(body["instance"]["app"], "ORDERS");
    assert_eq!(body["instance"]["status"], "UP");
    assert_eq!(body["instance"]["port"]["$"], 9000);
    assert_eq!(body["instance"]["metadata"]["version"], "1.2.0");
}

#[tokio::test]
async fn rejected_registration_reports_the_status() {
    let agent = FakeAgent::start(StatusCode::INTERNAL_SERVER_ERROR).await;
    let registrar = Registrar::from_config(&config_for(&agent, "consul")).unwrap();
    let err = registrar
        .register(&descriptor(ProtocolKind::Http))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Discovery {
            backend: "consul",
            operation: "register",
            status: Some(500),
            ..
        }
    ));
}

#[tokio::test]
async fn unreachable_agent_has_no_status() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = RuntimeConfig::default();
    config.discovery.address = addr.ip().to_string();
    config.discovery.port = addr.port();
    let registrar = Registrar::from_config(&config).unwrap();
    let err = registrar
        .deregister(&descriptor(ProtocolKind::Http))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Discovery { status: None, .. }));
}
