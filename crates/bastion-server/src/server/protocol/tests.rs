use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use axum::routing::get;
use axum::{Extension, Router};
use bastion_store::ActorContext;
use core::time::Duration;
use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use super::*;
use crate::server::config::{TlsConfig, WebAppConfig};
use crate::server::protocol::http::{HttpPlan, HttpSettings, app_router};

fn settings() -> HttpSettings {
    HttpSettings::from(&RuntimeConfig::default().webapp)
}

fn view(base_path: &str) -> ViewConfig {
    let mut config = RuntimeConfig::default();
    config.webapp.base_path = base_path.to_string();
    ViewConfig::from_config(&config)
}

fn whoami() -> Router {
    Router::new().route(
        "/whoami",
        get(|Extension(actor): Extension<ActorContext>| async move {
            actor
                .user_id()
                .map_or_else(|| String::from("anonymous"), |id| id.to_string())
        }),
    )
}

async fn call(router: Router, uri: &str, user: Option<&str>) -> (StatusCode, String) {
    let mut request = Request::builder().uri(uri);
    if let Some(user) = user {
        request = request.header(auth::ACTOR_HEADER, user);
    }
    let response = router
        .oneshot(request.body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

#[test]
fn protocol_tags_are_case_insensitive() {
    assert_eq!("HTTP".parse::<ProtocolKind>().unwrap(), ProtocolKind::Http);
    assert_eq!("grpc".parse::<ProtocolKind>().unwrap(), ProtocolKind::Grpc);
    assert_eq!(ProtocolKind::Grpc.to_string(), "GRPC");
    assert!(matches!(
        "FOO".parse::<ProtocolKind>(),
        Err(Error::UnsupportedProtocol(tag)) if tag == "FOO"
    ));
}

#[tokio::test]
async fn health_is_served_at_the_root() {
    let router = app_router(&view("/api"), whoami(), &settings());
    let (status, body) = call(router, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"UP"}"#);
}

#[tokio::test]
async fn routes_are_nested_under_the_base_path() {
    let router = app_router(&view("/api/"), whoami(), &settings());
    let (status, _) = call(router.clone(), "/whoami", Some("7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(router, "/api/whoami", Some("7")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "7");
}

#[tokio::test]
async fn malformed_actor_header_is_anonymous() {
    let router = app_router(&view("/"), whoami(), &settings());
    let (_, body) = call(router.clone(), "/whoami", Some("not-a-number")).await;
    assert_eq!(body, "anonymous");
    let (_, body) = call(router, "/whoami", None).await;
    assert_eq!(body, "anonymous");
}

#[tokio::test]
async fn oversized_bodies_are_rejected() {
    let mut webapp: WebAppConfig = RuntimeConfig::default().webapp;
    webapp.max_body_bytes = 16;
    let router = app_router(
        &view("/"),
        Router::new().route("/echo", axum::routing::post(|body: String| async move { body })),
        &HttpSettings::from(&webapp),
    );
    let response = router
        .oneshot(
            Request::post("/echo")
                .header("content-length", "64")
                .body(Body::from(vec![b'x'; 64]))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[test]
fn zero_limits_are_disabled() {
    let mut webapp: WebAppConfig = RuntimeConfig::default().webapp;
    webapp.write_timeout = Duration::ZERO;
    webapp.idle_timeout = Duration::ZERO;
    let settings = HttpSettings::from(&webapp);
    assert_eq!(settings.write_timeout, Duration::ZERO);
    // Building the router with every optional layer off must still work.
    let _ = app_router(&view("/"), Router::new(), &settings);
}

/// Sends one keep-alive `GET /health` and reads until its body arrived.
async fn get_health(stream: &mut TcpStream) -> String {
    stream
        .write_all(b"GET /health HTTP/1.1\r\nhost: localhost\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    let mut chunk = [0u8; 1024];
    while !response.ends_with(br#"{"status":"UP"}"#) {
        let n = stream.read(&mut chunk).await.unwrap();
        assert_ne!(n, 0, "connection closed mid-response");
        response.extend_from_slice(&chunk[..n]);
    }
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn idle_keep_alive_connections_are_closed() {
    let mut webapp: WebAppConfig = RuntimeConfig::default().webapp;
    webapp.idle_timeout = Duration::from_secs(1);
    let plan = HttpPlan::new(&webapp, &view("/"), Router::new());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let server = tokio::spawn(plan.serve(listener, shutdown.clone()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let first = get_health(&mut stream).await;
    assert!(first.starts_with("HTTP/1.1 200"));

    // Traffic inside the limit keeps the connection open.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let second = get_health(&mut stream).await;
    assert!(second.starts_with("HTTP/1.1 200"));

    let mut rest = Vec::new();
    let closed = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut rest))
        .await
        .expect("idle connection stayed open");
    assert!(closed.is_err() || rest.is_empty());

    shutdown.cancel();
    server.await.unwrap().unwrap();
}

#[test]
fn grpc_interceptor_attaches_the_actor() {
    let mut request = tonic::Request::new(());
    request
        .metadata_mut()
        .insert(auth::ACTOR_HEADER, "42".parse().unwrap());
    let request = auth::authenticate(request).unwrap();
    let actor = request.extensions().get::<ActorContext>().unwrap();
    assert_eq!(actor.user_id(), Some(42));

    let request = auth::authenticate(tonic::Request::new(())).unwrap();
    let actor = request.extensions().get::<ActorContext>().unwrap();
    assert_eq!(*actor, ActorContext::anonymous());
}

#[test]
fn panics_become_internal_status() {
    let response = grpc::panic_to_status(Box::new("boom"));
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/grpc");
    assert_eq!(headers["grpc-status"], "13");
    assert!(headers.contains_key("grpc-message"));
}

struct Material {
    dir: TempDir,
    config: TlsConfig,
}

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

/// A CA plus a server certificate it signed, written as PEM files.
fn material() -> Material {
    let dir = tempfile::tempdir().unwrap();

    let ca_key = KeyPair::generate().unwrap();
    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let server_key = KeyPair::generate().unwrap();
    let server = CertificateParams::new(vec![String::from("localhost")])
        .unwrap()
        .signed_by(&server_key, &ca, &ca_key)
        .unwrap();

    let config = TlsConfig {
        enabled: true,
        cert_path: write(dir.path(), "server.pem", &server.pem()),
        key_path: write(dir.path(), "server.key", &server_key.serialize_pem()),
        ca_path: write(dir.path(), "ca.pem", &ca.pem()),
    };
    Material { dir, config }
}

#[test]
fn tls_material_loads() {
    let material = material();
    assert!(tls::load(&material.config).is_ok());
    let plan = GrpcPlan::new(&material.config, Routes::default()).unwrap();
    assert!(plan.is_tls());
}

#[test]
fn missing_certificate_names_the_path() {
    let material = material();
    let mut config = material.config.clone();
    config.cert_path = material.dir.path().join("absent.pem");
    assert!(matches!(
        tls::load(&config),
        Err(Error::Tls { path, .. }) if path == config.cert_path
    ));
}

#[test]
fn garbage_key_is_rejected() {
    let material = material();
    let mut config = material.config.clone();
    config.key_path = write(material.dir.path(), "garbage.key", "not a key");
    assert!(matches!(
        tls::load(&config),
        Err(Error::Tls { path, .. }) if path == config.key_path
    ));
}

#[test]
fn ca_without_certificates_is_rejected() {
    let material = material();
    let mut config = material.config.clone();
    config.ca_path = write(material.dir.path(), "empty.pem", "");
    assert!(matches!(tls::load(&config), Err(Error::Tls { .. })));
}

#[test]
fn plaintext_grpc_skips_tls() {
    let plan = GrpcPlan::new(&TlsConfig::default(), Routes::default()).unwrap();
    assert!(!plan.is_tls());
}
