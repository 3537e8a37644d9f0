//! Integration tests for the provisioning boundary
//!
//! The HTTP provisioner is exercised against a thin axum server standing in
//! for a provisioning endpoint; the local provisioner against a temp dir.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::time::sleep;

use stackforge::compose::StackComposer;
use stackforge::config::{Profile, StackConfig};
use stackforge::error::{DestroyError, ProvisioningError};
use stackforge::graph::RemovalPolicy;
use stackforge::provision::{HttpProvisioner, LocalProvisioner, Provisioner};
use stackforge::synth::{synthesize, Template};

const API_KEY: &str = "test-key";

/// Find an available port for testing
fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to address")
        .local_addr()
        .expect("Failed to get local address")
        .port()
}

fn template(config: StackConfig) -> Template {
    let graph = StackComposer::new("demo", config).unwrap().compose().unwrap();
    synthesize(&graph)
}

/// Stacks the mock endpoint currently holds
#[derive(Debug, Clone, Default)]
struct EndpointState {
    stacks: Arc<Mutex<HashMap<String, Template>>>,
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bearer {}", API_KEY))
        .unwrap_or(false)
}

async fn put_stack(
    State(state): State<EndpointState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(template): Json<Template>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }
    if id == "over-quota" {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "LimitExceeded: too many load balancers"})),
        );
    }
    let count = template.resources.len();
    state.stacks.lock().unwrap().insert(id.clone(), template);
    (StatusCode::OK, Json(json!({"stack": id, "resources": count})))
}

async fn delete_stack(
    State(state): State<EndpointState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "unauthorized"})));
    }
    let mut stacks = state.stacks.lock().unwrap();
    let Some(template) = stacks.get(&id).cloned() else {
        return (StatusCode::NOT_FOUND, Json(json!({"error": "no such stack"})));
    };
    let retained = template.retained();
    if !retained.is_empty() {
        return (
            StatusCode::CONFLICT,
            Json(json!({"error": "retained resources", "retained": retained})),
        );
    }
    stacks.remove(&id);
    let removed: Vec<&String> = template.resources.keys().collect();
    (StatusCode::OK, Json(json!({ "removed": removed })))
}

/// Start the mock endpoint and return its base URL
async fn spawn_endpoint(state: EndpointState) -> String {
    let port = find_available_port();
    let app = Router::new()
        .route("/v1/stacks/{id}", put(put_stack).delete(delete_stack))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .expect("Failed to bind endpoint");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    sleep(Duration::from_millis(100)).await;
    format!("http://127.0.0.1:{}", port)
}

#[tokio::test]
async fn test_http_deploy_and_destroy() {
    let state = EndpointState::default();
    let url = spawn_endpoint(state.clone()).await;
    let provisioner = HttpProvisioner::new(url).with_api_key(API_KEY);

    let template = template(StackConfig::with_profile(Profile::Base));
    let record = provisioner.deploy("demo", &template).await.unwrap();
    assert_eq!(record.stack, "demo");
    assert_eq!(record.resource_count, template.resources.len());
    assert!(state.stacks.lock().unwrap().contains_key("demo"));

    let report = provisioner.destroy("demo").await.unwrap();
    assert_eq!(report.removed.len(), template.resources.len());
    assert!(state.stacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_http_rejection_surfaced_verbatim() {
    let url = spawn_endpoint(EndpointState::default()).await;
    let provisioner = HttpProvisioner::new(url).with_api_key(API_KEY);

    let err = provisioner
        .deploy("over-quota", &template(StackConfig::default()))
        .await
        .unwrap_err();
    match err {
        ProvisioningError::Rejected { stack, message } => {
            assert_eq!(stack, "over-quota");
            assert_eq!(message, "LimitExceeded: too many load balancers");
        }
        other => panic!("expected Rejected, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_missing_api_key_rejected() {
    let url = spawn_endpoint(EndpointState::default()).await;
    let provisioner = HttpProvisioner::new(url);

    let err = provisioner
        .deploy("demo", &template(StackConfig::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Rejected { ref message, .. } if message == "unauthorized"));
}

#[tokio::test]
async fn test_http_destroy_unknown_stack() {
    let url = spawn_endpoint(EndpointState::default()).await;
    let provisioner = HttpProvisioner::new(url).with_api_key(API_KEY);

    let err = provisioner.destroy("ghost").await.unwrap_err();
    assert!(matches!(
        err,
        DestroyError::Provisioning(ProvisioningError::NotDeployed(ref s)) if s == "ghost"
    ));
}

#[tokio::test]
async fn test_http_retained_resources_block_teardown() {
    let url = spawn_endpoint(EndpointState::default()).await;
    let provisioner = HttpProvisioner::new(url).with_api_key(API_KEY);

    let mut config = StackConfig::default();
    config.file_system.removal_policy = RemovalPolicy::Retain;
    let template = template(config);
    provisioner.deploy("demo", &template).await.unwrap();

    match provisioner.destroy("demo").await.unwrap_err() {
        DestroyError::Teardown(err) => {
            assert_eq!(err.stack, "demo");
            assert_eq!(err.retained, template.retained());
        }
        other => panic!("expected TeardownError, got {:?}", other),
    }
}

#[tokio::test]
async fn test_http_unreachable_endpoint() {
    let port = find_available_port();
    let provisioner = HttpProvisioner::new(format!("http://127.0.0.1:{}", port));
    let err = provisioner
        .deploy("demo", &template(StackConfig::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::Transport(_)));
}

#[tokio::test]
async fn test_http_invalid_stack_id_never_sent() {
    let state = EndpointState::default();
    let url = spawn_endpoint(state.clone()).await;
    let provisioner = HttpProvisioner::new(url).with_api_key(API_KEY);

    let err = provisioner
        .deploy("../demo", &template(StackConfig::default()))
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisioningError::InvalidStack(_)));

    let err = provisioner.destroy("a/b").await.unwrap_err();
    assert!(matches!(
        err,
        DestroyError::Provisioning(ProvisioningError::InvalidStack(_))
    ));
    assert!(state.stacks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_local_destroy_refuses_path_outside_state_dir() {
    let root = tempfile::tempdir().unwrap();
    let outside = LocalProvisioner::new(root.path());
    outside
        .deploy("victim", &template(StackConfig::with_profile(Profile::Base)))
        .await
        .unwrap();

    let provisioner = LocalProvisioner::new(root.path().join("state"));
    let err = provisioner.destroy("../victim").await.unwrap_err();
    assert!(matches!(
        err,
        DestroyError::Provisioning(ProvisioningError::InvalidStack(_))
    ));
    assert!(outside.state_path("victim").unwrap().exists());
}

#[tokio::test]
async fn test_local_deploy_then_destroy() {
    let dir = tempfile::tempdir().unwrap();
    let provisioner = LocalProvisioner::new(dir.path());
    let template = template(StackConfig::with_profile(Profile::Full));

    let record = provisioner.deploy("demo", &template).await.unwrap();
    assert!(provisioner.state_path("demo").unwrap().exists());

    let stored = provisioner.load("demo").await.unwrap().unwrap();
    assert_eq!(stored.record.id, record.id);
    assert_eq!(stored.template, template);

    let report = provisioner.destroy("demo").await.unwrap();
    assert_eq!(report.removed.len(), template.resources.len());
    assert!(!provisioner.state_path("demo").unwrap().exists());

    assert!(matches!(
        provisioner.destroy("demo").await.unwrap_err(),
        DestroyError::Provisioning(ProvisioningError::NotDeployed(_))
    ));
}

#[tokio::test]
async fn test_local_redeploy_replaces_record() {
    let dir = tempfile::tempdir().unwrap();
    let provisioner = LocalProvisioner::new(dir.path());

    let first = provisioner
        .deploy("demo", &template(StackConfig::with_profile(Profile::Base)))
        .await
        .unwrap();
    let second = provisioner
        .deploy("demo", &template(StackConfig::with_profile(Profile::Full)))
        .await
        .unwrap();

    assert_ne!(first.id, second.id);
    assert!(second.resource_count > first.resource_count);
    let stored = provisioner.load("demo").await.unwrap().unwrap();
    assert_eq!(stored.record.id, second.id);
}

#[tokio::test]
async fn test_local_retained_resources_stay_recorded() {
    let dir = tempfile::tempdir().unwrap();
    let provisioner = LocalProvisioner::new(dir.path());

    let mut config = StackConfig::with_profile(Profile::Full);
    config.file_system.removal_policy = RemovalPolicy::Retain;
    config.secondary_target.bucket_removal_policy = RemovalPolicy::Retain;
    let template = template(config);
    provisioner.deploy("demo", &template).await.unwrap();

    let err = match provisioner.destroy("demo").await.unwrap_err() {
        DestroyError::Teardown(err) => err,
        other => panic!("expected TeardownError, got {:?}", other),
    };
    assert_eq!(err.retained.len(), 2);
    assert!(err.to_string().contains("blocked by retained resources"));

    let stored = provisioner.load("demo").await.unwrap().unwrap();
    assert_eq!(stored.template.retained(), err.retained);
    assert_eq!(stored.template.resources.len(), 2);
}
