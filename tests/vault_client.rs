//! `VaultClient` against a mock Vault `sys/` API served on a random port.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use axum::{Json, Router};
use sealkeeper::config::VaultConfig;
use sealkeeper::vault::{RekeyInit, RekeyProgress, SealResource, VaultClient, VaultError};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const TOKEN: &str = "s.test-token";
const THRESHOLD: u32 = 2;

#[derive(Debug, Default)]
struct MockVault {
    sealed: bool,
    unseal_keys: Vec<String>,
    rekey_nonce: Option<String>,
    rekey_shares: u32,
    rekey_threshold: u32,
    rekey_keys: Vec<String>,
    cancels: u32,
}

type Shared = Arc<Mutex<MockVault>>;

fn vault_error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "errors": [message] }))).into_response()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("X-Vault-Token")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == TOKEN)
}

async fn health(State(state): State<Shared>) -> Response {
    let vault = state.lock().unwrap();
    let status = if vault.sealed {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let body = json!({
        "initialized": true,
        "sealed": vault.sealed,
        "standby": false,
        "version": "1.15.2",
        "cluster_name": "mock"
    });
    (status, Json(body)).into_response()
}

#[derive(Deserialize)]
struct KeyBody {
    key: String,
    #[serde(default)]
    nonce: Option<String>,
}

async fn unseal(State(state): State<Shared>, Json(body): Json<KeyBody>) -> Response {
    let mut vault = state.lock().unwrap();
    if body.key.starts_with("bad") {
        return vault_error(StatusCode::BAD_REQUEST, "invalid key");
    }
    vault.unseal_keys.push(body.key);
    if vault.unseal_keys.len() as u32 >= THRESHOLD {
        vault.sealed = false;
    }
    Json(json!({
        "sealed": vault.sealed,
        "t": THRESHOLD,
        "n": 3,
        "progress": vault.unseal_keys.len()
    }))
    .into_response()
}

fn rekey_status_body(vault: &MockVault) -> serde_json::Value {
    json!({
        "nonce": vault.rekey_nonce.clone().unwrap_or_default(),
        "started": vault.rekey_nonce.is_some(),
        "t": vault.rekey_threshold,
        "n": vault.rekey_shares,
        "progress": vault.rekey_keys.len(),
        "required": THRESHOLD,
        "verification_required": false
    })
}

async fn rekey_status(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    Json(rekey_status_body(&state.lock().unwrap())).into_response()
}

#[derive(Deserialize)]
struct InitBody {
    secret_shares: u32,
    secret_threshold: u32,
}

async fn rekey_init(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<InitBody>,
) -> Response {
    if !authorized(&headers) {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    let mut vault = state.lock().unwrap();
    if vault.rekey_nonce.is_some() {
        return vault_error(StatusCode::BAD_REQUEST, "rekey already in progress");
    }
    if body.secret_threshold > body.secret_shares {
        return vault_error(StatusCode::BAD_REQUEST, "invalid seal configuration");
    }
    vault.rekey_nonce = Some("2dbd10f1-8528-6246-09e7-82b25b8aba63".to_string());
    vault.rekey_shares = body.secret_shares;
    vault.rekey_threshold = body.secret_threshold;
    vault.rekey_keys.clear();
    Json(rekey_status_body(&vault)).into_response()
}

async fn rekey_cancel(State(state): State<Shared>, headers: HeaderMap) -> Response {
    if !authorized(&headers) {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    let mut vault = state.lock().unwrap();
    vault.cancels += 1;
    vault.rekey_nonce = None;
    vault.rekey_keys.clear();
    StatusCode::NO_CONTENT.into_response()
}

async fn rekey_update(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<KeyBody>,
) -> Response {
    if !authorized(&headers) {
        return vault_error(StatusCode::FORBIDDEN, "permission denied");
    }
    let mut vault = state.lock().unwrap();
    let Some(nonce) = vault.rekey_nonce.clone() else {
        return vault_error(StatusCode::BAD_REQUEST, "no rekey in progress");
    };
    if body.nonce.as_deref() != Some(nonce.as_str()) {
        return vault_error(StatusCode::BAD_REQUEST, "incorrect nonce supplied");
    }
    vault.rekey_keys.push(body.key);

    if vault.rekey_keys.len() as u32 >= THRESHOLD {
        let keys: Vec<String> = (0..vault.rekey_shares).map(|i| format!("{:064x}", i + 1)).collect();
        let keys_base64: Vec<String> = keys.iter().map(|k| format!("b64-{}", &k[56..])).collect();
        vault.rekey_nonce = None;
        return Json(json!({
            "nonce": nonce,
            "complete": true,
            "keys": keys,
            "keys_base64": keys_base64,
            "backup": false
        }))
        .into_response();
    }

    Json(json!({
        "nonce": nonce,
        "complete": false,
        "progress": vault.rekey_keys.len(),
        "required": THRESHOLD
    }))
    .into_response()
}

struct MockServer {
    state: Shared,
    url: String,
    _task: tokio::task::JoinHandle<()>,
}

impl MockServer {
    async fn start(sealed: bool) -> Self {
        let state: Shared = Arc::new(Mutex::new(MockVault {
            sealed,
            ..Default::default()
        }));

        let app = Router::new()
            .route("/v1/sys/health", get(health))
            .route("/v1/sys/unseal", put(unseal))
            .route(
                "/v1/sys/rekey/init",
                get(rekey_status).post(rekey_init).delete(rekey_cancel),
            )
            .route("/v1/sys/rekey/update", axum::routing::post(rekey_update))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            state,
            url: format!("http://{}", addr),
            _task: task,
        }
    }

    fn client(&self, token: &str) -> VaultClient {
        let config = VaultConfig {
            url: self.url.clone(),
            timeout_secs: 5,
        };
        VaultClient::new(&config, token.to_string()).unwrap()
    }
}

#[tokio::test]
async fn test_health_reads_sealed_body_from_503() {
    let server = MockServer::start(true).await;
    let health = server.client(TOKEN).health().await.unwrap();
    assert!(health.initialized);
    assert!(health.sealed);
}

#[tokio::test]
async fn test_unseal_submits_every_share() {
    let server = MockServer::start(true).await;
    let client = server.client(TOKEN);

    client
        .unseal(&["share-one-aaaaaaaaaa".to_string(), "share-two-bbbbbbbbbb".to_string()])
        .await
        .unwrap();

    assert_eq!(server.state.lock().unwrap().unseal_keys.len(), 2);
    assert!(!client.health().await.unwrap().sealed);
}

#[tokio::test]
async fn test_unseal_stops_at_rejected_share() {
    let server = MockServer::start(true).await;
    let err = server
        .client(TOKEN)
        .unseal(&[
            "share-one-aaaaaaaaaa".to_string(),
            "bad-share-cccccccccc".to_string(),
            "share-three-dddddddd".to_string(),
        ])
        .await
        .unwrap_err();

    match err {
        VaultError::Status { status, message } => {
            assert_eq!(status, 400);
            assert_eq!(message, "invalid key");
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(server.state.lock().unwrap().unseal_keys.len(), 1);
}

#[tokio::test]
async fn test_rekey_handshake() {
    let server = MockServer::start(false).await;
    let client = server.client(TOKEN);

    assert!(!client.rekey_status().await.unwrap().started);

    let nonce = match client.rekey_init(3, 2).await.unwrap() {
        RekeyInit::Started { nonce } => nonce,
        other => panic!("unexpected: {:?}", other),
    };
    let status = client.rekey_status().await.unwrap();
    assert!(status.started);
    assert_eq!(status.nonce, nonce);

    match client.rekey_update("old-share-1", &nonce).await.unwrap() {
        RekeyProgress::Pending { progress, required } => {
            assert_eq!(progress, 1);
            assert_eq!(required, 2);
        }
        other => panic!("unexpected: {:?}", other),
    }

    match client.rekey_update("old-share-2", &nonce).await.unwrap() {
        RekeyProgress::Complete(shares) => {
            assert_eq!(shares.len(), 3);
            assert_eq!(shares.keys_base64.len(), 3);
            assert_eq!(shares.keys[0], format!("{:064x}", 1));
        }
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_rekey_already_in_progress_is_typed() {
    let server = MockServer::start(false).await;
    let client = server.client(TOKEN);

    assert!(matches!(
        client.rekey_init(3, 2).await.unwrap(),
        RekeyInit::Started { .. }
    ));
    assert_eq!(
        client.rekey_init(3, 2).await.unwrap(),
        RekeyInit::AlreadyInProgress
    );
}

#[tokio::test]
async fn test_rekey_init_rejections() {
    let server = MockServer::start(false).await;

    match server.client("wrong-token").rekey_init(3, 2).await.unwrap() {
        RekeyInit::Rejected(reason) => assert_eq!(reason, "permission denied"),
        other => panic!("unexpected: {:?}", other),
    }
    match server.client(TOKEN).rekey_init(2, 3).await.unwrap() {
        RekeyInit::Rejected(reason) => assert_eq!(reason, "invalid seal configuration"),
        other => panic!("unexpected: {:?}", other),
    }
}

#[tokio::test]
async fn test_rekey_update_with_wrong_nonce_fails() {
    let server = MockServer::start(false).await;
    let client = server.client(TOKEN);
    client.rekey_init(3, 2).await.unwrap();

    let err = client.rekey_update("old-share-1", "stale").await.unwrap_err();
    assert!(matches!(err, VaultError::Status { status: 400, .. }));
}

#[tokio::test]
async fn test_rekey_cancel() {
    let server = MockServer::start(false).await;
    let client = server.client(TOKEN);
    client.rekey_init(3, 2).await.unwrap();

    client.rekey_cancel().await.unwrap();
    assert_eq!(server.state.lock().unwrap().cancels, 1);
    assert!(!client.rekey_status().await.unwrap().started);
}

#[tokio::test]
async fn test_unreachable_vault() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = VaultConfig {
        url: format!("http://{}", addr),
        timeout_secs: 2,
    };
    let client = VaultClient::new(&config, TOKEN.to_string()).unwrap();
    assert!(matches!(client.health().await, Err(VaultError::Http(_))));
}
