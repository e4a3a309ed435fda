//! Mock custody service for export pipeline integration tests
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use p256::pkcs8::DecodePublicKey;
use url::Url;

use common::config::RawExportConfig;
use common::crypto::{
    verify_signature, AuthorizationKey, HpkeSuite, PublicKey, SecretKey, SigningKey, VerifyingKey,
};
use common::export::{
    export_url, ExportRequestBody, ExportRequestDescriptor, ExportResponse, APP_ID_HEADER,
    REQUEST_EXPIRY_HEADER, SIGNATURE_HEADER,
};

pub const APP_ID: &str = "test-app";
pub const APP_SECRET: &str = "test-secret";
pub const AUTHORIZATION_KEY_ID: &str = "auth-key-1";

/// The wallet key the mock custody service holds
pub const FIXTURE_KEY_HEX: &str =
    "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn fixture_key() -> Vec<u8> {
    hex::decode(FIXTURE_KEY_HEX).unwrap()
}

/// The authorization key registered with the mock custody service
pub fn authorization_key() -> AuthorizationKey {
    authorization_key_from(0x42)
}

/// An authorization key the mock custody service has never seen
pub fn unregistered_authorization_key() -> AuthorizationKey {
    authorization_key_from(0x24)
}

fn authorization_key_from(byte: u8) -> AuthorizationKey {
    let secret = SecretKey::from_slice(&[byte; 32]).unwrap();
    AuthorizationKey::from((AUTHORIZATION_KEY_ID.to_string(), SigningKey::from(&secret)))
}

/// Complete raw config pointed at `api_url`
pub fn config_for(api_url: &Url) -> RawExportConfig {
    RawExportConfig {
        app_id: Some(APP_ID.to_string()),
        app_secret: Some(APP_SECRET.to_string()),
        authorization_key_id: Some(AUTHORIZATION_KEY_ID.to_string()),
        authorization_private_key: Some(authorization_key().to_encoded().unwrap().to_string()),
        api_url: Some(api_url.to_string()),
        ..Default::default()
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// How the mock answers export requests
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Seal these bytes to the requested recipient key
    Seal(Vec<u8>),
    /// Seal the fixture key, then flip a ciphertext byte
    TamperCiphertext,
    /// Respond with this status and body
    Status(StatusCode, String),
    /// 200 with a body that isn't an export response
    Garbage,
    /// Hold the first request this long, then seal the fixture key to every
    /// request after it
    StallFirst(Duration),
}

/// One export request as the mock received it
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub wallet_id: String,
    pub body: String,
    pub recipient_public_key: Option<String>,
    pub signature: Option<String>,
    pub expiry: Option<String>,
    pub content_type: Option<String>,
    pub basic_auth_valid: bool,
    pub signature_valid: bool,
}

#[derive(Clone)]
struct MockState {
    base_url: Url,
    verifying_key: VerifyingKey,
    behavior: Behavior,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

pub struct MockCustody {
    pub url: Url,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockCustody {
    /// Start a mock custody service on an ephemeral local port
    pub async fn spawn(behavior: Behavior) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = Url::parse(&format!("http://{}", listener.local_addr().unwrap())).unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let state = MockState {
            base_url: url.clone(),
            verifying_key: authorization_key().verifying_key(),
            behavior,
            requests: requests.clone(),
        };
        let router = Router::new()
            .route("/v1/wallets/:wallet_id/export", post(export_handler))
            .with_state(state);

        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self { url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn header_str(headers: &HeaderMap, name: impl http::header::AsHeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Recompute the canonical payload from what arrived on the wire and check
/// the signature against the registered authorization key
fn signature_valid(
    state: &MockState,
    wallet_id: &str,
    headers: &HeaderMap,
    body: Option<&ExportRequestBody>,
    signature: Option<&str>,
) -> bool {
    let (Some(body), Some(signature)) = (body, signature) else {
        return false;
    };
    let Ok(url) = export_url(&state.base_url, wallet_id) else {
        return false;
    };
    let mut signed_headers = Vec::new();
    for name in [APP_ID_HEADER, REQUEST_EXPIRY_HEADER] {
        if let Some(value) = header_str(headers, name) {
            signed_headers.push((name, value));
        }
    }
    let descriptor = ExportRequestDescriptor::new(Method::POST, url, signed_headers, body.clone());
    match descriptor.canonical_payload() {
        Ok(payload) => verify_signature(&state.verifying_key, &payload, signature).is_ok(),
        Err(_) => false,
    }
}

async fn export_handler(
    State(state): State<MockState>,
    Path(wallet_id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let parsed: Option<ExportRequestBody> = serde_json::from_slice(&body).ok();
    let signature = header_str(&headers, SIGNATURE_HEADER);
    let expected_auth = format!(
        "Basic {}",
        STANDARD.encode(format!("{}:{}", APP_ID, APP_SECRET))
    );

    let record = RecordedRequest {
        wallet_id: wallet_id.clone(),
        body: String::from_utf8_lossy(&body).to_string(),
        recipient_public_key: parsed.as_ref().map(|b| b.recipient_public_key.clone()),
        signature: signature.clone(),
        expiry: header_str(&headers, REQUEST_EXPIRY_HEADER),
        content_type: header_str(&headers, CONTENT_TYPE),
        basic_auth_valid: header_str(&headers, AUTHORIZATION).as_deref()
            == Some(expected_auth.as_str()),
        signature_valid: signature_valid(
            &state,
            &wallet_id,
            &headers,
            parsed.as_ref(),
            signature.as_deref(),
        ),
    };
    let seen = {
        let mut requests = state.requests.lock().unwrap();
        requests.push(record.clone());
        requests.len()
    };

    if !record.basic_auth_valid {
        return (StatusCode::UNAUTHORIZED, "invalid app credentials").into_response();
    }
    if !record.signature_valid {
        return (StatusCode::UNAUTHORIZED, "invalid authorization signature").into_response();
    }
    let Some(body) = parsed else {
        return (StatusCode::BAD_REQUEST, "invalid body").into_response();
    };

    let plaintext = match &state.behavior {
        Behavior::Status(status, body) => return (*status, body.clone()).into_response(),
        Behavior::Garbage => return (StatusCode::OK, "definitely not json").into_response(),
        Behavior::Seal(plaintext) => plaintext.clone(),
        Behavior::TamperCiphertext => fixture_key(),
        Behavior::StallFirst(stall) => {
            if seen == 1 {
                tokio::time::sleep(*stall).await;
                return (StatusCode::SERVICE_UNAVAILABLE, "stalled").into_response();
            }
            fixture_key()
        }
    };

    let der = STANDARD.decode(&body.recipient_public_key).unwrap();
    let recipient = PublicKey::from_public_key_der(&der).unwrap();
    let (enc, mut ciphertext) = HpkeSuite.seal(&recipient, b"", b"", &plaintext).unwrap();
    if matches!(state.behavior, Behavior::TamperCiphertext) {
        ciphertext[0] ^= 0x01;
    }

    Json(ExportResponse {
        encapsulated_key: STANDARD.encode(enc),
        ciphertext: STANDARD.encode(ciphertext),
    })
    .into_response()
}
