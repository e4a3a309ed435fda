use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use url::Url;

use crate::crypto::{AsymmetricSigner, AuthorizationSignature, SignatureError};

pub const APP_ID_HEADER: &str = "privy-app-id";
pub const SIGNATURE_HEADER: &str = "privy-authorization-signature";
pub const REQUEST_EXPIRY_HEADER: &str = "privy-request-expiry";

/// The only encryption scheme this client speaks
pub const ENCRYPTION_TYPE_HPKE: &str = "HPKE";

/// Version of the canonical authorization payload
pub const SIGNATURE_VERSION: u32 = 1;

/// Headers that must be present and are always covered by the signature
const REQUIRED_SIGNED_HEADERS: [&str; 1] = [APP_ID_HEADER];
/// Headers covered by the signature when present
const OPTIONAL_SIGNED_HEADERS: [&str; 1] = [REQUEST_EXPIRY_HEADER];

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("invalid wallet id `{0}`")]
    InvalidWalletId(String),
    #[error("custody API url cannot be used as a base: {0}")]
    InvalidBaseUrl(Url),
}

/// JSON body of an export request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequestBody {
    pub encryption_type: String,
    /// SPKI DER of the ephemeral recipient key, standard base64
    pub recipient_public_key: String,
}

impl ExportRequestBody {
    pub fn hpke(recipient_public_key: impl Into<String>) -> Self {
        Self {
            encryption_type: ENCRYPTION_TYPE_HPKE.to_string(),
            recipient_public_key: recipient_public_key.into(),
        }
    }
}

/// Everything about a pending export request that the signature covers
///
/// Header names are stored lowercased and sorted, so two descriptors built
/// from the same headers in a different order are equal and serialize
/// identically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRequestDescriptor {
    method: Method,
    url: Url,
    headers: BTreeMap<String, String>,
    body: ExportRequestBody,
}

impl ExportRequestDescriptor {
    pub fn new<I, K, V>(method: Method, url: Url, headers: I, body: ExportRequestBody) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let headers = headers
            .into_iter()
            .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
            .collect();
        Self {
            method,
            url,
            headers,
            body,
        }
    }

    /// Descriptor for `POST {base}/v1/wallets/{wallet_id}/export`
    ///
    /// `expires_at_ms`, when given, becomes the signed `privy-request-expiry`
    /// header (unix milliseconds).
    pub fn wallet_export(
        api_url: &Url,
        wallet_id: &str,
        app_id: &str,
        recipient_public_key: impl Into<String>,
        expires_at_ms: Option<i128>,
    ) -> Result<Self, RequestError> {
        let url = export_url(api_url, wallet_id)?;
        let mut headers = vec![(APP_ID_HEADER, app_id.to_string())];
        if let Some(expiry) = expires_at_ms {
            headers.push((REQUEST_EXPIRY_HEADER, expiry.to_string()));
        }
        Ok(Self::new(
            Method::POST,
            url,
            headers,
            ExportRequestBody::hpke(recipient_public_key),
        ))
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn body(&self) -> &ExportRequestBody {
        &self.body
    }

    /// The request body exactly as it goes on the wire
    pub fn body_bytes(&self) -> Result<Vec<u8>, SignatureError> {
        let body = serde_json::to_value(&self.body)?;
        Ok(serde_json::to_vec(&canonicalize(body))?)
    }

    /// Canonical bytes the authorization signature is computed over
    ///
    /// ```text
    /// {"body":{..},"headers":{"privy-app-id":".."},"method":"POST","url":"..","version":1}
    /// ```
    ///
    /// Keys are sorted at every level and there is no whitespace, so the
    /// custody service can rebuild the same bytes from what it receives.
    pub fn canonical_payload(&self) -> Result<Vec<u8>, SignatureError> {
        let mut signed_headers = Map::new();
        for name in REQUIRED_SIGNED_HEADERS {
            let value = self
                .headers
                .get(name)
                .ok_or(SignatureError::MissingHeader(name))?;
            signed_headers.insert(name.to_string(), Value::String(value.clone()));
        }
        for name in OPTIONAL_SIGNED_HEADERS {
            if let Some(value) = self.headers.get(name) {
                signed_headers.insert(name.to_string(), Value::String(value.clone()));
            }
        }

        let payload = json!({
            "version": SIGNATURE_VERSION,
            "method": self.method.as_str(),
            "url": self.url.as_str(),
            "body": serde_json::to_value(&self.body)?,
            "headers": Value::Object(signed_headers),
        });
        Ok(serde_json::to_vec(&canonicalize(payload))?)
    }

    /// Sign the canonical payload
    pub fn sign<S>(&self, signer: &S) -> Result<AuthorizationSignature, SignatureError>
    where
        S: AsymmetricSigner + ?Sized,
    {
        let payload = self.canonical_payload()?;
        signer.sign(&payload)
    }
}

/// Build `{base}/v1/wallets/{wallet_id}/export`, percent-encoding the id
///
/// `.` and `..` are rejected along with empty ids and ids containing `/`:
/// path segment normalization would drop them and leave the id out of the
/// signed URL.
pub fn export_url(api_url: &Url, wallet_id: &str) -> Result<Url, RequestError> {
    let wallet_id = wallet_id.trim();
    if wallet_id.is_empty() || wallet_id.contains('/') || matches!(wallet_id, "." | "..") {
        return Err(RequestError::InvalidWalletId(wallet_id.to_string()));
    }
    let mut url = api_url.clone();
    url.path_segments_mut()
        .map_err(|_| RequestError::InvalidBaseUrl(api_url.clone()))?
        .pop_if_empty()
        .extend(["v1", "wallets", wallet_id, "export"]);
    Ok(url)
}

/// Rebuild `value` with object keys in sorted order at every depth
///
/// `serde_json::Map` only sorts when the `preserve_order` feature is off;
/// rebuilding through a `BTreeMap` keeps the output stable either way.
fn canonicalize(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .into_iter()
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(canonicalize).collect()),
        other => other,
    }
}
