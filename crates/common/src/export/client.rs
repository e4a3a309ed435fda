use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use url::Url;
use zeroize::Zeroizing;

use super::request::{ExportRequestDescriptor, SIGNATURE_HEADER};
use crate::config::ExportConfig;
use crate::crypto::{AuthorizationSignature, SignatureError};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Reqwest(#[from] reqwest::Error),
    #[error("HTTP status {0}: {1}")]
    HttpStatus(StatusCode, String),
    #[error("response body did not decode: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("request body could not be built: {0}")]
    Body(#[from] SignatureError),
}

/// A request the custody client knows how to send
pub trait ApiRequest {
    type Response: DeserializeOwned;

    fn build_request(self, client: &Client) -> RequestBuilder;
}

/// Response body of a successful export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportResponse {
    /// HPKE `enc`, standard base64
    pub encapsulated_key: String,
    /// HPKE ciphertext of the raw private key, standard base64
    pub ciphertext: String,
}

impl ExportResponse {
    /// Decode both fields, `(encapsulated_key, ciphertext)`
    pub fn decode(&self) -> Result<(Vec<u8>, Vec<u8>), base64::DecodeError> {
        Ok((
            STANDARD.decode(self.encapsulated_key.trim())?,
            STANDARD.decode(self.ciphertext.trim())?,
        ))
    }
}

/// A signed export request, ready to go on the wire
///
/// Carries the exact body bytes that the signature was computed over.
#[derive(Debug)]
pub struct SignedExportRequest<'a> {
    descriptor: &'a ExportRequestDescriptor,
    signature: &'a AuthorizationSignature,
    body: Vec<u8>,
}

impl<'a> SignedExportRequest<'a> {
    pub fn new(
        descriptor: &'a ExportRequestDescriptor,
        signature: &'a AuthorizationSignature,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            descriptor,
            signature,
            body: descriptor.body_bytes()?,
        })
    }
}

impl ApiRequest for SignedExportRequest<'_> {
    type Response = ExportResponse;

    fn build_request(self, client: &Client) -> RequestBuilder {
        let mut builder = client.request(
            self.descriptor.method().clone(),
            self.descriptor.url().clone(),
        );
        for (name, value) in self.descriptor.headers() {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder
            .header(SIGNATURE_HEADER, self.signature.as_str())
            .body(self.body)
    }
}

/// HTTP client for the custody service
///
/// Cheap to clone; clones share one connection pool. Every request carries
/// the app's basic-auth credentials.
#[derive(Clone)]
pub struct CustodyClient {
    remote: Url,
    app_id: String,
    app_secret: Zeroizing<String>,
    client: Client,
}

impl std::fmt::Debug for CustodyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodyClient")
            .field("remote", &self.remote.as_str())
            .field("app_id", &self.app_id)
            .finish_non_exhaustive()
    }
}

impl CustodyClient {
    pub fn new(config: &ExportConfig) -> Result<Self, ClientError> {
        let mut default_headers = HeaderMap::new();
        default_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(default_headers)
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            remote: config.api_url().clone(),
            app_id: config.app_id().to_string(),
            app_secret: Zeroizing::new(config.app_secret().to_string()),
            client,
        })
    }

    /// Send `request`, decoding a 2xx body as `T::Response`
    ///
    /// Anything else comes back as `ClientError::HttpStatus` with the body
    /// verbatim. Nothing is retried here.
    pub async fn call<T: ApiRequest>(&self, request: T) -> Result<T::Response, ClientError> {
        let request_builder = request
            .build_request(&self.client)
            .basic_auth(&self.app_id, Some(self.app_secret.as_str()));
        let response = request_builder.send().await?;

        let status = response.status();
        tracing::debug!(%status, "custody service responded");
        if status.is_success() {
            let bytes = response.bytes().await?;
            Ok(serde_json::from_slice::<T::Response>(&bytes)?)
        } else {
            Err(ClientError::HttpStatus(status, response.text().await?))
        }
    }

    /// Issue a signed export request
    pub async fn export(
        &self,
        descriptor: &ExportRequestDescriptor,
        signature: &AuthorizationSignature,
    ) -> Result<ExportResponse, ClientError> {
        let request = SignedExportRequest::new(descriptor, signature)?;
        self.call(request).await
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::export::request::APP_ID_HEADER;

    #[test]
    fn test_export_response_decode() {
        let response = ExportResponse {
            encapsulated_key: STANDARD.encode([4u8; 65]),
            ciphertext: STANDARD.encode([1u8; 48]),
        };
        let (enc, ct) = response.decode().unwrap();
        assert_eq!(enc, vec![4u8; 65]);
        assert_eq!(ct, vec![1u8; 48]);

        let broken = ExportResponse {
            encapsulated_key: "***".to_string(),
            ciphertext: String::new(),
        };
        assert!(broken.decode().is_err());
    }

    #[test]
    fn test_export_response_wire_names() {
        let response: ExportResponse =
            serde_json::from_str(r#"{"encapsulated_key":"YQ==","ciphertext":"Yg=="}"#).unwrap();
        assert_eq!(response.encapsulated_key, "YQ==");
        assert_eq!(response.ciphertext, "Yg==");
    }

    #[test]
    fn test_signed_request_carries_signature_and_body() {
        let descriptor = ExportRequestDescriptor::wallet_export(
            &Url::parse("https://api.privy.io").unwrap(),
            "w_123",
            "app-1",
            "cGs=",
            None,
        )
        .unwrap();
        let signature = AuthorizationSignature::from_encoded("c2ln");
        let request = SignedExportRequest::new(&descriptor, &signature)
            .unwrap()
            .build_request(&Client::new())
            .build()
            .unwrap();

        assert_eq!(request.method(), &reqwest::Method::POST);
        assert_eq!(
            request.url().as_str(),
            "https://api.privy.io/v1/wallets/w_123/export"
        );
        assert_eq!(request.headers()[APP_ID_HEADER], "app-1");
        assert_eq!(request.headers()[SIGNATURE_HEADER], "c2ln");
        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, descriptor.body_bytes().unwrap().as_slice());
    }
}
