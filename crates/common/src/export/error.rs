use reqwest::StatusCode;

use super::client::ClientError;
use super::request::RequestError;
use crate::config::ConfigError;
use crate::crypto::{HpkeError, KeyError, SignatureError};
use crate::key_material::KeyMaterialError;

/// Everything that can go wrong during one export, tagged by stage
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("export request could not be built: {0}")]
    Request(#[from] RequestError),
    #[error("ephemeral key generation failed: {0}")]
    KeyGen(#[from] KeyError),
    #[error("recipient private key is unusable: {0}")]
    RecipientKey(KeyError),
    #[error("authorization signature failed: {0}")]
    Signature(#[from] SignatureError),
    #[error("custody service rejected the export with status {status}: {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("custody service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed export response: {0}")]
    MalformedResponse(String),
    #[error("export response could not be decrypted: {0}")]
    Decryption(#[from] HpkeError),
    #[error("decrypted key could not be formatted: {0}")]
    Format(#[from] KeyMaterialError),
}

impl ExportError {
    /// Whether a fresh run of the whole pipeline might succeed
    ///
    /// True for network failures, 5xx and 429. Everything else fails the same
    /// way on every attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            ExportError::Transport(_) => true,
            ExportError::Rejected { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }
}

impl From<ClientError> for ExportError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Reqwest(e) => ExportError::Transport(e),
            ClientError::HttpStatus(status, body) => ExportError::Rejected { status, body },
            ClientError::Decode(e) => ExportError::MalformedResponse(e.to_string()),
            ClientError::Body(e) => ExportError::Signature(e),
        }
    }
}

impl From<base64::DecodeError> for ExportError {
    fn from(error: base64::DecodeError) -> Self {
        ExportError::MalformedResponse(format!("invalid base64: {}", error))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn rejected(status: u16) -> ExportError {
        ExportError::from(ClientError::HttpStatus(
            StatusCode::from_u16(status).unwrap(),
            "nope".to_string(),
        ))
    }

    #[test]
    fn test_retry_guidance() {
        assert!(rejected(500).is_retryable());
        assert!(rejected(503).is_retryable());
        assert!(rejected(429).is_retryable());
        assert!(!rejected(400).is_retryable());
        assert!(!rejected(401).is_retryable());
        assert!(!rejected(404).is_retryable());

        assert!(!ExportError::from(HpkeError::Open).is_retryable());
        assert!(!ExportError::from(ConfigError::Missing("app_id")).is_retryable());
        assert!(!ExportError::MalformedResponse("x".to_string()).is_retryable());
    }

    #[test]
    fn test_rejected_keeps_body() {
        match rejected(403) {
            ExportError::Rejected { status, body } => {
                assert_eq!(status, StatusCode::FORBIDDEN);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_decode_errors_are_malformed_responses() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            ExportError::from(ClientError::Decode(json_err)),
            ExportError::MalformedResponse(_)
        ));

        use base64::Engine;
        let b64_err = base64::engine::general_purpose::STANDARD
            .decode("***")
            .unwrap_err();
        assert!(matches!(
            ExportError::from(b64_err),
            ExportError::MalformedResponse(_)
        ));
    }

    #[test]
    fn test_messages_name_the_stage() {
        assert!(rejected(500).to_string().contains("rejected"));
        assert!(ExportError::from(HpkeError::Open)
            .to_string()
            .contains("decrypted"));
        assert!(ExportError::from(KeyMaterialError::Length {
            expected: 32,
            actual: 31
        })
        .to_string()
        .contains("formatted"));
        assert!(
            ExportError::RecipientKey(KeyError::Encoding("bad".to_string()))
                .to_string()
                .contains("recipient")
        );
    }
}
