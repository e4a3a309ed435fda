use std::sync::Arc;

use time::OffsetDateTime;
use zeroize::Zeroizing;

use super::client::{CustodyClient, ExportResponse};
use super::error::ExportError;
use super::request::ExportRequestDescriptor;
use crate::config::ExportConfig;
use crate::crypto::{
    AsymmetricSigner, AuthorizationKey, AuthorizationSignature, EphemeralKeyPair, HpkeSuite,
    HybridCipher,
};
use crate::key_material::{format_private_key, ExportedPrivateKey};

/// Exports wallet private keys from the custody service
///
/// Each call to [`Exporter::export_and_decrypt`] runs the full pipeline with
/// its own ephemeral keypair:
///
/// 1. generate a P-256 keypair
/// 2. build the export request around its public key
/// 3. sign the canonical request with the authorization key
/// 4. send it and receive the sealed key
/// 5. open the sealed key and render it as hex
///
/// Clones share the config, signer and HTTP client, all read-only, so an
/// `Exporter` can serve any number of concurrent exports.
///
/// # Examples
///
/// ```ignore
/// let config = RawExportConfig::load(None)?.validate()?;
/// let exporter = Exporter::new(config)?;
/// let key = exporter.export_and_decrypt("w_123").await?;
/// ```
pub struct Exporter<S = AuthorizationKey, C = HpkeSuite> {
    config: Arc<ExportConfig>,
    client: CustodyClient,
    signer: Arc<S>,
    cipher: C,
}

impl<S, C: Clone> Clone for Exporter<S, C> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            client: self.client.clone(),
            signer: self.signer.clone(),
            cipher: self.cipher.clone(),
        }
    }
}

impl<S, C> std::fmt::Debug for Exporter<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("config", &self.config)
            .field("client", &self.client)
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Exporter signing with the configured authorization key and opening
    /// responses with [`HpkeSuite`]
    pub fn new(config: ExportConfig) -> Result<Self, ExportError> {
        let signer = config.authorization_key().clone();
        Self::with_parts(config, signer, HpkeSuite)
    }
}

impl<S, C> Exporter<S, C>
where
    S: AsymmetricSigner,
    C: HybridCipher,
{
    pub fn with_parts(config: ExportConfig, signer: S, cipher: C) -> Result<Self, ExportError> {
        let client = CustodyClient::new(&config).map_err(ExportError::from)?;
        Ok(Self {
            config: Arc::new(config),
            client,
            signer: Arc::new(signer),
            cipher,
        })
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    /// Export the private key of `wallet_id`
    ///
    /// Nothing is retried. On any error the caller may start over with
    /// another call, which always uses a fresh keypair; see
    /// [`ExportError::is_retryable`]. To resend the same signed request
    /// instead, drive [`Exporter::prepare`] and [`Exporter::send`] directly.
    ///
    /// The returned key is as sensitive as it gets. It is never logged here.
    #[tracing::instrument(skip(self), fields(api = %self.config.api_url()))]
    pub async fn export_and_decrypt(
        &self,
        wallet_id: &str,
    ) -> Result<ExportedPrivateKey, ExportError> {
        let prepared = self.prepare(wallet_id)?;
        self.send(&prepared).await
    }

    /// Mint a recipient keypair and build and sign the export request,
    /// without touching the network
    pub fn prepare(&self, wallet_id: &str) -> Result<PreparedExport, ExportError> {
        let keypair = EphemeralKeyPair::generate()?;
        let recipient_public_key = keypair.public_key_spki_base64()?;
        let recipient_key = keypair.secret_key_pkcs8_base64()?;
        drop(keypair);

        let descriptor = ExportRequestDescriptor::wallet_export(
            self.config.api_url(),
            wallet_id,
            self.config.app_id(),
            recipient_public_key,
            self.request_expiry(),
        )?;
        let signature = descriptor.sign(self.signer.as_ref())?;
        Ok(PreparedExport {
            descriptor,
            signature,
            recipient_key,
        })
    }

    /// Send a prepared request and open the response
    ///
    /// The same `PreparedExport` may be sent again after a transport
    /// failure: the response is sealed to the same recipient key. Once the
    /// signed expiry has passed the service rejects it, so prepare a new one.
    pub async fn send(&self, prepared: &PreparedExport) -> Result<ExportedPrivateKey, ExportError> {
        tracing::info!("requesting key export");
        let response = self
            .client
            .export(&prepared.descriptor, &prepared.signature)
            .await?;
        tracing::debug!(
            encapsulated_key_len = response.encapsulated_key.len(),
            ciphertext_len = response.ciphertext.len(),
            "received sealed key"
        );

        let key = decrypt_export_response(&self.cipher, &prepared.recipient_key, &response)?;
        tracing::info!("key export complete");
        Ok(key)
    }

    /// `privy-request-expiry` in unix milliseconds, when a TTL is configured
    fn request_expiry(&self) -> Option<i128> {
        self.config.request_ttl().map(|ttl| {
            let expires_at = OffsetDateTime::now_utc() + ttl;
            expires_at.unix_timestamp_nanos() / 1_000_000
        })
    }
}

/// A signed export request together with the key its response is sealed to
pub struct PreparedExport {
    descriptor: ExportRequestDescriptor,
    signature: AuthorizationSignature,
    /// PKCS#8 DER of the recipient key, standard base64
    recipient_key: Zeroizing<String>,
}

impl PreparedExport {
    pub fn descriptor(&self) -> &ExportRequestDescriptor {
        &self.descriptor
    }

    pub fn signature(&self) -> &AuthorizationSignature {
        &self.signature
    }
}

impl std::fmt::Debug for PreparedExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedExport")
            .field("descriptor", &self.descriptor)
            .field("signature", &self.signature)
            .field("recipient_key", &"<redacted>")
            .finish()
    }
}

/// Open an export response with the recipient's base64 PKCS#8 private key
/// and render the plaintext as a hex private key
///
/// All or nothing: a bad encoding, a failed tag or a plaintext of the wrong
/// size is an error, never a partial key.
pub fn decrypt_export_response<C>(
    cipher: &C,
    recipient_private_key: &str,
    response: &ExportResponse,
) -> Result<ExportedPrivateKey, ExportError>
where
    C: HybridCipher + ?Sized,
{
    let recipient = EphemeralKeyPair::from_pkcs8_base64(recipient_private_key)
        .map_err(ExportError::RecipientKey)?;
    let (encapsulated_key, ciphertext) = response.decode()?;
    let plaintext: Zeroizing<Vec<u8>> =
        cipher.decrypt(recipient.secret_key(), &encapsulated_key, &ciphertext)?;
    tracing::debug!(plaintext_len = plaintext.len(), "opened sealed key");
    Ok(format_private_key(&plaintext)?)
}
