use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, EncodePublicKey};
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

/// Size of a P-256 private scalar in bytes
pub const PRIVATE_KEY_SIZE: usize = 32;
/// Size of an uncompressed SEC1 P-256 public key in bytes
pub const PUBLIC_KEY_SIZE: usize = 65;

/// Upper bound on scalar redraws before giving up on the entropy source.
/// An out-of-range draw has probability ~2^-32, so hitting this means
/// the source is broken rather than unlucky.
const MAX_SCALAR_DRAWS: usize = 8;

/// Errors that can occur during key operations
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("entropy source failure: {0}")]
    Entropy(String),
    #[error("entropy source produced no valid scalar after {0} draws")]
    ScalarRange(usize),
    #[error("key encoding error: {0}")]
    Encoding(String),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// Single-use P-256 keypair for the recipient side of an HPKE exchange
///
/// One of these is minted for every export and dropped as soon as the
/// response has been opened. Neither `Clone` nor serializable.
///
/// # Examples
///
/// ```ignore
/// let keypair = EphemeralKeyPair::generate()?;
/// // goes into the export request body
/// let recipient = keypair.public_key_spki_base64()?;
/// ```
pub struct EphemeralKeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl std::fmt::Debug for EphemeralKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKeyPair")
            .field("public", &hex::encode(self.public_key_sec1()))
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl EphemeralKeyPair {
    /// Generate a fresh keypair from the operating system's entropy source
    ///
    /// # Errors
    ///
    /// Fails only if the entropy source does.
    pub fn generate() -> Result<Self, KeyError> {
        for _ in 0..MAX_SCALAR_DRAWS {
            let mut bytes = Zeroizing::new([0u8; PRIVATE_KEY_SIZE]);
            getrandom::getrandom(&mut bytes[..]).map_err(|e| KeyError::Entropy(e.to_string()))?;
            // zero and values >= the group order are rejected, redraw
            if let Ok(secret) = SecretKey::from_slice(&bytes[..]) {
                return Ok(Self::from(secret));
            }
        }
        Err(KeyError::ScalarRange(MAX_SCALAR_DRAWS))
    }

    /// Re-import a private key from its base64 PKCS#8 DER encoding
    pub fn from_pkcs8_base64(encoded: &str) -> Result<Self, KeyError> {
        let der = Zeroizing::new(STANDARD.decode(encoded.trim())?);
        let secret = SecretKey::from_pkcs8_der(&der)
            .map_err(|e| KeyError::Encoding(format!("invalid PKCS#8 private key: {}", e)))?;
        Ok(Self::from(secret))
    }

    /// The public half, SPKI DER encoded, as standard base64
    ///
    /// This is the `recipient_public_key` sent to the custody service.
    pub fn public_key_spki_base64(&self) -> Result<String, KeyError> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| KeyError::Encoding(format!("SPKI encoding failed: {}", e)))?;
        Ok(STANDARD.encode(der.as_bytes()))
    }

    /// The private half, PKCS#8 DER encoded, as standard base64
    pub fn secret_key_pkcs8_base64(&self) -> Result<Zeroizing<String>, KeyError> {
        let der = self
            .secret
            .to_pkcs8_der()
            .map_err(|e| KeyError::Encoding(format!("PKCS#8 encoding failed: {}", e)))?;
        Ok(Zeroizing::new(STANDARD.encode(der.as_bytes())))
    }

    /// Uncompressed SEC1 encoding of the public key (`0x04 || X || Y`)
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.public.to_encoded_point(false).as_bytes().to_vec()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }
}

impl From<SecretKey> for EphemeralKeyPair {
    fn from(secret: SecretKey) -> Self {
        let public = secret.public_key();
        Self { secret, public }
    }
}
