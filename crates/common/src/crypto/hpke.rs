//! Hybrid public-key encryption (RFC 9180), base mode, one fixed suite
//!
//! The custody service seals exported key material to a recipient public key
//! we mint for that single export. This module implements exactly the suite
//! both sides agree on out of band:
//!
//! - **KEM**: DHKEM(P-256, HKDF-SHA256)
//! - **KDF**: HKDF-SHA256
//! - **AEAD**: ChaCha20-Poly1305
//!
//! # Protocol Overview
//!
//! The sender:
//! 1. **Encapsulate**: generate an ephemeral P-256 keypair, compute ECDH with
//!    the recipient key and derive a 32-byte shared secret
//! 2. **Key schedule**: derive the AEAD key and base nonce from the shared secret
//! 3. **Seal**: encrypt the plaintext, emitting `enc` (the ephemeral public key)
//!    alongside the ciphertext
//!
//! The recipient:
//! 1. **Decapsulate**: ECDH between its private key and `enc` recovers the
//!    same shared secret
//! 2. **Key schedule**: identical to the sender's
//! 3. **Open**: authenticated decryption; any tampering fails the tag check
//!    and nothing is returned
//!
//! Nothing about the suite is negotiable. A mismatch on either side shows up
//! as an authentication failure on open.

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use hkdf::Hkdf;
use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use p256::{PublicKey, SecretKey};
use sha2::Sha256;
use zeroize::Zeroizing;

use super::keys::{EphemeralKeyPair, KeyError, PUBLIC_KEY_SIZE};

/// DHKEM(P-256, HKDF-SHA256)
pub const KEM_ID: u16 = 0x0010;
/// HKDF-SHA256
pub const KDF_ID: u16 = 0x0001;
/// ChaCha20-Poly1305
pub const AEAD_ID: u16 = 0x0003;

/// Size of the encapsulated key (`enc`): an uncompressed SEC1 point
pub const ENCAPSULATED_KEY_SIZE: usize = PUBLIC_KEY_SIZE;
/// Size of the Poly1305 tag appended to every ciphertext
pub const TAG_SIZE: usize = 16;

const SHARED_SECRET_SIZE: usize = 32;
const EXTRACT_SIZE: usize = 32;
const AEAD_KEY_SIZE: usize = 32;
const AEAD_NONCE_SIZE: usize = 12;

const MODE_BASE: u8 = 0x00;
const VERSION_LABEL: &[u8] = b"HPKE-v1";

/// Errors that can occur while sealing or opening
#[derive(Debug, thiserror::Error)]
pub enum HpkeError {
    #[error("invalid encapsulated key: {0}")]
    EncapsulatedKey(String),
    #[error("key derivation failed: {0}")]
    Kdf(&'static str),
    #[error("ciphertext failed authentication")]
    Open,
    #[error("AEAD seal failed")]
    Seal,
    #[error("message sequence number exhausted")]
    SequenceOverflow,
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

/// Recipient-side hybrid decryption
///
/// Implementations are bound to a single algorithm suite; callers never pick
/// algorithms, they only supply key material.
pub trait HybridCipher: Send + Sync {
    /// Decapsulate `encapsulated_key` with `recipient` and open `ciphertext`.
    ///
    /// Either the whole plaintext comes back or an error does.
    fn decrypt(
        &self,
        recipient: &SecretKey,
        encapsulated_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, HpkeError>;
}

/// The DHKEM(P-256) / HKDF-SHA256 / ChaCha20-Poly1305 suite
///
/// # Examples
///
/// ```ignore
/// let recipient = EphemeralKeyPair::generate()?;
/// let (enc, ct) = HpkeSuite.seal(recipient.public_key(), b"", b"", b"hello")?;
/// let pt = HpkeSuite.open(recipient.secret_key(), &enc, b"", b"", &ct)?;
/// assert_eq!(&pt[..], b"hello");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HpkeSuite;

impl HpkeSuite {
    /// Seal `plaintext` to `recipient` with a freshly generated sender key
    ///
    /// Returns `(enc, ciphertext)`.
    pub fn seal(
        &self,
        recipient: &PublicKey,
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), HpkeError> {
        let sender = EphemeralKeyPair::generate()?;
        self.seal_with_sender(recipient, sender.secret_key(), info, aad, plaintext)
    }

    /// Seal with a caller-provided sender key. Only useful for fixtures:
    /// reusing a sender key across messages breaks the KEM's guarantees.
    pub(crate) fn seal_with_sender(
        &self,
        recipient: &PublicKey,
        sender: &SecretKey,
        info: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<(Vec<u8>, Vec<u8>), HpkeError> {
        let (shared_secret, enc) = encap(recipient, sender)?;
        let mut context = Context::key_schedule_base(&shared_secret[..], info)?;
        let ciphertext = context.seal(aad, plaintext)?;
        Ok((enc, ciphertext))
    }

    /// Open a single-shot ciphertext addressed to `recipient`
    pub fn open(
        &self,
        recipient: &SecretKey,
        encapsulated_key: &[u8],
        info: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, HpkeError> {
        let shared_secret = decap(encapsulated_key, recipient)?;
        let mut context = Context::key_schedule_base(&shared_secret[..], info)?;
        context.open(aad, ciphertext)
    }
}

impl HybridCipher for HpkeSuite {
    fn decrypt(
        &self,
        recipient: &SecretKey,
        encapsulated_key: &[u8],
        ciphertext: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, HpkeError> {
        // exports carry neither info nor associated data
        self.open(recipient, encapsulated_key, b"", b"", ciphertext)
    }
}

/// `"KEM" || I2OSP(kem_id, 2)`
fn kem_suite_id() -> [u8; 5] {
    let mut id = [0u8; 5];
    id[..3].copy_from_slice(b"KEM");
    id[3..].copy_from_slice(&KEM_ID.to_be_bytes());
    id
}

/// `"HPKE" || I2OSP(kem_id, 2) || I2OSP(kdf_id, 2) || I2OSP(aead_id, 2)`
fn hpke_suite_id() -> [u8; 10] {
    let mut id = [0u8; 10];
    id[..4].copy_from_slice(b"HPKE");
    id[4..6].copy_from_slice(&KEM_ID.to_be_bytes());
    id[6..8].copy_from_slice(&KDF_ID.to_be_bytes());
    id[8..].copy_from_slice(&AEAD_ID.to_be_bytes());
    id
}

fn labeled_extract(
    suite_id: &[u8],
    salt: &[u8],
    label: &[u8],
    ikm: &[u8],
) -> Zeroizing<[u8; EXTRACT_SIZE]> {
    let mut labeled_ikm = Zeroizing::new(Vec::with_capacity(
        VERSION_LABEL.len() + suite_id.len() + label.len() + ikm.len(),
    ));
    labeled_ikm.extend_from_slice(VERSION_LABEL);
    labeled_ikm.extend_from_slice(suite_id);
    labeled_ikm.extend_from_slice(label);
    labeled_ikm.extend_from_slice(ikm);

    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), &labeled_ikm);
    let mut out = Zeroizing::new([0u8; EXTRACT_SIZE]);
    out.copy_from_slice(&prk);
    out
}

fn labeled_expand(
    suite_id: &[u8],
    prk: &[u8],
    label: &[u8],
    info: &[u8],
    okm: &mut [u8],
) -> Result<(), HpkeError> {
    let length = u16::try_from(okm.len())
        .map_err(|_| HpkeError::Kdf("requested output too long"))?
        .to_be_bytes();
    let hkdf = Hkdf::<Sha256>::from_prk(prk).map_err(|_| HpkeError::Kdf("invalid PRK length"))?;
    hkdf.expand_multi_info(&[&length[..], VERSION_LABEL, suite_id, label, info], okm)
        .map_err(|_| HpkeError::Kdf("HKDF expand failed"))
}

fn extract_and_expand(
    dh: &[u8],
    kem_context: &[u8],
) -> Result<Zeroizing<[u8; SHARED_SECRET_SIZE]>, HpkeError> {
    let suite_id = kem_suite_id();
    let eae_prk = labeled_extract(&suite_id, b"", b"eae_prk", dh);
    let mut shared_secret = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    labeled_expand(
        &suite_id,
        &eae_prk[..],
        b"shared_secret",
        kem_context,
        &mut shared_secret[..],
    )?;
    Ok(shared_secret)
}

fn serialize_public_key(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(false).as_bytes().to_vec()
}

fn encap(
    recipient: &PublicKey,
    sender: &SecretKey,
) -> Result<(Zeroizing<[u8; SHARED_SECRET_SIZE]>, Vec<u8>), HpkeError> {
    let dh = diffie_hellman(sender.to_nonzero_scalar(), recipient.as_affine());
    let enc = serialize_public_key(&sender.public_key());

    let mut kem_context = enc.clone();
    kem_context.extend_from_slice(&serialize_public_key(recipient));

    let shared_secret = extract_and_expand(dh.raw_secret_bytes().as_slice(), &kem_context)?;
    Ok((shared_secret, enc))
}

fn decap(
    encapsulated_key: &[u8],
    recipient: &SecretKey,
) -> Result<Zeroizing<[u8; SHARED_SECRET_SIZE]>, HpkeError> {
    if encapsulated_key.len() != ENCAPSULATED_KEY_SIZE {
        return Err(HpkeError::EncapsulatedKey(format!(
            "expected {} bytes, got {}",
            ENCAPSULATED_KEY_SIZE,
            encapsulated_key.len()
        )));
    }
    let sender = PublicKey::from_sec1_bytes(encapsulated_key)
        .map_err(|_| HpkeError::EncapsulatedKey("not a point on P-256".to_string()))?;

    let dh = diffie_hellman(recipient.to_nonzero_scalar(), sender.as_affine());

    let mut kem_context = encapsulated_key.to_vec();
    kem_context.extend_from_slice(&serialize_public_key(&recipient.public_key()));

    extract_and_expand(dh.raw_secret_bytes().as_slice(), &kem_context)
}

/// An established encryption context (either direction)
///
/// Each seal or open consumes one sequence number; the nonce for message
/// `seq` is `base_nonce XOR I2OSP(seq, Nn)`.
struct Context {
    key: Zeroizing<[u8; AEAD_KEY_SIZE]>,
    base_nonce: [u8; AEAD_NONCE_SIZE],
    seq: u64,
}

impl Context {
    fn key_schedule_base(shared_secret: &[u8], info: &[u8]) -> Result<Self, HpkeError> {
        let suite_id = hpke_suite_id();

        // base mode: empty psk and psk_id
        let psk_id_hash = labeled_extract(&suite_id, b"", b"psk_id_hash", b"");
        let info_hash = labeled_extract(&suite_id, b"", b"info_hash", info);

        let mut key_schedule_context = Vec::with_capacity(1 + 2 * EXTRACT_SIZE);
        key_schedule_context.push(MODE_BASE);
        key_schedule_context.extend_from_slice(&psk_id_hash[..]);
        key_schedule_context.extend_from_slice(&info_hash[..]);

        let secret = labeled_extract(&suite_id, shared_secret, b"secret", b"");

        let mut key = Zeroizing::new([0u8; AEAD_KEY_SIZE]);
        labeled_expand(
            &suite_id,
            &secret[..],
            b"key",
            &key_schedule_context,
            &mut key[..],
        )?;

        let mut base_nonce = [0u8; AEAD_NONCE_SIZE];
        labeled_expand(
            &suite_id,
            &secret[..],
            b"base_nonce",
            &key_schedule_context,
            &mut base_nonce,
        )?;

        Ok(Self {
            key,
            base_nonce,
            seq: 0,
        })
    }

    fn nonce(&self) -> [u8; AEAD_NONCE_SIZE] {
        let mut nonce = self.base_nonce;
        let seq = self.seq.to_be_bytes();
        let offset = AEAD_NONCE_SIZE - seq.len();
        for (n, s) in nonce[offset..].iter_mut().zip(seq.iter()) {
            *n ^= s;
        }
        nonce
    }

    fn increment_seq(&mut self) -> Result<(), HpkeError> {
        self.seq = self.seq.checked_add(1).ok_or(HpkeError::SequenceOverflow)?;
        Ok(())
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.key[..]))
    }

    fn seal(&mut self, aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, HpkeError> {
        let nonce = self.nonce();
        let ciphertext = self
            .cipher()
            .encrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| HpkeError::Seal)?;
        self.increment_seq()?;
        Ok(ciphertext)
    }

    fn open(&mut self, aad: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, HpkeError> {
        let nonce = self.nonce();
        let plaintext = self
            .cipher()
            .decrypt(
                Nonce::from_slice(&nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| HpkeError::Open)?;
        self.increment_seq()?;
        Ok(Zeroizing::new(plaintext))
    }
}
