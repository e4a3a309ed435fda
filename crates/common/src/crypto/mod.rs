//! Cryptographic primitives for key export
//!
//! This module provides everything the export pipeline needs to talk to a
//! custody service without trusting the transport:
//!
//! - **Ephemeral keys**: a fresh P-256 keypair per export, used as the HPKE
//!   recipient key and then dropped
//! - **Authorization**: an ECDSA P-256 service key that signs the canonical
//!   form of every export request
//! - **Hybrid decryption**: HPKE base mode with DHKEM(P-256, HKDF-SHA256),
//!   HKDF-SHA256 and ChaCha20-Poly1305
//!
//! # Security Model
//!
//! ## Request Authorization
//! The custody service only releases a key to a request signed by a
//! registered authorization key. The signature covers the method, URL, the
//! signed headers and the body, which includes the recipient public key. A
//! request can't be redirected to another recipient without invalidating it.
//!
//! ## Key Transport
//! The custody service seals the wallet key to the ephemeral public key from
//! the request. Only the holder of the matching private key, which never
//! leaves this process, can open it. Each export mints a new keypair, so one
//! leaked ephemeral key exposes at most one export.

mod hpke;
mod keys;
mod signer;

pub use hpke::{HpkeError, HpkeSuite, HybridCipher, ENCAPSULATED_KEY_SIZE, TAG_SIZE};
pub use keys::{EphemeralKeyPair, KeyError, PRIVATE_KEY_SIZE, PUBLIC_KEY_SIZE};
pub use signer::{
    verify_signature, AsymmetricSigner, AuthorizationKey, AuthorizationSignature, SignatureError,
    AUTHORIZATION_KEY_PREFIX,
};

// re-exported so integration tests and callers don't need a direct p256 dependency
pub use p256::ecdsa::{SigningKey, VerifyingKey};
pub use p256::{PublicKey, SecretKey};
