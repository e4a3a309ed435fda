/**
 * Process configuration.
 *  Loaded from a TOML file and the environment,
 *  validated once into an immutable `ExportConfig`.
 */
pub mod config;
/**
 * Cryptographic types and operations.
 *  - Ephemeral P-256 keypairs
 *  - Request authorization signatures
 *  - HPKE decryption of exported keys
 */
pub mod crypto;
/**
 * Export pipeline: build, sign and send the
 *  export request, then open the sealed key.
 */
pub mod export;
/**
 * Rendering and normalization of raw
 *  wallet private keys as hex strings.
 */
pub mod key_material;

pub mod prelude {
    pub use crate::config::{ConfigError, ExportConfig, RawExportConfig};
    pub use crate::crypto::{
        AsymmetricSigner, AuthorizationKey, EphemeralKeyPair, HpkeSuite, HybridCipher,
    };
    pub use crate::export::{ExportError, ExportResponse, Exporter, PreparedExport};
    pub use crate::key_material::{
        format_private_key, normalize_private_key, ExportedPrivateKey, NormalizedKey,
    };
}
