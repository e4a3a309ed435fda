use zeroize::Zeroizing;

/// Size of a raw secp256k1 / P-256 wallet private key in bytes
pub const RAW_KEY_SIZE: usize = 32;
/// Length of the rendered key: `0x` + 64 hex digits
pub const HEX_KEY_LEN: usize = 2 + RAW_KEY_SIZE * 2;

const HEX_PREFIX: &str = "0x";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum KeyMaterialError {
    #[error("decrypted key material has wrong length, expected {expected} bytes, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("malformed private key: {0}")]
    Malformed(String),
}

/// A wallet private key recovered from the custody service
///
/// Rendered as `0x` + 64 lowercase hex digits. The buffer is wiped on drop
/// and `Debug` never prints it; reading it takes an explicit
/// [`ExportedPrivateKey::expose_secret`].
#[derive(Clone, PartialEq, Eq)]
pub struct ExportedPrivateKey(Zeroizing<String>);

impl ExportedPrivateKey {
    pub fn expose_secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ExportedPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ExportedPrivateKey(<redacted>)")
    }
}

/// Render decrypted key bytes as a `0x`-prefixed lowercase hex private key
///
/// Anything other than exactly 32 bytes means the custody service and this
/// client disagree about the protocol, so it is an error rather than
/// something to pad or truncate.
pub fn format_private_key(bytes: &[u8]) -> Result<ExportedPrivateKey, KeyMaterialError> {
    if bytes.len() != RAW_KEY_SIZE {
        return Err(KeyMaterialError::Length {
            expected: RAW_KEY_SIZE,
            actual: bytes.len(),
        });
    }
    let mut rendered = Zeroizing::new(String::with_capacity(HEX_KEY_LEN));
    rendered.push_str(HEX_PREFIX);
    rendered.push_str(&Zeroizing::new(hex::encode(bytes)));
    Ok(ExportedPrivateKey(rendered))
}

/// Classification of a private-key string of uncertain provenance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NormalizedKey {
    /// A plain 32-byte hex key, rendered canonically
    Valid(String),
    /// The hex encoding of the ASCII text of a valid key; holds the inner key
    DoubleEncoded(String),
    /// Neither; carries the reason
    Malformed(String),
}

impl NormalizedKey {
    /// The canonical key for `Valid` and `DoubleEncoded`, a hard error otherwise
    pub fn into_hex(self) -> Result<String, KeyMaterialError> {
        match self {
            NormalizedKey::Valid(hex) | NormalizedKey::DoubleEncoded(hex) => Ok(hex),
            NormalizedKey::Malformed(reason) => Err(KeyMaterialError::Malformed(reason)),
        }
    }
}

/// Classify a private key string as plain, double-encoded, or malformed
///
/// Recognized shapes, each optionally `0x`-prefixed:
/// - 64 hex digits: a plain key
/// - 128 or 132 hex digits: the hex encoding of the ASCII text of a plain
///   key (without or with its own `0x`)
///
/// Nothing else is accepted and nothing is guessed.
pub fn normalize_private_key(input: &str) -> NormalizedKey {
    let input = input.trim();
    let digits = strip_hex_prefix(input);

    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return NormalizedKey::Malformed("contains non-hex characters".to_string());
    }

    match digits.len() {
        64 => NormalizedKey::Valid(canonical(digits)),
        128 | 132 => match decode_inner(digits) {
            Ok(inner) => NormalizedKey::DoubleEncoded(inner),
            Err(reason) => NormalizedKey::Malformed(reason),
        },
        n => NormalizedKey::Malformed(format!(
            "unexpected length of {} hex digits, expected 64 (or 128/132 double-encoded)",
            n
        )),
    }
}

fn strip_hex_prefix(input: &str) -> &str {
    input
        .strip_prefix(HEX_PREFIX)
        .or_else(|| input.strip_prefix("0X"))
        .unwrap_or(input)
}

fn canonical(digits: &str) -> String {
    format!("{}{}", HEX_PREFIX, digits.to_ascii_lowercase())
}

fn decode_inner(digits: &str) -> Result<String, String> {
    let bytes = hex::decode(digits).map_err(|e| format!("outer hex decode failed: {}", e))?;
    let inner = String::from_utf8(bytes).map_err(|_| "inner value is not text".to_string())?;
    let inner_digits = strip_hex_prefix(&inner);
    if inner_digits.len() != 64 {
        return Err("inner value is not a 64-digit hex key".to_string());
    }
    if !inner_digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("inner value contains non-hex characters".to_string());
    }
    Ok(canonical(inner_digits))
}

#[cfg(test)]
mod test {
    use super::*;

    const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_format_known_key() {
        let bytes = hex::decode(KEY).unwrap();
        let formatted = format_private_key(&bytes).unwrap();
        let rendered = formatted.expose_secret();
        assert_eq!(rendered.len(), HEX_KEY_LEN);
        assert_eq!(rendered, format!("0x{}", KEY));
        assert!(rendered[2..]
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)));
    }

    #[test]
    fn test_format_rejects_wrong_length() {
        assert_eq!(
            format_private_key(&[0u8; 31]),
            Err(KeyMaterialError::Length {
                expected: 32,
                actual: 31
            })
        );
        assert!(format_private_key(&[0u8; 33]).is_err());
        assert!(format_private_key(&[]).is_err());
    }

    #[test]
    fn test_format_leading_zero_bytes() {
        let formatted = format_private_key(&[0u8; 32]).unwrap();
        assert_eq!(formatted.expose_secret(), format!("0x{}", "0".repeat(64)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let formatted = format_private_key(&[0xabu8; 32]).unwrap();
        let debug = format!("{:?}", formatted);
        assert!(!debug.contains("abab"));
    }

    #[test]
    fn test_normalize_plain() {
        let expected = format!("0x{}", KEY);
        assert_eq!(
            normalize_private_key(KEY),
            NormalizedKey::Valid(expected.clone())
        );
        assert_eq!(
            normalize_private_key(&format!("0x{}", KEY.to_uppercase())),
            NormalizedKey::Valid(expected)
        );
    }

    #[test]
    fn test_normalize_double_encoded() {
        let expected = format!("0x{}", KEY);

        // hex of the 64 ASCII digits: 128 digits
        let double = hex::encode(KEY);
        assert_eq!(double.len(), 128);
        assert_eq!(
            normalize_private_key(&double),
            NormalizedKey::DoubleEncoded(expected.clone())
        );

        // hex of "0x" + 64 digits: 132 digits, and with an outer prefix too
        let double_prefixed = hex::encode(format!("0x{}", KEY));
        assert_eq!(double_prefixed.len(), 132);
        assert_eq!(
            normalize_private_key(&format!("0x{}", double_prefixed)),
            NormalizedKey::DoubleEncoded(expected)
        );
    }

    #[test]
    fn test_normalize_malformed() {
        assert!(matches!(
            normalize_private_key("0x1234"),
            NormalizedKey::Malformed(_)
        ));
        assert!(matches!(
            normalize_private_key(&"zz".repeat(32)),
            NormalizedKey::Malformed(_)
        ));
        // 128 hex digits that aren't an encoded key
        assert!(matches!(
            normalize_private_key(&"ff".repeat(64)),
            NormalizedKey::Malformed(_)
        ));
        // 132 digits decoding to text without a 0x prefix
        let no_prefix = hex::encode(format!("zz{}", KEY));
        assert!(matches!(
            normalize_private_key(&no_prefix),
            NormalizedKey::Malformed(_)
        ));
        assert!(normalize_private_key("").into_hex().is_err());
    }

    #[test]
    fn test_into_hex() {
        assert_eq!(
            normalize_private_key(KEY).into_hex().unwrap(),
            format!("0x{}", KEY)
        );
        assert!(matches!(
            normalize_private_key("nope").into_hex(),
            Err(KeyMaterialError::Malformed(_))
        ));
    }
}
