use clap::Args;

use common::key_material::{normalize_private_key, KeyMaterialError, NormalizedKey};

#[derive(Args, Debug, Clone)]
pub struct Normalize {
    /// Private key as hex, possibly hex-encoded a second time
    pub key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error(transparent)]
    Malformed(#[from] KeyMaterialError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Normalize {
    type Error = NormalizeError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let normalized = normalize_private_key(&self.key);
        if let NormalizedKey::DoubleEncoded(_) = normalized {
            tracing::warn!("input was a hex encoding of a hex key, decoded one layer");
        }
        Ok(normalized.into_hex()?)
    }
}
