use clap::Args;

use common::crypto::{AuthorizationKey, EphemeralKeyPair, KeyError, SignatureError, SigningKey};

#[derive(Args, Debug, Clone)]
pub struct Keygen {
    /// Generate an authorization keypair for registration with the custody
    /// service instead of a throwaway recipient key
    #[arg(long)]
    pub authorization: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum KeygenError {
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Keygen {
    type Error = KeygenError;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let keypair = EphemeralKeyPair::generate()?;
        if !self.authorization {
            return Ok(keypair.public_key_spki_base64()?);
        }

        // the key id is assigned at registration, it isn't part of the encoding
        let key = AuthorizationKey::from((String::new(), SigningKey::from(keypair.secret_key())));
        Ok(format!(
            "public key:  {}\nprivate key: {}",
            key.public_key_spki_base64()?,
            key.to_encoded()?.as_str()
        ))
    }
}
