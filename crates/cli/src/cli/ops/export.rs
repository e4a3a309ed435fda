use clap::Args;

use common::config::ConfigError;
use common::export::{ExportError, Exporter};

#[derive(Args, Debug, Clone)]
pub struct Export {
    /// Custody wallet id whose private key to export
    #[arg(long)]
    pub wallet_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ExportOpError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Export(#[from] ExportError),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Export {
    type Error = ExportOpError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = ctx.export_config()?;
        let exporter = Exporter::new(config)?;

        match exporter.export_and_decrypt(&self.wallet_id).await {
            Ok(key) => Ok(key.expose_secret().to_string()),
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!("export failed, a fresh attempt may succeed: {}", e);
                }
                Err(e.into())
            }
        }
    }
}
