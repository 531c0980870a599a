// Translation model providers
//
// The repository only talks to these traits; concrete providers live in
// submodules:
// - Phrasebook: offline table-driven translations with simulated downloads
// - Ollama: local LLM server reached over HTTP

pub mod ollama;
pub mod phrasebook;

use async_trait::async_trait;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;

use crate::config::ProviderConfig;
use crate::config::ProviderKind;
use crate::error::Result;

pub use ollama::OllamaProvider;
pub use phrasebook::{Phrasebook, PhrasebookProvider};

/// Constraints a model download must respect
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadConditions {
    pub require_wifi: bool,
}

/// One translation client bound to a fixed source and target language
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TranslationModel: Send + Sync {
    /// Make sure the model backing this client is resident
    async fn download_if_needed(&self, conditions: DownloadConditions) -> Result<()>;

    /// Translate one string
    async fn translate(&self, text: &str) -> Result<String>;

    /// Release the client; further calls may fail
    fn close(&self);
}

/// Factory for translation clients
pub trait ModelProvider: Send + Sync {
    fn create_client(&self, source_language: &str, target_language: &str) -> Arc<dyn TranslationModel>;

    /// Human readable provider name for logs
    fn name(&self) -> &str;
}

/// Factory for creating provider instances
pub struct ProviderFactory;

impl ProviderFactory {
    /// Create a provider based on the configured kind
    pub fn create_provider(config: &ProviderConfig) -> Result<Arc<dyn ModelProvider>> {
        match config.kind {
            ProviderKind::Phrasebook => {
                let phrasebook = match &config.phrasebook {
                    Some(path) => Phrasebook::from_file(path)?,
                    None => Phrasebook::builtin(),
                };
                Ok(Arc::new(
                    PhrasebookProvider::new(phrasebook)
                        .with_download_latency(std::time::Duration::from_millis(config.simulated_download_ms)),
                ))
            }
            ProviderKind::Ollama => Ok(Arc::new(OllamaProvider::new(
                config.endpoint.clone(),
                config.model.clone(),
            )?)),
        }
    }
}
