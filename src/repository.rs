//! Owner of the single active translation model.
//!
//! Preparation is single-flight: every `prepare` call takes a ticket from a
//! monotonic counter, and a download that finishes after a newer ticket was
//! issued is closed instead of being adopted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RepositoryConfig;
use crate::error::{Result, TranslatorError};
use crate::model::{DownloadConditions, ModelProvider, TranslationModel};

struct ActiveModel {
    language: String,
    model: Arc<dyn TranslationModel>,
}

pub struct LanguageModelRepository {
    provider: Arc<dyn ModelProvider>,
    source_language: String,
    conditions: DownloadConditions,
    download_timeout: Option<Duration>,
    requests: AtomicU64,
    active: Mutex<Option<ActiveModel>>,
}

impl LanguageModelRepository {
    pub fn new(provider: Arc<dyn ModelProvider>, config: &RepositoryConfig) -> Self {
        Self {
            provider,
            source_language: config.source_language.clone(),
            conditions: DownloadConditions {
                require_wifi: config.require_wifi,
            },
            download_timeout: config.download_timeout(),
            requests: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveModel>> {
        // a panic while holding the lock cannot leave the slot half-written
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `language` the active model, downloading it if needed.
    ///
    /// Returns `false` on download failure, timeout, or when a newer
    /// request superseded this one while it was downloading.
    pub async fn prepare(&self, language: &str) -> bool {
        let ticket = self.requests.fetch_add(1, Ordering::SeqCst) + 1;

        {
            let mut active = self.lock();
            if let Some(current) = active.as_ref() {
                if current.language == language {
                    debug!("Model for '{}' already active", language);
                    return true;
                }
            }
            if let Some(previous) = active.take() {
                info!("Closing model for '{}'", previous.language);
                previous.model.close();
            }
        }

        info!(
            "Preparing {} model {} -> {} (request #{})",
            self.provider.name(),
            self.source_language,
            language,
            ticket
        );
        let client = self.provider.create_client(&self.source_language, language);
        let outcome = self.download(&client, language).await;

        let mut active = self.lock();
        if self.requests.load(Ordering::SeqCst) != ticket {
            debug!("Discarding superseded model for '{}' (request #{})", language, ticket);
            client.close();
            return false;
        }

        match outcome {
            Ok(()) => {
                if let Some(previous) = active.replace(ActiveModel {
                    language: language.to_string(),
                    model: client,
                }) {
                    previous.model.close();
                }
                info!("Model for '{}' is ready", language);
                true
            }
            Err(e) => {
                warn!("Failed to prepare model for '{}': {}", language, e);
                client.close();
                false
            }
        }
    }

    async fn download(&self, client: &Arc<dyn TranslationModel>, language: &str) -> Result<()> {
        let download = client.download_if_needed(self.conditions);
        match self.download_timeout {
            Some(limit) => tokio::time::timeout(limit, download)
                .await
                .map_err(|_| TranslatorError::DownloadTimeout(language.to_string()))?,
            None => download.await,
        }
    }

    /// Translate with the active model; any failure yields the input.
    pub async fn translate(&self, text: &str) -> String {
        let model = self.lock().as_ref().map(|a| Arc::clone(&a.model));
        let Some(model) = model else {
            return text.to_string();
        };
        match model.translate(text).await {
            Ok(translated) => translated,
            Err(e) => {
                debug!("Translation failed, keeping input: {}", e);
                text.to_string()
            }
        }
    }

    /// Translate only if the active model still serves `language`.
    pub async fn translate_for(&self, language: &str, text: &str) -> Result<String> {
        let model = {
            let active = self.lock();
            match active.as_ref() {
                None => return Err(TranslatorError::NoActiveModel),
                Some(a) if a.language != language => {
                    return Err(TranslatorError::LanguageMismatch {
                        requested: language.to_string(),
                        active: a.language.clone(),
                    });
                }
                Some(a) => Arc::clone(&a.model),
            }
        };
        model.translate(text).await
    }

    pub fn has_model(&self, language: &str) -> bool {
        self.lock().as_ref().is_some_and(|a| a.language == language)
    }

    pub fn active_language(&self) -> Option<String> {
        self.lock().as_ref().map(|a| a.language.clone())
    }

    /// Close the active model and invalidate in-flight preparations.
    pub fn dispose(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if let Some(previous) = self.lock().take() {
            info!("Disposing model for '{}'", previous.language);
            previous.model.close();
        }
    }
}
