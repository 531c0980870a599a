//! One translation engine wired together: repository, coordinator and the
//! manager task that follows the attached screen.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{Instrument, Span, info, info_span};
use uuid::Uuid;

use crate::config::Config;
use crate::coordinator::TranslationCoordinator;
use crate::error::Result;
use crate::manager::{ManagerHandle, ManagerSnapshot};
use crate::model::{ModelProvider, ProviderFactory};
use crate::picker::LanguageSelection;
use crate::repository::LanguageModelRepository;
use crate::view::Screen;

pub struct TranslationSession {
    id: Uuid,
    repository: Arc<LanguageModelRepository>,
    coordinator: Arc<TranslationCoordinator>,
    manager: ManagerHandle,
    span: Span,
}

impl TranslationSession {
    /// Must be called inside a Tokio runtime; the manager task starts immediately.
    pub fn new(config: &Config, provider: Arc<dyn ModelProvider>) -> Self {
        let id = Uuid::new_v4();
        let span = info_span!("session", id = %id);
        let repository = Arc::new(LanguageModelRepository::new(provider, &config.repository));
        let coordinator = Arc::new(TranslationCoordinator::new(Arc::clone(&repository)));
        let manager = span.in_scope(|| {
            ManagerHandle::spawn(Arc::clone(&coordinator), &config.cache, &config.manager)
        });
        span.in_scope(|| info!("Translation session started"));

        Self {
            id,
            repository,
            coordinator,
            manager,
            span,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let provider = ProviderFactory::create_provider(&config.provider)?;
        Ok(Self::new(config, provider))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn attach(&self, screen: Screen) -> Result<()> {
        self.manager.attach(screen)
    }

    /// Pick a language; `keep` carries it over to screens reached by `navigate`.
    ///
    /// Returns whether the screen will be translated, i.e. the model became ready.
    pub async fn select_language(&self, code: &str, keep: bool) -> bool {
        if keep {
            self.coordinator.set_persistent_language(code);
        } else {
            self.coordinator.clear_persistent_language();
        }
        self.coordinator
            .request_language(code)
            .instrument(self.span.clone())
            .await
    }

    pub async fn apply_selection(&self, selection: &LanguageSelection) -> bool {
        self.select_language(&selection.code, selection.keep_across_navigation)
            .await
    }

    pub fn request_retranslate_current_screen(&self, force: bool) -> Result<()> {
        self.manager.retranslate(force)
    }

    pub fn request_restore_originals(&self) -> Result<()> {
        self.coordinator.clear_persistent_language();
        self.manager.restore_originals()
    }

    pub fn navigate(&self, screen: Screen) -> Result<()> {
        self.manager.navigate(screen)
    }

    /// `true` while a model download is in progress
    pub fn loading(&self) -> watch::Receiver<bool> {
        self.coordinator.loading()
    }

    pub fn coordinator(&self) -> &Arc<TranslationCoordinator> {
        &self.coordinator
    }

    pub fn manager(&self) -> &ManagerHandle {
        &self.manager
    }

    pub async fn wait_idle(&self, limit: Duration) -> Result<ManagerSnapshot> {
        self.manager.wait_idle(limit).await
    }

    /// Stop the manager and release the active model
    pub async fn shutdown(&self) -> Result<()> {
        self.manager.shutdown().await?;
        self.repository.dispose();
        self.span.in_scope(|| info!("Translation session closed"));
        Ok(())
    }
}
