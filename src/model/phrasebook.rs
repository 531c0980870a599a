use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

use super::{DownloadConditions, ModelProvider, TranslationModel};
use crate::error::{Result, TranslatorError};

/// Translations keyed by target language, then by source text
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct Phrasebook {
    entries: HashMap<String, HashMap<String, String>>,
}

impl Phrasebook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a phrasebook from a `.json` or `.toml` file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TranslatorError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(toml::from_str(&content)?),
            _ => Ok(serde_json::from_str(&content)?),
        }
    }

    /// Small built-in table so the demo works without a file
    pub fn builtin() -> Self {
        let mut book = Self::new();
        for (lang, pairs) in [
            ("fr", [("Home", "Accueil"), ("Dashboard", "Tableau de bord"), ("Notifications", "Notifications"), ("Hello", "Bonjour"), ("Settings", "Paramètres")]),
            ("es", [("Home", "Inicio"), ("Dashboard", "Panel"), ("Notifications", "Notificaciones"), ("Hello", "Hola"), ("Settings", "Ajustes")]),
            ("de", [("Home", "Startseite"), ("Dashboard", "Übersicht"), ("Notifications", "Benachrichtigungen"), ("Hello", "Hallo"), ("Settings", "Einstellungen")]),
        ] {
            for (source, target) in pairs {
                book.insert(lang, source, target);
            }
        }
        book
    }

    pub fn insert(&mut self, language: &str, source: &str, target: &str) {
        self.entries
            .entry(language.to_string())
            .or_default()
            .insert(source.to_string(), target.to_string());
    }

    pub fn with(mut self, language: &str, source: &str, target: &str) -> Self {
        self.insert(language, source, target);
        self
    }

    pub fn supports(&self, language: &str) -> bool {
        self.entries.contains_key(language)
    }

    pub fn lookup(&self, language: &str, source: &str) -> Option<&str> {
        self.entries
            .get(language)
            .and_then(|table| table.get(source))
            .map(String::as_str)
    }

    pub fn languages(&self) -> Vec<&str> {
        let mut languages: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        languages.sort_unstable();
        languages
    }
}

/// Offline provider: every language in the phrasebook has a "model"
pub struct PhrasebookProvider {
    phrasebook: Arc<Phrasebook>,
    download_latency: Duration,
    latency_overrides: HashMap<String, Duration>,
    translate_latency: Duration,
    failing_languages: HashSet<String>,
    translate_calls: Arc<AtomicUsize>,
    downloads: Arc<AtomicUsize>,
}

impl PhrasebookProvider {
    pub fn new(phrasebook: Phrasebook) -> Self {
        Self {
            phrasebook: Arc::new(phrasebook),
            download_latency: Duration::ZERO,
            latency_overrides: HashMap::new(),
            translate_latency: Duration::ZERO,
            failing_languages: HashSet::new(),
            translate_calls: Arc::new(AtomicUsize::new(0)),
            downloads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_download_latency(mut self, latency: Duration) -> Self {
        self.download_latency = latency;
        self
    }

    /// Per-language download latency, overriding the default
    pub fn with_language_latency(mut self, language: &str, latency: Duration) -> Self {
        self.latency_overrides.insert(language.to_string(), latency);
        self
    }

    pub fn with_translate_latency(mut self, latency: Duration) -> Self {
        self.translate_latency = latency;
        self
    }

    /// Downloads for `language` always fail
    pub fn with_failing_language(mut self, language: &str) -> Self {
        self.failing_languages.insert(language.to_string());
        self
    }

    /// Number of translate calls that reached a model
    pub fn translate_calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.translate_calls)
    }

    /// Number of downloads started
    pub fn downloads(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.downloads)
    }
}

impl ModelProvider for PhrasebookProvider {
    fn create_client(&self, source_language: &str, target_language: &str) -> Arc<dyn TranslationModel> {
        let download_latency = self
            .latency_overrides
            .get(target_language)
            .copied()
            .unwrap_or(self.download_latency);
        Arc::new(PhrasebookModel {
            phrasebook: Arc::clone(&self.phrasebook),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            download_latency,
            translate_latency: self.translate_latency,
            fail_download: self.failing_languages.contains(target_language),
            closed: AtomicBool::new(false),
            translate_calls: Arc::clone(&self.translate_calls),
            downloads: Arc::clone(&self.downloads),
        })
    }

    fn name(&self) -> &str {
        "phrasebook"
    }
}

struct PhrasebookModel {
    phrasebook: Arc<Phrasebook>,
    source_language: String,
    target_language: String,
    download_latency: Duration,
    translate_latency: Duration,
    fail_download: bool,
    closed: AtomicBool,
    translate_calls: Arc<AtomicUsize>,
    downloads: Arc<AtomicUsize>,
}

#[async_trait]
impl TranslationModel for PhrasebookModel {
    async fn download_if_needed(&self, _conditions: DownloadConditions) -> Result<()> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        if !self.download_latency.is_zero() {
            tokio::time::sleep(self.download_latency).await;
        }
        if self.fail_download || !self.phrasebook.supports(&self.target_language) {
            return Err(TranslatorError::Download(format!(
                "no phrasebook model for {} -> {}",
                self.source_language, self.target_language
            )));
        }
        debug!("Phrasebook model {} -> {} ready", self.source_language, self.target_language);
        Ok(())
    }

    async fn translate(&self, text: &str) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TranslatorError::Translation("model is closed".to_string()));
        }
        self.translate_calls.fetch_add(1, Ordering::SeqCst);
        if !self.translate_latency.is_zero() {
            tokio::time::sleep(self.translate_latency).await;
        }
        self.phrasebook
            .lookup(&self.target_language, text)
            .map(str::to_string)
            .ok_or_else(|| {
                TranslatorError::Translation(format!(
                    "no {} entry for '{}'",
                    self.target_language, text
                ))
            })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_missing_entry() {
        let provider = PhrasebookProvider::new(Phrasebook::new().with("fr", "Hello", "Bonjour"));
        let model = provider.create_client("en", "fr");
        model.download_if_needed(DownloadConditions::default()).await.unwrap();

        assert_eq!(model.translate("Hello").await.unwrap(), "Bonjour");
        assert!(model.translate("Goodbye").await.is_err());
        assert_eq!(provider.translate_calls().load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_language_fails_download() {
        let provider = PhrasebookProvider::new(Phrasebook::builtin());
        let model = provider.create_client("en", "xx");
        assert!(matches!(
            model.download_if_needed(DownloadConditions::default()).await,
            Err(TranslatorError::Download(_))
        ));
    }

    #[tokio::test]
    async fn test_closed_model_refuses_translation() {
        let provider = PhrasebookProvider::new(Phrasebook::builtin());
        let model = provider.create_client("en", "fr");
        model.close();
        assert!(model.translate("Hello").await.is_err());
    }

    #[test]
    fn test_phrasebook_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.toml");
        std::fs::write(&path, "[fr]\nHello = \"Bonjour\"\n\n[es]\nHello = \"Hola\"\n").unwrap();

        let book = Phrasebook::from_file(&path).unwrap();
        assert_eq!(book.lookup("fr", "Hello"), Some("Bonjour"));
        assert_eq!(book.languages(), vec!["es", "fr"]);
    }

    #[test]
    fn test_phrasebook_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.json");
        std::fs::write(&path, r#"{"de": {"Hello": "Hallo"}}"#).unwrap();

        let book = Phrasebook::from_file(&path).unwrap();
        assert_eq!(book.lookup("de", "Hello"), Some("Hallo"));
        assert!(Phrasebook::from_file(dir.path().join("missing.json")).is_err());
    }
}
