use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info};

use super::{DownloadConditions, ModelProvider, TranslationModel};
use crate::error::{Result, TranslatorError};
use crate::picker::display_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub response: String,
    pub done: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationResult {
    pub text: String,
}

/// Provider backed by a local Ollama server
pub struct OllamaProvider {
    client: Client,
    endpoint: String,
    model: String,
}

impl OllamaProvider {
    pub fn new(endpoint: String, model: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300)) // 5 minute timeout
            .build()?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model,
        })
    }
}

impl ModelProvider for OllamaProvider {
    fn create_client(&self, source_language: &str, target_language: &str) -> Arc<dyn TranslationModel> {
        Arc::new(OllamaModel {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            model: self.model.clone(),
            source_language: source_language.to_string(),
            target_language: target_language.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

struct OllamaModel {
    client: Client,
    endpoint: String,
    model: String,
    source_language: String,
    target_language: String,
    closed: AtomicBool,
}

impl OllamaModel {
    async fn model_available(&self) -> Result<bool> {
        let url = format!("{}/api/show", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.model }))
            .send()
            .await
            .map_err(|e| TranslatorError::Download(format!("Failed to connect to Ollama: {}", e)))?;
        Ok(response.status().is_success())
    }

    fn build_prompt(&self, text: &str) -> String {
        let source_name = display_name(&self.source_language);
        let target_name = display_name(&self.target_language);
        format!(
            "You are a professional translator for user interface text.\n\
             \n\
             Translate the text from {} to {} ONLY (language code: {}).\n\
             Keep it short; it is a label or sentence shown on screen.\n\
             \n\
             Return ONLY the translation in JSON format as {{\"text\":\"your {} translation here\"}}.\n\
             Do not include any explanations or alternatives.\n\
             \n\
             Text to translate: \"{}\"\n",
            source_name, target_name, self.target_language, target_name, text
        )
    }
}

#[async_trait]
impl TranslationModel for OllamaModel {
    async fn download_if_needed(&self, conditions: DownloadConditions) -> Result<()> {
        if self.model_available().await? {
            info!("Ollama model '{}' is available", self.model);
            return Ok(());
        }
        if conditions.require_wifi {
            debug!("Ollama has no notion of metered networks, pulling anyway");
        }

        info!("Pulling Ollama model '{}'", self.model);
        let url = format!("{}/api/pull", self.endpoint);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "name": self.model, "stream": false }))
            .send()
            .await
            .map_err(|e| TranslatorError::Download(format!("Pull request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TranslatorError::Download(format!(
                "Ollama pull error {}: {}",
                status, error_text
            )));
        }
        Ok(())
    }

    async fn translate(&self, text: &str) -> Result<String> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TranslatorError::Translation("model is closed".to_string()));
        }

        let request = GenerateRequest {
            model: self.model.clone(),
            prompt: self.build_prompt(text),
            stream: false,
            format: "json".to_string(),
        };
        let url = format!("{}/api/generate", self.endpoint);
        debug!("Sending translation request to: {}", url);

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| TranslatorError::Translation(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(TranslatorError::Translation(format!(
                "Ollama API error {}: {}",
                status, error_text
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TranslatorError::Translation(format!("Failed to parse response: {}", e)))?;
        parse_translation(&generated.response)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Pull the translation out of a raw generate response
fn parse_translation(raw: &str) -> Result<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(TranslatorError::Translation("Empty translation received".to_string()));
    }
    if let Ok(result) = serde_json::from_str::<TranslationResult>(raw) {
        return Ok(result.text.trim().to_string());
    }
    Ok(raw
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with("Translation:"))
        .unwrap_or(raw)
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_json_response() {
        assert_eq!(parse_translation("{\"text\": \" Bonjour \"}").unwrap(), "Bonjour");
    }

    #[test]
    fn test_parse_plain_response() {
        assert_eq!(parse_translation("\nTranslation: x\nHola\n").unwrap(), "Hola");
        assert!(parse_translation("   ").is_err());
    }

    #[test]
    fn test_prompt_names_languages() {
        let provider = OllamaProvider::new("http://localhost:11434/".to_string(), "m".to_string()).unwrap();
        assert_eq!(provider.endpoint, "http://localhost:11434");
        let model = OllamaModel {
            client: provider.client.clone(),
            endpoint: provider.endpoint.clone(),
            model: "m".to_string(),
            source_language: "en".to_string(),
            target_language: "fr".to_string(),
            closed: AtomicBool::new(false),
        };
        let prompt = model.build_prompt("Hello");
        assert!(prompt.contains("from English to French"));
        assert!(prompt.contains("\"Hello\""));
    }
}
