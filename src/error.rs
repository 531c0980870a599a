use thiserror::Error;

#[derive(Error, Debug)]
pub enum TranslatorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model download error: {0}")]
    Download(String),

    #[error("Model download for '{0}' timed out")]
    DownloadTimeout(String),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Active model serves '{active}', not '{requested}'")]
    LanguageMismatch { requested: String, active: String },

    #[error("No translation model is active")]
    NoActiveModel,

    #[error("Cannot observe view: {0}")]
    Observe(String),

    #[error("Translation manager has shut down")]
    ManagerClosed,

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Unknown language: {0}")]
    UnknownLanguage(String),

    #[error("Screen description error: {0}")]
    Screen(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File not found: {0}")]
    FileNotFound(String),
}

pub type Result<T> = std::result::Result<T, TranslatorError>;
