use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the languages the picker offers
    Languages,

    /// Translate a screen description through one or more languages
    Run {
        /// Screen description (JSON)
        #[arg(short, long)]
        screen: PathBuf,

        /// Languages to switch through, in order (comma-separated)
        #[arg(short, long, default_value = "fr")]
        langs: String,

        /// Keep the language across navigation
        #[arg(long)]
        keep: bool,

        /// Restore the original texts at the end
        #[arg(long)]
        restore: bool,

        /// Re-translate bypassing caches after each switch
        #[arg(long)]
        force: bool,
    },

    /// Prepare the model for one language and translate a sample
    Check {
        /// Target language code
        #[arg(short, long)]
        lang: String,

        /// Text to translate
        #[arg(short, long, default_value = "Hello")]
        text: String,
    },
}

/// Split a comma-separated language list, dropping empty entries
pub fn parse_languages(langs: &str) -> Vec<String> {
    langs
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
