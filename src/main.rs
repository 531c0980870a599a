//! Screen Translator
//!
//! Loads a screen description into the in-memory view tree, drives language
//! selections through a translation session and prints what the screen shows.

use anyhow::{Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Level, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use screen_translator::cli::{Args, Commands, parse_languages};
use screen_translator::config::Config;
use screen_translator::picker::{LanguagePicker, LanguageSelection, display_name};
use screen_translator::session::TranslationSession;
use screen_translator::view::ScreenSpec;

const SETTLE_LIMIT: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;
    info!("Starting Screen Translator");

    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("screen-translator.toml").exists() {
                info!("Found screen-translator.toml in current directory, loading...");
                Config::from_file("screen-translator.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Languages => {
            println!("\nSupported Languages:");
            println!("{:<8} {:<20}", "Code", "Name");
            println!("{}", "-".repeat(28));
            for (code, name) in LanguagePicker::entries() {
                println!("{:<8} {:<20}", code, name);
            }
        }
        Commands::Run {
            screen,
            langs,
            keep,
            restore,
            force,
        } => {
            let languages = parse_languages(&langs);
            if languages.is_empty() {
                bail!("No target languages given");
            }
            let selections = languages
                .iter()
                .map(|code| LanguageSelection::parse(code, keep))
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let memory = ScreenSpec::from_file(&screen)?.build();
            let session = TranslationSession::from_config(&config)?;
            info!("Session {} attached to {}", session.id(), screen.display());
            session.attach(memory.screen())?;

            println!("\nOriginal:");
            print!("{}", memory.render());

            let spinner = spawn_loading_spinner(session.loading());
            for selection in &selections {
                if !session.apply_selection(selection).await {
                    warn!("Model for '{}' is not available, screen left as is", selection.code);
                    continue;
                }
                if force {
                    session.request_retranslate_current_screen(true)?;
                }
                session.wait_idle(SETTLE_LIMIT).await?;
                println!("\n{} ({}):", display_name(&selection.code), selection.code);
                print!("{}", memory.render());
            }

            if restore {
                session.request_restore_originals()?;
                session.wait_idle(SETTLE_LIMIT).await?;
                println!("\nRestored:");
                print!("{}", memory.render());
            }

            let snapshot = session.manager().snapshot().await?;
            info!(
                "Passes: {}, requests: {}, applied: {}, cache hits: {}, misses: {}",
                snapshot.passes,
                snapshot.requests,
                snapshot.applied,
                snapshot.cache.hits,
                snapshot.cache.misses
            );
            session.shutdown().await?;
            spinner.abort();
        }
        Commands::Check { lang, text } => {
            let selection = LanguageSelection::parse(&lang, false)?;
            let session = TranslationSession::from_config(&config)?;
            let spinner = spawn_loading_spinner(session.loading());

            let ready = session.apply_selection(&selection).await;
            spinner.abort();
            if !ready {
                session.shutdown().await?;
                bail!("Model for '{}' could not be prepared", selection.code);
            }

            let translated = session
                .coordinator()
                .translate_for(&selection.code, &text)
                .await;
            session.shutdown().await?;
            match translated {
                Ok(translated) => println!("{} -> {}", text, translated),
                Err(e) => bail!("Translation failed: {}", e),
            }
        }
    }

    info!("Screen Translator finished");
    Ok(())
}

/// Show a spinner whenever a model download is in progress
fn spawn_loading_spinner(mut loading: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if loading.wait_for(|busy| *busy).await.is_err() {
                return;
            }
            let pb = ProgressBar::new_spinner();
            if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
                pb.set_style(style);
            }
            pb.set_message("Downloading language model...");
            pb.enable_steady_tick(Duration::from_millis(100));

            let closed = loading.wait_for(|busy| !*busy).await.is_err();
            pb.finish_and_clear();
            if closed {
                return;
            }
        }
    })
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?
        .join(".screen-translator")
        .join("log");
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = rolling::daily(&log_dir, "screen-translator.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}
