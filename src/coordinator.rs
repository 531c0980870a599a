//! Mediates between the UI glue and the model repository.
//!
//! Language changes are published on a latest-wins mailbox: a slow consumer
//! sees the most recent trigger, never a backlog. Consumers that must see
//! every trigger subscribe to the rendezvous stream instead.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::Result;
use crate::repository::LanguageModelRepository;

/// "Translate now" notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub language: String,
    /// Strictly increasing, so repeated triggers for one language stay distinct
    pub sequence: u64,
}

/// Latest-wins view of the trigger mailbox
pub struct TriggerStream {
    rx: watch::Receiver<Option<Trigger>>,
}

impl TriggerStream {
    /// Wait for the next trigger; `None` once the coordinator is gone.
    pub async fn next(&mut self) -> Option<Trigger> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(trigger) = self.rx.borrow_and_update().clone() {
                return Some(trigger);
            }
        }
    }

    /// Most recent trigger without waiting
    pub fn latest(&self) -> Option<Trigger> {
        self.rx.borrow().clone()
    }

    /// Take a trigger that has not been seen yet, without waiting
    pub fn try_next(&mut self) -> Option<Trigger> {
        if !self.rx.has_changed().unwrap_or(false) {
            return None;
        }
        self.rx.borrow_and_update().clone()
    }
}

pub struct TranslationCoordinator {
    repository: Arc<LanguageModelRepository>,
    loading: watch::Sender<bool>,
    in_flight: AtomicUsize,
    triggers: watch::Sender<Option<Trigger>>,
    sequence: AtomicU64,
    rendezvous: Mutex<Vec<mpsc::Sender<Trigger>>>,
    persistent_language: Mutex<Option<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TranslationCoordinator {
    pub fn new(repository: Arc<LanguageModelRepository>) -> Self {
        let (loading, _) = watch::channel(false);
        let (triggers, _) = watch::channel(None);
        Self {
            repository,
            loading,
            in_flight: AtomicUsize::new(0),
            triggers,
            sequence: AtomicU64::new(0),
            rendezvous: Mutex::new(Vec::new()),
            persistent_language: Mutex::new(None),
        }
    }

    pub fn repository(&self) -> &Arc<LanguageModelRepository> {
        &self.repository
    }

    /// Switch to `language`, emitting a trigger once its model is ready.
    ///
    /// Returns whether a trigger was emitted.
    pub async fn request_language(&self, language: &str) -> bool {
        if self.repository.has_model(language) {
            debug!("Model for '{}' already resident, re-triggering", language);
            self.emit(language).await;
            return true;
        }

        self.begin_loading();
        let ready = self.repository.prepare(language).await;
        self.end_loading();

        if ready && self.emit_if_active(language).await {
            return true;
        }
        info!("No trigger for '{}': preparation failed or was superseded", language);
        false
    }

    /// Fire-and-forget variant for UI callbacks
    pub fn spawn_request_language(self: &Arc<Self>, language: &str) -> JoinHandle<bool> {
        let coordinator = Arc::clone(self);
        let language = language.to_string();
        tokio::spawn(async move { coordinator.request_language(&language).await })
    }

    fn begin_loading(&self) {
        if self.in_flight.fetch_add(1, Ordering::SeqCst) == 0 {
            self.loading.send_replace(true);
        }
    }

    fn end_loading(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.loading.send_replace(false);
        }
    }

    /// Emit only while the repository still serves `language`
    async fn emit_if_active(&self, language: &str) -> bool {
        if !self.repository.has_model(language) {
            debug!("Model for '{}' was replaced before its trigger", language);
            return false;
        }
        self.emit(language).await;
        true
    }

    /// Sequence number of the most recent trigger, 0 before the first
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    async fn emit(&self, language: &str) {
        let trigger = Trigger {
            language: language.to_string(),
            sequence: self.sequence.fetch_add(1, Ordering::SeqCst) + 1,
        };
        debug!("Emitting trigger #{} for '{}'", trigger.sequence, trigger.language);
        self.triggers.send_replace(Some(trigger.clone()));

        let subscribers: Vec<_> = lock(&self.rendezvous).clone();
        for tx in &subscribers {
            let _ = tx.send(trigger.clone()).await;
        }
        lock(&self.rendezvous).retain(|tx| !tx.is_closed());
    }

    pub fn subscribe(&self) -> TriggerStream {
        TriggerStream {
            rx: self.triggers.subscribe(),
        }
    }

    /// Stream on which every trigger is delivered before `request_language` returns
    pub fn subscribe_rendezvous(&self) -> mpsc::Receiver<Trigger> {
        let (tx, rx) = mpsc::channel(1);
        lock(&self.rendezvous).push(tx);
        rx
    }

    pub fn loading(&self) -> watch::Receiver<bool> {
        self.loading.subscribe()
    }

    pub fn is_loading(&self) -> bool {
        *self.loading.borrow()
    }

    /// Pass-through to the repository; failures yield the input
    pub async fn translate(&self, text: &str) -> String {
        self.repository.translate(text).await
    }

    /// Pass-through that refuses to translate with a model for another language
    pub async fn translate_for(&self, language: &str, text: &str) -> Result<String> {
        self.repository.translate_for(language, text).await
    }

    /// Translate on a background task and hand the result to `callback` there
    pub fn translate_with<F>(&self, text: &str, callback: F) -> JoinHandle<()>
    where
        F: FnOnce(String) + Send + 'static,
    {
        let repository = Arc::clone(&self.repository);
        let text = text.to_string();
        tokio::spawn(async move {
            let translated = repository.translate(&text).await;
            callback(translated);
        })
    }

    pub fn set_persistent_language(&self, language: &str) {
        *lock(&self.persistent_language) = Some(language.to_string());
    }

    pub fn clear_persistent_language(&self) {
        *lock(&self.persistent_language) = None;
    }

    pub fn persistent_language(&self) -> Option<String> {
        lock(&self.persistent_language).clone()
    }
}
