//! Screen-wide translation engine.
//!
//! `TranslationManager` owns every read and write of displayed text. It runs
//! as one actor task: triggers from the coordinator, commands from a
//! `ManagerHandle`, translation completions and tree change signals are all
//! funnelled into that task, so bindings and caches are never shared.
//!
//! Translation itself happens on spawned tasks that send their result back
//! as a completion; a completion only reaches the screen if the target
//! language is still the one it was requested for.

pub mod binding;
pub mod schedule;

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{Instrument, debug, info, warn};

use crate::cache::{CacheStats, LanguageCaches};
use crate::config::{CacheConfig, ManagerConfig};
use crate::coordinator::{TranslationCoordinator, Trigger, TriggerStream};
use crate::error::{Result, TranslatorError};
use crate::view::{Chrome, NodeKey, NodeKind, NodeRef, Screen, TreeEvent, ViewNode};

pub use binding::{Binding, BindingTable};
use schedule::{Debounce, Throttle, sleep_until};

/// Stable identifier of a chrome entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChromeKey {
    Title,
    MenuItem(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum TargetId {
    Node(NodeKey),
    Chrome(ChromeKey),
}

enum Target {
    Node(Weak<dyn ViewNode>),
    Chrome(ChromeKey),
}

struct Completion {
    id: TargetId,
    target: Target,
    original: String,
    language: String,
    result: Result<String>,
}

struct TreeSignal {
    source: Weak<dyn ViewNode>,
    event: TreeEvent,
}

enum Watch {
    Active(JoinHandle<()>),
    Unavailable,
}

struct WatchEntry {
    node: Weak<dyn ViewNode>,
    watch: Watch,
}

impl WatchEntry {
    /// Still watching the node it was created for
    fn is_current(&self, key: NodeKey) -> bool {
        let live = self
            .node
            .upgrade()
            .is_some_and(|node| NodeKey::of(&node) == key);
        live && match &self.watch {
            Watch::Active(handle) => !handle.is_finished(),
            Watch::Unavailable => true,
        }
    }

    fn is_active(&self) -> bool {
        matches!(&self.watch, Watch::Active(handle) if !handle.is_finished())
    }

    fn stop(&self) {
        if let Watch::Active(handle) = &self.watch {
            handle.abort();
        }
    }
}

enum Decision {
    Skip,
    Apply(String),
    Request(String),
}

enum Command {
    Attach(Screen),
    Navigate(Screen),
    Retranslate { force: bool },
    Restore,
    Snapshot(oneshot::Sender<ManagerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

/// A command with the last trigger sequence its sender could have seen
struct Stamped {
    sequence: u64,
    command: Command,
}

/// Point-in-time view of the engine, for diagnostics and tests
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSnapshot {
    pub target: Option<String>,
    pub bindings: usize,
    pub chrome_bindings: usize,
    pub in_flight: usize,
    pub observers: usize,
    /// Containers tracked, including ones that cannot be observed
    pub watched: usize,
    pub pending_layout: bool,
    pub pending_scroll: bool,
    pub passes: u64,
    pub requests: u64,
    pub applied: u64,
    pub cache: CacheStats,
}

impl ManagerSnapshot {
    /// Nothing in flight and nothing scheduled
    pub fn is_idle(&self) -> bool {
        self.in_flight == 0 && !self.pending_layout && !self.pending_scroll
    }
}

#[derive(Debug, Default)]
struct PassStats {
    passes: u64,
    requests: u64,
    applied: u64,
}

struct TranslationManager {
    coordinator: Arc<TranslationCoordinator>,
    screen: Option<Screen>,
    target: Option<String>,
    bindings: BindingTable,
    chrome: HashMap<ChromeKey, Binding>,
    caches: LanguageCaches,
    clear_cache_on_restore: bool,
    pending: HashSet<(TargetId, String, String)>,
    in_flight: usize,
    watches: HashMap<NodeKey, WatchEntry>,
    layout: Debounce,
    scroll: Throttle,
    scroll_sources: Vec<Weak<dyn ViewNode>>,
    completions: mpsc::UnboundedSender<Completion>,
    signals: mpsc::UnboundedSender<TreeSignal>,
    stats: PassStats,
}

fn decide(binding: &Binding, caches: &mut LanguageCaches, language: &str, force: bool) -> Decision {
    if !binding.is_translatable() {
        return Decision::Skip;
    }
    if !force && binding.is_tagged(language) {
        return Decision::Skip;
    }
    if !force {
        if let Some(cached) = caches.get(language, binding.original()) {
            return Decision::Apply(cached);
        }
    }
    Decision::Request(binding.original().to_string())
}

fn read_chrome(chrome: &Arc<dyn Chrome>, key: ChromeKey) -> Option<String> {
    match key {
        ChromeKey::Title => chrome.title(),
        ChromeKey::MenuItem(id) => chrome
            .menu_items()
            .into_iter()
            .find(|item| item.id == id)
            .map(|item| item.title),
    }
}

fn write_chrome(chrome: &Arc<dyn Chrome>, key: ChromeKey, text: &str) {
    match key {
        ChromeKey::Title => chrome.set_title(text),
        ChromeKey::MenuItem(id) => chrome.set_menu_title(id, text),
    }
}

impl TranslationManager {
    fn new(
        coordinator: Arc<TranslationCoordinator>,
        cache: &CacheConfig,
        config: &ManagerConfig,
        completions: mpsc::UnboundedSender<Completion>,
        signals: mpsc::UnboundedSender<TreeSignal>,
    ) -> Self {
        Self {
            coordinator,
            screen: None,
            target: None,
            bindings: BindingTable::new(),
            chrome: HashMap::new(),
            caches: LanguageCaches::from_config(cache),
            clear_cache_on_restore: cache.clear_on_restore,
            pending: HashSet::new(),
            in_flight: 0,
            watches: HashMap::new(),
            layout: Debounce::new(config.layout_debounce()),
            scroll: Throttle::new(config.scroll_throttle()),
            scroll_sources: Vec::new(),
            completions,
            signals,
            stats: PassStats::default(),
        }
    }

    /// Returns `false` once the manager should stop
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Attach(screen) => self.attach(screen),
            Command::Navigate(screen) => self.navigate(screen),
            Command::Retranslate { force } => self.retranslate(force),
            Command::Restore => self.restore_originals(),
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::Shutdown(ack) => {
                self.detach_observers();
                let _ = ack.send(());
                return false;
            }
        }
        true
    }

    /// Track `screen`, translating it right away while a language is active
    fn attach(&mut self, screen: Screen) {
        self.detach_observers();
        self.screen = Some(screen);
        self.translate_pass(false);
    }

    /// Swap screens, keeping the language only if the user asked for it
    fn navigate(&mut self, screen: Screen) {
        match self.coordinator.persistent_language() {
            Some(language) => {
                if self.target.is_none() {
                    self.target = Some(language);
                }
                self.attach(screen);
            }
            None => {
                self.restore_originals();
                self.attach(screen);
            }
        }
    }

    fn on_trigger(&mut self, trigger: Trigger) {
        info!("Translating screen to '{}' (trigger #{})", trigger.language, trigger.sequence);
        self.target = Some(trigger.language);
        self.translate_pass(false);
    }

    fn retranslate(&mut self, force: bool) {
        if self.target.is_none() {
            debug!("Retranslate requested with no target language");
            return;
        }
        self.translate_pass(force);
    }

    /// One full traversal of the tracked screen and its chrome
    fn translate_pass(&mut self, force: bool) {
        let (Some(language), Some(screen)) = (self.target.clone(), self.screen.clone()) else {
            return;
        };
        self.caches.touch(&language);
        self.stats.passes += 1;
        debug!("Pass #{} to '{}' (force: {})", self.stats.passes, language, force);

        self.visit(&screen.root, &language, force);
        if let Some(chrome) = &screen.chrome {
            self.translate_chrome(chrome, &language, force);
        }

        let pruned = self.bindings.prune();
        if pruned > 0 {
            debug!("Dropped {} bindings of discarded nodes", pruned);
        }
        let pruned = self.prune_watches();
        if pruned > 0 {
            debug!("Dropped {} watches of discarded containers", pruned);
        }
    }

    fn visit(&mut self, node: &NodeRef, language: &str, force: bool) {
        match node.kind() {
            NodeKind::Container | NodeKind::Scrollable => {
                self.watch(node);
                for child in node.children() {
                    self.visit(&child, language, force);
                }
            }
            NodeKind::Text => self.translate_node(node, language, force),
            NodeKind::Other => {}
        }
    }

    fn translate_node(&mut self, node: &NodeRef, language: &str, force: bool) {
        let Some(displayed) = node.text() else {
            return;
        };
        let binding = self.bindings.observe(node, &displayed);
        match decide(binding, &mut self.caches, language, force) {
            Decision::Skip => {}
            Decision::Apply(cached) => {
                if cached != displayed {
                    node.set_text(&cached);
                    self.stats.applied += 1;
                }
                binding.mark_applied(language, &cached);
            }
            Decision::Request(original) => self.request(
                TargetId::Node(NodeKey::of(node)),
                Target::Node(Arc::downgrade(node)),
                original,
                language,
                force,
            ),
        }
    }

    fn translate_chrome(&mut self, chrome: &Arc<dyn Chrome>, language: &str, force: bool) {
        let mut entries = Vec::new();
        if let Some(title) = chrome.title() {
            entries.push((ChromeKey::Title, title));
        }
        entries.extend(
            chrome
                .menu_items()
                .into_iter()
                .map(|item| (ChromeKey::MenuItem(item.id), item.title)),
        );

        for (key, displayed) in entries {
            let binding = self
                .chrome
                .entry(key)
                .or_insert_with(|| Binding::capture(&displayed));
            binding.observe(&displayed);
            match decide(binding, &mut self.caches, language, force) {
                Decision::Skip => {}
                Decision::Apply(cached) => {
                    if cached != displayed {
                        write_chrome(chrome, key, &cached);
                        self.stats.applied += 1;
                    }
                    binding.mark_applied(language, &cached);
                }
                Decision::Request(original) => {
                    self.request(TargetId::Chrome(key), Target::Chrome(key), original, language, force)
                }
            }
        }
    }

    fn request(&mut self, id: TargetId, target: Target, original: String, language: &str, force: bool) {
        // keyed by original too: a rebound node must not wait on its old text
        let key = (id, language.to_string(), original.clone());
        if !force && self.pending.contains(&key) {
            return;
        }
        self.pending.insert(key);
        self.in_flight += 1;
        self.stats.requests += 1;

        let coordinator = Arc::clone(&self.coordinator);
        let completions = self.completions.clone();
        let language = language.to_string();
        tokio::spawn(
            async move {
                let result = coordinator.translate_for(&language, &original).await;
                let _ = completions.send(Completion {
                    id,
                    target,
                    original,
                    language,
                    result,
                });
            }
            .in_current_span(),
        );
    }

    fn apply_completion(&mut self, done: Completion) {
        self.in_flight = self.in_flight.saturating_sub(1);
        self.pending
            .remove(&(done.id, done.language.clone(), done.original.clone()));

        let translated = match done.result {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!("Blank translation for '{}', leaving text as is", done.original);
                return;
            }
            Err(e) => {
                debug!("Translating '{}' to '{}' failed: {}", done.original, done.language, e);
                return;
            }
        };
        self.caches.insert(&done.language, &done.original, &translated);

        if self.target.as_deref() != Some(done.language.as_str()) {
            debug!("Dropping stale '{}' result for '{}'", done.language, done.original);
            return;
        }

        match done.target {
            Target::Node(node) => {
                let Some(node) = node.upgrade() else {
                    return;
                };
                let Some(displayed) = node.text() else {
                    return;
                };
                let binding = self.bindings.observe(&node, &displayed);
                if binding.original() != done.original {
                    debug!("Node was rebound while '{}' was translating", done.original);
                    return;
                }
                if displayed != translated {
                    node.set_text(&translated);
                    self.stats.applied += 1;
                }
                binding.mark_applied(&done.language, &translated);
            }
            Target::Chrome(key) => {
                let Some(chrome) = self.screen.as_ref().and_then(|s| s.chrome.clone()) else {
                    return;
                };
                let Some(displayed) = read_chrome(&chrome, key) else {
                    return;
                };
                let binding = self
                    .chrome
                    .entry(key)
                    .or_insert_with(|| Binding::capture(&displayed));
                binding.observe(&displayed);
                if binding.original() != done.original {
                    return;
                }
                if displayed != translated {
                    write_chrome(&chrome, key, &translated);
                    self.stats.applied += 1;
                }
                binding.mark_applied(&done.language, &translated);
            }
        }
    }

    /// Subscribe to structural changes of a container, once
    fn watch(&mut self, node: &NodeRef) {
        let key = NodeKey::of(node);
        if self.watches.get(&key).is_some_and(|entry| entry.is_current(key)) {
            return;
        }

        let watch = match node.observe() {
            Ok(mut events) => {
                let signals = self.signals.clone();
                let source = Arc::downgrade(node);
                let handle = tokio::spawn(
                    async move {
                        loop {
                            let event = match events.recv().await {
                                Ok(event) => event,
                                // missed some; one layout pass covers them all
                                Err(RecvError::Lagged(_)) => TreeEvent::Layout,
                                Err(RecvError::Closed) => break,
                            };
                            let signal = TreeSignal {
                                source: source.clone(),
                                event,
                            };
                            if signals.send(signal).is_err() {
                                break;
                            }
                        }
                    }
                    .in_current_span(),
                );
                Watch::Active(handle)
            }
            Err(e) => {
                warn!("Dynamic children of a container may not be discovered: {}", e);
                Watch::Unavailable
            }
        };
        let entry = WatchEntry {
            node: Arc::downgrade(node),
            watch,
        };
        if let Some(stale) = self.watches.insert(key, entry) {
            stale.stop();
        }
    }

    /// Forget watches whose container is gone or whose task has ended
    fn prune_watches(&mut self) -> usize {
        let before = self.watches.len();
        self.watches.retain(|key, entry| {
            let current = entry.is_current(*key);
            if !current {
                entry.stop();
            }
            current
        });
        before - self.watches.len()
    }

    fn detach_observers(&mut self) {
        for (_, entry) in self.watches.drain() {
            entry.stop();
        }
        self.layout.fire();
        self.scroll.reset();
        self.scroll_sources.clear();
    }

    fn on_signal(&mut self, signal: TreeSignal, now: Instant) {
        if self.target.is_none() {
            return;
        }
        if !signal.event.is_scroll() {
            self.layout.hit(now);
            return;
        }
        if self.scroll.hit(now) {
            self.visit_source(&signal.source);
        } else if !self
            .scroll_sources
            .iter()
            .any(|queued| Weak::ptr_eq(queued, &signal.source))
        {
            self.scroll_sources.push(signal.source);
        }
    }

    fn on_layout_settled(&mut self) {
        self.layout.fire();
        debug!("Layout settled, re-translating");
        self.translate_pass(false);
    }

    fn on_scroll_due(&mut self, now: Instant) {
        self.scroll.fire(now);
        for source in std::mem::take(&mut self.scroll_sources) {
            self.visit_source(&source);
        }
    }

    /// Re-traverse the realized children of one container
    fn visit_source(&mut self, source: &Weak<dyn ViewNode>) {
        let (Some(node), Some(language)) = (source.upgrade(), self.target.clone()) else {
            return;
        };
        self.stats.passes += 1;
        self.visit(&node, &language, false);
    }

    /// Put every original back and stop following the tree
    fn restore_originals(&mut self) {
        self.target = None;
        let mut restored = 0;

        for (node, binding) in self.bindings.live_mut() {
            let Some(displayed) = node.text() else {
                continue;
            };
            binding.observe(&displayed);
            if binding.applied_language().is_none() {
                continue;
            }
            if displayed != binding.original() {
                node.set_text(binding.original());
                restored += 1;
            }
            binding.clear_tag();
        }

        if let Some(chrome) = self.screen.as_ref().and_then(|s| s.chrome.clone()) {
            for (key, binding) in self.chrome.iter_mut() {
                let Some(displayed) = read_chrome(&chrome, *key) else {
                    continue;
                };
                binding.observe(&displayed);
                if binding.applied_language().is_none() {
                    continue;
                }
                if displayed != binding.original() {
                    write_chrome(&chrome, *key, binding.original());
                    restored += 1;
                }
                binding.clear_tag();
            }
        }

        self.detach_observers();
        if self.clear_cache_on_restore {
            self.caches.clear();
        }
        self.bindings.prune();
        info!("Restored {} original texts", restored);
    }

    fn snapshot(&self) -> ManagerSnapshot {
        ManagerSnapshot {
            target: self.target.clone(),
            bindings: self.bindings.len(),
            chrome_bindings: self.chrome.len(),
            in_flight: self.in_flight,
            observers: self.watches.values().filter(|entry| entry.is_active()).count(),
            watched: self.watches.len(),
            pending_layout: self.layout.due().is_some(),
            pending_scroll: self.scroll.due().is_some(),
            passes: self.stats.passes,
            requests: self.stats.requests,
            applied: self.stats.applied,
            cache: self.caches.stats(),
        }
    }
}

async fn run(
    mut manager: TranslationManager,
    mut triggers: TriggerStream,
    mut commands: mpsc::UnboundedReceiver<Stamped>,
    mut completions: mpsc::UnboundedReceiver<Completion>,
    mut signals: mpsc::UnboundedReceiver<TreeSignal>,
) {
    let mut triggers_open = true;
    loop {
        let layout_due = manager.layout.due();
        let scroll_due = manager.scroll.due();
        tokio::select! {
            biased;
            stamped = commands.recv() => match stamped {
                Some(Stamped { sequence, command }) => {
                    // a trigger emitted before the command was sent is applied first
                    let later = match triggers.try_next() {
                        Some(trigger) if trigger.sequence <= sequence => {
                            manager.on_trigger(trigger);
                            None
                        }
                        other => other,
                    };
                    if !manager.handle(command) {
                        break;
                    }
                    if let Some(trigger) = later {
                        manager.on_trigger(trigger);
                    }
                }
                None => break,
            },
            trigger = triggers.next(), if triggers_open => match trigger {
                Some(trigger) => manager.on_trigger(trigger),
                None => triggers_open = false,
            },
            Some(done) = completions.recv() => manager.apply_completion(done),
            Some(signal) = signals.recv() => manager.on_signal(signal, Instant::now()),
            _ = sleep_until(layout_due) => manager.on_layout_settled(),
            _ = sleep_until(scroll_due) => manager.on_scroll_due(Instant::now()),
        }
    }
    manager.detach_observers();
    info!("Translation manager stopped");
}

/// Cloneable front door to the manager task
#[derive(Clone)]
pub struct ManagerHandle {
    commands: mpsc::UnboundedSender<Stamped>,
    coordinator: Arc<TranslationCoordinator>,
}

impl ManagerHandle {
    /// Start the manager task; it follows the coordinator's triggers until shut down
    pub fn spawn(coordinator: Arc<TranslationCoordinator>, cache: &CacheConfig, config: &ManagerConfig) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();

        let triggers = coordinator.subscribe();
        let manager = TranslationManager::new(Arc::clone(&coordinator), cache, config, completions_tx, signals_tx);
        tokio::spawn(run(manager, triggers, commands_rx, completions_rx, signals_rx).in_current_span());

        Self {
            commands: commands_tx,
            coordinator,
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let stamped = Stamped {
            sequence: self.coordinator.latest_sequence(),
            command,
        };
        self.commands
            .send(stamped)
            .map_err(|_| TranslatorError::ManagerClosed)
    }

    /// Track `screen`; it is translated at once if a language is active
    pub fn attach(&self, screen: Screen) -> Result<()> {
        self.send(Command::Attach(screen))
    }

    /// Move to another screen; translated only when a persistent language is set
    pub fn navigate(&self, screen: Screen) -> Result<()> {
        self.send(Command::Navigate(screen))
    }

    /// Re-run a pass in the current language; `force` bypasses tags and caches
    pub fn retranslate(&self, force: bool) -> Result<()> {
        self.send(Command::Retranslate { force })
    }

    pub fn restore_originals(&self) -> Result<()> {
        self.send(Command::Restore)
    }

    pub async fn snapshot(&self) -> Result<ManagerSnapshot> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Snapshot(tx))?;
        rx.await.map_err(|_| TranslatorError::ManagerClosed)
    }

    /// Poll until nothing is in flight or scheduled
    pub async fn wait_idle(&self, limit: Duration) -> Result<ManagerSnapshot> {
        let poll = async {
            loop {
                let snapshot = self.snapshot().await?;
                if snapshot.is_idle() {
                    return Ok(snapshot);
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(limit, poll)
            .await
            .map_err(|_| TranslatorError::Timeout("translation manager to settle".to_string()))?
    }

    pub async fn shutdown(&self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        rx.await.map_err(|_| TranslatorError::ManagerClosed)
    }
}

#[cfg(test)]
mod tests;
