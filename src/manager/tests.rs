use super::*;
use crate::config::RepositoryConfig;
use crate::model::{Phrasebook, PhrasebookProvider};
use crate::repository::LanguageModelRepository;
use crate::view::{MemoryChrome, MemoryNode, MenuItem};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    coordinator: Arc<TranslationCoordinator>,
    manager: ManagerHandle,
    translate_calls: Arc<AtomicUsize>,
}

impl Harness {
    async fn select(&self, language: &str) {
        assert!(self.coordinator.request_language(language).await);
        self.manager.wait_idle(WAIT).await.unwrap();
    }

    fn calls(&self) -> usize {
        self.translate_calls.load(Ordering::SeqCst)
    }
}

fn book() -> Phrasebook {
    let mut book = Phrasebook::new()
        .with("fr", "Hello", "Bonjour")
        .with("es", "Hello", "Hola")
        .with("de", "Hello", "Hallo")
        .with("fr", "Home", "Accueil")
        .with("fr", "Settings", "Paramètres")
        .with("es", "Settings", "Ajustes")
        .with("fr", "Blank me", "");
    for i in 0..10 {
        book.insert("fr", &format!("Row {}", i), &format!("Ligne {}", i));
    }
    book
}

fn fast_config() -> ManagerConfig {
    ManagerConfig {
        layout_debounce_ms: 30,
        scroll_throttle_ms: 30,
    }
}

fn harness_with(provider: PhrasebookProvider, cache: CacheConfig) -> Harness {
    let translate_calls = provider.translate_calls();
    let repository = LanguageModelRepository::new(Arc::new(provider), &RepositoryConfig::default());
    let coordinator = Arc::new(TranslationCoordinator::new(Arc::new(repository)));
    let manager = ManagerHandle::spawn(Arc::clone(&coordinator), &cache, &fast_config());
    Harness {
        coordinator,
        manager,
        translate_calls,
    }
}

fn harness() -> Harness {
    harness_with(PhrasebookProvider::new(book()), CacheConfig::default())
}

fn attach(harness: &Harness, root: &Arc<MemoryNode>) {
    let root: NodeRef = root.clone();
    harness.manager.attach(Screen::new(root)).unwrap();
}

async fn eventually<F: Fn() -> bool>(check: F) {
    for _ in 0..300 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition was never reached");
}

/// Records every text a node shows until stopped
fn sample(node: &Arc<MemoryNode>) -> (Arc<AtomicBool>, Arc<Mutex<Vec<String>>>) {
    let stop = Arc::new(AtomicBool::new(false));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (node, flag, log) = (Arc::clone(node), Arc::clone(&stop), Arc::clone(&seen));
    tokio::spawn(async move {
        while !flag.load(Ordering::SeqCst) {
            log.lock().unwrap().push(node.displayed());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    });
    (stop, seen)
}

#[tokio::test]
async fn test_switch_languages_then_restore() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    let root = MemoryNode::container(vec![hello.clone()]);
    attach(&h, &root);

    h.select("fr").await;
    assert_eq!(hello.displayed(), "Bonjour");

    // the Spanish phrasebook only knows "Hello", so this proves the original was kept
    h.select("es").await;
    assert_eq!(hello.displayed(), "Hola");

    h.manager.restore_originals().unwrap();
    let snapshot = h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(hello.displayed(), "Hello");
    assert_eq!(snapshot.target, None);
}

#[tokio::test]
async fn test_repeated_trigger_writes_once() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    h.select("fr").await;
    h.select("fr").await;
    h.manager.retranslate(false).unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(hello.write_count(), 1);
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn test_cache_serves_second_translation() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    h.select("fr").await;
    h.manager.restore_originals().unwrap();
    h.select("fr").await;

    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(h.calls(), 1);
    let snapshot = h.manager.snapshot().await.unwrap();
    assert!(snapshot.cache.hits >= 1);
}

#[tokio::test]
async fn test_clear_on_restore_drops_cache() {
    let cache = CacheConfig {
        clear_on_restore: true,
        ..CacheConfig::default()
    };
    let h = harness_with(PhrasebookProvider::new(book()), cache);
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    h.select("fr").await;
    h.manager.restore_originals().unwrap();
    h.select("fr").await;

    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn test_language_limit_evicts_whole_cache() {
    let cache = CacheConfig {
        max_languages: 1,
        ..CacheConfig::default()
    };
    let h = harness_with(PhrasebookProvider::new(book()), cache);
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    h.select("fr").await;
    h.select("es").await;
    h.select("fr").await;

    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(h.calls(), 3);
}

#[tokio::test]
async fn test_blank_and_digit_text_is_skipped() {
    let h = harness();
    let digits = MemoryNode::text_view("12345");
    let blank = MemoryNode::text_view("   ");
    let hello = MemoryNode::text_view("Hello");
    attach(
        &h,
        &MemoryNode::container(vec![digits.clone(), MemoryNode::other(), blank.clone(), hello.clone()]),
    );

    h.select("fr").await;
    assert_eq!(digits.write_count(), 0);
    assert_eq!(blank.write_count(), 0);
    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(h.calls(), 1);
}

#[tokio::test]
async fn test_blank_translation_is_a_no_op() {
    let h = harness();
    let node = MemoryNode::text_view("Blank me");
    attach(&h, &MemoryNode::container(vec![node.clone()]));

    h.select("fr").await;
    assert_eq!(node.displayed(), "Blank me");
    assert_eq!(node.write_count(), 0);

    // nothing was cached, so the next pass asks again
    h.manager.retranslate(false).unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(h.calls(), 2);
}

#[tokio::test]
async fn test_chrome_is_translated_and_restored() {
    let h = harness();
    let root = MemoryNode::container(vec![MemoryNode::text_view("Hello")]);
    let chrome = MemoryChrome::new(
        Some("Home"),
        vec![
            MenuItem { id: 1, title: "Home".to_string() },
            MenuItem { id: 2, title: "Settings".to_string() },
        ],
    );
    let screen_root: NodeRef = root.clone();
    let screen_chrome: Arc<dyn Chrome> = chrome.clone();
    h.manager
        .attach(Screen::new(screen_root).with_chrome(screen_chrome))
        .unwrap();

    h.select("fr").await;
    assert_eq!(chrome.title().as_deref(), Some("Accueil"));
    assert_eq!(chrome.menu_title(1).as_deref(), Some("Accueil"));
    assert_eq!(chrome.menu_title(2).as_deref(), Some("Paramètres"));

    h.select("es").await;
    assert_eq!(chrome.menu_title(2).as_deref(), Some("Ajustes"));

    h.manager.restore_originals().unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(chrome.title().as_deref(), Some("Home"));
    assert_eq!(chrome.menu_title(2).as_deref(), Some("Settings"));
}

#[tokio::test]
async fn test_rebound_node_gets_new_original() {
    let h = harness();
    let node = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![node.clone()]));

    h.select("fr").await;
    assert_eq!(node.displayed(), "Bonjour");

    node.rebind("Settings");
    h.manager.retranslate(false).unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(node.displayed(), "Paramètres");

    h.manager.restore_originals().unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(node.displayed(), "Settings");
}

#[tokio::test]
async fn test_forced_pass_bypasses_cache() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    h.select("fr").await;
    h.manager.retranslate(true).unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(h.calls(), 2);
    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(hello.write_count(), 1);
}

#[tokio::test]
async fn test_added_child_is_translated_after_settling() {
    let h = harness();
    let root = MemoryNode::container(vec![MemoryNode::text_view("Hello")]);
    attach(&h, &root);
    h.select("fr").await;

    let late = MemoryNode::text_view("Settings");
    root.add_child(late.clone());
    eventually(|| late.displayed() == "Paramètres").await;
}

#[tokio::test]
async fn test_scrolling_translates_realized_rows() {
    let h = harness();
    let rows: Vec<_> = (0..10)
        .map(|i| MemoryNode::text_view(&format!("Row {}", i)))
        .collect();
    let list = MemoryNode::scrollable(rows.clone(), 3);
    attach(&h, &MemoryNode::container(vec![list.clone()]));

    h.select("fr").await;
    assert_eq!(rows[2].displayed(), "Ligne 2");
    assert_eq!(rows[5].displayed(), "Row 5");

    list.scroll_to(4..7);
    eventually(|| rows[5].displayed() == "Ligne 5").await;
    list.scroll_to(7..10);
    list.scroll_to(8..10);
    eventually(|| rows[9].displayed() == "Ligne 9").await;
}

#[tokio::test]
async fn test_unobservable_root_still_translates() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::detached_container(vec![hello.clone()]));

    h.select("fr").await;
    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(h.manager.snapshot().await.unwrap().observers, 0);
}

#[tokio::test]
async fn test_restore_detaches_observers() {
    let h = harness();
    let root = MemoryNode::container(vec![MemoryNode::text_view("Hello")]);
    attach(&h, &root);

    h.select("fr").await;
    assert_eq!(h.manager.snapshot().await.unwrap().observers, 1);

    h.manager.restore_originals().unwrap();
    let snapshot = h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(snapshot.observers, 0);

    // changes after restore are not translated
    let late = MemoryNode::text_view("Settings");
    root.add_child(late.clone());
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(late.displayed(), "Settings");
}

#[tokio::test]
async fn test_late_result_for_old_language_is_dropped() {
    let h = harness_with(
        PhrasebookProvider::new(book()).with_translate_latency(Duration::from_millis(100)),
        CacheConfig::default(),
    );
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));
    let (stop, seen) = sample(&hello);

    assert!(h.coordinator.request_language("fr").await);
    assert!(h.coordinator.request_language("es").await);
    h.manager.wait_idle(WAIT).await.unwrap();
    stop.store(true, Ordering::SeqCst);

    assert_eq!(hello.displayed(), "Hola");
    assert!(!seen.lock().unwrap().iter().any(|text| text == "Bonjour"));
}

#[tokio::test]
async fn test_navigation_restores_unless_language_is_kept() {
    let h = harness();
    let first = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![first.clone()]));
    h.select("fr").await;

    let second = MemoryNode::text_view("Settings");
    let second_root: NodeRef = MemoryNode::container(vec![second.clone()]);
    h.manager.navigate(Screen::new(second_root)).unwrap();
    let snapshot = h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(first.displayed(), "Hello");
    assert_eq!(second.displayed(), "Settings");
    assert_eq!(snapshot.target, None);

    h.coordinator.set_persistent_language("fr");
    h.select("fr").await;
    assert_eq!(second.displayed(), "Paramètres");

    let third = MemoryNode::text_view("Hello");
    let third_root: NodeRef = MemoryNode::container(vec![third.clone()]);
    h.manager.navigate(Screen::new(third_root)).unwrap();
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(third.displayed(), "Bonjour");
}

#[tokio::test]
async fn test_shutdown_closes_handle() {
    let h = harness();
    h.manager.shutdown().await.unwrap();
    assert!(matches!(
        h.manager.snapshot().await,
        Err(TranslatorError::ManagerClosed)
    ));
}

#[tokio::test]
async fn test_screen_attached_before_selection_is_translated() {
    let h = harness();
    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));

    assert!(h.coordinator.request_language("fr").await);
    let snapshot = h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(hello.displayed(), "Bonjour");
    assert_eq!(snapshot.target.as_deref(), Some("fr"));
    assert!(snapshot.passes >= 1);
}

#[tokio::test]
async fn test_screen_attached_after_selection_is_translated() {
    let h = harness();
    h.select("fr").await;

    let hello = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![hello.clone()]));
    h.manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(hello.displayed(), "Bonjour");
}

#[tokio::test]
async fn test_selection_after_navigate_targets_new_screen() {
    let h = harness();
    let first = MemoryNode::text_view("Hello");
    attach(&h, &MemoryNode::container(vec![first.clone()]));

    let second = MemoryNode::text_view("Settings");
    let second_root: NodeRef = MemoryNode::container(vec![second.clone()]);
    h.manager.navigate(Screen::new(second_root)).unwrap();
    h.select("fr").await;

    assert_eq!(second.displayed(), "Paramètres");
    assert_eq!(first.displayed(), "Hello");
    assert_eq!(first.write_count(), 0);
}

#[tokio::test]
async fn test_row_rebound_while_translating_gets_new_text() {
    let h = harness_with(
        PhrasebookProvider::new(book()).with_translate_latency(Duration::from_millis(150)),
        CacheConfig::default(),
    );
    let row = MemoryNode::text_view("Row 1");
    let root = MemoryNode::container(vec![row.clone()]);
    attach(&h, &root);

    assert!(h.coordinator.request_language("fr").await);
    assert_eq!(h.manager.snapshot().await.unwrap().in_flight, 1);

    // the list recycles the row before its translation lands
    row.rebind("Row 7");
    root.publish(TreeEvent::Layout);
    let snapshot = h.manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(row.displayed(), "Ligne 7");
    assert_eq!(snapshot.requests, 2);
}

#[tokio::test]
async fn test_removed_containers_are_no_longer_tracked() {
    let h = harness();
    let root = MemoryNode::container(vec![
        MemoryNode::container(vec![MemoryNode::text_view("Hello")]),
        MemoryNode::detached_container(vec![MemoryNode::text_view("Settings")]),
    ]);
    attach(&h, &root);
    h.select("fr").await;

    let snapshot = h.manager.snapshot().await.unwrap();
    assert_eq!(snapshot.watched, 3);
    assert_eq!(snapshot.observers, 2);

    root.remove_child(1);
    root.remove_child(0);
    let mut watched = snapshot.watched;
    for _ in 0..100 {
        tokio::time::sleep(Duration::from_millis(20)).await;
        watched = h.manager.snapshot().await.unwrap().watched;
        if watched == 1 {
            break;
        }
    }
    assert_eq!(watched, 1);
}
