use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

use super::{Chrome, MenuItem, NodeKind, NodeRef, Screen, TreeEvent, ViewNode};
use crate::error::{Result, TranslatorError};

const EVENT_CAPACITY: usize = 64;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-process view node
pub struct MemoryNode {
    kind: NodeKind,
    text: Mutex<String>,
    children: Mutex<Vec<Arc<MemoryNode>>>,
    realized: Mutex<Option<Range<usize>>>,
    events: broadcast::Sender<TreeEvent>,
    observable: bool,
    writes: AtomicUsize,
}

impl MemoryNode {
    fn build(kind: NodeKind, text: &str, children: Vec<Arc<MemoryNode>>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            kind,
            text: Mutex::new(text.to_string()),
            children: Mutex::new(children),
            realized: Mutex::new(None),
            events,
            observable: true,
            writes: AtomicUsize::new(0),
        }
    }

    pub fn text_view(text: &str) -> Arc<Self> {
        Arc::new(Self::build(NodeKind::Text, text, Vec::new()))
    }

    pub fn container(children: Vec<Arc<MemoryNode>>) -> Arc<Self> {
        Arc::new(Self::build(NodeKind::Container, "", children))
    }

    /// Container that refuses observers, like a node already detached from its window
    pub fn detached_container(children: Vec<Arc<MemoryNode>>) -> Arc<Self> {
        let mut node = Self::build(NodeKind::Container, "", children);
        node.observable = false;
        Arc::new(node)
    }

    /// Scrollable container with the first `visible` children realized
    pub fn scrollable(children: Vec<Arc<MemoryNode>>, visible: usize) -> Arc<Self> {
        let node = Self::build(NodeKind::Scrollable, "", children);
        *lock(&node.realized) = Some(0..visible);
        Arc::new(node)
    }

    pub fn other() -> Arc<Self> {
        Arc::new(Self::build(NodeKind::Other, "", Vec::new()))
    }

    /// Currently displayed text
    pub fn displayed(&self) -> String {
        lock(&self.text).clone()
    }

    /// Host-side content change, such as a list item being rebound to new data
    pub fn rebind(&self, text: &str) {
        *lock(&self.text) = text.to_string();
    }

    /// Number of writes the engine made through `set_text`
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn child(&self, index: usize) -> Option<Arc<MemoryNode>> {
        lock(&self.children).get(index).cloned()
    }

    pub fn add_child(&self, child: Arc<MemoryNode>) {
        lock(&self.children).push(child);
        self.publish(if self.kind == NodeKind::Scrollable {
            TreeEvent::Inserted
        } else {
            TreeEvent::ChildAdded
        });
    }

    pub fn remove_child(&self, index: usize) -> Option<Arc<MemoryNode>> {
        let removed = {
            let mut children = lock(&self.children);
            (index < children.len()).then(|| children.remove(index))
        };
        if removed.is_some() {
            self.publish(TreeEvent::ChildRemoved);
        }
        removed
    }

    /// Realize a different window of children
    pub fn scroll_to(&self, window: Range<usize>) {
        *lock(&self.realized) = Some(window);
        self.publish(TreeEvent::Scrolled);
    }

    pub fn publish(&self, event: TreeEvent) {
        // nobody listening is fine
        let _ = self.events.send(event);
    }

    pub fn observer_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Every text node below this one, in traversal order
    pub fn text_nodes(self: &Arc<Self>) -> Vec<Arc<MemoryNode>> {
        let mut out = Vec::new();
        collect_text(self, &mut out);
        out
    }
}

fn collect_text(node: &Arc<MemoryNode>, out: &mut Vec<Arc<MemoryNode>>) {
    if node.kind == NodeKind::Text {
        out.push(Arc::clone(node));
    }
    for child in lock(&node.children).iter() {
        collect_text(child, out);
    }
}

impl ViewNode for MemoryNode {
    fn kind(&self) -> NodeKind {
        self.kind
    }

    fn children(&self) -> Vec<NodeRef> {
        let children = lock(&self.children);
        let window = match self.kind {
            NodeKind::Scrollable => lock(&self.realized).clone().unwrap_or(0..children.len()),
            _ => 0..children.len(),
        };
        let end = window.end.min(children.len());
        let start = window.start.min(end);
        children[start..end]
            .iter()
            .map(|child| Arc::clone(child) as NodeRef)
            .collect()
    }

    fn text(&self) -> Option<String> {
        match self.kind {
            NodeKind::Text => Some(self.displayed()),
            _ => None,
        }
    }

    fn set_text(&self, text: &str) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        *lock(&self.text) = text.to_string();
    }

    fn observe(&self) -> Result<broadcast::Receiver<TreeEvent>> {
        if !self.observable {
            return Err(TranslatorError::Observe("node is detached".to_string()));
        }
        Ok(self.events.subscribe())
    }
}

/// In-process title bar and navigation menu
#[derive(Default)]
pub struct MemoryChrome {
    title: Mutex<Option<String>>,
    menu: Mutex<Vec<MenuItem>>,
}

impl MemoryChrome {
    pub fn new(title: Option<&str>, menu: Vec<MenuItem>) -> Arc<Self> {
        Arc::new(Self {
            title: Mutex::new(title.map(str::to_string)),
            menu: Mutex::new(menu),
        })
    }

    pub fn menu_title(&self, id: u32) -> Option<String> {
        lock(&self.menu)
            .iter()
            .find(|item| item.id == id)
            .map(|item| item.title.clone())
    }
}

impl Chrome for MemoryChrome {
    fn title(&self) -> Option<String> {
        lock(&self.title).clone()
    }

    fn set_title(&self, title: &str) {
        *lock(&self.title) = Some(title.to_string());
    }

    fn menu_items(&self) -> Vec<MenuItem> {
        lock(&self.menu).clone()
    }

    fn set_menu_title(&self, id: u32, title: &str) {
        if let Some(item) = lock(&self.menu).iter_mut().find(|item| item.id == id) {
            item.title = title.to_string();
        }
    }
}

/// Serializable description of a screen
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum NodeSpec {
    Container {
        #[serde(default)]
        children: Vec<NodeSpec>,
    },
    Scrollable {
        #[serde(default)]
        children: Vec<NodeSpec>,
        /// Realized children; all when absent
        #[serde(default)]
        visible: Option<usize>,
    },
    Text {
        text: String,
    },
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScreenSpec {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub menu: Vec<MenuItem>,
    pub root: NodeSpec,
}

impl ScreenSpec {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(TranslatorError::FileNotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| TranslatorError::Screen(format!("{}: {}", path.display(), e)))
    }

    pub fn build(&self) -> MemoryScreen {
        MemoryScreen {
            root: build_node(&self.root),
            chrome: MemoryChrome::new(self.title.as_deref(), self.menu.clone()),
        }
    }
}

fn build_node(spec: &NodeSpec) -> Arc<MemoryNode> {
    match spec {
        NodeSpec::Container { children } => {
            MemoryNode::container(children.iter().map(build_node).collect())
        }
        NodeSpec::Scrollable { children, visible } => MemoryNode::scrollable(
            children.iter().map(build_node).collect(),
            visible.unwrap_or(children.len()),
        ),
        NodeSpec::Text { text } => MemoryNode::text_view(text),
        NodeSpec::Other => MemoryNode::other(),
    }
}

/// A built screen, keeping concrete handles for inspection
#[derive(Clone)]
pub struct MemoryScreen {
    pub root: Arc<MemoryNode>,
    pub chrome: Arc<MemoryChrome>,
}

impl MemoryScreen {
    pub fn screen(&self) -> Screen {
        let root: NodeRef = self.root.clone();
        let chrome: Arc<dyn Chrome> = self.chrome.clone();
        Screen::new(root).with_chrome(chrome)
    }

    /// Indented dump of the chrome and the whole tree
    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(title) = self.chrome.title() {
            out.push_str(&format!("[title] {}\n", title));
        }
        for item in self.chrome.menu_items() {
            out.push_str(&format!("[menu {}] {}\n", item.id, item.title));
        }
        render_node(&self.root, 0, &mut out);
        out
    }
}

fn render_node(node: &Arc<MemoryNode>, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match node.kind {
        NodeKind::Text => out.push_str(&format!("{}- {}\n", indent, node.displayed())),
        NodeKind::Container => out.push_str(&format!("{}+ container\n", indent)),
        NodeKind::Scrollable => out.push_str(&format!("{}+ scrollable\n", indent)),
        NodeKind::Other => out.push_str(&format!("{}* other\n", indent)),
    }
    for child in lock(&node.children).iter() {
        render_node(child, depth + 1, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrollable_exposes_realized_children_only() {
        let list = MemoryNode::scrollable(
            (0..10).map(|i| MemoryNode::text_view(&format!("Row {}", i))).collect(),
            3,
        );
        assert_eq!(list.children().len(), 3);
        list.scroll_to(8..12);
        let visible: Vec<String> = list.children().iter().filter_map(|c| c.text()).collect();
        assert_eq!(visible, vec!["Row 8", "Row 9"]);
    }

    #[test]
    fn test_screen_spec_from_json() {
        let json = r#"{
            "title": "Home",
            "menu": [{"id": 1, "title": "Home"}, {"id": 2, "title": "Dashboard"}],
            "root": {"kind": "container", "children": [
                {"kind": "text", "text": "Hello"},
                {"kind": "other"},
                {"kind": "scrollable", "visible": 1, "children": [
                    {"kind": "text", "text": "First"},
                    {"kind": "text", "text": "Second"}
                ]}
            ]}
        }"#;
        let spec: ScreenSpec = serde_json::from_str(json).unwrap();
        let screen = spec.build();

        assert_eq!(screen.chrome.title().as_deref(), Some("Home"));
        assert_eq!(screen.chrome.menu_title(2).as_deref(), Some("Dashboard"));
        assert_eq!(screen.root.text_nodes().len(), 3);
        let rendered = screen.render();
        assert!(rendered.contains("[menu 1] Home"));
        assert!(rendered.contains("  - Hello"));
        assert!(rendered.contains("    - Second"));
    }

    #[test]
    fn test_set_text_counts_writes_but_rebind_does_not() {
        let node = MemoryNode::text_view("Hello");
        node.set_text("Bonjour");
        node.rebind("Goodbye");
        assert_eq!(node.write_count(), 1);
        assert_eq!(node.displayed(), "Goodbye");
    }

    #[test]
    fn test_detached_container_refuses_observers() {
        let node = MemoryNode::detached_container(Vec::new());
        assert!(node.observe().is_err());
        let live = MemoryNode::container(Vec::new());
        let _rx = live.observe().unwrap();
        assert_eq!(live.observer_count(), 1);
    }
}
