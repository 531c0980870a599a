// Abstract view capability
//
// The manager never sees concrete UI toolkit types. A host adapts its widget
// tree to `ViewNode` and its title bar / navigation bar to `Chrome`:
// - memory: in-process tree used by the CLI and tests

pub mod memory;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::error::{Result, TranslatorError};

pub use memory::{MemoryChrome, MemoryNode, MemoryScreen, NodeSpec, ScreenSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Holds children, all of which exist
    Container,
    /// Holds children of which only the realized ones are reachable
    Scrollable,
    /// Displays text
    Text,
    /// Anything else; ignored
    Other,
}

/// Change signals a node can publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEvent {
    ChildAdded,
    ChildRemoved,
    Layout,
    /// Items inserted into a scrollable container
    Inserted,
    /// Scrollable container rebound its items
    Refreshed,
    Scrolled,
}

impl TreeEvent {
    /// Events that realize new children of a scrollable container
    pub fn is_scroll(&self) -> bool {
        matches!(self, Self::Inserted | Self::Refreshed | Self::Scrolled)
    }
}

pub trait ViewNode: Send + Sync {
    fn kind(&self) -> NodeKind;

    /// Children currently reachable, in display order
    fn children(&self) -> Vec<NodeRef>;

    /// Displayed text of a text-bearing node
    fn text(&self) -> Option<String>;

    fn set_text(&self, text: &str);

    /// Subscribe to structural changes of this node
    fn observe(&self) -> Result<broadcast::Receiver<TreeEvent>> {
        Err(TranslatorError::Observe("node publishes no events".to_string()))
    }
}

pub type NodeRef = Arc<dyn ViewNode>;

/// Stable identity of a live node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &NodeRef) -> Self {
        Self(Arc::as_ptr(node) as *const () as usize)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    pub id: u32,
    pub title: String,
}

/// Title bar and navigation items
pub trait Chrome: Send + Sync {
    fn title(&self) -> Option<String>;

    fn set_title(&self, title: &str);

    fn menu_items(&self) -> Vec<MenuItem>;

    fn set_menu_title(&self, id: u32, title: &str);
}

/// What the manager translates: one view tree plus optional chrome
#[derive(Clone)]
pub struct Screen {
    pub root: NodeRef,
    pub chrome: Option<Arc<dyn Chrome>>,
}

impl Screen {
    pub fn new(root: NodeRef) -> Self {
        Self { root, chrome: None }
    }

    pub fn with_chrome(mut self, chrome: Arc<dyn Chrome>) -> Self {
        self.chrome = Some(chrome);
        self
    }
}
