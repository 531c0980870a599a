//! Out-of-tree record of what each text-bearing node originally said.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use crate::view::{NodeKey, NodeRef, ViewNode};

/// Original text of one node or chrome entry, plus the translation last written to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    original: String,
    applied_text: Option<String>,
    applied_language: Option<String>,
}

impl Binding {
    pub fn capture(displayed: &str) -> Self {
        Self {
            original: displayed.to_string(),
            applied_text: None,
            applied_language: None,
        }
    }

    /// Reconcile with what the node displays now.
    ///
    /// Returns `true` when the original was re-captured, which starts a new
    /// binding episode.
    pub fn observe(&mut self, displayed: &str) -> bool {
        if displayed == self.original {
            return false;
        }
        if self.applied_language.is_some() && self.applied_text.as_deref() == Some(displayed) {
            // our own translation is on screen
            return false;
        }
        self.original = displayed.to_string();
        self.clear_tag();
        true
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn applied_language(&self) -> Option<&str> {
        self.applied_language.as_deref()
    }

    pub fn is_tagged(&self, language: &str) -> bool {
        self.applied_language.as_deref() == Some(language)
    }

    /// Blank and digit-only text is left alone
    pub fn is_translatable(&self) -> bool {
        let trimmed = self.original.trim();
        !trimmed.is_empty() && !trimmed.chars().all(|c| c.is_ascii_digit())
    }

    pub fn mark_applied(&mut self, language: &str, text: &str) {
        self.applied_language = Some(language.to_string());
        self.applied_text = Some(text.to_string());
    }

    pub fn clear_tag(&mut self) {
        self.applied_language = None;
        self.applied_text = None;
    }
}

struct NodeEntry {
    node: Weak<dyn ViewNode>,
    binding: Binding,
}

impl NodeEntry {
    fn new(node: &NodeRef, displayed: &str) -> Self {
        Self {
            node: Arc::downgrade(node),
            binding: Binding::capture(displayed),
        }
    }

    fn live(&self, key: NodeKey) -> Option<NodeRef> {
        self.node.upgrade().filter(|node| NodeKey::of(node) == key)
    }
}

/// Bindings keyed by node identity; entries die with their node
#[derive(Default)]
pub struct BindingTable {
    entries: HashMap<NodeKey, NodeEntry>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binding for `node`, captured on first sight and reconciled afterwards
    pub fn observe(&mut self, node: &NodeRef, displayed: &str) -> &mut Binding {
        let key = NodeKey::of(node);
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| NodeEntry::new(node, displayed));
        if entry.live(key).is_none() {
            // address reused by a new node
            *entry = NodeEntry::new(node, displayed);
        } else {
            entry.binding.observe(displayed);
        }
        &mut entry.binding
    }

    pub fn get(&self, node: &NodeRef) -> Option<&Binding> {
        let key = NodeKey::of(node);
        self.entries
            .get(&key)
            .filter(|entry| entry.live(key).is_some())
            .map(|entry| &entry.binding)
    }

    /// Live nodes with their bindings
    pub fn live_mut(&mut self) -> impl Iterator<Item = (NodeRef, &mut Binding)> {
        self.entries.iter_mut().filter_map(|(key, entry)| {
            let node = entry.live(*key)?;
            Some((node, &mut entry.binding))
        })
    }

    /// Drop entries whose node is gone; returns how many were dropped
    pub fn prune(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, entry| entry.live(*key).is_some());
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
