//! Screen Translator - on-device translation of a live view tree
//!
//! Replaces the text of every visible text node with a translation in the
//! selected language, keeps dynamically added and scrolled-in content
//! translated, and restores the original texts on demand.

pub mod cache;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod manager;
pub mod model;
pub mod picker;
pub mod repository;
pub mod session;
pub mod view;
