//! Bounded per-language translation caches.
//!
//! Each target language owns an LRU map from original text to translated
//! text. Only a handful of languages keep a cache at the same time; touching
//! a new language beyond that limit drops the least recently used language
//! together with all of its entries.

use lru::LruCache;
use std::num::NonZeroUsize;
use tracing::debug;

use crate::config::CacheConfig;

/// Hit and miss counters, reported by the manager snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub languages: usize,
    pub entries: usize,
}

#[derive(Debug)]
pub struct LanguageCaches {
    languages: LruCache<String, LruCache<String, String>>,
    per_language: NonZeroUsize,
    hits: u64,
    misses: u64,
}

fn non_zero(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap_or(NonZeroUsize::MIN)
}

impl LanguageCaches {
    pub fn new(per_language_capacity: usize, max_languages: usize) -> Self {
        Self {
            languages: LruCache::new(non_zero(max_languages)),
            per_language: non_zero(per_language_capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.per_language_capacity, config.max_languages)
    }

    /// Mark `language` as most recently used, creating its cache if needed.
    pub fn touch(&mut self, language: &str) {
        self.language_mut(language);
    }

    fn language_mut(&mut self, language: &str) -> &mut LruCache<String, String> {
        if !self.languages.contains(language) && self.languages.len() >= self.languages.cap().get() {
            if let Some((dropped, entries)) = self.languages.pop_lru() {
                debug!(
                    "Evicted translation cache for '{}' ({} entries)",
                    dropped,
                    entries.len()
                );
            }
        }
        let capacity = self.per_language;
        self.languages
            .get_or_insert_mut(language.to_string(), || LruCache::new(capacity))
    }

    /// Look up a translation, counting the hit or miss.
    pub fn get(&mut self, language: &str, original: &str) -> Option<String> {
        let found = self
            .languages
            .get_mut(language)
            .and_then(|entries| entries.get(original).cloned());
        match found {
            Some(_) => self.hits += 1,
            None => self.misses += 1,
        }
        found
    }

    pub fn insert(&mut self, language: &str, original: &str, translated: &str) {
        self.language_mut(language)
            .put(original.to_string(), translated.to_string());
    }

    pub fn contains_language(&self, language: &str) -> bool {
        self.languages.contains(language)
    }

    pub fn len(&self, language: &str) -> usize {
        self.languages.peek(language).map(|c| c.len()).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.languages.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits,
            misses: self.misses,
            languages: self.languages.len(),
            entries: self.languages.iter().map(|(_, c)| c.len()).sum(),
        }
    }
}
