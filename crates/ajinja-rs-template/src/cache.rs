//! Parsed-template cache.
//!
//! Segmenting is cheap but not free, and hosts often render the same source
//! many times with different contexts. [`TemplateCache`] memoizes the node
//! sequence for each distinct source string.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::segmenter::{self, TemplateNode};

/// Maps template source text to its segmented nodes.
///
/// Entries are shared via [`Arc`], so a cached template can be rendered from
/// several threads at once. A poisoned lock is recovered rather than
/// propagated, since every write leaves the map in a consistent state.
#[derive(Debug, Default)]
pub struct TemplateCache {
    templates: RwLock<HashMap<String, Arc<[TemplateNode]>>>,
}

impl TemplateCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached nodes for `source`, if any.
    pub fn get(&self, source: &str) -> Option<Arc<[TemplateNode]>> {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(source)
            .cloned()
    }

    /// Stores the nodes for `source`, replacing any previous entry.
    pub fn insert(&self, source: impl Into<String>, nodes: Arc<[TemplateNode]>) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(source.into(), nodes);
    }

    /// Returns the cached nodes for `source`, segmenting and storing them on a miss.
    pub fn get_or_parse(&self, source: &str) -> Arc<[TemplateNode]> {
        if let Some(nodes) = self.get(source) {
            debug!(len = source.len(), "template cache hit");
            return nodes;
        }
        debug!(len = source.len(), "template cache miss");
        let nodes: Arc<[TemplateNode]> = segmenter::parse(source).into();
        self.insert(source, Arc::clone(&nodes));
        nodes
    }

    /// Number of cached templates.
    pub fn len(&self) -> usize {
        self.templates
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every cached template.
    pub fn clear(&self) {
        self.templates
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
