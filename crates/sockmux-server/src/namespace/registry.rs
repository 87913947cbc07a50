//! Shared namespace-name → handler table.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use parking_lot::RwLock;
use sockmux_core::{ROOT_NAMESPACE, normalize_namespace};
use tracing::debug;

use super::handler::NamespaceHandler;
use crate::metrics::NAMESPACES_CREATED_TOTAL;

/// Registry mapping canonical namespace names to their handlers.
///
/// One registry belongs to one server and is shared with every connection
/// worker. Reads take a shared lock; inserts take the exclusive lock. Names
/// are normalized on every call, so `""` and `"/"` address the same entry.
/// Entries are never removed.
#[derive(Debug, Default)]
pub struct NamespaceRegistry {
    handlers: RwLock<HashMap<String, Arc<NamespaceHandler>>>,
}

impl NamespaceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `handler` under `name`, replacing any previous entry.
    ///
    /// The handler's own name must normalize to the same key; debug builds
    /// assert it.
    pub fn set(&self, name: &str, handler: Arc<NamespaceHandler>) {
        let name = normalize_namespace(name);
        debug_assert_eq!(
            normalize_namespace(handler.name()),
            name,
            "handler name does not match its registry key"
        );
        let _ = self.handlers.write().insert(name.to_owned(), handler);
    }

    /// Look up the handler for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<NamespaceHandler>> {
        self.handlers.read().get(normalize_namespace(name)).cloned()
    }

    /// Handler of the default namespace, if one exists.
    pub fn root(&self) -> Option<Arc<NamespaceHandler>> {
        self.get(ROOT_NAMESPACE)
    }

    /// Return the handler for `name`, creating an empty one if absent.
    ///
    /// Racing callers for the same unseen name all receive the same handler:
    /// the insert path re-checks under the exclusive lock.
    pub fn get_or_create(&self, name: &str) -> Arc<NamespaceHandler> {
        let name = normalize_namespace(name);
        if let Some(handler) = self.handlers.read().get(name) {
            return handler.clone();
        }

        let mut handlers = self.handlers.write();
        handlers
            .entry(name.to_owned())
            .or_insert_with(|| {
                debug!(namespace = name, "namespace created");
                counter!(NAMESPACES_CREATED_TOTAL).increment(1);
                Arc::new(NamespaceHandler::new(name))
            })
            .clone()
    }

    /// Whether a handler exists for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.read().contains_key(normalize_namespace(name))
    }

    /// Canonical names of every registered namespace, sorted.
    pub fn namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Whether no namespace has been registered or created.
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}
