//! Handler registries.
//!
//! # Responsibilities
//! - One concurrency-safe table per protocol family
//! - Add never overwrites; remove of a missing key is a no-op
//! - Lookup: exact key first, then longest registered prefix
//!
//! # Design Decisions
//! - Each table has its own lock, held only for the map operation; handlers
//!   are handed out as `Arc`s and run after the lock is released
//! - Insertion order is kept so prefix ties resolve to the earliest
//!   registration
//! - A poisoned lock is recovered: tables hold no invariants a panicking
//!   writer could break halfway

use indexmap::IndexMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::dispatch::generic::GenericHttpHandler;
use crate::dispatch::llsd::LlsdHandler;
use crate::dispatch::poll::PollServiceArgs;
use crate::dispatch::stream::StreamHandler;
use crate::dispatch::xmlrpc::{XmlRpcEntry, XmlRpcMethod};
use crate::routing::matcher::best_prefix;

/// One handler table.
pub struct HandlerTable<V: ?Sized> {
    name: &'static str,
    case_insensitive: bool,
    entries: RwLock<IndexMap<String, Arc<V>>>,
}

impl<V: ?Sized> HandlerTable<V> {
    pub fn new(name: &'static str, case_insensitive: bool) -> Self {
        Self {
            name,
            case_insensitive,
            entries: RwLock::new(IndexMap::new()),
        }
    }

    /// Register `handler` under `key`. Returns false if the key is taken.
    pub fn add(&self, key: &str, handler: Arc<V>) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(key) {
            tracing::debug!(table = self.name, key, "Handler already registered");
            return false;
        }
        entries.insert(key.to_string(), handler);
        tracing::debug!(table = self.name, key, "Handler registered");
        true
    }

    /// Remove the handler under `key`. Returns whether one was removed.
    pub fn remove(&self, key: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.shift_remove(key).is_some()
    }

    /// Exact-key lookup.
    pub fn get_exact(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    /// Exact match, else the longest registered prefix of `key`.
    pub fn lookup(&self, key: &str) -> Option<Arc<V>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        if let Some(handler) = entries.get(key) {
            return Some(handler.clone());
        }
        best_prefix(entries.keys().map(String::as_str), key, self.case_insensitive)
            .and_then(|best| entries.get(best).cloned())
    }

    /// Whether `lookup` would find a handler.
    pub fn matches(&self, key: &str) -> bool {
        self.lookup(key).is_some()
    }

    /// Registered keys in registration order.
    pub fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Key for the stream table.
pub fn stream_key(method: &str, path: &str) -> String {
    format!("{}:{}", method.to_ascii_uppercase(), path)
}

/// All handler tables served by one listener.
pub struct HandlerRegistries {
    /// Keyed by `METHOD:path`.
    pub stream: HandlerTable<StreamHandler>,
    /// Keyed by path; case-sensitive like `stream`.
    pub http: HandlerTable<dyn GenericHttpHandler>,
    /// Keyed by path; layered on `http`.
    pub poll: HandlerTable<PollServiceArgs>,
    /// Keyed by path; looked up case-insensitively.
    pub llsd: HandlerTable<dyn LlsdHandler>,
    /// Keyed by method name.
    pub xmlrpc: HandlerTable<XmlRpcEntry>,
}

impl HandlerRegistries {
    pub fn new() -> Self {
        Self {
            stream: HandlerTable::new("stream", false),
            http: HandlerTable::new("http", false),
            poll: HandlerTable::new("poll", false),
            llsd: HandlerTable::new("llsd", true),
            xmlrpc: HandlerTable::new("xmlrpc", false),
        }
    }

    pub fn add_stream_handler(&self, method: &str, path: &str, handler: StreamHandler) -> bool {
        self.stream.add(&stream_key(method, path), Arc::new(handler))
    }

    pub fn remove_stream_handler(&self, method: &str, path: &str) -> bool {
        self.stream.remove(&stream_key(method, path))
    }

    pub fn add_http_handler(&self, path: &str, handler: impl GenericHttpHandler + 'static) -> bool {
        self.http.add(path, Arc::new(handler))
    }

    pub fn remove_http_handler(&self, path: &str) -> bool {
        self.http.remove(path)
    }

    /// Register a poll handler together with the generic HTTP handler that
    /// serves the same path when it is reached without the poll hand-off.
    ///
    /// Fails without registering anything if either path is taken.
    pub fn add_poll_handler(
        &self,
        path: &str,
        handler: impl GenericHttpHandler + 'static,
        args: PollServiceArgs,
    ) -> bool {
        if self.poll.get_exact(path).is_some() || self.http.get_exact(path).is_some() {
            return false;
        }
        if !self.poll.add(path, Arc::new(args)) {
            return false;
        }
        if !self.http.add(path, Arc::new(handler)) {
            self.poll.remove(path);
            return false;
        }
        true
    }

    /// Remove a poll handler and its paired generic HTTP handler.
    pub fn remove_poll_handler(&self, path: &str) -> bool {
        let removed = self.poll.remove(path);
        if removed {
            self.http.remove(path);
        }
        removed
    }

    pub fn add_llsd_handler(&self, path: &str, handler: impl LlsdHandler + 'static) -> bool {
        self.llsd.add(path, Arc::new(handler))
    }

    pub fn remove_llsd_handler(&self, path: &str) -> bool {
        self.llsd.remove(path)
    }

    /// Register an XML-RPC method; its responses carry keep-alive.
    pub fn add_xmlrpc_handler(&self, method: &str, handler: impl XmlRpcMethod + 'static) -> bool {
        self.add_xmlrpc_handler_with_keep_alive(method, handler, true)
    }

    pub fn add_xmlrpc_handler_with_keep_alive(
        &self,
        method: &str,
        handler: impl XmlRpcMethod + 'static,
        keep_alive: bool,
    ) -> bool {
        let entry = XmlRpcEntry {
            method: Box::new(handler),
            keep_alive,
        };
        self.xmlrpc.add(method, Arc::new(entry))
    }

    pub fn remove_xmlrpc_handler(&self, method: &str) -> bool {
        self.xmlrpc.remove(method)
    }
}

impl Default for HandlerRegistries {
    fn default() -> Self {
        Self::new()
    }
}
