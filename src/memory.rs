//! In-context working memory for the current task
//!
//! A bounded key-value store rendered into the system prompt each turn.
//! Ordering is least-recently-used by last access or write; the oldest key
//! is evicted once capacity is exceeded.

use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Per-task working memory with LRU eviction
#[derive(Debug, Clone)]
pub struct WorkingMemory {
    max_items: usize,
    store: HashMap<String, Value>,
    /// Keys from least to most recently used
    order: Vec<String>,
}

impl WorkingMemory {
    pub fn new(max_items: usize) -> Self {
        WorkingMemory {
            max_items,
            store: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Store a key-value pair, promoting the key to most-recently-used
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        if self.store.contains_key(&key) {
            self.order.retain(|k| k != &key);
        }
        self.store.insert(key.clone(), value.into());
        self.order.push(key);

        while self.store.len() > self.max_items {
            let oldest = self.order.remove(0);
            self.store.remove(&oldest);
            debug!("Evicted working memory key: {}", oldest);
        }
    }

    /// Retrieve a value. A read counts as a touch and promotes the key.
    pub fn get(&mut self, key: &str) -> Option<&Value> {
        if self.store.contains_key(key) {
            self.order.retain(|k| k != key);
            self.order.push(key.to_string());
        }
        self.store.get(key)
    }

    /// Remove a key. Returns true if it existed.
    pub fn delete(&mut self, key: &str) -> bool {
        if self.store.remove(key).is_some() {
            self.order.retain(|k| k != key);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.order.clear();
    }

    /// Render memory for injection into the system prompt.
    ///
    /// Values are truncated to 200 characters with an ellipsis marker.
    pub fn to_context_string(&self) -> String {
        if self.store.is_empty() {
            return "Working memory: (empty)".to_string();
        }

        let mut lines = vec!["Working memory:".to_string()];
        for key in &self.order {
            let value = &self.store[key];
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let truncated: String = if rendered.chars().count() > 200 {
                let head: String = rendered.chars().take(200).collect();
                format!("{head}...")
            } else {
                rendered
            };
            lines.push(format!("  {key}: {truncated}"));
        }
        lines.join("\n")
    }

    /// Keys from least to most recently used
    pub fn keys(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.contains_key(key)
    }
}
