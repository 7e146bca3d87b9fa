//! Hierarchical key/value save records.
//!
//! A [`ConfigNode`] has a name (its tag), an ordered list of string values
//! and an ordered list of child nodes. Every persisted object in this crate
//! writes itself as one node and reads itself back from one.

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    pub values: Vec<(String, String)>,
    pub nodes: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Append a value. Duplicate keys are kept; lookups return the first.
    pub fn add_value(&mut self, key: &str, value: impl ToString) {
        self.values.push((key.to_string(), value.to_string()));
    }

    /// Replace the first value named `key`, or append it.
    pub fn set_value(&mut self, key: &str, value: impl ToString) {
        match self.values.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.add_value(key, value),
        }
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// String value, empty if missing.
    pub fn str_value(&self, key: &str) -> &str {
        self.value(key).unwrap_or("")
    }

    /// Float value, 0.0 if missing or unparseable.
    pub fn f32_value(&self, key: &str) -> f32 {
        match self.value(key) {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!(node = %self.name, key, raw, "unparseable float in record");
                0.0
            }),
            None => 0.0,
        }
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.value(key).is_some()
    }

    pub fn add_node(&mut self, node: ConfigNode) {
        self.nodes.push(node);
    }

    /// First child named `name`.
    pub fn node(&self, name: &str) -> Option<&ConfigNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut ConfigNode> {
        self.nodes.iter_mut().find(|n| n.name == name)
    }

    pub fn nodes_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ConfigNode> {
        self.nodes.iter().filter(move |n| n.name == name)
    }

    pub fn nodes_named_mut<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a mut ConfigNode> {
        self.nodes.iter_mut().filter(move |n| n.name == name)
    }
}
