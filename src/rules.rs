//! Security rules front door.
//!
//! Ported from `examples/original_source/pkg/rules/rules.go`. Rules are
//! treated as an opaque validator that may reject a write or mark a query
//! as missing an index — but the rules *document* itself (loading the
//! JSON, navigating `$variable` children, reading `.indexOn`) is distinct
//! from the expression evaluator that would check `.read`/`.write`/
//! `.validate`, and is implemented here in full.
//!
//! This module never rejects a write or a query: there is no in-crate
//! expression engine, so `.read`/`.write`/`.validate` are never evaluated.
//! The one thing this module *does* decide is whether a query's
//! `order_by` has a matching `.indexOn` entry, which drives the
//! `no_index` warning.

use std::path::Path;

use serde_json::Value;

use crate::error::Result;
use crate::path::Ref;

/// A node (or subtree) of the rules document.
#[derive(Debug, Clone, Default)]
pub struct Rules(Value);

impl Rules {
    /// Reads and parses the rules file, descending to the top-level
    /// `rules` key. Returns `Ok(None)` if no path was given, matching the
    /// original's `Import("")` behavior.
    pub fn import(path: Option<&Path>) -> Result<Option<Rules>> {
        let Some(path) = path else { return Ok(None) };
        let bytes = std::fs::read(path)?;
        let doc: Value = serde_json::from_slice(&bytes)?;
        let root = Rules(doc);
        Ok(root.child_by_name("rules"))
    }

    /// Whether this node has the literal key `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.get(key).is_some()
    }

    /// The `$variable` key at this level (excluding `$other`), if any.
    pub fn variable_key(&self) -> Option<String> {
        let obj = self.0.as_object()?;
        obj.keys().find(|k| k.starts_with('$') && k.as_str() != "$other").cloned()
    }

    /// Descends through each segment of `path`, substituting the
    /// `$variable` key when the literal segment isn't present.
    pub fn child(&self, path: &Ref) -> Rules {
        let mut cur = self.clone();
        for segment in path.segments() {
            match cur.child_by_name(segment) {
                Some(next) => cur = next,
                None => return Rules(Value::Null),
            }
        }
        cur
    }

    /// The `.indexOn` list at this level, if any.
    pub fn indexes(&self) -> Vec<String> {
        self.0
            .get(".indexOn")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default()
    }

    /// Whether a query ordered by `order_by` has a matching index at this
    /// node. `.key`/`.value`/empty orderings never require an index.
    pub fn has_index_for(&self, order_by: &str) -> bool {
        if order_by.is_empty() || order_by == ".key" || order_by == ".value" {
            return true;
        }
        self.indexes().iter().any(|idx| idx == order_by)
    }

    fn child_by_name(&self, name: &str) -> Option<Rules> {
        let value = if let Some(v) = self.0.get(name) {
            v.clone()
        } else if let Some(var) = self.variable_key() {
            self.0.get(&var)?.clone()
        } else {
            return None;
        };
        if value.is_object() {
            Some(Rules(value))
        } else {
            None
        }
    }
}
