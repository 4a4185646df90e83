use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use super::Backend;
use crate::error::Result;
use crate::path::Ref;
use crate::query::{evaluate, QueryDescriptor};

/// The in-memory tree backend: a single reader/writer lock guarding a JSON
/// object as the entire tree.
///
/// Grounded in `examples/original_source/pkg/db/memory/client.go`: walk
/// segments, creating missing interior mappings and overwriting scalar
/// interior segments with mappings, exactly as the Go client does.
pub struct MemoryBackend {
    root: RwLock<Map<String, Value>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        MemoryBackend { root: RwLock::new(Map::new()) }
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn set(&self, ref_: &Ref, value: Value) -> Result<()> {
        let mut root = self.root.write();
        let segments = ref_.segments();

        if segments.is_empty() {
            // Writing to the root: replace the whole tree wholesale, or
            // clear it if null.
            *root = match value {
                Value::Null => Map::new(),
                Value::Object(m) => m,
                // A scalar written directly at the root can't be held: the
                // root must always be a mapping, so fold it to empty.
                _ => Map::new(),
            };
            return Ok(());
        }

        let mut cursor = &mut *root;
        for (i, segment) in segments.iter().enumerate() {
            let is_last = i == segments.len() - 1;
            if is_last {
                if value.is_null() {
                    cursor.remove(segment.as_ref());
                } else {
                    cursor.insert(segment.to_string(), value);
                }
                return Ok(());
            }

            let slot = cursor.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            cursor = slot.as_object_mut().expect("just normalized to object");
        }

        Ok(())
    }

    async fn get(&self, ref_: &Ref, query: &QueryDescriptor) -> Result<Value> {
        // Deep-copy the whole tree under the read lock (matching the
        // `mohae/deepcopy` call in the original client), then release the
        // lock before navigating and projecting, since neither of those
        // steps needs it.
        let snapshot = Value::Object(self.root.read().clone());

        let mut cur = &snapshot;
        for segment in ref_.segments() {
            match cur.get(segment.as_ref()) {
                Some(next) => cur = next,
                None => return Ok(Value::Null),
            }
        }

        Ok(evaluate(cur, query))
    }

    async fn reset(&self) -> Result<()> {
        *self.root.write() = Map::new();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn q() -> QueryDescriptor {
        QueryDescriptor::default()
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let backend = MemoryBackend::new();
        let path = Ref::parse("/path/id1").unwrap();
        backend.set(&path, json!({"text": "v1"})).await.unwrap();
        assert_eq!(backend.get(&path, &q()).await.unwrap(), json!({"text": "v1"}));
    }

    #[tokio::test]
    async fn set_null_removes_node() {
        let backend = MemoryBackend::new();
        let path = Ref::parse("/path/id1").unwrap();
        backend.set(&path, json!({"text": "v1"})).await.unwrap();
        backend.set(&path, Value::Null).await.unwrap();
        assert_eq!(backend.get(&path, &q()).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn missing_path_reads_null() {
        let backend = MemoryBackend::new();
        let path = Ref::parse("/nope").unwrap();
        assert_eq!(backend.get(&path, &q()).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn interior_scalar_is_overwritten_by_mapping() {
        let backend = MemoryBackend::new();
        let scalar_path = Ref::parse("/a").unwrap();
        backend.set(&scalar_path, json!("leaf")).await.unwrap();

        let deeper = Ref::parse("/a/b").unwrap();
        backend.set(&deeper, json!(1)).await.unwrap();

        assert_eq!(backend.get(&scalar_path, &q()).await.unwrap(), json!({"b": 1}));
    }

    #[tokio::test]
    async fn get_does_not_mutate_tree() {
        let backend = MemoryBackend::new();
        let path = Ref::parse("/path").unwrap();
        backend.set(&path, json!({"a": 1})).await.unwrap();
        let first = backend.get(&path, &q()).await.unwrap();
        let second = backend.get(&path, &q()).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn reset_clears_tree() {
        let backend = MemoryBackend::new();
        backend.set(&Ref::parse("/a").unwrap(), json!(1)).await.unwrap();
        backend.reset().await.unwrap();
        assert_eq!(backend.get(&Ref::root(), &q()).await.unwrap(), json!({}));
    }
}
