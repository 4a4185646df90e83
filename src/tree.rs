//! The tree store: `set`/`get`/`reset`/`close` delegate to the pluggable
//! [`Backend`], and multi-path `update` is built on top of `set`.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::Backend;
use crate::error::Result;
use crate::path::Ref;
use crate::query::QueryDescriptor;

/// Owns the pluggable backend and exposes the tree-store API consumed by
/// the session and REST adapter. Cheaply cloneable (an `Arc` around the
/// backend), since both the WebSocket and REST surfaces share one tree.
#[derive(Clone)]
pub struct Tree {
    backend: Arc<dyn Backend>,
}

impl Tree {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Tree { backend }
    }

    pub async fn set(&self, ref_: &Ref, value: Value) -> Result<()> {
        self.backend.set(ref_, value).await
    }

    pub async fn get(&self, ref_: &Ref, query: &QueryDescriptor) -> Result<Value> {
        self.backend.get(ref_, query).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.backend.reset().await
    }

    pub async fn close(&self) -> Result<()> {
        self.backend.close().await
    }

    /// Multi-path update: if `payload` is a mapping, writes each `(key,
    /// value)` pair to `join(base, key)` sequentially; otherwise behaves
    /// exactly like `set(base, payload)`. Returns the list of individually
    /// written refs, used to drive fan-out.
    ///
    /// Not atomic: if a sub-write fails partway through, the preceding
    /// writes remain visible and the error is surfaced to the caller.
    pub async fn update(&self, base: &Ref, payload: Value) -> Result<Vec<Ref>> {
        let Value::Object(map) = payload else {
            self.set(base, payload).await?;
            return Ok(vec![base.clone()]);
        };

        let mut changed = Vec::with_capacity(map.len());
        for (key, value) in map {
            let child_ref = base.join(&key)?;
            self.set(&child_ref, value).await?;
            changed.push(child_ref);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use serde_json::json;

    fn tree() -> Tree {
        Tree::new(Arc::new(MemoryBackend::new()))
    }

    #[tokio::test]
    async fn update_fans_out_sequential_sets() {
        let t = tree();
        let base = Ref::parse("/path/id1").unwrap();
        t.set(&base, json!({"text": "old", "number": 1})).await.unwrap();

        let changed = t
            .update(
                &Ref::root(),
                json!({
                    "path/id1/text": "revised",
                    "path/id1/number": null,
                    "path/id2": {"text": "v2"},
                }),
            )
            .await
            .unwrap();
        assert_eq!(changed.len(), 3);

        let q = QueryDescriptor::default();
        assert_eq!(
            t.get(&Ref::parse("/path/id1").unwrap(), &q).await.unwrap(),
            json!({"text": "revised"})
        );
        assert_eq!(
            t.get(&Ref::parse("/path/id2").unwrap(), &q).await.unwrap(),
            json!({"text": "v2"})
        );
    }

    #[tokio::test]
    async fn update_with_non_map_payload_behaves_like_set() {
        let t = tree();
        let base = Ref::parse("/leaf").unwrap();
        let changed = t.update(&base, json!("value")).await.unwrap();
        assert_eq!(changed, vec![base.clone()]);
        assert_eq!(t.get(&base, &QueryDescriptor::default()).await.unwrap(), json!("value"));
    }

    #[tokio::test]
    async fn shallow_root_after_update() {
        let t = tree();
        t.update(
            &Ref::parse("/path1/path2").unwrap(),
            json!({"id1": {"a": 1}, "id2": {"b": 2}}),
        )
        .await
        .unwrap();

        let shallow = QueryDescriptor { shallow: true, ..Default::default() };
        assert_eq!(t.get(&Ref::root(), &shallow).await.unwrap(), json!({"path1": true}));
        assert_eq!(
            t.get(&Ref::parse("/path1/path2").unwrap(), &shallow).await.unwrap(),
            json!({"id1": true, "id2": true})
        );
    }
}
