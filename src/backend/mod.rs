//! The storage interface the tree store consumes.
//!
//! The engine treats the backend as an external collaborator: it assumes
//! (1) read-your-writes on any prefix or suffix of a written path, (2)
//! safety under concurrent callers, and (3) that `get` returns a
//! structurally independent copy. [`MemoryBackend`] is the only fully
//! built-out implementation; [`DocumentBackend`] is a stub selected by
//! `--mongo`, standing in for a persistent store whose internals live
//! outside this crate.

mod document;
mod memory;

pub use document::DocumentBackend;
pub use memory::MemoryBackend;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;
use crate::path::Ref;
use crate::query::QueryDescriptor;

/// A pluggable data store behind the tree. Mirrors the Go `db.Client`
/// interface in `examples/original_source/pkg/db/db.go`.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Overwrites the subtree at `ref_` with `value`. `Value::Null` removes
    /// the node.
    async fn set(&self, ref_: &Ref, value: Value) -> Result<()>;

    /// Reads the subtree at `ref_` and applies `query`, returning a deep
    /// copy (or `Value::Null` if the path is absent).
    async fn get(&self, ref_: &Ref, query: &QueryDescriptor) -> Result<Value>;

    /// Replaces the whole tree with an empty mapping. Used by tests.
    async fn reset(&self) -> Result<()>;

    /// Releases any resources held by this backend connection. A no-op
    /// for the in-memory backend.
    async fn close(&self) -> Result<()>;
}
