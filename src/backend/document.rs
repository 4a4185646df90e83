use async_trait::async_trait;
use serde_json::Value;

use super::Backend;
use crate::error::{Error, Result};
use crate::path::Ref;
use crate::query::QueryDescriptor;

/// Placeholder for a persistent, document-store-backed alternative to
/// [`super::MemoryBackend`], selected with `--mongo=<path>`.
///
/// This stub exists so `--mongo` is a recognized, wired-up flag rather than
/// a dead one, but every operation returns [`Error::Unimplemented`] until a
/// real document-store client is built against the same [`Backend`]
/// contract `MemoryBackend` satisfies.
pub struct DocumentBackend {
    #[allow(dead_code)]
    config_path: std::path::PathBuf,
}

impl DocumentBackend {
    pub fn new(config_path: std::path::PathBuf) -> Self {
        DocumentBackend { config_path }
    }
}

#[async_trait]
impl Backend for DocumentBackend {
    async fn set(&self, _ref_: &Ref, _value: Value) -> Result<()> {
        Err(Error::Unimplemented("document backend"))
    }

    async fn get(&self, _ref_: &Ref, _query: &QueryDescriptor) -> Result<Value> {
        Err(Error::Unimplemented("document backend"))
    }

    async fn reset(&self) -> Result<()> {
        Err(Error::Unimplemented("document backend"))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
