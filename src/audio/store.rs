use std::path::Path;
use tracing::debug;

use crate::codec;
use crate::error::{Result, StreamError};

/// Platform storage holding captured slice artifacts
#[async_trait::async_trait]
pub trait SliceStore: Send + Sync {
    /// Read an artifact as base64 text
    async fn read_base64(&self, uri: &str) -> Result<String>;

    async fn delete(&self, uri: &str) -> Result<()>;
}

/// Artifacts stored as plain files
#[derive(Debug, Clone, Default)]
pub struct FsSliceStore;

impl FsSliceStore {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl SliceStore for FsSliceStore {
    async fn read_base64(&self, uri: &str) -> Result<String> {
        let bytes = tokio::fs::read(Path::new(uri))
            .await
            .map_err(|e| StreamError::Storage(format!("failed to read {}: {}", uri, e)))?;
        Ok(codec::encode(&bytes))
    }

    async fn delete(&self, uri: &str) -> Result<()> {
        tokio::fs::remove_file(Path::new(uri))
            .await
            .map_err(|e| StreamError::Storage(format!("failed to delete {}: {}", uri, e)))?;
        debug!("Deleted slice artifact {}", uri);
        Ok(())
    }
}
