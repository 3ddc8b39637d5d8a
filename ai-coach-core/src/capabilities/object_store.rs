use async_trait::async_trait;

use crate::error::CoreResult;

/// Blob storage for the media quick-entry attaches (meal photos, voice
/// notes). Backed by S3 in production; the core only ever needs upload/fetch
/// by key, never bucket administration.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> CoreResult<String>;

    async fn fetch(&self, key: &str) -> CoreResult<Vec<u8>>;
}
