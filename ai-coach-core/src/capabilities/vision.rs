use async_trait::async_trait;

use crate::error::CoreResult;

/// A provider capable of describing an image in natural language, used by
/// the quick-entry pipeline (C6) to turn a meal photo into extractable text
/// before classification.
#[async_trait]
pub trait VisionModel: Send + Sync {
    fn identity(&self) -> &str;

    /// `image_bytes` is the raw encoded image (jpeg/png); `prompt` steers the
    /// description toward what the pipeline needs extracted.
    async fn describe(&self, image_bytes: &[u8], prompt: &str) -> CoreResult<String>;
}
