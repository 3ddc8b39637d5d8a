use async_trait::async_trait;

use crate::error::CoreResult;

/// A provider capable of transcribing spoken audio to text, used by the
/// quick-entry pipeline (C6) for voice-note entries.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    fn identity(&self) -> &str;

    /// `audio_bytes` is the raw encoded audio clip; `language_hint` is an
    /// optional BCP-47 tag when the caller already knows the language.
    async fn transcribe(&self, audio_bytes: &[u8], language_hint: Option<&str>) -> CoreResult<String>;
}
