use async_trait::async_trait;
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use tracing::info;

use crate::capabilities::ObjectStore;
use crate::error::{CoreError, CoreResult};

/// S3-backed [`ObjectStore`] for quick-entry media (meal photos, voice
/// notes). Grounded on the teacher's `VideoStorageService`, generalized
/// from its video-specific key scheme to a caller-supplied key — the
/// quick-entry pipeline already knows the `user_id`/`entry_id` path it
/// wants (`spec.md` §4.6 "Image handling").
pub struct S3ObjectStore {
    client: S3Client,
    bucket_name: String,
}

impl S3ObjectStore {
    pub fn new(client: S3Client, bucket_name: String) -> Self {
        S3ObjectStore { client, bucket_name }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> CoreResult<String> {
        info!(bucket = %self.bucket_name, key, size = bytes.len(), "uploading object");

        let body = ByteStream::from(bytes);

        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body)
            .content_type(content_type)
            .send()
            .await
            .map_err(|err| CoreError::UpstreamUnavailable(format!("S3 upload failed: {err}")))?;

        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket_name, key))
    }

    async fn fetch(&self, key: &str) -> CoreResult<Vec<u8>> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket_name)
            .key(key)
            .send()
            .await
            .map_err(|err| CoreError::UpstreamUnavailable(format!("S3 download failed: {err}")))?;

        let bytes = response
            .body
            .collect()
            .await
            .map_err(|err| CoreError::UpstreamUnavailable(format!("failed to collect S3 object body: {err}")))?
            .into_bytes()
            .to_vec();

        Ok(bytes)
    }
}
