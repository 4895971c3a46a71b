use std::time::Duration;

use chrono::Utc;
use tracing::debug;

use crate::board::api_types::ApiUploadResult;
use crate::config::Config;
use crate::error::ApiError;

/// Object-storage client for post images: uploads a blob and hands back the
/// public URL the editor embeds.
#[derive(Clone)]
pub struct StorageClient {
  http: reqwest::Client,
  base: String,
  bucket: String,
}

impl StorageClient {
  pub fn new(config: &Config) -> Result<Self, ApiError> {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(30))
      .build()?;

    Ok(Self {
      http,
      base: config
        .storage
        .base_url
        .as_str()
        .trim_end_matches('/')
        .to_string(),
      bucket: config.storage.bucket.clone(),
    })
  }

  /// Upload an image for an article. Objects are named
  /// `{article_id}/{millis}` so repeated uploads never collide.
  ///
  /// Returns the public URL of the stored object.
  pub async fn upload_post_image(
    &self,
    article_id: &str,
    bytes: Vec<u8>,
    content_type: &str,
  ) -> Result<String, ApiError> {
    let object_path = format!("{article_id}/{}", Utc::now().timestamp_millis());
    let url = format!("{}/storage/v1/object/{}/{object_path}", self.base, self.bucket);

    debug!(%object_path, size = bytes.len(), "uploading post image");

    let response = self
      .http
      .post(&url)
      .header(reqwest::header::CONTENT_TYPE, content_type)
      .body(bytes)
      .send()
      .await?;

    let status = response.status();
    if !status.is_success() {
      let message = response.text().await.unwrap_or_default();
      return Err(ApiError::Server {
        status: status.as_u16(),
        message,
      });
    }

    // The service echoes the bucket-qualified path; fall back to the path we
    // chose if the body is missing it.
    let full_path = response
      .json::<ApiUploadResult>()
      .await
      .ok()
      .and_then(|r| r.full_path.or(r.key))
      .unwrap_or_else(|| format!("{}/{object_path}", self.bucket));

    Ok(format!("{}/storage/v1/object/public/{full_path}", self.base))
  }
}
