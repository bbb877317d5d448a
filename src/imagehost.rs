use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

/// Client for the hosted image service. Uploads go out as multipart posts
/// keyed by a caller-chosen storage key; the service answers with the final
/// public id and CDN url.
#[derive(Clone)]
pub struct ImageHostClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Error)]
pub enum ImageHostError {
    #[error("image host request failed")]
    Http(#[from] reqwest::Error),

    #[error("image host returned {0}")]
    Unexpected(StatusCode),

    #[error("asset not found")]
    NotFound,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedAsset {
    pub public_id: String,
    pub url: String,
}

impl ImageHostClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub async fn upload(
        &self,
        key: &str,
        filename: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAsset, ImageHostError> {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str(content_type)?;
        let form = reqwest::multipart::Form::new()
            .text("key", key.to_string())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/v1/images", self.base_url))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ImageHostError::Unexpected(response.status()));
        }

        Ok(response.json::<UploadedAsset>().await?)
    }

    pub async fn delete(&self, public_id: &str) -> Result<(), ImageHostError> {
        let response = self
            .http
            .delete(format!("{}/v1/images", self.base_url))
            .query(&[("public_id", public_id)])
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(ImageHostError::NotFound),
            status if status.is_success() => Ok(()),
            status => Err(ImageHostError::Unexpected(status)),
        }
    }
}
