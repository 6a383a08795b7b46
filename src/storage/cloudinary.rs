//! Cloudinary-compatible HTTP blob store
//!
//! Uploads and deletes go through the signed upload API. Download URLs use
//! the private download endpoint, which enforces `expires_at` on its side.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

use super::{BlobError, BlobResourceType, BlobStore, DownloadUrlOptions, UploadOptions, UploadResult};
use crate::config::StorageConfig;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    public_id: String,
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

pub struct CloudinaryStore {
    client: reqwest::Client,
    api_base: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryStore {
    pub fn from_config(config: &StorageConfig) -> Result<Self, BlobError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn endpoint(&self, resource_type: BlobResourceType, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.api_base,
            self.cloud_name,
            resource_type.as_str(),
            action
        )
    }

    /// sha256 over `k1=v1&k2=v2...<secret>` with keys sorted
    fn sign(&self, params: &BTreeMap<&str, String>) -> String {
        let joined = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorBody>().await {
            Ok(body) => format!("{}: {}", status, body.error.message),
            Err(_) => status.to_string(),
        }
    }
}

#[async_trait]
impl BlobStore for CloudinaryStore {
    fn name(&self) -> &'static str {
        "cloudinary"
    }

    async fn upload_buffer(
        &self,
        bytes: Vec<u8>,
        folder: &str,
        options: UploadOptions,
    ) -> Result<UploadResult, BlobError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("folder", folder.to_string());
        params.insert("public_id", options.public_id.clone());
        params.insert("timestamp", timestamp.clone());
        let signature = self.sign(&params);

        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(options.public_id.clone()))
            .text("api_key", self.api_key.clone())
            .text("folder", folder.to_string())
            .text("public_id", options.public_id)
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .client
            .post(self.endpoint(options.resource_type, "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::Upload(Self::error_message(response).await));
        }

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| BlobError::Upload(e.to_string()))?;

        tracing::debug!(public_id = %body.public_id, "Blob uploaded");
        Ok(UploadResult {
            public_id: body.public_id,
            secure_url: body.secure_url,
        })
    }

    async fn generate_download_url(
        &self,
        public_id: &str,
        options: DownloadUrlOptions,
    ) -> Result<String, BlobError> {
        if self.api_secret.is_empty() {
            return Err(BlobError::Sign("api secret is not configured".to_string()));
        }

        let now = chrono::Utc::now().timestamp();
        let expires_at = now + options.expires_in_seconds as i64;

        let mut params = BTreeMap::new();
        params.insert("attachment", "true".to_string());
        params.insert("expires_at", expires_at.to_string());
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", now.to_string());
        if let Some(filename) = &options.filename {
            params.insert("target_filename", filename.clone());
        }
        let signature = self.sign(&params);

        let query = params
            .iter()
            .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
            .chain([
                format!("api_key={}", urlencoding::encode(&self.api_key)),
                format!("signature={}", signature),
                "signature_algorithm=sha256".to_string(),
            ])
            .collect::<Vec<_>>()
            .join("&");

        Ok(format!(
            "{}?{}",
            self.endpoint(options.resource_type, "download"),
            query
        ))
    }

    async fn delete_file(
        &self,
        public_id: &str,
        resource_type: BlobResourceType,
    ) -> Result<(), BlobError> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let mut params = BTreeMap::new();
        params.insert("public_id", public_id.to_string());
        params.insert("timestamp", timestamp.clone());
        let signature = self.sign(&params);

        let form = [
            ("public_id", public_id.to_string()),
            ("timestamp", timestamp),
            ("api_key", self.api_key.clone()),
            ("signature", signature),
            ("signature_algorithm", "sha256".to_string()),
        ];

        let response = self
            .client
            .post(self.endpoint(resource_type, "destroy"))
            .form(&form)
            .send()
            .await
            .map_err(|e| BlobError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(BlobError::Delete(Self::error_message(response).await));
        }

        let body: DestroyResponse = response
            .json()
            .await
            .map_err(|e| BlobError::Delete(e.to_string()))?;
        match body.result.as_str() {
            "ok" | "not found" => Ok(()),
            other => Err(BlobError::Delete(format!("unexpected result: {}", other))),
        }
    }
}
