use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::{
    Backend, BackendError, EqualizeRequest, EqualizeResponse, ErrorBody, UploadRequest, UploadResponse,
    WindowRequest, WindowResponse,
};

const UPLOAD_PATH: &str = "/api/upload-audio";
const WINDOW_PATH: &str = "/api/static-window";
const EQUALIZE_PATH: &str = "/api/equalize";

/// JSON-over-HTTP client for the processing service.
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self { client, base_url: normalize_base_url(base_url) })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(&self, path: &str, body: &B) -> Result<R, BackendError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(e.to_string()))?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| BackendError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                message: error_message(&bytes, status.canonical_reason().unwrap_or("request failed")),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| BackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn upload(&self, request: &UploadRequest) -> Result<String, BackendError> {
        let response: UploadResponse = self.post(UPLOAD_PATH, request).await?;
        Ok(response.signal_id)
    }

    async fn fetch_window(&self, request: &WindowRequest) -> Result<WindowResponse, BackendError> {
        self.post(WINDOW_PATH, request).await
    }

    async fn equalize(&self, request: &EqualizeRequest) -> Result<Vec<f32>, BackendError> {
        let response: EqualizeResponse = self.post(EQUALIZE_PATH, request).await?;
        Ok(response.output_signal)
    }
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim().trim_end_matches('/').to_string()
}

/// Prefer the service's `{ "error": ... }` body; fall back to the status text.
fn error_message(body: &[u8], fallback: &str) -> String {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(parsed) => parsed.error,
        Err(_) => {
            let text = String::from_utf8_lossy(body);
            let text = text.trim();
            if text.is_empty() { fallback.to_string() } else { text.chars().take(200).collect() }
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================
