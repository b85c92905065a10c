// src/api/http.rs
// HTTP backend over reqwest

use super::{ApiError, CompanionApi, StartRequest, StartResponse};
use crate::audio::AudioRecording;
use async_trait::async_trait;
use reqwest::{multipart, Client, Response, Url};
use std::time::Duration;

const AUDIO_FIELD: &str = "audio";

pub struct HttpCompanionApi {
    origin: Url,
    client: Client,
}

impl HttpCompanionApi {
    /// `timeout_secs == 0` leaves requests without a deadline.
    pub fn new(origin: &str, timeout_secs: u64) -> Result<Self, ApiError> {
        let origin = Url::parse(origin.trim()).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        if origin.cannot_be_a_base() {
            return Err(ApiError::InvalidUrl(format!("{} cannot be a base URL", origin)));
        }

        let mut builder = Client::builder();
        if timeout_secs > 0 {
            builder = builder.timeout(Duration::from_secs(timeout_secs));
        }
        let client = builder.build()?;

        tracing::info!("HTTP backend initialized for {}", origin);

        Ok(Self { origin, client })
    }

    /// Append path segments to the origin, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.origin.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.origin.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn ensure_success(resp: Response) -> Result<Response, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl CompanionApi for HttpCompanionApi {
    async fn start_conversation(&self, conversation_id: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["start"])?;
        let resp = self
            .client
            .post(url)
            .json(&StartRequest { conversation_id })
            .send()
            .await?;
        let resp = Self::ensure_success(resp).await?;

        let raw = resp.text().await?;
        let parsed = if raw.trim().is_empty() {
            StartResponse::default()
        } else {
            serde_json::from_str::<StartResponse>(&raw)
                .map_err(|e| ApiError::InvalidBody(e.to_string()))?
        };

        Ok(parsed
            .conversation_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| conversation_id.to_string()))
    }

    async fn upload_audio(
        &self,
        conversation_id: &str,
        recording: &AudioRecording,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["message", "audio", conversation_id])?;

        let part = multipart::Part::bytes(recording.bytes.clone())
            .file_name(recording.file_name())
            .mime_str(&recording.mime_type)
            .map_err(|e| ApiError::InvalidBody(e.to_string()))?;
        let form = multipart::Form::new().part(AUDIO_FIELD, part);

        let resp = self.client.post(url).multipart(form).send().await?;
        Self::ensure_success(resp).await?;
        Ok(())
    }

    async fn fetch_state(&self, conversation_id: &str) -> Result<String, ApiError> {
        let url = self.endpoint(&["state", conversation_id])?;
        let resp = self.client.get(url).send().await?;
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.text().await?)
    }

    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let url = Url::parse(url).map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let resp = self.client.get(url).send().await?;
        let resp = Self::ensure_success(resp).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    fn name(&self) -> &str {
        "HTTP"
    }
}
