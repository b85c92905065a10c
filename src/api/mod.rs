// src/api/mod.rs
// Backend API - conversation endpoints

mod http;
mod types;

pub use http::HttpCompanionApi;
pub use types::{ApiError, StartRequest, StartResponse};

use crate::audio::AudioRecording;
use async_trait::async_trait;

/// The conversation backend as seen by the client
#[async_trait]
pub trait CompanionApi: Send + Sync {
    /// `POST /start`. Returns the id the server acknowledged.
    async fn start_conversation(&self, conversation_id: &str) -> Result<String, ApiError>;

    /// `POST /message/audio/{id}` as multipart field `audio`
    async fn upload_audio(
        &self,
        conversation_id: &str,
        recording: &AudioRecording,
    ) -> Result<(), ApiError>;

    /// `GET /state/{id}`. Returns the raw body; decoding is the caller's job.
    async fn fetch_state(&self, conversation_id: &str) -> Result<String, ApiError>;

    /// Download a media asset by absolute URL
    async fn fetch_asset(&self, url: &str) -> Result<Vec<u8>, ApiError>;

    /// Get backend name
    fn name(&self) -> &str;
}
