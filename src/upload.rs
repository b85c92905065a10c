use crate::api::{ApiError, CompanionApi};
use crate::audio::AudioRecording;
use crate::session::ConversationSession;
use std::sync::Arc;
use tokio::task::JoinHandle;

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Upload failed: {0}")]
    UploadFailed(#[from] ApiError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadOutcome {
    Delivered,
    SkippedEmpty,
    Failed,
}

/// Posts finished recordings against the session's message endpoint.
///
/// Failures are logged and absorbed; the user retries by recording again.
#[derive(Clone)]
pub struct UploadPipeline {
    api: Arc<dyn CompanionApi>,
}

impl UploadPipeline {
    pub fn new(api: Arc<dyn CompanionApi>) -> Self {
        Self { api }
    }

    pub async fn upload(
        &self,
        session: &ConversationSession,
        recording: AudioRecording,
    ) -> UploadOutcome {
        if recording.duration_secs <= 0.0 {
            tracing::warn!("Skipping upload of empty recording");
            return UploadOutcome::SkippedEmpty;
        }

        match self.try_upload(session, &recording).await {
            Ok(()) => {
                tracing::info!(
                    "Uploaded {:.1}s recording ({} bytes) to {}",
                    recording.duration_secs,
                    recording.bytes.len(),
                    session.id
                );
                UploadOutcome::Delivered
            }
            Err(e) => {
                tracing::error!("{} for conversation {}", e, session.id);
                UploadOutcome::Failed
            }
        }
    }

    /// Fire-and-forget variant; polling keeps running while the upload is in flight.
    pub fn spawn(
        &self,
        session: ConversationSession,
        recording: AudioRecording,
    ) -> JoinHandle<UploadOutcome> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.upload(&session, recording).await })
    }

    async fn try_upload(
        &self,
        session: &ConversationSession,
        recording: &AudioRecording,
    ) -> Result<(), UploadError> {
        self.api.upload_audio(&session.id, recording).await?;
        Ok(())
    }
}
