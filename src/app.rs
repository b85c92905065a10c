use crate::api::CompanionApi;
use crate::audio::{AudioRecorder, CaptureError, MicrophoneSource};
use crate::content::{FinalOutput, PendingPrompt};
use crate::playback::{AudioClip, AudioOutput, PlaybackController, PlaybackError, PlaybackState};
use crate::polling::{PollEvent, PollHandle, PollPayload, Poller};
use crate::screen::{render, AppState, RenderContext, ScreenEvent, ScreenView};
use crate::session::{ConversationSession, IdStore, SessionError, SessionManager};
use crate::upload::{UploadOutcome, UploadPipeline};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Top-level controller. Owns the screen state and every resource scoped to it.
///
/// Entering `Prompt` starts the poller; leaving it stops the poller and releases the microphone
/// before the new state becomes visible. Any state change releases the current audio object.
pub struct CompanionApp {
    api: Arc<dyn CompanionApi>,
    state: AppState,
    sessions: SessionManager,
    recorder: AudioRecorder,
    uploads: UploadPipeline,
    poller: Poller,
    poll_handle: Option<PollHandle>,
    poll_tx: UnboundedSender<PollEvent>,
    poll_rx: UnboundedReceiver<PollEvent>,
    last_sequence: u64,
    playback: PlaybackController,
    prompt: Option<PendingPrompt>,
    final_output: Option<FinalOutput>,
    voice_enabled: bool,
    start_error: Option<String>,
    asset_root: String,
}

impl CompanionApp {
    pub fn new(
        api: Arc<dyn CompanionApi>,
        store: Box<dyn IdStore>,
        microphone: Box<dyn MicrophoneSource>,
        output: Box<dyn AudioOutput>,
        poll_interval: Duration,
        asset_root: impl Into<String>,
    ) -> Self {
        let (poll_tx, poll_rx) = unbounded_channel();
        Self {
            state: AppState::default(),
            sessions: SessionManager::new(store, api.clone()),
            recorder: AudioRecorder::new(microphone),
            uploads: UploadPipeline::new(api.clone()),
            poller: Poller::new(api.clone(), poll_interval),
            poll_handle: None,
            poll_tx,
            poll_rx,
            last_sequence: 0,
            playback: PlaybackController::new(output),
            prompt: None,
            final_output: None,
            voice_enabled: true,
            start_error: None,
            asset_root: asset_root.into(),
            api,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn session(&self) -> Option<&ConversationSession> {
        self.sessions.current()
    }

    pub fn prompt(&self) -> Option<&PendingPrompt> {
        self.prompt.as_ref()
    }

    pub fn final_output(&self) -> Option<&FinalOutput> {
        self.final_output.as_ref()
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.playback.state()
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    pub fn voice_enabled(&self) -> bool {
        self.voice_enabled
    }

    pub fn is_polling(&self) -> bool {
        self.poll_handle.as_ref().is_some_and(PollHandle::is_active)
    }

    /// Establish the session and move to `Prompt`. On failure the app stays on `Welcome` and the
    /// error is kept for the welcome screen.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if self.state != AppState::Welcome {
            tracing::debug!("Ignoring start from {:?}", self.state);
            return Ok(());
        }

        match self.sessions.ensure_session().await {
            Ok(session) => {
                tracing::info!("Session {} ready", session.id);
                self.start_error = None;
                self.handle(ScreenEvent::Start);
                Ok(())
            }
            Err(e) => {
                self.start_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Apply a user-facing screen event. Returns false if the current screen ignores it.
    pub fn handle(&mut self, event: ScreenEvent) -> bool {
        let frames = self
            .final_output
            .as_ref()
            .map(|o| o.frames().len())
            .unwrap_or(0);
        let Some(next) = self.state.transition(event, frames) else {
            tracing::debug!("{:?} ignored in {:?}", event, self.state);
            return false;
        };

        match event {
            ScreenEvent::Complete => {
                tracing::info!("Conversation marked complete");
                return true;
            }
            ScreenEvent::Regenerate => {
                tracing::info!("Regenerating output for the current session");
                self.final_output = None;
                self.prompt = None;
            }
            _ => {}
        }

        self.set_state(next);
        true
    }

    fn set_state(&mut self, next: AppState) {
        let previous = self.state;
        if previous == next {
            return;
        }

        if previous.is_prompt() {
            self.stop_polling();
            self.recorder.cancel();
        }
        self.playback.stop();

        self.state = next;
        tracing::debug!("Screen {:?} -> {:?}", previous, next);

        if next.is_prompt() {
            self.start_polling();
        }
    }

    fn start_polling(&mut self) {
        let Some(session) = self.sessions.current().cloned() else {
            tracing::warn!("Prompt entered without a session, not polling");
            return;
        };
        self.stop_polling();
        self.last_sequence = 0;
        self.poll_handle = Some(self.poller.spawn(session, self.poll_tx.clone()));
    }

    fn stop_polling(&mut self) {
        if let Some(mut handle) = self.poll_handle.take() {
            handle.stop();
        }
    }

    /// Acquire the microphone. A refusal switches the prompt to voice-disabled.
    pub fn start_recording(&mut self) -> Result<(), CaptureError> {
        if !self.state.is_prompt() {
            tracing::debug!("Recording is only available while prompting");
            return Ok(());
        }

        match self.recorder.start() {
            Err(CaptureError::MicrophoneUnavailable(reason)) => {
                self.voice_enabled = false;
                Err(CaptureError::MicrophoneUnavailable(reason))
            }
            other => other,
        }
    }

    /// Release the microphone and send the recording in the background.
    pub fn stop_recording(&mut self) -> Option<JoinHandle<UploadOutcome>> {
        let recording = match self.recorder.stop() {
            Ok(recording) => recording,
            Err(e) => {
                tracing::debug!("Nothing to stop: {}", e);
                return None;
            }
        };
        let session = self.sessions.current()?.clone();
        Some(self.uploads.spawn(session, recording))
    }

    /// Feed one poll result into the app. Returns true if it changed what is shown.
    pub fn handle_poll_event(&mut self, event: PollEvent) -> bool {
        let current_generation = self.poll_handle.as_ref().map(PollHandle::generation);
        if !self.state.is_prompt() || current_generation != Some(event.generation) {
            tracing::debug!("Dropping poll result from generation {}", event.generation);
            return false;
        }
        if event.sequence <= self.last_sequence {
            tracing::debug!("Dropping out-of-order poll {}", event.sequence);
            return false;
        }
        self.last_sequence = event.sequence;

        match event.payload {
            PollPayload::Prompt(prompt) => {
                // the server repeats the pending prompt on every tick until it changes
                if self.prompt.as_ref() == Some(&prompt) {
                    return false;
                }
                let audio = prompt.decode_audio();
                self.prompt = Some(prompt);
                if let Some(bytes) = audio {
                    let _ = self.playback.play(AudioClip::new("prompt", bytes));
                }
                true
            }
            PollPayload::Final(output) => {
                self.final_output = Some(*output);
                self.prompt = None;
                self.handle(ScreenEvent::FinalReady)
            }
        }
    }

    /// Handle everything the poller has delivered so far. Returns true if anything changed.
    pub fn drain_poll_events(&mut self) -> bool {
        let mut changed = false;
        while let Ok(event) = self.poll_rx.try_recv() {
            changed |= self.handle_poll_event(event);
        }
        changed
    }

    /// Wait for the next poll result. Pending forever while nothing is polling.
    pub async fn next_poll_event(&mut self) -> Option<PollEvent> {
        self.poll_rx.recv().await
    }

    /// Fetch and play the narration clip for the visible story step. Returns false when the
    /// step has no clip.
    pub async fn play_story_audio(&mut self) -> Result<bool, PlaybackError> {
        let ScreenView::Story(view) = self.view() else {
            return Ok(false);
        };
        let Some(url) = view.audio_url else {
            return Ok(false);
        };

        let bytes = self.api.fetch_asset(&url).await.map_err(|e| {
            tracing::warn!("Could not fetch story audio {}: {}", url, e);
            PlaybackError::from(e)
        })?;
        self.playback
            .play(AudioClip::new(format!("story-{}", view.step), bytes))?;
        Ok(true)
    }

    pub fn toggle_playback(&mut self) {
        self.playback.toggle_play_pause();
    }

    /// Periodic housekeeping: notice a lost microphone and finished audio.
    pub fn tick(&mut self) {
        self.recorder.check_device();
        self.playback.refresh();
    }

    pub fn view(&self) -> ScreenView {
        let ctx = RenderContext {
            prompt: self.prompt.as_ref(),
            final_output: self.final_output.as_ref(),
            recording: self.recorder.is_recording(),
            voice_enabled: self.voice_enabled,
            playback: self.playback.state(),
            asset_root: &self.asset_root,
            start_error: self.start_error.as_deref(),
        };
        render(self.state, &ctx)
    }

    /// Release the poller, the microphone and the audio object.
    pub fn shutdown(&mut self) {
        self.stop_polling();
        self.recorder.cancel();
        self.playback.stop();
    }
}

impl Drop for CompanionApp {
    fn drop(&mut self) {
        self.shutdown();
    }
}
