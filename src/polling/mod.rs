use crate::api::CompanionApi;
use crate::config::MIN_POLL_INTERVAL_MS;
use crate::content::{decode_state_body, FinalOutput, PendingPrompt, ServerMessage};
use crate::session::ConversationSession;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(MIN_POLL_INTERVAL_MS);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPayload {
    Prompt(PendingPrompt),
    Final(Box<FinalOutput>),
}

/// A decoded `/state` answer, tagged with the loop that produced it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollEvent {
    pub generation: u64,
    pub sequence: u64,
    pub payload: PollPayload,
}

/// Starts level-triggered `/state` loops. Each loop gets a fresh generation number so the
/// consumer can drop anything a stopped loop managed to send.
pub struct Poller {
    api: Arc<dyn CompanionApi>,
    interval: Duration,
    next_generation: u64,
}

impl Poller {
    pub fn new(api: Arc<dyn CompanionApi>, interval: Duration) -> Self {
        Self {
            api,
            interval: interval.max(MIN_POLL_INTERVAL),
            next_generation: 1,
        }
    }

    /// Poll every `interval` until stopped, a final output arrives, or the receiver goes away.
    ///
    /// Each request is awaited before the next tick is taken, so at most one is in flight.
    pub fn spawn(
        &mut self,
        session: ConversationSession,
        events: UnboundedSender<PollEvent>,
    ) -> PollHandle {
        let generation = self.next_generation;
        self.next_generation += 1;

        let active = Arc::new(AtomicBool::new(true));
        let task = tokio::spawn(poll_loop(
            self.api.clone(),
            session,
            self.interval,
            generation,
            active.clone(),
            events,
        ));

        tracing::info!(
            "Polling started (generation {}, every {}ms)",
            generation,
            self.interval.as_millis()
        );

        PollHandle {
            generation,
            active,
            task: Some(task),
        }
    }
}

async fn poll_loop(
    api: Arc<dyn CompanionApi>,
    session: ConversationSession,
    period: Duration,
    generation: u64,
    active: Arc<AtomicBool>,
    events: UnboundedSender<PollEvent>,
) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence = 0u64;

    loop {
        ticker.tick().await;
        if !active.load(Ordering::SeqCst) {
            break;
        }
        sequence += 1;

        let result = api.fetch_state(&session.id).await;
        if !active.load(Ordering::SeqCst) {
            break;
        }

        let body = match result {
            Ok(body) => body,
            Err(e) if e.is_retryable() => {
                tracing::warn!("Poll {} failed, retrying next tick: {}", sequence, e);
                continue;
            }
            Err(e) => {
                tracing::error!("Poll {} rejected, polling continues: {}", sequence, e);
                continue;
            }
        };

        let payload = match decode_state_body(&body) {
            Ok(ServerMessage::NotReady) => {
                tracing::debug!("Poll {}: nothing yet", sequence);
                continue;
            }
            Ok(ServerMessage::Prompt(prompt)) => PollPayload::Prompt(prompt),
            Ok(ServerMessage::Final(output)) => PollPayload::Final(output),
            Err(e) => {
                tracing::warn!("Poll {} returned an undecodable body: {}", sequence, e);
                continue;
            }
        };

        let is_final = matches!(payload, PollPayload::Final(_));
        let event = PollEvent {
            generation,
            sequence,
            payload,
        };
        if events.send(event).is_err() {
            tracing::debug!("Poll consumer gone, stopping generation {}", generation);
            break;
        }
        if is_final {
            tracing::info!("Final output received, polling finished");
            break;
        }
    }

    active.store(false, Ordering::SeqCst);
}

/// Owns one polling loop. Stopping or dropping it cancels the task immediately.
pub struct PollHandle {
    generation: u64,
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PollHandle {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            tracing::info!("Polling stopped (generation {})", self.generation);
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::FakeApi;
    use crate::api::ApiError;
    use tokio::sync::mpsc::unbounded_channel;
    use tokio::time::sleep;

    fn session() -> ConversationSession {
        ConversationSession { id: "poll-1".into() }
    }

    #[tokio::test(start_paused = true)]
    async fn test_prompt_is_delivered_and_stop_halts_requests() {
        let api = Arc::new(FakeApi::default());
        api.push_state(r#"{"text":"Hello","audio_base64":"AAA="}"#);
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, mut rx) = unbounded_channel();

        let mut handle = poller.spawn(session(), tx);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.generation, handle.generation());
        assert_eq!(event.sequence, 1);
        let PollPayload::Prompt(prompt) = event.payload else {
            panic!("expected prompt");
        };
        assert_eq!(prompt.text, "Hello");

        handle.stop();
        assert!(!handle.is_active());
        let calls = api.state_calls();
        sleep(Duration::from_secs(10)).await;
        assert_eq!(api.state_calls(), calls);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_request_before_first_interval() {
        let api = Arc::new(FakeApi::default());
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, _rx) = unbounded_channel();

        let _handle = poller.spawn(session(), tx);
        sleep(Duration::from_millis(500)).await;
        assert_eq!(api.state_calls(), 0);
        sleep(Duration::from_millis(3_000)).await;
        assert!(api.state_calls() >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_requests_never_overlap() {
        let api = Arc::new(FakeApi::default());
        api.set_state_delay(Duration::from_millis(2_500));
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, _rx) = unbounded_channel();

        let _handle = poller.spawn(session(), tx);
        sleep(Duration::from_secs(20)).await;
        assert!(api.state_calls() >= 2);
        assert_eq!(api.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_absorbed() {
        let api = Arc::new(FakeApi::default());
        api.push_state_error(ApiError::Timeout);
        api.push_state_error(ApiError::Status {
            status: 404,
            body: "unknown conversation".into(),
        });
        api.push_state("{garbage");
        api.push_state(r#"{"text":"Still here","audio_base64":""}"#);
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, mut rx) = unbounded_channel();

        let _handle = poller.spawn(session(), tx);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.sequence, 4);
        assert!(matches!(event.payload, PollPayload::Prompt(p) if p.text == "Still here"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_is_floored_to_config_minimum() {
        let api = Arc::new(FakeApi::default());
        let mut poller = Poller::new(api.clone(), Duration::ZERO);
        let (tx, _rx) = unbounded_channel();

        let _handle = poller.spawn(session(), tx);
        sleep(Duration::from_millis(MIN_POLL_INTERVAL_MS - 10)).await;
        assert_eq!(api.state_calls(), 0);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(api.state_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_final_output_ends_loop() {
        let api = Arc::new(FakeApi::default());
        api.push_state(r#"{"story":"The end","story_audio":[]}"#);
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, mut rx) = unbounded_channel();

        let handle = poller.spawn(session(), tx);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.payload, PollPayload::Final(ref o) if o.story == "The end"));

        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.state_calls(), 1);
        assert!(!handle.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_and_generations_increase() {
        let api = Arc::new(FakeApi::default());
        let mut poller = Poller::new(api.clone(), DEFAULT_POLL_INTERVAL);
        let (tx, _rx) = unbounded_channel();

        let first = poller.spawn(session(), tx.clone());
        let first_generation = first.generation();
        drop(first);
        sleep(Duration::from_secs(5)).await;
        assert_eq!(api.state_calls(), 0);

        let second = poller.spawn(session(), tx);
        assert!(second.generation() > first_generation);
    }
}
