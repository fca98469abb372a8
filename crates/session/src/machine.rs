//! Call session state machine
//!
//! [`CallSession`] wraps the pure transition table from `voicebot-core` with
//! the side effects each transition carries: signaling commands, starting
//! the per-session turn worker on entering the active state, and cancelling
//! it on entering the terminating state.
//!
//! Events are serialized per session; the worker never runs two turns at
//! once and the conversation history is append-only.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tokio::sync::mpsc;

use voicebot_core::{
    CallState, CancelSource, CancelToken, DetectedLanguage, Endpoint, Error, HangupOrigin, Result,
    SessionEvent, SessionId, SignalingPort, Turn, TurnOutcome,
};
use voicebot_pipeline::TurnExecutor;

/// Turn triggers queued while a turn is already running
const TRIGGER_QUEUE_DEPTH: usize = 8;

/// Per-session behavior knobs
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Spoken once when the call goes active; `None` disables the greeting
    pub greeting: Option<String>,
    /// Hang up after this many consecutive transcription failures.
    /// `None` disables the policy.
    pub max_consecutive_transcription_failures: Option<u32>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            greeting: Some(DetectedLanguage::Mixed.greeting().to_string()),
            max_consecutive_transcription_failures: None,
        }
    }
}

/// Point-in-time view of a session for the `status` control surface
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub state: CallState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<Endpoint>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub turn_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<TurnOutcome>,
}

struct Worker {
    cancel: CancelSource,
    trigger: mpsc::Sender<()>,
}

/// One live call session.
///
/// The session is the single writer of its own state and history. All
/// event handling goes through [`CallSession::handle_event`], which holds
/// an async gate so transitions are processed strictly in arrival order.
pub struct CallSession {
    id: SessionId,
    remote: RwLock<Option<Endpoint>>,
    state: RwLock<CallState>,
    created_at: DateTime<Utc>,
    last_activity: RwLock<DateTime<Utc>>,
    history: RwLock<Vec<Turn>>,
    executor: Arc<TurnExecutor>,
    signaling: Arc<dyn SignalingPort>,
    config: SessionConfig,
    event_gate: tokio::sync::Mutex<()>,
    worker: Mutex<Option<Worker>>,
}

impl CallSession {
    pub fn new(
        executor: Arc<TurnExecutor>,
        signaling: Arc<dyn SignalingPort>,
        config: SessionConfig,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            remote: RwLock::new(None),
            state: RwLock::new(CallState::Idle),
            created_at: now,
            last_activity: RwLock::new(now),
            history: RwLock::new(Vec::new()),
            executor,
            signaling,
            config,
            event_gate: tokio::sync::Mutex::new(()),
            worker: Mutex::new(None),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> CallState {
        *self.state.read()
    }

    pub fn remote(&self) -> Option<Endpoint> {
        self.remote.read().clone()
    }

    // The registry records the peer before publishing the session so the
    // one-live-session-per-endpoint check and the insert stay atomic.
    pub(crate) fn register_remote(&self, peer: Endpoint) {
        *self.remote.write() = Some(peer);
    }

    /// Clone of the committed conversation history
    pub fn history(&self) -> Vec<Turn> {
        self.history.read().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let history = self.history.read();
        SessionSnapshot {
            id: self.id,
            state: *self.state.read(),
            remote: self.remote.read().clone(),
            created_at: self.created_at,
            last_activity: *self.last_activity.read(),
            turn_count: history.len(),
            last_outcome: history.last().map(|t| t.outcome),
        }
    }

    /// True when the session has seen no activity for longer than `timeout`
    pub fn is_idle_for(&self, timeout: Duration) -> bool {
        let idle = Utc::now() - *self.last_activity.read();
        idle.to_std().map(|idle| idle > timeout).unwrap_or(false)
    }

    fn touch(&self) {
        *self.last_activity.write() = Utc::now();
    }

    /// Apply one event: validate it against the transition table, run the
    /// transition's side effects, and commit the new state.
    ///
    /// Rejected events return [`Error::SessionState`] and leave the session
    /// untouched. Events are processed strictly in arrival order.
    pub async fn handle_event(self: &Arc<Self>, event: SessionEvent) -> Result<CallState> {
        let _gate = self.event_gate.lock().await;

        let current = *self.state.read();
        let next = current.apply(&event)?;

        // Pre-commit signaling side effects. A failed command is a fatal
        // signaling error: the session is forced down.
        let command = match &event {
            SessionEvent::Initiate { target } => {
                *self.remote.write() = Some(target.clone());
                Some(self.signaling.send_invite(&self.id, target).await)
            }
            SessionEvent::InboundSignal { peer } => {
                *self.remote.write() = Some(peer.clone());
                None
            }
            SessionEvent::LocalAccept => Some(self.signaling.accept(&self.id).await),
            SessionEvent::LocalReject => Some(self.signaling.reject(&self.id).await),
            SessionEvent::HangupRequested {
                origin: HangupOrigin::Local,
            } => Some(self.signaling.hangup(&self.id).await),
            _ => None,
        };
        if let Some(Err(err)) = command {
            tracing::error!(session = %self.id, event = event.name(), error = %err, "signaling command failed");
            self.force_down().await;
            return Err(Error::SignalingFatal(err.to_string()));
        }

        *self.state.write() = next;
        self.touch();
        tracing::info!(
            session = %self.id,
            from = %current,
            to = %next,
            event = event.name(),
            "session transition"
        );

        match next {
            CallState::Active => self.start_worker(),
            CallState::Terminating => self.cancel_worker(),
            CallState::Ended => {
                self.cancel_worker();
                if let Err(err) = self.signaling.close(&self.id).await {
                    tracing::warn!(session = %self.id, error = %err, "signaling close failed");
                }
            }
            _ => {}
        }

        Ok(next)
    }

    /// Ask the worker to run one turn.
    ///
    /// The trigger itself is external (push-to-talk, voice activity, a test
    /// harness); this only enqueues it. Rejected unless the call is active.
    pub fn trigger_turn(&self) -> Result<()> {
        let state = *self.state.read();
        if state != CallState::Active {
            return Err(Error::Session(format!(
                "cannot trigger a turn while {state}"
            )));
        }
        let worker = self.worker.lock();
        match worker.as_ref() {
            Some(w) => w
                .trigger
                .try_send(())
                .map_err(|_| Error::Session("turn trigger queue full".into())),
            None => Err(Error::Session("no turn worker running".into())),
        }
    }

    // Caller holds the event gate.
    async fn force_down(self: &Arc<Self>) {
        *self.state.write() = CallState::Ended;
        self.cancel_worker();
        if let Err(err) = self.signaling.close(&self.id).await {
            tracing::debug!(session = %self.id, error = %err, "close after forced end failed");
        }
    }

    fn start_worker(self: &Arc<Self>) {
        let (cancel, token) = CancelSource::new();
        let (trigger_tx, trigger_rx) = mpsc::channel(TRIGGER_QUEUE_DEPTH);
        *self.worker.lock() = Some(Worker {
            cancel,
            trigger: trigger_tx,
        });

        let session = Arc::clone(self);
        tokio::spawn(async move {
            session.run_worker(trigger_rx, token).await;
        });
    }

    fn cancel_worker(&self) {
        if let Some(worker) = self.worker.lock().take() {
            worker.cancel.cancel();
        }
    }

    /// Per-session turn loop. One instance runs per active session; turns
    /// are strictly sequential because only this task calls the executor.
    async fn run_worker(self: Arc<Self>, mut trigger: mpsc::Receiver<()>, mut token: CancelToken) {
        if let Some(text) = self.config.greeting.clone() {
            if let Err(err) = self.executor.speak(&self.id, &text).await {
                tracing::warn!(session = %self.id, error = %err, "greeting playback failed");
            }
        }

        let mut consecutive_failures: u32 = 0;
        loop {
            let triggered = tokio::select! {
                _ = token.cancelled() => false,
                msg = trigger.recv() => msg.is_some(),
            };
            if !triggered {
                break;
            }

            let (turn_index, snapshot) = {
                let history = self.history.read();
                (history.len() as u64, history.clone())
            };
            let turn = self
                .executor
                .run_turn(&self.id, turn_index, &snapshot, &token)
                .await;
            let outcome = turn.outcome;
            self.history.write().push(turn);
            self.touch();

            if outcome == TurnOutcome::TranscriptionFailed {
                consecutive_failures += 1;
                if let Some(limit) = self.config.max_consecutive_transcription_failures {
                    if consecutive_failures >= limit {
                        tracing::warn!(
                            session = %self.id,
                            failures = consecutive_failures,
                            "transcription failure limit reached, hanging up"
                        );
                        let _ = self
                            .handle_event(SessionEvent::HangupRequested {
                                origin: HangupOrigin::Local,
                            })
                            .await;
                    }
                }
            } else {
                consecutive_failures = 0;
            }

            if token.is_cancelled() {
                break;
            }
        }

        // A fatal error may have forced the session to its terminal state
        // already; the rejected drain event is expected then.
        if let Err(err) = self.handle_event(SessionEvent::DrainComplete).await {
            tracing::debug!(session = %self.id, error = %err, "drain event not applied");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use voicebot_core::{
        AudioRef, AudioSink, CaptureSource, LanguageClassifier, ResponseGenerator,
        SynthesisProvider, Transcriber, Transcript,
    };
    use voicebot_pipeline::{SynthesisChain, TurnConfig};

    #[derive(Default)]
    struct RecordingSignaling {
        invites: AtomicUsize,
        accepts: AtomicUsize,
        hangups: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl SignalingPort for RecordingSignaling {
        async fn send_invite(&self, _session_id: &SessionId, _target: &Endpoint) -> Result<()> {
            self.invites.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn accept(&self, _session_id: &SessionId) -> Result<()> {
            self.accepts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn reject(&self, _session_id: &SessionId) -> Result<()> {
            Ok(())
        }

        async fn hangup(&self, _session_id: &SessionId) -> Result<()> {
            self.hangups.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self, _session_id: &SessionId) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct StubCapture;

    #[async_trait]
    impl CaptureSource for StubCapture {
        async fn capture(
            &self,
            _session_id: &SessionId,
            _max_wait: Duration,
        ) -> Result<Option<AudioRef>> {
            Ok(Some(AudioRef::new(1_000)))
        }
    }

    struct StubTranscriber {
        fail: bool,
    }

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, _audio: &AudioRef) -> Result<Transcript> {
            if self.fail {
                return Err(Error::Transcription("engine offline".into()));
            }
            Ok(Transcript::new("Hello how are you", 0.9))
        }

        fn engine_name(&self) -> &str {
            "stub-stt"
        }
    }

    struct StubGenerator {
        delay: Duration,
    }

    #[async_trait]
    impl ResponseGenerator for StubGenerator {
        async fn generate(
            &self,
            _transcript: &str,
            _language: DetectedLanguage,
            _history: &[Turn],
        ) -> Result<String> {
            tokio::time::sleep(self.delay).await;
            Ok("reply".to_string())
        }

        fn model_name(&self) -> &str {
            "stub-llm"
        }
    }

    struct StubProvider;

    #[async_trait]
    impl SynthesisProvider for StubProvider {
        async fn synthesize(&self, _text: &str, _language: DetectedLanguage) -> Result<AudioRef> {
            Ok(AudioRef::new(700))
        }

        fn supports_language(&self, _language: DetectedLanguage) -> bool {
            true
        }

        fn provider_name(&self) -> &str {
            "stub-tts"
        }
    }

    #[derive(Default)]
    struct CountingSink {
        plays: AtomicUsize,
    }

    #[async_trait]
    impl AudioSink for CountingSink {
        async fn play(&self, _audio: &AudioRef, _session_id: &SessionId) -> Result<()> {
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn executor(transcriber_fails: bool, generate_delay: Duration) -> (Arc<TurnExecutor>, Arc<CountingSink>) {
        let sink = Arc::new(CountingSink::default());
        let chain = SynthesisChain::builder()
            .provider(10, Arc::new(StubProvider))
            .build();
        let exec = TurnExecutor::new(
            Arc::new(StubCapture),
            Arc::new(StubTranscriber {
                fail: transcriber_fails,
            }),
            Arc::new(StubGenerator {
                delay: generate_delay,
            }),
            Arc::new(chain),
            sink.clone(),
            LanguageClassifier::default(),
            TurnConfig::default(),
        );
        (Arc::new(exec), sink)
    }

    fn session(config: SessionConfig) -> (Arc<CallSession>, Arc<RecordingSignaling>, Arc<CountingSink>) {
        session_with(config, false, Duration::ZERO)
    }

    fn session_with(
        config: SessionConfig,
        transcriber_fails: bool,
        generate_delay: Duration,
    ) -> (Arc<CallSession>, Arc<RecordingSignaling>, Arc<CountingSink>) {
        let (exec, sink) = executor(transcriber_fails, generate_delay);
        let signaling = Arc::new(RecordingSignaling::default());
        let session = Arc::new(CallSession::new(exec, signaling.clone(), config));
        (session, signaling, sink)
    }

    async fn wait_for_state(session: &Arc<CallSession>, want: CallState) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while session.state() != want {
            assert!(
                tokio::time::Instant::now() < deadline,
                "session stuck in {} waiting for {want}",
                session.state()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn wait_for_turns(session: &Arc<CallSession>, want: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while session.history().len() < want {
            assert!(
                tokio::time::Instant::now() < deadline,
                "only {} of {want} turns committed",
                session.history().len()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_outbound_call_lifecycle() {
        let (session, signaling, sink) = session(SessionConfig::default());

        let state = session
            .handle_event(SessionEvent::Initiate {
                target: "1002".into(),
            })
            .await
            .unwrap();
        assert_eq!(state, CallState::Dialing);
        assert_eq!(signaling.invites.load(Ordering::SeqCst), 1);

        session
            .handle_event(SessionEvent::PeerAccepted)
            .await
            .unwrap();
        assert_eq!(session.state(), CallState::Active);

        // Greeting plays once the worker is up.
        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        while sink.plays.load(Ordering::SeqCst) == 0 {
            assert!(tokio::time::Instant::now() < deadline, "greeting never played");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        session
            .handle_event(SessionEvent::HangupRequested {
                origin: HangupOrigin::Local,
            })
            .await
            .unwrap();
        wait_for_state(&session, CallState::Ended).await;
        assert_eq!(signaling.hangups.load(Ordering::SeqCst), 1);
        assert_eq!(signaling.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalid_event_rejected_without_state_change() {
        let (session, _, _) = session(SessionConfig::default());

        let err = session
            .handle_event(SessionEvent::LocalAccept)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SessionState { .. }));
        assert_eq!(session.state(), CallState::Idle);
    }

    #[tokio::test]
    async fn test_turns_are_indexed_contiguously() {
        let mut config = SessionConfig::default();
        config.greeting = None;
        let (session, _, _) = session(config);

        session
            .handle_event(SessionEvent::InboundSignal { peer: "1001".into() })
            .await
            .unwrap();
        session
            .handle_event(SessionEvent::LocalAccept)
            .await
            .unwrap();

        for _ in 0..3 {
            session.trigger_turn().unwrap();
        }
        wait_for_turns(&session, 3).await;

        let history = session.history();
        let indices: Vec<u64> = history.iter().map(|t| t.turn_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(history.iter().all(|t| t.outcome == TurnOutcome::Completed));
    }

    #[tokio::test]
    async fn test_trigger_rejected_unless_active() {
        let (session, _, _) = session(SessionConfig::default());
        assert!(session.trigger_turn().is_err());
    }

    #[tokio::test]
    async fn test_hangup_cancels_in_flight_turn() {
        let mut config = SessionConfig::default();
        config.greeting = None;
        // Generation takes far longer than the grace we allow for teardown.
        let (session, _, _) = session_with(config, false, Duration::from_secs(30));

        session
            .handle_event(SessionEvent::Initiate {
                target: "1002".into(),
            })
            .await
            .unwrap();
        session
            .handle_event(SessionEvent::PeerAccepted)
            .await
            .unwrap();
        session.trigger_turn().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        session
            .handle_event(SessionEvent::HangupRequested {
                origin: HangupOrigin::Peer,
            })
            .await
            .unwrap();
        wait_for_state(&session, CallState::Ended).await;

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, TurnOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_fatal_error_forces_ended_from_any_live_state() {
        let (session, signaling, _) = session(SessionConfig::default());

        session
            .handle_event(SessionEvent::Initiate {
                target: "1002".into(),
            })
            .await
            .unwrap();
        let state = session
            .handle_event(SessionEvent::FatalSignalingError {
                reason: "transport lost".into(),
            })
            .await
            .unwrap();
        assert_eq!(state, CallState::Ended);
        assert_eq!(signaling.closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transcription_failure_limit_hangs_up() {
        let config = SessionConfig {
            greeting: None,
            max_consecutive_transcription_failures: Some(2),
        };
        let (session, _, _) = session_with(config, true, Duration::ZERO);

        session
            .handle_event(SessionEvent::InboundSignal { peer: "1001".into() })
            .await
            .unwrap();
        session
            .handle_event(SessionEvent::LocalAccept)
            .await
            .unwrap();

        session.trigger_turn().unwrap();
        wait_for_turns(&session, 1).await;
        assert_eq!(session.state(), CallState::Active);

        session.trigger_turn().unwrap();
        wait_for_state(&session, CallState::Ended).await;

        let history = session.history();
        assert_eq!(history.len(), 2);
        assert!(history
            .iter()
            .all(|t| t.outcome == TurnOutcome::TranscriptionFailed));
    }

    #[tokio::test]
    async fn test_snapshot_reflects_progress() {
        let mut config = SessionConfig::default();
        config.greeting = None;
        let (session, _, _) = session(config);

        session
            .handle_event(SessionEvent::InboundSignal { peer: "1001".into() })
            .await
            .unwrap();
        session
            .handle_event(SessionEvent::LocalAccept)
            .await
            .unwrap();
        session.trigger_turn().unwrap();
        wait_for_turns(&session, 1).await;

        let snap = session.snapshot();
        assert_eq!(snap.state, CallState::Active);
        assert_eq!(snap.remote, Some(Endpoint::new("1001")));
        assert_eq!(snap.turn_count, 1);
        assert_eq!(snap.last_outcome, Some(TurnOutcome::Completed));
    }
}
