//! Session registry
//!
//! Tracks every live session, routes signaling events to the right one,
//! and enforces the capacity and one-live-session-per-endpoint rules. The
//! registry mapping is behind a single lock; per-session work happens on
//! each session's own worker without registry involvement.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;

use voicebot_config::Settings;
use voicebot_core::{
    CallState, DetectedLanguage, Endpoint, Error, HangupOrigin, Result, SessionEvent, SessionId,
    SignalingPort,
};
use voicebot_pipeline::TurnExecutor;

use crate::machine::{CallSession, SessionConfig, SessionSnapshot};

/// Registry-wide behavior knobs
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Hard cap on concurrently tracked sessions
    pub max_sessions: usize,
    /// Active sessions silent for longer than this are hung up by the sweep
    pub idle_timeout: Duration,
    /// How often the background sweep runs
    pub sweep_interval: Duration,
    pub session: SessionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_sessions: 32,
            idle_timeout: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
            session: SessionConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Derive registry and per-session knobs from loaded settings
    pub fn from_settings(settings: &Settings) -> Self {
        let greeting = if settings.session.greeting_enabled {
            Some(
                settings
                    .session
                    .greeting_text
                    .clone()
                    .unwrap_or_else(|| DetectedLanguage::Mixed.greeting().to_string()),
            )
        } else {
            None
        };
        Self {
            max_sessions: settings.session.max_sessions,
            idle_timeout: Duration::from_secs(settings.session.idle_timeout_secs),
            sweep_interval: Duration::from_secs(300),
            session: SessionConfig {
                greeting,
                max_consecutive_transcription_failures: settings
                    .turn
                    .max_consecutive_transcription_failures,
            },
        }
    }
}

/// Owner of all live [`CallSession`]s.
///
/// The control surface (`call`, `answer`, `hangup`, `status`) and the
/// signaling adapter's inbound path both go through here.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<CallSession>>>,
    executor: Arc<TurnExecutor>,
    signaling: Arc<dyn SignalingPort>,
    config: RegistryConfig,
}

impl SessionRegistry {
    pub fn new(
        executor: Arc<TurnExecutor>,
        signaling: Arc<dyn SignalingPort>,
        config: RegistryConfig,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            executor,
            signaling,
            config,
        }
    }

    /// Place an outbound call to `target`
    pub async fn call(&self, target: Endpoint) -> Result<Arc<CallSession>> {
        let session = self.admit(target.clone())?;
        session
            .handle_event(SessionEvent::Initiate { target })
            .await?;
        Ok(session)
    }

    /// Register an inbound call from `peer`; the session rings until the
    /// local side answers or rejects
    pub async fn inbound(&self, peer: Endpoint) -> Result<Arc<CallSession>> {
        let session = self.admit(peer.clone())?;
        session
            .handle_event(SessionEvent::InboundSignal { peer })
            .await?;
        Ok(session)
    }

    /// Answer a ringing session
    pub async fn answer(&self, id: &SessionId) -> Result<CallState> {
        self.route(id, SessionEvent::LocalAccept).await
    }

    /// Reject a ringing session
    pub async fn reject(&self, id: &SessionId) -> Result<CallState> {
        self.route(id, SessionEvent::LocalReject).await
    }

    /// Hang up a session from the local side
    pub async fn hangup(&self, id: &SessionId) -> Result<CallState> {
        self.route(
            id,
            SessionEvent::HangupRequested {
                origin: HangupOrigin::Local,
            },
        )
        .await
    }

    /// Deliver a signaling-layer event to its session.
    ///
    /// Invalid events are rejected by the session and reported back to the
    /// adapter; they never change session state.
    pub async fn route(&self, id: &SessionId, event: SessionEvent) -> Result<CallState> {
        let session = self
            .get(id)
            .ok_or_else(|| Error::Session(format!("unknown session {id}")))?;
        session.handle_event(event).await
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<CallSession>> {
        self.sessions.read().get(id).cloned()
    }

    /// Snapshot every tracked session for the `status` control surface
    pub fn status(&self) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .values()
            .map(|s| s.snapshot())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Drop ended sessions and hang up active ones that have been idle for
    /// longer than the configured timeout
    pub async fn sweep(&self) {
        let ended: Vec<SessionId> = {
            let mut sessions = self.sessions.write();
            let ended: Vec<SessionId> = sessions
                .iter()
                .filter(|(_, s)| s.state().is_ended())
                .map(|(id, _)| *id)
                .collect();
            for id in &ended {
                sessions.remove(id);
            }
            ended
        };
        for id in &ended {
            tracing::info!(session = %id, "evicted ended session");
        }

        let idle: Vec<Arc<CallSession>> = self
            .sessions
            .read()
            .values()
            .filter(|s| s.state() == CallState::Active && s.is_idle_for(self.config.idle_timeout))
            .cloned()
            .collect();
        for session in idle {
            tracing::info!(session = %session.id(), "hanging up idle session");
            let _ = session
                .handle_event(SessionEvent::HangupRequested {
                    origin: HangupOrigin::Local,
                })
                .await;
        }
    }

    /// Start the background sweep task.
    ///
    /// Returns a shutdown sender; sending `true` stops the task.
    pub fn start_sweep_task(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let registry = Arc::clone(self);
        let interval = registry.config.sweep_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let before = registry.count();
                        registry.sweep().await;
                        let after = registry.count();
                        if before != after {
                            tracing::info!(
                                evicted = before - after,
                                remaining = after,
                                "session sweep"
                            );
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::info!("session sweep task shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    // Endpoint check, capacity check, and insert happen under one write
    // lock; the session carries its peer before it becomes visible, so two
    // parallel admissions for the same endpoint cannot both pass the check.
    fn admit(&self, endpoint: Endpoint) -> Result<Arc<CallSession>> {
        let mut sessions = self.sessions.write();

        let busy = sessions
            .values()
            .any(|s| s.state().is_live() && s.remote().as_ref() == Some(&endpoint));
        if busy {
            return Err(Error::Session(format!(
                "endpoint {endpoint} already has a live session"
            )));
        }

        if sessions.len() >= self.config.max_sessions {
            sessions.retain(|_, s| !s.state().is_ended());
            if sessions.len() >= self.config.max_sessions {
                return Err(Error::Session("session capacity reached".into()));
            }
        }

        let session = Arc::new(CallSession::new(
            self.executor.clone(),
            self.signaling.clone(),
            self.config.session.clone(),
        ));
        session.register_remote(endpoint);
        sessions.insert(session.id(), session.clone());
        tracing::info!(session = %session.id(), total = sessions.len(), "session created");
        Ok(session)
    }
}
