//! Outbound signaling seam
//!
//! Inbound signaling events are *pushed* into the session registry by the
//! adapter; this trait is the command half the core calls back into. A SIP
//! stack, a carrier API client, or a test double all fit behind it.

use async_trait::async_trait;

use crate::call::{Endpoint, SessionId};
use crate::error::Result;

/// Commands the core sends toward the signaling layer
#[async_trait]
pub trait SignalingPort: Send + Sync + 'static {
    /// Emit an outbound call request toward `target`
    async fn send_invite(&self, session_id: &SessionId, target: &Endpoint) -> Result<()>;

    /// Accept a ringing inbound call
    async fn accept(&self, session_id: &SessionId) -> Result<()>;

    /// Reject a ringing inbound call
    async fn reject(&self, session_id: &SessionId) -> Result<()>;

    /// Request the peer-facing hangup for a locally ended call
    async fn hangup(&self, session_id: &SessionId) -> Result<()>;

    /// Close the signaling path and release transport resources.
    ///
    /// Called exactly once when a session reaches its terminal state; must
    /// tolerate an already-dead transport.
    async fn close(&self, session_id: &SessionId) -> Result<()>;
}
