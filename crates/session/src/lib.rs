//! Session layer for the voice call bot
//!
//! [`CallSession`] drives one call through its lifecycle and owns the
//! per-session turn worker; [`SessionRegistry`] tracks all live sessions,
//! routes signaling events, and exposes the `call`/`answer`/`hangup`/
//! `status` control surface.

pub mod machine;
pub mod registry;

pub use machine::{CallSession, SessionConfig, SessionSnapshot};
pub use registry::{RegistryConfig, SessionRegistry};
