//! Real-time voice sessions over WebSockets.
//!
//! - `protocol`: the client-facing JSON message vocabulary.
//! - `upstream`: the voice-agent transport and event translation.
//! - `session`: the per-connection bridge state machine.

pub mod protocol;
mod session;
pub mod upstream;

pub use session::ws_handler;
