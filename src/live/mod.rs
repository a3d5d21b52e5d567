//! LTTng-live network trace source (§1, §4.M): wire protocol, a blocking
//! viewer client, and the per-connection session/trace state machine.

pub mod session_manager;
pub mod viewer_client;
pub mod wire;
