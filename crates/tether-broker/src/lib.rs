//! Agent tunnel broker core
//!
//! The pieces between the HTTP façade and the transport: the readiness
//! gate that blocks tunnels until provisioning finished, the signaling
//! relay that rendezvouses a dialing client session with a listening
//! agent session over the pub/sub bus, the liveness tracker that keeps
//! an agent's last-seen timestamp fresh while its session is open, and
//! the connection group the server drains on shutdown.

pub mod drain;
pub mod gate;
pub mod liveness;
pub mod relay;

pub use drain::{ConnectionGroup, ConnectionGuard};
pub use gate::GateError;
pub use liveness::HEARTBEAT_INTERVAL;
pub use relay::{relay_dial, relay_listen, RelayError, RelayOptions, DEFAULT_ACCEPT_TIMEOUT};
