//! Signaling envelope types
//!
//! A negotiation exchange is created by exactly one `Dial` and lives on
//! its own exchange channel. `Payload` bodies are opaque to the broker;
//! it never inspects or validates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which end of an exchange produced a message.
///
/// The bus fans out to every subscriber on a channel, including the
/// publisher itself, so each relay tags its publications and discards
/// messages carrying its own tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerEnd {
    Client,
    Agent,
}

impl PeerEnd {
    /// The opposite end of the exchange.
    pub fn other(self) -> Self {
        match self {
            PeerEnd::Client => PeerEnd::Agent,
            PeerEnd::Agent => PeerEnd::Client,
        }
    }
}

impl std::fmt::Display for PeerEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PeerEnd::Client => write!(f, "client"),
            PeerEnd::Agent => write!(f, "agent"),
        }
    }
}

/// Envelope message moved over the pub/sub bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Signal {
    /// Dial notification on the agent's dial channel. One per
    /// negotiation exchange.
    Dial { exchange: Uuid },

    /// Listener acknowledgement on the exchange channel. Bounds the
    /// dialer's wait for a responder.
    Accept { exchange: Uuid },

    /// Opaque negotiation bytes on the exchange channel.
    Payload {
        exchange: Uuid,
        origin: PeerEnd,
        body: Vec<u8>,
    },

    /// End of exchange. `reason` is diagnostic text only.
    Close {
        exchange: Uuid,
        reason: Option<String>,
    },

    /// Announcement on the dial channel that a new listen relay owns
    /// the channel. Any other listener observing a foreign takeover
    /// treats itself as superseded and shuts down.
    Takeover { listener: Uuid },
}

/// The rendezvous channel an agent listens on: its own identity.
pub fn dial_channel(agent_id: Uuid) -> String {
    agent_id.to_string()
}

/// Per-exchange channel carrying `Accept`/`Payload`/`Close` traffic.
pub fn exchange_channel(agent_id: Uuid, exchange: Uuid) -> String {
    format!("{agent_id}/{exchange}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_end_other() {
        assert_eq!(PeerEnd::Client.other(), PeerEnd::Agent);
        assert_eq!(PeerEnd::Agent.other(), PeerEnd::Client);
    }

    #[test]
    fn test_channel_naming() {
        let agent = Uuid::new_v4();
        let exchange = Uuid::new_v4();

        assert_eq!(dial_channel(agent), agent.to_string());

        let channel = exchange_channel(agent, exchange);
        assert!(channel.starts_with(&agent.to_string()));
        assert!(channel.ends_with(&exchange.to_string()));
        assert_ne!(channel, dial_channel(agent));
    }

    #[test]
    fn test_exchange_channels_are_distinct() {
        let agent = Uuid::new_v4();
        let a = exchange_channel(agent, Uuid::new_v4());
        let b = exchange_channel(agent, Uuid::new_v4());
        assert_ne!(a, b);
    }
}
