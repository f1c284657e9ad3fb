//! Process-wide publish/subscribe bus
//!
//! The rendezvous medium between a dialing client session and a
//! listening agent session. The interface is deliberately narrow
//! (`publish`/`subscribe` only) so the backend can be swapped for a
//! distributed one; the dialer and listener may terminate on different
//! broker processes. Delivery is at-least-once; channel ids partition
//! all shared state.

use bytes::Bytes;
use std::collections::HashMap;
use std::sync::RwLock;
use thiserror::Error;
use tokio::sync::broadcast;

/// Buffered messages per channel before a slow subscriber lags out.
const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum BusError {
    /// Nothing is subscribed to the channel. Publishers use this to
    /// fail fast instead of buffering indefinitely.
    #[error("no subscribers on channel")]
    NoSubscribers,

    /// The subscription fell behind and messages were dropped.
    /// At-least-once delivery is assumed upstream, so loss is an
    /// error, not something to skip silently.
    #[error("subscription lagged, {0} messages lost")]
    Lagged(u64),

    /// The channel was torn down while subscribed.
    #[error("channel closed")]
    Closed,
}

pub type BusResult<T> = Result<T, BusError>;

/// Narrow pub/sub interface. Implementations must be safe to share
/// process-wide without external locking.
pub trait Pubsub: Send + Sync {
    fn publish(&self, channel: &str, payload: Bytes) -> BusResult<()>;
    fn subscribe(&self, channel: &str) -> Subscription;
}

/// A live subscription to one channel.
pub struct Subscription {
    channel: String,
    rx: broadcast::Receiver<Bytes>,
}

impl Subscription {
    pub fn new(channel: String, rx: broadcast::Receiver<Bytes>) -> Self {
        Self { channel, rx }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next payload published on the channel.
    pub async fn recv(&mut self) -> BusResult<Bytes> {
        match self.rx.recv().await {
            Ok(payload) => Ok(payload),
            Err(broadcast::error::RecvError::Lagged(missed)) => Err(BusError::Lagged(missed)),
            Err(broadcast::error::RecvError::Closed) => Err(BusError::Closed),
        }
    }
}

/// In-memory bus backed by one broadcast channel per channel id.
#[derive(Default)]
pub struct MemoryBus {
    channels: RwLock<HashMap<String, broadcast::Sender<Bytes>>>,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Bytes> {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Drop channels whose last subscriber went away.
    fn prune(&self) {
        let mut channels = self.channels.write().unwrap();
        channels.retain(|_, tx| tx.receiver_count() > 0);
    }
}

impl Pubsub for MemoryBus {
    fn publish(&self, channel: &str, payload: Bytes) -> BusResult<()> {
        let sender = {
            let channels = self.channels.read().unwrap();
            channels.get(channel).cloned()
        };

        let Some(sender) = sender else {
            return Err(BusError::NoSubscribers);
        };

        tracing::trace!(channel, len = payload.len(), "bus publish");
        sender.send(payload).map(|_| ()).map_err(|_| {
            self.prune();
            BusError::NoSubscribers
        })
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        self.prune();
        tracing::trace!(channel, "bus subscribe");
        Subscription::new(channel.to_string(), self.sender_for(channel).subscribe())
    }
}
