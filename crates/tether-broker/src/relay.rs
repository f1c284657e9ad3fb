//! Signaling relay
//!
//! Moves negotiation messages between a local multiplexed session and
//! a remote party known only by channel id, using the pub/sub bus as
//! the coupling medium. The dialing client's and listening agent's
//! physical connections may terminate on different broker processes;
//! the two relay instances rendezvous only through the bus.
//!
//! Payload bodies are a pass-through; the relay never inspects the
//! negotiation protocol running above it.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use tether_bus::{BusError, Pubsub, Subscription};
use tether_proto::{dial_channel, exchange_channel, CodecError, PeerEnd, Signal, SignalCodec};
use tether_session::{Session, SessionError, SubStream};

/// Bound on the dialer's wait for a listener acknowledgement.
pub const DEFAULT_ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum RelayError {
    /// No listen relay is subscribed on the channel, or none answered
    /// within the accept timeout. Terminal for this attempt; the
    /// caller may retry.
    #[error("no listener on channel")]
    NoListener,

    /// A newer listen relay registered for the channel; this one is
    /// done (last-registered wins).
    #[error("superseded by a newer listener")]
    Superseded,

    #[error("bus: {0}")]
    Bus(#[from] BusError),

    #[error("session: {0}")]
    Session(#[from] SessionError),

    #[error("signal codec: {0}")]
    Codec(#[from] CodecError),
}

#[derive(Clone)]
pub struct RelayOptions {
    /// Rendezvous channel: the target agent's identity.
    pub channel: Uuid,
    /// How long a dial exchange waits for a listener acknowledgement.
    pub accept_timeout: Duration,
}

impl RelayOptions {
    pub fn new(channel: Uuid) -> Self {
        Self {
            channel,
            accept_timeout: DEFAULT_ACCEPT_TIMEOUT,
        }
    }

    pub fn with_accept_timeout(mut self, accept_timeout: Duration) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }
}

fn publish_signal(bus: &dyn Pubsub, channel: &str, signal: &Signal) -> Result<(), RelayError> {
    let frame = SignalCodec::encode(signal)?;
    bus.publish(channel, frame)?;
    Ok(())
}

/// Run the client leg of the relay until the session closes.
///
/// Every sub-stream the client opens becomes one negotiation exchange:
/// a `Dial` is published on the agent's channel and traffic is
/// forwarded between the sub-stream and the exchange channel. A
/// missing listener or a bus failure tears the whole relay down (it is
/// the caller's retry signal); a failure inside one established
/// exchange closes only that exchange.
pub async fn relay_dial(
    session: &Session,
    bus: Arc<dyn Pubsub>,
    opts: RelayOptions,
) -> Result<(), RelayError> {
    let cancel = session.closed();
    let (fatal_tx, mut fatal_rx) = mpsc::channel::<RelayError>(1);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            fatal = fatal_rx.recv() => {
                if let Some(err) = fatal {
                    session.close_with_error(&err.to_string());
                    return Err(err);
                }
            }
            stream = session.accept_stream() => {
                let Some(stream) = stream else {
                    return Ok(());
                };
                let bus = bus.clone();
                let opts = opts.clone();
                let cancel = cancel.clone();
                let fatal_tx = fatal_tx.clone();
                tokio::spawn(async move {
                    if let Err(e) = dial_exchange(stream, bus, opts, cancel).await {
                        match e {
                            RelayError::NoListener | RelayError::Bus(_) => {
                                let _ = fatal_tx.try_send(e);
                            }
                            other => warn!(error = %other, "dial exchange failed"),
                        }
                    }
                });
            }
        }
    }
}

/// One client-side negotiation exchange.
async fn dial_exchange(
    mut stream: SubStream,
    bus: Arc<dyn Pubsub>,
    opts: RelayOptions,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let exchange = Uuid::new_v4();
    let reply_channel = exchange_channel(opts.channel, exchange);

    // Subscribe before announcing so the listener's first messages
    // cannot be missed.
    let mut replies = bus.subscribe(&reply_channel);

    let announce = publish_signal(bus.as_ref(), &dial_channel(opts.channel), &Signal::Dial {
        exchange,
    });
    if let Err(e) = announce {
        stream.finish().await;
        return Err(match e {
            RelayError::Bus(BusError::NoSubscribers) => RelayError::NoListener,
            other => other,
        });
    }

    debug!(%exchange, channel = %opts.channel, "dial announced");

    // Bounded wait for a listener to pick up the exchange.
    let accepted = tokio::time::timeout(opts.accept_timeout, async {
        loop {
            let frame = replies.recv().await?;
            if let Signal::Accept { .. } = SignalCodec::decode_frame(&frame)? {
                return Ok::<(), RelayError>(());
            }
        }
    })
    .await;

    match accepted {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            stream.finish().await;
            return Err(e);
        }
        Err(_elapsed) => {
            stream.finish().await;
            return Err(RelayError::NoListener);
        }
    }

    debug!(%exchange, "exchange accepted");
    forward_exchange(
        stream,
        replies,
        bus,
        opts.channel,
        exchange,
        PeerEnd::Client,
        cancel,
    )
    .await
}

/// Run the agent leg of the relay until the session closes, a fatal
/// bus error occurs, or a newer listener takes over the channel.
pub async fn relay_listen(
    session: &Session,
    bus: Arc<dyn Pubsub>,
    opts: RelayOptions,
) -> Result<(), RelayError> {
    let listener = Uuid::new_v4();
    let channel = dial_channel(opts.channel);

    // Subscribe first, then announce: any prior listener observes the
    // takeover and stands down, so at most one listen relay serves the
    // channel.
    let mut dials = bus.subscribe(&channel);
    publish_signal(bus.as_ref(), &channel, &Signal::Takeover { listener })?;

    debug!(%listener, channel = %opts.channel, "listening for dials");

    let cancel = session.closed();
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = dials.recv() => match frame {
                Ok(frame) => frame,
                Err(e) => {
                    session.close_with_error(&e.to_string());
                    return Err(e.into());
                }
            },
        };

        match SignalCodec::decode_frame(&frame) {
            Ok(Signal::Takeover { listener: other }) if other != listener => {
                debug!(%listener, newer = %other, "superseded by newer listener");
                session.close_with_error("superseded by a newer listener");
                return Err(RelayError::Superseded);
            }
            Ok(Signal::Dial { exchange }) => {
                let stream = session.open_stream()?;
                let replies = bus.subscribe(&exchange_channel(opts.channel, exchange));

                if let Err(e) = publish_signal(
                    bus.as_ref(),
                    &exchange_channel(opts.channel, exchange),
                    &Signal::Accept { exchange },
                ) {
                    // Dialer already gone; skip this exchange only.
                    warn!(%exchange, error = %e, "dialer vanished before accept");
                    continue;
                }

                debug!(%exchange, "accepted dial");

                let bus = bus.clone();
                let channel = opts.channel;
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    let result = forward_exchange(
                        stream,
                        replies,
                        bus,
                        channel,
                        exchange,
                        PeerEnd::Agent,
                        cancel,
                    )
                    .await;
                    if let Err(e) = result {
                        warn!(%exchange, error = %e, "listen exchange failed");
                    }
                });
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "undecodable signal on dial channel"),
        }
    }
}

/// Forward negotiation traffic between one local sub-stream and one
/// exchange channel until either side closes or the session does.
async fn forward_exchange(
    mut stream: SubStream,
    mut replies: Subscription,
    bus: Arc<dyn Pubsub>,
    channel: Uuid,
    exchange: Uuid,
    me: PeerEnd,
    cancel: CancellationToken,
) -> Result<(), RelayError> {
    let reply_channel = exchange_channel(channel, exchange);

    let close = |reason: Option<String>| {
        // Best effort: the peer may already be gone.
        let _ = publish_signal(bus.as_ref(), &reply_channel, &Signal::Close {
            exchange,
            reason,
        });
    };

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                close(Some("session closed".to_string()));
                return Ok(());
            }
            payload = stream.recv() => match payload {
                Some(body) => {
                    publish_signal(bus.as_ref(), &reply_channel, &Signal::Payload {
                        exchange,
                        origin: me,
                        body: body.to_vec(),
                    })?;
                }
                None => {
                    close(None);
                    return Ok(());
                }
            },
            frame = replies.recv() => {
                let frame = frame?;
                match SignalCodec::decode_frame(&frame)? {
                    Signal::Payload { origin, body, .. } if origin != me => {
                        stream.send(&body).await?;
                    }
                    Signal::Close { reason, .. } => {
                        debug!(%exchange, ?reason, "exchange closed by peer");
                        stream.finish().await;
                        return Ok(());
                    }
                    _ => {}
                }
            }
        }
    }
}
