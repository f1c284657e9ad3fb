//! Agent liveness tracking
//!
//! While a listen session is open, the agent's last-seen timestamp is
//! bumped immediately and then on a fixed interval. A store failure is
//! fatal to the session: a stale timestamp with a live connection is a
//! worse state than a dropped connection.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use uuid::Uuid;

use tether_db::{Store, StoreError};

/// Default heartbeat interval.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// Run the heartbeat loop until `cancel` fires or a store update
/// fails.
///
/// One update happens before the first tick so liveness is recorded
/// even if the agent disconnects immediately. Returns `Ok(())` on
/// cancellation and the store error otherwise; no further updates
/// occur after either exit.
pub async fn heartbeat(
    store: &Store,
    agent_id: Uuid,
    interval: Duration,
    cancel: CancellationToken,
) -> Result<(), StoreError> {
    store.touch_agent(agent_id, Utc::now()).await?;
    trace!(%agent_id, "agent liveness recorded");

    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; the immediate update above
    // already covered it.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%agent_id, "heartbeat stopped, session closed");
                return Ok(());
            }
            _ = ticker.tick() => {
                store.touch_agent(agent_id, Utc::now()).await?;
                trace!(%agent_id, "agent liveness recorded");
            }
        }
    }
}
