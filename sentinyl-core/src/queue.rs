use redis::{aio::ConnectionManager, AsyncCommands};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::error::{Result, SentinylError};

/// Seconds a blocking pop waits before returning empty so the worker loop
/// can observe shutdown.
pub const POP_TIMEOUT_SECS: f64 = 5.0;

pub const QUEUE_TYPOSQUAT: &str = "queue:typosquat";
pub const QUEUE_LEAK: &str = "queue:leak";
pub const QUEUE_GUARD: &str = "queue:guard";

/// Named FIFO queues over Redis. Producers `LPUSH`, consumers `BRPOP`;
/// ordering is FIFO per queue with no cross-queue guarantees. Redelivery
/// is not guaranteed, which is why job status transitions are idempotent.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobQueue")
            .field("connection", &"ConnectionManager")
            .finish()
    }
}

impl JobQueue {
    pub async fn connect(redis_url: &str) -> Result<Self> {
        info!("Connecting to Redis queue at {}", redis_url);

        let client = redis::Client::open(redis_url)
            .map_err(|e| SentinylError::Transport(format!("Failed to create Redis client: {e}")))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| SentinylError::Transport(format!("Failed to connect to Redis: {e}")))?;

        info!("Successfully connected to Redis queue");

        Ok(Self { conn })
    }

    /// Push one JSON payload onto the named queue.
    pub async fn push<T: Serialize>(&self, queue: &str, payload: &T) -> Result<()> {
        let json = serde_json::to_string(payload)?;
        debug!("Queue PUSH {} ({} bytes)", queue, json.len());

        let mut conn = self.conn.clone();
        conn.lpush::<_, _, ()>(queue, json)
            .await
            .map_err(|e| SentinylError::Transport(format!("Redis LPUSH failed: {e}")))?;

        Ok(())
    }

    /// Blocking pop with the 5-second ceiling. Returns `None` on timeout.
    pub async fn pop_blocking<T: DeserializeOwned>(&self, queue: &str) -> Result<Option<T>> {
        let mut conn = self.conn.clone();
        let popped: Option<(String, String)> = conn
            .brpop(queue, POP_TIMEOUT_SECS)
            .await
            .map_err(|e| SentinylError::Transport(format!("Redis BRPOP failed: {e}")))?;

        match popped {
            Some((_, json)) => {
                debug!("Queue POP {} ({} bytes)", queue, json.len());
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Connectivity probe for the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| SentinylError::Transport(format!("Redis PING failed: {e}")))?;
        Ok(())
    }
}

/// Queue name for a scan kind.
pub fn queue_for(kind: sentinyl_model::ScanKind) -> &'static str {
    match kind {
        sentinyl_model::ScanKind::Typosquat => QUEUE_TYPOSQUAT,
        sentinyl_model::ScanKind::Leak => QUEUE_LEAK,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinyl_model::ScanKind;

    #[test]
    fn queue_names_follow_scan_kind() {
        assert_eq!(queue_for(ScanKind::Typosquat), "queue:typosquat");
        assert_eq!(queue_for(ScanKind::Leak), "queue:leak");
    }
}
