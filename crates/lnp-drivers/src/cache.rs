//! The cache writer — a background task that persists tagged resolutions
//! back to the control database through a bounded channel.
//!
//! Producers never touch the database: they `send`/`try_send` a
//! `CacheEntry` and move on. The writer owns the only `PgPool`, periodically
//! probes it with a no-op transaction to catch connection loss early, and
//! reconnects with a fixed backoff. A statement failure discards the entry
//! — delivery is at-most-once, matching the source's behaviour.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub driver_id: i32,
    pub query: String,
    pub local_routing_number: String,
}

#[derive(Clone)]
pub struct CacheWriterHandle {
    sender: mpsc::Sender<CacheEntry>,
}

impl CacheWriterHandle {
    /// Non-blocking enqueue. A full channel drops the entry rather than
    /// ever stalling the caller on database I/O.
    pub fn try_enqueue(&self, entry: CacheEntry) {
        if let Err(e) = self.sender.try_send(entry) {
            warn!(error = %e, "cache writer channel full or closed, dropping entry");
        }
    }
}

struct Connection {
    pool: PgPool,
}

impl Connection {
    async fn connect(conn_string: &str, connect_timeout: Duration) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(connect_timeout)
            .connect(conn_string)
            .await?;
        Ok(Self { pool })
    }

    async fn health_check(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SELECT 1").execute(&mut *tx).await?;
        tx.commit().await
    }

    async fn write(&self, entry: &CacheEntry) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT cache_lnp_data($1, $2, $3, $4)")
            .bind(entry.driver_id as i16)
            .bind(&entry.query)
            .bind(&entry.local_routing_number)
            .bind(Option::<String>::None)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Spawn the writer task. Returns a cloneable handle producers enqueue
/// into, and shuts down cleanly once `shutdown` fires: no new entries are
/// accepted, the in-flight write (if any) finishes, then the connection
/// drops.
pub fn spawn(
    conn_string: String,
    connect_timeout: Duration,
    check_interval: Duration,
    channel_bound: usize,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) -> (CacheWriterHandle, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<CacheEntry>(channel_bound);

    let task = tokio::spawn(async move {
        let mut conn: Option<Connection> = None;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("cache writer shutting down");
                    rx.close();
                    while rx.try_recv().is_ok() {}
                    return;
                }

                _ = tokio::time::sleep(check_interval) => {
                    conn = ensure_connection(conn, &conn_string, connect_timeout).await;
                    if let Some(c) = &conn {
                        if c.health_check().await.is_err() {
                            warn!("cache writer health check failed, will reconnect");
                            conn = None;
                        }
                    }
                }

                maybe_entry = rx.recv() => {
                    let Some(entry) = maybe_entry else {
                        return;
                    };
                    conn = ensure_connection(conn, &conn_string, connect_timeout).await;
                    match &conn {
                        Some(c) => {
                            if let Err(e) = c.write(&entry).await {
                                error!(error = %e, "cache write failed, discarding entry");
                                conn = None;
                            }
                        }
                        None => {
                            warn!("no cache connection available, discarding entry");
                        }
                    }
                }
            }
        }
    });

    (CacheWriterHandle { sender: tx }, task)
}

async fn ensure_connection(
    current: Option<Connection>,
    conn_string: &str,
    connect_timeout: Duration,
) -> Option<Connection> {
    if current.is_some() {
        return current;
    }
    match Connection::connect(conn_string, connect_timeout).await {
        Ok(c) => Some(c),
        Err(e) => {
            error!(error = %e, "cache writer failed to connect, retrying later");
            tokio::time::sleep(RECONNECT_DELAY).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_drains_without_panicking() {
        let (_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
        let (_handle, task) = spawn(
            "postgres://localhost/does-not-exist".to_string(),
            Duration::from_millis(10),
            Duration::from_secs(3600),
            8,
            shutdown_rx,
        );
        task.abort();
    }
}
