//! Redis counter store.
//!
//! The admission decision runs as a Lua script inside Redis, so the read,
//! the comparison and the increment cannot interleave with another caller.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncConnectionConfig, Client, RedisError, Script};
use tokio::sync::Mutex;
use tracing::{debug, info, trace, warn};

use super::{AdmitRequest, CounterStore, StoreError};
use crate::config::StoreConfig;

/// The decision script, bundled at compile time.
const SLIDING_WINDOW_SCRIPT: &str = include_str!("scripts/sliding_window.lua");

/// Startup reachability check bound.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

impl From<RedisError> for StoreError {
    fn from(err: RedisError) -> Self {
        if err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_io_error()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Script(err.to_string())
        }
    }
}

/// A pooled Redis client running the sliding window script.
///
/// The pool holds `pool_size` multiplexed connections handed out
/// round-robin. `min_idle` of them are opened by [`RedisStore::connect`];
/// the rest are opened on first use.
pub struct RedisStore {
    client: Client,
    connection_config: AsyncConnectionConfig,
    slots: Vec<Mutex<Option<MultiplexedConnection>>>,
    next: AtomicUsize,
    closed: AtomicBool,
    script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("pool_size", &self.slots.len())
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl RedisStore {
    /// Open the pool and verify the server answers.
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.url()).map_err(|e| {
            StoreError::Unavailable(format!("invalid store address {}: {}", config.address, e))
        })?;

        let connection_config = AsyncConnectionConfig::new()
            .set_connection_timeout(config.connect_timeout())
            .set_response_timeout(config.response_timeout());

        let store = Self {
            client,
            connection_config,
            slots: (0..config.pool_size.max(1)).map(|_| Mutex::new(None)).collect(),
            next: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            script: Script::new(SLIDING_WINDOW_SCRIPT),
        };

        for slot in store.slots.iter().take(config.min_idle) {
            let conn = store.open().await?;
            *slot.lock().await = Some(conn);
        }

        store.ping().await?;

        info!(
            address = %config.address,
            pool_size = store.slots.len(),
            min_idle = config.min_idle,
            script_hash = %store.script.get_hash(),
            "Connected to counter store"
        );

        Ok(store)
    }

    async fn open(&self) -> Result<MultiplexedConnection, StoreError> {
        let conn = self
            .client
            .get_multiplexed_async_connection_with_config(&self.connection_config)
            .await?;
        debug!("Opened counter store connection");
        Ok(conn)
    }

    /// Take the next connection from the pool, opening it if needed.
    ///
    /// Returns the slot index along with the connection so a broken
    /// connection can be evicted afterwards.
    async fn checkout(&self) -> Result<(usize, MultiplexedConnection), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Unavailable("store has been closed".to_string()));
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        let mut slot = self.slots[index].lock().await;

        match slot.as_ref() {
            Some(conn) => Ok((index, conn.clone())),
            None => {
                let conn = self.open().await?;
                *slot = Some(conn.clone());
                Ok((index, conn))
            }
        }
    }

    /// Convert a command result, dropping the slot's connection when the
    /// failure means the connection itself is gone.
    ///
    /// Multiplexed connections never reconnect on their own; an emptied
    /// slot is reopened by the next checkout. Timeouts leave the slot alone.
    async fn settle<T>(
        &self,
        index: usize,
        result: Result<T, RedisError>,
    ) -> Result<T, StoreError> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                if err.is_connection_dropped()
                    || err.is_connection_refusal()
                    || err.is_io_error()
                {
                    self.slots[index].lock().await.take();
                    warn!(slot = index, error = %err, "Dropped broken counter store connection");
                }
                Err(err.into())
            }
        }
    }

    /// Round trip a `PING`, bounded by a fixed timeout.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let (index, mut conn) = self.checkout().await?;
        let result = tokio::time::timeout(
            PING_TIMEOUT,
            redis::cmd("PING").query_async::<String>(&mut conn),
        )
        .await
        .map_err(|_| StoreError::Unavailable("PING timed out".to_string()))?;
        let reply = self.settle(index, result).await?;

        trace!(reply = %reply, "Counter store answered PING");
        Ok(())
    }

    /// Number of pool slots currently holding an open connection.
    pub async fn open_connections(&self) -> usize {
        let mut open = 0;
        for slot in &self.slots {
            if slot.lock().await.is_some() {
                open += 1;
            }
        }
        open
    }

    /// Release every pooled connection. Later calls fail as unavailable.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for slot in &self.slots {
            slot.lock().await.take();
        }
        info!("Counter store connections closed");
    }
}

#[async_trait]
impl CounterStore for RedisStore {
    async fn admit(&self, request: &AdmitRequest) -> Result<bool, StoreError> {
        let (index, mut conn) = self.checkout().await?;

        let result: Result<i64, RedisError> = self
            .script
            .key(&request.current_key)
            .key(&request.previous_key)
            .arg(request.limit)
            .arg(request.weight)
            .arg(request.window.as_secs())
            .invoke_async(&mut conn)
            .await;

        let admitted = self.settle(index, result).await?;
        Ok(admitted == 1)
    }
}
