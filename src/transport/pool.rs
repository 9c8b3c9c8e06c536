//! `host:port -> Connection` map with exclusive lookup-or-open per key.
//!
//! Exactly one connection is kept per host, opened at most once even
//! under concurrent first callers: correlation by request id makes a
//! single connection sufficient to multiplex many outstanding calls, so
//! there is no need to bound or round-robin over a larger set.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};

use crate::config::PoolConfig;
use crate::error::{DubboError, DubboResult};
use crate::protocol::encoder::{Encoder, Invocation};
use crate::transport::connection::Connection;
use crate::value::Value;

type Slot = Arc<OnceCell<Connection>>;

/// Process-wide `host:port -> Connection` map. The outer mutex only
/// guards map-slot insertion; the actual TCP connect runs inside the
/// slot's `OnceCell::get_or_try_init`, outside that lock, so two
/// concurrent first-callers for different hosts never block each other.
pub struct ConnectionPool {
    config: PoolConfig,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            slots: Mutex::new(HashMap::new()),
        }
    }

    async fn slot_for(&self, host: &str) -> Slot {
        let mut slots = self.slots.lock().await;
        slots
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Ensures a ready connection exists for `host`, replacing a broken
    /// one lazily. Concurrent first-callers for the same host share one
    /// `TcpStream::connect`.
    async fn ensure_connection(&self, host: &str) -> DubboResult<Arc<OnceCell<Connection>>> {
        let acquire_timeout = self.config.acquire_timeout;
        tokio::time::timeout(acquire_timeout, self.ensure_connection_inner(host))
            .await
            .map_err(|_| DubboError::transport(format!("acquiring connection to {host} timed out")))?
    }

    /// Unbounded-recursion helper behind `ensure_connection`'s
    /// `acquire_timeout` wrapper; the timeout bounds the whole wait
    /// (including a concurrent caller's in-flight connect), while
    /// `connect_timeout` bounds only the `TcpStream::connect` itself.
    async fn ensure_connection_inner(&self, host: &str) -> DubboResult<Arc<OnceCell<Connection>>> {
        let slot = self.slot_for(host).await;

        if let Some(conn) = slot.get() {
            if conn.is_broken() {
                // Replace lazily: drop the stale slot and recurse into a
                // fresh one. A concurrent caller racing this will see
                // either the old or the new slot, never a half-built one.
                let mut slots = self.slots.lock().await;
                slots.remove(host);
                drop(slots);
                return Box::pin(self.ensure_connection_inner(host)).await;
            }
            return Ok(slot);
        }

        let host_owned = host.to_string();
        let connect_timeout = self.config.connect_timeout;
        slot.get_or_try_init(|| async move {
            tokio::time::timeout(connect_timeout, Connection::connect(&host_owned))
                .await
                .map_err(|_| DubboError::transport(format!("connect to {host_owned} timed out")))?
        })
        .await?;

        Ok(slot)
    }

    /// `ensureConnection(host) -> Encoder(requestParam).encode() ->
    /// connection.invoke(frame, timeout) -> Decoder -> return value`, as
    /// specified for `ConnectionPool::get`.
    pub async fn get(&self, host: &str, invocation: &Invocation, timeout: Duration) -> DubboResult<Value> {
        let mut encoder = Encoder::new();
        let body = encoder.encode_body(invocation)?;

        let slot = self.ensure_connection(host).await?;
        let conn = slot
            .get()
            .expect("ensure_connection always leaves the slot initialized");

        conn.invoke(&body, &invocation.path, &invocation.method, timeout).await
    }

    /// Closes every pooled connection, failing their outstanding calls.
    pub async fn close(&self) {
        let slots = self.slots.lock().await;
        for slot in slots.values() {
            if let Some(conn) = slot.get() {
                conn.close();
            }
        }
    }
}
