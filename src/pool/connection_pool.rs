// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info};

use crate::network::{Connection, Destination};
use crate::pool::PooledConnection;
use crate::service::{AppError, AppResult, NetworkConfig, PoolConfig, Shutdown};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Lease state of a pooled connection, reported to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Idle,
    InUse,
    Reaped,
}

/// Callback fired on every lease transition: (connection id, old, new).
pub type PoolListener = Arc<dyn Fn(u64, LeaseState, LeaseState) + Send + Sync>;

#[derive(Debug, Default)]
struct Bucket {
    idle: Vec<Connection>,
    in_use: usize,
}

enum Checkout {
    Reuse(Connection),
    Create,
}

/// Bounded collection of broker connections keyed by destination.
///
/// The handle is cheap to clone and share across tasks. Mutations of a
/// destination's bucket are serialized by the map entry, so concurrent
/// acquire/release/reap traffic for one key never interleaves. A leased
/// connection is physically absent from the pool, which is what enforces
/// the one-lease-per-connection invariant.
#[derive(Clone)]
pub struct ConnectionPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    pool_config: PoolConfig,
    network_config: NetworkConfig,
    buckets: DashMap<Destination, Bucket>,
    listeners: RwLock<Vec<PoolListener>>,
}

impl ConnectionPool {
    pub fn new(pool_config: PoolConfig, network_config: NetworkConfig) -> ConnectionPool {
        ConnectionPool {
            inner: Arc::new(PoolInner {
                pool_config,
                network_config,
                buckets: DashMap::new(),
                listeners: RwLock::new(Vec::new()),
            }),
        }
    }

    /// Hands out an exclusive lease on a connection to `destination`,
    /// reusing an idle one when possible.
    ///
    /// Idle connections past the idle threshold are never handed out; they
    /// are reaped on the spot and the search continues. Fails with
    /// [`AppError::PoolExhausted`] when the per-key limit would be
    /// exceeded, and with [`AppError::Connection`] when a fresh connection
    /// cannot be established.
    pub async fn acquire(&self, destination: &Destination) -> AppResult<PooledConnection> {
        let inner = &self.inner;
        loop {
            match inner.checkout(destination)? {
                Checkout::Reuse(mut conn) => {
                    if conn.idle_for() > inner.pool_config.idle_timeout() {
                        info!(
                            "reaping idle connection {} to {} on acquire",
                            conn.id(),
                            destination
                        );
                        inner.unreserve(destination);
                        inner.retire(conn).await;
                        continue;
                    }
                    if !conn.is_connected().await {
                        debug!(
                            "discarding dead idle connection {} to {}",
                            conn.id(),
                            destination
                        );
                        inner.unreserve(destination);
                        inner.notify(conn.id(), LeaseState::Idle, LeaseState::Reaped);
                        continue;
                    }
                    conn.touch();
                    debug!("reusing connection {} to {}", conn.id(), destination);
                    inner.notify(conn.id(), LeaseState::Idle, LeaseState::InUse);
                    return Ok(PooledConnection::new(conn, self.clone()));
                }
                Checkout::Create => {
                    let id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
                    let mut conn = Connection::new(id, destination.clone(), &inner.network_config);
                    if let Err(err) = conn.connect().await {
                        inner.unreserve(destination);
                        return Err(err);
                    }
                    info!("created connection {} to {}", id, destination);
                    inner.notify(id, LeaseState::Idle, LeaseState::InUse);
                    return Ok(PooledConnection::new(conn, self.clone()));
                }
            }
        }
    }

    /// Returns a leased connection to the pool. With `close` the connection
    /// says goodbye to the broker and is removed; otherwise its session
    /// context and idle timer are reset and it is kept for reuse.
    pub async fn release(&self, mut leased: PooledConnection, close: bool) {
        let Some(mut conn) = leased.conn.take() else {
            return;
        };
        let destination = conn.destination().clone();
        let id = conn.id();

        if close {
            conn.disconnect().await;
            self.inner.unreserve(&destination);
            debug!("closed connection {} to {}", id, destination);
            self.inner.notify(id, LeaseState::InUse, LeaseState::Reaped);
            return;
        }

        conn.reset_raw();
        {
            let mut bucket = self.inner.buckets.entry(destination.clone()).or_default();
            bucket.in_use = bucket.in_use.saturating_sub(1);
            bucket.idle.push(conn);
        }
        debug!("released connection {} to {}", id, destination);
        self.inner.notify(id, LeaseState::InUse, LeaseState::Idle);
    }

    /// Disconnects and removes idle connections older than `threshold`.
    /// Runs periodically from the reaper task and implicitly on acquire.
    pub async fn reap(&self, threshold: Duration) {
        let mut expired = Vec::new();
        for mut bucket in self.inner.buckets.iter_mut() {
            let (keep, old): (Vec<_>, Vec<_>) = bucket
                .idle
                .drain(..)
                .partition(|conn| conn.idle_for() <= threshold);
            bucket.idle = keep;
            expired.extend(old);
        }
        for conn in expired {
            info!(
                "reaping idle connection {} to {}",
                conn.id(),
                conn.destination()
            );
            self.inner.retire(conn).await;
        }
    }

    /// Spawns the periodic idle sweep. The task exits on the shutdown
    /// signal.
    pub fn start_reaper(&self, notify_shutdown: broadcast::Sender<()>) -> JoinHandle<()> {
        let pool = self.clone();
        let interval = self.inner.pool_config.reap_interval();
        let threshold = self.inner.pool_config.idle_timeout();
        let mut shutdown = Shutdown::new(notify_shutdown.subscribe());
        tokio::spawn(async move {
            debug!("idle reaper started");
            loop {
                tokio::select! {
                    _ = shutdown.recv() => {
                        debug!("idle reaper received shutdown signal");
                        break;
                    }
                    _ = time::sleep(interval) => {}
                }
                pool.reap(threshold).await;
            }
            debug!("idle reaper exited");
        })
    }

    /// Registers an observer for lease state transitions.
    pub fn subscribe(&self, listener: PoolListener) {
        self.inner.listeners.write().push(listener);
    }

    /// Number of idle connections currently pooled for `destination`.
    pub fn idle_count(&self, destination: &Destination) -> usize {
        self.inner
            .buckets
            .get(destination)
            .map(|bucket| bucket.idle.len())
            .unwrap_or(0)
    }

    /// Number of outstanding leases for `destination`.
    pub fn in_use_count(&self, destination: &Destination) -> usize {
        self.inner
            .buckets
            .get(destination)
            .map(|bucket| bucket.in_use)
            .unwrap_or(0)
    }

    // A lease that was dropped instead of released: free the slot; the
    // socket closes with the connection, without the goodbye.
    pub(super) fn abandon(&self, conn: &Connection) {
        self.inner.unreserve(conn.destination());
        self.inner
            .notify(conn.id(), LeaseState::InUse, LeaseState::Reaped);
    }
}

impl PoolInner {
    // Pops an idle connection or reserves a slot for a new one, entirely
    // under the bucket entry. The in-use count is bumped before the
    // candidate is validated so a concurrent acquire cannot overshoot the
    // limit while validation is in flight.
    fn checkout(&self, destination: &Destination) -> AppResult<Checkout> {
        let mut bucket = self.buckets.entry(destination.clone()).or_default();
        if let Some(conn) = bucket.idle.pop() {
            bucket.in_use += 1;
            return Ok(Checkout::Reuse(conn));
        }
        if bucket.in_use >= self.pool_config.max_connections_per_key {
            return Err(AppError::PoolExhausted {
                destination: destination.clone(),
                in_use: bucket.in_use,
                limit: self.pool_config.max_connections_per_key,
            });
        }
        bucket.in_use += 1;
        Ok(Checkout::Create)
    }

    fn unreserve(&self, destination: &Destination) {
        if let Some(mut bucket) = self.buckets.get_mut(destination) {
            bucket.in_use = bucket.in_use.saturating_sub(1);
        }
    }

    async fn retire(&self, mut conn: Connection) {
        let id = conn.id();
        conn.disconnect().await;
        self.notify(id, LeaseState::Idle, LeaseState::Reaped);
    }

    fn notify(&self, id: u64, old: LeaseState, new: LeaseState) {
        for listener in self.listeners.read().iter() {
            listener(id, old, new);
        }
    }
}
