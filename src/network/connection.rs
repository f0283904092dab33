use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::network::{Destination, FramedChannel};
use crate::service::{AppResult, NetworkConfig};

/// Control sequence the broker recognizes as a graceful session
/// termination. Must be preserved bit for bit.
pub const DISCONNECT_MESSAGE: &str = "[XWB]10304\x05#BYE#\x04";

/// One client session with a broker: a framed channel plus identity, an
/// idle timer and the opaque session context the broker hands back.
///
/// Connectivity is always recomputed from the transport. The broker can
/// drop the socket without this side being notified, so a cached flag
/// would go stale.
#[derive(Debug)]
pub struct Connection {
    id: u64,
    destination: Destination,
    channel: FramedChannel,
    last_used: Instant,
    symbol_table: HashMap<String, String>,
    raw_symbol_table: HashMap<String, String>,
}

impl Connection {
    pub fn new(id: u64, destination: Destination, network: &NetworkConfig) -> Connection {
        let channel = FramedChannel::new(destination.clone(), network);
        Connection {
            id,
            destination,
            channel,
            last_used: Instant::now(),
            symbol_table: HashMap::new(),
            raw_symbol_table: HashMap::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// No-op when already connected: reconnecting an open socket would leak
    /// it. A dead socket still held by the channel is dropped first.
    pub async fn connect(&mut self) -> AppResult<()> {
        if self.is_connected().await {
            return Ok(());
        }
        self.channel.close();
        self.channel.open().await?;
        self.touch();
        Ok(())
    }

    /// Sends one request and reads the full reply, resetting the idle timer.
    pub async fn query(&mut self, request: &str) -> AppResult<String> {
        self.query_with_timer(true, request).await
    }

    // The goodbye message must not extend the connection's lifetime, so the
    // disconnect path comes through here with the timer reset skipped.
    async fn query_with_timer(&mut self, reset_timer: bool, request: &str) -> AppResult<String> {
        if reset_timer {
            self.touch();
        }
        let reply = self.channel.send(request.as_bytes()).await?;
        Ok(String::from_utf8_lossy(&reply).into_owned())
    }

    /// Best-effort goodbye to the broker, then an unconditional socket
    /// close. A failed goodbye never prevents releasing the socket.
    pub async fn disconnect(&mut self) {
        if !self.is_connected().await {
            return;
        }
        if let Err(err) = self.query_with_timer(false, DISCONNECT_MESSAGE).await {
            debug!(
                "goodbye to {} failed, closing anyway: {}",
                self.destination, err
            );
        }
        self.channel.close();
    }

    /// Live connectivity as reported by the transport, never a cached flag.
    pub async fn is_connected(&self) -> bool {
        self.channel.is_live().await
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    /// Records session context returned by the broker and keeps a pristine
    /// copy that [`reset_raw`](Connection::reset_raw) restores.
    pub fn set_raw_context(&mut self, table: HashMap<String, String>) {
        self.raw_symbol_table = table.clone();
        self.symbol_table = table;
    }

    pub fn context(&self) -> &HashMap<String, String> {
        &self.symbol_table
    }

    pub fn context_mut(&mut self) -> &mut HashMap<String, String> {
        &mut self.symbol_table
    }

    /// Replaces the working session context wholesale with the pristine
    /// copy and resets the idle timer. The pool calls this on release.
    pub fn reset_raw(&mut self) {
        self.symbol_table = self.raw_symbol_table.clone();
        self.touch();
    }
}
