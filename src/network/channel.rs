use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpStream};
use tokio::time;
use tracing::{debug, trace};

use crate::network::Destination;
use crate::service::{AppError, AppResult, NetworkConfig};

pub const CRLF: &str = "\r\n";

/// Owns at most one TCP socket to a broker endpoint.
///
/// The broker protocol has no length prefix or delimiter at the transport
/// level: a reply is complete when a read returns fewer bytes than the
/// receive buffer size. A reply that is an exact multiple of the buffer size
/// therefore produces one extra, zero length read once the peer pauses or
/// half closes; that empty terminal chunk is tolerated and contributes no
/// data. The read timeout is the safety net for a peer that never produces
/// the trailing short read.
#[derive(Debug)]
pub struct FramedChannel {
    destination: Destination,
    recv_buffer_size: usize,
    connect_timeout: Duration,
    read_timeout: Duration,
    stream: Option<TcpStream>,
}

impl FramedChannel {
    pub fn new(destination: Destination, config: &NetworkConfig) -> FramedChannel {
        FramedChannel {
            destination,
            recv_buffer_size: config.recv_buffer_size,
            connect_timeout: config.connect_timeout(),
            read_timeout: config.read_timeout(),
            stream: None,
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Resolves the destination and establishes the TCP connection, bounded
    /// by the connect timeout.
    pub async fn open(&mut self) -> AppResult<()> {
        if self.stream.is_some() {
            return Err(AppError::IllegalState(format!(
                "channel to {} is already open",
                self.destination
            )));
        }
        let destination = self.destination.clone();
        let mut addrs = time::timeout(self.connect_timeout, lookup_host(destination.address()))
            .await
            .map_err(|_| AppError::connection(&destination, "dns resolution timed out", None))?
            .map_err(|e| AppError::connection(&destination, "dns resolution failed", Some(e)))?;
        let addr = addrs.next().ok_or_else(|| {
            AppError::connection(&destination, "host resolved to no addresses", None)
        })?;
        let stream = time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| AppError::connection(&destination, "connect timed out", None))?
            .map_err(|e| AppError::connection(&destination, "connect failed", Some(e)))?;
        debug!("opened channel to {}", destination);
        self.stream = Some(stream);
        Ok(())
    }

    /// Writes the full request and reads the reply chunk by chunk until a
    /// short chunk signals end of message. On a socket fault or a read
    /// timeout the socket is closed before the error propagates; a faulted
    /// socket cannot be trusted for framing again.
    pub async fn send(&mut self, request: &[u8]) -> AppResult<BytesMut> {
        match self.exchange(request).await {
            Ok(reply) => Ok(reply),
            Err(err) => {
                if !matches!(err, AppError::IllegalState(_)) {
                    self.close();
                }
                Err(err)
            }
        }
    }

    async fn exchange(&mut self, request: &[u8]) -> AppResult<BytesMut> {
        let destination = self.destination.clone();
        let read_timeout = self.read_timeout;
        let buffer_size = self.recv_buffer_size;
        let stream = self.stream.as_mut().ok_or_else(|| {
            AppError::IllegalState(format!("send on a closed channel to {}", destination))
        })?;

        stream
            .write_all(request)
            .await
            .map_err(|e| AppError::connection(&destination, "write failed", Some(e)))?;

        let mut reply = BytesMut::with_capacity(buffer_size);
        let mut chunk = vec![0u8; buffer_size];
        loop {
            let n = time::timeout(read_timeout, stream.read(&mut chunk))
                .await
                .map_err(|_| AppError::connection(&destination, "read timed out", None))?
                .map_err(|e| AppError::connection(&destination, "read failed", Some(e)))?;
            reply.extend_from_slice(&chunk[..n]);
            trace!("read {} reply bytes from {}", n, destination);
            if n < buffer_size {
                break;
            }
        }
        Ok(reply)
    }

    /// Single shot exchange: open, send, unconditionally close, and split
    /// the reply into CRLF separated lines.
    pub async fn oneshot(&mut self, request: &[u8]) -> AppResult<Vec<String>> {
        self.open().await?;
        let result = self.send(request).await;
        self.close();
        let reply = result?;
        Ok(String::from_utf8_lossy(&reply)
            .split(CRLF)
            .map(str::to_string)
            .collect())
    }

    /// Liveness as reported by the transport. A peer that closed its end
    /// shows up as a zero byte peek; nothing readable within the probe
    /// window means the socket is still established.
    pub async fn is_live(&self) -> bool {
        let Some(stream) = &self.stream else {
            return false;
        };
        let mut probe = [0u8; 1];
        match time::timeout(Duration::from_millis(1), stream.peek(&mut probe)).await {
            Ok(Ok(0)) => false,
            Ok(Ok(_)) => true,
            Ok(Err(_)) => false,
            Err(_) => true,
        }
    }

    /// Drops the socket. Idempotent.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("closed channel to {}", self.destination);
        }
    }
}
