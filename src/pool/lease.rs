use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::warn;

use crate::network::Connection;
use crate::pool::ConnectionPool;

/// Exclusive lease on a pooled connection.
///
/// Obtained from [`ConnectionPool::acquire`] and handed back through
/// [`ConnectionPool::release`]. The wrapped connection physically moves out
/// of the pool for the lifetime of the lease, so no second caller can reach
/// it. Dropping a lease instead of releasing it frees the pool slot and
/// closes the socket without the goodbye handshake.
pub struct PooledConnection {
    pub(super) conn: Option<Connection>,
    pub(super) pool: ConnectionPool,
}

impl PooledConnection {
    pub(super) fn new(conn: Connection, pool: ConnectionPool) -> PooledConnection {
        PooledConnection {
            conn: Some(conn),
            pool,
        }
    }
}

impl Deref for PooledConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        self.conn.as_ref().expect("lease already released")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut Connection {
        self.conn.as_mut().expect("lease already released")
    }
}

impl fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("conn", &self.conn)
            .finish()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(
                "connection {} to {} dropped without release, closing without goodbye",
                conn.id(),
                conn.destination()
            );
            self.pool.abandon(&conn);
        }
    }
}
