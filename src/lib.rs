mod dao;
mod network;
mod pool;
mod service;

pub use dao::CrudDao;
pub use network::{Connection, Destination, FramedChannel, CRLF, DISCONNECT_MESSAGE};
pub use pool::{ConnectionPool, LeaseState, PoolListener, PooledConnection};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, BrokerConfig, ClientConfig,
    NetworkConfig, PoolConfig, Shutdown,
};
